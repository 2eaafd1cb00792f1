//! Pub/Sub-shaped consumer core (C11): ordering, message-once and replay
//! dedupe, last-write-wins upserts, DLQ sampling, topic routing, and the
//! publisher retry policy.

pub mod dedupe;
pub mod dlq;
pub mod ordering;
pub mod publisher;
pub mod router;
pub mod service;
pub mod store;

pub use dedupe::{ensure_event_not_applied, write_replay_marker, ApplyCheckReason, IdempotencyStore, ReplayContext};
pub use dlq::{deterministic_sample, maybe_write_sampled_dlq_event, observe_pubsub_delivery};
pub use ordering::{choose_doc_id, normalize_doc_id, ordering_ts, parse_ts};
pub use publisher::{retry_with_backoff, RetryPolicy, StatusCode};
pub use router::{EventContext, HandlerKind, SchemaRouter};
pub use service::{ConsumerService, WireMessage};
pub use store::{ConsumerWriter, SourceInfo, UpsertOutcome};
