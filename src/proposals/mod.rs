//! Order-proposal schema, validation, and the append-only audit emitter (C4/C5).

pub mod emitter;
pub mod models;
pub mod validator;

pub use emitter::{emit_proposal, redact, EmitOutcome, ProposalLifecycle};
pub use models::{
    OptionRight, OrderProposal, ProposalAssetType, ProposalConstraints, ProposalOption,
    ProposalRationale, ProposalRisk, ProposalSide, ProposalStatus, ProposalTimeInForce,
};
pub use validator::{validate_proposal, AgentMode, ProposalValidationError};
