//! Persistence layer: abstract transactional document store used by C10
//! and C11.

pub mod document_store;

pub use document_store::{DocumentStore, InMemoryDocumentStore};
