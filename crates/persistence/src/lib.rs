//! Lead persistence for the voice bridge
//!
//! Assembles the per-call lead record at session termination and hands
//! it to the external datastore collaborator. A write failure is logged
//! and never blocks teardown; the call has already ended.

pub mod error;
pub mod record;
pub mod store;

pub use error::PersistenceError;
pub use record::CallRecord;
pub use store::{HttpLeadStore, LeadStore, MemoryLeadStore};
