//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("datastore request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("datastore rejected record: status {status}")]
    Rejected { status: u16 },

    #[error("datastore sink is not configured")]
    NotConfigured,
}
