//! Approval workflow errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("failed to notify operator about {id}: {reason}")]
    Notify { id: String, reason: String },

    #[error("failed to record {id} in ledger: {reason}")]
    Ledger { id: String, reason: String },

    #[error("operator inbox closed")]
    InboxClosed,

    #[error("approval queue closed")]
    QueueClosed,
}
