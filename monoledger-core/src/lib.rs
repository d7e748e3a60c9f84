//! monoledger-core: transactions, operator replies, ledger rows and the
//! single-operator approval workflow.

pub mod approval;
pub mod currency;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod reply;
pub mod statement;
pub mod transaction;

pub use approval::{
    approval_queue, ApprovalConfig, ApprovalQueue, ApprovalWorkflow, OperatorInbox,
    OperatorMessage, PendingTransactions, Phase, Resolution,
};
pub use error::ApprovalError;
pub use ledger::{LedgerRow, LedgerSink, LEDGER_HEADER};
pub use notify::Notifier;
pub use reply::{parse_reply, Mark, Reply, ReplyError, DISCARD};
pub use statement::{new_transactions, PollPhase, StatementTracker};
pub use transaction::Transaction;
