//! Approval workflow: one transaction, one operator reply, one ledger row.
//!
//! Transactions reach the workflow through an unbounded queue with a single
//! consumer, and operator messages through a separate inbox. `dispatch`
//! borrows the workflow mutably for the whole notify / wait / record cycle, so
//! at most one approval can be outstanding; everything submitted meanwhile
//! waits in the queue.
//!
//! Phases:
//! - `Idle`: stray operator text is answered with "No transaction waiting answer".
//! - `AwaitingReply`: the next operator text, whatever it says, is the reply.
//!
//! `/start` is never a reply; it gets the greeting in either phase.

use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::ApprovalError;
use crate::ledger::{LedgerRow, LedgerSink};
use crate::notify::{
    render_ledger_failure, render_prompt, render_timeout, Notifier, ADDED, DISCARDED,
    EMPTY_REPLY_HINT, GREETING, NO_TRANSACTION_WAITING,
};
use crate::reply::{parse_reply, Reply, ReplyError};
use crate::transaction::Transaction;

/// Inbound chat message from the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorMessage {
    Start,
    Text(String),
}

impl OperatorMessage {
    pub fn parse(text: &str) -> Self {
        let command = text.split_whitespace().next().unwrap_or("");
        if command == "/start" || command.starts_with("/start@") {
            OperatorMessage::Start
        } else {
            OperatorMessage::Text(text.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingReply { transaction_id: String },
}

/// How a dispatched transaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Recorded(LedgerRow),
    Discarded,
    /// No reply within `ApprovalConfig::reply_timeout`; nothing recorded.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    /// Zone used for the ledger date column.
    pub timezone: Tz,
    /// `None` waits for the operator forever.
    pub reply_timeout: Option<Duration>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Kyiv,
            reply_timeout: None,
        }
    }
}

/// Producer side of the transaction queue, cloned into every source.
#[derive(Debug, Clone)]
pub struct ApprovalQueue {
    tx: mpsc::UnboundedSender<Transaction>,
    depth: Arc<AtomicUsize>,
}

impl ApprovalQueue {
    pub fn submit(&self, txn: Transaction) -> Result<(), ApprovalError> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(txn).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            ApprovalError::QueueClosed
        })
    }

    /// Transactions submitted but not yet picked up by the workflow.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consumer side of the transaction queue.
#[derive(Debug)]
pub struct PendingTransactions {
    rx: mpsc::UnboundedReceiver<Transaction>,
    depth: Arc<AtomicUsize>,
}

impl PendingTransactions {
    pub async fn recv(&mut self) -> Option<Transaction> {
        let txn = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(txn)
    }
}

pub fn approval_queue() -> (ApprovalQueue, PendingTransactions) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        ApprovalQueue {
            tx,
            depth: Arc::clone(&depth),
        },
        PendingTransactions { rx, depth },
    )
}

/// Producer side of the operator inbox, owned by the chat transport.
#[derive(Debug, Clone)]
pub struct OperatorInbox {
    tx: mpsc::UnboundedSender<OperatorMessage>,
}

impl OperatorInbox {
    pub fn deliver(&self, message: OperatorMessage) -> Result<(), ApprovalError> {
        self.tx
            .send(message)
            .map_err(|_| ApprovalError::InboxClosed)
    }
}

/// Marks the workflow busy for as long as it lives, whatever way the
/// approval ends (reply, error, timeout or a dropped future).
struct InFlight {
    phase: Arc<watch::Sender<Phase>>,
}

impl InFlight {
    fn enter(phase: &Arc<watch::Sender<Phase>>, txn: &Transaction) -> Self {
        phase.send_replace(Phase::AwaitingReply {
            transaction_id: txn.id.clone(),
        });
        Self {
            phase: Arc::clone(phase),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.phase.send_replace(Phase::Idle);
    }
}

pub struct ApprovalWorkflow<N, S> {
    notifier: N,
    sink: S,
    inbox: mpsc::UnboundedReceiver<OperatorMessage>,
    config: ApprovalConfig,
    phase: Arc<watch::Sender<Phase>>,
}

impl<N: Notifier, S: LedgerSink> ApprovalWorkflow<N, S> {
    pub fn new(notifier: N, sink: S, config: ApprovalConfig) -> (Self, OperatorInbox) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (phase, _) = watch::channel(Phase::Idle);
        let workflow = Self {
            notifier,
            sink,
            inbox,
            config,
            phase: Arc::new(phase),
        };
        (workflow, OperatorInbox { tx })
    }

    /// Live view of the current phase.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    /// Consume the queue until every producer is gone.
    ///
    /// A failed approval is logged and the loop moves on to the next
    /// transaction; only a closed operator inbox stops it.
    pub async fn run(mut self, mut pending: PendingTransactions) -> Result<(), ApprovalError> {
        info!(sink = self.sink.name(), "approval workflow started");
        loop {
            tokio::select! {
                biased;
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        return Err(ApprovalError::InboxClosed);
                    };
                    self.answer_idle(message).await;
                }
                txn = pending.recv() => {
                    let Some(txn) = txn else {
                        info!("transaction queue closed, approval workflow stopping");
                        return Ok(());
                    };
                    let id = txn.id.clone();
                    let expense = txn.is_expense();
                    match self.dispatch(txn).await {
                        Ok(Resolution::Recorded(row)) => {
                            info!(
                                %id,
                                mark = %row.mark,
                                category = row.mark.label().unwrap_or("custom"),
                                expense,
                                "transaction recorded"
                            );
                        }
                        Ok(Resolution::Discarded) => info!(%id, "transaction discarded"),
                        Ok(Resolution::TimedOut) => warn!(%id, "transaction skipped, no reply"),
                        Err(ApprovalError::InboxClosed) => return Err(ApprovalError::InboxClosed),
                        Err(e) => error!(%id, error = %e, "approval failed"),
                    }
                }
            }
        }
    }

    /// Notify the operator about `txn`, wait for the reply and resolve it.
    ///
    /// Returns once the ledger write (if any) has finished; the workflow is
    /// `Idle` again on every return path.
    pub async fn dispatch(&mut self, txn: Transaction) -> Result<Resolution, ApprovalError> {
        let _in_flight = InFlight::enter(&self.phase, &txn);

        self.notifier
            .notify(&render_prompt(&txn))
            .await
            .map_err(|e| ApprovalError::Notify {
                id: txn.id.clone(),
                reason: format!("{e:#}"),
            })?;
        debug!(id = %txn.id, "awaiting operator reply");

        let reply = match self.config.reply_timeout {
            None => self.next_reply().await?,
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, self.next_reply()).await;
                match outcome {
                    Ok(reply) => reply?,
                    Err(_) => {
                        self.say(&render_timeout(&txn)).await;
                        return Ok(Resolution::TimedOut);
                    }
                }
            }
        };

        self.resolve(&txn, reply).await
    }

    async fn next_reply(&mut self) -> Result<Reply, ApprovalError> {
        loop {
            let message = self.inbox.recv().await.ok_or(ApprovalError::InboxClosed)?;
            match message {
                OperatorMessage::Start => self.say(GREETING).await,
                OperatorMessage::Text(text) => match parse_reply(&text) {
                    Ok(reply) => return Ok(reply),
                    Err(ReplyError::Empty) => self.say(EMPTY_REPLY_HINT).await,
                },
            }
        }
    }

    async fn resolve(&self, txn: &Transaction, reply: Reply) -> Result<Resolution, ApprovalError> {
        match reply {
            Reply::Discard => {
                self.say(DISCARDED).await;
                Ok(Resolution::Discarded)
            }
            Reply::Categorize { mark, description } => {
                let row = LedgerRow::new(txn, mark, description, self.config.timezone);
                if let Err(e) = self.sink.append(&row).await {
                    self.say(&render_ledger_failure(&e)).await;
                    return Err(ApprovalError::Ledger {
                        id: txn.id.clone(),
                        reason: format!("{e:#}"),
                    });
                }
                self.say(ADDED).await;
                Ok(Resolution::Recorded(row))
            }
        }
    }

    async fn answer_idle(&self, message: OperatorMessage) {
        match message {
            OperatorMessage::Start => self.say(GREETING).await,
            OperatorMessage::Text(_) => self.say(NO_TRANSACTION_WAITING).await,
        }
    }

    /// Best-effort acknowledgement; a lost ack never fails an approval.
    async fn say(&self, text: &str) {
        if let Err(e) = self.notifier.notify(text).await {
            warn!(error = %e, "failed to send message to operator");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_command_is_recognised() {
        assert_eq!(OperatorMessage::parse("/start"), OperatorMessage::Start);
        assert_eq!(OperatorMessage::parse("/start@monoledger_bot"), OperatorMessage::Start);
        assert_eq!(OperatorMessage::parse("/start deep-link"), OperatorMessage::Start);
        assert_eq!(
            OperatorMessage::parse("1 /start"),
            OperatorMessage::Text("1 /start".to_string())
        );
        assert_eq!(
            OperatorMessage::parse("/stats"),
            OperatorMessage::Text("/stats".to_string())
        );
    }

    #[test]
    fn phase_serializes_with_tag() {
        let idle = serde_json::to_string(&Phase::Idle).unwrap();
        assert_eq!(idle, r#"{"phase":"idle"}"#);

        let busy = serde_json::to_string(&Phase::AwaitingReply {
            transaction_id: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(busy, r#"{"phase":"awaiting_reply","transaction_id":"abc"}"#);
    }

    #[test]
    fn queue_depth_tracks_submissions() {
        let (queue, pending) = approval_queue();
        queue.submit(Transaction::new("a", "a", 1)).unwrap();
        queue.submit(Transaction::new("b", "b", 1)).unwrap();
        assert_eq!(queue.depth(), 2);

        drop(pending);
        assert_eq!(
            queue.submit(Transaction::new("c", "c", 1)),
            Err(ApprovalError::QueueClosed)
        );
        assert_eq!(queue.depth(), 2);
    }
}
