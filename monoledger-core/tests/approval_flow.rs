use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use monoledger_core::notify::{ADDED, DISCARDED, EMPTY_REPLY_HINT, GREETING, NO_TRANSACTION_WAITING};
use monoledger_core::{
    approval_queue, ApprovalConfig, ApprovalError, ApprovalWorkflow, LedgerRow, LedgerSink,
    Notifier, OperatorMessage, Phase, Resolution, Transaction,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Captures everything the workflow says to the operator.
struct Chat {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Notifier for Chat {
    async fn notify(&self, text: &str) -> Result<()> {
        self.tx
            .send(text.to_string())
            .map_err(|_| anyhow!("chat closed"))
    }
}

struct DeadChat;

#[async_trait]
impl Notifier for DeadChat {
    async fn notify(&self, _text: &str) -> Result<()> {
        bail!("bot was blocked by the user")
    }
}

#[derive(Default)]
struct MemoryLedger {
    rows: Mutex<Vec<LedgerRow>>,
    broken: AtomicBool,
}

impl MemoryLedger {
    fn rows(&self) -> Vec<LedgerRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerSink for MemoryLedger {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, row: &LedgerRow) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            bail!("quota exceeded");
        }
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}

fn chat() -> (Chat, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Chat { tx }, rx)
}

fn txn(id: &str, description: &str) -> Transaction {
    Transaction::new(id, description, -15000)
        .with_balance(100000)
        .with_time(1_700_000_000)
}

async fn next(chat: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(2), chat.recv())
        .await
        .expect("operator message expected")
        .expect("chat closed")
}

async fn assert_silent(chat: &mut mpsc::UnboundedReceiver<String>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(chat.try_recv().is_err(), "no message expected yet");
}

fn text(s: &str) -> OperatorMessage {
    OperatorMessage::parse(s)
}

#[tokio::test]
async fn edited_description_replaces_original() {
    let (notifier, mut chat) = chat();
    let ledger = Arc::new(MemoryLedger::default());
    let (mut workflow, inbox) =
        ApprovalWorkflow::new(notifier, Arc::clone(&ledger), ApprovalConfig::default());

    inbox.deliver(text("2 Groceries")).unwrap();
    let res = workflow.dispatch(txn("t1", "POS purchase")).await.unwrap();

    let row = match res {
        Resolution::Recorded(row) => row,
        other => panic!("expected a recorded row, got {other:?}"),
    };
    assert_eq!(row.mark.as_char(), '2');
    assert_eq!(row.description, "Groceries");
    assert_eq!(row.original_description, "POS purchase");
    assert_eq!(row.amount.to_string(), "-150");
    assert_eq!(ledger.rows(), vec![row]);

    assert!(next(&mut chat).await.starts_with("💸 POS purchase\n-150₴\n"));
    assert_eq!(next(&mut chat).await, ADDED);
}

#[tokio::test]
async fn bare_mark_keeps_original_description() {
    let (notifier, _chat) = chat();
    let ledger = Arc::new(MemoryLedger::default());
    let (mut workflow, inbox) =
        ApprovalWorkflow::new(notifier, Arc::clone(&ledger), ApprovalConfig::default());

    inbox.deliver(text("1")).unwrap();
    workflow.dispatch(txn("t1", "POS purchase")).await.unwrap();

    let rows = ledger.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].mark.as_char(), '1');
    assert_eq!(rows[0].description, "POS purchase");
}

#[tokio::test]
async fn discard_reply_never_touches_ledger() {
    let (notifier, mut chat) = chat();
    let ledger = Arc::new(MemoryLedger::default());
    let (mut workflow, inbox) =
        ApprovalWorkflow::new(notifier, Arc::clone(&ledger), ApprovalConfig::default());

    inbox.deliver(text("0 not mine")).unwrap();
    let res = workflow.dispatch(txn("t1", "Transfer")).await.unwrap();

    assert_eq!(res, Resolution::Discarded);
    assert!(ledger.rows().is_empty());
    assert_eq!(workflow.phase(), Phase::Idle);
    next(&mut chat).await;
    assert_eq!(next(&mut chat).await, DISCARDED);
}

#[tokio::test]
async fn phase_is_awaiting_until_reply_arrives() {
    let (notifier, mut chat) = chat();
    let (mut workflow, inbox) = ApprovalWorkflow::new(
        notifier,
        Arc::new(MemoryLedger::default()),
        ApprovalConfig::default(),
    );
    let mut phase = workflow.subscribe();

    let task = tokio::spawn(async move { workflow.dispatch(txn("abc", "Coffee")).await });

    next(&mut chat).await;
    assert_eq!(
        *phase.borrow_and_update(),
        Phase::AwaitingReply {
            transaction_id: "abc".to_string()
        }
    );

    inbox.deliver(text("1")).unwrap();
    assert!(matches!(task.await.unwrap(), Ok(Resolution::Recorded(_))));
    assert_eq!(*phase.borrow(), Phase::Idle);
}

#[tokio::test]
async fn second_transaction_waits_for_first_resolution() {
    let (notifier, mut chat) = chat();
    let ledger = Arc::new(MemoryLedger::default());
    let (workflow, inbox) =
        ApprovalWorkflow::new(notifier, Arc::clone(&ledger), ApprovalConfig::default());
    let (queue, pending) = approval_queue();
    let worker = tokio::spawn(workflow.run(pending));

    queue.submit(txn("A", "Coffee")).unwrap();
    queue.submit(txn("B", "Taxi")).unwrap();

    assert!(next(&mut chat).await.starts_with("💸 Coffee"));
    assert_silent(&mut chat).await;
    assert_eq!(queue.depth(), 1);

    inbox.deliver(text("1")).unwrap();
    assert_eq!(next(&mut chat).await, ADDED);
    assert!(next(&mut chat).await.starts_with("💸 Taxi"));
    assert_eq!(ledger.rows().len(), 1);

    inbox.deliver(text("0")).unwrap();
    assert_eq!(next(&mut chat).await, DISCARDED);

    drop(queue);
    worker.await.unwrap().unwrap();
    assert_eq!(ledger.rows().len(), 1);
}

#[tokio::test]
async fn idle_messages_get_fixed_answers() {
    let (notifier, mut chat) = chat();
    let (workflow, inbox) = ApprovalWorkflow::new(
        notifier,
        Arc::new(MemoryLedger::default()),
        ApprovalConfig::default(),
    );
    let (queue, pending) = approval_queue();
    let worker = tokio::spawn(workflow.run(pending));

    inbox.deliver(text("2 Lunch")).unwrap();
    assert_eq!(next(&mut chat).await, NO_TRANSACTION_WAITING);

    inbox.deliver(text("/start")).unwrap();
    assert_eq!(next(&mut chat).await, GREETING);

    drop(queue);
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn start_and_empty_text_are_not_replies() {
    let (notifier, mut chat) = chat();
    let ledger = Arc::new(MemoryLedger::default());
    let (mut workflow, inbox) =
        ApprovalWorkflow::new(notifier, Arc::clone(&ledger), ApprovalConfig::default());

    inbox.deliver(text("/start")).unwrap();
    inbox.deliver(text("  ")).unwrap();
    inbox.deliver(text("3 Rent")).unwrap();
    workflow.dispatch(txn("t1", "Transfer to landlord")).await.unwrap();

    next(&mut chat).await;
    assert_eq!(next(&mut chat).await, GREETING);
    assert_eq!(next(&mut chat).await, EMPTY_REPLY_HINT);
    assert_eq!(next(&mut chat).await, ADDED);

    let rows = ledger.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].mark.as_char(), '3');
    assert_eq!(rows[0].description, "Rent");
}

#[tokio::test]
async fn unanswered_prompt_times_out() {
    let (notifier, mut chat) = chat();
    let ledger = Arc::new(MemoryLedger::default());
    let config = ApprovalConfig {
        reply_timeout: Some(Duration::from_millis(30)),
        ..ApprovalConfig::default()
    };
    let (mut workflow, _inbox) = ApprovalWorkflow::new(notifier, Arc::clone(&ledger), config);

    let res = workflow.dispatch(txn("t1", "Coffee")).await.unwrap();

    assert_eq!(res, Resolution::TimedOut);
    assert_eq!(workflow.phase(), Phase::Idle);
    assert!(ledger.rows().is_empty());
    next(&mut chat).await;
    assert_eq!(next(&mut chat).await, "⌛ No answer for \"Coffee\", skipped");
}

#[tokio::test]
async fn ledger_failure_is_reported_and_queue_keeps_moving() {
    let (notifier, mut chat) = chat();
    let ledger = Arc::new(MemoryLedger::default());
    ledger.broken.store(true, Ordering::SeqCst);
    let (workflow, inbox) =
        ApprovalWorkflow::new(notifier, Arc::clone(&ledger), ApprovalConfig::default());
    let mut phase = workflow.subscribe();
    let (queue, pending) = approval_queue();
    let worker = tokio::spawn(workflow.run(pending));

    queue.submit(txn("A", "Coffee")).unwrap();
    queue.submit(txn("B", "Taxi")).unwrap();

    next(&mut chat).await;
    inbox.deliver(text("1")).unwrap();
    let failure = next(&mut chat).await;
    assert!(failure.contains("quota exceeded"), "{failure}");

    ledger.broken.store(false, Ordering::SeqCst);
    assert!(next(&mut chat).await.starts_with("💸 Taxi"));
    inbox.deliver(text("2")).unwrap();
    assert_eq!(next(&mut chat).await, ADDED);
    assert_eq!(ledger.rows().len(), 1);

    drop(queue);
    worker.await.unwrap().unwrap();
    assert_eq!(*phase.borrow_and_update(), Phase::Idle);
}

#[tokio::test]
async fn failed_notification_releases_the_workflow() {
    let (mut workflow, inbox) = ApprovalWorkflow::new(
        DeadChat,
        Arc::new(MemoryLedger::default()),
        ApprovalConfig::default(),
    );

    let err = workflow.dispatch(txn("t1", "Coffee")).await.unwrap_err();
    assert!(matches!(err, ApprovalError::Notify { ref id, .. } if id == "t1"));
    assert_eq!(workflow.phase(), Phase::Idle);
    drop(inbox);
}

#[tokio::test]
async fn closed_inbox_aborts_dispatch() {
    let (notifier, _chat) = chat();
    let (mut workflow, inbox) = ApprovalWorkflow::new(
        notifier,
        Arc::new(MemoryLedger::default()),
        ApprovalConfig::default(),
    );
    drop(inbox);

    let err = workflow.dispatch(txn("t1", "Coffee")).await.unwrap_err();
    assert_eq!(err, ApprovalError::InboxClosed);
    assert_eq!(workflow.phase(), Phase::Idle);
}
