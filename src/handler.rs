//! Inbound event handler.
//!
//! A background task consumes `IBEvent`s from the reader channel and applies
//! them to a table of pending requests. Each pending request owns a oneshot
//! sender and the data collected so far; the matching end marker hands the
//! data back to the waiting caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use acct_fetch_ibapi::IBEvent;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::errors::{FetchError, Result};
use crate::models::{AccountSnapshot, AccountSummary, AccountSummaryRecord, PortfolioEntry, PositionRecord};
use crate::severity::{ErrorCodeTable, Severity};

/// Request id the server uses for errors not tied to a request.
const SYSTEM_REQ_ID: i32 = -1;

// ============================================================================
// Pending request types
// ============================================================================

/// Identifies what a pending entry is waiting for. Positions and account
/// updates carry no request id on the wire, so they get their own keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Handshake,
    Summary(i32),
    Positions,
    AccountUpdates,
}

enum PendingRequest {
    /// Waiting for NextValidId.
    Handshake { tx: oneshot::Sender<Result<i64>> },
    /// Waiting for AccountSummary events + AccountSummaryEnd.
    AccountSummary {
        tx: oneshot::Sender<Result<AccountSummary>>,
        data: AccountSummary,
    },
    /// Waiting for Position events + PositionEnd.
    Positions {
        tx: oneshot::Sender<Result<Vec<PositionRecord>>>,
        data: Vec<PositionRecord>,
    },
    /// Waiting for account values and portfolio lines + AccountDownloadEnd.
    AccountUpdates {
        tx: oneshot::Sender<Result<AccountSnapshot>>,
        data: AccountSnapshot,
    },
}

impl PendingRequest {
    fn fail(self, err: FetchError) {
        match self {
            PendingRequest::Handshake { tx } => {
                let err = match err {
                    FetchError::Protocol { code, message } => {
                        FetchError::Connection(format!("handshake rejected with error {code}: {message}"))
                    }
                    other => other,
                };
                let _ = tx.send(Err(err));
            }
            PendingRequest::AccountSummary { tx, .. } => {
                let _ = tx.send(Err(err));
            }
            PendingRequest::Positions { tx, .. } => {
                let _ = tx.send(Err(err));
            }
            PendingRequest::AccountUpdates { tx, .. } => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

// ============================================================================
// Shared state updated by the handler task
// ============================================================================

/// Everything the handler task shares with callers, behind one lock.
#[derive(Default)]
struct PendingTable {
    requests: HashMap<PendingKey, PendingRequest>,
    managed_accounts: Vec<String>,
    /// Set once the connection is gone; later registrations fail at once.
    closed: bool,
}

impl PendingTable {
    fn fail_all(&mut self, err: &FetchError) {
        for (key, req) in self.requests.drain() {
            tracing::debug!(?key, "failing pending request: {err}");
            req.fail(err.clone());
        }
    }
}

struct SharedState {
    pending: Mutex<PendingTable>,
    next_order_id: AtomicI64,
    errors: ErrorCodeTable,
}

// ============================================================================
// EventHandler
// ============================================================================

/// Handle to the running inbound handler task.
pub struct EventHandler {
    state: Arc<SharedState>,
    handle: JoinHandle<()>,
}

impl EventHandler {
    /// Spawn the handler over the reader's event channel.
    ///
    /// The handshake entry is registered before the task starts, so a
    /// `NextValidId` already queued on the channel is never missed. The
    /// returned receiver resolves with the announced next order id.
    pub fn spawn(
        rx: mpsc::UnboundedReceiver<IBEvent>,
        errors: ErrorCodeTable,
    ) -> (Self, oneshot::Receiver<Result<i64>>) {
        let (tx, handshake_rx) = oneshot::channel();
        let mut table = PendingTable::default();
        table
            .requests
            .insert(PendingKey::Handshake, PendingRequest::Handshake { tx });

        let state = Arc::new(SharedState {
            pending: Mutex::new(table),
            next_order_id: AtomicI64::new(0),
            errors,
        });

        let handle = spawn_event_processor(rx, Arc::clone(&state));
        (Self { state, handle }, handshake_rx)
    }

    pub async fn expect_account_summary(&self, req_id: i32) -> oneshot::Receiver<Result<AccountSummary>> {
        let (tx, rx) = oneshot::channel();
        self.register(
            PendingKey::Summary(req_id),
            PendingRequest::AccountSummary {
                tx,
                data: AccountSummary::new(),
            },
        )
        .await;
        rx
    }

    pub async fn expect_positions(&self) -> oneshot::Receiver<Result<Vec<PositionRecord>>> {
        let (tx, rx) = oneshot::channel();
        self.register(
            PendingKey::Positions,
            PendingRequest::Positions { tx, data: Vec::new() },
        )
        .await;
        rx
    }

    pub async fn expect_account_updates(&self, account: &str) -> oneshot::Receiver<Result<AccountSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.register(
            PendingKey::AccountUpdates,
            PendingRequest::AccountUpdates {
                tx,
                data: AccountSnapshot::new(account),
            },
        )
        .await;
        rx
    }

    async fn register(&self, key: PendingKey, req: PendingRequest) {
        let mut table = self.state.pending.lock().await;
        if table.closed {
            req.fail(FetchError::Connection("connection closed".into()));
            return;
        }
        if table.requests.insert(key, req).is_some() {
            tracing::warn!(?key, "replaced an outstanding request");
        }
    }

    /// Drop a pending entry, e.g. after its caller timed out.
    pub async fn forget(&self, key: PendingKey) {
        self.state.pending.lock().await.requests.remove(&key);
    }

    pub async fn managed_accounts(&self) -> Vec<String> {
        self.state.pending.lock().await.managed_accounts.clone()
    }

    pub fn next_order_id(&self) -> i64 {
        self.state.next_order_id.load(Ordering::SeqCst)
    }

    /// Wait for the task to finish. It exits once the reader drops its end
    /// of the channel.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!("event handler task failed: {e}");
        }
    }
}

// ============================================================================
// Event Processor
// ============================================================================

fn spawn_event_processor(mut rx: mpsc::UnboundedReceiver<IBEvent>, state: Arc<SharedState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            process_event(event, &state).await;
        }
        tracing::debug!("event handler exiting (channel closed)");

        let mut table = state.pending.lock().await;
        table.closed = true;
        table.fail_all(&FetchError::Connection("event channel closed".into()));
    })
}

async fn process_event(event: IBEvent, state: &SharedState) {
    match event {
        // -- Connection --
        IBEvent::NextValidId { order_id } => {
            state.next_order_id.store(order_id, Ordering::SeqCst);
            tracing::debug!("next valid order id: {order_id}");
            let mut table = state.pending.lock().await;
            if let Some(PendingRequest::Handshake { tx }) = table.requests.remove(&PendingKey::Handshake) {
                let _ = tx.send(Ok(order_id));
            }
        }

        IBEvent::ManagedAccounts { accounts } => {
            let list: Vec<String> = accounts
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            tracing::info!("managed accounts: {}", list.join(", "));
            state.pending.lock().await.managed_accounts = list;
        }

        IBEvent::Error {
            req_id,
            code,
            message,
            ..
        } => handle_error(req_id, code, message, state).await,

        IBEvent::ReaderError { message } => {
            tracing::error!("{message}");
            state.pending.lock().await.fail_all(&FetchError::Connection(message));
        }

        IBEvent::ConnectionClosed => {
            let mut table = state.pending.lock().await;
            table.closed = true;
            if table.requests.is_empty() {
                tracing::info!("connection closed");
            } else {
                tracing::warn!("connection closed with {} request(s) outstanding", table.requests.len());
                table.fail_all(&FetchError::Connection("connection closed by server".into()));
            }
        }

        // -- Account Summary --
        IBEvent::AccountSummary {
            req_id,
            account,
            tag,
            value,
            currency,
        } => {
            let mut table = state.pending.lock().await;
            match table.requests.get_mut(&PendingKey::Summary(req_id)) {
                Some(PendingRequest::AccountSummary { data, .. }) => {
                    data.insert(AccountSummaryRecord {
                        account,
                        tag,
                        value,
                        currency,
                    });
                }
                _ => tracing::debug!(req_id, "account summary row for unknown request"),
            }
        }

        IBEvent::AccountSummaryEnd { req_id } => {
            let mut table = state.pending.lock().await;
            if let Some(PendingRequest::AccountSummary { tx, data }) =
                table.requests.remove(&PendingKey::Summary(req_id))
            {
                tracing::debug!(req_id, rows = data.len(), "account summary complete");
                let _ = tx.send(Ok(data));
            }
        }

        // -- Positions --
        IBEvent::Position {
            account,
            contract,
            position,
            avg_cost,
        } => {
            let mut table = state.pending.lock().await;
            if let Some(PendingRequest::Positions { data, .. }) = table.requests.get_mut(&PendingKey::Positions) {
                data.push(PositionRecord::new(account, &contract, position, avg_cost));
            }
        }

        IBEvent::PositionEnd => {
            let mut table = state.pending.lock().await;
            if let Some(PendingRequest::Positions { tx, data }) = table.requests.remove(&PendingKey::Positions) {
                tracing::debug!(count = data.len(), "positions complete");
                let _ = tx.send(Ok(data));
            }
        }

        // -- Account Updates --
        IBEvent::UpdateAccountValue {
            key,
            value,
            currency,
            account_name,
        } => {
            let mut table = state.pending.lock().await;
            if let Some(PendingRequest::AccountUpdates { data, .. }) =
                table.requests.get_mut(&PendingKey::AccountUpdates)
            {
                if data.account.is_empty() {
                    data.account = account_name;
                }
                data.set_value(key, value, currency);
            }
        }

        IBEvent::UpdatePortfolio {
            contract,
            position,
            market_price,
            market_value,
            average_cost,
            unrealized_pnl,
            realized_pnl,
            account_name,
        } => {
            let mut table = state.pending.lock().await;
            if let Some(PendingRequest::AccountUpdates { data, .. }) =
                table.requests.get_mut(&PendingKey::AccountUpdates)
            {
                if data.account.is_empty() {
                    data.account = account_name;
                }
                data.apply_portfolio(PortfolioEntry {
                    symbol: contract.symbol.clone(),
                    sec_type: contract.sec_type_str(),
                    currency: contract.currency.clone(),
                    position,
                    market_price,
                    market_value,
                    average_cost,
                    unrealized_pnl,
                    realized_pnl,
                });
            }
        }

        IBEvent::UpdateAccountTime { timestamp } => {
            let mut table = state.pending.lock().await;
            if let Some(PendingRequest::AccountUpdates { data, .. }) =
                table.requests.get_mut(&PendingKey::AccountUpdates)
            {
                data.updated_at = Some(timestamp);
            }
        }

        IBEvent::AccountDownloadEnd { account } => {
            let mut table = state.pending.lock().await;
            if let Some(PendingRequest::AccountUpdates { tx, mut data }) =
                table.requests.remove(&PendingKey::AccountUpdates)
            {
                if data.account.is_empty() {
                    data.account = account;
                }
                tracing::debug!(account = %data.account, "account download complete");
                let _ = tx.send(Ok(data));
            }
        }

        IBEvent::Unknown { msg_id, .. } => {
            tracing::trace!(msg_id, "ignoring message");
        }
    }
}

async fn handle_error(req_id: i32, code: i32, message: String, state: &SharedState) {
    if state.errors.classify(code) == Severity::Informational {
        tracing::info!("IB notice {code}: {message}");
        return;
    }

    tracing::warn!("IB error: req_id={req_id}, code={code}, msg={message}");

    let err = FetchError::Protocol { code, message };
    let mut table = state.pending.lock().await;
    if req_id == SYSTEM_REQ_ID {
        table.fail_all(&err);
    } else if let Some(req) = table.requests.remove(&PendingKey::Summary(req_id)) {
        req.fail(err);
    }
}
