//! Account data fetcher.
//!
//! Owns one Gateway session: the outbound `IBClient` and the inbound
//! `EventHandler`. Requests are issued one at a time; each registers a
//! pending entry, sends the request, and waits on its oneshot with a timeout.

use std::time::Duration;

use acct_fetch_ibapi::IBClient;
use tokio::sync::oneshot;

use crate::errors::{FetchError, Result};
use crate::handler::{EventHandler, PendingKey};
use crate::models::{AccountSnapshot, AccountSummary, PositionRecord};
use crate::severity::ErrorCodeTable;

/// Tags requested by `request_account_summary`. `$LEDGER:ALL` adds the
/// per-currency balances.
pub const SUMMARY_TAGS: &str =
    "NetLiquidation,TotalCashValue,BuyingPower,AvailableFunds,GrossPositionValue,MaintMarginReq,$LEDGER:ALL";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection and request settings.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub account_group: String,
    pub error_codes: ErrorCodeTable,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4002,
            client_id: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            account_group: "All".into(),
            error_codes: ErrorCodeTable::default(),
        }
    }
}

// ============================================================================
// AccountFetcher
// ============================================================================

pub struct AccountFetcher {
    client: IBClient,
    handler: Option<EventHandler>,
    config: FetcherConfig,
    next_order_id: i64,
}

impl AccountFetcher {
    /// Connect with default timeouts and error table.
    pub async fn connect(host: &str, port: u16, client_id: i32) -> Result<Self> {
        Self::connect_with(FetcherConfig {
            host: host.to_string(),
            port,
            client_id,
            ..FetcherConfig::default()
        })
        .await
    }

    /// Open the socket, run the handshake, and wait for `NEXT_VALID_ID`.
    ///
    /// The whole sequence shares `config.connect_timeout`.
    pub async fn connect_with(config: FetcherConfig) -> Result<Self> {
        let deadline = tokio::time::Instant::now() + config.connect_timeout;
        tracing::info!(
            "Connecting to IB TWS/Gateway at {}:{} (client id {})...",
            config.host,
            config.port,
            config.client_id
        );

        let (mut client, rx) = tokio::time::timeout_at(
            deadline,
            IBClient::connect(&config.host, config.port, config.client_id, None),
        )
        .await
        .map_err(|_| {
            FetchError::Connection(format!(
                "no handshake from {}:{} within {:?}",
                config.host, config.port, config.connect_timeout
            ))
        })?
        .map_err(|e| {
            FetchError::Connection(format!(
                "handshake with {}:{} failed: {e}",
                config.host, config.port
            ))
        })?;

        let (handler, handshake) = EventHandler::spawn(rx, config.error_codes.clone());

        let next_order_id = match tokio::time::timeout_at(deadline, handshake).await {
            Ok(Ok(Ok(order_id))) => order_id,
            outcome => {
                let err = match outcome {
                    Ok(Ok(Err(e))) => e,
                    Ok(Err(_)) => FetchError::Connection("event handler stopped during handshake".into()),
                    _ => FetchError::Connection(format!(
                        "server did not confirm the session within {:?}",
                        config.connect_timeout
                    )),
                };
                client.disconnect().await;
                handler.join().await;
                return Err(err);
            }
        };

        tracing::info!(
            server_version = client.server_version(),
            next_order_id,
            "Connected to IB"
        );

        Ok(Self {
            client,
            handler: Some(handler),
            config,
            next_order_id,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn server_version(&self) -> i32 {
        self.client.server_version()
    }

    pub fn next_order_id(&self) -> i64 {
        self.next_order_id
    }

    pub fn is_connected(&self) -> bool {
        self.handler.is_some() && self.client.is_connected()
    }

    pub async fn managed_accounts(&self) -> Vec<String> {
        match &self.handler {
            Some(handler) => handler.managed_accounts().await,
            None => Vec::new(),
        }
    }

    fn handler(&self) -> Result<&EventHandler> {
        self.handler
            .as_ref()
            .ok_or_else(|| FetchError::Connection("not connected".into()))
    }

    // ========================================================================
    // Account APIs
    // ========================================================================

    /// Collect the account summary for the configured group, then cancel the
    /// subscription.
    pub async fn request_account_summary(&mut self) -> Result<AccountSummary> {
        let req_id = self.client.next_req_id();
        let rx = self.handler()?.expect_account_summary(req_id).await;
        let key = PendingKey::Summary(req_id);

        let group = self.config.account_group.clone();
        if let Err(e) = self.client.req_account_summary(req_id, &group, SUMMARY_TAGS).await {
            self.handler()?.forget(key).await;
            return Err(e.into());
        }

        let result = self.await_completion(key, rx, "account summary").await;

        if let Err(e) = self.client.cancel_account_summary(req_id).await {
            tracing::debug!("cancel_account_summary failed: {e}");
        }
        result
    }

    /// Collect all positions, then cancel the subscription.
    pub async fn request_positions(&mut self) -> Result<Vec<PositionRecord>> {
        let rx = self.handler()?.expect_positions().await;

        if let Err(e) = self.client.req_positions().await {
            self.handler()?.forget(PendingKey::Positions).await;
            return Err(e.into());
        }

        let result = self.await_completion(PendingKey::Positions, rx, "positions").await;

        if let Err(e) = self.client.cancel_positions().await {
            tracing::debug!("cancel_positions failed: {e}");
        }
        result
    }

    /// Subscribe to account updates until the initial download completes,
    /// then unsubscribe. An empty `account` picks the first managed account.
    pub async fn request_account_updates(&mut self, account: &str) -> Result<AccountSnapshot> {
        let account = if account.is_empty() {
            self.managed_accounts().await.into_iter().next().unwrap_or_default()
        } else {
            account.to_string()
        };

        let rx = self.handler()?.expect_account_updates(&account).await;

        if let Err(e) = self.client.req_account_updates(true, &account).await {
            self.handler()?.forget(PendingKey::AccountUpdates).await;
            return Err(e.into());
        }

        let result = self
            .await_completion(PendingKey::AccountUpdates, rx, "account updates")
            .await;

        if let Err(e) = self.client.req_account_updates(false, &account).await {
            tracing::debug!("account updates unsubscribe failed: {e}");
        }
        result
    }

    async fn await_completion<T>(
        &self,
        key: PendingKey,
        rx: oneshot::Receiver<Result<T>>,
        what: &str,
    ) -> Result<T> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FetchError::Connection(format!("{what}: event handler stopped"))),
            Err(_) => {
                self.handler()?.forget(key).await;
                tracing::warn!("{what} request timed out after {timeout:?}");
                Err(FetchError::Timeout(format!("{what} not completed within {timeout:?}")))
            }
        }
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Close the session and wait for the background tasks to finish.
    /// Safe to call more than once, including after a failed request.
    pub async fn disconnect(&mut self) {
        self.client.disconnect().await;
        if let Some(handler) = self.handler.take() {
            handler.join().await;
            tracing::info!("Disconnected from IB");
        }
    }
}
