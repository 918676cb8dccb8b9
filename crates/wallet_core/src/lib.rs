use std::{future::Future, sync::Arc, time::Duration};

use shared::{
    domain::{format_ether, Address, ChainId, ConnectionState, ProviderKind, WalletSession},
    error::{ConnectStep, ProviderError, WalletError},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use wallet_provider::{ProviderDetector, SimulatedRelayProvider, WalletProvider};

mod background;

pub const DEFAULT_ACCOUNT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BALANCE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECONNECT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DETECTION_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub account_request_timeout: Duration,
    pub balance_timeout: Duration,
    pub network_timeout: Duration,
    pub reconnect_debounce: Duration,
    pub detection_interval: Duration,
    pub detection_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            account_request_timeout: DEFAULT_ACCOUNT_REQUEST_TIMEOUT,
            balance_timeout: DEFAULT_BALANCE_TIMEOUT,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            reconnect_debounce: DEFAULT_RECONNECT_DEBOUNCE,
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            detection_attempts: DEFAULT_DETECTION_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(WalletSession),
    ProviderAvailability(bool),
    /// Derived state is being rebuilt for a different chain.
    ChainChanged {
        chain_id: Option<ChainId>,
        raw: String,
    },
    Error(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("a connection attempt is already in flight")]
    AttemptInFlight,
    #[error("wallet is not connected")]
    NotConnected,
    #[error("connection attempt was superseded by a newer session change")]
    Superseded,
}

struct SessionState {
    session: WalletSession,
    /// Bumped by every connect attempt and every disconnect. Results from an
    /// older generation are discarded.
    generation: u64,
    /// Provider kind of the latest connect attempt.
    attempt: Option<ProviderKind>,
    provider: Option<Arc<dyn WalletProvider>>,
}

#[derive(Default)]
struct BackgroundTasks {
    detection: Option<JoinHandle<()>>,
    subscription: Option<JoinHandle<()>>,
    pending_reconnect: Option<JoinHandle<()>>,
}

struct Established {
    address: Address,
    balance: String,
    network: String,
}

/// Owns the connection lifecycle to a wallet provider and keeps the session
/// consistent with provider-emitted events. Presentation code reads
/// snapshots and triggers actions; it never mutates the session.
pub struct WalletSessionManager {
    config: SessionConfig,
    detector: Arc<dyn ProviderDetector>,
    relay: Arc<dyn WalletProvider>,
    injected: Mutex<Option<Arc<dyn WalletProvider>>>,
    inner: Mutex<SessionState>,
    tasks: Mutex<BackgroundTasks>,
    available: watch::Sender<bool>,
    events: broadcast::Sender<SessionEvent>,
}

/// Opens a new connect generation. Anything still running for an older
/// generation will find its result discarded.
fn begin_attempt(state: &mut SessionState, kind: ProviderKind) -> (u64, WalletSession) {
    state.generation += 1;
    state.attempt = Some(kind);
    state.provider = None;
    state.session = WalletSession {
        connection_state: ConnectionState::Connecting,
        ..WalletSession::default()
    };
    (state.generation, state.session.clone())
}

async fn bounded<T>(
    step: ConnectStep,
    limit: Duration,
    request: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, WalletError> {
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result.map_err(WalletError::from),
        Err(_) => Err(WalletError::Timeout { step }),
    }
}

impl WalletSessionManager {
    pub fn new(detector: Arc<dyn ProviderDetector>) -> Arc<Self> {
        Self::new_with_dependencies(
            SessionConfig::default(),
            detector,
            Arc::new(SimulatedRelayProvider::new()),
        )
    }

    pub fn new_with_dependencies(
        config: SessionConfig,
        detector: Arc<dyn ProviderDetector>,
        relay: Arc<dyn WalletProvider>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let (available, _) = watch::channel(false);
        Arc::new(Self {
            config,
            detector,
            relay,
            injected: Mutex::new(None),
            inner: Mutex::new(SessionState {
                session: WalletSession::default(),
                generation: 0,
                attempt: None,
                provider: None,
            }),
            tasks: Mutex::new(BackgroundTasks::default()),
            available,
            events,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> WalletSession {
        self.inner.lock().await.session.clone()
    }

    pub fn provider_available(&self) -> bool {
        *self.available.borrow()
    }

    pub fn watch_provider_available(&self) -> watch::Receiver<bool> {
        self.available.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn publish(&self, session: WalletSession) {
        let _ = self.events.send(SessionEvent::StateChanged(session));
    }

    async fn provider_for(self: &Arc<Self>, kind: ProviderKind) -> Option<Arc<dyn WalletProvider>> {
        match kind {
            ProviderKind::MetaMask => self.injected_provider().await,
            ProviderKind::WalletConnect => Some(Arc::clone(&self.relay)),
        }
    }

    async fn injected_provider(self: &Arc<Self>) -> Option<Arc<dyn WalletProvider>> {
        if let Some(provider) = self.injected.lock().await.clone() {
            return Some(provider);
        }
        let provider = self.detector.detect()?;
        self.adopt_provider(Arc::clone(&provider)).await;
        Some(provider)
    }

    pub async fn connect(self: &Arc<Self>, kind: ProviderKind) -> Result<WalletSession, SessionError> {
        let (generation, connecting) = {
            let mut guard = self.inner.lock().await;
            if guard.session.connection_state == ConnectionState::Connecting {
                warn!(%kind, "wallet: connect rejected, another attempt is in flight");
                return Err(SessionError::AttemptInFlight);
            }
            begin_attempt(&mut guard, kind)
        };
        self.run_attempt(generation, kind, connecting).await
    }

    async fn run_attempt(
        self: &Arc<Self>,
        generation: u64,
        kind: ProviderKind,
        connecting: WalletSession,
    ) -> Result<WalletSession, SessionError> {
        self.publish(connecting);
        info!(%kind, generation, "wallet: connecting");

        let outcome = match self.provider_for(kind).await {
            Some(provider) => {
                let established = self.establish(provider.as_ref()).await;
                established.map(|established| (provider, established))
            }
            None => Err(WalletError::NoProvider),
        };

        self.finish_connect(generation, kind, outcome).await
    }

    async fn establish(&self, provider: &dyn WalletProvider) -> Result<Established, WalletError> {
        let accounts = bounded(
            ConnectStep::RequestAccounts,
            self.config.account_request_timeout,
            provider.request_accounts(),
        )
        .await?;
        let primary = accounts.first().ok_or(WalletError::NoAccounts)?;
        let address = Address::parse(primary)?;

        let wei = bounded(
            ConnectStep::FetchBalance,
            self.config.balance_timeout,
            provider.get_balance(&address),
        )
        .await?;
        let network = bounded(
            ConnectStep::FetchNetwork,
            self.config.network_timeout,
            provider.get_network(),
        )
        .await?;

        Ok(Established {
            address,
            balance: format_ether(wei),
            network: network.label(),
        })
    }

    async fn finish_connect(
        &self,
        generation: u64,
        kind: ProviderKind,
        outcome: Result<(Arc<dyn WalletProvider>, Established), WalletError>,
    ) -> Result<WalletSession, SessionError> {
        let mut guard = self.inner.lock().await;
        if guard.generation != generation {
            debug!(
                %kind,
                generation,
                current = guard.generation,
                "wallet: discarding result of superseded connect attempt"
            );
            return Err(SessionError::Superseded);
        }

        match outcome {
            Ok((provider, established)) => {
                guard.provider = Some(provider);
                guard.session = WalletSession {
                    address: Some(established.address),
                    balance: Some(established.balance),
                    network: Some(established.network),
                    provider_kind: Some(kind),
                    connection_state: ConnectionState::Connected,
                    last_error: None,
                };
                let session = guard.session.clone();
                drop(guard);
                info!(
                    %kind,
                    address = ?session.address,
                    network = ?session.network,
                    "wallet: connected"
                );
                self.publish(session.clone());
                Ok(session)
            }
            Err(err) => {
                guard.provider = None;
                guard.session = WalletSession {
                    connection_state: ConnectionState::Error,
                    last_error: Some(err.to_string()),
                    ..WalletSession::default()
                };
                let session = guard.session.clone();
                drop(guard);
                warn!(%kind, code = ?err.code(), "wallet: connect failed: {err}");
                self.publish(session);
                let _ = self.events.send(SessionEvent::Error(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Resets the session and drops the provider handle. Calling it on an
    /// already disconnected session changes nothing.
    pub async fn disconnect(&self) {
        self.cancel_pending_reconnect().await;

        let session = {
            let mut guard = self.inner.lock().await;
            if guard.session == WalletSession::default() && guard.provider.is_none() {
                return;
            }
            guard.generation += 1;
            guard.attempt = None;
            guard.provider = None;
            guard.session = WalletSession::default();
            guard.session.clone()
        };
        info!("wallet: disconnected");
        self.publish(session);
    }

    pub async fn refresh_balance(&self) -> Result<WalletSession, SessionError> {
        let (generation, provider, address) = {
            let guard = self.inner.lock().await;
            if guard.session.connection_state != ConnectionState::Connected {
                return Err(SessionError::NotConnected);
            }
            match (guard.provider.clone(), guard.session.address.clone()) {
                (Some(provider), Some(address)) => (guard.generation, provider, address),
                _ => return Err(SessionError::NotConnected),
            }
        };

        let result = bounded(
            ConnectStep::FetchBalance,
            self.config.balance_timeout,
            provider.get_balance(&address),
        )
        .await;

        let mut guard = self.inner.lock().await;
        if guard.generation != generation {
            return Err(SessionError::Superseded);
        }
        match result {
            Ok(wei) => {
                guard.session.balance = Some(format_ether(wei));
                guard.session.last_error = None;
                let session = guard.session.clone();
                drop(guard);
                debug!(balance = ?session.balance, "wallet: balance refreshed");
                self.publish(session.clone());
                Ok(session)
            }
            Err(err) => {
                guard.session.last_error = Some(err.to_string());
                let session = guard.session.clone();
                drop(guard);
                warn!("wallet: balance refresh failed: {err}");
                self.publish(session);
                let _ = self.events.send(SessionEvent::Error(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Stops detection, drops the provider subscription and cancels any
    /// pending reconnect.
    pub async fn shutdown(&self) {
        let handles = {
            let mut tasks = self.tasks.lock().await;
            [
                tasks.detection.take(),
                tasks.subscription.take(),
                tasks.pending_reconnect.take(),
            ]
        };
        for handle in handles.into_iter().flatten() {
            handle.abort();
            let _ = handle.await;
        }
        debug!("wallet: session manager shut down");
    }
}

impl Drop for WalletSessionManager {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        for handle in [
            tasks.detection.take(),
            tasks.subscription.take(),
            tasks.pending_reconnect.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
