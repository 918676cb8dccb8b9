use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use shared::{
    domain::{ConnectionState, ProviderKind},
    protocol::{parse_chain_id, ProviderEvent},
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};
use wallet_provider::WalletProvider;

use crate::{begin_attempt, SessionEvent, WalletSessionManager};

impl WalletSessionManager {
    /// Starts looking for the host-injected provider. Hosts that announce
    /// their provider are waited on; otherwise the detector is polled a
    /// bounded number of times.
    pub async fn start(self: &Arc<Self>) {
        let task = tokio::spawn(Self::run_detection(Arc::downgrade(self)));
        if let Some(previous) = self.tasks.lock().await.detection.replace(task) {
            previous.abort();
        }
    }

    async fn run_detection(manager: Weak<Self>) {
        let Some(this) = manager.upgrade() else {
            return;
        };
        // Subscribe before the first probe so an injection in between is not missed.
        let announcements = this.detector.announcements();

        if let Some(provider) = this.detector.detect() {
            this.adopt_provider(provider).await;
            return;
        }
        let interval = this.config.detection_interval;
        let attempts = this.config.detection_attempts;
        drop(this);

        if let Some(mut announcements) = announcements {
            debug!("wallet: waiting for provider announcement");
            match announcements.recv().await {
                Ok(provider) => {
                    if let Some(this) = manager.upgrade() {
                        this.adopt_provider(provider).await;
                    }
                }
                Err(err) => warn!("wallet: provider announcements ended: {err}"),
            }
            return;
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        for attempt in 1..=attempts {
            ticker.tick().await;
            let Some(this) = manager.upgrade() else {
                return;
            };
            if this.injected.lock().await.is_some() {
                return;
            }
            if let Some(provider) = this.detector.detect() {
                debug!(attempt, "wallet: provider found by polling");
                this.adopt_provider(provider).await;
                return;
            }
        }
        info!(attempts, "wallet: no injected provider detected; stopped polling");
    }

    pub(crate) async fn adopt_provider(self: &Arc<Self>, provider: Arc<dyn WalletProvider>) {
        {
            let mut injected = self.injected.lock().await;
            if injected.is_some() {
                return;
            }
            *injected = Some(Arc::clone(&provider));
        }
        self.available.send_replace(true);
        let _ = self.events.send(SessionEvent::ProviderAvailability(true));
        info!(simulated = provider.is_simulated(), "wallet: injected provider available");

        if provider.is_simulated() {
            return;
        }
        let Some(events) = provider.subscribe_events() else {
            return;
        };
        let task = self.spawn_provider_event_task(events);
        if let Some(previous) = self.tasks.lock().await.subscription.replace(task) {
            previous.abort();
        }
    }

    fn spawn_provider_event_task(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ProviderEvent>,
    ) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = events.recv().await;
                let Some(this) = manager.upgrade() else {
                    break;
                };
                match event {
                    Ok(ProviderEvent::AccountsChanged(accounts)) => {
                        this.handle_accounts_changed(accounts).await
                    }
                    Ok(ProviderEvent::ChainChanged(raw)) => this.handle_chain_changed(raw).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "wallet: provider event subscriber lagged")
                    }
                    Err(RecvError::Closed) => {
                        debug!("wallet: provider event stream closed");
                        break;
                    }
                }
            }
        })
    }

    async fn connected_through_injected(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.session.connection_state == ConnectionState::Connected
            && guard.session.provider_kind == Some(ProviderKind::MetaMask)
    }

    /// New accounts matter to sessions on the injected provider and to
    /// failed attempts, which the user may have fixed by unlocking.
    async fn follows_injected_accounts(&self) -> bool {
        let guard = self.inner.lock().await;
        match guard.session.connection_state {
            ConnectionState::Connected => {
                guard.session.provider_kind == Some(ProviderKind::MetaMask)
            }
            ConnectionState::Error => true,
            ConnectionState::Connecting | ConnectionState::Disconnected => false,
        }
    }

    async fn handle_accounts_changed(self: &Arc<Self>, accounts: Vec<String>) {
        info!(count = accounts.len(), "wallet: provider accounts changed");
        if accounts.is_empty() {
            self.disconnect().await;
            return;
        }
        if !self.follows_injected_accounts().await {
            debug!("wallet: accounts changed while not following the injected provider");
            return;
        }
        self.schedule_reconnect(self.config.reconnect_debounce, "accounts changed")
            .await;
    }

    async fn handle_chain_changed(self: &Arc<Self>, raw: String) {
        let chain_id = parse_chain_id(&raw);
        info!(raw = %raw, ?chain_id, "wallet: chain changed; rebuilding session state");
        let _ = self.events.send(SessionEvent::ChainChanged { chain_id, raw });

        // An injected attempt in flight may already hold old-chain data.
        let restarted = {
            let mut guard = self.inner.lock().await;
            let injected_in_flight = guard.session.connection_state == ConnectionState::Connecting
                && guard.attempt == Some(ProviderKind::MetaMask);
            injected_in_flight.then(|| begin_attempt(&mut guard, ProviderKind::MetaMask))
        };

        match restarted {
            Some((generation, connecting)) => {
                self.cancel_pending_reconnect().await;
                debug!(generation, "wallet: restarting in-flight connect on the new chain");
                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    let result = manager
                        .run_attempt(generation, ProviderKind::MetaMask, connecting)
                        .await;
                    if let Err(err) = result {
                        warn!("wallet: connect after chain change failed: {err}");
                    }
                });
            }
            None if self.connected_through_injected().await => {
                self.schedule_reconnect(Duration::ZERO, "chain changed").await;
            }
            None => {}
        }
    }

    /// Replaces any pending reconnect. Bursts of provider notifications
    /// collapse into one reconnect after `delay`.
    async fn schedule_reconnect(self: &Arc<Self>, delay: Duration, reason: &'static str) {
        let manager = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            // Aborting this task must only cancel the wait, never an attempt in progress.
            tokio::spawn(async move {
                debug!(reason, "wallet: reconnecting injected provider");
                if let Err(err) = manager.connect(ProviderKind::MetaMask).await {
                    warn!(reason, "wallet: reconnect failed: {err}");
                }
            });
        });
        if let Some(previous) = self.tasks.lock().await.pending_reconnect.replace(task) {
            previous.abort();
        }
    }

    pub(crate) async fn cancel_pending_reconnect(&self) {
        if let Some(pending) = self.tasks.lock().await.pending_reconnect.take() {
            pending.abort();
        }
    }
}
