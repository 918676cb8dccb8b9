use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shared::{
    domain::{Address, Network},
    error::ProviderError,
    protocol::ProviderEvent,
};
use tokio::sync::broadcast;

mod json_rpc;
mod simulated;

pub use json_rpc::JsonRpcProvider;
pub use simulated::SimulatedRelayProvider;

/// The capability set the session manager needs from a wallet backend.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Asks the wallet for account access. May prompt the user.
    async fn request_accounts(&self) -> Result<Vec<String>, ProviderError>;
    /// Native balance of `address`, in wei.
    async fn get_balance(&self, address: &Address) -> Result<u128, ProviderError>;
    async fn get_network(&self) -> Result<Network, ProviderError>;
    /// Subscribes to provider notifications. Dropping the receiver unsubscribes.
    /// `None` means this provider never emits events.
    fn subscribe_events(&self) -> Option<broadcast::Receiver<ProviderEvent>>;
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Source of the host-injected wallet provider, if one is present.
pub trait ProviderDetector: Send + Sync {
    fn detect(&self) -> Option<Arc<dyn WalletProvider>>;

    /// Explicit "provider available" notifications. Hosts that cannot emit
    /// them return `None` and callers fall back to polling [`Self::detect`].
    fn announcements(&self) -> Option<broadcast::Receiver<Arc<dyn WalletProvider>>> {
        None
    }
}

pub struct MissingProviderDetector;

impl ProviderDetector for MissingProviderDetector {
    fn detect(&self) -> Option<Arc<dyn WalletProvider>> {
        None
    }
}

/// Detector for hosts that have their provider at hand from the start.
pub struct StaticDetector {
    provider: Arc<dyn WalletProvider>,
}

impl StaticDetector {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self { provider }
    }
}

impl ProviderDetector for StaticDetector {
    fn detect(&self) -> Option<Arc<dyn WalletProvider>> {
        Some(Arc::clone(&self.provider))
    }
}

/// Slot a host fills once its wallet provider shows up, possibly after the
/// session manager has started.
pub struct InjectionSlot {
    provider: Mutex<Option<Arc<dyn WalletProvider>>>,
    announcements: Option<broadcast::Sender<Arc<dyn WalletProvider>>>,
}

impl InjectionSlot {
    /// A slot that can only be discovered by polling.
    pub fn polled() -> Self {
        Self {
            provider: Mutex::new(None),
            announcements: None,
        }
    }

    /// A slot that announces the provider as soon as it is injected.
    pub fn announcing() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self {
            provider: Mutex::new(None),
            announcements: Some(tx),
        }
    }

    pub fn inject(&self, provider: Arc<dyn WalletProvider>) {
        if let Ok(mut slot) = self.provider.lock() {
            *slot = Some(Arc::clone(&provider));
        }
        if let Some(tx) = &self.announcements {
            let _ = tx.send(provider);
        }
    }
}

impl ProviderDetector for InjectionSlot {
    fn detect(&self) -> Option<Arc<dyn WalletProvider>> {
        self.provider.lock().ok().and_then(|slot| slot.clone())
    }

    fn announcements(&self) -> Option<broadcast::Receiver<Arc<dyn WalletProvider>>> {
        self.announcements.as_ref().map(broadcast::Sender::subscribe)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
