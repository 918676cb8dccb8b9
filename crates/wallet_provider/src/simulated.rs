use std::sync::Mutex;

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use shared::{
    domain::{Address, ChainId, Network},
    error::ProviderError,
    protocol::ProviderEvent,
};
use tokio::sync::broadcast;

/// Balance is reported with four decimals: 1.5000 ether +/- 0.0500.
const BASE_BALANCE_TEN_THOUSANDTHS: i64 = 15_000;
const BALANCE_SPREAD_TEN_THOUSANDTHS: i64 = 500;
const WEI_PER_TEN_THOUSANDTH: u128 = 100_000_000_000_000;

/// Stand-in for a relay-based (WalletConnect) session. It performs no
/// handshake: every account request fabricates a fresh address and every
/// balance query perturbs a fixed base amount.
pub struct SimulatedRelayProvider {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl SimulatedRelayProvider {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng_locked<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> Result<T, ProviderError> {
        let mut guard = self
            .rng
            .lock()
            .map_err(|_| ProviderError::Transport("simulated relay rng poisoned".into()))?;
        Ok(f(&mut **guard))
    }
}

impl Default for SimulatedRelayProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::WalletProvider for SimulatedRelayProvider {
    async fn request_accounts(&self) -> Result<Vec<String>, ProviderError> {
        let bytes = self.with_rng_locked(|rng| {
            let mut bytes = [0u8; 20];
            rng.fill_bytes(&mut bytes);
            bytes
        })?;
        Ok(vec![Address::from_bytes(bytes).to_string()])
    }

    async fn get_balance(&self, _address: &Address) -> Result<u128, ProviderError> {
        let offset = self.with_rng_locked(|rng| {
            rng.gen_range(-BALANCE_SPREAD_TEN_THOUSANDTHS..BALANCE_SPREAD_TEN_THOUSANDTHS)
        })?;
        let units = (BASE_BALANCE_TEN_THOUSANDTHS + offset) as u128;
        Ok(units * WEI_PER_TEN_THOUSANDTH)
    }

    async fn get_network(&self) -> Result<Network, ProviderError> {
        Ok(Network::from_chain_id(ChainId(1)))
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }

    fn is_simulated(&self) -> bool {
        true
    }
}
