use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use shared::{
    domain::{Address, Network},
    error::{ProviderError, METHOD_NOT_FOUND_CODE},
    protocol::{parse_chain_id, parse_quantity, ProviderEvent, RpcRequest, RpcResponse},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};

use crate::WalletProvider;

/// Wallet provider that talks EIP-1193 style JSON-RPC to a node or signer
/// over HTTP.
pub struct JsonRpcProvider {
    http: Client,
    rpc_url: String,
    next_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl JsonRpcProvider {
    pub fn new(rpc_url: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            http: Client::new(),
            rpc_url: rpc_url.into(),
            next_id: AtomicU64::new(1),
            events,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        debug!(method, id, url = %self.rpc_url, "rpc: sending request");

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        body.into_result()
    }

    async fn accounts(&self, method: &str) -> Result<Vec<String>, ProviderError> {
        let value = self.call(method, Vec::new()).await?;
        serde_json::from_value(value)
            .map_err(|err| ProviderError::Malformed(format!("{method} result: {err}")))
    }

    async fn chain_id_raw(&self) -> Result<String, ProviderError> {
        match self.call("eth_chainId", Vec::new()).await? {
            Value::String(raw) => Ok(raw),
            other => Err(ProviderError::Malformed(format!(
                "eth_chainId result is not a string: {other}"
            ))),
        }
    }

    /// Polls `eth_chainId` and `eth_accounts` and republishes changes as
    /// provider events. Plain HTTP endpoints cannot push notifications.
    pub fn spawn_change_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let mut last_chain: Option<String> = None;
            let mut last_accounts: Option<Vec<String>> = None;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                match provider.chain_id_raw().await {
                    Ok(chain) => {
                        if last_chain.as_ref().is_some_and(|previous| *previous != chain) {
                            let _ = provider.events.send(ProviderEvent::ChainChanged(chain.clone()));
                        }
                        last_chain = Some(chain);
                    }
                    Err(err) => warn!("rpc: chain watcher failed to read chain id: {err}"),
                }

                match provider.accounts("eth_accounts").await {
                    Ok(accounts) => {
                        if last_accounts
                            .as_ref()
                            .is_some_and(|previous| *previous != accounts)
                        {
                            let _ = provider
                                .events
                                .send(ProviderEvent::AccountsChanged(accounts.clone()));
                        }
                        last_accounts = Some(accounts);
                    }
                    Err(err) => warn!("rpc: chain watcher failed to read accounts: {err}"),
                }
            }
        })
    }
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    async fn request_accounts(&self) -> Result<Vec<String>, ProviderError> {
        match self.accounts("eth_requestAccounts").await {
            Err(ProviderError::Rpc { code, .. }) if code == METHOD_NOT_FOUND_CODE => {
                debug!("rpc: eth_requestAccounts unsupported, falling back to eth_accounts");
                self.accounts("eth_accounts").await
            }
            other => other,
        }
    }

    async fn get_balance(&self, address: &Address) -> Result<u128, ProviderError> {
        match self
            .call("eth_getBalance", vec![json!(address.as_str()), json!("latest")])
            .await?
        {
            Value::String(raw) => parse_quantity(&raw),
            other => Err(ProviderError::Malformed(format!(
                "eth_getBalance result is not a string: {other}"
            ))),
        }
    }

    async fn get_network(&self) -> Result<Network, ProviderError> {
        let raw = self.chain_id_raw().await?;
        let chain_id = parse_chain_id(&raw)
            .ok_or_else(|| ProviderError::Malformed(format!("invalid chain id '{raw}'")))?;
        Ok(Network::from_chain_id(chain_id))
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }
}
