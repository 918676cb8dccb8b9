use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use shared::domain::{
    format_ether, parse_ether, Address, BlockNumber, ChartPoint, HeatmapCell, Transaction,
    WEI_PER_ETHER,
};

use crate::InsightsError;

pub const DEFAULT_HISTORY_LEN: usize = 20;
const FIRST_BLOCK: u64 = 18_000_000;
const WEI_PER_TEN_THOUSANDTH: u128 = 100_000_000_000_000;

/// Where transaction history for an account comes from.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn recent_transactions(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<Transaction>, InsightsError>;
}

/// Fabricates one outgoing transaction per day, newest first. Stands in for
/// an explorer API until one is wired up.
pub struct SimulatedActivitySource {
    rng: Mutex<Box<dyn RngCore + Send>>,
    anchor: Option<DateTime<Utc>>,
}

impl SimulatedActivitySource {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
            anchor: None,
        }
    }

    /// Deterministic source: fixed seed, history ending at `anchor`.
    pub fn seeded(seed: u64, anchor: DateTime<Utc>) -> Self {
        Self {
            rng: Mutex::new(Box::new(StdRng::seed_from_u64(seed))),
            anchor: Some(anchor),
        }
    }
}

impl Default for SimulatedActivitySource {
    fn default() -> Self {
        Self::new()
    }
}

fn random_hex(rng: &mut dyn RngCore, len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("0x{hex}")
}

#[async_trait]
impl ActivitySource for SimulatedActivitySource {
    async fn recent_transactions(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<Transaction>, InsightsError> {
        let anchor = self.anchor.unwrap_or_else(Utc::now);
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| InsightsError::Source("activity rng poisoned".into()))?;
        let rng: &mut dyn RngCore = &mut **rng;

        let transactions = (0..limit)
            .map(|day| {
                let mut counterparty = [0u8; 20];
                rng.fill_bytes(&mut counterparty);
                let value = rng.gen_range(0..50_000u128) * WEI_PER_TEN_THOUSANDTH;
                Transaction {
                    hash: random_hex(rng, 32),
                    from: address.clone(),
                    to: Address::from_bytes(counterparty),
                    value: format_ether(value),
                    timestamp: anchor - Duration::days(day as i64),
                    block_number: BlockNumber(FIRST_BLOCK + day as u64),
                    gas_used: rng.gen_range(21_000..31_000),
                    gas_price_gwei: rng.gen_range(20..70),
                }
            })
            .collect();
        Ok(transactions)
    }
}

/// Sums transaction value and count per UTC day, oldest day first.
pub fn chart_series(transactions: &[Transaction]) -> Result<Vec<ChartPoint>, InsightsError> {
    let mut days: BTreeMap<String, (u128, u32)> = BTreeMap::new();
    for tx in transactions {
        let wei = parse_ether(&tx.value)?;
        let entry = days
            .entry(tx.timestamp.format("%Y-%m-%d").to_string())
            .or_default();
        entry.0 += wei;
        entry.1 += 1;
    }

    Ok(days
        .into_iter()
        .map(|(date, (wei, count))| ChartPoint {
            date,
            value: wei as f64 / WEI_PER_ETHER as f64,
            count,
        })
        .collect())
}

/// Counts transactions per weekday and UTC hour. Only slots with activity
/// are returned, ordered by weekday then hour.
pub fn activity_heatmap(transactions: &[Transaction]) -> Vec<HeatmapCell> {
    let mut slots: BTreeMap<(u8, u8), u32> = BTreeMap::new();
    for tx in transactions {
        let weekday = tx.timestamp.weekday().num_days_from_monday() as u8;
        let hour = tx.timestamp.hour() as u8;
        *slots.entry((weekday, hour)).or_default() += 1;
    }

    slots
        .into_iter()
        .map(|((weekday, hour), count)| HeatmapCell {
            weekday,
            hour,
            count,
        })
        .collect()
}
