use serde::{Deserialize, Serialize};
use shared::{
    domain::{ChartPoint, HeatmapCell, RiskScore, Transaction, WalletSession},
    error::InvalidAmount,
};
use thiserror::Error;
use tracing::debug;

mod activity;
mod risk;

pub use activity::{
    activity_heatmap, chart_series, ActivitySource, SimulatedActivitySource, DEFAULT_HISTORY_LEN,
};
pub use risk::{assess, risk_level, score_address, RiskSignals, SimulatedRiskSignals};

#[derive(Debug, Error)]
pub enum InsightsError {
    #[error("activity source unavailable: {0}")]
    Source(String),
    #[error(transparent)]
    Amount(#[from] InvalidAmount),
}

/// Everything the dashboard shows next to a connected wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletInsights {
    pub transactions: Vec<Transaction>,
    pub chart: Vec<ChartPoint>,
    pub heatmap: Vec<HeatmapCell>,
    pub risk: RiskScore,
}

/// Builds insights for the session's account. Returns `None` when no
/// account is connected.
pub async fn gather(
    session: &WalletSession,
    activity: &dyn ActivitySource,
    signals: &dyn RiskSignals,
    history_len: usize,
) -> Result<Option<WalletInsights>, InsightsError> {
    let Some(address) = session.address.as_ref().filter(|_| session.is_connected()) else {
        return Ok(None);
    };

    let transactions = activity.recent_transactions(address, history_len).await?;
    let chart = chart_series(&transactions)?;
    let heatmap = activity_heatmap(&transactions);
    let balance = match session.balance.as_deref() {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| InvalidAmount(raw.to_string()))?,
        None => 0.0,
    };
    let risk = score_address(signals, address, transactions.len(), balance).await;
    debug!(
        address = %address,
        transactions = transactions.len(),
        score = risk.score,
        "insights: gathered"
    );

    Ok(Some(WalletInsights {
        transactions,
        chart,
        heatmap,
        risk,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::domain::{Address, ConnectionState, ProviderKind, RiskLevel};

    fn connected(balance: &str) -> WalletSession {
        WalletSession {
            address: Some(Address::from_bytes([0x55; 20])),
            balance: Some(balance.to_string()),
            network: Some("mainnet".into()),
            provider_kind: Some(ProviderKind::MetaMask),
            connection_state: ConnectionState::Connected,
            last_error: None,
        }
    }

    fn sources() -> (SimulatedActivitySource, SimulatedRiskSignals) {
        let anchor = Utc
            .with_ymd_and_hms(2024, 1, 31, 8, 0, 0)
            .single()
            .expect("anchor");
        (
            SimulatedActivitySource::seeded(1, anchor),
            SimulatedRiskSignals::seeded(1),
        )
    }

    #[tokio::test]
    async fn gather_returns_none_without_connected_account() {
        let (activity, signals) = sources();
        let insights = gather(&WalletSession::default(), &activity, &signals, 20)
            .await
            .expect("gather");
        assert!(insights.is_none());
    }

    #[tokio::test]
    async fn gather_builds_history_chart_and_score() {
        let (activity, signals) = sources();
        let insights = gather(&connected("2.5"), &activity, &signals, DEFAULT_HISTORY_LEN)
            .await
            .expect("gather")
            .expect("connected");

        assert_eq!(insights.transactions.len(), DEFAULT_HISTORY_LEN);
        assert_eq!(insights.chart.len(), DEFAULT_HISTORY_LEN);
        assert!(insights.chart.windows(2).all(|w| w[0].date < w[1].date));
        let heat_total: u32 = insights.heatmap.iter().map(|cell| cell.count).sum();
        assert_eq!(heat_total as usize, DEFAULT_HISTORY_LEN);
        assert!(insights.heatmap.iter().all(|cell| cell.weekday < 7 && cell.hour < 24));
        assert_eq!(insights.risk.factors.transaction_count, DEFAULT_HISTORY_LEN);
        assert_eq!(insights.risk.factors.balance, 2.5);
        assert!(insights.risk.score <= 100);
        assert_eq!(insights.risk.level, risk_level(insights.risk.score));

        let json = serde_json::to_value(&insights).expect("json");
        assert!(json["risk"]["level"].is_string());
        assert!(json["heatmap"].is_array());
    }

    #[tokio::test]
    async fn dust_balance_raises_the_score() {
        let (activity, signals) = sources();
        let rich = gather(&connected("20.0"), &activity, &signals, 20)
            .await
            .expect("gather")
            .expect("connected");
        let (activity, signals) = sources();
        let dust = gather(&connected("0.001"), &activity, &signals, 20)
            .await
            .expect("gather")
            .expect("connected");
        assert_eq!(dust.risk.score, rich.risk.score + 20);
        assert_ne!(dust.risk.level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn unparseable_balance_is_an_error() {
        let (activity, signals) = sources();
        let err = gather(&connected("n/a"), &activity, &signals, 5)
            .await
            .expect_err("bad balance");
        assert!(matches!(err, InsightsError::Amount(_)));
    }
}
