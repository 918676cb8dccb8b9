use std::sync::Mutex;

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use shared::domain::{Address, RiskFactors, RiskLevel, RiskScore};

const BASE_SCORE: i32 = 50;
const FEW_TRANSACTIONS: usize = 5;
const MANY_TRANSACTIONS: usize = 50;
const DUST_BALANCE: f64 = 0.01;
const LARGE_BALANCE: f64 = 10.0;
const YOUNG_ADDRESS_DAYS: u32 = 90;
const MEDIUM_THRESHOLD: u8 = 40;
const HIGH_THRESHOLD: u8 = 70;

/// Per-address signals that feed the risk heuristic.
#[async_trait]
pub trait RiskSignals: Send + Sync {
    async fn suspicious_activity(&self, address: &Address) -> bool;
    async fn address_age_days(&self, address: &Address) -> u32;
}

/// Random signals: 30% chance of suspicious activity, age between 30 and
/// 394 days.
pub struct SimulatedRiskSignals {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl SimulatedRiskSignals {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }
}

impl Default for SimulatedRiskSignals {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RiskSignals for SimulatedRiskSignals {
    async fn suspicious_activity(&self, _address: &Address) -> bool {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>() > 0.7,
            Err(_) => false,
        }
    }

    async fn address_age_days(&self, _address: &Address) -> u32 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(30..395),
            Err(_) => YOUNG_ADDRESS_DAYS,
        }
    }
}

pub fn risk_level(score: u8) -> RiskLevel {
    if score < MEDIUM_THRESHOLD {
        RiskLevel::Low
    } else if score < HIGH_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Heuristic score in `0..=100`. The adjustments are placeholders for a real
/// model; callers should only rely on the bounds and the three bands.
pub fn assess(factors: RiskFactors) -> RiskScore {
    let mut score = BASE_SCORE;

    if factors.transaction_count < FEW_TRANSACTIONS {
        score -= 10;
    } else if factors.transaction_count > MANY_TRANSACTIONS {
        score += 10;
    }

    if factors.balance < DUST_BALANCE {
        score += 15;
    } else if factors.balance > LARGE_BALANCE {
        score -= 5;
    }

    if factors.suspicious_activity {
        score += 20;
    }
    if factors.age_days < YOUNG_ADDRESS_DAYS {
        score += 10;
    }

    let score = score.clamp(0, 100) as u8;
    RiskScore {
        score,
        level: risk_level(score),
        factors,
    }
}

pub async fn score_address(
    signals: &dyn RiskSignals,
    address: &Address,
    transaction_count: usize,
    balance: f64,
) -> RiskScore {
    let suspicious_activity = signals.suspicious_activity(address).await;
    let age_days = signals.address_age_days(address).await;
    assess(RiskFactors {
        transaction_count,
        suspicious_activity,
        age_days,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factors(transaction_count: usize, balance: f64, suspicious: bool, age_days: u32) -> RiskFactors {
        RiskFactors {
            transaction_count,
            suspicious_activity: suspicious,
            age_days,
            balance,
        }
    }

    #[test]
    fn established_quiet_wallet_is_low_risk() {
        let score = assess(factors(3, 20.0, false, 200));
        assert_eq!(score.score, 35);
        assert_eq!(score.level, RiskLevel::Low);
    }

    #[test]
    fn typical_wallet_is_medium_risk() {
        let score = assess(factors(20, 1.5, false, 200));
        assert_eq!(score.score, 50);
        assert_eq!(score.level, RiskLevel::Medium);
    }

    #[test]
    fn stacked_red_flags_are_capped_at_100() {
        let score = assess(factors(80, 0.001, true, 45));
        assert_eq!(score.score, 100);
        assert_eq!(score.level, RiskLevel::High);
        assert!(score.factors.suspicious_activity);
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(risk_level(0), RiskLevel::Low);
        assert_eq!(risk_level(39), RiskLevel::Low);
        assert_eq!(risk_level(40), RiskLevel::Medium);
        assert_eq!(risk_level(69), RiskLevel::Medium);
        assert_eq!(risk_level(70), RiskLevel::High);
        assert_eq!(risk_level(100), RiskLevel::High);
    }

    #[test]
    fn score_stays_in_bounds_for_all_factor_combinations() {
        for count in [0, 4, 5, 50, 51, 500] {
            for balance in [0.0, 0.009, 0.01, 10.0, 10.5] {
                for suspicious in [false, true] {
                    for age in [0, 89, 90, 400] {
                        let score = assess(factors(count, balance, suspicious, age));
                        assert!(score.score <= 100);
                        assert_eq!(score.level, risk_level(score.score));
                    }
                }
            }
        }
    }

    struct FixedSignals {
        suspicious: bool,
        age: u32,
    }

    #[async_trait]
    impl RiskSignals for FixedSignals {
        async fn suspicious_activity(&self, _address: &Address) -> bool {
            self.suspicious
        }

        async fn address_age_days(&self, _address: &Address) -> u32 {
            self.age
        }
    }

    #[tokio::test]
    async fn score_address_consults_signals() {
        let signals = FixedSignals {
            suspicious: true,
            age: 60,
        };
        let address = Address::from_bytes([0x33; 20]);
        let score = score_address(&signals, &address, 20, 1.0).await;
        assert_eq!(score.score, 80);
        assert_eq!(score.factors.age_days, 60);
    }

    #[tokio::test]
    async fn simulated_signals_stay_in_documented_ranges() {
        let signals = SimulatedRiskSignals::seeded(21);
        let address = Address::from_bytes([0x44; 20]);
        for _ in 0..50 {
            let age = signals.address_age_days(&address).await;
            assert!((30..395).contains(&age));
        }
    }
}
