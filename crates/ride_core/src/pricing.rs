//! Per-tier fare and ETA quotes.
//!
//! Formula per tier: `price = round(distance_km * rate_per_km)` and
//! `eta = round(distance_km * eta_min_per_km)` minutes. The routing provider's
//! duration is carried on the quote for display but does not feed the per-tier
//! ETA, so tiers stay comparable with each other.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tier::{TierTable, VehicleTier};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    #[error("invalid quote input: {0}")]
    InvalidQuoteInput(String),
    #[error("unknown vehicle tier '{0}'")]
    UnknownTier(String),
}

/// Price/ETA estimate for one tier. Derived and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub tier_key: String,
    pub price: u64,
    pub eta_minutes: u32,
    pub estimated_drop_time: DateTime<Utc>,
    /// Provider route duration the quote was requested with.
    pub route_duration_min: f64,
    /// Set on exactly one entry of a quote set: the first minimum-ETA tier in table order.
    pub fastest: bool,
}

/// Stateless quote calculator over a tier table.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    tiers: TierTable,
}

impl PricingEngine {
    pub fn new(tiers: TierTable) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn quote(
        &self,
        distance_km: f64,
        duration_min: f64,
        tier_key: &str,
    ) -> Result<Quote, PricingError> {
        self.quote_at(distance_km, duration_min, tier_key, Utc::now())
    }

    pub fn quote_at(
        &self,
        distance_km: f64,
        duration_min: f64,
        tier_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Quote, PricingError> {
        validate_inputs(distance_km, duration_min)?;
        let tier = self
            .tiers
            .get(tier_key)
            .ok_or_else(|| PricingError::UnknownTier(tier_key.to_string()))?;
        Ok(price_tier(tier, distance_km, duration_min, now))
    }

    /// Quotes for every tier, cheapest first, with the fastest tier flagged.
    pub fn quote_all(&self, distance_km: f64, duration_min: f64) -> Result<Vec<Quote>, PricingError> {
        self.quote_all_at(distance_km, duration_min, Utc::now())
    }

    pub fn quote_all_at(
        &self,
        distance_km: f64,
        duration_min: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Quote>, PricingError> {
        validate_inputs(distance_km, duration_min)?;

        let mut quotes: Vec<Quote> = self
            .tiers
            .iter()
            .map(|tier| price_tier(tier, distance_km, duration_min, now))
            .collect();

        // Flag before sorting so table order decides ties.
        let mut fastest_idx: Option<usize> = None;
        for (idx, quote) in quotes.iter().enumerate() {
            match fastest_idx {
                Some(best) if quotes[best].eta_minutes <= quote.eta_minutes => {}
                _ => fastest_idx = Some(idx),
            }
        }
        if let Some(idx) = fastest_idx {
            quotes[idx].fastest = true;
        }

        // Stable: equal prices keep table order.
        quotes.sort_by_key(|quote| quote.price);
        Ok(quotes)
    }
}

fn validate_inputs(distance_km: f64, duration_min: f64) -> Result<(), PricingError> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(PricingError::InvalidQuoteInput(format!(
            "distance must be a finite, non-negative number of km, got {distance_km}"
        )));
    }
    if !duration_min.is_finite() || duration_min < 0.0 {
        return Err(PricingError::InvalidQuoteInput(format!(
            "duration must be a finite, non-negative number of minutes, got {duration_min}"
        )));
    }
    Ok(())
}

fn price_tier(tier: &VehicleTier, distance_km: f64, duration_min: f64, now: DateTime<Utc>) -> Quote {
    let price = (distance_km * tier.rate_per_km).round().max(0.0) as u64;
    let eta_minutes = (distance_km * tier.eta_min_per_km).round().max(0.0) as u32;
    Quote {
        tier_key: tier.key.clone(),
        price,
        eta_minutes,
        estimated_drop_time: now + Duration::minutes(i64::from(eta_minutes)),
        route_duration_min: duration_min,
        fastest: false,
    }
}
