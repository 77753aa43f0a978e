//! Vehicle tiers: the static per-category pricing and ETA table.

use serde::{Deserialize, Serialize};

/// One vehicle category with its linear price/ETA model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTier {
    pub key: String,
    /// Currency units per kilometre.
    pub rate_per_km: f64,
    /// Minutes of travel per kilometre.
    pub eta_min_per_km: f64,
    pub capacity: u8,
    #[serde(default)]
    pub display: TierDisplay,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierDisplay {
    pub name: String,
    pub icon: String,
    pub capacity_label: String,
    pub note: String,
}

impl VehicleTier {
    #[allow(clippy::too_many_arguments)]
    fn standard(
        key: &str,
        rate_per_km: f64,
        eta_min_per_km: f64,
        capacity: u8,
        name: &str,
        icon: &str,
        capacity_label: &str,
        note: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            rate_per_km,
            eta_min_per_km,
            capacity,
            display: TierDisplay {
                name: name.to_string(),
                icon: icon.to_string(),
                capacity_label: capacity_label.to_string(),
                note: note.to_string(),
            },
        }
    }
}

/// Ordered, read-only tier table. Iteration order is the tie-break for "fastest".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<VehicleTier>", into = "Vec<VehicleTier>")]
pub struct TierTable {
    tiers: Vec<VehicleTier>,
}

impl TierTable {
    /// Build a table; later entries with a duplicate key are dropped.
    pub fn new(tiers: Vec<VehicleTier>) -> Self {
        let mut unique: Vec<VehicleTier> = Vec::with_capacity(tiers.len());
        for tier in tiers {
            if unique.iter().all(|existing| existing.key != tier.key) {
                unique.push(tier);
            }
        }
        Self { tiers: unique }
    }

    /// The four city tiers the rider app offers.
    pub fn standard() -> Self {
        Self::new(vec![
            VehicleTier::standard(
                "bike",
                6.0,
                2.2,
                1,
                "Bike Taxi",
                "🛵",
                "1 passenger",
                "Can bypass slow traffic",
            ),
            VehicleTier::standard(
                "auto",
                12.0,
                3.2,
                3,
                "Auto-Rickshaw",
                "🛺",
                "2-3 passengers",
                "Moderate stop-and-go",
            ),
            VehicleTier::standard(
                "car",
                15.0,
                4.0,
                4,
                "Car (Mini)",
                "🚗",
                "4 passengers",
                "Slower due to traffic lights and bulk",
            ),
            VehicleTier::standard(
                "suv",
                22.0,
                4.5,
                6,
                "Car (SUV)",
                "🚙",
                "6 passengers",
                "Large SUV, slowest in city traffic",
            ),
        ])
    }

    /// Case-insensitive lookup.
    pub fn get(&self, key: &str) -> Option<&VehicleTier> {
        self.tiers
            .iter()
            .find(|tier| tier.key.eq_ignore_ascii_case(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VehicleTier> {
        self.tiers.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tiers.iter().map(|tier| tier.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl From<Vec<VehicleTier>> for TierTable {
    fn from(tiers: Vec<VehicleTier>) -> Self {
        Self::new(tiers)
    }
}

impl From<TierTable> for Vec<VehicleTier> {
    fn from(table: TierTable) -> Self {
        table.tiers
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::standard()
    }
}
