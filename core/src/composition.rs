//! Rate composition: base cost plus three additive margin tiers.
//!
//!   baseline  = baseCost + outbank + executivo + core
//!   coreCost  = baseCost + outbank + executivo
//!
//! Each tier perceives everything beneath it as cost.

use crate::{
    rate::Rate,
    types::{CustomerId, RateCell},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three margin layers, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Outbank,
    Executivo,
    Core,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Outbank, Tier::Executivo, Tier::Core];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Outbank   => "marginOutbank",
            Tier::Executivo => "marginExecutivo",
            Tier::Core      => "marginCore",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginTiers {
    pub margin_outbank:   Rate,
    pub margin_executivo: Rate,
    pub margin_core:      Rate,
}

impl MarginTiers {
    pub fn new(outbank: Rate, executivo: Rate, core: Rate) -> Self {
        Self {
            margin_outbank:   outbank,
            margin_executivo: executivo,
            margin_core:      core,
        }
    }

    pub fn get(&self, tier: Tier) -> Rate {
        match tier {
            Tier::Outbank   => self.margin_outbank,
            Tier::Executivo => self.margin_executivo,
            Tier::Core      => self.margin_core,
        }
    }

    pub fn set(&mut self, tier: Tier, value: Rate) {
        match tier {
            Tier::Outbank   => self.margin_outbank = value,
            Tier::Executivo => self.margin_executivo = value,
            Tier::Core      => self.margin_core = value,
        }
    }

    pub fn total(&self) -> Rate {
        self.margin_outbank + self.margin_executivo + self.margin_core
    }

    /// First tier (bottom-up) holding a negative value, if any.
    pub fn first_negative(&self) -> Option<Tier> {
        Tier::ALL.into_iter().find(|t| self.get(*t).is_negative())
    }
}

/// Per-ISO margin stack. Created on first configuration, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginConfig {
    pub customer_id: CustomerId,
    #[serde(flatten)]
    pub tiers:       MarginTiers,
    pub updated_at:  DateTime<Utc>,
}

/// Everything needed to price one cell live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellPricing {
    pub cell:      RateCell,
    pub base_cost: Rate,
    pub tiers:     MarginTiers,
}

impl CellPricing {
    pub fn baseline(&self) -> Rate {
        baseline(self.base_cost, &self.tiers)
    }

    pub fn core_cost(&self) -> Rate {
        core_cost(self.base_cost, &self.tiers)
    }
}

pub fn baseline(base_cost: Rate, tiers: &MarginTiers) -> Rate {
    base_cost + tiers.total()
}

/// The cost floor as the Core role perceives it.
pub fn core_cost(base_cost: Rate, tiers: &MarginTiers) -> Rate {
    base_cost + tiers.margin_outbank + tiers.margin_executivo
}
