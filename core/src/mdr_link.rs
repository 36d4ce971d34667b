//! MDR link lifecycle: the association between an ISO and a cost table.
//!
//!   rascunho ──► validada ──► inativa
//!      │            ▲            │
//!      └──► inativa └────────────┘
//!
//! Entering `validada` requires an existing margin config and takes a
//! price-lock snapshot of every cell under the link. `inativa → inativa`
//! is accepted as a no-op. Nothing ever returns to `rascunho`.

use crate::{
    composition::{CellPricing, MarginTiers},
    error::{MarginError, MarginResult},
    rate::Rate,
    types::{CategoryId, CustomerId, LinkId, RateCell},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Rascunho,
    Validada,
    Inativa,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Rascunho => "rascunho",
            LinkStatus::Validada => "validada",
            LinkStatus::Inativa  => "inativa",
        }
    }

    pub fn parse(s: &str) -> MarginResult<Self> {
        match s {
            "rascunho" => Ok(LinkStatus::Rascunho),
            "validada" => Ok(LinkStatus::Validada),
            "inativa"  => Ok(LinkStatus::Inativa),
            other => Err(MarginError::invalid(format!("unknown link status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MdrLink {
    pub link_id:     LinkId,
    pub customer_id: CustomerId,
    pub category_id: CategoryId,
    pub status:      LinkStatus,
    pub updated_at:  DateTime<Utc>,
}

/// What a permitted transition requires of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Margin config must exist; snapshot every cell.
    Validate,
    Deactivate,
    /// Already in the requested state.
    Unchanged,
}

pub fn plan_transition(from: LinkStatus, to: LinkStatus) -> MarginResult<TransitionEffect> {
    use LinkStatus::*;
    match (from, to) {
        (Rascunho, Validada) | (Inativa, Validada) => Ok(TransitionEffect::Validate),
        (Rascunho, Inativa) | (Validada, Inativa)  => Ok(TransitionEffect::Deactivate),
        (Inativa, Inativa)                         => Ok(TransitionEffect::Unchanged),
        _ => Err(MarginError::invalid(format!(
            "link cannot move from {} to {}",
            from.as_str(),
            to.as_str()
        ))),
    }
}

/// Parse a client-supplied link id. A key that does not parse is stale
/// client state, not a missing resource.
pub fn parse_link_id(raw: &str) -> MarginResult<LinkId> {
    raw.trim()
        .parse::<LinkId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| MarginError::ReloadRequired {
            reason: format!("link id '{raw}' is not valid"),
        })
}

/// One cell's frozen baseline at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLockEntry {
    pub link_id:    LinkId,
    pub cell:       RateCell,
    pub base_cost:  Rate,
    pub tiers:      MarginTiers,
    pub final_rate: Rate,
    pub locked_at:  DateTime<Utc>,
}

impl PriceLockEntry {
    pub fn freeze(link_id: LinkId, pricing: &CellPricing, at: DateTime<Utc>) -> Self {
        Self {
            link_id,
            cell:       pricing.cell.clone(),
            base_cost:  pricing.base_cost,
            tiers:      pricing.tiers,
            final_rate: pricing.baseline(),
            locked_at:  at,
        }
    }
}
