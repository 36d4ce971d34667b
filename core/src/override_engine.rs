//! Override engine: manual final-rate edits and their tier redistribution.
//!
//! An edit moves a cell from its current final rate to a requested one.
//! The difference (`delta`) is pushed into the tiers by one of three rules:
//!
//!   core edit      : all of delta to marginCore;    floor = coreCost
//!   apenas_outbank : all of delta to marginOutbank; floor = baseCost
//!   proportional   : delta split by each tier's share of the tier total;
//!                    floor = baseCost. A zero total sends all of delta
//!                    to marginOutbank.
//!
//! INVARIANT: for every committed override,
//!   baseCost + outbank + executivo + core == valorOverride
//! exactly (fixed-point), and no tier is negative.
//!
//! This module is pure. Persistence and permission checks live in
//! `engine.rs`; the store writes the override and its history entry in
//! one transaction.

use crate::{
    composition::{CellPricing, MarginTiers},
    config::OverrideOptions,
    error::{MarginError, MarginResult},
    rate::Rate,
    types::{ActorId, RateCell},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    #[default]
    Proportional,
    ApenasOutbank,
}

impl OverrideMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OverrideMode::Proportional  => "proportional",
            OverrideMode::ApenasOutbank => "apenas_outbank",
        }
    }

    pub fn parse(s: &str) -> MarginResult<Self> {
        match s {
            "proportional"   => Ok(OverrideMode::Proportional),
            "apenas_outbank" => Ok(OverrideMode::ApenasOutbank),
            other => Err(MarginError::invalid(format!("unknown override mode '{other}'"))),
        }
    }
}

/// A committed manual rate for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    pub cell:           RateCell,
    /// Live baseline at the moment the override was first created.
    pub valor_original: Rate,
    pub valor_override: Rate,
    pub override_mode:  OverrideMode,
    /// Base cost the tiers were decomposed against.
    pub base_cost:      Rate,
    pub tiers:          MarginTiers,
    pub updated_by:     ActorId,
    pub updated_at:     DateTime<Utc>,
}

/// Result of redistributing a requested rate, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub cell:          RateCell,
    pub base_cost:     Rate,
    pub current_final: Rate,
    pub requested:     Rate,
    pub delta:         Rate,
    pub mode:          OverrideMode,
    pub core_edit:     bool,
    pub floor:         Rate,
    pub tiers:         MarginTiers,
}

impl Preview {
    /// Same value at 4-decimal precision: committing would change nothing.
    pub fn is_noop(&self) -> bool {
        self.requested == self.current_final
    }
}

/// What a revert did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertOutcome {
    Reverted { previous: Rate, baseline: Rate },
    /// No active override existed; nothing written.
    NothingToRevert,
}

/// Starting point of an edit: the active override's decomposition if there
/// is one, the live margin stack otherwise.
fn starting_point(pricing: &CellPricing, active: Option<&Override>) -> (Rate, MarginTiers) {
    match active {
        // Re-anchor on the live base cost so a moved cost feed cannot break
        // the decomposition sum. Equals valorOverride while the cost is unchanged.
        Some(o) => (pricing.base_cost + o.tiers.total(), o.tiers),
        None => (pricing.baseline(), pricing.tiers),
    }
}

/// Compute the tier redistribution for a requested final rate.
pub fn preview(
    pricing: &CellPricing,
    active: Option<&Override>,
    requested: Rate,
    options: OverrideOptions,
) -> Preview {
    let (current_final, start) = starting_point(pricing, active);
    let delta = requested - current_final;
    let mut tiers = start;

    let floor = if options.core_edit {
        tiers.margin_core += delta;
        crate::composition::core_cost(pricing.base_cost, &start)
    } else {
        match options.mode {
            OverrideMode::ApenasOutbank => {
                tiers.margin_outbank += delta;
            }
            OverrideMode::Proportional => {
                let total = start.total();
                if total.is_zero() {
                    // TODO: confirm with pricing ops whether a zero stack should
                    // really route everything to Outbank.
                    tiers.margin_outbank += delta;
                } else {
                    let executivo = delta.share(start.margin_executivo, total);
                    let core = delta.share(start.margin_core, total);
                    tiers.margin_executivo += executivo;
                    tiers.margin_core += core;
                    // Outbank absorbs the rounding remainder.
                    tiers.margin_outbank += delta - executivo - core;
                }
            }
        }
        pricing.base_cost
    };

    debug_assert_eq!(pricing.base_cost + tiers.total(), requested);

    Preview {
        cell: pricing.cell.clone(),
        base_cost: pricing.base_cost,
        current_final,
        requested,
        delta,
        mode: options.mode,
        core_edit: options.core_edit,
        floor,
        tiers,
    }
}

/// Reject previews that break the floor or drive a tier negative.
/// Never clamps: the error names the violated bound.
pub fn validate(preview: &Preview) -> MarginResult<()> {
    if preview.requested < preview.floor {
        return Err(MarginError::invalid(format!(
            "requested rate {} is below the floor {} for {}",
            preview.requested.to_plain(),
            preview.floor.to_plain(),
            preview.cell
        )));
    }
    if let Some(tier) = preview.tiers.first_negative() {
        return Err(MarginError::invalid(format!(
            "{} would become negative ({}) for {}",
            tier.as_str(),
            preview.tiers.get(tier).to_plain(),
            preview.cell
        )));
    }
    if preview.base_cost + preview.tiers.total() != preview.requested {
        return Err(MarginError::invalid(format!(
            "tier decomposition does not add up to {} for {}",
            preview.requested.to_plain(),
            preview.cell
        )));
    }
    Ok(())
}

/// Build the override row a validated preview commits.
pub fn to_override(
    preview: &Preview,
    active: Option<&Override>,
    actor_id: &str,
    at: DateTime<Utc>,
) -> Override {
    Override {
        cell:           preview.cell.clone(),
        valor_original: active.map_or(preview.current_final, |o| o.valor_original),
        valor_override: preview.requested,
        override_mode:  preview.mode,
        base_cost:      preview.base_cost,
        tiers:          preview.tiers,
        updated_by:     actor_id.to_string(),
        updated_at:     at,
    }
}
