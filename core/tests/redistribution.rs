//! Tier redistribution rules, exercised on the pure preview/validate pair.
//!
//! Start state for every case: baseCost=10, outbank=2, executivo=1, core=1
//! (final 14.00, coreCost 13.00).

mod common;

use common::r;
use margin_core::{
    composition::{CellPricing, MarginTiers},
    config::OverrideOptions,
    error::MarginError,
    override_engine::{self, OverrideMode, Preview},
    rate::Rate,
    types::RateCell,
};

fn pricing(outbank: &str, executivo: &str, core: &str) -> CellPricing {
    CellPricing {
        cell: RateCell::new("iso-1", "cat-1", "visa", "credito", "pos"),
        base_cost: r("10"),
        tiers: MarginTiers::new(r(outbank), r(executivo), r(core)),
    }
}

fn standard() -> CellPricing {
    pricing("2", "1", "1")
}

fn run(p: &CellPricing, requested: &str, options: OverrideOptions) -> Preview {
    override_engine::preview(p, None, r(requested), options)
}

fn assert_decomposes(preview: &Preview) {
    assert_eq!(
        preview.base_cost + preview.tiers.total(),
        preview.requested,
        "tiers must add up to the requested rate"
    );
}

#[test]
fn apenas_outbank_moves_only_outbank() {
    let p = run(&standard(), "15", OverrideOptions::with_mode(OverrideMode::ApenasOutbank));
    override_engine::validate(&p).unwrap();

    assert_eq!(p.current_final, r("14"));
    assert_eq!(p.tiers, MarginTiers::new(r("3"), r("1"), r("1")));
    assert_eq!(p.floor, r("10"));
    assert_decomposes(&p);
}

#[test]
fn proportional_splits_by_tier_share() {
    let p = run(&standard(), "18", OverrideOptions::default());
    override_engine::validate(&p).unwrap();

    assert_eq!(p.delta, r("4"));
    assert_eq!(p.tiers, MarginTiers::new(r("4"), r("2"), r("2")));
    assert_decomposes(&p);
}

#[test]
fn core_edit_moves_only_core_and_raises_floor() {
    let options = OverrideOptions { mode: OverrideMode::Proportional, core_edit: true };
    let p = run(&standard(), "20", options);
    override_engine::validate(&p).unwrap();

    assert_eq!(p.tiers, MarginTiers::new(r("2"), r("1"), r("7")));
    assert_eq!(p.floor, r("13"), "core perceives outbank + executivo as cost");
    assert_decomposes(&p);
}

#[test]
fn core_edit_ignores_requested_mode() {
    let options = OverrideOptions { mode: OverrideMode::ApenasOutbank, core_edit: true };
    let p = run(&standard(), "16", options);
    assert_eq!(p.tiers, MarginTiers::new(r("2"), r("1"), r("3")));
}

#[test]
fn zero_margin_stack_sends_delta_to_outbank() {
    let p = run(&pricing("0", "0", "0"), "12,5", OverrideOptions::default());
    override_engine::validate(&p).unwrap();
    assert_eq!(p.tiers, MarginTiers::new(r("2.5"), Rate::ZERO, Rate::ZERO));
}

#[test]
fn uneven_shares_still_add_up_exactly() {
    let p = run(&pricing("1", "1", "1"), "14", OverrideOptions::default());
    override_engine::validate(&p).unwrap();

    assert_eq!(p.tiers.margin_executivo, r("1.3333"));
    assert_eq!(p.tiers.margin_core, r("1.3333"));
    assert_eq!(p.tiers.margin_outbank, r("1.3334"), "outbank takes the remainder");
    assert_decomposes(&p);
}

#[test]
fn below_base_cost_rejected_for_non_core_edit() {
    for mode in [OverrideMode::Proportional, OverrideMode::ApenasOutbank] {
        let p = run(&standard(), "9,99", OverrideOptions::with_mode(mode));
        let err = override_engine::validate(&p).unwrap_err();
        assert!(
            matches!(&err, MarginError::Validation { reason } if reason.contains("10.0000")),
            "{mode:?}: expected floor error naming 10.0000, got {err}"
        );
    }
}

#[test]
fn below_core_cost_rejected_for_core_edit() {
    let options = OverrideOptions { mode: OverrideMode::Proportional, core_edit: true };
    let p = run(&standard(), "12.99", options);
    assert!(matches!(override_engine::validate(&p), Err(MarginError::Validation { .. })));

    let at_floor = run(&standard(), "13", options);
    override_engine::validate(&at_floor).unwrap();
    assert_eq!(at_floor.tiers.margin_core, Rate::ZERO);
}

#[test]
fn negative_tier_rejected_even_above_floor() {
    // 11 is above baseCost, but outbank would be 2 + (11 - 14) = -1.
    let p = run(&standard(), "11", OverrideOptions::with_mode(OverrideMode::ApenasOutbank));
    let err = override_engine::validate(&p).unwrap_err();
    assert!(
        matches!(&err, MarginError::Validation { reason } if reason.contains("marginOutbank")),
        "expected negative-outbank error, got {err}"
    );
}

#[test]
fn proportional_decrease_down_to_base_cost_is_valid() {
    let p = run(&standard(), "10", OverrideOptions::default());
    override_engine::validate(&p).unwrap();
    assert_eq!(p.tiers, MarginTiers::default());
}

#[test]
fn requesting_the_current_rate_is_a_noop() {
    let p = run(&standard(), "14,00004", OverrideOptions::default());
    assert!(p.is_noop(), "14.00004 normalises to 14.0000");
    let moved = run(&standard(), "14.0001", OverrideOptions::default());
    assert!(!moved.is_noop());
}
