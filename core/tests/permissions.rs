//! Permission resolution, field masking and identity simulation.

mod common;

use chrono::Duration;
use common::{as_actor, build, cell, configure_standard_margins, r};
use margin_core::{
    clock::FixedClock,
    error::{MarginError, MarginResult},
    permission::{self, Access, Identity, Role, Session},
};
use std::collections::BTreeSet;
use std::sync::Arc;

fn same_resolution(a: MarginResult<Access>, b: MarginResult<Access>) -> bool {
    match (a, b) {
        (Ok(x), Ok(y)) => x == y,
        (Err(x), Err(y)) => x.kind() == y.kind(),
        _ => false,
    }
}

#[test]
fn super_admin_resolves_without_grants() {
    let engine = build();
    let access = engine.resolve(&as_actor("admin"), "iso-99").unwrap();
    assert_eq!(access, Access { role: Role::SuperAdmin, can_read: true, can_write: true });
}

#[test]
fn grant_holders_resolve_by_role() {
    let engine = build();

    let exec = engine.resolve(&as_actor("exec"), "iso-1").unwrap();
    assert_eq!(exec, Access { role: Role::Executivo, can_read: true, can_write: false });

    let core = engine.resolve(&as_actor("core"), "iso-1").unwrap();
    assert_eq!(core, Access { role: Role::Core, can_read: true, can_write: true });
}

#[test]
fn missing_grant_denies_every_operation() {
    let engine = build();
    let core = as_actor("core");

    assert!(matches!(
        engine.resolve(&core, "iso-2"),
        Err(MarginError::PermissionDenied { .. })
    ));
    assert!(matches!(
        engine.get_margin_config("iso-2", &core),
        Err(MarginError::PermissionDenied { .. })
    ));
    assert!(matches!(
        engine.list_overrides("iso-2", &core),
        Err(MarginError::PermissionDenied { .. })
    ));
}

#[test]
fn revoked_grant_takes_effect_on_next_call() {
    let engine = build();
    engine.resolve(&as_actor("exec"), "iso-1").unwrap();

    engine.store.revoke_iso("exec", "iso-1").unwrap();
    assert!(engine.resolve(&as_actor("exec"), "iso-1").is_err());
}

#[test]
fn resolve_is_pure_over_the_identity_record() {
    let identity = Identity {
        actor_id: "someone".into(),
        role:     Role::Core,
        active:   false,
        grants:   BTreeSet::from(["iso-1".to_string()]),
    };
    assert!(
        permission::resolve(&identity, "iso-1").is_err(),
        "inactive identities resolve to nothing"
    );
}

#[test]
fn margin_config_is_masked_per_role() {
    let engine = build();
    configure_standard_margins(&engine);

    let admin = engine.get_margin_config("iso-1", &as_actor("admin")).unwrap();
    assert_eq!(admin.tiers.margin_outbank, Some(r("2")));
    assert_eq!(admin.tiers.margin_executivo, Some(r("1")));
    assert_eq!(admin.tiers.margin_core, Some(r("1")));

    let exec = engine.get_margin_config("iso-1", &as_actor("exec")).unwrap();
    assert_eq!(exec.tiers.margin_outbank, None);
    assert_eq!(exec.tiers.margin_executivo, Some(r("1")));
    assert_eq!(exec.tiers.margin_core, None);

    let core = engine.get_margin_config("iso-1", &as_actor("core")).unwrap();
    assert_eq!(core.tiers.margin_outbank, None);
    assert_eq!(core.tiers.margin_executivo, None);
    assert_eq!(core.tiers.margin_core, Some(r("1")));
}

#[test]
fn core_sees_lower_tiers_as_cost() {
    let engine = build();
    configure_standard_margins(&engine);

    let core = engine.quote_cell(&cell(), &as_actor("core")).unwrap();
    assert_eq!(core.final_rate, r("14"));
    assert_eq!(core.visible_cost, Some(r("13")));

    let admin = engine.quote_cell(&cell(), &as_actor("admin")).unwrap();
    assert_eq!(admin.visible_cost, Some(r("10")));

    let exec = engine.quote_cell(&cell(), &as_actor("exec")).unwrap();
    assert_eq!(exec.final_rate, r("14"), "executivo reads the resulting rate");
    assert_eq!(exec.visible_cost, None);
}

// ── Simulation ─────────────────────────────────────────────────────

#[test]
fn simulated_resolution_equals_direct_login() {
    let engine = build();
    let admin = as_actor("admin");

    for target in ["exec", "core", "core-b", "admin-2"] {
        let grant = engine.set_simulation(target, &admin).unwrap();
        assert!(grant.context.is_simulating, "{target} should be simulatable");
        let token = grant.token.expect("token for accepted simulation");
        let simulated = admin.clone().with_simulation(token);

        for customer in ["iso-1", "iso-2", "iso-3"] {
            assert!(
                same_resolution(
                    engine.resolve(&simulated, customer),
                    engine.resolve(&as_actor(target), customer),
                ),
                "simulating {target} must resolve like {target} on {customer}"
            );
        }
    }
}

#[test]
fn simulating_an_executivo_locks_writes() {
    let engine = build();
    configure_standard_margins(&engine);
    let admin = as_actor("admin");

    let token = engine.set_simulation("exec", &admin).unwrap().token.unwrap();
    let err = engine
        .commit_override(&cell(), r("18"), None, &admin.with_simulation(token))
        .unwrap_err();
    assert!(matches!(err, MarginError::PermissionDenied { .. }), "got {err}");
}

#[test]
fn non_admin_cannot_simulate() {
    let engine = build();
    let grant = engine.set_simulation("admin", &as_actor("core")).unwrap();
    assert!(!grant.context.is_simulating);
    assert!(grant.token.is_none());
    assert_eq!(grant.context.target_actor_id, "core");
}

#[test]
fn inactive_or_unknown_target_is_dropped() {
    let engine = build();
    engine.store.set_actor_active("exec", false).unwrap();

    for target in ["exec", "ghost"] {
        let grant = engine.set_simulation(target, &as_actor("admin")).unwrap();
        assert!(!grant.context.is_simulating, "{target} must not be simulatable");
        assert!(grant.token.is_none());
    }
}

#[test]
fn token_is_revalidated_on_every_use() {
    let engine = build();
    let admin = as_actor("admin");
    let token = engine.set_simulation("core", &admin).unwrap().token.unwrap();
    let simulated = admin.clone().with_simulation(token);

    assert_eq!(engine.resolve(&simulated, "iso-1").unwrap().role, Role::Core);

    // Target deactivated: falls back to the real admin.
    engine.store.set_actor_active("core", false).unwrap();
    assert_eq!(engine.resolve(&simulated, "iso-2").unwrap().role, Role::SuperAdmin);

    // Real actor demoted: simulation dropped, acts as the demoted self.
    engine.store.set_actor_active("core", true).unwrap();
    engine.store.upsert_actor("admin", Role::Executivo, true).unwrap();
    assert!(matches!(
        engine.resolve(&simulated, "iso-1"),
        Err(MarginError::PermissionDenied { .. })
    ));
}

#[test]
fn tampered_token_falls_back_to_real_actor() {
    let engine = build();
    let admin = as_actor("admin");
    let token = engine.set_simulation("core", &admin).unwrap().token.unwrap();

    let (payload, signature) = token.split_once('.').unwrap();
    let mut forged_sig = signature.to_string();
    let last = forged_sig.pop().unwrap();
    forged_sig.push(if last == 'A' { 'B' } else { 'A' });
    let forged = format!("{payload}.{forged_sig}");

    for bad in [forged.as_str(), "garbage", "", "a.b"] {
        let access = engine
            .resolve(&admin.clone().with_simulation(bad), "iso-2")
            .unwrap();
        assert_eq!(access.role, Role::SuperAdmin, "token '{bad}' must be ignored");
    }
}

#[test]
fn token_is_bound_to_the_admin_it_was_issued_to() {
    let engine = build();
    let token = engine
        .set_simulation("admin-2", &as_actor("admin"))
        .unwrap()
        .token
        .unwrap();

    // Presented by core: dropped, core acts as itself.
    let stolen = Session::as_actor("core").with_simulation(token);
    assert_eq!(engine.resolve(&stolen, "iso-1").unwrap().role, Role::Core);
    assert!(engine.resolve(&stolen, "iso-2").is_err());
}

#[test]
fn expired_token_is_ignored() {
    let clock = Arc::new(FixedClock::epoch());
    let engine = build().with_clock(Box::new(clock.clone()));
    let admin = as_actor("admin");

    let token = engine.set_simulation("exec", &admin).unwrap().token.unwrap();
    let simulated = admin.with_simulation(token);
    assert_eq!(engine.resolve(&simulated, "iso-1").unwrap().role, Role::Executivo);

    clock.advance(Duration::hours(9));
    assert_eq!(engine.resolve(&simulated, "iso-1").unwrap().role, Role::SuperAdmin);
}
