//! Shared fixtures: a two-brand cost table and a small identity directory.
//!
//!   iso-1 / cat-1 / visa / credito / pos  -> base cost 10.00
//!
//! Actors: admin (super_admin), exec (executivo, iso-1),
//! core (core, iso-1), core-b (core, iso-2), admin-2 (super_admin).

#![allow(dead_code)]

use margin_core::{
    cost::CostTable,
    engine::{MarginEngine, MarginPatch},
    permission::{Role, Session},
    rate::Rate,
    types::RateCell,
};

pub fn cost_table() -> CostTable {
    let brands = vec!["visa".to_string(), "master".to_string()];
    let mut table = CostTable::new();
    table
        .insert_row("cat-1", &brands, "credito", "pos", "10,12")
        .expect("credito row");
    table
        .insert_row("cat-1", &brands, "debito", "pos", "1,5;2,25")
        .expect("debito row");
    table
}

pub fn build() -> MarginEngine {
    let engine = MarginEngine::build_test(Box::new(cost_table())).expect("build test engine");
    seed_directory(&engine);
    engine
}

pub fn seed_directory(engine: &MarginEngine) {
    let store = &engine.store;
    store.upsert_actor("admin", Role::SuperAdmin, true).unwrap();
    store.upsert_actor("admin-2", Role::SuperAdmin, true).unwrap();
    store.upsert_actor("exec", Role::Executivo, true).unwrap();
    store.grant_iso("exec", "iso-1").unwrap();
    store.upsert_actor("core", Role::Core, true).unwrap();
    store.grant_iso("core", "iso-1").unwrap();
    store.upsert_actor("core-b", Role::Core, true).unwrap();
    store.grant_iso("core-b", "iso-2").unwrap();
}

pub fn r(s: &str) -> Rate {
    Rate::parse(s).expect("valid rate literal")
}

pub fn as_actor(actor_id: &str) -> Session {
    Session::as_actor(actor_id)
}

pub fn cell() -> RateCell {
    RateCell::new("iso-1", "cat-1", "visa", "credito", "pos")
}

/// outbank=2, executivo=1, core=1 on iso-1: baseline 14.00 for `cell()`.
pub fn configure_standard_margins(engine: &MarginEngine) {
    configure(engine, "iso-1", "2", "1", "1");
}

pub fn configure(engine: &MarginEngine, customer_id: &str, outbank: &str, executivo: &str, core: &str) {
    let patch = MarginPatch {
        margin_outbank:   Some(r(outbank)),
        margin_executivo: Some(r(executivo)),
        margin_core:      Some(r(core)),
    };
    engine
        .set_margin_config(customer_id, &patch, &as_actor("admin"))
        .expect("admin configures margins");
}
