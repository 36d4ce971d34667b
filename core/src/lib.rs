//! Margin composition and override engine for ISO pricing.
//!
//! A base transaction cost is marked up by three additive margin tiers
//! (Outbank, Executivo, Core). A cell's final rate may be overridden by
//! hand; the override's tier breakdown is redistributed by policy and
//! every mutation is recorded in an append-only history ledger.

pub mod clock;
pub mod command;
pub mod composition;
pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod history;
pub mod mdr_link;
pub mod override_engine;
pub mod permission;
pub mod rate;
pub mod simulation;
pub mod store;
pub mod types;
