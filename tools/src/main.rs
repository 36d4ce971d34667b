//! margin-admin: line-oriented JSON front end for the margin engine.
//!
//! Usage:
//!   margin-admin --config admin.json --costs costs.json --db margins.db
//!   margin-admin --config admin.json --costs costs.json --directory actors.json
//!
//! Each stdin line is one request:
//!   {"session": {"actorId": "ana"}, "cmd": "get_margin_config", "customerId": "iso-1"}
//! Each stdout line is `{"ok": ...}` or `{"error": {"kind": ..., "message": ...}}`.

use anyhow::Result;
use margin_core::{
    command::{dispatch, AdminRequest},
    config::AdminConfig,
    cost::CostTable,
    engine::MarginEngine,
    permission::Identity,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
struct DirectoryFile {
    actors: Vec<Identity>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let config_path = arg_value(&args, "--config").unwrap_or("./config/admin.json");
    let costs_path = arg_value(&args, "--costs").unwrap_or("./data/costs.json");
    let directory_path = arg_value(&args, "--directory");

    log::info!("margin-admin starting: db={db} config={config_path} costs={costs_path}");

    let config = AdminConfig::load(config_path)?;
    let costs = CostTable::load(costs_path)?;
    let engine = MarginEngine::build(db, Box::new(costs), config)?;

    if let Some(path) = directory_path {
        seed_directory(&engine, path)?;
    }

    run_loop(&engine)
}

fn seed_directory(engine: &MarginEngine, path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    let file: DirectoryFile = serde_json::from_str(&content)?;
    for actor in &file.actors {
        engine.store.upsert_actor(&actor.actor_id, actor.role, actor.active)?;
        for customer_id in &actor.grants {
            engine.store.grant_iso(&actor.actor_id, customer_id)?;
        }
    }
    log::info!("directory: seeded {} actors from {path}", file.actors.len());
    Ok(())
}

fn run_loop(engine: &MarginEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<AdminRequest>(&buffer) {
            Ok(request) => match dispatch(engine, &request) {
                Ok(value) => serde_json::json!({ "ok": value }),
                Err(e) => {
                    log::debug!("request failed: {e}");
                    serde_json::json!({ "error": { "kind": e.kind(), "message": e.to_string() } })
                }
            },
            Err(e) => serde_json::json!({
                "error": { "kind": "malformed_request", "message": e.to_string() }
            }),
        };

        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
