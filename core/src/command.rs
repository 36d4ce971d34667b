use crate::{
    engine::{MarginEngine, MarginPatch},
    error::{MarginError, MarginResult},
    mdr_link::LinkStatus,
    override_engine::{OverrideMode, RevertOutcome},
    permission::Session,
    rate::Rate,
    types::{ActorId, CategoryId, CustomerId, RateCell},
};
use serde::Deserialize;
use serde_json::{json, Value};

/// All admin operations, one JSON object per request.
/// Variants added over time; never removed or reordered.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AdminCommand {
    // ── Margins ───────────────────────────────────
    GetMarginConfig {
        customer_id: CustomerId,
    },
    SetMarginConfig {
        customer_id: CustomerId,
        fields:      RawMarginFields,
    },
    QuoteCell {
        cell: RateCell,
    },

    // ── Overrides ─────────────────────────────────
    PreviewOverride {
        cell:                 RateCell,
        requested_final_rate: Value,
        #[serde(default)]
        mode:                 Option<String>,
    },
    CommitOverride {
        cell:                 RateCell,
        requested_final_rate: Value,
        #[serde(default)]
        mode:                 Option<String>,
    },
    RevertOverride {
        cell: RateCell,
    },
    ListOverrides {
        customer_id: CustomerId,
    },
    ListHistory {
        cell: RateCell,
    },

    // ── MDR links ─────────────────────────────────
    LinkTable {
        customer_id: CustomerId,
        category_id: CategoryId,
    },
    UnlinkTable {
        link_id: Value,
    },
    ListLinks {
        customer_id: CustomerId,
    },
    ListPriceLock {
        link_id: Value,
    },
    TransitionLinkStatus {
        link_id:    Value,
        new_status: String,
    },

    // ── Identity ──────────────────────────────────
    Resolve {
        customer_id: CustomerId,
    },
    SetSimulation {
        target_actor_id: ActorId,
    },
}

/// `SetMarginConfig` fields as sent. Values are parsed in `dispatch` so a
/// malformed rate reports as a validation error, not a malformed request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarginFields {
    #[serde(default)]
    pub margin_outbank:   Option<Value>,
    #[serde(default)]
    pub margin_executivo: Option<Value>,
    #[serde(default)]
    pub margin_core:      Option<Value>,
}

impl RawMarginFields {
    fn parse(&self) -> MarginResult<MarginPatch> {
        let field = |value: &Option<Value>, name: &str| {
            value.as_ref().map(|v| raw_rate(v, name)).transpose()
        };
        Ok(MarginPatch {
            margin_outbank:   field(&self.margin_outbank, "marginOutbank")?,
            margin_executivo: field(&self.margin_executivo, "marginExecutivo")?,
            margin_core:      field(&self.margin_core, "marginCore")?,
        })
    }
}

/// A command plus the session it runs under.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminRequest {
    #[serde(default)]
    pub session: Session,
    #[serde(flatten)]
    pub command: AdminCommand,
}

/// Link ids arrive as whatever the client held: number or string.
/// Anything else becomes an empty key and fails as stale state.
fn raw_link_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Rates arrive as text (comma or dot decimals) or as JSON numbers.
fn raw_rate(value: &Value, field: &str) -> MarginResult<Rate> {
    match value {
        Value::String(s) => Rate::parse(s),
        Value::Number(n) => Rate::parse(&n.to_string()),
        _ => Err(MarginError::invalid(format!("{field} must be a string or a number"))),
    }
}

fn raw_mode(mode: &Option<String>) -> MarginResult<Option<OverrideMode>> {
    mode.as_deref().map(OverrideMode::parse).transpose()
}

/// Run one request against the engine and render its JSON result.
pub fn dispatch(engine: &MarginEngine, request: &AdminRequest) -> MarginResult<Value> {
    let session = &request.session;
    let value = match &request.command {
        AdminCommand::GetMarginConfig { customer_id } => {
            serde_json::to_value(engine.get_margin_config(customer_id, session)?)?
        }
        AdminCommand::SetMarginConfig { customer_id, fields } => {
            serde_json::to_value(engine.set_margin_config(customer_id, &fields.parse()?, session)?)?
        }
        AdminCommand::QuoteCell { cell } => {
            serde_json::to_value(engine.quote_cell(cell, session)?)?
        }
        AdminCommand::PreviewOverride { cell, requested_final_rate, mode } => {
            let requested = raw_rate(requested_final_rate, "requestedFinalRate")?;
            serde_json::to_value(engine.preview_override(cell, requested, raw_mode(mode)?, session)?)?
        }
        AdminCommand::CommitOverride { cell, requested_final_rate, mode } => {
            let requested = raw_rate(requested_final_rate, "requestedFinalRate")?;
            serde_json::to_value(engine.commit_override(cell, requested, raw_mode(mode)?, session)?)?
        }
        AdminCommand::RevertOverride { cell } => match engine.revert_override(cell, session)? {
            RevertOutcome::Reverted { previous, baseline } => {
                json!({ "outcome": "reverted", "previousValue": previous, "newValue": baseline })
            }
            RevertOutcome::NothingToRevert => json!({ "outcome": "nothing_to_revert" }),
        },
        AdminCommand::ListOverrides { customer_id } => {
            serde_json::to_value(engine.list_overrides(customer_id, session)?)?
        }
        AdminCommand::ListHistory { cell } => {
            serde_json::to_value(engine.list_history(cell, session)?)?
        }
        AdminCommand::LinkTable { customer_id, category_id } => {
            serde_json::to_value(engine.link_table(customer_id, category_id, session)?)?
        }
        AdminCommand::UnlinkTable { link_id } => {
            engine.unlink_table(&raw_link_id(link_id), session)?;
            json!({ "outcome": "unlinked" })
        }
        AdminCommand::ListLinks { customer_id } => {
            serde_json::to_value(engine.list_links(customer_id, session)?)?
        }
        AdminCommand::ListPriceLock { link_id } => {
            serde_json::to_value(engine.list_price_lock(&raw_link_id(link_id), session)?)?
        }
        AdminCommand::TransitionLinkStatus { link_id, new_status } => {
            let status = LinkStatus::parse(new_status)?;
            serde_json::to_value(engine.transition_link_status(&raw_link_id(link_id), status, session)?)?
        }
        AdminCommand::Resolve { customer_id } => {
            serde_json::to_value(engine.resolve(session, customer_id)?)?
        }
        AdminCommand::SetSimulation { target_actor_id } => {
            serde_json::to_value(engine.set_simulation(target_actor_id, session)?)?
        }
    };
    Ok(value)
}
