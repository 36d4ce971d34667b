//! Audit history ledger for override mutations.
//!
//! RULE: append-only. Entries are written in the same transaction as the
//! override row they describe and are never updated or deleted.

use crate::{
    override_engine::OverrideMode,
    error::{MarginError, MarginResult},
    rate::Rate,
    types::{ActorId, RateCell},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryAction {
    Criado,
    Atualizado,
    Revertido,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::Criado     => "CRIADO",
            HistoryAction::Atualizado => "ATUALIZADO",
            HistoryAction::Revertido  => "REVERTIDO",
        }
    }

    pub fn parse(s: &str) -> MarginResult<Self> {
        match s {
            "CRIADO"     => Ok(HistoryAction::Criado),
            "ATUALIZADO" => Ok(HistoryAction::Atualizado),
            "REVERTIDO"  => Ok(HistoryAction::Revertido),
            other => Err(MarginError::invalid(format!("unknown history action '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Ledger sequence number; `None` until appended.
    pub id:             Option<i64>,
    pub cell:           RateCell,
    pub actor_id:       ActorId,
    pub previous_value: Rate,
    pub new_value:      Rate,
    pub action:         HistoryAction,
    pub override_mode:  OverrideMode,
    pub timestamp:      DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        cell: &RateCell,
        actor_id: &str,
        previous_value: Rate,
        new_value: Rate,
        action: HistoryAction,
        override_mode: OverrideMode,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            cell: cell.clone(),
            actor_id: actor_id.to_string(),
            previous_value,
            new_value,
            action,
            override_mode,
            timestamp,
        }
    }
}
