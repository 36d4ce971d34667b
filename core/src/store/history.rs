use super::{cell_cols, enum_col, rate_col, ts_col, ts_to_sql, MarginStore};
use crate::{
    error::MarginResult,
    history::{HistoryAction, HistoryEntry},
    override_engine::OverrideMode,
    types::RateCell,
};
use rusqlite::{params, Connection};

/// Append one ledger entry. Callers pass the open transaction.
pub(super) fn append_history(conn: &Connection, entry: &HistoryEntry) -> MarginResult<i64> {
    conn.execute(
        "INSERT INTO override_history (
            customer_id, category_id, bandeira, produto, canal,
            actor_id, previous_value, new_value, action, override_mode, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            entry.cell.customer_id,
            entry.cell.category_id,
            entry.cell.bandeira,
            entry.cell.produto,
            entry.cell.canal,
            entry.actor_id,
            entry.previous_value.units(),
            entry.new_value.units(),
            entry.action.as_str(),
            entry.override_mode.as_str(),
            ts_to_sql(&entry.timestamp),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl MarginStore {
    // ── History ───────────────────────────────────────────────────

    /// Ledger entries for one cell, oldest first.
    pub fn history_for_cell(&self, cell: &RateCell) -> MarginResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, customer_id, category_id, bandeira, produto, canal,
                    actor_id, previous_value, new_value, action, override_mode, created_at
             FROM override_history
             WHERE customer_id = ?1 AND category_id = ?2
               AND bandeira = ?3 AND produto = ?4 AND canal = ?5
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(
                params![cell.customer_id, cell.category_id, cell.bandeira, cell.produto, cell.canal],
                |row| {
                    Ok(HistoryEntry {
                        id:             Some(row.get(0)?),
                        cell:           cell_cols(row, 1)?,
                        actor_id:       row.get(6)?,
                        previous_value: rate_col(row, 7)?,
                        new_value:      rate_col(row, 8)?,
                        action:         enum_col(row, 9, HistoryAction::parse)?,
                        override_mode:  enum_col(row, 10, OverrideMode::parse)?,
                        timestamp:      ts_col(row, 11)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn history_count(&self, customer_id: &str) -> MarginResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM override_history WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )?)
    }
}
