//! Override rows. Every mutation here is paired with a history entry
//! inside one SQLite transaction.

use super::{cell_cols, enum_col, history::append_history, rate_col, ts_col, ts_to_sql, MarginStore};
use crate::{
    composition::MarginTiers,
    error::MarginResult,
    history::{HistoryAction, HistoryEntry},
    override_engine::{Override, OverrideMode},
    rate::Rate,
    types::RateCell,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const OVERRIDE_COLUMNS: &str =
    "customer_id, category_id, bandeira, produto, canal,
     valor_original, valor_override, override_mode, base_cost,
     margin_outbank, margin_executivo, margin_core, updated_by, updated_at";

fn override_row(row: &Row<'_>) -> rusqlite::Result<Override> {
    Ok(Override {
        cell:           cell_cols(row, 0)?,
        valor_original: rate_col(row, 5)?,
        valor_override: rate_col(row, 6)?,
        override_mode:  enum_col(row, 7, OverrideMode::parse)?,
        base_cost:      rate_col(row, 8)?,
        tiers: MarginTiers {
            margin_outbank:   rate_col(row, 9)?,
            margin_executivo: rate_col(row, 10)?,
            margin_core:      rate_col(row, 11)?,
        },
        updated_by: row.get(12)?,
        updated_at: ts_col(row, 13)?,
    })
}

fn find_override(conn: &Connection, cell: &RateCell) -> MarginResult<Option<Override>> {
    let sql = format!(
        "SELECT {OVERRIDE_COLUMNS} FROM rate_override
         WHERE customer_id = ?1 AND category_id = ?2
           AND bandeira = ?3 AND produto = ?4 AND canal = ?5"
    );
    let found = conn
        .query_row(
            &sql,
            params![cell.customer_id, cell.category_id, cell.bandeira, cell.produto, cell.canal],
            override_row,
        )
        .optional()?;
    Ok(found)
}

impl MarginStore {
    // ── Overrides ─────────────────────────────────────────────────

    pub fn get_override(&self, cell: &RateCell) -> MarginResult<Option<Override>> {
        find_override(&self.conn, cell)
    }

    pub fn list_overrides(&self, customer_id: &str) -> MarginResult<Vec<Override>> {
        let sql = format!(
            "SELECT {OVERRIDE_COLUMNS} FROM rate_override
             WHERE customer_id = ?1
             ORDER BY category_id, bandeira, produto, canal"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![customer_id], override_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn override_count(&self, customer_id: &str) -> MarginResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM rate_override WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )?)
    }

    /// Upsert the override and append its CRIADO/ATUALIZADO entry atomically.
    /// The action is decided inside the transaction from the row's presence.
    pub fn commit_override(
        &self,
        record: &Override,
        previous_value: Rate,
    ) -> MarginResult<HistoryAction> {
        let tx = self.conn.unchecked_transaction()?;

        let action = match find_override(&tx, &record.cell)? {
            Some(_) => HistoryAction::Atualizado,
            None => HistoryAction::Criado,
        };

        tx.execute(
            "INSERT INTO rate_override (
                customer_id, category_id, bandeira, produto, canal,
                valor_original, valor_override, override_mode, base_cost,
                margin_outbank, margin_executivo, margin_core, updated_by, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(customer_id, category_id, bandeira, produto, canal) DO UPDATE SET
                valor_override   = excluded.valor_override,
                override_mode    = excluded.override_mode,
                base_cost        = excluded.base_cost,
                margin_outbank   = excluded.margin_outbank,
                margin_executivo = excluded.margin_executivo,
                margin_core      = excluded.margin_core,
                updated_by       = excluded.updated_by,
                updated_at       = excluded.updated_at",
            params![
                record.cell.customer_id,
                record.cell.category_id,
                record.cell.bandeira,
                record.cell.produto,
                record.cell.canal,
                record.valor_original.units(),
                record.valor_override.units(),
                record.override_mode.as_str(),
                record.base_cost.units(),
                record.tiers.margin_outbank.units(),
                record.tiers.margin_executivo.units(),
                record.tiers.margin_core.units(),
                record.updated_by,
                ts_to_sql(&record.updated_at),
            ],
        )?;

        append_history(
            &tx,
            &HistoryEntry::new(
                &record.cell,
                &record.updated_by,
                previous_value,
                record.valor_override,
                action,
                record.override_mode,
                record.updated_at,
            ),
        )?;

        tx.commit()?;
        Ok(action)
    }

    /// Delete the cell's override and append a REVERTIDO entry atomically.
    /// Returns `None`, writing nothing, when there was no override.
    pub fn revert_override(
        &self,
        cell: &RateCell,
        actor_id: &str,
        baseline: Rate,
        at: DateTime<Utc>,
    ) -> MarginResult<Option<Override>> {
        let tx = self.conn.unchecked_transaction()?;

        let Some(existing) = find_override(&tx, cell)? else {
            return Ok(None);
        };

        tx.execute(
            "DELETE FROM rate_override
             WHERE customer_id = ?1 AND category_id = ?2
               AND bandeira = ?3 AND produto = ?4 AND canal = ?5",
            params![cell.customer_id, cell.category_id, cell.bandeira, cell.produto, cell.canal],
        )?;

        append_history(
            &tx,
            &HistoryEntry::new(
                cell,
                actor_id,
                existing.valor_override,
                baseline,
                HistoryAction::Revertido,
                existing.override_mode,
                at,
            ),
        )?;

        tx.commit()?;
        Ok(Some(existing))
    }
}
