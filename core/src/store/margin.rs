use super::{rate_col, ts_col, ts_to_sql, MarginStore};
use crate::{composition::{MarginConfig, MarginTiers}, error::MarginResult};
use rusqlite::{params, OptionalExtension};

impl MarginStore {
    // ── Margin config ─────────────────────────────────────────────

    pub fn get_margin_config(&self, customer_id: &str) -> MarginResult<Option<MarginConfig>> {
        let config = self
            .conn
            .query_row(
                "SELECT customer_id, margin_outbank, margin_executivo, margin_core, updated_at
                 FROM margin_config WHERE customer_id = ?1",
                params![customer_id],
                |row| {
                    Ok(MarginConfig {
                        customer_id: row.get(0)?,
                        tiers: MarginTiers {
                            margin_outbank:   rate_col(row, 1)?,
                            margin_executivo: rate_col(row, 2)?,
                            margin_core:      rate_col(row, 3)?,
                        },
                        updated_at: ts_col(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(config)
    }

    /// Insert or replace all three tiers of an ISO's margin stack.
    pub fn upsert_margin_config(&self, config: &MarginConfig) -> MarginResult<()> {
        self.conn.execute(
            "INSERT INTO margin_config (
                customer_id, margin_outbank, margin_executivo, margin_core, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(customer_id) DO UPDATE SET
                margin_outbank   = excluded.margin_outbank,
                margin_executivo = excluded.margin_executivo,
                margin_core      = excluded.margin_core,
                updated_at       = excluded.updated_at",
            params![
                config.customer_id,
                config.tiers.margin_outbank.units(),
                config.tiers.margin_executivo.units(),
                config.tiers.margin_core.units(),
                ts_to_sql(&config.updated_at),
            ],
        )?;
        Ok(())
    }
}
