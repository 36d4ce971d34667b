//! MDR links and their price-lock snapshots.

use super::{enum_col, rate_col, ts_col, ts_to_sql, MarginStore};
use crate::{
    composition::MarginTiers,
    error::MarginResult,
    mdr_link::{LinkStatus, MdrLink, PriceLockEntry},
    types::{LinkId, RateCell},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

fn link_row(row: &Row<'_>) -> rusqlite::Result<MdrLink> {
    Ok(MdrLink {
        link_id:     row.get(0)?,
        customer_id: row.get(1)?,
        category_id: row.get(2)?,
        status:      enum_col(row, 3, LinkStatus::parse)?,
        updated_at:  ts_col(row, 4)?,
    })
}

impl MarginStore {
    // ── MDR links ─────────────────────────────────────────────────

    pub fn insert_link(
        &self,
        customer_id: &str,
        category_id: &str,
        at: DateTime<Utc>,
    ) -> MarginResult<MdrLink> {
        self.conn.execute(
            "INSERT INTO mdr_link (customer_id, category_id, status, updated_at)
             VALUES (?1, ?2, 'rascunho', ?3)",
            params![customer_id, category_id, ts_to_sql(&at)],
        )?;
        Ok(MdrLink {
            link_id:     self.conn.last_insert_rowid(),
            customer_id: customer_id.to_string(),
            category_id: category_id.to_string(),
            status:      LinkStatus::Rascunho,
            updated_at:  at,
        })
    }

    pub fn find_link_for(&self, customer_id: &str, category_id: &str) -> MarginResult<Option<MdrLink>> {
        let link = self
            .conn
            .query_row(
                "SELECT link_id, customer_id, category_id, status, updated_at
                 FROM mdr_link WHERE customer_id = ?1 AND category_id = ?2",
                params![customer_id, category_id],
                link_row,
            )
            .optional()?;
        Ok(link)
    }

    pub fn get_link(&self, link_id: LinkId) -> MarginResult<Option<MdrLink>> {
        let link = self
            .conn
            .query_row(
                "SELECT link_id, customer_id, category_id, status, updated_at
                 FROM mdr_link WHERE link_id = ?1",
                params![link_id],
                link_row,
            )
            .optional()?;
        Ok(link)
    }

    pub fn list_links(&self, customer_id: &str) -> MarginResult<Vec<MdrLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT link_id, customer_id, category_id, status, updated_at
             FROM mdr_link WHERE customer_id = ?1 ORDER BY link_id",
        )?;
        let rows = stmt.query_map(params![customer_id], link_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Removes the link; its price lock goes with it (ON DELETE CASCADE).
    pub fn delete_link(&self, link_id: LinkId) -> MarginResult<bool> {
        let n = self
            .conn
            .execute("DELETE FROM mdr_link WHERE link_id = ?1", params![link_id])?;
        Ok(n > 0)
    }

    pub fn set_link_status(
        &self,
        link_id: LinkId,
        status: LinkStatus,
        at: DateTime<Utc>,
    ) -> MarginResult<()> {
        self.conn.execute(
            "UPDATE mdr_link SET status = ?1, updated_at = ?2 WHERE link_id = ?3",
            params![status.as_str(), ts_to_sql(&at), link_id],
        )?;
        Ok(())
    }

    /// Move the link to `validada` and replace its price lock, atomically.
    pub fn validate_link(
        &self,
        link_id: LinkId,
        snapshot: &[PriceLockEntry],
        at: DateTime<Utc>,
    ) -> MarginResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute("DELETE FROM price_lock WHERE link_id = ?1", params![link_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO price_lock (
                    link_id, bandeira, produto, canal, base_cost,
                    margin_outbank, margin_executivo, margin_core, final_rate, locked_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for entry in snapshot {
                stmt.execute(params![
                    link_id,
                    entry.cell.bandeira,
                    entry.cell.produto,
                    entry.cell.canal,
                    entry.base_cost.units(),
                    entry.tiers.margin_outbank.units(),
                    entry.tiers.margin_executivo.units(),
                    entry.tiers.margin_core.units(),
                    entry.final_rate.units(),
                    ts_to_sql(&entry.locked_at),
                ])?;
            }
        }
        tx.execute(
            "UPDATE mdr_link SET status = 'validada', updated_at = ?1 WHERE link_id = ?2",
            params![ts_to_sql(&at), link_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn price_lock(&self, link: &MdrLink) -> MarginResult<Vec<PriceLockEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT bandeira, produto, canal, base_cost,
                    margin_outbank, margin_executivo, margin_core, final_rate, locked_at
             FROM price_lock WHERE link_id = ?1
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![link.link_id], |row| {
            Ok(PriceLockEntry {
                link_id: link.link_id,
                cell: RateCell {
                    customer_id: link.customer_id.clone(),
                    category_id: link.category_id.clone(),
                    bandeira:    row.get(0)?,
                    produto:     row.get(1)?,
                    canal:       row.get(2)?,
                },
                base_cost: rate_col(row, 3)?,
                tiers: MarginTiers {
                    margin_outbank:   rate_col(row, 4)?,
                    margin_executivo: rate_col(row, 5)?,
                    margin_core:      rate_col(row, 6)?,
                },
                final_rate: rate_col(row, 7)?,
                locked_at:  ts_col(row, 8)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
