//! Identity directory: actors, roles and ISO-access grants.

use super::{enum_col, MarginStore};
use crate::{
    error::MarginResult,
    permission::{Identity, IdentityProvider, Role},
};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeSet;

impl MarginStore {
    pub fn upsert_actor(&self, actor_id: &str, role: Role, active: bool) -> MarginResult<()> {
        self.conn.execute(
            "INSERT INTO actor (actor_id, role, active) VALUES (?1, ?2, ?3)
             ON CONFLICT(actor_id) DO UPDATE SET role = excluded.role, active = excluded.active",
            params![actor_id, role.as_str(), active as i64],
        )?;
        Ok(())
    }

    pub fn set_actor_active(&self, actor_id: &str, active: bool) -> MarginResult<()> {
        self.conn.execute(
            "UPDATE actor SET active = ?1 WHERE actor_id = ?2",
            params![active as i64, actor_id],
        )?;
        Ok(())
    }

    pub fn grant_iso(&self, actor_id: &str, customer_id: &str) -> MarginResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO iso_grant (actor_id, customer_id) VALUES (?1, ?2)",
            params![actor_id, customer_id],
        )?;
        Ok(())
    }

    pub fn revoke_iso(&self, actor_id: &str, customer_id: &str) -> MarginResult<()> {
        self.conn.execute(
            "DELETE FROM iso_grant WHERE actor_id = ?1 AND customer_id = ?2",
            params![actor_id, customer_id],
        )?;
        Ok(())
    }
}

impl IdentityProvider for MarginStore {
    fn identity(&self, actor_id: &str) -> MarginResult<Option<Identity>> {
        let head = self
            .conn
            .query_row(
                "SELECT actor_id, role, active FROM actor WHERE actor_id = ?1",
                params![actor_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        enum_col(row, 1, Role::parse)?,
                        row.get::<_, i64>(2)? != 0,
                    ))
                },
            )
            .optional()?;
        let Some((actor_id, role, active)) = head else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT customer_id FROM iso_grant WHERE actor_id = ?1 ORDER BY customer_id",
        )?;
        let grants = stmt
            .query_map(params![actor_id], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Some(Identity { actor_id, role, active, grants }))
    }
}
