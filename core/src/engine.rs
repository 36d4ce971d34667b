//! The margin engine: every externally visible operation of the core.
//!
//! ORDER OF CHECKS (fixed for every operation):
//!   1. Authenticate the session, honouring a valid simulation token.
//!   2. Resolve role and ISO grant for the target customer.
//!   3. Check the role's capability for the operation.
//!   4. Validate input and invariants.
//!   5. Write (one transaction where more than one row changes).
//!
//! No write happens before steps 1-4 pass. Read views are masked per role.

use crate::{
    clock::{Clock, FixedClock, SystemClock},
    composition::{CellPricing, MarginConfig, MarginTiers, Tier},
    config::{AdminConfig, OverrideOptions},
    cost::CostProvider,
    error::{MarginError, MarginResult},
    history::{HistoryAction, HistoryEntry},
    mdr_link::{self, LinkStatus, MdrLink, PriceLockEntry, TransitionEffect},
    override_engine::{self, Override, OverrideMode, Preview, RevertOutcome},
    permission::{self, Access, Capability, Identity, Role, Session, TierView},
    rate::Rate,
    simulation::{self, SimulationGrant, SimulationSigner},
    store::MarginStore,
    types::{LinkId, RateCell},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields of a `SetMarginConfig` request. `None` leaves a tier unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginPatch {
    #[serde(default)]
    pub margin_outbank:   Option<Rate>,
    #[serde(default)]
    pub margin_executivo: Option<Rate>,
    #[serde(default)]
    pub margin_core:      Option<Rate>,
}

impl MarginPatch {
    fn fields(&self) -> impl Iterator<Item = (Tier, Rate)> + '_ {
        [
            (Tier::Outbank, self.margin_outbank),
            (Tier::Executivo, self.margin_executivo),
            (Tier::Core, self.margin_core),
        ]
        .into_iter()
        .filter_map(|(tier, value)| value.map(|v| (tier, v)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginConfigView {
    pub customer_id: String,
    #[serde(flatten)]
    pub tiers:       TierView,
    pub updated_at:  DateTime<Utc>,
}

impl MarginConfigView {
    fn masked(config: &MarginConfig, role: Role) -> Self {
        Self {
            customer_id: config.customer_id.clone(),
            tiers:       TierView::masked(&config.tiers, role),
            updated_at:  config.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideView {
    pub cell:           RateCell,
    pub valor_original: Rate,
    pub valor_override: Rate,
    pub override_mode:  OverrideMode,
    pub tiers:          TierView,
    pub updated_by:     String,
    pub updated_at:     DateTime<Utc>,
}

impl OverrideView {
    fn masked(record: &Override, role: Role) -> Self {
        Self {
            cell:           record.cell.clone(),
            valor_original: record.valor_original,
            valor_override: record.valor_override,
            override_mode:  record.override_mode,
            tiers:          TierView::masked(&record.tiers, role),
            updated_by:     record.updated_by.clone(),
            updated_at:     record.updated_at,
        }
    }
}

/// Preview reply: the redistribution as the requesting role may see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierBreakdown {
    pub cell:          RateCell,
    pub current_final: Rate,
    pub requested:     Rate,
    pub delta:         Rate,
    /// Hidden from roles without cost visibility: it is baseCost or coreCost.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor:         Option<Rate>,
    pub mode:          OverrideMode,
    pub core_edit:     bool,
    pub tiers:         TierView,
}

impl TierBreakdown {
    fn masked(preview: &Preview, role: Role) -> Self {
        Self {
            cell:          preview.cell.clone(),
            current_final: preview.current_final,
            requested:     preview.requested,
            delta:         preview.delta,
            floor:         role.sees_cost().then_some(preview.floor),
            mode:          preview.mode,
            core_edit:     preview.core_edit,
            tiers:         TierView::masked(&preview.tiers, role),
        }
    }
}

/// One price-lock cell, masked like a live quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLockView {
    pub link_id:      LinkId,
    pub cell:         RateCell,
    pub final_rate:   Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_cost: Option<Rate>,
    pub tiers:        TierView,
    pub locked_at:    DateTime<Utc>,
}

impl PriceLockView {
    fn masked(entry: &PriceLockEntry, role: Role) -> Self {
        Self {
            link_id:      entry.link_id,
            cell:         entry.cell.clone(),
            final_rate:   entry.final_rate,
            visible_cost: permission::visible_cost(role, entry.base_cost, &entry.tiers),
            tiers:        TierView::masked(&entry.tiers, role),
            locked_at:    entry.locked_at,
        }
    }
}

/// The effective rate of one cell, as the requesting role may see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellQuote {
    pub cell:         RateCell,
    pub final_rate:   Rate,
    pub overridden:   bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_cost: Option<Rate>,
    pub tiers:        TierView,
}

/// What a commit did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "override", rename_all = "snake_case")]
pub enum CommitOutcome {
    Created(OverrideView),
    Updated(OverrideView),
    /// Requested value equals the current one; nothing written.
    Unchanged,
}

pub struct MarginEngine {
    pub store: MarginStore,
    costs:     Box<dyn CostProvider>,
    clock:     Box<dyn Clock>,
    signer:    SimulationSigner,
    config:    AdminConfig,
}

impl MarginEngine {
    pub fn new(
        store: MarginStore,
        costs: Box<dyn CostProvider>,
        clock: Box<dyn Clock>,
        config: AdminConfig,
    ) -> Self {
        Self {
            signer: SimulationSigner::from_config(&config),
            store,
            costs,
            clock,
            config,
        }
    }

    /// Production wiring: file-backed store, system clock.
    pub fn build(
        db_path: &str,
        costs: Box<dyn CostProvider>,
        config: AdminConfig,
    ) -> MarginResult<Self> {
        let store = MarginStore::open(db_path)?;
        store.migrate()?;
        Ok(Self::new(store, costs, Box::new(SystemClock), config))
    }

    /// Test wiring: migrated in-memory store, fixed clock, test config.
    pub fn build_test(costs: Box<dyn CostProvider>) -> MarginResult<Self> {
        let store = MarginStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(
            store,
            costs,
            Box::new(FixedClock::epoch()),
            AdminConfig::default_test(),
        ))
    }

    /// Swap the clock (tests advance time through a shared `FixedClock`).
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // ── Identity ──────────────────────────────────────────────────

    fn acting_identity(&self, session: &Session) -> MarginResult<Identity> {
        let (identity, _) =
            simulation::effective_identity(&self.store, &self.signer, session, self.clock.now())?;
        Ok(identity)
    }

    /// Identity plus its access to `customer_id`.
    fn access(&self, session: &Session, customer_id: &str) -> MarginResult<(Identity, Access)> {
        let identity = self.acting_identity(session)?;
        let access = permission::resolve(&identity, customer_id)?;
        Ok((identity, access))
    }

    /// `Resolve(actor, targetCustomerId)`.
    pub fn resolve(&self, session: &Session, customer_id: &str) -> MarginResult<Access> {
        self.access(session, customer_id).map(|(_, access)| access)
    }

    /// `SetSimulation(targetActorId, actor)`. A rejected request falls back
    /// to the real actor and carries no token.
    pub fn set_simulation(
        &self,
        target_actor_id: &str,
        session: &Session,
    ) -> MarginResult<SimulationGrant> {
        simulation::start_simulation(
            &self.store,
            &self.signer,
            session,
            target_actor_id,
            self.clock.now(),
        )
    }

    // ── Rate composition ──────────────────────────────────────────

    fn live_tiers(&self, customer_id: &str) -> MarginResult<MarginTiers> {
        Ok(self
            .store
            .get_margin_config(customer_id)?
            .map(|c| c.tiers)
            .unwrap_or_default())
    }

    fn pricing(&self, cell: &RateCell) -> MarginResult<CellPricing> {
        let base_cost = self.costs.base_cost(
            &cell.category_id,
            &cell.bandeira,
            &cell.produto,
            &cell.canal,
        )?;
        Ok(CellPricing {
            cell: cell.clone(),
            base_cost,
            tiers: self.live_tiers(&cell.customer_id)?,
        })
    }

    /// Effective rate of one cell: the override if present, else the live baseline.
    pub fn quote_cell(&self, cell: &RateCell, session: &Session) -> MarginResult<CellQuote> {
        let (identity, _) = self.access(session, &cell.customer_id)?;
        let pricing = self.pricing(cell)?;
        let active = self.store.get_override(cell)?;
        let (final_rate, tiers) = match &active {
            Some(o) => (o.valor_override, o.tiers),
            None => (pricing.baseline(), pricing.tiers),
        };
        Ok(CellQuote {
            cell: cell.clone(),
            final_rate,
            overridden: active.is_some(),
            visible_cost: permission::visible_cost(identity.role, pricing.base_cost, &tiers),
            tiers: TierView::masked(&tiers, identity.role),
        })
    }

    // ── Margin config ─────────────────────────────────────────────

    pub fn get_margin_config(
        &self,
        customer_id: &str,
        session: &Session,
    ) -> MarginResult<MarginConfigView> {
        let (identity, _) = self.access(session, customer_id)?;
        let config = self
            .store
            .get_margin_config(customer_id)?
            .ok_or_else(|| MarginError::not_found(format!("margin config for {customer_id}")))?;
        Ok(MarginConfigView::masked(&config, identity.role))
    }

    /// Apply the fields present in `patch`. Every field must be writable by
    /// the actor's role; one forbidden field rejects the whole request.
    pub fn set_margin_config(
        &self,
        customer_id: &str,
        patch: &MarginPatch,
        session: &Session,
    ) -> MarginResult<MarginConfigView> {
        let (identity, _) = self.access(session, customer_id)?;

        if !Tier::ALL.iter().any(|t| identity.can(Capability::WriteMargin(*t))) {
            log::warn!("margins: {} has no write access on {customer_id}", identity.actor_id);
            return Err(MarginError::denied(format!(
                "{} may not write margins",
                identity.role.as_str()
            )));
        }
        let mut fields = patch.fields().peekable();
        if fields.peek().is_none() {
            return Err(MarginError::invalid("no margin fields supplied"));
        }

        let now = self.clock.now();
        let mut config = self
            .store
            .get_margin_config(customer_id)?
            .unwrap_or_else(|| MarginConfig {
                customer_id: customer_id.to_string(),
                tiers:       MarginTiers::default(),
                updated_at:  now,
            });

        for (tier, value) in fields {
            if let Err(e) = identity.require(Capability::WriteMargin(tier)) {
                log::warn!("margins: {} may not write {} on {customer_id}", identity.actor_id, tier.as_str());
                return Err(e);
            }
            if value.is_negative() {
                return Err(MarginError::invalid(format!(
                    "{} must not be negative (got {})",
                    tier.as_str(),
                    value.to_plain()
                )));
            }
            config.tiers.set(tier, value.bounded(tier.as_str())?);
        }
        config.updated_at = now;

        self.store.upsert_margin_config(&config)?;
        log::info!(
            "margins: {customer_id} set by {} -> outbank={} executivo={} core={}",
            identity.actor_id,
            config.tiers.margin_outbank,
            config.tiers.margin_executivo,
            config.tiers.margin_core
        );
        Ok(MarginConfigView::masked(&config, identity.role))
    }

    // ── Overrides ─────────────────────────────────────────────────

    /// Shared front half of preview and commit.
    fn plan_override(
        &self,
        identity: &Identity,
        cell: &RateCell,
        requested: Rate,
        mode: Option<OverrideMode>,
    ) -> MarginResult<(Preview, Option<Override>)> {
        let requested = requested.bounded("requested rate")?;
        let core_edit = identity.role == Role::Core;
        // The core rule ignores the mode; record the configured one.
        let mode = match mode {
            Some(m) if !core_edit => m,
            _ => self.config.default_mode,
        };
        let options = OverrideOptions { mode, core_edit };
        let pricing = self.pricing(cell)?;
        let active = self.store.get_override(cell)?;
        let preview = override_engine::preview(&pricing, active.as_ref(), requested, options);
        Ok((preview, active))
    }

    /// `PreviewOverride`: computes and validates, writes nothing.
    pub fn preview_override(
        &self,
        cell: &RateCell,
        requested: Rate,
        mode: Option<OverrideMode>,
        session: &Session,
    ) -> MarginResult<TierBreakdown> {
        let (identity, _) = self.access(session, &cell.customer_id)?;
        let (preview, _) = self.plan_override(&identity, cell, requested, mode)?;
        if let Err(e) = override_engine::validate(&preview) {
            if identity.role.sees_cost() {
                return Err(e);
            }
            // The detailed reason names the floor or a tier the role may not see.
            return Err(MarginError::invalid(format!(
                "requested rate {} is not permitted for {cell}",
                preview.requested.to_plain()
            )));
        }
        log::debug!(
            "override: preview {cell} {} -> {} (delta {})",
            preview.current_final,
            preview.requested,
            preview.delta
        );
        Ok(TierBreakdown::masked(&preview, identity.role))
    }

    /// `CommitOverride`: preview, validate, then upsert + history in one
    /// transaction. Concurrent edits of one cell are last-write-wins.
    pub fn commit_override(
        &self,
        cell: &RateCell,
        requested: Rate,
        mode: Option<OverrideMode>,
        session: &Session,
    ) -> MarginResult<CommitOutcome> {
        let (identity, _) = self.access(session, &cell.customer_id)?;
        identity.require(Capability::EditOverrides)?;

        let (preview, active) = self.plan_override(&identity, cell, requested, mode)?;
        if preview.is_noop() {
            log::debug!("override: {cell} already at {}; nothing to commit", requested);
            return Ok(CommitOutcome::Unchanged);
        }
        if let Err(e) = override_engine::validate(&preview) {
            log::warn!("override: {} rejected for {cell}: {e}", identity.actor_id);
            return Err(e);
        }

        let record =
            override_engine::to_override(&preview, active.as_ref(), &identity.actor_id, self.clock.now());
        let action = self.store.commit_override(&record, preview.current_final)?;
        log::info!(
            "override: {cell} {} {} -> {} by {} ({})",
            action.as_str(),
            preview.current_final,
            record.valor_override,
            identity.actor_id,
            if preview.core_edit { "core" } else { preview.mode.as_str() }
        );

        let view = OverrideView::masked(&record, identity.role);
        Ok(match action {
            HistoryAction::Criado => CommitOutcome::Created(view),
            _ => CommitOutcome::Updated(view),
        })
    }

    /// `RevertOverride`. Reverting a cell with no override succeeds and
    /// writes nothing.
    pub fn revert_override(&self, cell: &RateCell, session: &Session) -> MarginResult<RevertOutcome> {
        let (identity, _) = self.access(session, &cell.customer_id)?;
        identity.require(Capability::EditOverrides)?;

        let baseline = self.pricing(cell)?.baseline();
        match self
            .store
            .revert_override(cell, &identity.actor_id, baseline, self.clock.now())?
        {
            Some(previous) => {
                log::info!(
                    "override: {cell} REVERTIDO {} -> {} by {}",
                    previous.valor_override,
                    baseline,
                    identity.actor_id
                );
                Ok(RevertOutcome::Reverted { previous: previous.valor_override, baseline })
            }
            None => {
                log::debug!("override: {cell} has no override; revert is a no-op");
                Ok(RevertOutcome::NothingToRevert)
            }
        }
    }

    pub fn list_overrides(
        &self,
        customer_id: &str,
        session: &Session,
    ) -> MarginResult<Vec<OverrideView>> {
        let (identity, _) = self.access(session, customer_id)?;
        identity.require(Capability::ReadMargins)?;
        Ok(self
            .store
            .list_overrides(customer_id)?
            .iter()
            .map(|o| OverrideView::masked(o, identity.role))
            .collect())
    }

    /// Ledger entries for one cell, oldest first.
    pub fn list_history(&self, cell: &RateCell, session: &Session) -> MarginResult<Vec<HistoryEntry>> {
        let (identity, _) = self.access(session, &cell.customer_id)?;
        identity.require(Capability::ReadMargins)?;
        self.store.history_for_cell(cell)
    }

    // ── MDR links ─────────────────────────────────────────────────

    /// Resolve a client-supplied link id; any miss means stale client state.
    fn existing_link(&self, raw_link_id: &str) -> MarginResult<MdrLink> {
        let link_id = mdr_link::parse_link_id(raw_link_id)?;
        self.store
            .get_link(link_id)?
            .ok_or_else(|| MarginError::ReloadRequired {
                reason: format!("link {link_id} no longer exists"),
            })
    }

    pub fn link_table(
        &self,
        customer_id: &str,
        category_id: &str,
        session: &Session,
    ) -> MarginResult<MdrLink> {
        let identity = self.acting_identity(session)?;
        identity.require(Capability::ManageLinks)?;
        if !self.costs.has_category(category_id) {
            return Err(MarginError::not_found(format!("cost category {category_id}")));
        }
        if self.store.find_link_for(customer_id, category_id)?.is_some() {
            return Err(MarginError::invalid(format!(
                "{customer_id} is already linked to {category_id}"
            )));
        }
        let link = self.store.insert_link(customer_id, category_id, self.clock.now())?;
        log::info!(
            "links: {customer_id} linked to {category_id} as #{} by {}",
            link.link_id,
            identity.actor_id
        );
        Ok(link)
    }

    pub fn unlink_table(&self, raw_link_id: &str, session: &Session) -> MarginResult<()> {
        let identity = self.acting_identity(session)?;
        identity.require(Capability::ManageLinks)?;
        let link = self.existing_link(raw_link_id)?;
        if !self.store.delete_link(link.link_id)? {
            return Err(MarginError::ReloadRequired {
                reason: format!("link {} no longer exists", link.link_id),
            });
        }
        log::info!("links: #{} removed by {}", link.link_id, identity.actor_id);
        Ok(())
    }

    pub fn list_links(&self, customer_id: &str, session: &Session) -> MarginResult<Vec<MdrLink>> {
        let (identity, _) = self.access(session, customer_id)?;
        identity.require(Capability::ReadMargins)?;
        self.store.list_links(customer_id)
    }

    pub fn list_price_lock(
        &self,
        raw_link_id: &str,
        session: &Session,
    ) -> MarginResult<Vec<PriceLockView>> {
        let identity = self.acting_identity(session)?;
        let link = self.existing_link(raw_link_id)?;
        permission::resolve(&identity, &link.customer_id)?;
        identity.require(Capability::ReadMargins)?;
        Ok(self
            .store
            .price_lock(&link)?
            .iter()
            .map(|entry| PriceLockView::masked(entry, identity.role))
            .collect())
    }

    /// `TransitionLinkStatus`.
    pub fn transition_link_status(
        &self,
        raw_link_id: &str,
        new_status: LinkStatus,
        session: &Session,
    ) -> MarginResult<MdrLink> {
        let identity = self.acting_identity(session)?;
        identity.require(Capability::TransitionLinks)?;
        let link = self.existing_link(raw_link_id)?;
        let now = self.clock.now();

        match mdr_link::plan_transition(link.status, new_status)? {
            TransitionEffect::Unchanged => return Ok(link),
            TransitionEffect::Deactivate => {
                self.store.set_link_status(link.link_id, LinkStatus::Inativa, now)?;
            }
            TransitionEffect::Validate => {
                let Some(config) = self.store.get_margin_config(&link.customer_id)? else {
                    log::warn!(
                        "links: #{} cannot be validated, {} has no margin config",
                        link.link_id,
                        link.customer_id
                    );
                    return Err(MarginError::invalid(format!(
                        "margins for {} must be configured before validating",
                        link.customer_id
                    )));
                };
                let snapshot = self.price_lock_snapshot(&link, &config.tiers, now)?;
                self.store.validate_link(link.link_id, &snapshot, now)?;
                log::info!("links: #{} price-locked {} cells", link.link_id, snapshot.len());
            }
        }

        log::info!(
            "links: #{} {} -> {} by {}",
            link.link_id,
            link.status.as_str(),
            new_status.as_str(),
            identity.actor_id
        );
        Ok(MdrLink { status: new_status, updated_at: now, ..link })
    }

    /// Freeze the current baseline decomposition of every cell under a link.
    fn price_lock_snapshot(
        &self,
        link: &MdrLink,
        tiers: &MarginTiers,
        at: DateTime<Utc>,
    ) -> MarginResult<Vec<PriceLockEntry>> {
        let cells = self.costs.cells(&link.category_id)?;
        Ok(cells
            .into_iter()
            .map(|c| {
                let pricing = CellPricing {
                    cell: RateCell::new(
                        link.customer_id.clone(),
                        c.category_id,
                        c.bandeira,
                        c.produto,
                        c.canal,
                    ),
                    base_cost: c.base_cost,
                    tiers: *tiers,
                };
                PriceLockEntry::freeze(link.link_id, &pricing, at)
            })
            .collect())
    }
}
