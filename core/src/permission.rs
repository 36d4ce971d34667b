//! Permission resolver: role capabilities, ISO-access grants and field masking.
//!
//! RULE: capabilities are derived here, from the live identity record, on
//! every call. Nothing a client declares about its own role is trusted.

use crate::{
    composition::{MarginTiers, Tier},
    error::{MarginError, MarginResult},
    rate::Rate,
    types::{ActorId, CustomerId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Executivo,
    Core,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Executivo  => "executivo",
            Role::Core       => "core",
        }
    }

    pub fn parse(s: &str) -> MarginResult<Self> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "executivo"   => Ok(Role::Executivo),
            "core"        => Ok(Role::Core),
            other => Err(MarginError::invalid(format!("unknown role '{other}'"))),
        }
    }

    pub fn allows(self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::SuperAdmin => true,
            Role::Executivo  => matches!(capability, ReadMargins),
            Role::Core       => matches!(
                capability,
                ReadMargins | WriteMargin(Tier::Core) | EditOverrides
            ),
        }
    }

    /// Whether any cost figure (base cost, coreCost, a floor) may be shown.
    pub fn sees_cost(self) -> bool {
        !matches!(self, Role::Executivo)
    }

    /// The margin tiers this role may see.
    pub fn visible_tiers(self) -> &'static [Tier] {
        match self {
            Role::SuperAdmin => &Tier::ALL,
            Role::Executivo  => &[Tier::Executivo],
            Role::Core       => &[Tier::Core],
        }
    }
}

/// Things an actor may do inside this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ReadMargins,
    WriteMargin(Tier),
    EditOverrides,
    ManageLinks,
    TransitionLinks,
    Simulate,
}

/// A live identity record, as the directory reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub actor_id: ActorId,
    pub role:     Role,
    pub active:   bool,
    #[serde(default)]
    pub grants:   BTreeSet<CustomerId>,
}

impl Identity {
    pub fn is_super_admin(&self) -> bool {
        self.active && self.role == Role::SuperAdmin
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.active && self.role.allows(capability)
    }

    /// Fail with `PermissionDenied` unless the role holds `capability`.
    pub fn require(&self, capability: Capability) -> MarginResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(MarginError::denied(format!(
                "{} ({}) lacks {:?}",
                self.actor_id,
                self.role.as_str(),
                capability
            )))
        }
    }
}

/// Source of identity records (the session/identity collaborator).
pub trait IdentityProvider {
    fn identity(&self, actor_id: &str) -> MarginResult<Option<Identity>>;
}

/// The request envelope handed to every engine operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub actor_id:         Option<ActorId>,
    #[serde(default)]
    pub simulation_token: Option<String>,
}

impl Session {
    pub fn as_actor(actor_id: impl Into<String>) -> Self {
        Self { actor_id: Some(actor_id.into()), simulation_token: None }
    }

    pub fn with_simulation(mut self, token: impl Into<String>) -> Self {
        self.simulation_token = Some(token.into());
        self
    }
}

/// Outcome of resolving an identity against one ISO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    pub role:      Role,
    pub can_read:  bool,
    pub can_write: bool,
}

/// Resolve what `identity` may do against `customer_id`.
///
/// super_admin is independent of grants; every other role needs the ISO in
/// its explicit grant list, else `PermissionDenied`.
pub fn resolve(identity: &Identity, customer_id: &str) -> MarginResult<Access> {
    if !identity.active {
        return Err(MarginError::denied(format!("{} is inactive", identity.actor_id)));
    }
    if !identity.is_super_admin() && !identity.grants.contains(customer_id) {
        return Err(MarginError::denied(format!(
            "{} has no grant for ISO {customer_id}",
            identity.actor_id
        )));
    }
    let role = identity.role;
    Ok(Access {
        role,
        can_read:  role.allows(Capability::ReadMargins),
        can_write: role.allows(Capability::EditOverrides),
    })
}

/// Tier values as one role is allowed to see them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_outbank:   Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_executivo: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_core:      Option<Rate>,
}

impl TierView {
    pub fn masked(tiers: &MarginTiers, role: Role) -> Self {
        let visible = role.visible_tiers();
        let show = |tier: Tier| visible.contains(&tier).then(|| tiers.get(tier));
        Self {
            margin_outbank:   show(Tier::Outbank),
            margin_executivo: show(Tier::Executivo),
            margin_core:      show(Tier::Core),
        }
    }
}

/// The cost figure a role perceives beneath its own tier.
/// Executivo sees no cost at all.
pub fn visible_cost(role: Role, base_cost: Rate, tiers: &MarginTiers) -> Option<Rate> {
    match role {
        Role::Core => Some(crate::composition::core_cost(base_cost, tiers)),
        _          => role.sees_cost().then_some(base_cost),
    }
}
