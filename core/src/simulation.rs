//! Identity simulation ("view as") for super admins.
//!
//! A simulation lives only inside a signed token the client sends back with
//! each request:
//!
//!   base64url(claims JSON) "." base64url(HMAC-SHA256(claims JSON))
//!
//! RULES:
//!   - Only a verified, active super_admin may start or carry a simulation.
//!   - While simulating, permission resolution uses the target's own live
//!     record and grants, exactly as if the target had logged in.
//!   - A token that fails any check is dropped silently (warn log) and the
//!     request proceeds as the real actor. It never errors the request.

use crate::{
    config::AdminConfig,
    error::{MarginError, MarginResult},
    permission::{Capability, Identity, IdentityProvider, Session},
    types::ActorId,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Request-scoped view of who is really acting and as whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationContext {
    pub real_actor_id:   ActorId,
    pub target_actor_id: ActorId,
    pub is_simulating:   bool,
}

impl SimulationContext {
    fn direct(actor_id: &str) -> Self {
        Self {
            real_actor_id:   actor_id.to_string(),
            target_actor_id: actor_id.to_string(),
            is_simulating:   false,
        }
    }
}

/// Reply to a simulation request. `token` is `None` when the request was
/// dropped and the caller keeps acting as itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationGrant {
    pub context: SimulationContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token:   Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenClaims {
    real_actor_id:   ActorId,
    target_actor_id: ActorId,
    issued_at:       i64,
    expires_at:      i64,
    nonce:           String,
}

pub struct SimulationSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl SimulationSigner {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            key: secret.to_vec(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn from_config(config: &AdminConfig) -> Self {
        Self::new(config.signing_secret.as_bytes(), config.simulation_ttl_secs)
    }

    fn mac(&self) -> MarginResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| MarginError::Other(anyhow::anyhow!("hmac key: {e}")))
    }

    fn sign(&self, real: &str, target: &str, now: DateTime<Utc>) -> MarginResult<String> {
        let claims = TokenClaims {
            real_actor_id:   real.to_string(),
            target_actor_id: target.to_string(),
            issued_at:       now.timestamp(),
            expires_at:      (now + self.ttl).timestamp(),
            nonce:           uuid::Uuid::new_v4().to_string(),
        };
        let payload = serde_json::to_vec(&claims)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Claims of a well-formed, correctly signed, unexpired token.
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<TokenClaims> {
        let (payload_b64, signature_b64) = token.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(&payload);
        if mac.verify_slice(&signature).is_err() {
            log::warn!("simulation: token signature mismatch");
            return None;
        }

        let claims: TokenClaims = serde_json::from_slice(&payload).ok()?;
        if now.timestamp() >= claims.expires_at {
            log::warn!(
                "simulation: token for {} -> {} expired",
                claims.real_actor_id,
                claims.target_actor_id
            );
            return None;
        }
        Some(claims)
    }
}

/// Look up the authenticated (real) actor of a session.
fn real_identity<P: IdentityProvider + ?Sized>(
    provider: &P,
    session: &Session,
) -> MarginResult<Identity> {
    let actor_id = session
        .actor_id
        .as_deref()
        .ok_or(MarginError::AuthenticationRequired)?;
    match provider.identity(actor_id)? {
        Some(identity) if identity.active => Ok(identity),
        _ => Err(MarginError::AuthenticationRequired),
    }
}

/// Active target identity a super admin may simulate, or `None`.
fn simulation_target<P: IdentityProvider + ?Sized>(
    provider: &P,
    real: &Identity,
    target_actor_id: &str,
) -> MarginResult<Option<Identity>> {
    if !real.can(Capability::Simulate) {
        log::warn!(
            "simulation: {} ({}) may not simulate; dropped",
            real.actor_id,
            real.role.as_str()
        );
        return Ok(None);
    }
    match provider.identity(target_actor_id)? {
        Some(target) if target.active => Ok(Some(target)),
        Some(_) => {
            log::warn!("simulation: target {target_actor_id} is inactive; dropped");
            Ok(None)
        }
        None => {
            log::warn!("simulation: target {target_actor_id} is unknown; dropped");
            Ok(None)
        }
    }
}

/// Resolve the identity a request acts as, honouring a valid simulation token.
pub fn effective_identity<P: IdentityProvider + ?Sized>(
    provider: &P,
    signer: &SimulationSigner,
    session: &Session,
    now: DateTime<Utc>,
) -> MarginResult<(Identity, SimulationContext)> {
    let real = real_identity(provider, session)?;
    let Some(token) = session.simulation_token.as_deref() else {
        let context = SimulationContext::direct(&real.actor_id);
        return Ok((real, context));
    };

    let Some(claims) = signer.verify(token, now) else {
        let context = SimulationContext::direct(&real.actor_id);
        return Ok((real, context));
    };
    if claims.real_actor_id != real.actor_id {
        log::warn!(
            "simulation: token issued to {} presented by {}; dropped",
            claims.real_actor_id,
            real.actor_id
        );
        let context = SimulationContext::direct(&real.actor_id);
        return Ok((real, context));
    }

    match simulation_target(provider, &real, &claims.target_actor_id)? {
        Some(target) => {
            let context = SimulationContext {
                real_actor_id:   real.actor_id.clone(),
                target_actor_id: target.actor_id.clone(),
                is_simulating:   true,
            };
            Ok((target, context))
        }
        None => {
            let context = SimulationContext::direct(&real.actor_id);
            Ok((real, context))
        }
    }
}

/// Start simulating `target_actor_id`. Any simulation already carried by the
/// session is ignored: only the real actor may start a new one.
pub fn start_simulation<P: IdentityProvider + ?Sized>(
    provider: &P,
    signer: &SimulationSigner,
    session: &Session,
    target_actor_id: &str,
    now: DateTime<Utc>,
) -> MarginResult<SimulationGrant> {
    let real = real_identity(provider, session)?;
    match simulation_target(provider, &real, target_actor_id)? {
        Some(target) => {
            let token = signer.sign(&real.actor_id, &target.actor_id, now)?;
            log::info!("simulation: {} now acting as {}", real.actor_id, target.actor_id);
            Ok(SimulationGrant {
                context: SimulationContext {
                    real_actor_id:   real.actor_id,
                    target_actor_id: target.actor_id,
                    is_simulating:   true,
                },
                token: Some(token),
            })
        }
        None => Ok(SimulationGrant {
            context: SimulationContext::direct(&real.actor_id),
            token:   None,
        }),
    }
}
