use std::collections::BTreeSet;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use syncroom_core::ErrorCode;
use syncroom_core::time::now_secs;

use crate::config::AuthFileConfig;

/// Claim value for the `type` field of invite tokens.
const INVITE_TYPE: &str = "invite";

/// JWT claims accepted on the session channel and the HTTP surface.
///
/// `role`/`roles` are polymorphic on purpose: identity providers emit a
/// plain string, a comma-separated string, or an array, and all three
/// normalize to the same role set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleClaim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<RoleClaim>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleClaim {
    One(String),
    Many(Vec<String>),
}

impl Claims {
    /// All roles held by this principal, lowercased. Handles string,
    /// CSV-string, and array forms of both claim fields.
    pub fn role_set(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        for claim in [&self.role, &self.roles].into_iter().flatten() {
            match claim {
                RoleClaim::One(s) => collect_roles(s, &mut set),
                RoleClaim::Many(items) => {
                    for s in items {
                        collect_roles(s, &mut set);
                    }
                },
            }
        }
        set
    }
}

fn collect_roles(raw: &str, into: &mut BTreeSet<String>) {
    for part in raw.split(',') {
        let part = part.trim();
        if !part.is_empty() {
            into.insert(part.to_lowercase());
        }
    }
}

/// True when `required` is empty or the principal holds at least one of
/// the required roles (case-insensitive).
pub fn require_roles(claims: &Claims, required: &[String]) -> bool {
    if required.is_empty() {
        return true;
    }
    let held = claims.role_set();
    required.iter().any(|r| held.contains(&r.to_lowercase()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    AuthRequired,
    Forbidden,
    TokenExpired,
    TokenInvalid,
    InviteInvalid,
    InviteRoomMismatch,
    InviteDisabled,
}

impl AuthError {
    pub fn code(self) -> ErrorCode {
        match self {
            Self::AuthRequired => ErrorCode::AuthRequired,
            Self::Forbidden => ErrorCode::Forbidden,
            Self::TokenExpired => ErrorCode::TokenExpired,
            Self::TokenInvalid => ErrorCode::TokenInvalid,
            Self::InviteInvalid => ErrorCode::InviteInvalid,
            Self::InviteRoomMismatch => ErrorCode::InviteRoomMismatch,
            Self::InviteDisabled => ErrorCode::InviteDisabled,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::AuthRequired => "authentication required",
            Self::Forbidden => "principal lacks a required role",
            Self::TokenExpired => "token has expired",
            Self::TokenInvalid => "token is invalid",
            Self::InviteInvalid => "invite token is invalid",
            Self::InviteRoomMismatch => "invite is for a different room",
            Self::InviteDisabled => "invites require a configured secret",
        };
        f.write_str(msg)
    }
}

/// A freshly signed invite.
#[derive(Debug, Clone)]
pub struct IssuedInvite {
    pub token: String,
    pub expires_at: u64,
}

/// Token verification and invite minting. Stateless; safe to share
/// behind an `Arc`.
pub struct AuthConfig {
    encoding_key: Option<EncodingKey>,
    decoding_key: Option<DecodingKey>,
    audience: Option<String>,
    issuer: Option<String>,
    invite_ttl: Duration,
    host_roles: Vec<String>,
    invite_roles: Vec<String>,
}

impl AuthConfig {
    pub fn new(cfg: &AuthFileConfig) -> Self {
        let secret = cfg.secret.as_deref().filter(|s| !s.is_empty());
        Self {
            encoding_key: secret.map(|s| EncodingKey::from_secret(s.as_bytes())),
            decoding_key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            audience: cfg.audience.clone(),
            issuer: cfg.issuer.clone(),
            invite_ttl: Duration::from_secs(cfg.invite_ttl_seconds),
            host_roles: cfg.host_roles.clone(),
            invite_roles: cfg.invite_roles.clone(),
        }
    }

    /// Whether authentication is enabled at all. With no secret, every
    /// principal is implicitly authorized.
    pub fn enabled(&self) -> bool {
        self.decoding_key.is_some()
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }
        validation
    }

    /// Validate signature and registered claims of a user token.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let key = self.decoding_key.as_ref().ok_or(AuthError::TokenInvalid)?;
        decode::<Claims>(token, key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }

    /// Sign a room-scoped invite expiring after `ttl` (or the configured
    /// default).
    pub fn issue_invite(
        &self,
        room_id: &str,
        ttl: Option<Duration>,
    ) -> Result<IssuedInvite, AuthError> {
        let key = self.encoding_key.as_ref().ok_or(AuthError::InviteDisabled)?;
        let expires_at = now_secs() + ttl.unwrap_or(self.invite_ttl).as_secs();
        let claims = Claims {
            exp: expires_at,
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            username: None,
            role: None,
            roles: None,
            token_type: Some(INVITE_TYPE.to_string()),
            room: Some(room_id.to_string()),
        };
        let token =
            encode(&Header::default(), &claims, key).map_err(|_| AuthError::TokenInvalid)?;
        Ok(IssuedInvite { token, expires_at })
    }

    /// Validate an invite and check it is scoped to `expected_room`.
    pub fn verify_invite(&self, token: &str, expected_room: &str) -> Result<Claims, AuthError> {
        let claims = self.verify(token).map_err(|e| match e {
            AuthError::TokenExpired => AuthError::TokenExpired,
            _ => AuthError::InviteInvalid,
        })?;
        if claims.token_type.as_deref() != Some(INVITE_TYPE) {
            return Err(AuthError::InviteInvalid);
        }
        if claims.room.as_deref() != Some(expected_room) {
            return Err(AuthError::InviteRoomMismatch);
        }
        Ok(claims)
    }

    /// Auth gate for `create_room`: a valid token holding a host role
    /// when host roles are configured.
    pub fn authorize_host(&self, auth_token: Option<&str>) -> Result<(), AuthError> {
        if !self.enabled() {
            return Ok(());
        }
        let token = auth_token.ok_or(AuthError::AuthRequired)?;
        let claims = self.verify(token)?;
        if !require_roles(&claims, &self.host_roles) {
            return Err(AuthError::Forbidden);
        }
        Ok(())
    }

    /// Auth gate for minting invites: `invite_roles` if configured,
    /// falling back to `host_roles`.
    pub fn authorize_invite_issuer(&self, auth_token: Option<&str>) -> Result<(), AuthError> {
        if !self.enabled() {
            return Err(AuthError::InviteDisabled);
        }
        let token = auth_token.ok_or(AuthError::AuthRequired)?;
        let claims = self.verify(token)?;
        let required = if self.invite_roles.is_empty() {
            &self.host_roles
        } else {
            &self.invite_roles
        };
        if !require_roles(&claims, required) {
            return Err(AuthError::Forbidden);
        }
        Ok(())
    }

    /// Auth gate for `join_room`: a valid user token or a valid invite
    /// for this room. When both are supplied the user token is tried
    /// first and the invite decides on its failure.
    pub fn authorize_join(
        &self,
        room_id: &str,
        auth_token: Option<&str>,
        invite_token: Option<&str>,
    ) -> Result<(), AuthError> {
        if !self.enabled() {
            return Ok(());
        }
        if let Some(token) = auth_token {
            match self.verify(token) {
                Ok(_) => return Ok(()),
                Err(err) if invite_token.is_none() => return Err(err),
                Err(_) => {},
            }
        }
        match invite_token {
            Some(invite) => self.verify_invite(invite, room_id).map(|_| ()),
            None => Err(AuthError::AuthRequired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn auth_with(secret: Option<&str>, host_roles: &[&str], invite_roles: &[&str]) -> AuthConfig {
        AuthConfig::new(&AuthFileConfig {
            secret: secret.map(str::to_owned),
            host_roles: host_roles.iter().map(|s| s.to_string()).collect(),
            invite_roles: invite_roles.iter().map(|s| s.to_string()).collect(),
            ..AuthFileConfig::default()
        })
    }

    fn sign(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> u64 {
        now_secs() + 3600
    }

    #[test]
    fn verify_accepts_valid_token() {
        let auth = auth_with(Some(SECRET), &[], &[]);
        let token = sign(json!({"exp": future_exp(), "username": "alice"}));
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.username.as_deref(), Some("alice"));
    }

    #[test]
    fn verify_rejects_expired_token() {
        let auth = auth_with(Some(SECRET), &[], &[]);
        // Well past the default validation leeway
        let token = sign(json!({"exp": now_secs() - 600}));
        assert_eq!(auth.verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let auth = auth_with(Some("other-secret"), &[], &[]);
        let token = sign(json!({"exp": future_exp()}));
        assert_eq!(auth.verify(&token), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn verify_enforces_audience_when_configured() {
        let auth = AuthConfig::new(&AuthFileConfig {
            secret: Some(SECRET.to_string()),
            audience: Some("syncroom".to_string()),
            ..AuthFileConfig::default()
        });
        let good = sign(json!({"exp": future_exp(), "aud": "syncroom"}));
        assert!(auth.verify(&good).is_ok());
        let bad = sign(json!({"exp": future_exp(), "aud": "somewhere-else"}));
        assert_eq!(auth.verify(&bad), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn role_set_normalizes_all_claim_shapes() {
        let claims: Claims = serde_json::from_value(json!({
            "exp": 0,
            "role": "Admin",
            "roles": ["Mod", "vip, Watcher"]
        }))
        .unwrap();
        let set = claims.role_set();
        for role in ["admin", "mod", "vip", "watcher"] {
            assert!(set.contains(role), "missing {role}");
        }
    }

    #[test]
    fn role_set_splits_csv_strings() {
        let claims: Claims =
            serde_json::from_value(json!({"exp": 0, "roles": "a, B ,c"})).unwrap();
        let set = claims.role_set();
        assert_eq!(set.len(), 3);
        assert!(set.contains("b"));
    }

    #[test]
    fn require_roles_empty_requirement_passes() {
        let claims: Claims = serde_json::from_value(json!({"exp": 0})).unwrap();
        assert!(require_roles(&claims, &[]));
        assert!(!require_roles(&claims, &["admin".to_string()]));
    }

    #[test]
    fn invite_round_trip() {
        let auth = auth_with(Some(SECRET), &[], &[]);
        let invite = auth.issue_invite("movie-night", None).unwrap();
        assert!(invite.expires_at > now_secs());
        let claims = auth.verify_invite(&invite.token, "movie-night").unwrap();
        assert_eq!(claims.room.as_deref(), Some("movie-night"));
    }

    #[test]
    fn invite_room_mismatch() {
        let auth = auth_with(Some(SECRET), &[], &[]);
        let invite = auth.issue_invite("movie-night", None).unwrap();
        assert_eq!(
            auth.verify_invite(&invite.token, "other-room"),
            Err(AuthError::InviteRoomMismatch)
        );
    }

    #[test]
    fn user_token_is_not_an_invite() {
        let auth = auth_with(Some(SECRET), &[], &[]);
        let token = sign(json!({"exp": future_exp()}));
        assert_eq!(
            auth.verify_invite(&token, "movie-night"),
            Err(AuthError::InviteInvalid)
        );
    }

    #[test]
    fn issue_invite_requires_secret() {
        let auth = auth_with(None, &[], &[]);
        assert_eq!(
            auth.issue_invite("r", None).map(|_| ()),
            Err(AuthError::InviteDisabled)
        );
    }

    #[test]
    fn invite_ttl_override_moves_expiry() {
        let auth = auth_with(Some(SECRET), &[], &[]);
        let short = auth
            .issue_invite("r", Some(Duration::from_secs(5)))
            .unwrap();
        assert!(short.expires_at <= now_secs() + 5);
    }

    #[test]
    fn authorize_host_checks_roles() {
        let auth = auth_with(Some(SECRET), &["host"], &[]);
        assert_eq!(auth.authorize_host(None), Err(AuthError::AuthRequired));

        let wrong = sign(json!({"exp": future_exp(), "role": "viewer"}));
        assert_eq!(auth.authorize_host(Some(&wrong)), Err(AuthError::Forbidden));

        let right = sign(json!({"exp": future_exp(), "role": "Host"}));
        assert!(auth.authorize_host(Some(&right)).is_ok());
    }

    #[test]
    fn authorize_host_disabled_passes_everyone() {
        let auth = auth_with(None, &["host"], &[]);
        assert!(auth.authorize_host(None).is_ok());
    }

    #[test]
    fn invite_issuer_falls_back_to_host_roles() {
        let auth = auth_with(Some(SECRET), &["host"], &[]);
        let token = sign(json!({"exp": future_exp(), "role": "host"}));
        assert!(auth.authorize_invite_issuer(Some(&token)).is_ok());

        let scoped = auth_with(Some(SECRET), &["host"], &["inviter"]);
        assert_eq!(
            scoped.authorize_invite_issuer(Some(&token)),
            Err(AuthError::Forbidden)
        );
    }

    #[test]
    fn authorize_join_accepts_either_credential() {
        let auth = auth_with(Some(SECRET), &[], &[]);
        let user = sign(json!({"exp": future_exp()}));
        let invite = auth.issue_invite("r", None).unwrap();

        assert!(auth.authorize_join("r", Some(&user), None).is_ok());
        assert!(auth.authorize_join("r", None, Some(&invite.token)).is_ok());
        assert_eq!(
            auth.authorize_join("r", None, None),
            Err(AuthError::AuthRequired)
        );
    }

    #[test]
    fn authorize_join_reports_invite_error_when_both_fail() {
        let auth = auth_with(Some(SECRET), &[], &[]);
        let expired = sign(json!({"exp": now_secs() - 600}));
        let invite = auth.issue_invite("r", None).unwrap();
        assert_eq!(
            auth.authorize_join("other", Some(&expired), Some(&invite.token)),
            Err(AuthError::InviteRoomMismatch)
        );
        // Bad user token alone reports the token error
        assert_eq!(
            auth.authorize_join("r", Some(&expired), None),
            Err(AuthError::TokenExpired)
        );
    }
}
