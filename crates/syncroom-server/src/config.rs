use serde::Deserialize;

/// Top-level server configuration, loaded from `syncroom.toml` with
/// environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub auth: AuthFileConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8999".to_string(),
            auth: AuthFileConfig::default(),
        }
    }
}

/// Auth section of the config file. An empty `secret` disables
/// authentication entirely.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    pub secret: Option<String>,
    pub audience: Option<String>,
    pub issuer: Option<String>,
    pub invite_ttl_seconds: u64,
    pub host_roles: Vec<String>,
    pub invite_roles: Vec<String>,
}

impl Default for AuthFileConfig {
    fn default() -> Self {
        Self {
            secret: None,
            audience: None,
            issuer: None,
            invite_ttl_seconds: 3600,
            host_roles: Vec::new(),
            invite_roles: Vec::new(),
        }
    }
}

/// Split a comma-separated value into trimmed, non-empty entries.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl ServerConfig {
    /// Validate configuration, logging and exiting on fatal issues.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }

        if self.auth.invite_ttl_seconds == 0 {
            tracing::error!("auth.invite_ttl_seconds must be > 0");
            std::process::exit(1);
        }

        if self.auth.secret.is_none()
            && (!self.auth.host_roles.is_empty() || !self.auth.invite_roles.is_empty())
        {
            tracing::warn!(
                "Role requirements are configured but no JWT secret is set — \
                 authentication is disabled and roles will not be enforced"
            );
        }
    }

    /// Load config from `syncroom.toml` if it exists, then apply env var
    /// overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("syncroom.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from syncroom.toml");
                    if cfg.auth.secret.is_some() {
                        tracing::warn!(
                            "JWT secret is set in the config file — use the JWT_SECRET env var in production"
                        );
                    }
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse syncroom.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No syncroom.toml found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("SYNCROOM_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(secret) = std::env::var("JWT_SECRET")
            && !secret.is_empty()
        {
            config.auth.secret = Some(secret);
        }
        if let Ok(aud) = std::env::var("JWT_AUDIENCE")
            && !aud.is_empty()
        {
            config.auth.audience = Some(aud);
        }
        if let Ok(iss) = std::env::var("JWT_ISSUER")
            && !iss.is_empty()
        {
            config.auth.issuer = Some(iss);
        }
        if let Ok(val) = std::env::var("INVITE_TTL_SECONDS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.auth.invite_ttl_seconds = n;
        }
        if let Ok(roles) = std::env::var("HOST_ROLES")
            && !roles.is_empty()
        {
            config.auth.host_roles = split_csv(&roles);
        }
        if let Ok(roles) = std::env::var("INVITE_ROLES")
            && !roles.is_empty()
        {
            config.auth.invite_roles = split_csv(&roles);
        }

        config
    }
}
