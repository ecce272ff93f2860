// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! typed [`GatewayConfig`] built from them. Configuration is loaded from the
//! environment once at startup; any invalid value is fatal.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8090` |
//! | `GATEWAY_ISSUER_URL` | Identity provider issuer | Required |
//! | `GATEWAY_JWKS_URL` | Explicit JWKS endpoint | Discovery, then `{issuer}/protocol/openid-connect/certs` |
//! | `GATEWAY_ROLE_CLAIM_PATH` | Claim path holding roles (`/` or `.` separated) | `realm_access/roles` |
//! | `GATEWAY_REQUIRE_ROLE_CLAIM` | Reject tokens without the role claim | `false` |
//! | `GATEWAY_AUDIENCE` | Expected `aud` of bearer tokens | Optional |
//! | `GATEWAY_CLOCK_SKEW_SECS` | Leeway for `exp` / `nbf` | `30` |
//! | `GATEWAY_PROVIDER_TIMEOUT_SECS` | Timeout of every provider call | `10` |
//! | `GATEWAY_KEY_REFRESH_MIN_INTERVAL_SECS` | Minimum gap between key refreshes | `10` |
//! | `GATEWAY_CLIENT_ID` | OAuth2 client id; enables browser sessions | Optional |
//! | `GATEWAY_CLIENT_SECRET` | OAuth2 client secret | Required with client id |
//! | `GATEWAY_PUBLIC_URL` | External base URL used for the redirect URI | `http://localhost:{PORT}` |
//! | `GATEWAY_CALLBACK_PATH` | Authorization Code callback path | `/callback` |
//! | `GATEWAY_SCOPES` | Requested scopes (`openid` is always added) | `openid profile` |
//! | `GATEWAY_SESSION_IDLE_SECS` | Session idle timeout | `1800` |
//! | `GATEWAY_SESSION_MAX_SECS` | Session absolute lifetime | `36000` |
//! | `GATEWAY_REFRESH_SKEW_SECS` | Refresh access tokens this close to expiry | `30` |
//! | `GATEWAY_SECURE_COOKIES` | Set the `Secure` flag on cookies | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::auth::claims::ClaimPath;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const ISSUER_URL_ENV: &str = "GATEWAY_ISSUER_URL";
pub const JWKS_URL_ENV: &str = "GATEWAY_JWKS_URL";
pub const ROLE_CLAIM_PATH_ENV: &str = "GATEWAY_ROLE_CLAIM_PATH";
pub const REQUIRE_ROLE_CLAIM_ENV: &str = "GATEWAY_REQUIRE_ROLE_CLAIM";
pub const AUDIENCE_ENV: &str = "GATEWAY_AUDIENCE";
pub const CLOCK_SKEW_SECS_ENV: &str = "GATEWAY_CLOCK_SKEW_SECS";
pub const PROVIDER_TIMEOUT_SECS_ENV: &str = "GATEWAY_PROVIDER_TIMEOUT_SECS";
pub const KEY_REFRESH_MIN_INTERVAL_SECS_ENV: &str = "GATEWAY_KEY_REFRESH_MIN_INTERVAL_SECS";
pub const CLIENT_ID_ENV: &str = "GATEWAY_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "GATEWAY_CLIENT_SECRET";
pub const PUBLIC_URL_ENV: &str = "GATEWAY_PUBLIC_URL";
pub const CALLBACK_PATH_ENV: &str = "GATEWAY_CALLBACK_PATH";
pub const SCOPES_ENV: &str = "GATEWAY_SCOPES";
pub const SESSION_IDLE_SECS_ENV: &str = "GATEWAY_SESSION_IDLE_SECS";
pub const SESSION_MAX_SECS_ENV: &str = "GATEWAY_SESSION_MAX_SECS";
pub const REFRESH_SKEW_SECS_ENV: &str = "GATEWAY_REFRESH_SKEW_SECS";
pub const SECURE_COOKIES_ENV: &str = "GATEWAY_SECURE_COOKIES";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Role claim path used by Keycloak-style realm roles.
pub const DEFAULT_ROLE_CLAIM_PATH: &str = "realm_access/roles";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8090;
const DEFAULT_CLOCK_SKEW_SECS: u64 = 30;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_KEY_REFRESH_MIN_INTERVAL_SECS: u64 = 10;
const DEFAULT_CALLBACK_PATH: &str = "/callback";
const DEFAULT_SCOPES: &str = "openid profile";
const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;
const DEFAULT_SESSION_MAX_SECS: u64 = 36_000;
const DEFAULT_REFRESH_SKEW_SECS: u64 = 30;

/// Anti-forgery token lifetime (30 minutes).
pub const DEFAULT_CSRF_TTL: Duration = Duration::from_secs(30 * 60);

/// Maximum number of live sessions kept in memory.
pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;

/// Interval of the expired-session sweeper.
pub const DEFAULT_SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// OAuth2 client registration, present only when browser sessions are enabled.
#[derive(Debug, Clone)]
pub struct OAuth2ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub public_url: Url,
    pub callback_path: String,
    /// Requested scopes, always containing `openid`.
    pub scopes: Vec<String>,
}

impl OAuth2ClientConfig {
    /// Absolute redirect URI registered with the provider.
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.public_url.as_str().trim_end_matches('/'),
            self.callback_path
        )
    }

    /// Space-separated scope string.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub absolute_timeout: Duration,
    pub refresh_skew: Duration,
    pub csrf_ttl: Duration,
    pub secure_cookies: bool,
    pub capacity: usize,
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            absolute_timeout: Duration::from_secs(DEFAULT_SESSION_MAX_SECS),
            refresh_skew: Duration::from_secs(DEFAULT_REFRESH_SKEW_SECS),
            csrf_ttl: DEFAULT_CSRF_TTL,
            secure_cookies: false,
            capacity: DEFAULT_SESSION_CAPACITY,
            sweep_interval: DEFAULT_SESSION_SWEEP_INTERVAL,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub issuer: String,
    pub jwks_url: Option<String>,
    pub role_claim_path: ClaimPath,
    pub require_role_claim: bool,
    pub audience: Option<String>,
    pub clock_skew: Duration,
    pub provider_timeout: Duration,
    pub key_refresh_min_interval: Duration,
    pub oauth2: Option<OAuth2ClientConfig>,
    pub session: SessionConfig,
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let host = env.or_default(HOST_ENV, DEFAULT_HOST);
        let port: u16 = env.parsed(PORT_ENV, DEFAULT_PORT)?;
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    name: HOST_ENV,
                    value: host.clone(),
                    reason: e.to_string(),
                })?;

        // Compared byte for byte against `iss`, so kept exactly as configured.
        let issuer = env.required(ISSUER_URL_ENV)?;
        parse_url(ISSUER_URL_ENV, &issuer)?;

        let jwks_url = env.optional(JWKS_URL_ENV);
        if let Some(ref url) = jwks_url {
            parse_url(JWKS_URL_ENV, url)?;
        }

        let raw_claim_path = env.or_default(ROLE_CLAIM_PATH_ENV, DEFAULT_ROLE_CLAIM_PATH);
        let role_claim_path =
            ClaimPath::parse(&raw_claim_path).ok_or_else(|| ConfigError::Invalid {
                name: ROLE_CLAIM_PATH_ENV,
                value: raw_claim_path.clone(),
                reason: "empty path segment".to_string(),
            })?;

        let clock_skew = Duration::from_secs(env.parsed(CLOCK_SKEW_SECS_ENV, DEFAULT_CLOCK_SKEW_SECS)?);
        let provider_timeout = Duration::from_secs(
            env.parsed(PROVIDER_TIMEOUT_SECS_ENV, DEFAULT_PROVIDER_TIMEOUT_SECS)?,
        );
        if provider_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: PROVIDER_TIMEOUT_SECS_ENV,
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }
        let key_refresh_min_interval = Duration::from_secs(env.parsed(
            KEY_REFRESH_MIN_INTERVAL_SECS_ENV,
            DEFAULT_KEY_REFRESH_MIN_INTERVAL_SECS,
        )?);

        let session = SessionConfig {
            idle_timeout: Duration::from_secs(
                env.parsed(SESSION_IDLE_SECS_ENV, DEFAULT_SESSION_IDLE_SECS)?,
            ),
            absolute_timeout: Duration::from_secs(
                env.parsed(SESSION_MAX_SECS_ENV, DEFAULT_SESSION_MAX_SECS)?,
            ),
            refresh_skew: Duration::from_secs(
                env.parsed(REFRESH_SKEW_SECS_ENV, DEFAULT_REFRESH_SKEW_SECS)?,
            ),
            secure_cookies: env.flag(SECURE_COOKIES_ENV)?,
            ..SessionConfig::default()
        };

        let oauth2 = match env.optional(CLIENT_ID_ENV) {
            Some(client_id) => {
                let client_secret = env.required(CLIENT_SECRET_ENV)?;
                let public_url = env
                    .optional(PUBLIC_URL_ENV)
                    .unwrap_or_else(|| format!("http://localhost:{port}"));
                let public_url = parse_url(PUBLIC_URL_ENV, &public_url)?;
                let callback_path = env.or_default(CALLBACK_PATH_ENV, DEFAULT_CALLBACK_PATH);
                check_callback_path(&callback_path)?;
                Some(OAuth2ClientConfig {
                    client_id,
                    client_secret,
                    public_url,
                    callback_path,
                    scopes: parse_scopes(&env.or_default(SCOPES_ENV, DEFAULT_SCOPES)),
                })
            }
            None => None,
        };

        let log_format = match env.optional(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    value: other.to_string(),
                    reason: "expected 'json' or 'pretty'".to_string(),
                })
            }
        };

        Ok(Self {
            bind_addr,
            issuer,
            jwks_url,
            role_claim_path,
            require_role_claim: env.flag(REQUIRE_ROLE_CLAIM_ENV)?,
            audience: env.optional(AUDIENCE_ENV),
            clock_skew,
            provider_timeout,
            key_refresh_min_interval,
            oauth2,
            session,
            log_format,
        })
    }

    /// Whether the Authorization Code flow and browser sessions are enabled.
    pub fn sessions_enabled(&self) -> bool {
        self.oauth2.is_some()
    }
}

/// Scopes from a space-separated list, deduplicated, with `openid` first.
/// Paths the router mounts itself; the callback route must not overlap them.
const RESERVED_PATHS: &[&str] = &[
    "/",
    "/health",
    "/health/live",
    "/health/ready",
    "/api/greet",
    "/api/user",
    "/api/admin",
    "/protected/",
    "/protected/user",
    "/protected/admin",
    "/protected/userinfo",
    "/logout",
    "/login-error",
    "/docs",
    "/api-doc/openapi.json",
];

const RESERVED_PREFIXES: &[&str] = &["/docs/", "/api-doc/"];

fn check_callback_path(path: &str) -> Result<(), ConfigError> {
    let reason = if !path.starts_with('/') {
        "must start with '/'"
    } else if path.contains(['{', '}', '*']) {
        "must not contain route parameters"
    } else if RESERVED_PATHS.contains(&path) || RESERVED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        "overlaps a built-in route"
    } else {
        return Ok(());
    };
    Err(ConfigError::Invalid {
        name: CALLBACK_PATH_ENV,
        value: path.to_string(),
        reason: reason.to_string(),
    })
}

fn parse_scopes(raw: &str) -> Vec<String> {
    let mut scopes = vec!["openid".to_string()];
    for scope in raw.split_whitespace() {
        if !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_string());
        }
    }
    scopes
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}

/// Trimmed, non-empty variable access over a lookup function.
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &'static str) -> Result<bool, ConfigError> {
        match self.optional(name).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("false") | Some("0") | Some("no") => Ok(false),
            Some("true") | Some("1") | Some("yes") => Ok(true),
            Some(other) => Err(ConfigError::Invalid {
                name,
                value: other.to_string(),
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}
