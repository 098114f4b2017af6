use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub store: Store,
    pub http: Http,
    pub log: Log,
}

#[derive(Deserialize)]
pub struct Auth {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Fallback when `JWT_SIGNING_KEY` is not set in the environment.
    #[serde(default)]
    pub signing_key: Option<String>,
    #[serde(default = "default_true")]
    pub revoke_on_reuse: bool,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("revoke_on_reuse", &self.revoke_on_reuse)
            .finish()
    }
}

#[derive(Deserialize)]
pub struct Store {
    pub backend: String, // "memory" or "mysql"
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default)]
    pub seed: Vec<SeedIdentity>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend)
            .field("dsn", &self.dsn.as_deref().map(redact_dsn))
            .field("seed", &self.seed)
            .finish()
    }
}

/// Keep scheme, host and database; drop credentials and query parameters.
fn redact_dsn(dsn: &str) -> String {
    let dsn = dsn.split('?').next().unwrap_or_default();
    match (dsn.find("://"), dsn.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://<redacted>@{}", &dsn[..scheme_end], &dsn[at + 1..])
        }
        _ => dsn.to_string(),
    }
}

/// Identity preloaded into the memory backend. Give either a PHC
/// `secret_digest` or, for local development, a plain `secret` that is
/// hashed at startup.
#[derive(Deserialize)]
pub struct SeedIdentity {
    #[serde(default)]
    pub id: Option<uuid::Uuid>,
    pub email: String,
    #[serde(default)]
    pub secret_digest: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub is_blocked: bool,
}

impl fmt::Debug for SeedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedIdentity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("secret_digest", &self.secret_digest)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("is_blocked", &self.is_blocked)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

fn default_true() -> bool {
    true
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Environment overrides look like `TOLLGATE_HTTP__ADDRESS=0.0.0.0:8443`.
const ENV_PREFIX: &str = "TOLLGATE";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
