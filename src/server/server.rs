use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::logger::*;
use crate::settings::{self, Settings};
use anyhow::{anyhow, bail};
use chrono::{TimeDelta, Utc};
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

/// Takes precedence over `auth.signing_key` in the settings file.
pub const SIGNING_KEY_ENV: &str = "JWT_SIGNING_KEY";

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub auth_gate: Arc<dyn AuthGate>,
    pub token_codec: Arc<dyn TokenCodec>,
    pool: Option<MySqlPool>,
}

impl Server {
    pub fn new(
        auth_service: Arc<dyn AuthService>,
        auth_gate: Arc<dyn AuthGate>,
        token_codec: Arc<dyn TokenCodec>,
    ) -> Self {
        Self {
            auth_service,
            auth_gate,
            token_codec,
            pool: None,
        }
    }

    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let jwt_config = jwt_config(&settings.auth, std::env::var(SIGNING_KEY_ENV).ok())?;
        debug!(?jwt_config);
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::try_new(jwt_config)?);

        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher::new());

        let (identity_store, pool): (Arc<dyn IdentityStore>, Option<MySqlPool>) =
            match settings.store.backend.as_str() {
                "memory" => {
                    let store = MemoryIdentityStore::new();
                    seed_identities(&store, &settings.store.seed, credential_hasher.as_ref())
                        .await?;
                    info!(identities = store.len(), "memory identity store ready");
                    (Arc::new(store), None)
                }
                "mysql" => {
                    let dsn = settings
                        .store
                        .dsn
                        .as_deref()
                        .ok_or_else(|| anyhow!("store.dsn is required for the mysql backend"))?;
                    let pool = MySqlPool::connect(dsn).await?;
                    info!("mysql identity store connected");
                    (Arc::new(MySqlIdentityStore::new(pool.clone())), Some(pool))
                }
                other => return Err(anyhow!("Unknown store backend: {}", other)),
            };

        let policy = RotationPolicy {
            revoke_on_reuse: settings.auth.revoke_on_reuse,
        };

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            identity_store.clone(),
            credential_hasher,
            token_codec.clone(),
            policy,
        ));
        let auth_gate: Arc<dyn AuthGate> = Arc::new(RealAuthGate::new(
            token_codec.clone(),
            identity_store,
            policy,
        ));

        info!("server started");

        Ok(Self {
            auth_service,
            auth_gate,
            token_codec,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

/// Resolve the token settings once. A missing signing secret is fatal.
pub fn jwt_config(auth: &settings::Auth, env_key: Option<String>) -> anyhow::Result<JwtConfig> {
    let signing_key = env_key
        .filter(|k| !k.is_empty())
        .or_else(|| auth.signing_key.clone().filter(|k| !k.is_empty()))
        .ok_or_else(|| {
            anyhow!(
                "no signing secret: set {} or auth.signing_key",
                SIGNING_KEY_ENV
            )
        })?;

    if auth.access_ttl_secs == 0 || auth.refresh_ttl_secs == 0 {
        bail!("token lifetimes must be positive");
    }
    let now = Utc::now();
    for (kind, secs) in [
        (TokenKind::Access, auth.access_ttl_secs),
        (TokenKind::Refresh, auth.refresh_ttl_secs),
    ] {
        let representable = i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .is_some();
        if !representable {
            bail!("{} token lifetime of {}s is out of range", kind, secs);
        }
    }
    if auth.access_ttl_secs >= auth.refresh_ttl_secs {
        warn!(
            access_ttl_secs = auth.access_ttl_secs,
            refresh_ttl_secs = auth.refresh_ttl_secs,
            "access tokens outlive refresh tokens"
        );
    }

    Ok(JwtConfig {
        issuer: auth.issuer.clone(),
        audience: auth.audience.clone(),
        access_ttl: Duration::from_secs(auth.access_ttl_secs),
        refresh_ttl: Duration::from_secs(auth.refresh_ttl_secs),
        signing_key: signing_key.into_bytes(),
    })
}

async fn seed_identities(
    store: &MemoryIdentityStore,
    seeds: &[settings::SeedIdentity],
    hasher: &dyn CredentialHasher,
) -> anyhow::Result<()> {
    for seed in seeds {
        let secret_digest = match (&seed.secret_digest, &seed.secret) {
            (Some(digest), _) => digest.clone(),
            (None, Some(secret)) => hasher.hash_password(secret).await?,
            (None, None) => bail!(
                "seed identity {} needs a secret_digest or a secret",
                seed.email
            ),
        };
        let id = seed.id.map(UserId).unwrap_or_else(UserId::new_random);
        let mut identity = Identity::new(id, seed.email.clone(), secret_digest);
        identity.is_blocked = seed.is_blocked;
        store.insert(identity);
    }
    Ok(())
}
