use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use parley_resolver::{ResolverConfig, STORE_CALLS_PER_RESOLUTION};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub resolver: ResolverConfig,
    /// `None` leaves orphaned conversations in place.
    pub orphan_sweep: Option<OrphanSweep>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrphanSweep {
    pub interval_secs: u64,
    pub grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("PARLEY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLEY_JWT_SECRET is unset or still a placeholder; it must match the identity service's secret");
        }

        let defaults = ResolverConfig::default();
        let resolver = ResolverConfig {
            store_deadline: parse_millis(&var, "PARLEY_STORE_DEADLINE_MS")?.unwrap_or(defaults.store_deadline),
            coalesce_ceiling: parse_millis(&var, "PARLEY_COALESCE_CEILING_MS")?
                .unwrap_or(defaults.coalesce_ceiling),
        };
        if !resolver.ceiling_covers_worst_case() {
            bail!(
                "PARLEY_COALESCE_CEILING_MS ({}ms) must be at least {} x PARLEY_STORE_DEADLINE_MS ({}ms)",
                resolver.coalesce_ceiling.as_millis(),
                STORE_CALLS_PER_RESOLUTION,
                resolver.store_deadline.as_millis()
            );
        }

        let orphan_sweep = match parse::<u64>(&var, "PARLEY_ORPHAN_SWEEP_SECS")? {
            Some(0) | None => None,
            Some(interval_secs) => Some(OrphanSweep {
                interval_secs,
                grace_secs: parse(&var, "PARLEY_ORPHAN_GRACE_SECS")?.unwrap_or(3600),
            }),
        };

        Ok(Self {
            host: var("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&var, "PARLEY_PORT")?.unwrap_or(3000),
            db_path: var("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into()).into(),
            jwt_secret,
            resolver,
            orphan_sweep,
        })
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    // An empty assignment (`KEY=` in .env) means unset.
    var(key)
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {}: {:?}", key, raw)))
        .transpose()
}

fn parse_millis(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(parse::<u64>(var, key)?.map(Duration::from_millis))
}
