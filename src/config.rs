//! Static configuration: the provider list and environment settings.
//!
//! Both are read once at process start. A missing provider list or a missing
//! required environment variable is a startup precondition failure, not a
//! runtime condition, so loading fails immediately with context and no retry.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_FEED_TIMEOUT_SECS: u64 = 30;

/// One configured GBFS provider: a display name (the record identity) and
/// the URL of its feed-discovery document.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub url: String,
}

/// Loads the provider list from a JSON array file:
///
/// ```json
/// [
///   {"name": "nextbike-bonn", "url": "https://gbfs.nextbike.net/maps/gbfs/v2/nextbike_bn/gbfs.json"}
/// ]
/// ```
pub fn load_providers(path: &str) -> Result<Vec<ProviderConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read providers file '{path}'"))?;

    let providers: Vec<ProviderConfig> = serde_json::from_str(&content)
        .with_context(|| format!("providers file '{path}' is not a JSON provider array"))?;

    ensure!(
        !providers.is_empty(),
        "providers file '{path}' lists no providers"
    );
    Ok(providers)
}

/// Reads a required environment variable, naming it in the failure.
pub fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("required environment variable {key} is not set"))
}

/// Reads an optional environment override, falling back to `default` when
/// the variable is absent or unparseable.
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Ignoring unparseable environment override");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_load_providers_round_trip() {
        let path = temp_path("gbfs_stats_test_providers.json");
        fs::write(
            &path,
            r#"[{"name": "citybike", "url": "https://gbfs.test/gbfs.json"}]"#,
        )
        .unwrap();

        let providers = load_providers(&path).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "citybike");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_providers_rejects_empty_list() {
        let path = temp_path("gbfs_stats_test_empty_providers.json");
        fs::write(&path, "[]").unwrap();

        assert!(load_providers(&path).is_err());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_providers_missing_file() {
        let err = load_providers("/nonexistent/providers.json").unwrap_err();
        assert!(err.to_string().contains("cannot read providers file"));
    }

    #[test]
    fn test_env_or_parses_override() {
        unsafe { env::set_var("GBFS_STATS_TEST_RETENTION", "7") };
        assert_eq!(env_or("GBFS_STATS_TEST_RETENTION", 30u32), 7);
        unsafe { env::remove_var("GBFS_STATS_TEST_RETENTION") };
    }

    #[test]
    fn test_env_or_defaults_when_absent() {
        assert_eq!(env_or("GBFS_STATS_TEST_UNSET", 30u32), 30);
    }
}
