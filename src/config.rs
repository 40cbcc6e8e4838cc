//! Server settings read from the environment.
//!
//! | Variable                        | Default    |
//! |---------------------------------|------------|
//! | `PORT`                          | `8080`     |
//! | `DECKHAND_CATALOG`              | `catalog`  |
//! | `DECKHAND_CAPABILITIES`         | unset      |
//! | `DECKHAND_DEFAULT_TIMEOUT_MS`   | `30000`    |
//! | `DECKHAND_MAX_RETRIES`          | `0`        |
//! | `DECKHAND_BACKEND_<NAME>_URL`   | catalog    |
//!
//! `<NAME>` is the backend name upper-cased with `-` replaced by `_`; the
//! override replaces that backend's catalog `base_url`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::catalog::DEFAULT_TIMEOUT_MS;

const ENV_PREFIX: &str = "DECKHAND_";
const BACKEND_PREFIX: &str = "DECKHAND_BACKEND_";
const URL_SUFFIX: &str = "_URL";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Merge `config` over `defaults`; keys in `config` win.
pub fn process_config<V: Clone>(
    config: &HashMap<String, V>,
    defaults: &HashMap<String, V>,
) -> HashMap<String, V> {
    let mut result = defaults.clone();
    for (key, value) in config {
        result.insert(key.clone(), value.clone());
    }
    result
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    /// Backend catalog file or directory.
    pub catalog_path: PathBuf,
    /// Extra capability definitions (file or directory).
    pub capabilities_path: Option<PathBuf>,
    /// Timeout for backends that do not declare one.
    pub default_timeout_ms: u64,
    /// Transport retries; 0 disables the retrying wrapper.
    pub max_retries: u32,
    /// Backend name → base URL overrides, keyed by lowercase name.
    pub backend_urls: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            catalog_path: PathBuf::from("catalog"),
            capabilities_path: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: 0,
            backend_urls: HashMap::new(),
        }
    }
}

impl Settings {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Read from an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let provided: HashMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key == "PORT" || key.starts_with(ENV_PREFIX))
            .collect();
        let vars = process_config(&provided, &Self::defaults());

        let mut settings = Settings {
            port: parse(&vars, "PORT")?,
            catalog_path: vars
                .get("DECKHAND_CATALOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("catalog")),
            capabilities_path: vars
                .get("DECKHAND_CAPABILITIES")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            default_timeout_ms: parse(&vars, "DECKHAND_DEFAULT_TIMEOUT_MS")?,
            max_retries: parse(&vars, "DECKHAND_MAX_RETRIES")?,
            backend_urls: HashMap::new(),
        };

        for (key, value) in &vars {
            if let Some(name) = backend_url_name(key) {
                if value.trim().is_empty() {
                    continue;
                }
                settings.backend_urls.insert(name, value.clone());
            }
        }
        Ok(settings)
    }

    fn defaults() -> HashMap<String, String> {
        let defaults = Settings::default();
        let mut map = HashMap::new();
        map.insert("PORT".to_string(), defaults.port.to_string());
        map.insert(
            "DECKHAND_CATALOG".to_string(),
            defaults.catalog_path.display().to_string(),
        );
        map.insert(
            "DECKHAND_DEFAULT_TIMEOUT_MS".to_string(),
            defaults.default_timeout_ms.to_string(),
        );
        map.insert(
            "DECKHAND_MAX_RETRIES".to_string(),
            defaults.max_retries.to_string(),
        );
        map
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Overrides keyed by the catalog's backend names.
    ///
    /// Env names lose the distinction between `-` and `_`, so each catalog
    /// name is matched in its env-normalized form.
    pub fn backend_url_overrides<'a, I>(&self, backend_names: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        backend_names
            .into_iter()
            .filter_map(|name| {
                self.backend_urls
                    .get(&env_name(name))
                    .map(|url| (name.to_string(), url.clone()))
            })
            .collect()
    }
}

fn parse<T>(vars: &HashMap<String, String>, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = vars.get(key).map(String::as_str).unwrap_or_default();
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `DECKHAND_BACKEND_TEXT_SERVICE_URL` → `text_service`.
fn backend_url_name(key: &str) -> Option<String> {
    let name = key.strip_prefix(BACKEND_PREFIX)?.strip_suffix(URL_SUFFIX)?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

/// `text-service` → `text_service`.
fn env_name(backend: &str) -> String {
    backend.to_lowercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_vars(Vec::new()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_vars(vars(&[
            ("PORT", "9090"),
            ("DECKHAND_CATALOG", "/etc/deckhand/catalog.yaml"),
            ("DECKHAND_CAPABILITIES", "/etc/deckhand/capabilities"),
            ("DECKHAND_DEFAULT_TIMEOUT_MS", "5000"),
            ("DECKHAND_MAX_RETRIES", "2"),
            ("HOME", "/root"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.catalog_path, PathBuf::from("/etc/deckhand/catalog.yaml"));
        assert_eq!(
            settings.capabilities_path,
            Some(PathBuf::from("/etc/deckhand/capabilities"))
        );
        assert_eq!(settings.default_timeout_ms, 5000);
        assert_eq!(settings.max_retries, 2);
    }

    #[test]
    fn test_invalid_number_reported() {
        let err = Settings::from_vars(vars(&[("DECKHAND_MAX_RETRIES", "many")])).unwrap_err();
        assert!(err.to_string().contains("DECKHAND_MAX_RETRIES"));
    }

    #[test]
    fn test_backend_url_overrides_match_catalog_names() {
        let settings = Settings::from_vars(vars(&[
            ("DECKHAND_BACKEND_TEXT_SERVICE_URL", "http://localhost:9001"),
            ("DECKHAND_BACKEND_ANALYTICS_URL", "http://localhost:9002"),
            ("DECKHAND_BACKEND__URL", "http://ignored"),
        ]))
        .unwrap();
        assert_eq!(settings.backend_urls.len(), 2);

        let overrides = settings.backend_url_overrides(["text-service", "analytics", "illustrator"]);
        assert_eq!(overrides["text-service"], "http://localhost:9001");
        assert_eq!(overrides["analytics"], "http://localhost:9002");
        assert!(!overrides.contains_key("illustrator"));
    }

    #[test]
    fn test_process_config_overrides_defaults() {
        let mut defaults = HashMap::new();
        defaults.insert("a".to_string(), 1);
        defaults.insert("b".to_string(), 2);
        let mut config = HashMap::new();
        config.insert("b".to_string(), 20);
        config.insert("c".to_string(), 30);

        let merged = process_config(&config, &defaults);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 20);
        assert_eq!(merged["c"], 30);
    }
}
