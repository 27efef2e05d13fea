//! Environment-driven configuration.
//!
//! | Variable          | Default                     |
//! |-------------------|-----------------------------|
//! | `API_KEY`         | required                    |
//! | `PORT`            | `3000`                      |
//! | `GEMINI_MODEL`    | `gemini-2.0-flash`          |
//! | `GEMINI_API_BASE` | Google models endpoint      |
//! | `UPLOAD_DIR`      | OS temp dir                 |
//! | `MAX_IMAGE_BYTES` | `10485760` (10 MiB)         |
//! | `STATIC_DIR`      | unset, no static assets     |

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::gemini::GeminiConfig;
use crate::server::{DEFAULT_PORT, UploadSettings};

/// Default upper bound for an uploaded image.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `API_KEY` is unset or empty.
    #[error("API_KEY is not set")]
    MissingApiKey,

    /// A variable holds a value that cannot be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Listening port.
    pub port: u16,
    /// Upstream settings.
    pub gemini: GeminiConfig,
    /// Upload spooling settings.
    pub uploads: UploadSettings,
    /// Static asset directory.
    pub static_dir: Option<PathBuf>,
}

impl AssistantConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    /// Returns an error if `API_KEY` is missing or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    /// Returns an error if `API_KEY` is missing or a value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let mut gemini = GeminiConfig::new(api_key);
        if let Some(model) = get("GEMINI_MODEL") {
            gemini = gemini.with_model(model);
        }
        if let Some(base) = get("GEMINI_API_BASE") {
            gemini = gemini.with_api_base(base);
        }

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let max_image_bytes = parse_or("MAX_IMAGE_BYTES", get("MAX_IMAGE_BYTES"), DEFAULT_MAX_IMAGE_BYTES)?;
        if max_image_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_IMAGE_BYTES",
                value: "0".to_string(),
            });
        }

        let uploads = UploadSettings {
            dir: get("UPLOAD_DIR").map_or_else(std::env::temp_dir, PathBuf::from),
            max_image_bytes,
        };

        Ok(Self {
            port,
            gemini,
            uploads,
            static_dir: get("STATIC_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    raw.map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value })
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::gemini::config::{DEFAULT_API_BASE, DEFAULT_MODEL};

    fn load(vars: &[(&str, &str)]) -> Result<AssistantConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AssistantConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("API_KEY", "k")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.gemini.api_key, "k");
        assert_eq!(config.gemini.model, DEFAULT_MODEL);
        assert_eq!(config.gemini.api_base, DEFAULT_API_BASE);
        assert_eq!(config.uploads.dir, std::env::temp_dir());
        assert_eq!(config.uploads.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingApiKey)));
        assert!(matches!(load(&[("API_KEY", " ")]), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("API_KEY", "k"),
            ("PORT", "8080"),
            ("GEMINI_MODEL", "gemini-1.5-pro"),
            ("GEMINI_API_BASE", "http://localhost:9000"),
            ("UPLOAD_DIR", "/var/uploads"),
            ("MAX_IMAGE_BYTES", "2048"),
            ("STATIC_DIR", "public"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.gemini.model, "gemini-1.5-pro");
        assert_eq!(config.gemini.api_base, "http://localhost:9000");
        assert_eq!(config.uploads.dir, PathBuf::from("/var/uploads"));
        assert_eq!(config.uploads.max_image_bytes, 2048);
        assert_eq!(config.static_dir, Some(PathBuf::from("public")));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[("API_KEY", "k"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
        assert_eq!(err.to_string(), "invalid value for PORT: \"http\"");
    }

    #[test]
    fn test_zero_image_limit_rejected() {
        let err = load(&[("API_KEY", "k"), ("MAX_IMAGE_BYTES", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "MAX_IMAGE_BYTES", .. }));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = load(&[("API_KEY", "super-secret")]).unwrap();
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
