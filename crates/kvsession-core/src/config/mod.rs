use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::codec::{KeyPair, DEFAULT_MAX_LENGTH};
use crate::error::ConfigError;
use crate::serializer::{JsonSerializer, SessionSerializer, StructuredSerializer, TypeRegistry};
use crate::session::SessionOptions;

/// Default prefix prepended to session ids to form backend keys.
pub const DEFAULT_KEY_PREFIX: &str = "session_";

/// Environment variable holding a complete JSON config.
pub const CONFIG_ENV_VAR: &str = "KVSESSION_CONFIG";

/// Which serializer a config-built store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    Structured,
    Json,
}

impl SerializerKind {
    pub fn build(self) -> Arc<dyn SessionSerializer> {
        self.build_with_registry(Arc::new(TypeRegistry::new()))
    }

    /// Build the serializer over an existing type registry. The JSON
    /// serializer ignores it.
    pub fn build_with_registry(self, registry: Arc<TypeRegistry>) -> Arc<dyn SessionSerializer> {
        match self {
            SerializerKind::Structured => Arc::new(StructuredSerializer::with_registry(registry)),
            SerializerKind::Json => Arc::new(JsonSerializer),
        }
    }
}

impl std::str::FromStr for SerializerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "structured" => Ok(SerializerKind::Structured),
            "json" => Ok(SerializerKind::Json),
            other => Err(ConfigError::Invalid(format!("unknown serializer: {other}"))),
        }
    }
}

/// Hex-encoded key pair as it appears in config files.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairConfig {
    pub hash_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_key: Option<String>,
}

impl KeyPairConfig {
    pub fn to_key_pair(&self) -> Result<KeyPair, ConfigError> {
        let hash_key = decode_hex_key("hashKey", &self.hash_key)?;
        let block_key = self
            .block_key
            .as_deref()
            .map(|k| decode_hex_key("blockKey", k))
            .transpose()?;
        Ok(KeyPair::new(hash_key, block_key))
    }
}

impl fmt::Debug for KeyPairConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairConfig")
            .field("hash_key", &"<redacted>")
            .field("block_key", &self.block_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn decode_hex_key(field: &str, value: &str) -> Result<Vec<u8>, ConfigError> {
    let bytes = hex::decode(value.trim())
        .map_err(|e| ConfigError::Invalid(format!("{field} is not valid hex: {e}")))?;
    if bytes.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must not be empty")));
    }
    Ok(bytes)
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub key_prefix: String,
    pub serializer: SerializerKind,
    pub session_options: SessionOptions,
    pub key_pairs: Vec<KeyPairConfig>,
    pub max_cookie_length: usize,
    pub fail_closed: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            serializer: SerializerKind::default(),
            session_options: SessionOptions::default(),
            key_pairs: Vec::new(),
            max_cookie_length: DEFAULT_MAX_LENGTH,
            fail_closed: false,
        }
    }
}

impl StoreConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode the configured key pairs.
    pub fn key_pairs(&self) -> Result<Vec<KeyPair>, ConfigError> {
        if self.key_pairs.is_empty() {
            return Err(ConfigError::Invalid("at least one key pair is required".into()));
        }
        self.key_pairs.iter().map(KeyPairConfig::to_key_pair).collect()
    }
}

/// Load configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = StoreConfig::from_json(&content)?;
    tracing::debug!("Loaded session store config from {}", path.display());
    Ok(config)
}

/// Load configuration from the environment.
///
/// `KVSESSION_CONFIG` holds a full JSON config. Without it, defaults are
/// overlaid with the individual `KVSESSION_*` variables.
pub fn load_config_from_env() -> Result<StoreConfig, ConfigError> {
    if let Ok(json) = std::env::var(CONFIG_ENV_VAR) {
        return StoreConfig::from_json(&json);
    }
    apply_env_overrides(StoreConfig::default(), |name| std::env::var(name).ok())
}

/// Overlay `KVSESSION_*` variables, read through `lookup`, onto `cfg`.
pub fn apply_env_overrides<F>(mut cfg: StoreConfig, lookup: F) -> Result<StoreConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("KVSESSION_KEY_PREFIX") {
        cfg.key_prefix = v;
    }
    if let Some(v) = lookup("KVSESSION_MAX_AGE") {
        cfg.session_options.max_age = v
            .trim()
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("KVSESSION_MAX_AGE: {e}")))?;
    }
    if let Some(v) = lookup("KVSESSION_SERIALIZER") {
        cfg.serializer = v.parse()?;
    }
    if let Some(hash_key) = lookup("KVSESSION_HASH_KEY") {
        cfg.key_pairs = vec![KeyPairConfig {
            hash_key,
            block_key: lookup("KVSESSION_BLOCK_KEY"),
        }];
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.key_prefix, "session_");
        assert_eq!(cfg.serializer, SerializerKind::Structured);
        assert_eq!(cfg.session_options.path, "/");
        assert_eq!(cfg.session_options.max_age, 86400 * 30);
        assert_eq!(cfg.max_cookie_length, 4096);
        assert!(!cfg.fail_closed);
        assert!(cfg.key_pairs().is_err());
    }

    #[test]
    fn test_from_json() {
        let cfg = StoreConfig::from_json(
            r#"{
                "keyPrefix": "app_",
                "serializer": "json",
                "sessionOptions": {"maxAge": 3600, "secure": true, "sameSite": "lax"},
                "keyPairs": [
                    {"hashKey": "68617368", "blockKey": "626c6f636b"},
                    {"hashKey": "6f6c64"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.key_prefix, "app_");
        assert_eq!(cfg.serializer, SerializerKind::Json);
        assert_eq!(cfg.session_options.max_age, 3600);
        assert_eq!(cfg.session_options.path, "/");
        assert!(cfg.session_options.secure);

        let pairs = cfg.key_pairs().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].hash_key(), b"hash");
        assert_eq!(pairs[0].block_key(), Some(&b"block"[..]));
        assert_eq!(pairs[1].block_key(), None);
    }

    #[test]
    fn test_invalid_hex_key() {
        let cfg = StoreConfig::from_json(r#"{"keyPairs": [{"hashKey": "zz"}]}"#).unwrap();
        assert!(matches!(cfg.key_pairs(), Err(ConfigError::Invalid(_))));

        let cfg = StoreConfig::from_json(r#"{"keyPairs": [{"hashKey": ""}]}"#).unwrap();
        assert!(matches!(cfg.key_pairs(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_serializer_rejected() {
        assert!(matches!(
            StoreConfig::from_json(r#"{"serializer": "gob"}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!("gob".parse::<SerializerKind>().is_err());
        assert_eq!(" JSON ".parse::<SerializerKind>().unwrap(), SerializerKind::Json);
    }

    #[test]
    fn test_build_with_registry_shares_types() {
        let registry = Arc::new(TypeRegistry::new());
        let serializer = SerializerKind::Structured.build_with_registry(Arc::clone(&registry));
        assert_eq!(serializer.name(), StructuredSerializer::new().name());
        assert!(registry.is_empty());
        assert_eq!(SerializerKind::Json.build_with_registry(registry).name(), JsonSerializer.name());
    }

    #[test]
    fn test_load_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        std::fs::write(&path, r#"{"keyPrefix": "file_", "keyPairs": [{"hashKey": "00ff"}]}"#)
            .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.key_prefix, "file_");
        assert_eq!(cfg.key_pairs().unwrap()[0].hash_key(), &[0x00, 0xff]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.json");
        assert!(matches!(load_config(&path), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("KVSESSION_KEY_PREFIX", "env_"),
            ("KVSESSION_MAX_AGE", "120"),
            ("KVSESSION_SERIALIZER", "json"),
            ("KVSESSION_HASH_KEY", "aabb"),
            ("KVSESSION_BLOCK_KEY", "ccdd"),
        ]
        .into_iter()
        .collect();

        let cfg = apply_env_overrides(StoreConfig::default(), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(cfg.key_prefix, "env_");
        assert_eq!(cfg.session_options.max_age, 120);
        assert_eq!(cfg.serializer, SerializerKind::Json);
        let pairs = cfg.key_pairs().unwrap();
        assert_eq!(pairs[0].hash_key(), &[0xaa, 0xbb]);
        assert_eq!(pairs[0].block_key(), Some(&[0xcc, 0xdd][..]));
    }

    #[test]
    fn test_env_overrides_bad_max_age() {
        let result = apply_env_overrides(StoreConfig::default(), |k| {
            (k == "KVSESSION_MAX_AGE").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_key_pair_config_debug_redacts() {
        let pair = KeyPairConfig {
            hash_key: "deadbeef".into(),
            block_key: Some("cafebabe".into()),
        };
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains("deadbeef"));
        assert!(!rendered.contains("cafebabe"));
    }
}
