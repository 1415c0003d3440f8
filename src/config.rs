use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an optional TOML config file.
pub const CONFIG_ENV: &str = "ERRLENS_CONFIG";

/// Environment variable supplying the provider API key. Never read from the
/// config file.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub generation: GenerationParams,
    pub safety: Vec<SafetySetting>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            generation: GenerationParams::default(),
            safety: default_safety_settings(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Supplied via `GEMINI_API_KEY` at load time, never via the file.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-pro-latest".to_string(),
            timeout_secs: 120,
            api_key: String::new(),
        }
    }
}

/// Sampling parameters sent unchanged with every generation call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        // Low temperature for factual code help
        Self {
            temperature: 0.5,
            top_k: 1,
            top_p: 1.0,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmBlockThreshold {
    #[serde(rename = "BLOCK_NONE")]
    BlockNone,
    #[serde(rename = "BLOCK_ONLY_HIGH")]
    BlockOnlyHigh,
    #[serde(rename = "BLOCK_MEDIUM_AND_ABOVE")]
    BlockMediumAndAbove,
    #[serde(rename = "BLOCK_LOW_AND_ABOVE")]
    BlockLowAndAbove,
}

/// One harm category mapped to its blocking threshold, serialized in the
/// provider's wire vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    })
    .collect()
}

impl Config {
    /// Resolves configuration in order: explicit path, `ERRLENS_CONFIG`,
    /// built-in defaults. The provider API key always comes from the
    /// environment afterwards.
    pub fn load_auto(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => match env::var(CONFIG_ENV) {
                Ok(p) => {
                    let p = PathBuf::from(p);
                    if p.exists() {
                        Self::load(&p)?
                    } else {
                        tracing::warn!(
                            "{} points to non-existent file: {}",
                            CONFIG_ENV,
                            p.display()
                        );
                        Self::default()
                    }
                }
                Err(_) => Self::default(),
            },
        };

        match env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => config.provider.api_key = key,
            _ => tracing::warn!(
                "{} is not set; generation requests will fail provider authentication",
                API_KEY_ENV
            ),
        }

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let cfg: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML from {}", path.display()))?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_carry_the_fixed_parameters() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.provider.model, "gemini-1.5-pro-latest");
        assert!((config.generation.temperature - 0.5).abs() < 1e-6);
        assert_eq!(config.generation.top_k, 1);
        assert!((config.generation.top_p - 1.0).abs() < 1e-6);
        assert_eq!(config.generation.max_output_tokens, 8192);
        assert_eq!(config.safety.len(), 4);
        assert!(config
            .safety
            .iter()
            .all(|s| s.threshold == HarmBlockThreshold::BlockMediumAndAbove));
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[server]
port = 9000

[generation]
temperature = 0.2
"#
        )
        .expect("write config");

        let config = Config::load(file.path()).expect("load config");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!((config.generation.temperature - 0.2).abs() < 1e-6);
        assert_eq!(config.generation.top_k, 1);
        assert_eq!(config.safety.len(), 4);
    }

    #[test]
    fn api_key_is_never_read_from_the_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[provider]
api_key = "leaked"
model = "gemini-1.5-flash"
"#
        )
        .expect("write config");

        let config = Config::load(file.path()).expect("load config");
        assert_eq!(config.provider.api_key, "");
        assert_eq!(config.provider.model, "gemini-1.5-flash");
    }

    #[test]
    fn safety_settings_round_trip_in_wire_vocabulary() {
        let toml = r#"
[[safety]]
category = "HARM_CATEGORY_DANGEROUS_CONTENT"
threshold = "BLOCK_ONLY_HIGH"
"#;
        let config: Config = toml::from_str(toml).expect("parse");
        assert_eq!(config.safety.len(), 1);
        assert_eq!(config.safety[0].category, HarmCategory::DangerousContent);
        assert_eq!(config.safety[0].threshold, HarmBlockThreshold::BlockOnlyHigh);
    }
}
