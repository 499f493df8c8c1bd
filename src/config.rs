//! Configuration schema and loading.
//!
//! A single TOML settings bundle covers the provider endpoint, the rewind
//! policy, and the mode-to-temperature table. Every field has a default so
//! an absent or empty config file yields a working configuration.
//!
//! The API key is intentionally not part of the file; it is read from the
//! `SELKIE_API_KEY` environment variable by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SelkieError};
use crate::signal::grammar::CognitiveMode;

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_max_rewinds() -> u32 {
    3
}

fn default_min_spacing() -> usize {
    30
}

fn default_hint_max_len() -> usize {
    200
}

/// Per-mode sampling temperatures.
///
/// Defaults match the built-in mode temperatures; the table exists so a
/// deployment can retune a mode without code changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeTemperatures {
    pub precise: f64,
    pub balanced: f64,
    pub adversarial: f64,
    pub exploratory: f64,
}

impl Default for ModeTemperatures {
    fn default() -> Self {
        Self {
            precise: CognitiveMode::Precise.default_temperature(),
            balanced: CognitiveMode::Balanced.default_temperature(),
            adversarial: CognitiveMode::Adversarial.default_temperature(),
            exploratory: CognitiveMode::Exploratory.default_temperature(),
        }
    }
}

impl ModeTemperatures {
    /// The configured temperature for a mode.
    pub fn for_mode(&self, mode: CognitiveMode) -> f64 {
        match mode {
            CognitiveMode::Precise => self.precise,
            CognitiveMode::Balanced => self.balanced,
            CognitiveMode::Adversarial => self.adversarial,
            CognitiveMode::Exploratory => self.exploratory,
        }
    }
}

/// Root configuration for selkie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelkieConfig {
    /// Provider model identifier (opaque, forwarded to the adapter).
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of an OpenAI-compatible endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Maximum honoured rewinds per turn; further backtrack markers are
    /// ignored without tearing down the stream.
    #[serde(default = "default_max_rewinds")]
    pub max_rewinds: u32,

    /// Minimum characters between markers before a new checkpoint registers.
    #[serde(default = "default_min_spacing")]
    pub min_spacing: usize,

    /// Cognitive mode each turn starts in.
    #[serde(default)]
    pub default_mode: CognitiveMode,

    /// Maximum characters of a single hint carried into the system prompt.
    #[serde(default = "default_hint_max_len")]
    pub hint_max_len: usize,

    /// Mode-to-temperature table.
    #[serde(default)]
    pub temperatures: ModeTemperatures,
}

impl Default for SelkieConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            max_rewinds: default_max_rewinds(),
            min_spacing: default_min_spacing(),
            default_mode: CognitiveMode::default(),
            hint_max_len: default_hint_max_len(),
            temperatures: ModeTemperatures::default(),
        }
    }
}

impl SelkieConfig {
    /// Validate field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SelkieError::Config`] on an empty model/base URL, a
    /// zero hint cap, or a temperature outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<()> {
        if self.model.is_empty() {
            return Err(SelkieError::Config("model must not be empty".into()));
        }
        if self.base_url.is_empty() {
            return Err(SelkieError::Config(
                "base_url must not be empty".into(),
            ));
        }
        if self.hint_max_len == 0 {
            return Err(SelkieError::Config(
                "hint_max_len must be at least 1".into(),
            ));
        }
        let table = &self.temperatures;
        for (name, value) in [
            ("precise", table.precise),
            ("balanced", table.balanced),
            ("adversarial", table.adversarial),
            ("exploratory", table.exploratory),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SelkieError::Config(format!(
                    "temperature for mode {name} out of range: {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Default config file path: `<platform config dir>/selkie/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("selkie").join("config.toml"))
}

/// Load and validate configuration from a TOML file.
///
/// An absent file yields the defaults; a present but malformed file is an
/// error rather than a silent fallback.
///
/// # Errors
///
/// Returns [`SelkieError::Config`] on unreadable files, TOML parse
/// failures, or failed validation.
pub fn load_config(path: &Path) -> Result<SelkieConfig> {
    if !path.exists() {
        let config = SelkieConfig::default();
        config.validate()?;
        return Ok(config);
    }

    let text = std::fs::read_to_string(path).map_err(|e| {
        SelkieError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let config: SelkieConfig = toml::from_str(&text).map_err(|e| {
        SelkieError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}
