use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::job::TestMode;

const BUNDLED_MATRIX: &str = include_str!("../regression.toml");

fn default_failure_marker() -> String {
    "FAILED:".to_string()
}

fn default_save_log_args() -> Vec<String> {
    vec!["--save_log".to_string()]
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read regression matrix {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid regression matrix: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unknown chip '{chip}' used by {owner}")]
    UnknownChip { chip: String, owner: String },
    #[error("Case name '{0}' is produced by more than one job")]
    DuplicateCase(String),
    #[error("Invalid regression matrix: {0}")]
    Invalid(String),
}

/// An operator conformance source, tested once per chip.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpSourceConfig {
    pub name: String,
    pub chips: Vec<String>,
    /// Program and arguments that run every case of this source.
    pub command: Vec<String>,
    /// Extra arguments for the reduced case set. Sources without any always run everything.
    #[serde(default)]
    pub reduced_args: Vec<String>,
    /// Output lines starting with this marker name a failing case.
    #[serde(default = "default_failure_marker")]
    pub failure_marker: String,
}

impl OpSourceConfig {
    pub fn accepts_reduced(&self) -> bool {
        !self.reduced_args.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptConfig {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelDriverConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub disable_thread_args: Vec<String>,
    #[serde(default = "default_save_log_args")]
    pub save_log_args: Vec<String>,
}

/// A model and the chips it is regressed on in each mode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub basic: Vec<String>,
    #[serde(default)]
    pub full: Vec<String>,
}

impl ModelConfig {
    pub fn runs_on(&self, chip: &str, mode: TestMode) -> bool {
        let chips = match mode {
            TestMode::Basic => &self.basic,
            TestMode::Full => &self.full,
        };
        chips.iter().any(|c| c == chip)
    }
}

/// The fixed test matrix of a regression run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegressionConfig {
    pub chips: Vec<String>,
    #[serde(default, rename = "op_source")]
    pub op_sources: Vec<OpSourceConfig>,
    pub script: Option<ScriptConfig>,
    pub model_driver: ModelDriverConfig,
    #[serde(default, rename = "model")]
    pub models: Vec<ModelConfig>,
}

impl RegressionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a matrix.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The matrix shipped with the runner.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUNDLED_MATRIX)
    }

    pub fn op_source(&self, name: &str) -> Option<&OpSourceConfig> {
        self.op_sources.iter().find(|s| s.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chips.is_empty() {
            return Err(ConfigError::Invalid("no chips configured".to_string()));
        }
        let mut seen = HashSet::new();
        for chip in &self.chips {
            if chip.trim().is_empty() {
                return Err(ConfigError::Invalid("empty chip name".to_string()));
            }
            if !seen.insert(chip.as_str()) {
                return Err(ConfigError::Invalid(format!("chip '{chip}' listed twice")));
            }
        }

        for source in &self.op_sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::Invalid("op source without a name".to_string()));
            }
            if source.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "op source '{}' has no command",
                    source.name
                )));
            }
            self.check_chips(&source.chips, &format!("op source '{}'", source.name))?;
        }

        if let Some(script) = &self.script {
            if script.name.trim().is_empty() || script.path.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "script suite needs a name and a path".to_string(),
                ));
            }
        }

        if self.model_driver.command.is_empty() {
            return Err(ConfigError::Invalid("model driver has no command".to_string()));
        }

        for model in &self.models {
            if model.name.trim().is_empty() {
                return Err(ConfigError::Invalid("model without a name".to_string()));
            }
            let owner = format!("model '{}'", model.name);
            self.check_chips(&model.basic, &owner)?;
            self.check_chips(&model.full, &owner)?;
        }

        // Planning rejects case name collisions, including ones across job kinds.
        for mode in [TestMode::Basic, TestMode::Full] {
            crate::plan::plan(self, mode)?;
        }

        Ok(())
    }

    fn check_chips(&self, chips: &[String], owner: &str) -> Result<(), ConfigError> {
        match chips.iter().find(|chip| !self.chips.contains(chip)) {
            Some(chip) => Err(ConfigError::UnknownChip {
                chip: chip.clone(),
                owner: owner.to_string(),
            }),
            None => Ok(()),
        }
    }
}
