use crate::core::currency::Currency;
use crate::core::fallback::{
    FallbackResolver, MissingRateMethod, MissingRatePolicy, WrongDatePolicy,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

const DEFAULT_SOURCE_FILE: &str = "eurofxref-hist.csv";

/// Options fixed when a converter is constructed.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConverterOptions {
    /// Snap dates outside a currency's bounds to the nearer bound.
    pub fallback_on_wrong_date: bool,
    /// Approximate rates missing inside a currency's bounds.
    pub fallback_on_missing_rate: bool,
    pub fallback_on_missing_rate_method: MissingRateMethod,
    /// Report applied fallbacks at info level.
    pub verbose: bool,
    /// Currency the source rates are expressed against.
    pub ref_currency: Currency,
    /// Cell values read as a missing rate.
    pub na_values: Vec<String>,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        ConverterOptions {
            fallback_on_wrong_date: false,
            fallback_on_missing_rate: false,
            fallback_on_missing_rate_method: MissingRateMethod::default(),
            verbose: false,
            ref_currency: Currency::default(),
            na_values: vec![String::new(), "N/A".to_string()],
        }
    }
}

impl ConverterOptions {
    pub fn wrong_date_policy(&self) -> WrongDatePolicy {
        if self.fallback_on_wrong_date {
            WrongDatePolicy::SnapToBounds
        } else {
            WrongDatePolicy::Fail
        }
    }

    pub fn missing_rate_policy(&self) -> MissingRatePolicy {
        if self.fallback_on_missing_rate {
            MissingRatePolicy::Fill(self.fallback_on_missing_rate_method)
        } else {
            MissingRatePolicy::Fail
        }
    }

    pub fn resolver(&self) -> FallbackResolver {
        FallbackResolver::new(self.wrong_date_policy(), self.missing_rate_policy())
            .with_verbose(self.verbose)
    }

    /// Enables both fallbacks.
    pub fn with_fallbacks(mut self, method: MissingRateMethod) -> Self {
        self.fallback_on_wrong_date = true;
        self.fallback_on_missing_rate = true;
        self.fallback_on_missing_rate_method = method;
        self
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Rate files merged in order; the first recorded rate for a date wins.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Load rates as exact decimals instead of floats.
    #[serde(default)]
    pub decimal: bool,
    #[serde(flatten)]
    pub converter: ConverterOptions,
}

impl AppConfig {
    /// Loads the given config, or the default one when it exists, or falls
    /// back to built-in defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }
        let default_path = Self::default_config_path()?;
        if default_path.exists() {
            Self::load_from_path(&default_path)
        } else {
            debug!(
                "No config at {}, using defaults",
                default_path.display()
            );
            Ok(Self::default())
        }
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("in", "fxconv", "fxconv")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_source_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().join(DEFAULT_SOURCE_FILE))
    }

    /// Configured sources, or the default data file when none are set.
    pub fn source_paths(&self) -> Result<Vec<PathBuf>> {
        if self.sources.is_empty() {
            Ok(vec![Self::default_source_path()?])
        } else {
            Ok(self.sources.clone())
        }
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
