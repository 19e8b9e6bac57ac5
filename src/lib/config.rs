use log::LevelFilter;
use serde::{Serialize, Deserialize};

use crate::classroom::ClassroomConfig;
use crate::errors::*;
use crate::params::ModelConfig;
use crate::runner::DEFAULT_EXTINCTION_THRESHOLD;
use crate::sir::Stepper;

/// A full run configuration, read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rng_seed: Option<u64>,
    pub output_path: Option<String>,
    pub log_level: Option<String>,

    pub model: ModelConfig,
    #[serde(default)]
    pub stepper: Stepper,
    pub extinction_threshold: Option<f64>,
    #[serde(default)]
    pub cross_validate: bool,

    pub sensitivity: Option<SensitivityConfig>,
    pub classroom: Option<ClassroomConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityConfig {
    pub betas: Vec<f64>,
    pub gammas: Vec<f64>,
    #[serde(default)]
    pub cross_validate: bool,
}

impl Config {
    pub fn from_json(json_data: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(json_data)?;
        Ok(config)
    }

    pub fn log_level(&self) -> Result<LevelFilter, Error> {
        match &self.log_level {
            Some(level) => level.parse().map_err(|_| Error::InvalidLogLevel(level.clone())),
            None => Ok(LevelFilter::Info),
        }
    }

    pub fn extinction_threshold(&self) -> f64 {
        self.extinction_threshold.unwrap_or(DEFAULT_EXTINCTION_THRESHOLD)
    }
}
