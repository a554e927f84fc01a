use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandLineArgs {
    #[arg(long, short)]
    pub config: Option<String>,
    #[arg(long = "set", value_parser = parse_key_val)]
    pub overrides: Vec<(String, String)>,
}

impl CommandLineArgs {
    pub fn new_with_path(path: impl ToString) -> Self {
        CommandLineArgs {
            config: Some(path.to_string()),
            overrides: Vec::new(),
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=');
    match pos {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("invalid KEY=VALUE: no `=` found in `{}`", s)),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown config key '{0}'")]
    UnknownKey(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Configuration of a run. Every module has defaults, so a config file only needs to contain what
/// differs from them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub simulation: Simulation,
    pub routing: Routing,
    pub multi_modal: MultiModal,
    pub controller: Controller,
    pub output: Output,
}

impl TryFrom<CommandLineArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: CommandLineArgs) -> Result<Self, Self::Error> {
        let mut config = match &args.config {
            Some(path) => Config::from_file(Path::new(path))?,
            None => Config::default(),
        };
        config.apply_overrides(&args.overrides)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from {path:?}");
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let deserializer = serde_yaml::Deserializer::from_reader(BufReader::new(file));
        let config: Config = serde_path_to_error::deserialize(deserializer).map_err(|e| {
            ConfigError::Parse {
                path: e.path().to_string(),
                source: e.into_inner(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml);
        let config: Config = serde_path_to_error::deserialize(deserializer).map_err(|e| {
            ConfigError::Parse {
                path: e.path().to_string(),
                source: e.into_inner(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `module.key=value` overrides. Values are parsed as yaml, so that every config entry can be
    /// overridden with the same syntax as in the config file.
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<(), ConfigError> {
        if overrides.is_empty() {
            return Ok(());
        }
        info!("Applying overrides: {:?}", overrides);

        let mut tree = serde_yaml::to_value(&*self).map_err(|source| ConfigError::Parse {
            path: String::from("."),
            source,
        })?;
        for (key, raw) in overrides {
            let slot = key
                .split('.')
                .try_fold(&mut tree, |node, segment| node.get_mut(segment))
                .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            *slot = serde_yaml::from_str::<Value>(raw).map_err(|source| ConfigError::Parse {
                path: key.clone(),
                source,
            })?;
        }
        *self = serde_path_to_error::deserialize(tree).map_err(|e| ConfigError::Parse {
            path: e.path().to_string(),
            source: e.into_inner(),
        })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.sample_size <= 0. {
            return Err(ConfigError::InvalidValue {
                key: "simulation.sample_size",
                reason: format!("must be positive, was {}", self.simulation.sample_size),
            });
        }
        if self.simulation.end_time < self.simulation.start_time {
            return Err(ConfigError::InvalidValue {
                key: "simulation.end_time",
                reason: format!(
                    "end time {} is before start time {}",
                    self.simulation.end_time, self.simulation.start_time
                ),
            });
        }
        if self.routing.time_bin_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "routing.time_bin_size",
                reason: String::from("must be at least 1 second"),
            });
        }
        if let Some((mode, speed)) = self.multi_modal.mode_speeds.iter().find(|(_, s)| **s <= 0.) {
            return Err(ConfigError::InvalidValue {
                key: "multi_modal.mode_speeds",
                reason: format!("speed of mode {mode} must be positive, was {speed}"),
            });
        }
        if self.multi_modal.mode_speeds.contains_key(&self.simulation.main_mode) {
            return Err(ConfigError::InvalidValue {
                key: "multi_modal.mode_speeds",
                reason: format!(
                    "main mode {} can't be simulated by the multi modal engine",
                    self.simulation.main_mode
                ),
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Simulation {
    pub start_time: u32,
    pub end_time: u32,
    pub sample_size: f32,
    /// Mode of the vehicles which are simulated by the queue engine.
    pub main_mode: String,
}

impl Default for Simulation {
    fn default() -> Self {
        Simulation {
            start_time: 0,
            end_time: 86400,
            sample_size: 1.,
            main_mode: String::from("car"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Routing {
    pub turn_aware: bool,
    pub turn_penalty: f64,
    pub u_turn_penalty: f64,
    /// Width of the time bins in which realized travel times are averaged.
    pub time_bin_size: u32,
    /// cost per second of travel time
    pub marginal_cost_of_time: f64,
    /// cost per meter
    pub marginal_cost_of_distance: f64,
}

impl Default for Routing {
    fn default() -> Self {
        Routing {
            turn_aware: false,
            turn_penalty: 0.,
            u_turn_penalty: 0.,
            time_bin_size: 900,
            marginal_cost_of_time: 1.,
            marginal_cost_of_distance: 0.,
        }
    }
}

/// Modes which are simulated without capacity restraints, with their speed in m/s.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MultiModal {
    pub mode_speeds: BTreeMap<String, f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Controller {
    pub iterations: u32,
}

impl Default for Controller {
    fn default() -> Self {
        Controller { iterations: 1 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Output {
    pub output_dir: PathBuf,
    pub logging: Logging,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            output_dir: PathBuf::from("./output"),
            logging: Logging::default(),
        }
    }
}

/// Have this extra layer of log level enum, as tracing subscriber has no
/// off/none option by default. At least it can't be parsed
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub enum Logging {
    #[default]
    None,
    Info,
    Debug,
}
