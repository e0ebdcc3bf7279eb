//! Configuration for pre-generation.
//!
//! Options are read loosely typed and validated one by one. An option with a
//! bad type or value falls back to its documented default and produces a
//! [`ConfigNotice`]; only unreadable or malformed files are errors.
//!
//! ```yaml
//! worlds: [world]
//! gen-type: spawn              # spawn | fixed
//! x: 100
//! z: 100
//! max-concurrent-generation: 4
//! tick-period: 10
//! ```

use pregen_common::{GenerationKind, GenerationMode, ThrottleConfig};
use serde::Deserialize;
use serde_yaml::Value;
use std::fmt;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::Path;

/// Half-extent used when `x`/`z` are missing or invalid.
pub const DEFAULT_RADIUS: u32 = 100;

/// Contents written by [`write_default`].
pub const DEFAULT_CONFIG_YAML: &str = "\
# Worlds to pre-generate. Nothing is generated while this list is empty.
worlds: []

# spawn: x/z chunks on each side of the world spawn.
# fixed: x/2 and z/2 chunks on each side of chunk 0,0.
gen-type: spawn
x: 100
z: 100

# Chunks taken off each world's queue per run. Leave out to auto-detect.
# max-concurrent-generation: 4

# Ticks between two runs.
tick-period: 10
";

/// Errors that stop configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("configuration root must be a mapping")]
    NotAMapping,
}

/// An option that was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigNotice {
    WorldsNotAList,
    InvalidWorldName(String),
    DuplicateWorld(String),
    UnknownGenType(String),
    NonIntegerExtent,
    InvalidMaxConcurrent { detected: usize },
    InvalidTickPeriod { fallback: u64 },
}

impl fmt::Display for ConfigNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorldsNotAList => write!(f, "'worlds' is not a list, no worlds will be generated"),
            Self::InvalidWorldName(value) => write!(f, "ignoring invalid world name {value}"),
            Self::DuplicateWorld(name) => write!(f, "world '{name}' is listed more than once"),
            Self::UnknownGenType(value) => {
                write!(f, "unknown gen-type {value}, falling back to 'spawn'")
            }
            Self::NonIntegerExtent => write!(
                f,
                "x or z is not a non-negative integer, falling back to {DEFAULT_RADIUS}"
            ),
            Self::InvalidMaxConcurrent { detected } => write!(
                f,
                "incorrect max-concurrent-generation, auto-detected value is {detected}"
            ),
            Self::InvalidTickPeriod { fallback } => {
                write!(f, "incorrect tick-period, falling back to {fallback}")
            }
        }
    }
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PregenConfig {
    /// Region names, in configuration order, without duplicates.
    pub worlds: Vec<String>,
    pub mode: GenerationMode,
    pub throttle: ThrottleConfig,
}

impl Default for PregenConfig {
    fn default() -> Self {
        Self {
            worlds: Vec::new(),
            mode: GenerationMode::new(GenerationKind::Spawn, DEFAULT_RADIUS, DEFAULT_RADIUS),
            throttle: ThrottleConfig::new(default_max_concurrent()),
        }
    }
}

/// A validated configuration and the notices raised while validating it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PregenConfig,
    pub notices: Vec<ConfigNotice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    worlds: Option<Value>,
    gen_type: Option<Value>,
    x: Option<Value>,
    z: Option<Value>,
    max_concurrent_generation: Option<Value>,
    tick_period: Option<Value>,
}

/// Drain rate used when none is configured: up to 4, leaving two cores to
/// the host, and never less than 1.
pub fn default_max_concurrent() -> NonZeroUsize {
    let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    NonZeroUsize::new(cores.saturating_sub(2).min(4)).unwrap_or(NonZeroUsize::MIN)
}

/// Parse and validate a YAML document. Notices are also logged.
pub fn parse_str(text: &str) -> Result<LoadedConfig, ConfigError> {
    let raw = match serde_yaml::from_str::<Value>(text)? {
        Value::Null => RawConfig::default(),
        value @ Value::Mapping(_) => serde_yaml::from_value(value)?,
        _ => return Err(ConfigError::NotAMapping),
    };
    let loaded = validate(raw);
    for notice in &loaded.notices {
        tracing::warn!("{notice}");
    }
    Ok(loaded)
}

/// Read and validate a configuration file.
pub fn load(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text)
}

/// Write the default configuration file, creating parent directories.
pub fn write_default(path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_YAML)?;
    Ok(())
}

/// Load `path`, writing the default configuration there first if it is missing.
pub fn load_or_init(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        write_default(path)?;
        tracing::info!(path = %path.display(), "wrote default configuration");
    }
    load(path)
}

fn validate(raw: RawConfig) -> LoadedConfig {
    let mut notices = Vec::new();

    let worlds = match raw.worlds {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(entries)) => {
            let mut worlds: Vec<String> = Vec::with_capacity(entries.len());
            for entry in entries {
                match entry {
                    Value::String(name) if !name.trim().is_empty() => {
                        if worlds.contains(&name) {
                            notices.push(ConfigNotice::DuplicateWorld(name));
                        } else {
                            worlds.push(name);
                        }
                    }
                    other => notices.push(ConfigNotice::InvalidWorldName(describe(&other))),
                }
            }
            worlds
        }
        Some(_) => {
            notices.push(ConfigNotice::WorldsNotAList);
            Vec::new()
        }
    };

    let kind = match raw.gen_type {
        None => GenerationKind::default(),
        Some(Value::String(s)) => s.parse().unwrap_or_else(|_| {
            notices.push(ConfigNotice::UnknownGenType(s.clone()));
            GenerationKind::default()
        }),
        Some(other) => {
            notices.push(ConfigNotice::UnknownGenType(describe(&other)));
            GenerationKind::default()
        }
    };

    let x = raw.x.as_ref().map_or(Some(DEFAULT_RADIUS), as_u32);
    let z = raw.z.as_ref().map_or(Some(DEFAULT_RADIUS), as_u32);
    let (x_radius, z_radius) = match (x, z) {
        (Some(x), Some(z)) => (x, z),
        _ => {
            notices.push(ConfigNotice::NonIntegerExtent);
            (DEFAULT_RADIUS, DEFAULT_RADIUS)
        }
    };

    let max_concurrent = match raw.max_concurrent_generation {
        None => default_max_concurrent(),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .and_then(NonZeroUsize::new)
            .unwrap_or_else(|| {
                let detected = default_max_concurrent();
                notices.push(ConfigNotice::InvalidMaxConcurrent {
                    detected: detected.get(),
                });
                detected
            }),
    };

    let period = match raw.tick_period {
        None => ThrottleConfig::DEFAULT_PERIOD,
        Some(value) => value.as_u64().and_then(NonZeroU64::new).unwrap_or_else(|| {
            notices.push(ConfigNotice::InvalidTickPeriod {
                fallback: ThrottleConfig::DEFAULT_PERIOD.get(),
            });
            ThrottleConfig::DEFAULT_PERIOD
        }),
    };

    LoadedConfig {
        config: PregenConfig {
            worlds,
            mode: GenerationMode::new(kind, x_radius, z_radius),
            throttle: ThrottleConfig::new(max_concurrent).with_period(period),
        },
        notices,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}
