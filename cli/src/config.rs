use std::path::Path;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Configuration for the CLI.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Options that control how containers are summarized.
    pub summary: SummaryConfig,
}

/// Options that control how containers are summarized. Any of them can be
/// overridden from the command line.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SummaryConfig {
    /// Number of worker threads. By default it depends on the number of
    /// CPU cores.
    pub threads: Option<u8>,
    /// Keep non-ASCII characters in original names, as long as they are
    /// valid UTF-8.
    #[serde(default)]
    pub keep_unicode: bool,
    /// Truncate values at the second `=`, like older reports do.
    #[serde(default)]
    pub legacy_values: bool,
    /// Containers larger than this size, in bytes, are not parsed and are
    /// reported as corrupt.
    pub skip_larger: Option<u64>,
}

/// Load a config file from a given path. Path must contain a valid TOML file
/// or this function will propagate the error.
pub fn load_config_from_file(
    config_file: &Path,
) -> Result<Config, Box<figment::Error>> {
    let config: Config =
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file_exact(config_file))
            .extract()?;
    Ok(config)
}
