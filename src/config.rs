// ABOUTME: Extraction options loaded from TOML config and CLI flags
// ABOUTME: CLI values override file values; defaults match the documented set

use crate::ident;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

/// Which FK edges to follow from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Child to parent only (referenced rows).
    Up,
    /// Parent to child only (referencing rows).
    Down,
    #[default]
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Sql,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JsonMode {
    #[default]
    Single,
    PerTable,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// BFS depth cap, hops from the nearest seed.
    #[serde(default = "default_depth")]
    pub default_depth: u32,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub exclude_tables: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default)]
    pub fail_on_validation_error: bool,
    #[serde(default)]
    pub anonymize: AnonymizeConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub virtual_foreign_keys: Vec<VirtualFkConfig>,
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnonymizeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Run-wide seed string. When absent a random seed is generated per
    /// run, which breaks cross-run determinism.
    #[serde(default)]
    pub seed: Option<String>,
    /// Explicit `table.column -> method` assignments, overriding the
    /// pattern-matched defaults.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Column-name regexes that replace the default NULL_OUT set.
    #[serde(default)]
    pub null_fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_true")]
    pub include_transaction: bool,
    #[serde(default)]
    pub include_drop_tables: bool,
    #[serde(default)]
    pub disable_fk_checks: bool,
    #[serde(default)]
    pub json_mode: JsonMode,
    #[serde(default)]
    pub json_pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: OutputFormat::default(),
            include_transaction: true,
            include_drop_tables: false,
            disable_fk_checks: false,
            json_mode: JsonMode::default(),
            json_pretty: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceConfig {
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Maximum key tuples per IN-list; larger requests are split.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            streaming: StreamingConfig::default(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Row-estimate threshold above which a table is read through a
    /// server-side stream even when streaming is not forced on.
    #[serde(default = "default_stream_threshold")]
    pub threshold: i64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            enabled: false,
            threshold: default_stream_threshold(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// A user-declared FK edge not present as a database constraint.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualFkConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub source_table: String,
    pub source_columns: Vec<String>,
    pub target_table: String,
    /// Defaults to the target table's primary key.
    #[serde(default)]
    pub target_columns: Option<Vec<String>>,
}

fn default_depth() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}

fn default_stream_threshold() -> i64 {
    10_000
}

fn default_chunk_size() -> usize {
    1000
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse TOML config at {}", path))?;
        config.check()?;
        Ok(config)
    }

    /// Validate option ranges and names before anything touches the
    /// database. The CLI may still lower the effective depth to 0 for a
    /// seeds-only extraction.
    pub fn check(&self) -> Result<()> {
        if self.default_depth < 1 {
            bail!(
                "default_depth must be at least 1 (got {})",
                self.default_depth
            );
        }
        if self.performance.batch_size == 0 {
            bail!("performance.batch_size must be positive");
        }
        if self.performance.streaming.chunk_size == 0 {
            bail!("performance.streaming.chunk_size must be positive");
        }
        for table in &self.exclude_tables {
            ident::validate_identifier(table)
                .with_context(|| format!("invalid excluded table name '{}'", table))?;
        }
        for (field, method) in &self.anonymize.fields {
            if field.split('.').count() != 2 {
                bail!(
                    "anonymize.fields key '{}' must be table.column (method '{}')",
                    field,
                    method
                );
            }
        }
        Ok(())
    }
}
