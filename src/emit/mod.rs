// ABOUTME: Output serialization: format dispatch and target resolution
// ABOUTME: Tables are written in topological order; anonymization runs inline

pub mod csv;
pub mod json;
pub mod sql;

use crate::anonymize::Anonymizer;
use crate::config::{JsonMode, OutputConfig, OutputFormat};
use crate::schema::{SchemaModel, TableId};
use crate::sort::InsertPlan;
use crate::traverse::collected::{CollectedSet, Row};
use crate::value::SqlValue;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Where the emitted artifact goes. Per-table formats (CSV, per-table
/// JSON) require a directory.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
    Directory(PathBuf),
}

impl OutputTarget {
    /// Resolve `--out-file` against the configured format.
    pub fn resolve(out_file: Option<PathBuf>, options: &OutputConfig) -> Result<Self> {
        let needs_directory = matches!(options.format, OutputFormat::Csv)
            || (matches!(options.format, OutputFormat::Json)
                && options.json_mode == JsonMode::PerTable);

        match out_file {
            None if needs_directory => {
                bail!("this output format writes one file per table; --out-file must name a directory")
            }
            None => Ok(OutputTarget::Stdout),
            Some(path) if needs_directory => {
                if path.exists() && !path.is_dir() {
                    bail!("--out-file '{}' must be a directory", path.display());
                }
                Ok(OutputTarget::Directory(path))
            }
            Some(path) => Ok(OutputTarget::File(path)),
        }
    }
}

/// Everything a writer needs for one emit pass. The collected set is
/// read-only here; writers never mutate extraction state.
pub struct EmitContext<'a> {
    pub schema: &'a SchemaModel,
    pub collected: &'a CollectedSet,
    pub plan: &'a InsertPlan,
    pub anonymizer: &'a Anonymizer,
    pub options: &'a OutputConfig,
}

impl EmitContext<'_> {
    /// The values actually written for a row, anonymization applied.
    pub fn emitted_values(&self, table: TableId, row: &Row) -> Vec<SqlValue> {
        row.values
            .iter()
            .enumerate()
            .map(|(i, v)| self.anonymizer.emit_value(self.schema, table, i, v))
            .collect()
    }
}

/// Serialize the collected set to the target in the configured format.
pub fn emit(ctx: &EmitContext, target: &OutputTarget) -> Result<()> {
    match (ctx.options.format, target) {
        (OutputFormat::Sql, OutputTarget::Stdout) => {
            let stdout = io::stdout();
            sql::write_sql(ctx, &mut stdout.lock())
        }
        (OutputFormat::Sql, OutputTarget::File(path)) => {
            let mut writer = create_file(path)?;
            sql::write_sql(ctx, &mut writer)?;
            writer.flush().context("failed to flush SQL output")
        }
        (OutputFormat::Sql, OutputTarget::Directory(path)) => {
            bail!("SQL output is a single artifact; '{}' is a directory", path.display())
        }
        (OutputFormat::Json, target) => match (ctx.options.json_mode, target) {
            (JsonMode::Single, OutputTarget::Stdout) => {
                let stdout = io::stdout();
                json::write_single(ctx, &mut stdout.lock())
            }
            (JsonMode::Single, OutputTarget::File(path)) => {
                let mut writer = create_file(path)?;
                json::write_single(ctx, &mut writer)?;
                writer.flush().context("failed to flush JSON output")
            }
            (JsonMode::Single, OutputTarget::Directory(path)) => {
                bail!("json_mode=single writes one artifact; '{}' is a directory", path.display())
            }
            (JsonMode::PerTable, OutputTarget::Directory(path)) => json::write_per_table(ctx, path),
            (JsonMode::PerTable, _) => {
                bail!("json_mode=per-table requires --out-file to be a directory")
            }
        },
        (OutputFormat::Csv, OutputTarget::Directory(path)) => csv::write_per_table(ctx, path),
        (OutputFormat::Csv, _) => bail!("CSV output requires --out-file to be a directory"),
    }
}

fn create_file(path: &PathBuf) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file '{}'", path.display()))?;
    Ok(BufWriter::new(file))
}
