// ABOUTME: The extract command: introspect, traverse, sort, emit, validate
// ABOUTME: Merges CLI flags over TOML config; CLI always wins

use crate::anonymize::{Anonymizer, SensitivityRules};
use crate::cancel;
use crate::config::{Config, Direction, OutputFormat};
use crate::db;
use crate::emit::{self, EmitContext, OutputTarget};
use crate::error::ExtractError;
use crate::fetch::PgRowSource;
use crate::schema::introspect::introspect_schema;
use crate::schema::TableId;
use crate::seed::{self, SeedPredicate};
use crate::sort::plan_insert_order;
use crate::traverse::{self, TraversalOptions};
use crate::validate::check_referential_integrity;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, clap::Args)]
pub struct ExtractArgs {
    /// Source database connection URL (postgresql://...)
    #[arg(long)]
    pub source: String,
    /// Schema to extract from
    #[arg(long, default_value = "public")]
    pub schema: String,
    /// Seed spec: table.column=literal or table:<where-fragment>. Repeatable.
    #[arg(long = "seed", required = true)]
    pub seeds: Vec<String>,
    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<String>,
    /// BFS depth cap; 0 collects seed rows only
    #[arg(long)]
    pub depth: Option<u32>,
    /// Which FK edges to follow: up, down, or both
    #[arg(long, value_enum)]
    pub direction: Option<Direction>,
    /// Tables never traversed into (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude_tables: Option<Vec<String>>,
    /// Output format: sql, json, or csv
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
    /// Output file, or directory for per-table formats; stdout if omitted
    #[arg(long)]
    pub out_file: Option<PathBuf>,
    /// Rewrite sensitive columns while emitting
    #[arg(long)]
    pub anonymize: bool,
    /// Seed string for deterministic anonymization across runs
    #[arg(long)]
    pub anonymize_seed: Option<String>,
    /// Skip the post-extraction referential integrity check
    #[arg(long)]
    pub no_validate: bool,
    /// Treat referential integrity gaps as fatal
    #[arg(long)]
    pub fail_on_validation_error: bool,
    /// Force streaming reads for every table
    #[arg(long)]
    pub stream: bool,
}

pub async fn extract(args: ExtractArgs) -> Result<()> {
    let config = effective_config(&args)?;
    let cancel = cancel::install_ctrl_c_handler();

    let client = db::connect(&args.source).await?;

    let mut model =
        introspect_schema(&client, &args.schema, &config.virtual_foreign_keys).await?;
    let rules = SensitivityRules::from_config(&config.anonymize)?;
    rules.annotate(&mut model);
    let model = model;

    let seeds: Vec<SeedPredicate> = args
        .seeds
        .iter()
        .map(|s| seed::parse_seed(s))
        .collect::<Result<_, _>>()?;

    let mut exclude_tables: HashSet<TableId> = HashSet::new();
    for name in &config.exclude_tables {
        match model.table_id(name) {
            Some(id) => {
                exclude_tables.insert(id);
            }
            None => tracing::warn!("excluded table '{}' does not exist in the schema", name),
        }
    }

    let depth = args.depth.unwrap_or(config.default_depth);
    let options = TraversalOptions {
        max_depth: depth,
        direction: config.direction,
        exclude_tables,
    };

    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("traversing foreign-key graph...");

    let mut source = PgRowSource::new(
        &client,
        config.performance.batch_size,
        config.performance.streaming.clone(),
        cancel.clone(),
    );
    let collected = traverse::run(&model, &mut source, &seeds, &options, &cancel).await?;
    spinner.finish_and_clear();

    if collected.is_empty() {
        tracing::warn!("seeds matched no rows; output will be empty");
    }

    let plan = plan_insert_order(&model, &collected)?;

    let anonymizer = if config.anonymize.enabled {
        let seed_string = match &config.anonymize.seed {
            Some(s) => s.clone(),
            None => {
                let random: [u8; 16] = rand::random();
                tracing::warn!(
                    "anonymize.seed not configured; using a random per-run seed \
                     (output differs between runs)"
                );
                hex::encode(random)
            }
        };
        Anonymizer::new(true, seed_string)
    } else {
        Anonymizer::disabled()
    };

    let target = OutputTarget::resolve(args.out_file.clone(), &config.output)?;
    let ctx = EmitContext {
        schema: &model,
        collected: &collected,
        plan: &plan,
        anonymizer: &anonymizer,
        options: &config.output,
    };
    cancel.check()?;
    emit::emit(&ctx, &target)?;

    if config.validate {
        let violations = check_referential_integrity(&model, &collected, &plan.deferred_edges);
        for violation in &violations {
            tracing::warn!("validation: {}", violation);
        }
        if !violations.is_empty() && config.fail_on_validation_error {
            return Err(ExtractError::Validation {
                count: violations.len(),
            }
            .into());
        }
    }

    let order: Vec<&str> = plan
        .ordered_tables
        .iter()
        .map(|&t| model.table(t).name.as_str())
        .collect();
    tracing::info!(
        "extracted {} row(s) across {} table(s); insert order: {}",
        collected.total_rows(),
        plan.ordered_tables.len(),
        order.join(", ")
    );
    for &table_id in &plan.ordered_tables {
        tracing::info!(
            "  {}: {} row(s)",
            model.table(table_id).name,
            collected.row_count(table_id)
        );
    }
    if !plan.deferred_edges.is_empty() {
        let names: Vec<&str> = plan
            .deferred_edges
            .iter()
            .map(|&e| model.edge(e).name.as_str())
            .collect();
        tracing::info!("deferred FK edges: {}", names.join(", "));
    }

    Ok(())
}

/// File config with CLI overrides folded in.
fn effective_config(args: &ExtractArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(direction) = args.direction {
        config.direction = direction;
    }
    if let Some(tables) = &args.exclude_tables {
        config.exclude_tables.extend(tables.iter().cloned());
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if args.anonymize {
        config.anonymize.enabled = true;
    }
    if let Some(seed) = &args.anonymize_seed {
        config.anonymize.seed = Some(seed.clone());
    }
    if args.no_validate {
        config.validate = false;
    }
    if args.fail_on_validation_error {
        config.fail_on_validation_error = true;
    }
    if args.stream {
        config.performance.streaming.enabled = true;
    }

    config.check().context("invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> ExtractArgs {
        ExtractArgs {
            source: "postgresql://u@h/db".into(),
            schema: "public".into(),
            seeds: vec!["users.id=1".into()],
            config: None,
            depth: None,
            direction: None,
            exclude_tables: None,
            format: None,
            out_file: None,
            anonymize: false,
            anonymize_seed: None,
            no_validate: false,
            fail_on_validation_error: false,
            stream: false,
        }
    }

    #[test]
    fn cli_flags_override_config() {
        let mut args = base_args();
        args.direction = Some(Direction::Up);
        args.format = Some(OutputFormat::Json);
        args.anonymize = true;
        args.anonymize_seed = Some("fixed".into());
        args.no_validate = true;
        args.stream = true;
        args.exclude_tables = Some(vec!["audit_log".into()]);

        let config = effective_config(&args).unwrap();
        assert_eq!(config.direction, Direction::Up);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.anonymize.enabled);
        assert_eq!(config.anonymize.seed.as_deref(), Some("fixed"));
        assert!(!config.validate);
        assert!(config.performance.streaming.enabled);
        assert!(config.exclude_tables.contains("audit_log"));
    }

    #[test]
    fn defaults_pass_through_untouched() {
        let config = effective_config(&base_args()).unwrap();
        assert_eq!(config.default_depth, 3);
        assert_eq!(config.direction, Direction::Both);
        assert!(config.validate);
    }
}
