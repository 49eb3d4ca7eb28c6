// ABOUTME: The inspect command: print the table/FK graph without extracting
// ABOUTME: Shows PKs, row estimates, and both real and virtual edges

use crate::config::Config;
use crate::db;
use crate::schema::introspect::introspect_schema;
use anyhow::Result;

#[derive(Debug, clap::Args)]
pub struct InspectArgs {
    /// Source database connection URL (postgresql://...)
    #[arg(long)]
    pub source: String,
    /// Schema to inspect
    #[arg(long, default_value = "public")]
    pub schema: String,
    /// Path to a TOML config file (for virtual_foreign_keys)
    #[arg(long)]
    pub config: Option<String>,
}

pub async fn inspect(args: InspectArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    db::check_dialect(&args.source)?;
    let client = db::connect(&args.source).await?;
    let model = introspect_schema(&client, &args.schema, &config.virtual_foreign_keys).await?;

    println!("Schema '{}': {} tables", args.schema, model.tables().len());
    for table in model.tables() {
        let pk = if table.has_primary_key() {
            let names: Vec<&str> = table
                .primary_key
                .iter()
                .map(|&i| table.columns[i].name.as_str())
                .collect();
            format!("PK ({})", names.join(", "))
        } else {
            "no PK (leaf only)".to_string()
        };
        println!(
            "  {} - {} columns, ~{} rows, {}",
            table.name,
            table.columns.len(),
            table.row_estimate,
            pk
        );
    }

    println!();
    println!("FK edges ({}):", model.edges().len());
    for edge in model.edges() {
        let source = model.table(edge.source);
        let target = model.table(edge.target);
        let source_cols: Vec<&str> = edge
            .source_columns
            .iter()
            .map(|&i| source.columns[i].name.as_str())
            .collect();
        let target_cols: Vec<&str> = edge
            .target_columns
            .iter()
            .map(|&i| target.columns[i].name.as_str())
            .collect();
        println!(
            "  {} {}.({}) -> {}.({}){}{}",
            edge.name,
            source.name,
            source_cols.join(", "),
            target.name,
            target_cols.join(", "),
            if edge.nullable { " [nullable]" } else { "" },
            if edge.is_virtual { " [virtual]" } else { "" },
        );
    }

    Ok(())
}
