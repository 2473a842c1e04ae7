// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use chrono::NaiveDate;
use eavstore::manager::{Manager, SchemaManager};
use eavstore::metadata::StaticUser;
use eavstore::model::schema::Schema;
use eavstore::report::{self, ReportOptions};
use eavstore::types::SchemaState;
use std::io;
use tracing::info;

#[derive(Parser)]
#[command(name = "eavstore")]
#[command(author, version, about = "Dynamic-schema EAV data store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and migrate a new store file
    Init {
        /// Database path
        #[arg(short, long, default_value = "eavstore.db")]
        db_path: String,
    },
    /// List every version of a schema name, ordered by publish date
    Versions {
        /// Schema name
        name: String,
        /// Database path
        #[arg(short, long, default_value = "eavstore.db")]
        db_path: String,
    },
    /// Transition a draft schema version to review or published
    Publish {
        /// Schema version id
        schema_id: i64,
        /// Target state: review or published
        #[arg(long, default_value = "published")]
        state: String,
        /// Publish date (defaults to today, published/retracted only)
        #[arg(long)]
        on: Option<NaiveDate>,
        /// User key recorded on the audit trail
        #[arg(long, default_value = "cli")]
        user: String,
        /// Database path
        #[arg(short, long, default_value = "eavstore.db")]
        db_path: String,
    },
    /// Build a report for a schema name and print it as CSV
    Report {
        /// Schema name
        name: String,
        /// Expand choice collections into one column per choice code
        #[arg(long)]
        expand_collections: bool,
        /// Render choice values as their label instead of their code
        #[arg(long)]
        use_choice_labels: bool,
        /// Redact private attributes as "[PRIVATE]"
        #[arg(long)]
        ignore_private: bool,
        /// Restrict the report to these attribute names
        #[arg(long)]
        attribute: Vec<String>,
        /// Database path
        #[arg(short, long, default_value = "eavstore.db")]
        db_path: String,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_path } => {
            info!("Initializing store at: {}", db_path);
            eavstore::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Commands::Versions { name, db_path } => {
            let conn = eavstore::db::open(&db_path)?;
            let versions = Schema::list_versions(&conn, &name)?;
            if versions.is_empty() {
                println!("No versions found for '{}'", name);
                return Ok(());
            }
            for v in versions {
                println!(
                    "#{:<6} {:<10} publish_date={:<12} attrs={}",
                    v.meta.id.unwrap_or_default(),
                    v.state,
                    v.publish_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                    v.attributes.len(),
                );
            }
            Ok(())
        }
        Commands::Publish {
            schema_id,
            state,
            on,
            user,
            db_path,
        } => {
            let target = match state.as_str() {
                "review" => SchemaState::Review,
                "published" => SchemaState::Published,
                "retracted" => SchemaState::Retracted,
                "draft" => SchemaState::Draft,
                other => anyhow::bail!("unknown state '{}'", other),
            };
            let conn = eavstore::db::open(&db_path)?;
            let mut schema = Schema::find_by_id(&conn, schema_id)?
                .with_context(|| format!("schema #{} not found", schema_id))?;
            let today = on.unwrap_or_else(|| chrono::Utc::now().date_naive());
            schema.transition(target, today)?;
            schema.update_state(&conn, &StaticUser::new(user))?;
            info!("Schema #{} transitioned to {}", schema_id, schema.state);
            println!("Schema #{} is now {}", schema_id, schema.state);
            Ok(())
        }
        Commands::Report {
            name,
            expand_collections,
            use_choice_labels,
            ignore_private,
            attribute,
            db_path,
        } => {
            let conn = eavstore::db::open(&db_path)?;
            let manager = SchemaManager;
            if !manager.has(&conn, &name)? {
                anyhow::bail!("no published version of '{}' found", name);
            }

            let opts = ReportOptions {
                ids: None,
                attributes: if attribute.is_empty() { None } else { Some(attribute) },
                expand_collections,
                use_choice_labels,
                ignore_private,
                context: None,
            };
            let built = report::build_report(&conn, &name, &opts)?;
            print_csv(&built);
            Ok(())
        }
        Commands::Completions { shell } => {
            info!("Generating shell completions for {:?}", shell);
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "eavstore", &mut io::stdout());
            Ok(())
        }
    }
}

fn print_csv(built: &report::Report) {
    let mut header = vec!["id", "form_name", "form_publish_date", "state"];
    header.extend(built.columns.iter().map(String::as_str));
    println!("{}", header.join(","));

    for row in &built.rows {
        let mut fields = vec![
            row.id.to_string(),
            csv_escape(&row.form_name),
            row.form_publish_date.map(|d| d.to_string()).unwrap_or_default(),
            row.state.clone(),
        ];
        for column in &built.columns {
            let cell = row
                .values
                .get(column)
                .map(cell_to_string)
                .unwrap_or_default();
            fields.push(csv_escape(&cell));
        }
        println!("{}", fields.join(","));
    }
}

fn cell_to_string(cell: &report::Cell) -> String {
    match cell {
        report::Cell::Null => String::new(),
        report::Cell::Int(n) => n.to_string(),
        report::Cell::Text(s) => s.clone(),
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
