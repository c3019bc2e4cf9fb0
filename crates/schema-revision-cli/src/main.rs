//! schema-revision CLI - declarative, revision-based PostgreSQL schema migrations.

use clap::{Parser, Subcommand};
use schema_revision::schema::table_names;
use schema_revision::{
    load_definition, Config, MemoryTarget, MigrateError, MigrationElement, MigrationPlan,
    Migrator, PgSchemaTarget, PlanAction, SchemaTarget,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-revision")]
#[command(about = "Declarative, revision-based PostgreSQL schema migrations")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring every table in a schema definition to its declared revision
    Migrate {
        /// Path to YAML schema definition
        #[arg(short, long)]
        schema: PathBuf,

        /// Override migration.max_revision
        #[arg(long)]
        max_revision: Option<u32>,

        /// Drop every table before migrating it (test databases only)
        #[arg(long)]
        delete_before_migrating: bool,
    },

    /// Show the SQL migrate would run, without changing anything
    Plan {
        /// Path to YAML schema definition
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Show stored and declared revision of every table
    Status {
        /// Path to YAML schema definition
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Validate a schema definition without connecting to a database
    Check {
        /// Path to YAML schema definition
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    // Check is offline and needs no configuration file.
    if let Commands::Check { schema } = &cli.command {
        return check(schema, cli.output_json).await;
    }

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Check { .. } => unreachable!(), // Handled above
        Commands::Migrate {
            schema,
            max_revision,
            delete_before_migrating,
        } => {
            if max_revision.is_some() {
                config.migration.max_revision = max_revision;
            }
            if delete_before_migrating {
                config.migration.delete_before_migrating = true;
            }
            config.validate()?;

            let elements = load(&schema)?;
            let migrator = connect(&config).await?;
            let report = migrator.migrate(&elements).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!("  Created: {}", report.tables_created.len());
                println!("  Upgraded: {}", report.tables_upgraded.len());
                println!("  Unchanged: {}", report.tables_unchanged.len());
                println!("  Revisions applied: {}", report.batches_applied);
                if !report.tables_ahead.is_empty() {
                    println!("  Ahead of definition: {:?}", report.tables_ahead);
                }
            }
        }

        Commands::Plan { schema } => {
            let elements = load(&schema)?;
            let migrator = connect(&config).await?;
            let plan = migrator.plan(&elements).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }

        Commands::Status { schema } => {
            let elements = load(&schema)?;
            let migrator = connect(&config).await?;
            let status = migrator.revisions(&elements).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Table revisions ({}):", migrator.schema());
                for table in &status {
                    let stored = table
                        .stored_revision
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "absent".to_string());
                    println!(
                        "  {} {}: stored {}, declared {}",
                        if table.is_current() { "✓" } else { "✗" },
                        table.table,
                        stored,
                        table.declared_revision
                    );
                }
            }
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            let target =
                PgSchemaTarget::connect(&config.database, config.migration.pool_size).await?;
            target.health_check().await?;
            let latency_ms = start.elapsed().as_millis();

            if cli.output_json {
                println!(
                    "{}",
                    serde_json::json!({
                        "healthy": true,
                        "target": config.database.display_target(),
                        "latency_ms": latency_ms,
                    })
                );
            } else {
                println!("Health Check Results:");
                println!(
                    "  Database (PostgreSQL {}): OK ({}ms)",
                    config.database.display_target(),
                    latency_ms
                );
            }
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<Vec<MigrationElement>, MigrateError> {
    let elements = load_definition(path)?;
    info!(
        "Loaded {} elements from {:?}; tables: {}",
        elements.len(),
        path,
        table_names(&elements).join(", ")
    );
    Ok(elements)
}

async fn connect(config: &Config) -> Result<Migrator, MigrateError> {
    let target = PgSchemaTarget::connect(&config.database, config.migration.pool_size).await?;
    Ok(Migrator::new(Arc::new(target), config.database.schema.clone())
        .with_options(config.migration.clone()))
}

/// Plan a definition against an empty in-memory database.
async fn check(schema: &Path, output_json: bool) -> Result<(), MigrateError> {
    let elements = load(schema)?;
    let migrator = Migrator::new(Arc::new(MemoryTarget::new()), "public");
    let plan = migrator.plan(&elements).await?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("Definition OK: {} tables", plan.tables.len());
        for table in &plan.tables {
            println!(
                "  {} (revision {})",
                table.table.name, table.declared_revision
            );
        }
    }
    Ok(())
}

fn print_plan(plan: &MigrationPlan) {
    for table in &plan.tables {
        let summary = match &table.action {
            PlanAction::UpToDate => format!("up to date at revision {}", table.declared_revision),
            PlanAction::Create { drop_statement, .. } => {
                let verb = if drop_statement.is_some() { "recreate" } else { "create" };
                format!("{} at revision {}", verb, table.declared_revision)
            }
            PlanAction::Upgrade { batches } => format!(
                "upgrade {} -> {} ({} revisions)",
                table.stored_revision.unwrap_or_default(),
                table.declared_revision,
                batches.len()
            ),
            PlanAction::Ahead => format!(
                "ahead of definition (stored {}, declared {})",
                table.stored_revision.unwrap_or_default(),
                table.declared_revision
            ),
        };
        println!("-- {}: {}", table.table, summary);
        for statement in table.statements() {
            println!("{};", statement);
        }
    }
    if plan.is_up_to_date() {
        println!("-- nothing to do");
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Invalid verbosity '{}'", other)),
    };

    // RUST_LOG wins over --verbosity when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Invalid log format '{}'", other)),
    }

    Ok(())
}
