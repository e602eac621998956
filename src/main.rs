//! Stock Reconcile - command line front end
//!
//! Thin layer over the library: every subcommand opens the configured
//! installation, calls one reconciler operation and prints the outcome.

use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

use stock_reconcile::activity_log::DEFAULT_TAIL_LINES;
use stock_reconcile::config::{default_data_dir, default_db_path};
use stock_reconcile::{
    init_schema, ApplyOutcome, AuditResult, ChangePlan, PreviewOutcome, Reconciler, Result,
    RunRequest, Scope, Settings,
};

/// Reconcile barcode stock feeds against the stock database
#[derive(Parser, Debug)]
#[command(name = "stock_reconcile")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite stock database (default: <data-dir>/stock.db)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Directory holding pending feeds, backups, reports and the operational log
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data directories and the stock schema
    Init,

    /// Manage uploaded feeds
    Feeds {
        #[command(subcommand)]
        action: FeedsCommand,
    },

    /// Show what applying the feeds would change, without writing
    Preview(RunArgs),

    /// Back up the store and apply the feeds
    Apply(RunArgs),

    /// Run the consistency checks
    Audit {
        /// Location to check
        #[arg(short, long, default_value_t = 1)]
        location: i64,

        /// Repair everything that can be repaired
        #[arg(long, default_value_t = false)]
        fix: bool,

        /// Print the result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Manage backups
    Backup {
        #[command(subcommand)]
        action: BackupCommand,
    },

    /// Inspect the operational log
    Log {
        #[command(subcommand)]
        action: LogCommand,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Feed names in the pending area (default: all pending feeds)
    files: Vec<String>,

    /// Location to write to and audit
    #[arg(short, long, default_value_t = 1)]
    location: i64,

    /// Write the counts to every location holding the product
    #[arg(long, default_value_t = false)]
    all_locations: bool,

    /// Treat the feeds as a full inventory: zero every product they do not mention
    #[arg(long, default_value_t = false)]
    zero_missing: bool,

    /// Print the result as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum FeedsCommand {
    /// List pending feeds
    List,
    /// Copy a .txt feed into the pending area
    Import { path: PathBuf },
    /// Remove a pending feed
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
    /// Back up the stock tables now
    Create,
    /// List backups, newest first
    List,
    /// Restore a backup (default: the newest)
    Restore { id: Option<String> },
    /// Delete a backup
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum LogCommand {
    /// Show the last lines
    Tail {
        #[arg(short = 'n', long, default_value_t = DEFAULT_TAIL_LINES)]
        lines: usize,
    },
    /// Show the log size
    Size,
    /// Empty the log
    Clear,
    /// Copy the log to a file
    Export { dest: PathBuf },
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = match (cli.database, cli.data_dir) {
        (Some(database), Some(data_dir)) => Settings::new(database, data_dir),
        (None, Some(data_dir)) => Settings::in_dir(data_dir),
        (Some(database), None) => Settings::new(database, default_data_dir()),
        (None, None) => Settings::new(default_db_path(), default_data_dir()),
    };

    if let Err(e) = settings.ensure_dirs() {
        log::error!("Failed to create data directories: {}", e);
        std::process::exit(1);
    }
    log::debug!("Database path: {}", settings.database.display());

    let reconciler = Reconciler::from_settings(settings);
    if let Err(e) = run(&reconciler, cli.command) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn open_store(reconciler: &Reconciler) -> Result<Connection> {
    let conn = reconciler.settings().open_database()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn run(reconciler: &Reconciler, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            open_store(reconciler)?;
            println!(
                "Initialized {} (data in {})",
                reconciler.settings().database.display(),
                reconciler.settings().data_dir.display()
            );
        }
        Command::Feeds { action } => run_feeds(reconciler, action)?,
        Command::Preview(args) => {
            let conn = open_store(reconciler)?;
            let request = run_request(reconciler, &args)?;
            let outcome = reconciler.preview(&conn, &request)?;
            if args.json {
                print_json(&outcome);
            } else {
                print_preview(&outcome);
            }
        }
        Command::Apply(args) => {
            let mut conn = open_store(reconciler)?;
            let request = run_request(reconciler, &args)?;
            let outcome = reconciler.process_inventory(&mut conn, &request)?;
            if args.json {
                print_json(&outcome);
            } else {
                print_apply(&outcome);
            }
        }
        Command::Audit {
            location,
            fix,
            json,
        } => {
            let mut conn = open_store(reconciler)?;
            let result = reconciler.run_audit(&mut conn, location, fix)?;
            if json {
                print_json(&result);
            } else {
                print_audit(&result);
            }
        }
        Command::Backup { action } => run_backup(reconciler, action)?,
        Command::Log { action } => run_log(reconciler, action)?,
    }
    Ok(())
}

fn run_request(reconciler: &Reconciler, args: &RunArgs) -> Result<RunRequest> {
    let files = if args.files.is_empty() {
        reconciler
            .feeds()
            .list()?
            .into_iter()
            .map(|f| f.name)
            .collect()
    } else {
        args.files.clone()
    };
    let scope = if args.all_locations {
        Scope::AllLocations
    } else {
        Scope::Single(args.location)
    };
    Ok(RunRequest {
        files,
        scope,
        location_id: args.location,
        include_zeroing: args.zero_missing,
    })
}

fn run_feeds(reconciler: &Reconciler, action: FeedsCommand) -> Result<()> {
    let feeds = reconciler.feeds();
    match action {
        FeedsCommand::List => {
            let listed = feeds.list()?;
            if listed.is_empty() {
                println!("No pending feeds in {}", feeds.dir().display());
            }
            for feed in listed {
                println!("{:<40} {:>10} B  {}", feed.name, feed.size, feed.modified);
            }
        }
        FeedsCommand::Import { path } => {
            let stored = feeds.import(&path)?;
            println!("Imported {}", stored);
        }
        FeedsCommand::Delete { name } => {
            feeds.delete(&name)?;
            println!("Deleted {}", name);
        }
    }
    Ok(())
}

fn run_backup(reconciler: &Reconciler, action: BackupCommand) -> Result<()> {
    let backups = reconciler.backups();
    match action {
        BackupCommand::Create => {
            let conn = open_store(reconciler)?;
            let info = backups.create_backup(&conn)?;
            println!("Created {} ({})", info.id, info.size_human);
        }
        BackupCommand::List => {
            let listed = backups.list_backups()?;
            if listed.is_empty() {
                println!("No backups in {}", backups.dir().display());
            }
            for info in listed {
                println!("{:<32} {}  {:>10}", info.id, info.created_at, info.size_human);
            }
        }
        BackupCommand::Restore { id } => {
            let mut conn = reconciler.settings().open_database()?;
            let restored = match id {
                Some(id) => {
                    backups.restore_backup(&mut conn, &id)?;
                    id
                }
                None => backups.restore_latest(&mut conn)?,
            };
            println!("Restored {}", restored);
        }
        BackupCommand::Delete { id } => {
            backups.delete_backup(&id)?;
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

fn run_log(reconciler: &Reconciler, action: LogCommand) -> Result<()> {
    let log = reconciler.log();
    match action {
        LogCommand::Tail { lines } => {
            for line in log.tail(lines)? {
                println!("{}", line);
            }
        }
        LogCommand::Size => println!("{}", log.size_human(2)),
        LogCommand::Clear => {
            log.clear()?;
            println!("Log cleared");
        }
        LogCommand::Export { dest } => {
            let bytes = log.export(&dest)?;
            println!("Exported {} bytes to {}", bytes, dest.display());
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Failed to serialize result: {}", e),
    }
}

fn print_plan(plan: &ChangePlan) {
    for change in &plan.updated {
        println!(
            "UPDATE  {:<14} {:<40} {:>6} -> {:>6}",
            change.barcode, change.name, change.old_quantity, change.new_quantity
        );
    }
    for change in &plan.zeroed {
        println!(
            "ZERO    {:<14} {:<40} {:>6} -> {:>6}",
            "", change.name, change.old_quantity, change.new_quantity
        );
    }
    for product in &plan.disabled {
        println!("DISABLE #{} {}", product.product_id, product.name);
    }
    for barcode in &plan.unknown {
        println!("UNKNOWN {}", barcode);
    }
    println!("{}", plan.summary());
}

fn print_preview(outcome: &PreviewOutcome) {
    print_plan(&outcome.plan);
    println!("Preview report: {}", outcome.report.display());
}

fn print_apply(outcome: &ApplyOutcome) {
    println!("Backup: {} ({})", outcome.backup.id, outcome.backup.size_human);
    print_plan(&outcome.plan);
    print_audit(&outcome.audit);
    for file in outcome.reports.files() {
        println!("Report: {}", file.display());
    }
}

fn print_audit(result: &AuditResult) {
    for finding in &result.inconsistencies {
        println!(
            "{:<20} product {:>6} variant {:>6}  {}  =>  {}{}",
            finding.kind.label(),
            finding.product_id,
            finding.variant_id,
            finding.before,
            finding.corrected,
            if finding.fixed { " (fixed)" } else { "" }
        );
    }
    println!(
        "{} inconsistencies, {} fixes applied{}",
        result.inconsistencies.len(),
        result.fixes_applied(),
        if result.critical_errors {
            ", CRITICAL errors remain"
        } else {
            ""
        }
    );
}
