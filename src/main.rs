use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

use loyalty_ledger::{
    import_ledgers, load_ledgers_csv, logging, parse_moment, setup_database, AdminUser,
    AdminUserStore, AppConfig, LoyaltyLedger, LoyaltyService, SqliteLedgerStore,
};

/// Loyalty points ledger administration
#[derive(Parser, Debug)]
#[command(name = "loyalty", version, about)]
struct Cli {
    /// SQLite database path (overrides database.path from config)
    #[arg(long, env = "LOYALTY_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema
    Init,

    /// Open a ledger for an account
    Enroll {
        #[arg(long)]
        account: String,
        #[arg(long)]
        phone: String,
    },

    /// Credit points to a ledger
    Earn {
        #[arg(long)]
        id: String,
        #[arg(long)]
        points: u64,
    },

    /// Spend points from a ledger
    Redeem {
        #[arg(long)]
        id: String,
        #[arg(long)]
        points: u64,
    },

    /// Print a ledger as JSON (by id or phone)
    Show {
        #[arg(long, conflicts_with = "phone", required_unless_present = "phone")]
        id: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },

    /// Reset every ledger whose expiration has passed
    Sweep {
        /// Treat this instant as "now" (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        now: Option<String>,
    },

    /// Import ledgers from a CSV file (account_ref,phone_number,points)
    Import { csv: PathBuf },

    /// Create a back-office admin user
    AdminCreate {
        #[arg(long)]
        aid: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "LOYALTY_ADMIN_PASSWORD")]
        password: String,
    },

    /// Check admin credentials
    AdminLogin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "LOYALTY_ADMIN_PASSWORD")]
        password: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging)?;

    let db_path = cli.db.clone().unwrap_or_else(|| config.database.path.clone());
    let conn = Connection::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    setup_database(&conn)?;

    let now = Utc::now();

    match cli.command {
        Commands::Init => {
            println!("Database ready: {}", db_path.display());
        }
        Commands::Enroll { account, phone } => {
            let ledger = service(&conn).enroll(&account, &phone, now)?;
            print_ledger(&ledger)?;
        }
        Commands::Earn { id, points } => {
            let ledger = service(&conn).earn(&id, points, now)?;
            print_ledger(&ledger)?;
        }
        Commands::Redeem { id, points } => {
            let ledger = service(&conn).redeem(&id, points, now)?;
            print_ledger(&ledger)?;
        }
        Commands::Show { id, phone } => {
            let service = service(&conn);
            // clap guarantees exactly one of --id / --phone
            let ledger = match id {
                Some(id) => service.get(&id)?,
                None => service
                    .find_by_phone(phone.as_deref().unwrap_or_default())?
                    .context("No ledger for that phone number")?,
            };
            print_ledger(&ledger)?;
        }
        Commands::Sweep { now: at } => {
            let at: DateTime<Utc> = match at {
                Some(text) => parse_moment(&text)?,
                None => now,
            };
            run_sweep(&conn, at)?;
        }
        Commands::Import { csv } => {
            let ledgers = load_ledgers_csv(&csv, now)?;
            println!("Loaded {} ledgers from {}", ledgers.len(), csv.display());

            let summary = import_ledgers(&SqliteLedgerStore::new(&conn), &ledgers)?;
            println!("Inserted: {}", summary.inserted);
            println!("Skipped duplicates: {}", summary.duplicates);
        }
        Commands::AdminCreate {
            aid,
            name,
            email,
            password,
        } => {
            let admins = AdminUserStore::new(&conn, config.auth.bcrypt_cost);
            let mut admin = AdminUser::new(aid, name, email, password, now)?;
            admins.create(&mut admin)?;
            println!("{}", serde_json::to_string_pretty(&admin)?);
        }
        Commands::AdminLogin { email, password } => {
            let admins = AdminUserStore::new(&conn, config.auth.bcrypt_cost);
            match admins.authenticate(&email, &password)? {
                Some(admin) => println!("Authenticated {} ({})", admin.aid, admin.role.as_str()),
                None => bail!("Invalid email or password"),
            }
        }
    }

    Ok(())
}

fn service(conn: &Connection) -> LoyaltyService<'_, SqliteLedgerStore<'_>> {
    LoyaltyService::new(SqliteLedgerStore::new(conn))
        .with_audit(conn)
        .with_actor("loyalty_cli")
}

fn print_ledger(ledger: &LoyaltyLedger) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(ledger)?);
    Ok(())
}

fn run_sweep(conn: &Connection, at: DateTime<Utc>) -> Result<()> {
    let service = service(conn).with_actor("expiration_sweep");
    let report = service.sweep(at)?;

    println!("Sweep at {}", report.swept_at.to_rfc3339());
    println!("Expired ledgers found: {}", report.scanned);
    println!("Reset: {}", report.reset.len());
    println!("Points forfeited: {}", report.forfeited_points());

    for reset in &report.reset {
        println!(
            "  reset {} (-{} points, expires {})",
            reset.id,
            reset.forfeited_points,
            reset.ledger.expiration_date.date_naive()
        );
    }

    if !report.is_clean() {
        for failure in &report.failed {
            eprintln!("  failed {}: {}", failure.id, failure.reason);
        }
        bail!("{} ledger(s) could not be reset", report.failed.len());
    }

    Ok(())
}
