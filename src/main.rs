use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod audit;
mod dates;
mod db;
mod error;
mod models;
mod report;
mod roster_csv;
mod settings;
mod swaps;
mod users;
mod vacations;

use crate::audit::{audited, AuditAction};
use crate::models::{Role, Shift, SwapStatus, User, UserStatus, VacationStatus};

#[derive(Parser)]
#[command(name = "escalas")]
#[command(about = "Duty roster, shift swaps and vacations for the BMI operators", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo team and a roster for the current month
    Seed,
    /// Check a user's credentials
    Login {
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },
    /// Manage accounts
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Write a blank roster CSV for a month
    Template {
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        out: PathBuf,
    },
    /// Import a roster CSV as the active schedule for a month
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
        #[arg(long = "as")]
        actor: String,
        /// Accept the file even when validation produced warnings
        #[arg(long)]
        force: bool,
    },
    /// Export the active schedule of a month as CSV
    Export {
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
        #[arg(long = "as")]
        actor: String,
        /// Defaults to standard output
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the active schedule of a month
    Show {
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
    },
    /// Shift swap requests
    Swap {
        #[command(subcommand)]
        command: SwapCommand,
    },
    /// Vacation requests
    Vacation {
        #[command(subcommand)]
        command: VacationCommand,
    },
    /// Inspect the audit log
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Generate a markdown report for a month
    Report {
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "escala.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create an account. The first account needs no --as and is always
    /// super_admin; later accounts default to operador
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        role: Option<Role>,
        #[arg(long = "as")]
        actor: Option<String>,
    },
    List,
    SetStatus {
        #[arg(long)]
        name: String,
        #[arg(long)]
        status: UserStatus,
        #[arg(long = "as")]
        actor: String,
    },
    SetRole {
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: Role,
        #[arg(long = "as")]
        actor: String,
    },
}

#[derive(Subcommand)]
enum SwapCommand {
    /// Ask another operator to trade slots
    Request {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        shift: Shift,
        #[arg(long)]
        target: String,
        #[arg(long)]
        target_date: String,
        #[arg(long)]
        target_shift: Shift,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Accept or decline a request addressed to you
    Respond {
        #[arg(long)]
        id: Uuid,
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        decline: bool,
    },
    /// Approve or reject an accepted request (administrators)
    Review {
        #[arg(long)]
        id: Uuid,
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        reject: bool,
        #[arg(long)]
        reason: Option<String>,
    },
    List {
        #[arg(long)]
        status: Option<SwapStatus>,
    },
}

#[derive(Subcommand)]
enum VacationCommand {
    Request {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Approve or reject a pending request (administrators)
    Review {
        #[arg(long)]
        id: Uuid,
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        reject: bool,
        #[arg(long)]
        reason: Option<String>,
    },
    List {
        #[arg(long)]
        status: Option<VacationStatus>,
        #[arg(long)]
        operator: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuditCommand {
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

/// Full dates only on the command line; bare day numbers need a month.
fn parse_cli_date(raw: &str) -> anyhow::Result<NaiveDate> {
    if !raw.contains('/') && !raw.contains('-') {
        bail!("expected DD/MM/YYYY or YYYY-MM-DD, got '{raw}'");
    }
    Ok(dates::parse_date(raw, 1, 1970)?)
}

async fn acting_user(pool: &PgPool, name: &str) -> anyhow::Result<User> {
    let user = db::require_user(pool, name).await?;
    if !user.is_active() {
        bail!(error::EscalaError::InactiveUser(user.name));
    }
    Ok(user)
}

async fn acting_admin(pool: &PgPool, name: &str) -> anyhow::Result<User> {
    let user = acting_user(pool, name).await?;
    if !user.role.is_admin() {
        bail!(error::EscalaError::NotAuthorized(user.name));
    }
    Ok(user)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = settings::AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Template { month, year, out } => write_template(month, year, &out)?,
        command => {
            let pool = connect(&app_config).await?;
            run(&pool, command).await?;
        }
    }

    Ok(())
}

async fn connect(app_config: &settings::AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(app_config.max_connections)
        .connect(app_config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

/// Needs no database, so it runs before any connection is made.
fn write_template(month: u32, year: i32, out: &Path) -> anyhow::Result<()> {
    let template = roster_csv::generate_template(month, year)?;
    std::fs::write(out, template)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Template written to {}.", out.display());
    Ok(())
}

async fn run(pool: &PgPool, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Login { name, password } => {
            let outcome = async {
                let user = db::find_user(pool, &name).await?;
                users::authenticate(user.as_ref(), &password)?;
                user.context("user vanished during login")
            };
            let user = audited(pool, &name, AuditAction::Login, json!({}), outcome).await?;
            println!("Welcome, {} ({}).", user.name, user.role);
        }
        Commands::User { command } => run_user_command(pool, command).await?,
        Commands::Template { month, year, out } => write_template(month, year, &out)?,
        Commands::Import {
            csv,
            month,
            year,
            actor,
            force,
        } => {
            let details = json!({ "file": csv.display().to_string(), "month": month, "year": year });
            let outcome = async {
                let admin = acting_admin(pool, &actor).await?;
                let text = std::fs::read_to_string(&csv)
                    .with_context(|| format!("failed to read {}", csv.display()))?;
                let roster = db::roster_names(pool).await?;
                let report = roster_csv::validate_and_parse(&text, month, year, &roster)?;

                for warning in &report.warnings {
                    println!("warning: {warning}");
                }
                for issue in &report.errors {
                    println!("error: {issue}");
                }
                if !report.is_valid() {
                    bail!("{} error(s); nothing imported", report.errors.len());
                }
                if !report.warnings.is_empty() && !force {
                    bail!(
                        "{} warning(s); rerun with --force to import anyway",
                        report.warnings.len()
                    );
                }

                let schedule =
                    models::MonthSchedule::new(month, year, report.entries, &admin.name);
                db::save_schedule(pool, &schedule).await?;
                anyhow::Ok(schedule)
            };
            let schedule =
                audited(pool, &actor, AuditAction::ImportSchedule, details, outcome).await?;
            println!(
                "Imported {} days into schedule {}.",
                schedule.entries.len(),
                schedule.label()
            );
        }
        Commands::Export {
            month,
            year,
            actor,
            out,
        } => {
            let details = json!({ "month": month, "year": year });
            let outcome = async {
                acting_user(pool, &actor).await?;
                let mut conn = pool.acquire().await?;
                let schedule = db::require_active_schedule(&mut conn, month, year).await?;
                anyhow::Ok(roster_csv::export(&schedule)?)
            };
            let text = audited(pool, &actor, AuditAction::ExportSchedule, details, outcome).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    info!("Schedule exported to {}", path.display());
                }
                None => print!("{text}"),
            }
        }
        Commands::Show { month, year } => {
            let mut conn = pool.acquire().await?;
            let schedule = db::require_active_schedule(&mut conn, month, year).await?;
            println!("Escala {} (imported by {})", schedule.label(), schedule.imported_by);
            for entry in &schedule.entries {
                println!(
                    "{} {:<13} | {:<20} | {}",
                    dates::format_date(entry.date),
                    entry.day_of_week,
                    entry.meio_periodo,
                    entry.fechamento
                );
            }
        }
        Commands::Swap { command } => run_swap_command(pool, command).await?,
        Commands::Vacation { command } => run_vacation_command(pool, command).await?,
        Commands::Audit {
            command: AuditCommand::List { limit },
        } => {
            let entries = db::fetch_audit(pool, limit.max(1)).await?;
            if entries.is_empty() {
                println!("Audit log is empty.");
            }
            for entry in entries {
                println!(
                    "{} {} {} {} {}",
                    entry.timestamp.format("%d/%m/%Y %H:%M:%S"),
                    if entry.success { "ok  " } else { "FAIL" },
                    entry.user_name,
                    entry.action,
                    entry.details
                );
            }
        }
        Commands::Report { month, year, out } => {
            let mut conn = pool.acquire().await?;
            let schedule = db::require_active_schedule(&mut conn, month, year).await?;
            let first = dates::first_of_month(month, year)?;
            let last = *schedule.entries.last().map(|e| &e.date).unwrap_or(&first);

            let mut pending = db::list_swaps(pool, Some(SwapStatus::Pending)).await?;
            pending.extend(db::list_swaps(pool, Some(SwapStatus::Accepted)).await?);
            pending.retain(|swap| {
                (swap.original_date.month(), swap.original_date.year()) == (month, year)
            });

            let mut leave = db::list_vacations(pool, None, None).await?;
            leave.retain(|v| {
                v.status != VacationStatus::Rejected && vacations::overlaps(v, first, last)
            });

            let report = report::build_report(&schedule, &pending, &leave);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn run_user_command(pool: &PgPool, command: UserCommand) -> anyhow::Result<()> {
    match command {
        UserCommand::Add {
            name,
            password,
            role,
            actor,
        } => {
            let bootstrap = db::list_users(pool).await?.is_empty();
            let actor_name = match (&actor, bootstrap) {
                (Some(actor), _) => actor.clone(),
                (None, true) => name.clone(),
                (None, false) => bail!("--as is required once accounts exist"),
            };
            let role = users::role_for_new_account(bootstrap, role)?;
            let details = json!({ "op": "add", "name": name, "role": role.as_str() });
            let outcome = async {
                if let Some(actor) = &actor {
                    let actor = acting_user(pool, actor).await?;
                    users::ensure_can_manage(&actor, role, role)?;
                } else {
                    warn!("Creating first account {} without an acting user", name);
                }
                db::create_user(pool, &name, &password, role).await
            };
            let user = audited(pool, &actor_name, AuditAction::UserChange, details, outcome).await?;
            println!("Created {} ({}).", user.name, user.role);
        }
        UserCommand::List => {
            for user in db::list_users(pool).await? {
                println!("{:<24} {:<14} {}", user.name, user.role, user.status);
            }
        }
        UserCommand::SetStatus {
            name,
            status,
            actor,
        } => {
            let details = json!({ "op": "set_status", "name": name, "status": status.as_str() });
            let outcome = async {
                let manager = acting_user(pool, &actor).await?;
                let user = db::require_user(pool, &name).await?;
                users::ensure_can_manage(&manager, user.role, user.role)?;
                db::update_user(pool, &user.name, user.role, status).await
            };
            audited(pool, &actor, AuditAction::UserChange, details, outcome).await?;
            println!("{name} is now {status}.");
        }
        UserCommand::SetRole { name, role, actor } => {
            let details = json!({ "op": "set_role", "name": name, "role": role.as_str() });
            let outcome = async {
                let manager = acting_user(pool, &actor).await?;
                let user = db::require_user(pool, &name).await?;
                users::ensure_can_manage(&manager, user.role, role)?;
                db::update_user(pool, &user.name, role, user.status).await
            };
            audited(pool, &actor, AuditAction::UserChange, details, outcome).await?;
            println!("{name} is now {role}.");
        }
    }
    Ok(())
}

async fn run_swap_command(pool: &PgPool, command: SwapCommand) -> anyhow::Result<()> {
    match command {
        SwapCommand::Request {
            actor,
            date,
            shift,
            target,
            target_date,
            target_shift,
            reason,
        } => {
            let details = json!({
                "date": date, "shift": shift.as_str(), "target": target,
                "target_date": target_date, "target_shift": target_shift.as_str(),
            });
            let outcome = async {
                let requester = acting_user(pool, &actor).await?;
                let target_user = acting_user(pool, &target).await?;
                let original = (parse_cli_date(&date)?, shift);
                let wanted = (parse_cli_date(&target_date)?, target_shift);
                db::create_swap(pool, &requester.name, &target_user.name, original, wanted, reason)
                    .await
            };
            let request = audited(pool, &actor, AuditAction::SwapRequest, details, outcome).await?;
            println!("Swap request {} sent to {}.", request.id, request.target_name);
        }
        SwapCommand::Respond {
            id,
            actor,
            decline,
        } => {
            let details = json!({ "id": id, "accept": !decline });
            let outcome = async {
                let responder = acting_user(pool, &actor).await?;
                db::respond_to_swap(pool, id, &responder.name, !decline).await
            };
            let request = audited(pool, &actor, AuditAction::SwapResponse, details, outcome).await?;
            println!("Swap request {} is now {}.", request.id, request.status);
        }
        SwapCommand::Review {
            id,
            actor,
            reject,
            reason,
        } => {
            let details = json!({ "id": id, "approve": !reject, "reason": reason });
            let outcome = async {
                let approver = acting_admin(pool, &actor).await?;
                db::review_swap(pool, id, &approver, !reject, reason.clone()).await
            };
            let request = audited(pool, &actor, AuditAction::SwapReview, details, outcome).await?;
            println!("Swap request {} is now {}.", request.id, request.status);
        }
        SwapCommand::List { status } => {
            let requests = db::list_swaps(pool, status).await?;
            if requests.is_empty() {
                println!("No swap requests.");
            }
            for request in requests {
                println!(
                    "{} [{}] {} {} {} <-> {} {} {}",
                    request.id,
                    request.status,
                    request.requester_name,
                    dates::format_date(request.original_date),
                    request.original_shift.posto_label(),
                    request.target_name,
                    dates::format_date(request.target_date),
                    request.target_shift.posto_label()
                );
            }
        }
    }
    Ok(())
}

async fn run_vacation_command(pool: &PgPool, command: VacationCommand) -> anyhow::Result<()> {
    match command {
        VacationCommand::Request {
            actor,
            start,
            end,
            reason,
        } => {
            let details = json!({ "start": start, "end": end });
            let outcome = async {
                let operator = acting_user(pool, &actor).await?;
                let start = parse_cli_date(&start)?;
                let end = parse_cli_date(&end)?;
                db::create_vacation(pool, &operator.name, start, end, reason).await
            };
            let request =
                audited(pool, &actor, AuditAction::VacationRequest, details, outcome).await?;
            println!(
                "Vacation request {} submitted ({} days).",
                request.id, request.total_days
            );
        }
        VacationCommand::Review {
            id,
            actor,
            reject,
            reason,
        } => {
            let details = json!({ "id": id, "approve": !reject, "reason": reason });
            let outcome = async {
                let approver = acting_admin(pool, &actor).await?;
                db::review_vacation(pool, id, &approver, !reject, reason.clone()).await
            };
            let request =
                audited(pool, &actor, AuditAction::VacationReview, details, outcome).await?;
            println!("Vacation request {} is now {}.", request.id, request.status);
        }
        VacationCommand::List { status, operator } => {
            let requests = db::list_vacations(pool, status, operator.as_deref()).await?;
            if requests.is_empty() {
                println!("No vacation requests.");
            }
            for request in requests {
                println!(
                    "{} [{}] {} {} to {} ({} days)",
                    request.id,
                    request.status,
                    request.operator_name,
                    dates::format_date(request.start_date),
                    dates::format_date(request.end_date),
                    request.total_days
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_dates_require_month_and_year() {
        assert_eq!(
            parse_cli_date("05/03/2025").unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
        );
        assert!(parse_cli_date("2025-03-05").is_ok());
        assert!(parse_cli_date("5").is_err());
    }

    #[test]
    fn parses_swap_request() {
        let cli = Cli::try_parse_from([
            "escalas",
            "swap",
            "request",
            "--as",
            "Ana Souza",
            "--date",
            "03/03/2025",
            "--shift",
            "meio_periodo",
            "--target",
            "Bruno Lima",
            "--target-date",
            "04/03/2025",
            "--target-shift",
            "fechamento",
        ])
        .unwrap();
        match cli.command {
            Commands::Swap {
                command: SwapCommand::Request { shift, target_shift, .. },
            } => {
                assert_eq!(shift, Shift::MeioPeriodo);
                assert_eq!(target_shift, Shift::Fechamento);
            }
            _ => panic!("expected swap request"),
        }
    }

    #[test]
    fn user_add_leaves_the_role_to_the_bootstrap_rule() {
        let cli = Cli::try_parse_from([
            "escalas", "user", "add", "--name", "Marina Costa", "--password", "x",
        ])
        .unwrap();
        match cli.command {
            Commands::User {
                command: UserCommand::Add { role, actor, .. },
            } => {
                assert_eq!(role, None);
                assert_eq!(actor, None);
                assert_eq!(users::role_for_new_account(true, role), Ok(Role::SuperAdmin));
            }
            _ => panic!("expected user add"),
        }
    }

    #[test]
    fn templates_are_written_without_a_database() {
        let out = std::env::temp_dir().join(format!("escalas-{}.csv", Uuid::new_v4()));
        write_template(2, 2025, &out).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        std::fs::remove_file(&out).unwrap();
        assert!(text.contains("28/02/2025"));
        assert!(write_template(2, 10000, &out).is_err());
        assert!(!out.exists());
    }
}
