//! Process Tracker Admin CLI
//!
//! Maintenance commands against the configured PostgreSQL database:
//! migrations, department seeding, bulk generation, user setup and cleanup.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use process_tracker::config::AppConfig;
use process_tracker::{
    DepartmentId, PostgresStorage, ProcessFilter, ProcessId, ProcessTypeId, Role, StatusFilter,
    User, UserId, Viewer, WorkflowEngine,
};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "process-tracker-admin")]
#[command(about = "Process Tracker Admin CLI - database setup and maintenance")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// PostgreSQL connection URL; defaults to the configured database
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Insert the default department chain into an empty database
    SeedDepartments,

    /// List departments in workflow order
    ListDepartments,

    /// List processes in list-view order
    ListProcesses {
        /// Only processes past their department deadline
        #[arg(long)]
        overdue: bool,
    },

    /// Generate consecutively numbered processes
    Generate {
        /// First protocol number
        #[arg(long)]
        start: u64,

        /// How many processes to create
        #[arg(long)]
        count: u32,

        /// Process type assigned to every generated process
        #[arg(long)]
        process_type: Option<String>,
    },

    /// Create a user
    CreateUser {
        #[arg(long)]
        email: String,

        #[arg(long)]
        name: String,

        /// Grant the admin role
        #[arg(long)]
        admin: bool,

        /// Department the user works in; repeatable
        #[arg(long = "department")]
        departments: Vec<String>,
    },

    /// Delete a process with its history, assignments and notifications
    DeleteProcess {
        /// Process id (UUID)
        process_id: String,

        /// Confirm the deletion
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = AppConfig::load().context("loading configuration")?;
    let url = match cli.database_url.or_else(|| config.database.url.clone()) {
        Some(url) => url,
        None => bail!("no database configured; pass --database-url or set DATABASE_URL"),
    };

    let storage = PostgresStorage::connect(&url, config.database.max_connections)
        .await
        .context("connecting to PostgreSQL")?;

    if let Commands::Migrate = cli.command {
        storage.migrate().await?;
        info!("✅ Migrations applied");
        return Ok(());
    }

    let engine = WorkflowEngine::new(Arc::new(storage), config.engine_config());

    match cli.command {
        Commands::Migrate => {}

        Commands::SeedDepartments => {
            if engine.seed_default_departments().await? {
                info!("✅ Default departments created");
            } else {
                info!("Departments already configured, nothing to seed");
            }
        }

        Commands::ListDepartments => list_departments(&engine).await?,

        Commands::ListProcesses { overdue } => list_processes(&engine, overdue).await?,

        Commands::Generate {
            start,
            count,
            process_type,
        } => {
            let created = engine
                .generate(start, count, process_type.map(ProcessTypeId::from))
                .await?;
            info!("✅ Generated {} processes starting at {}", created.len(), start);
        }

        Commands::CreateUser {
            email,
            name,
            admin,
            departments,
        } => {
            let mut user = User::new(email.as_str(), email.as_str(), name)
                .in_departments(departments.iter().map(String::as_str));
            if admin {
                user.role = Role::Admin;
            }
            let user = engine.create_user(user).await?;
            info!("✅ Created user {} ({})", user.id, user.role);
        }

        Commands::DeleteProcess {
            process_id,
            confirm,
        } => {
            if !confirm {
                error!("❌ Delete operation requires --confirm flag for safety");
                return Ok(());
            }
            let uuid = Uuid::parse_str(&process_id)
                .with_context(|| format!("'{}' is not a process id", process_id))?;
            engine.delete(&ProcessId(uuid)).await?;
            info!("✅ Deleted process {}", process_id);
        }
    }

    Ok(())
}

async fn list_departments(engine: &WorkflowEngine) -> Result<()> {
    let registry = engine.departments().await?;

    println!("\n📋 Departments ({})", registry.list_ordered().len());
    println!("=====================================");

    for department in registry.list_ordered() {
        let limit = match department.deadline_days() {
            Some(days) => format!("{} business days", days),
            None => "no deadline".to_string(),
        };
        let marker = if department.is_terminal { " (terminal)" } else { "" };
        println!(
            "{:>3}  {:<12} {}{}",
            department.order, department.id, department.name, marker
        );
        println!("     {}", limit);
    }

    if let Err(e) = registry.validate() {
        error!("⚠️  Department chain is misconfigured: {}", e);
    }
    Ok(())
}

async fn list_processes(engine: &WorkflowEngine, overdue: bool) -> Result<()> {
    let viewer = Viewer {
        user_id: UserId::from("admin-cli"),
        role: Role::Admin,
        departments: HashSet::<DepartmentId>::new(),
    };
    let filter = ProcessFilter {
        status: overdue.then_some(StatusFilter::Overdue),
        ..ProcessFilter::default()
    };

    let summaries = engine.query().list(&viewer, &filter).await?;
    let calendar = engine.calendar();

    println!("\n📋 Processes ({})", summaries.len());
    println!("=====================================");

    for summary in summaries {
        let department = summary.department_name.as_deref().unwrap_or("-");
        let deadline = summary
            .deadline
            .as_ref()
            .map(|d| calendar.format_date(d.deadline))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<14} {:<14} due {}",
            summary.process.protocol_number,
            format!("{:?}", summary.display_status),
            department,
            deadline
        );
    }
    Ok(())
}
