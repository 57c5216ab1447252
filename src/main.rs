use clap::{Parser, Subcommand};
use daybook_lib::models::{NewUser, User};
use daybook_lib::{init_tracing, to_client_error, AppConfig, AppContext, AppError, AppResult};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Tasks, projects, tags and journal in one local store")]
#[command(version)]
struct Cli {
    /// YAML config file; environment variables override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and its schema
    Init,
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Print task, project, journal, tag and account statistics
    Stats {
        #[arg(long)]
        email: String,
    },
    /// Turn actionable e-mails into tasks
    ImportEmail {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 10)]
        max: usize,
        /// Project to file the new tasks under
        #[arg(long)]
        project: Option<String>,
    },
    /// Show the tasks an e-mail import would create, without saving them
    PreviewEmail {
        #[arg(long, default_value_t = 10)]
        max: usize,
    },
    /// Print insights, task suggestions and journal prompts
    Insights {
        #[arg(long)]
        email: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{}", render(&output));
            ExitCode::SUCCESS
        }
        Err(error) => {
            let body = to_client_error(error);
            eprintln!("{}", render(&json!(body)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> AppResult<Value> {
    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config.log_dir, &config.log_level)?;
    let ctx = AppContext::from_config(config)?;

    match cli.command {
        Command::Init => Ok(json!({
            "database": ctx.db.path().display().to_string(),
            "mail_ready": ctx.mail.is_ready(),
            "insights_ready": ctx.insights.is_ready(),
        })),
        Command::Register { name, email, password } => {
            let user = ctx.db.create_user(NewUser {
                name,
                email,
                password,
                settings: None,
            })?;
            Ok(serde_json::to_value(user)?)
        }
        Command::Stats { email } => {
            let user = require_user(&ctx, &email)?;
            Ok(json!({
                "tasks": ctx.db.task_stats(&user.id),
                "projects": ctx.db.project_stats(&user.id),
                "journal": ctx.db.journal_stats(&user.id),
                "tags": ctx.db.tag_stats(&user.id),
                "user": ctx.db.user_stats(&user.id),
            }))
        }
        Command::ImportEmail { email, max, project } => {
            let user = require_user(&ctx, &email)?;
            let import = ctx.import_email_tasks(&user.id, max, project.as_deref())?;
            Ok(serde_json::to_value(import)?)
        }
        Command::PreviewEmail { max } => Ok(serde_json::to_value(ctx.preview_email_tasks(max))?),
        Command::Insights { email } => {
            let user = require_user(&ctx, &email)?;
            Ok(serde_json::to_value(ctx.insight_report(&user.id)?)?)
        }
    }
}

fn require_user(ctx: &AppContext, email: &str) -> AppResult<User> {
    ctx.db
        .find_user_by_email(email)?
        .ok_or_else(|| AppError::not_found("User", "access"))
}

fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
