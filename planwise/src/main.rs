//! planwise - command-line client for the planwise productivity backend
//!
//! Signs in, lists and edits tasks, goals and projects, shows the dashboard
//! and runs countdown timers in the terminal.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Credentials and cache: $XDG_DATA_HOME/planwise/ (~/.local/share/planwise/)
//! - Logs: $XDG_STATE_HOME/planwise/planwise.YYYY-MM-DD.log (~/.local/state/planwise/)
//! - Config: $XDG_CONFIG_HOME/planwise/config.toml (~/.config/planwise/config.toml)

mod commands;
mod output;
mod timer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use planwise_core::stores::{SortKey, SortOrder};
use planwise_core::{AppContext, Config, Priority, TaskStatus};

#[derive(Parser)]
#[command(name = "planwise")]
#[command(about = "Manage tasks, goals and focus timers from the terminal")]
#[command(version)]
struct Args {
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "PLANWISE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the session, backend URL and local paths
    Status,

    /// Task commands
    #[command(subcommand)]
    Tasks(TaskCommand),

    /// Goal commands
    #[command(subcommand)]
    Goals(GoalCommand),

    /// List projects
    Projects {
        /// Include completed and archived projects
        #[arg(short, long)]
        all: bool,
    },

    /// Summary of tasks and goals
    Dashboard,

    /// Countdown timers
    #[command(subcommand)]
    Timer(TimerCommand),
}

#[derive(Subcommand)]
enum TaskCommand {
    /// List tasks through the saved filters
    List {
        /// Case-insensitive text search over title and description
        #[arg(short, long)]
        search: Option<String>,

        /// Only these statuses (repeatable)
        #[arg(long, value_enum)]
        status: Vec<StatusArg>,

        #[arg(long, value_enum)]
        sort: Option<SortArg>,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Forget saved filters before listing
        #[arg(long)]
        reset: bool,

        #[arg(long, default_value = "1")]
        page: u32,

        /// Only tasks of this project
        #[arg(long)]
        project: Option<String>,
    },

    /// Create a task
    Add {
        title: String,

        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        /// Due date, YYYY-MM-DD
        #[arg(short, long)]
        due: Option<chrono::NaiveDate>,
    },

    /// Mark a task done
    Done { id: String },

    /// Reopen a done task
    Undo { id: String },

    /// Delete a task
    Rm { id: String },
}

#[derive(Subcommand)]
enum GoalCommand {
    /// List goals with progress
    List,

    /// Set progress directly (0-100)
    Progress { id: String, progress: u8 },

    /// Mark a milestone done
    Milestone { goal_id: String, milestone_id: String },
}

#[derive(Subcommand)]
enum TimerCommand {
    /// List timers
    List,

    /// Run a countdown in the foreground; Ctrl-C pauses it
    Run {
        /// Length in minutes
        minutes: u32,

        #[arg(short, long, default_value = "Focus")]
        title: String,

        /// Task this session belongs to
        #[arg(long)]
        task: Option<String>,
    },

    /// Continue a paused timer in the foreground
    Resume { id: String },

    /// Put a timer back to its full duration
    Reset { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Todo,
    InProgress,
    Done,
    Archived,
}

impl From<StatusArg> for TaskStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Todo => TaskStatus::Todo,
            StatusArg::InProgress => TaskStatus::InProgress,
            StatusArg::Done => TaskStatus::Done,
            StatusArg::Archived => TaskStatus::Archived,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Order,
    Title,
    Priority,
    Due,
    Created,
    Updated,
    Status,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Order => SortKey::Order,
            SortArg::Title => SortKey::Title,
            SortArg::Priority => SortKey::Priority,
            SortArg::Due => SortKey::DueDate,
            SortArg::Created => SortKey::CreatedAt,
            SortArg::Updated => SortKey::UpdatedAt,
            SortArg::Status => SortKey::Status,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        planwise_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("planwise starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(run(config, args));

    tracing::info!(ok = result.is_ok(), "planwise exiting");
    result
}

async fn run(config: Config, args: Args) -> Result<()> {
    let app = AppContext::from_config(config).context("failed to set up client")?;
    let session = app.initialize().await;
    let json = args.json;

    match args.command {
        Command::Login { email, password } => commands::login(&app, &email, &password).await,
        Command::Logout => commands::logout(&app).await,
        Command::Status => commands::status(&app, &session, json),
        command => {
            if !session.is_authenticated {
                anyhow::bail!("not signed in; run `planwise login --email <EMAIL>` first");
            }
            match command {
                Command::Tasks(TaskCommand::List {
                    search,
                    status,
                    sort,
                    desc,
                    reset,
                    page,
                    project,
                }) => {
                    let filters = commands::TaskFilters {
                        search,
                        statuses: status.into_iter().map(TaskStatus::from).collect(),
                        sort: sort.map(|key| {
                            let order = if desc { SortOrder::Desc } else { SortOrder::Asc };
                            (SortKey::from(key), order)
                        }),
                        reset,
                    };
                    commands::list_tasks(&app, filters, page, project.as_deref(), json).await
                }
                Command::Tasks(TaskCommand::Add {
                    title,
                    priority,
                    due,
                }) => commands::add_task(&app, &title, priority, due, json).await,
                Command::Tasks(TaskCommand::Done { id }) => {
                    commands::set_task_done(&app, &id, true, json).await
                }
                Command::Tasks(TaskCommand::Undo { id }) => {
                    commands::set_task_done(&app, &id, false, json).await
                }
                Command::Tasks(TaskCommand::Rm { id }) => commands::remove_task(&app, &id).await,
                Command::Goals(GoalCommand::List) => commands::list_goals(&app, json).await,
                Command::Goals(GoalCommand::Progress { id, progress }) => {
                    commands::set_goal_progress(&app, &id, progress, json).await
                }
                Command::Goals(GoalCommand::Milestone {
                    goal_id,
                    milestone_id,
                }) => commands::complete_milestone(&app, &goal_id, &milestone_id, json).await,
                Command::Projects { all } => commands::list_projects(&app, all, json).await,
                Command::Dashboard => commands::dashboard(&app, json).await,
                Command::Timer(TimerCommand::List) => timer::list(&app, json).await,
                Command::Timer(TimerCommand::Run {
                    minutes,
                    title,
                    task,
                }) => timer::run(&app, &title, minutes, task).await,
                Command::Timer(TimerCommand::Resume { id }) => timer::resume(&app, &id).await,
                Command::Timer(TimerCommand::Reset { id }) => timer::reset(&app, &id).await,
                Command::Login { .. } | Command::Logout | Command::Status => Ok(()),
            }
        }
    }
}
