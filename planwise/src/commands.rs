//! One function per subcommand. Store errors are already recorded in the
//! store's error slot; here they only gain context for the terminal.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use planwise_core::stores::{SortKey, SortOrder};
use planwise_core::{AppContext, Config, Credentials, NewTask, Priority, Session, TaskStatus};

use crate::output::{self, print_json};

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub async fn login(app: &AppContext, email: &str, password: &str) -> Result<()> {
    app.credentials()
        .login(&Credentials::new(email, password))
        .await
        .context("sign-in failed")?;

    match app.credentials().user() {
        Some(user) => println!("Signed in as {} <{}>", user.name, user.email),
        None => println!("Signed in as {}", email),
    }
    Ok(())
}

pub async fn logout(app: &AppContext) -> Result<()> {
    app.credentials().logout().await;
    println!("Signed out");
    Ok(())
}

pub fn status(app: &AppContext, session: &Session, json: bool) -> Result<()> {
    if json {
        return print_json(session);
    }

    println!("planwise status");
    println!("===============");
    println!();
    match (&session.user, session.is_authenticated) {
        (Some(user), true) => println!("Session:   signed in as {} <{}>", user.name, user.email),
        (None, true) => println!("Session:   signed in"),
        _ => println!("Session:   Not signed in"),
    }
    println!("API:       {}", app.config().api.base_url);
    println!("Config:    {}", Config::config_path().display());
    println!("Cache:     {}", app.config().cache_dir().display());
    println!("Log:       {}", planwise_core::logging::log_file_path().display());
    Ok(())
}

/// Filter flags of `tasks list`; unset fields keep the saved filters
pub struct TaskFilters {
    pub search: Option<String>,
    pub statuses: Vec<TaskStatus>,
    pub sort: Option<(SortKey, SortOrder)>,
    pub reset: bool,
}

pub async fn list_tasks(
    app: &AppContext,
    filters: TaskFilters,
    page: u32,
    project: Option<&str>,
    json: bool,
) -> Result<()> {
    let tasks = app.tasks();
    if filters.reset {
        tasks.reset_filters();
    }
    if let Some(query) = filters.search {
        tasks.set_search_query(query);
    }
    if !filters.statuses.is_empty() {
        tasks.set_status_filter(filters.statuses);
    }
    if let Some((key, order)) = filters.sort {
        tasks.set_sort(key, order);
    }

    let loaded = match project {
        Some(project_id) => tasks.fetch_for_project(project_id, page, app.page_size()).await,
        None => tasks.fetch_all(page, app.page_size()).await,
    };
    loaded.context("failed to load tasks")?;

    let view = tasks.view();
    if json {
        return print_json(&view);
    }

    let today = today();
    for task in &view {
        println!("{}", output::task_line(task, today));
    }

    let page_info = tasks.page_info();
    let hidden = tasks.len() - view.len();
    println!();
    println!(
        "{} shown, {} filtered out (page {} of {})",
        view.len(),
        hidden,
        page_info.current_page,
        page_info.total_pages.max(1)
    );
    if page_info.has_more() {
        println!("More with --page {}", page_info.current_page + 1);
    }
    Ok(())
}

pub async fn add_task(
    app: &AppContext,
    title: &str,
    priority: Priority,
    due: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let mut draft = NewTask::new(title).with_priority(priority);
    if let Some(due) = due {
        draft = draft.with_due_date(due);
    }

    let task = app.tasks().create(&draft).await.context("failed to create task")?;
    if json {
        return print_json(&task);
    }
    println!("Created {}", output::task_line(&task, today()));
    Ok(())
}

pub async fn set_task_done(app: &AppContext, id: &str, done: bool, json: bool) -> Result<()> {
    let tasks = app.tasks();
    // Transitions need the task locally
    tasks.fetch_one(id).await.with_context(|| format!("failed to load task {}", id))?;

    let task = if done {
        tasks.complete(id).await
    } else {
        tasks.uncomplete(id).await
    }
    .with_context(|| format!("failed to update task {}", id))?;

    if json {
        return print_json(&task);
    }
    println!("{}", output::task_line(&task, today()));
    Ok(())
}

pub async fn remove_task(app: &AppContext, id: &str) -> Result<()> {
    let tasks = app.tasks();
    let task = tasks
        .fetch_one(id)
        .await
        .with_context(|| format!("failed to load task {}", id))?;
    tasks
        .remove(id)
        .await
        .with_context(|| format!("failed to delete task {}", id))?;
    println!("Deleted {}", task.title);
    Ok(())
}

pub async fn list_goals(app: &AppContext, json: bool) -> Result<()> {
    let goals = app
        .goals()
        .fetch_all(1, app.page_size())
        .await
        .context("failed to load goals")?;
    if json {
        return print_json(&goals);
    }
    for goal in &goals {
        println!("{}", output::goal_line(goal));
    }
    Ok(())
}

pub async fn set_goal_progress(app: &AppContext, id: &str, progress: u8, json: bool) -> Result<()> {
    let goals = app.goals();
    goals.fetch_one(id).await.with_context(|| format!("failed to load goal {}", id))?;
    let goal = goals
        .set_progress(id, progress)
        .await
        .with_context(|| format!("failed to update goal {}", id))?;
    if json {
        return print_json(&goal);
    }
    println!("{}", output::goal_line(&goal));
    Ok(())
}

pub async fn complete_milestone(
    app: &AppContext,
    goal_id: &str,
    milestone_id: &str,
    json: bool,
) -> Result<()> {
    let goals = app.goals();
    goals
        .fetch_one(goal_id)
        .await
        .with_context(|| format!("failed to load goal {}", goal_id))?;
    goals
        .complete_milestone(goal_id, milestone_id)
        .await
        .with_context(|| format!("failed to complete milestone {}", milestone_id))?;

    let goal = goals
        .get(goal_id)
        .with_context(|| format!("goal {} disappeared", goal_id))?;
    if json {
        return print_json(&goal);
    }
    println!("{}", output::goal_line(&goal));
    Ok(())
}

pub async fn list_projects(app: &AppContext, all: bool, json: bool) -> Result<()> {
    let projects = app.projects();
    projects
        .fetch_all(1, app.page_size())
        .await
        .context("failed to load projects")?;
    let view = if all { projects.view() } else { projects.active() };

    if json {
        return print_json(&view);
    }
    let now = Utc::now();
    for project in &view {
        println!("{}", output::project_line(project, now));
    }
    Ok(())
}

pub async fn dashboard(app: &AppContext, json: bool) -> Result<()> {
    let limit = app.page_size().max(100);
    app.tasks().fetch_all(1, limit).await.context("failed to load tasks")?;
    app.goals().fetch_all(1, limit).await.context("failed to load goals")?;

    let summary = app.dashboard(today());
    if json {
        return print_json(&summary);
    }

    println!("Tasks:     {} total, {}% complete", summary.total_tasks, summary.completion_percent());
    println!(
        "           {} todo, {} in progress, {} done",
        summary.todo, summary.in_progress, summary.done
    );
    println!("Due today: {}", summary.due_today);
    println!("Overdue:   {}", summary.overdue);
    println!(
        "Goals:     {} active, {}",
        summary.active_goals,
        output::progress_bar(summary.average_goal_progress)
    );
    let history: Vec<String> = summary
        .daily_completions
        .iter()
        .map(|count| count.to_string())
        .collect();
    println!("Last 7d:   {} (streak {}d)", history.join(" "), summary.current_streak);
    Ok(())
}
