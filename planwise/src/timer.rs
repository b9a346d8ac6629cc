//! Foreground countdown for `planwise timer`
//!
//! The countdown itself runs in the timer store; this module only draws it
//! and waits for the completion event or Ctrl-C.

use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use planwise_core::stores::{TimerEvent, TimerStore};
use planwise_core::{AppContext, NewTimer, Timer};
use tokio::sync::broadcast::error::RecvError;

use crate::output::{self, print_json};

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

pub async fn list(app: &AppContext, json: bool) -> Result<()> {
    let timers = app.timers();
    if let Err(e) = timers.pull_remote().await {
        eprintln!("Showing local timers only: {}", e);
    }
    let all = timers.timers();
    if json {
        return print_json(&all);
    }
    if all.is_empty() {
        println!("No timers");
    }
    for timer in &all {
        println!("{}", output::timer_line(timer));
    }
    Ok(())
}

pub async fn run(app: &AppContext, title: &str, minutes: u32, task_id: Option<String>) -> Result<()> {
    let timers = app.timers();
    let draft = NewTimer {
        title: title.to_string(),
        duration_minutes: minutes,
        task_id,
    };
    let timer = timers.create(&draft).context("failed to create timer")?;
    timers.start(&timer.id).context("failed to start timer")?;
    watch(timers, timer).await
}

pub async fn resume(app: &AppContext, id: &str) -> Result<()> {
    let timers = app.timers();
    let timer = timers
        .resume(id)
        .with_context(|| format!("failed to resume timer {}", id))?;
    watch(timers, timer).await
}

pub async fn reset(app: &AppContext, id: &str) -> Result<()> {
    let timers = app.timers();
    let timer = timers
        .reset(id)
        .with_context(|| format!("failed to reset timer {}", id))?;
    finish(timers).await;
    println!("{}", output::timer_line(&timer));
    Ok(())
}

async fn watch(timers: &TimerStore, timer: Timer) -> Result<()> {
    let mut events = timers.subscribe();
    let total = u64::from(timer.duration_secs());

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")?
            .progress_chars("#>-"),
    );
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

    let completed = loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(TimerEvent::Completed { .. }) => break true,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Timer events lagged");
                }
                Err(RecvError::Closed) => break false,
            },
            _ = tokio::signal::ctrl_c() => break false,
            _ = redraw.tick() => {
                if let Some(active) = timers.active() {
                    pb.set_position(total.saturating_sub(u64::from(active.remaining_time)));
                    pb.set_message(format!("{} {}", active.remaining_display(), active.title));
                } else if !timers.is_ticking() {
                    break matches!(events.try_recv(), Ok(TimerEvent::Completed { .. }));
                }
            }
        }
    };
    pb.finish_and_clear();

    if completed {
        println!("{} finished", timer.title);
    } else if let Some(active) = timers.active() {
        let paused = timers.pause(&active.id).context("failed to pause timer")?;
        println!(
            "Paused {} at {}; continue with `planwise timer resume {}`",
            paused.title,
            paused.remaining_display(),
            paused.id
        );
    }

    finish(timers).await;
    Ok(())
}

/// Wait for background syncs and report any that failed
async fn finish(timers: &TimerStore) {
    timers.settle().await;
    if let Some(error) = timers.error() {
        eprintln!("{} ({}); the timer is kept locally", error.notice, error.message);
    }
}
