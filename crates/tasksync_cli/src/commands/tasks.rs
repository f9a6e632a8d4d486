//! Local task commands.

use super::{local_context, CmdResult};
use chrono::Utc;
use std::path::Path;
use tasksync_engine::MutationRecorder;
use tasksync_protocol::TaskRecord;

/// Runs the add command.
pub fn add(store: &Path, title: String, urgent: bool, important: bool) -> CmdResult<TaskRecord> {
    let ctx = local_context(store)?;
    let mut task = TaskRecord::new(uuid::Uuid::new_v4().to_string(), title, Utc::now());
    task.urgent = urgent;
    task.important = important;

    let task = MutationRecorder::new(&ctx).create(task)?;
    println!("Created {} \"{}\"", task.id, task.title);
    Ok(task)
}

/// Runs the edit command.
pub fn edit(store: &Path, id: &str, title: Option<String>, done: bool) -> CmdResult<TaskRecord> {
    let ctx = local_context(store)?;
    let mut task = ctx
        .store()
        .get_task(id)?
        .ok_or_else(|| format!("no task with id {id}"))?;
    if let Some(title) = title {
        task.title = title;
    }
    if done {
        task.completed = true;
    }
    task.updated_at = Utc::now();

    let task = MutationRecorder::new(&ctx).update(task)?;
    println!("Updated {} \"{}\"", task.id, task.title);
    Ok(task)
}

/// Runs the delete command.
pub fn delete(store: &Path, id: &str) -> CmdResult<bool> {
    let ctx = local_context(store)?;
    let existed = MutationRecorder::new(&ctx).delete(id)?;
    if existed {
        println!("Deleted {id}");
    } else {
        println!("No local task {id}");
    }
    Ok(existed)
}

/// Runs the list command.
pub fn list(store: &Path, format: &str) -> CmdResult {
    let ctx = local_context(store)?;
    let mut tasks = ctx.store().all_tasks()?;
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&tasks)?),
        _ => {
            for task in &tasks {
                let mark = if task.completed { "x" } else { " " };
                println!("[{mark}] {}  {}", task.id, task.title);
            }
            println!("{} task(s)", tasks.len());
        }
    }
    Ok(())
}
