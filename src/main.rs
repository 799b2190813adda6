//! mailbrief command-line interface.

use std::error::Error;
use std::io::BufRead;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use mailbrief::config::Config;
use mailbrief::engine::{run_daily_analysis, run_rescan_days};
use mailbrief::llm_client::{call_llm_json, LlmTransport, OpenAiClient};
use mailbrief::mailbox::GmailClient;
use mailbrief::prompts::build_instructions_update_messages;
use mailbrief::reconcile::{apply_task_operations, sort_tasks_for_display};
use mailbrief::report::{render_daily_summary, write_daily_summary, write_rescan_summary};
use mailbrief::senders::sort_senders_for_display;
use mailbrief::storage;
use mailbrief::types::{
    SenderImportance, SenderProfile, SenderRole, Task, TaskOperation, TaskSource, TaskStatus,
};

#[derive(Parser)]
#[command(name = "mailbrief", version, about = "LLM-assisted email triage and task manager")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily analysis and write the digest.
    RunDaily {
        /// Afterwards, collect feedback and refine instructions.txt via the LLM.
        #[arg(long)]
        instruct: bool,
    },
    /// Re-run analysis over the past N days, without advancing the run watermark.
    RescanDays {
        #[arg(long, default_value_t = 3)]
        days: u32,
    },
    /// Show current tasks.
    ShowTasks,
    /// Add a manual task.
    AddTask {
        description: String,
        /// Priority 1-10, higher is more urgent.
        #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=10))]
        priority: u8,
        /// Due date, YYYY-MM-DD.
        #[arg(long)]
        due: Option<String>,
        /// Task source: manual, email, or other.
        #[arg(long, default_value = "manual", value_parser = ["manual", "email", "other"])]
        source: String,
    },
    /// Mark a task as done.
    CompleteTask { id: String },
    /// List known senders with importance and pinned status.
    ListSenders,
    /// Create or update a sender profile.
    SetSender {
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = ["high", "normal", "low"])]
        importance: Option<String>,
        #[arg(long, value_parser = ["student", "collaborator", "admin", "family", "notification", "other"])]
        role: Option<String>,
        /// Mark this sender as a VIP.
        #[arg(long)]
        pin: bool,
        #[arg(long, conflicts_with = "pin")]
        unpin: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();
    storage::ensure_data_files(&config)?;

    match cli.command {
        Command::RunDaily { instruct } => cmd_run_daily(&config, instruct).await,
        Command::RescanDays { days } => cmd_rescan_days(&config, days).await,
        Command::ShowTasks => cmd_show_tasks(&config),
        Command::AddTask {
            description,
            priority,
            due,
            source,
        } => cmd_add_task(&config, description, priority, due, &source),
        Command::CompleteTask { id } => cmd_complete_task(&config, &id),
        Command::ListSenders => cmd_list_senders(&config),
        Command::SetSender {
            email,
            name,
            importance,
            role,
            pin,
            unpin,
        } => cmd_set_sender(&config, email, name, importance, role, pin, unpin),
    }
}

// ============================================================================
// Analysis commands
// ============================================================================

async fn cmd_run_daily(config: &Config, instruct: bool) -> Result<(), Box<dyn Error>> {
    let mailbox = GmailClient::connect(config).await?;
    let llm = OpenAiClient::from_config(config)?;

    let summary = run_daily_analysis(config, &mailbox, &llm, None, true).await?;
    let text = render_daily_summary(&summary);
    let path = write_daily_summary(config, &text)?;

    println!("{}", text);
    log::info!("Daily summary written to {}", path.display());

    if instruct {
        interactive_instructions_update(config, &llm).await?;
    }
    Ok(())
}

async fn cmd_rescan_days(config: &Config, days: u32) -> Result<(), Box<dyn Error>> {
    let mailbox = GmailClient::connect(config).await?;
    let llm = OpenAiClient::from_config(config)?;

    let summaries = run_rescan_days(config, &mailbox, &llm, days).await?;
    if summaries.is_empty() {
        println!("No mail found in the last {} days.", days);
        return Ok(());
    }

    for summary in &summaries {
        let text = render_daily_summary(summary);
        let path = write_rescan_summary(config, summary.summary_date, &text)?;
        println!("{}", text);
        log::info!("Rescan summary written to {}", path.display());
    }
    Ok(())
}

/// Collect free-form feedback on the run, then let the model rewrite
/// instructions.txt. Invalid model output leaves the file unchanged.
async fn interactive_instructions_update(
    config: &Config,
    llm: &dyn LlmTransport,
) -> Result<(), Box<dyn Error>> {
    let current = storage::load_instructions(config)?;

    println!();
    println!("=== Instructions refinement ===");
    println!("Describe what the run got wrong or right (mis-prioritized emails,");
    println!("missing or unnecessary tasks, what 'important' means to you, ...).");
    println!("Finish with an empty line.");
    println!("-------------------------------");

    let stdin = std::io::stdin();
    let mut lines: Vec<String> = Vec::new();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() && !lines.is_empty() {
            break;
        }
        lines.push(line);
    }

    let feedback = lines.join("\n").trim().to_string();
    if feedback.is_empty() {
        println!("No feedback provided; leaving instructions unchanged.");
        return Ok(());
    }

    let messages = build_instructions_update_messages(&current, &feedback);
    let reply = match call_llm_json(llm, &messages, 1200, 0.3, config.llm_repair).await {
        Ok(reply) => reply,
        Err(e) => {
            println!("Failed to update instructions via LLM: {}", e);
            return Ok(());
        }
    };

    match instructions_from_reply(&reply) {
        Some(text) => {
            storage::save_instructions(config, text)?;
            println!("Instructions updated; review them in {}", config.instructions_path.display());
        }
        None => println!("LLM returned invalid instructions; leaving file unchanged."),
    }
    Ok(())
}

/// The refinement reply must carry a non-empty "instructions" string;
/// anything else leaves the file alone.
fn instructions_from_reply(reply: &serde_json::Map<String, serde_json::Value>) -> Option<&str> {
    reply
        .get("instructions")
        .and_then(|v| v.as_str())
        .filter(|text| !text.trim().is_empty())
}

// ============================================================================
// Task commands
// ============================================================================

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Open => "open",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Done => "done",
    }
}

fn cmd_show_tasks(config: &Config) -> Result<(), Box<dyn Error>> {
    let mut file = storage::load_tasks(config)?;
    sort_tasks_for_display(&mut file.tasks);

    println!(
        "{:<10}  {:<12}  {:>3}  {:<10}  {}",
        "ID", "STATUS", "PRI", "DUE", "DESCRIPTION"
    );
    for task in &file.tasks {
        let due = task
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        println!(
            "{:<10}  {:<12}  {:>3}  {:<10}  {}",
            task.id,
            status_label(task.status),
            task.priority,
            due,
            task.description
        );
    }
    Ok(())
}

fn cmd_add_task(
    config: &Config,
    description: String,
    priority: u8,
    due: Option<String>,
    source: &str,
) -> Result<(), Box<dyn Error>> {
    let due_date = match due {
        Some(raw) => Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d")?),
        None => None,
    };

    let mut task = Task::new(description);
    task.priority = priority;
    task.due_date = due_date;
    task.source = match source {
        "email" => TaskSource::Email,
        "other" => TaskSource::Other,
        _ => TaskSource::Manual,
    };

    let mut file = storage::load_tasks(config)?;
    apply_task_operations(&mut file, &[TaskOperation::add(task)]);
    storage::save_tasks(config, &file)?;

    match file.tasks.last() {
        Some(added) => println!("Added task {:?}: {}", added.id, added.description),
        None => println!("Task was not added; see the log for the reason."),
    }
    Ok(())
}

fn cmd_complete_task(config: &Config, id: &str) -> Result<(), Box<dyn Error>> {
    let mut file = storage::load_tasks(config)?;
    let known = file.tasks.iter().any(|t| t.id == id);

    apply_task_operations(&mut file, &[TaskOperation::close(id)]);
    storage::save_tasks(config, &file)?;

    if known {
        println!("Marked task {:?} as done.", id);
    } else {
        println!("No task with id {:?}.", id);
    }
    Ok(())
}

// ============================================================================
// Sender commands
// ============================================================================

fn importance_label(importance: SenderImportance) -> &'static str {
    match importance {
        SenderImportance::High => "high",
        SenderImportance::Normal => "normal",
        SenderImportance::Low => "low",
    }
}

fn role_label(role: SenderRole) -> &'static str {
    match role {
        SenderRole::Student => "student",
        SenderRole::Collaborator => "collaborator",
        SenderRole::Admin => "admin",
        SenderRole::Family => "family",
        SenderRole::Notification => "notification",
        SenderRole::Other => "other",
    }
}

fn cmd_list_senders(config: &Config) -> Result<(), Box<dyn Error>> {
    let mut file = storage::load_known_senders(config)?;
    sort_senders_for_display(&mut file.senders);

    println!(
        "{:<32}  {:<20}  {:<10}  {:<14}  {:<6}  {}",
        "EMAIL", "NAME", "IMPORTANCE", "ROLE", "PINNED", "LAST SEEN"
    );
    for sender in &file.senders {
        println!(
            "{:<32}  {:<20}  {:<10}  {:<14}  {:<6}  {}",
            sender.email,
            sender.name.as_deref().unwrap_or(""),
            importance_label(sender.importance),
            role_label(sender.role),
            if sender.pinned { "yes" } else { "no" },
            sender
                .last_seen_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_set_sender(
    config: &Config,
    email: String,
    name: Option<String>,
    importance: Option<String>,
    role: Option<String>,
    pin: bool,
    unpin: bool,
) -> Result<(), Box<dyn Error>> {
    let mut file = storage::load_known_senders(config)?;

    let pos = match file.senders.iter().position(|s| s.email == email) {
        Some(pos) => pos,
        None => {
            file.senders.push(SenderProfile::new(email.clone()));
            file.senders.len() - 1
        }
    };
    let profile = &mut file.senders[pos];

    if let Some(name) = name {
        profile.name = Some(name);
    }
    if let Some(importance) = importance.as_deref() {
        profile.importance = match importance {
            "high" => SenderImportance::High,
            "low" => SenderImportance::Low,
            _ => SenderImportance::Normal,
        };
    }
    if let Some(role) = role.as_deref() {
        profile.role = match role {
            "student" => SenderRole::Student,
            "collaborator" => SenderRole::Collaborator,
            "admin" => SenderRole::Admin,
            "family" => SenderRole::Family,
            "notification" => SenderRole::Notification,
            _ => SenderRole::Other,
        };
    }
    if pin {
        profile.pinned = true;
    }
    if unpin {
        profile.pinned = false;
    }

    println!(
        "Updated sender {:?}: importance={}, role={}, pinned={}",
        email,
        importance_label(profile.importance),
        role_label(profile.role),
        profile.pinned
    );

    storage::save_known_senders(config, &file)?;
    Ok(())
}
