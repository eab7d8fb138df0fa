use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use vidqueue::domain::{Job, JobRequest, JobStatus, QueueEvent, Settings, SettingsPatch, clamp_concurrency};
use vidqueue::id::generate_job_id;
use vidqueue::import::{DirectoryWatcher, read_requests};
use vidqueue::remote::GeminiClient;
use vidqueue::scheduler::{QueueEngine, QueueHandle};
use vidqueue::storage::{JsonFileStore, PersistedState};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidqueue")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("vidqueue.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            watch,
            no_start,
            until_idle,
        } => handle_run_command(watch.as_deref(), *no_start, *until_idle, cli.is_verbose(), config).await,
        Commands::Add {
            prompt,
            negative_prompt,
            seed,
            person_generation,
        } => {
            let request = JobRequest {
                prompt: prompt.clone(),
                negative_prompt: negative_prompt.clone(),
                seed: *seed,
                person_generation: person_generation.clone(),
            };
            handle_add_command(request, config)
        }
        Commands::Import { file } => handle_import_command(file, config),
        Commands::List { status } => handle_list_command(status.as_deref(), config),
        Commands::Retry { id } => handle_retry_command(id, config),
        Commands::ClearDone => handle_clear_done_command(config),
        Commands::Pause => handle_pause_command(config),
        Commands::Concurrency { n } => handle_concurrency_command(*n, config),
        Commands::Settings {
            api_key,
            output_dir,
            watch_dir,
            person_generation,
            cost_cap,
        } => {
            let patch = SettingsPatch {
                api_key: api_key.clone(),
                output_dir: output_dir.clone(),
                watch_dir: watch_dir.as_ref().map(PathBuf::from),
                person_generation_default: person_generation.clone(),
                cost_cap_jobs: *cost_cap,
            };
            handle_settings_command(patch, config)
        }
    }
}

fn open_store(config: &Config) -> Result<JsonFileStore> {
    JsonFileStore::new(&config.storage.data_dir)
        .context(format!("Failed to open data dir {}", config.storage.data_dir.display()))
}

async fn handle_run_command(
    watch: Option<&Path>,
    no_start: bool,
    until_idle: bool,
    verbose: bool,
    config: &Config,
) -> Result<()> {
    let store = Arc::new(open_store(config)?);
    let client = Arc::new(GeminiClient::new(config.gemini()).context("Failed to create Gemini client")?);
    let (handle, task) = QueueEngine::spawn(store, client, config.engine());
    let mut events = handle.subscribe();

    let settings = handle.get_settings().await?;
    if let Some(dir) = watch.map(Path::to_path_buf).or(settings.watch_dir.clone()) {
        println!("{} {}", "Watching:".cyan(), dir.display());
        DirectoryWatcher::new(dir, config.watch_interval()).spawn(handle.clone());
    }

    if !no_start {
        let concurrency = handle.start().await?;
        println!("{} concurrency {}", "Queue started:".green(), concurrency);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cost_capped = false;

    loop {
        if until_idle && is_settled(&handle, cost_capped).await? {
            println!("{}", "Queue idle, exiting".cyan());
            break;
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                println!("{}", "Stopping...".yellow());
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if matches!(event, QueueEvent::PausedByCostCap { .. }) {
                        cost_capped = true;
                    }
                    print_event(&event, verbose);
                }
                Err(RecvError::Lagged(n)) => log::warn!("Event stream lagged by {} events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await?;
    task.await.context("Queue engine task failed")?;
    Ok(())
}

/// Nothing is running and nothing will be dispatched without outside action
async fn is_settled(handle: &QueueHandle, cost_capped: bool) -> Result<bool> {
    let snapshot = handle.snapshot().await?;
    Ok(snapshot.running_count == 0 && (snapshot.count(JobStatus::Queued) == 0 || cost_capped))
}

fn print_event(event: &QueueEvent, verbose: bool) {
    match event {
        QueueEvent::QueueChanged(snapshot) => {
            if verbose {
                println!(
                    "{} queued {} | running {}/{} | done {} | error {}",
                    "queue".dimmed(),
                    snapshot.count(JobStatus::Queued),
                    snapshot.running_count,
                    snapshot.concurrency,
                    snapshot.count(JobStatus::Done),
                    snapshot.count(JobStatus::Error),
                );
            }
        }
        QueueEvent::PausedByCostCap { cap } => {
            println!("{} reached {} dispatches this session; run start to continue", "Cost cap:".yellow(), cap);
        }
        QueueEvent::PausedByQuota { reason, resume_at } => {
            println!(
                "{} {} (resuming at {})",
                "Quota:".red(),
                reason,
                resume_at.with_timezone(&chrono::Local).format("%H:%M:%S")
            );
        }
        QueueEvent::CooldownTick { remaining_secs } => {
            if remaining_secs % 30 == 0 || *remaining_secs <= 5 {
                println!("{} {}s remaining", "Cooldown:".yellow(), remaining_secs);
            }
        }
        QueueEvent::CooldownEnded { concurrency } => {
            println!("{} concurrency restored to {}", "Cooldown over:".green(), concurrency);
        }
        QueueEvent::Notification { title, body } => {
            println!("{} {}", format!("{}:", title).green(), body);
        }
    }
}

fn push_job(state: &mut PersistedState, request: JobRequest) -> vidqueue::Result<String> {
    let mut job = Job::from_request(request, &state.settings.person_generation_default)?;
    while state.jobs.iter().any(|j| j.id == job.id) {
        job.id = generate_job_id();
    }
    let id = job.id.clone();
    state.jobs.push(job);
    Ok(id)
}

fn handle_add_command(request: JobRequest, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut state = PersistedState::load(&store);
    let id = push_job(&mut state, request)?;
    state.save_jobs(&store).context("Failed to save queue")?;
    println!("{} {}", "Queued:".green(), id);
    Ok(())
}

fn handle_import_command(file: &Path, config: &Config) -> Result<()> {
    let requests = read_requests(file).context(format!("Failed to read {}", file.display()))?;
    let store = open_store(config)?;
    let mut state = PersistedState::load(&store);

    let mut added = 0;
    for request in requests {
        match push_job(&mut state, request) {
            Ok(_) => added += 1,
            Err(e) => log::debug!("Skipped record from {}: {}", file.display(), e),
        }
    }
    state.save_jobs(&store).context("Failed to save queue")?;
    println!("{} {} jobs from {}", "Imported:".green(), added, file.display());
    Ok(())
}

fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Queued => status.as_str().normal(),
        JobStatus::Running => status.as_str().cyan(),
        JobStatus::Done => status.as_str().green(),
        JobStatus::Error => status.as_str().red(),
    }
}

fn handle_list_command(status: Option<&str>, config: &Config) -> Result<()> {
    let filter = status.map(str::parse::<JobStatus>).transpose().map_err(|e| eyre!(e))?;
    let store = open_store(config)?;
    let state = PersistedState::load(&store);

    let jobs: Vec<&Job> = state
        .jobs
        .iter()
        .filter(|j| filter.is_none_or(|s| j.status == s))
        .collect();
    if jobs.is_empty() {
        println!("{}", "No jobs".dimmed());
        return Ok(());
    }

    for job in jobs {
        let prompt: String = job.prompt.chars().take(50).collect();
        println!(
            "{}  {:<8} {:>3}%  x{}  {}",
            job.id,
            status_label(job.status),
            job.progress,
            job.attempts,
            prompt
        );
        if let Some(error) = &job.error {
            println!("    {}", error.red());
        }
        if let Some(output) = &job.output {
            println!("    {}", output.display().to_string().dimmed());
        }
    }
    Ok(())
}

fn handle_retry_command(id: &str, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut state = PersistedState::load(&store);
    let retried = state
        .jobs
        .iter_mut()
        .find(|j| j.id == id)
        .map(Job::requeue)
        .unwrap_or(false);

    if retried {
        state.save_jobs(&store).context("Failed to save queue")?;
        println!("{} {}", "Requeued:".green(), id);
    } else {
        println!("{} {} is not a failed job", "Skipped:".yellow(), id);
    }
    Ok(())
}

fn handle_clear_done_command(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut state = PersistedState::load(&store);
    let before = state.jobs.len();
    state.jobs.retain(|j| j.status != JobStatus::Done);
    let removed = before - state.jobs.len();

    if removed > 0 {
        state.save_jobs(&store).context("Failed to save queue")?;
    }
    println!("{} {} finished jobs", "Removed:".green(), removed);
    Ok(())
}

fn handle_pause_command(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut state = PersistedState::load(&store);
    if state.settings.quota.active {
        println!("{}", "Quota cooldown active; queue is already paused".yellow());
        return Ok(());
    }
    state.settings.concurrency = 0;
    state.save_settings(&store).context("Failed to save settings")?;
    println!("{}", "Paused".yellow());
    Ok(())
}

fn handle_concurrency_command(n: u32, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut state = PersistedState::load(&store);
    if state.settings.quota.active {
        return Err(eyre!(vidqueue::QueueError::CooldownActive(
            state
                .settings
                .quota
                .next_retry_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default()
        )));
    }
    state.settings.concurrency = clamp_concurrency(n);
    state.save_settings(&store).context("Failed to save settings")?;
    println!("{} {}", "Concurrency:".green(), state.settings.concurrency);
    Ok(())
}

/// Show only the last four characters of a credential
fn mask_api_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("****{}", tail)
}

fn print_settings(settings: &Settings) {
    let api_key = settings
        .api_key
        .as_deref()
        .map(mask_api_key)
        .unwrap_or_else(|| "(unset)".to_string());
    println!("api_key:           {}", api_key);
    println!("output_dir:        {}", settings.output_dir.display());
    println!(
        "watch_dir:         {}",
        settings
            .watch_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(unset)".to_string())
    );
    println!("concurrency:       {}", settings.concurrency);
    println!("person_generation: {}", settings.person_generation_default);
    println!("cost_cap_jobs:     {}", settings.cost_cap_jobs);
    if settings.quota.active {
        println!(
            "quota cooldown:    {} until {}",
            "active".red(),
            settings
                .quota
                .next_retry_at
                .map(|at| at.with_timezone(&chrono::Local).to_rfc3339())
                .unwrap_or_default()
        );
    }
}

fn handle_settings_command(patch: SettingsPatch, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut state = PersistedState::load(&store);

    if !patch.is_empty() {
        state.settings.apply(patch);
        state.save_settings(&store).context("Failed to save settings")?;
        println!("{}", "Settings updated".green());
    }
    print_settings(&state.settings);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging at the configured level
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
