use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use directories::ProjectDirs;
use solver_application::view::plain_report;
use solver_application::{Dispatcher, Session, SubmitRejected, load_image};
use solver_client::{HttpSolveClient, SolveService};
use solver_core::Settings;
use solver_storage::Storage;
use solver_ui::{Ui, UiExit};
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{Cli, RunMode};

const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{err:?}");
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when a headless solve did not produce a result.
fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let project_dirs =
        ProjectDirs::from("dev", "mathsolver", "mathsolver").context("resolve project dirs")?;

    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir)
        .with_context(|| format!("create config dir {}", config_dir.display()))?;

    init_logging(&config_dir.join("mathsolver.log"))?;

    let storage = Storage::open(config_dir.join("mathsolver.db"))?;
    let stored = storage.load_settings()?;
    let mut settings = stored.clone();
    cli.apply_overrides(&mut settings);
    info!(api = %settings.api_base_url, level = %settings.level, policy = %settings.settlement_policy, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    let client = connect(&settings)?;
    let (dispatcher, settlements) = Dispatcher::new(client.clone(), runtime.handle().clone());
    let session = Session::new(settings.clone(), dispatcher, settlements);

    match cli.run_mode() {
        RunMode::Question(question) => solve_headless(&runtime, session, Headless::Text(question)),
        RunMode::Image(path) => {
            let input = load_image(&path)?;
            solve_headless(&runtime, session, Headless::Image(input))
        }
        RunMode::Tui => {
            let health = probe_health(&runtime, client.as_ref());
            run_tui(&runtime, &storage, &stored, &settings, session, health)?;
            Ok(true)
        }
    }
}

fn run_tui(
    runtime: &Runtime,
    storage: &Storage,
    stored: &Settings,
    at_start: &Settings,
    session: Session,
    health: String,
) -> anyhow::Result<()> {
    let mut ui = Ui::new(session, health);
    loop {
        let exit = ui.run()?;
        let current = ui.session().settings.clone();
        storage.save_settings(&config::persistable(stored, at_start, &current))?;

        match exit {
            UiExit::Quit => break,
            UiExit::Reconnect => {
                info!(api = %current.api_base_url, "reconnecting");
                let client = connect(&current)?;
                ui.set_health(probe_health(runtime, client.as_ref()));
                ui.session_mut().set_service(client);
            }
        }
    }
    Ok(())
}

enum Headless {
    Text(String),
    Image(solver_core::ImageInput),
}

fn solve_headless(runtime: &Runtime, mut session: Session, job: Headless) -> anyhow::Result<bool> {
    let submitted = match &job {
        Headless::Text(question) => session.submit_text(question),
        Headless::Image(input) => session.submit_image(Some(input)),
    };
    let task = match submitted {
        Ok(task) => task,
        Err(SubmitRejected::Invalid(err)) => {
            eprintln!("{err}");
            return Ok(false);
        }
        Err(err) => return Err(err.into()),
    };
    runtime.block_on(task).context("solve task")?;
    session.poll();

    if let Some(error) = session.controller.error() {
        eprintln!("{error}");
        return Ok(false);
    }
    let view = session.result_view().context("solve finished without a result")?;
    println!("{}", plain_report(&view, session.steps()));
    Ok(true)
}

fn connect(settings: &Settings) -> anyhow::Result<Arc<HttpSolveClient>> {
    let client = HttpSolveClient::new(settings).context("build http client")?;
    Ok(Arc::new(client))
}

fn probe_health(runtime: &Runtime, client: &HttpSolveClient) -> String {
    let probe = runtime.block_on(tokio::time::timeout(HEALTH_TIMEOUT, client.health()));
    match probe {
        Ok(Ok(status)) if status.ok => match status.text_model {
            Some(model) => format!("online, {model}"),
            None => "online".to_string(),
        },
        Ok(Ok(_)) => "degraded".to_string(),
        Ok(Err(err)) => {
            warn!(error = %err, base_url = client.base_url(), "health check failed");
            "unreachable".to_string()
        }
        Err(_) => "no answer".to_string(),
    }
}

fn init_logging(log_path: &Path) -> anyhow::Result<()> {
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("init logging: {err}"))
}
