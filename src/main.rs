mod app;
mod backend;
mod cli;
mod config;
mod dispatch;
mod github;
mod images;
mod input;
mod k8s;
mod model;
mod projector;
mod ui;

use anyhow::{Context, Result};
use app::{App, AppEvent, Completion, transition};
use backend::{LIST_TIMEOUT, LiveBackend, with_timeout};
use clap::Parser;
use cli::CliArgs;
use config::LcrConfigFile;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use dispatch::{Backend, Dispatcher, compact_error};
use futures::StreamExt;
use github::CommitGateway;
use images::ImageGateway;
use k8s::KubeGateway;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = LcrConfigFile::load(&args)?;
    init_tracing(&args.log_filter, config.log_file.as_deref())?;

    let images = ImageGateway::new(config.registry_host.clone())?;
    let commits = CommitGateway::new(config.github.clone())?;
    let kube = match KubeGateway::new().await {
        Ok(gateway) => {
            info!("using Kubernetes context {}", gateway.context());
            Some(gateway)
        }
        Err(error) => {
            warn!("Kubernetes unavailable: {}", compact_error(&error));
            None
        }
    };

    let backend = Arc::new(LiveBackend::new(
        images,
        kube,
        config.cluster_registry_host.clone(),
    ));
    let app = bootstrap(&config, &commits, backend.as_ref()).await;
    run(app, backend, config.refresh_ms).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder.with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::sink).try_init();
        }
    }

    Ok(())
}

/// Loads the initial collections concurrently. Each failure leaves its
/// collection empty and is reported on the status line.
async fn bootstrap(config: &LcrConfigFile, commits: &CommitGateway, backend: &LiveBackend) -> App {
    let (commits, images, pods) = tokio::join!(
        with_timeout(LIST_TIMEOUT, "commit listing", commits.list_commits()),
        backend.list_images(),
        backend.list_pods(&config.namespace),
    );

    let mut failures = Vec::new();
    let commits = loaded_or_empty("commits", commits, &mut failures);
    let images = loaded_or_empty("images", images, &mut failures);
    let pods = loaded_or_empty("pods", pods, &mut failures);

    let mut app = App::new(config.namespace.clone(), commits, images, pods);
    if failures.is_empty() {
        app.set_status(format!(
            "Loaded {} commits, {} images, {} pods",
            app.commits().len(),
            app.images().len(),
            app.workloads().len()
        ));
    } else {
        app.set_status(format!("Startup issues: {}", failures.join("; ")));
    }
    app
}

fn loaded_or_empty<T>(label: &str, result: Result<Vec<T>>, failures: &mut Vec<String>) -> Vec<T> {
    match result {
        Ok(records) => records,
        Err(error) => {
            let error = compact_error(&error);
            warn!("failed to load {label}: {error}");
            failures.push(format!(
                "{label}: {}",
                error.lines().next().unwrap_or_default()
            ));
            Vec::new()
        }
    }
}

async fn run(app: App, backend: Arc<LiveBackend>, refresh_ms: u64) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, backend, refresh_ms).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    mut app: App,
    backend: Arc<LiveBackend>,
    refresh_ms: u64,
) -> Result<()> {
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel::<Completion>();
    let dispatcher = Dispatcher::new(backend, completion_tx);

    let size = terminal.size().context("failed to read terminal size")?;
    app = step(
        app,
        &dispatcher,
        AppEvent::Resize {
            width: size.width,
            height: size.height,
        },
    );

    let mut reader = EventStream::new();
    let mut ticker = interval(Duration::from_millis(refresh_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        terminal
            .draw(|frame| ui::render(frame, &app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            app = step(app, &dispatcher, AppEvent::Input(action));
                        }
                    }
                    Some(Ok(Event::Resize(width, height))) => {
                        app = step(app, &dispatcher, AppEvent::Resize { width, height });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                app = step(app, &dispatcher, AppEvent::Tick);
            }
            maybe_completion = completion_rx.recv() => {
                if let Some(completion) = maybe_completion {
                    app = step(app, &dispatcher, AppEvent::Completed(completion));
                }
            }
        }
    }

    Ok(())
}

fn step(app: App, dispatcher: &Dispatcher<LiveBackend>, event: AppEvent) -> App {
    let (app, commands) = transition(app, event);
    for command in commands {
        debug!("command {}", command.describe());
        dispatcher.dispatch(command);
    }
    app
}
