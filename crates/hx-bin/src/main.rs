//! hexcmp entrypoint: view, compare and edit one or two binary files.
mod app;
mod keys;
mod prompt;
mod render;

use anyhow::{Context as _, Result};
use clap::Parser;
use core_config::{ConfigContext, load_from};
use core_events::{CANCEL_HITS, CANCEL_POLLS};
use core_model::{Context, Engines, open_sessions};
use core_terminal::{CrosstermBackend, TerminalBackend};
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use app::{App, PROMPT_ROWS, STATUS_ROWS};

const LOG_FILE: &str = "hexcmp.log";

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "hexcmp", version, about = "Binary file viewer, comparer and editor")]
struct Args {
    /// File to display (the top pane).
    pub file1: PathBuf,
    /// Optional second file; when given both files are compared byte by byte.
    pub file2: Option<PathBuf>,
    /// Optional configuration file path (overrides discovery of `hexcmp.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

struct AppStartup {
    backend: CrosstermBackend,
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self {
            backend: CrosstermBackend::new(),
            log_guard: None,
        }
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join(LOG_FILE);
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        if tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .with_ansi(false)
            .try_init()
            .is_ok()
        {
            self.log_guard = Some(guard);
        }
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }

    fn run(&mut self, args: Args) -> Result<()> {
        self.configure_logging()?;
        Self::install_panic_hook();
        info!(target: "runtime", "startup");

        let mut config = load_from(args.config.clone())?;
        let two_files = args.file2.is_some();
        let size = self.backend.size().unwrap_or((80, 24));
        let geometry = ConfigContext::new(size.0, size.1, STATUS_ROWS, PROMPT_ROWS, two_files);
        config.apply_context(geometry);

        // Open errors are reported before the screen is taken over.
        let (top, bottom) = open_sessions(&config, &args.file1, args.file2.as_deref())
            .inspect_err(|e| error!(target: "runtime.startup", error = %e, "open_failed"))?;
        info!(
            target: "runtime.startup",
            file1 = %args.file1.display(),
            file2 = args.file2.as_ref().map(|p| p.display().to_string()),
            config_override = args.config.is_some(),
            line_width = config.effective_line_width,
            capacity = config.window_capacity,
            "bootstrap_complete"
        );
        let ctx = Context::new(top, bottom, Engines::from_config(&config));

        self.backend.set_title("hexcmp")?;
        let guard = self.backend.enter_guard().context("entering the terminal")?;
        let mut app = App::new(ctx, config, size);
        let result = app.run(guard.backend());
        drop(guard);

        info!(
            target: "runtime.shutdown",
            cancel_polls = CANCEL_POLLS.load(Ordering::Relaxed),
            cancel_hits = CANCEL_HITS.load(Ordering::Relaxed),
            ok = result.is_ok(),
            "shutdown"
        );
        result
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut startup = AppStartup::new();
    let result = startup.run(args);
    drop(startup.log_guard.take());
    result
}
