mod action;
mod app;
mod auth;
mod autocomplete;
mod config;
mod context;
mod error;
mod event;
mod fetch;
mod forge;
mod git;
mod github;
mod input;
mod mutation;
mod section;
mod store;
mod task;
mod tui;
mod types;
mod ui;

use std::fs::File;
use std::io;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::app::App;
use crate::config::{Config, ViewKind};
use crate::context::ProgramContext;
use crate::event::Event;
use crate::forge::Forge;
use crate::github::GitHub;
use crate::store::{SharedStores, Stores};
use crate::tui::EventHandler;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Config file to use instead of ~/.config/gitdash/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a debug log to debug.log in the working directory
    #[arg(long)]
    debug: bool,

    /// View to open at launch
    #[arg(long, value_enum)]
    view: Option<ViewKind>,

    /// Local repository to detect the current repo from and list branches of
    #[arg(short, long)]
    repo: Option<PathBuf>,
}

fn init_logging(debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (default_level, writer) = if debug {
        ("debug", BoxMakeWriter::new(Mutex::new(File::create("debug.log")?)))
    } else {
        ("warn", BoxMakeWriter::new(io::sink))
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    let config = Config::load(cli.config.as_deref());
    let token = auth::load_token()?;
    let github = GitHub::new(token)?;

    let user = match github.current_user().await {
        Ok(login) => Some(login),
        Err(err) => {
            warn!(%err, "could not resolve the authenticated user");
            None
        }
    };

    let repo_dir = match cli.repo {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let repo = config::detect_repo(&repo_dir);
    info!(repo = ?repo.as_ref().map(|r| r.full_name()), user = ?user, "starting");

    let stores = match store::state_dir() {
        Some(dir) => Stores::load(&dir),
        None => Stores::in_memory(),
    };

    let view = cli.view.unwrap_or(config.defaults.view);
    let ctx = Arc::new(ProgramContext {
        config,
        repo,
        repo_dir,
        user,
        forge: Arc::new(github),
        stores: SharedStores::new(stores),
    });

    // Run the application
    let result = run(ctx, view).await;

    // Restore terminal
    tui::restore()?;

    result
}

async fn run(ctx: Arc<ProgramContext>, view: ViewKind) -> Result<(), Box<dyn std::error::Error>> {
    let mut terminal = tui::init()?;

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let mut app = App::new(ctx, view, action_tx.clone());

    let tick_rate = Duration::from_millis(250);
    let render_rate = Duration::from_millis(16); // ~60fps
    let mut events = EventHandler::new(tick_rate, render_rate);

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                if event.is_interrupt() && !app.captures_input() {
                    break;
                }

                match event {
                    Event::Render => {
                        terminal.draw(|frame| ui::render(frame, &app))?;
                    }
                    _ => {
                        let action = app.handle_event(event);
                        if !matches!(action, Action::None) {
                            action_tx.send(action)?;
                        }
                    }
                }
            }
            Some(action) = action_rx.recv() => {
                app.update(action);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
