mod app;
mod cli;
mod dialog;
mod docker;
mod input;
mod keymap;
mod model;
mod overlay;
mod provider;
mod session;
mod table;
mod timers;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use cli::CliArgs;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use docker::DockerProvider;
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use session::{Message, Session};
use std::fs::File;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::{Arc, Mutex};
use timers::{AtomicIdGenerator, PollIntervals, TimerTick, TokioScheduler};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const MIN_REFRESH_MS: u64 = 500;
const MIN_LOGS_REFRESH_MS: u64 = 250;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let provider = DockerProvider::connect().await?;
    info!("connected to Docker, starting in {}", args.start.kind().command());

    let snapshot = Duration::from_millis(args.refresh_ms.max(MIN_REFRESH_MS));
    let intervals = PollIntervals {
        snapshot,
        logs: Duration::from_millis(args.logs_refresh_ms.max(MIN_LOGS_REFRESH_MS)),
        banner: snapshot,
    };

    let (tick_tx, tick_rx) = mpsc::unbounded_channel::<TimerTick>();
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<Message>();
    let app = App::new(
        args.start.kind(),
        Arc::new(AtomicIdGenerator::new()),
        intervals,
    );
    let mut session = Session::new(
        app,
        Arc::new(provider),
        Arc::new(TokioScheduler::new(tick_tx)),
        inbox_tx,
    );

    run(&mut session, tick_rx, inbox_rx).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::sink).try_init();
        }
    }

    Ok(())
}

async fn run(
    session: &mut Session,
    ticks: UnboundedReceiver<TimerTick>,
    inbox: UnboundedReceiver<Message>,
) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, session, ticks, inbox).await;
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
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_ALTERNATE_KEYS
            )
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
    session: &mut Session,
    mut ticks: UnboundedReceiver<TimerTick>,
    mut inbox: UnboundedReceiver<Message>,
) -> Result<()> {
    let size = terminal.size().context("failed to read terminal size")?;
    session.handle(Message::Resize(size.width, size.height));
    session.start();

    let mut reader = EventStream::new();

    loop {
        terminal
            .draw(|frame| ui::render(frame, session.app()))
            .context("failed to render terminal frame")?;

        if !session.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        session.handle(Message::Key(key));
                    }
                    Some(Ok(Event::Resize(width, height))) => {
                        session.handle(Message::Resize(width, height));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!("terminal event error: {error}");
                    }
                    None => {
                        warn!("terminal event stream closed");
                        break;
                    }
                }
            }
            Some(tick) = ticks.recv() => {
                session.handle(Message::Tick(tick));
            }
            Some(message) = inbox.recv() => {
                session.handle(message);
            }
        }
    }

    Ok(())
}
