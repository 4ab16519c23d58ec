use anyhow::{Context, Result};
use colored::Colorize;
use focusclock::common::{duration_from_secs_lossy, format_clock};
use focusclock::prelude::*;
use focusclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_HISTORY: usize = 5;

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    // `logo.log` sits in the root of the `rdx-focusshell` crate.
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let rule = "-".repeat(72);

    println!("{}", rule.dimmed());
    println!("{}", version_string);
    println!(
        "{}",
        "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    "
        .dimmed()
    );
    println!("{}", rule.dimmed());
}

/// One line of shell input.
#[derive(Debug, Clone, PartialEq)]
enum Input {
    Start {
        secs: Option<f64>,
        mode: Option<SessionMode>,
        title: Option<String>,
    },
    Pause,
    Resume,
    Skip(Option<f64>),
    Note(Option<String>),
    Finish(Option<String>),
    Stop(Option<String>),
    Status,
    Watch(bool),
    History(usize),
    Help,
    Exit,
    Empty,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let args = line.split_whitespace().collect::<Vec<_>>();
    let Some((command, rest)) = args.split_first() else {
        return Input::Empty;
    };
    let text = |words: &[&str]| (!words.is_empty()).then(|| words.join(" "));

    match *command {
        "start" => {
            let mut rest = rest;
            let secs = rest.first().and_then(|word| word.parse::<f64>().ok());
            if secs.is_some() {
                rest = &rest[1..];
            }
            let mode = rest.first().and_then(|word| word.parse::<SessionMode>().ok());
            if mode.is_some() {
                rest = &rest[1..];
            }
            Input::Start {
                secs,
                mode,
                title: text(rest),
            }
        }
        "pause" => Input::Pause,
        "resume" => Input::Resume,
        "skip" => match rest.first() {
            None => Input::Skip(None),
            Some(word) => match word.parse::<f64>() {
                Ok(secs) => Input::Skip(Some(secs)),
                Err(_) => Input::Invalid(format!("'{}' is not a number of seconds.", word)),
            },
        },
        "note" => Input::Note(text(rest)),
        "finish" => Input::Finish(text(rest)),
        "stop" => Input::Stop(text(rest)),
        "status" => Input::Status,
        "watch" => match rest.first() {
            Some(&"on") => Input::Watch(true),
            Some(&"off") => Input::Watch(false),
            _ => Input::Invalid("Usage: watch on|off".to_string()),
        },
        "history" => match rest.first() {
            None => Input::History(DEFAULT_HISTORY),
            Some(word) => match word.parse::<usize>() {
                Ok(limit) => Input::History(limit),
                Err(_) => Input::Invalid("Usage: history [N]".to_string()),
            },
        },
        "help" => Input::Help,
        "exit" | "quit" => Input::Exit,
        other => Input::Invalid(format!("Unknown command: '{}'. Type 'help'.", other)),
    }
}

/// Spawns the console listeners. State changes are only printed while watching.
fn spawn_event_listeners(engine: &FocusclockEngine, watching: Arc<AtomicBool>) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            if let SystemEvent::EngineShutdown = event {
                println!("\n<-- [SYSTEM EVENT] {:?}", event);
            }
        }
    });

    let mut session_rx = engine.subscribe_session_events();
    tokio::spawn(async move {
        while let Ok(event) = session_rx.recv().await {
            if let SessionEventKind::Finished { planned, cause } = event.kind {
                println!(
                    "\n<-- {} {} session finished ({:?})",
                    "[DONE]".green().bold(),
                    format_clock(planned),
                    cause
                );
            }
        }
    });

    let mut states = engine.subscribe();
    let clock = engine.clone();
    tokio::spawn(async move {
        let mut last_shown = None;
        while let Some(state) = states.recv().await {
            if !watching.load(Ordering::Relaxed) {
                last_shown = None;
                continue;
            }
            let remaining = state.remaining(clock.now());
            let shown = (state.label(), remaining.as_secs());
            if last_shown == Some(shown) {
                continue;
            }
            last_shown = Some(shown);
            println!("<-- [STATE] {:<8} {}", state.label(), format_clock(remaining));
        }
    });
}

fn print_status(engine: &FocusclockEngine, record: Option<SessionRecord>) {
    let now = engine.now();
    let state = engine.current_state();
    println!(
        "--> {} {} left, {} elapsed ({:.0}%)",
        state.label().cyan().bold(),
        format_clock(state.remaining(now)),
        format_clock(state.elapsed(now)),
        state.progress(now) * 100.0
    );
    if let Some(record) = record {
        println!("    {} {} [{}]", record.id, record.title, record.mode);
    }
}

fn print_history(records: &[SessionRecord]) {
    if records.is_empty() {
        println!("--> No sessions yet.");
        return;
    }
    for record in records {
        let status = if record.completed {
            "done".green()
        } else {
            "open".yellow()
        };
        println!(
            "  {:<5} {}  {:<6} {} / {}  {}  {}",
            record.id.to_string(),
            record.started_at.format("%Y-%m-%d %H:%M"),
            record.mode.as_str(),
            format_clock(record.elapsed),
            format_clock(record.planned),
            status,
            record.title
        );
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  start [S] [work|break] [TITLE]  - Starts a session of S seconds (configured defaults otherwise).");
    println!("  pause                           - Freezes the running session.");
    println!("  resume                          - Continues a paused session.");
    println!("  skip [S]                        - Advances the session by S seconds.");
    println!("  note [NOTES]                    - Keeps notes for the session, used as its title when it ends.");
    println!("  finish [NOTES]                  - Completes the session now.");
    println!("  stop [NOTES]                    - Abandons the session, keeping the time spent.");
    println!("  status                          - Shows the current session.");
    println!("  watch on|off                    - Streams state changes to the console.");
    println!("  history [N]                     - Lists the last N sessions.");
    println!("  exit                            - Quits the shell.");
}

fn report(applied: &Transition, verb: &str) {
    if applied.changed() {
        println!(
            "--> {} ({} -> {}), {} left",
            verb,
            applied.from.label(),
            applied.to.label(),
            format_clock(applied.remaining_after())
        );
    } else {
        println!("--> Nothing to {} while {}.", verb, applied.from.label());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path = env::var_os("FOCUSCLOCK_CONFIG").map(PathBuf::from);
    let config = FocusclockConfig::load(config_path.as_deref())
        .context("could not load focusshell configuration")?;
    let defaults = config.defaults.clone();

    let engine = FocusclockEngine::new(config);
    let coordinator = SessionCoordinator::new(
        engine.clone(),
        MemorySessionStore::new_shared(),
        Arc::new(LogNotifier::new()),
    );
    info!("{} is up", ENGINE_NAME.cyan());

    let watching = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&engine, watching.clone());

    let mut rl = Editor::new()?;
    rl.set_helper(Some(MyHighlighter {}));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting focusshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;

        match parse_input(&line) {
            Input::Start { secs, mode, title } => {
                let mode = mode.unwrap_or(defaults.default_mode);
                let duration = secs
                    .map(duration_from_secs_lossy)
                    .unwrap_or_else(|| defaults.duration_for(mode));
                match coordinator.start(duration, mode, None, title.as_deref()).await {
                    Some(applied) => println!(
                        "--> Started {} session of {} (#{})",
                        mode,
                        format_clock(duration),
                        applied.session
                    ),
                    None => println!("--> A session needs a positive duration."),
                }
            }
            Input::Pause => report(&coordinator.pause().await, "pause"),
            Input::Resume => report(&coordinator.resume().await, "resume"),
            Input::Skip(secs) => {
                let by = secs.map(duration_from_secs_lossy).unwrap_or_else(|| defaults.skip());
                report(&coordinator.skip(by).await, "skip")
            }
            Input::Note(notes) => {
                if coordinator.set_notes(notes.as_deref()).await {
                    println!("--> Notes kept for the current session.");
                } else {
                    println!("--> No session is open.");
                }
            }
            Input::Finish(notes) => report(&coordinator.finish(notes.as_deref()).await, "finish"),
            Input::Stop(notes) => report(&coordinator.stop(notes.as_deref()).await, "stop"),
            Input::Status => print_status(&engine, coordinator.open_record().await),
            Input::Watch(on) => {
                watching.store(on, Ordering::Relaxed);
                println!("--> Watching {}.", if on { "on" } else { "off" });
            }
            Input::History(limit) => print_history(&coordinator.history(limit)),
            Input::Help => print_help(),
            Input::Exit => break,
            Input::Empty => {}
            Input::Invalid(message) => println!("Error: {}", message),
        }
    }

    engine.shutdown().await;
    Ok(())
}
