use anyhow::{Context, Result};
use colored::Colorize;
use focusclock::common::format_clock;
use focusclock::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load configuration, optionally from the file named by FOCUSCLOCK_CONFIG.
    let config_path = std::env::var_os("FOCUSCLOCK_CONFIG").map(PathBuf::from);
    let config = FocusclockConfig::load(config_path.as_deref())
        .context("could not load focusdev configuration")?;

    // 3. Create the engine.
    let engine = FocusclockEngine::new(config);
    info!("{} v{}", focusclock::ENGINE_NAME, focusclock::VERSION);

    // 4. Spawn concurrent tasks to listen to each stream the engine offers.
    spawn_listeners(&engine);

    // 5. Drive a short demo session and wait for it to finish.
    run_demo_session(&engine).await;

    engine.shutdown().await;
    Ok(())
}

/// Spawns one task per stream, each logging what it observes.
fn spawn_listeners(engine: &FocusclockEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("{} => {:?}", "[SYSTEM]".blue(), event);
        }
    });

    let mut session_rx = engine.subscribe_session_events();
    tokio::spawn(async move {
        while let Ok(event) = session_rx.recv().await {
            info!(
                "{} => session {} {:?}",
                "[SESSION]".green(),
                event.session,
                event.kind
            );
        }
    });

    let mut states = engine.subscribe();
    let clock_engine = engine.clone();
    tokio::spawn(async move {
        let mut last_second = None;
        while let Some(state) = states.recv().await {
            // Ticks arrive several times a second; print once per displayed second.
            let remaining = state.remaining(clock_engine.now());
            let shown = (state.label(), remaining.as_secs());
            if last_second == Some(shown) {
                continue;
            }
            last_second = Some(shown);
            info!(
                "{} => {:<8} {}",
                "[STATE]".yellow(),
                state.label(),
                format_clock(remaining).bold()
            );
        }
    });
}

/// Starts a six-second session, exercises pause, resume and skip, and waits for the end.
async fn run_demo_session(engine: &FocusclockEngine) {
    let mut states = engine.subscribe();

    engine.start(Duration::from_secs(6)).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    engine.pause().await;
    info!("paused with {} left", format_clock(engine.remaining()));
    tokio::time::sleep(Duration::from_secs(1)).await;

    engine.resume().await;
    engine.skip(Duration::from_secs(2)).await;

    loop {
        tokio::select! {
            state = states.recv() => match state {
                Some(TimerState::Finished) => {
                    info!("{}", "Session complete.".green().bold());
                    break;
                }
                Some(_) => {}
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                engine.stop().await;
                info!("interrupted; session stopped");
                break;
            }
        }
    }
}
