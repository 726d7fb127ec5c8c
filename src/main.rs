//! Demo entry point: a headless session with a simulated singer.
//!
//! Usage: `noteblocks [level] [seconds]`. Reads `levels.toml` and
//! `engine.toml` from the working directory when present.

use crossbeam_channel::bounded;
use noteblocks::input::{SingerProfile, start_singer};
use noteblocks::logic::run_session;
use noteblocks::{BlocksEngine, EngineBus, EngineSettings, HeadlessVisuals, LevelBook};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("MAIN: Booting note blocks demo...");

    let mut args = std::env::args().skip(1);
    let level_number = args.next().map(|a| a.parse::<u32>()).transpose()?.unwrap_or(1);
    let seconds = args.next().map(|a| a.parse::<u64>()).transpose()?.unwrap_or(30);

    let book = match LevelBook::load(Path::new("levels.toml")) {
        Ok(book) => book,
        Err(e) => {
            log::warn!("MAIN: No usable levels.toml ({}), using built-in levels", e);
            LevelBook::builtin()
        }
    };
    let settings = match EngineSettings::load(Path::new("engine.toml")) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("MAIN: No usable engine.toml ({}), using defaults", e);
            EngineSettings::default()
        }
    };
    let level = book.level(level_number)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let bus = EngineBus::new();
    let engine = BlocksEngine::new(
        runtime.handle().clone(),
        Arc::new(level),
        Arc::new(HeadlessVisuals::default()),
        settings,
        bus.clone(),
    );

    let (stop_tx, stop_rx) = bounded(1);
    let watched = engine.clone();
    let singer = start_singer(bus, SingerProfile::default(), stop_rx, move || {
        watched.frontmost_note()
    })?;

    let summary = runtime.block_on(run_session(engine, Duration::from_secs(seconds)));

    let _ = stop_tx.send(());
    if singer.join().is_err() {
        log::error!("MAIN: Singer thread panicked");
    }

    println!("{:#?}", summary);
    Ok(())
}
