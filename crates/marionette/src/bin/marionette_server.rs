//! Headless Marionette host.
//!
//! ```text
//! marionette_server [CONFIG.toml] [--seconds N] [--entities N] [--patrol]
//! ```
//!
//! Runs the authoritative loop over an in-memory voxel world until stdin
//! closes, a line reading `quit` arrives, or `--seconds` elapse. With
//! `--patrol` every entity walks a square on its own thread.

use marionette::{EntitySession, Host, MarionetteConfig};
use marionette_core::{CommandError, EntityId};
use marionette_world::{BlockKind, BlockPos, Placement, Volume, VoxelWorld};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    seconds: Option<u64>,
    entities: u64,
    patrol: bool,
}

fn main() -> ExitCode {
    init_tracing();
    match parse_args().and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(error = %message, "startup_failed");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options {
        entities: 1,
        ..Options::default()
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seconds" => options.seconds = Some(parse_number(args.next(), "--seconds")?),
            "--entities" => options.entities = parse_number(args.next(), "--entities")?,
            "--patrol" => options.patrol = true,
            "-h" | "--help" => {
                return Err(
                    "usage: marionette_server [CONFIG.toml] [--seconds N] [--entities N] [--patrol]"
                        .to_string(),
                )
            }
            path if options.config.is_none() && !path.starts_with("--") => {
                options.config = Some(PathBuf::from(path));
            }
            other => return Err(format!("unexpected argument: {other}")),
        }
    }
    Ok(options)
}

fn parse_number(value: Option<String>, flag: &str) -> Result<u64, String> {
    value
        .ok_or_else(|| format!("{flag} needs a value"))?
        .parse()
        .map_err(|e| format!("invalid {flag}: {e}"))
}

fn run(options: Options) -> Result<(), String> {
    let config = match &options.config {
        Some(path) => MarionetteConfig::load(path).map_err(|e| e.to_string())?,
        None => MarionetteConfig::default(),
    };
    info!(config = ?options.config, entities = options.entities, "=== Marionette Startup ===");

    let mut world = VoxelWorld::with_loaded_radius(4);
    world.fill(
        Volume::new(BlockPos::new(-48, 62, -48), BlockPos::new(47, 63, 47)),
        BlockKind::Grass,
    );
    let ids: Vec<EntityId> = (1..=options.entities).map(EntityId::new).collect();
    for (index, id) in ids.iter().enumerate() {
        let x = i32::try_from(index).unwrap_or(i32::MAX / 8).saturating_mul(4);
        world.spawn_actor(*id, Placement::new(BlockPos::new(x, 64, 0), 0));
    }

    let mut host = Host::new(world, config).map_err(|e| e.to_string())?;
    let mut sessions = Vec::with_capacity(ids.len());
    for id in &ids {
        sessions.push(host.spawn_session(*id).map_err(|e| e.to_string())?);
    }

    let stop = Arc::new(AtomicBool::new(false));
    watch_stdin(Arc::clone(&stop));
    if let Some(seconds) = options.seconds {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            stop.store(true, Ordering::Release);
        });
    }
    let patrols: Vec<_> = if options.patrol {
        sessions.iter().cloned().map(spawn_patrol).collect()
    } else {
        Vec::new()
    };

    host.run_until(&stop);
    host.shutdown();
    for patrol in patrols {
        if patrol.join().is_err() {
            warn!("patrol_thread_panicked");
        }
    }
    info!(bridge = ?host.bridge().stats(), "=== Marionette Stopped ===");
    Ok(())
}

fn watch_stdin(stop: Arc<AtomicBool>) {
    let spawned = thread::Builder::new()
        .name("stdin-watch".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim() == "quit" => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            stop.store(true, Ordering::Release);
        });
    if let Err(err) = spawned {
        warn!(error = %err, "stdin_watch_unavailable");
    }
}

fn spawn_patrol(session: Arc<EntitySession>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        let step = session.forward(3).and_then(|_| session.turn_right().map(|_| ()));
        match step {
            Ok(()) => {}
            Err(CommandError::AdmissionRejected { .. }) => {
                thread::sleep(Duration::from_millis(100));
            }
            Err(err) => {
                info!(entity = %session.id(), error = %err, "patrol_ended");
                return;
            }
        }
    })
}
