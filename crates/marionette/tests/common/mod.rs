//! Shared harness: a host ticking on a background thread, plus script
//! doubles that record what they were asked to do.

#![allow(dead_code)]

use marionette::{
    Callback, EntitySession, Host, MarionetteConfig, ScriptEngine, ScriptError, ScriptHandle,
    ScriptLanguage,
};
use marionette_core::{CommandFuture, CommandResult, EntityId};
use marionette_world::{BlockPos, Placement, VoxelWorld};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Where test actors start: standing on nothing in a loaded, empty world.
pub const ORIGIN: BlockPos = BlockPos::new(0, 64, 0);

/// A host ticking as fast as it can on its own thread.
pub struct Harness {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Host<VoxelWorld>>>,
}

impl Harness {
    /// Starts ticking `host`.
    pub fn start(mut host: Host<VoxelWorld>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("test-loop".into())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    host.tick();
                    thread::sleep(Duration::from_micros(500));
                }
                host
            })
            .unwrap();
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops ticking and hands the host back.
    pub fn pause(mut self) -> Host<VoxelWorld> {
        self.stop.store(true, Ordering::Release);
        self.handle.take().unwrap().join().unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A world with one actor per id, lined up along x at `ORIGIN`.
pub fn world_with(ids: &[EntityId]) -> VoxelWorld {
    let mut world = VoxelWorld::with_loaded_radius(2);
    for (index, id) in ids.iter().enumerate() {
        let offset = i32::try_from(index).unwrap() * 3;
        world.spawn_actor(*id, Placement::new(ORIGIN.offset(offset, 0, 0), 0));
    }
    world
}

/// Host with sessions spawned for `ids`.
pub fn host_with(
    ids: &[EntityId],
    config: MarionetteConfig,
) -> (Host<VoxelWorld>, Vec<Arc<EntitySession>>) {
    let mut host = Host::new(world_with(ids), config).unwrap();
    let sessions = ids
        .iter()
        .map(|id| host.spawn_session(*id).unwrap())
        .collect();
    (host, sessions)
}

/// Polls `check` until it holds or two seconds pass.
pub fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}

/// Outcome of `future`, failing the test if it is still pending after two
/// seconds.
pub fn settle<T>(future: &CommandFuture<T>) -> CommandResult<T> {
    future
        .wait_timeout(Duration::from_secs(2))
        .expect("future still pending after 2s")
}

/// Script double recording every callback and stop request.
#[derive(Default)]
pub struct RecordingScript {
    pub calls: Mutex<Vec<Callback>>,
    pub stopped: AtomicBool,
    /// While set, `on_update` blocks until it is cleared.
    pub hold_updates: AtomicBool,
}

impl RecordingScript {
    pub fn count(&self, callback: Callback) -> usize {
        self.calls.lock().iter().filter(|c| **c == callback).count()
    }
}

impl ScriptHandle for RecordingScript {
    fn invoke(&self, callback: Callback) {
        self.calls.lock().push(callback);
        if callback == Callback::Update {
            while self.hold_updates.load(Ordering::Acquire)
                && !self.stopped.load(Ordering::Acquire)
            {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Engine handing out `RecordingScript`s and remembering them.
#[derive(Default)]
pub struct RecordingEngine {
    pub loaded: Mutex<Vec<(String, ScriptLanguage, Arc<RecordingScript>)>>,
}

impl ScriptEngine for RecordingEngine {
    fn load(
        &self,
        source: &str,
        language: ScriptLanguage,
        _session: Arc<EntitySession>,
    ) -> Result<Arc<dyn ScriptHandle>, ScriptError> {
        if source.contains("syntax error") {
            return Err(ScriptError::Load("unexpected token".into()));
        }
        let script = Arc::new(RecordingScript::default());
        self.loaded
            .lock()
            .push((source.to_string(), language, Arc::clone(&script)));
        Ok(script)
    }
}
