// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Autosave

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::network::World;
use crate::scheduler::Tickable;
use crate::timeline::{Snapshot, Timeline};

/// Serialize `snapshot` next to `path` and rename it into place, so a
/// reader never sees a half-written file.
pub fn write_atomic(path: &Path, snapshot: &Snapshot) -> io::Result<()> {
    let json = serde_json::to_vec(snapshot).map_err(io::Error::other)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

pub fn read_snapshot(path: &Path) -> io::Result<Snapshot> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(io::Error::other)
}

/// Debounced writer. Failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct Autosaver {
    path: PathBuf,
    min_interval: Duration,
    last_write: Option<Instant>,
}

impl Autosaver {
    pub fn new(path: impl Into<PathBuf>, min_interval: Duration) -> Self {
        Self {
            path: path.into(),
            min_interval,
            last_write: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write unless the previous write was less than `min_interval` before
    /// `now`. Returns whether a file was written.
    pub fn offer(&mut self, snapshot: &Snapshot, now: Instant) -> bool {
        if let Some(last) = self.last_write {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        match write_atomic(&self.path, snapshot) {
            Ok(()) => {
                self.last_write = Some(now);
                debug!(path = %self.path.display(), tick = snapshot.tick, "autosave written");
                true
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "autosave failed");
                false
            }
        }
    }
}

// ─── Background Worker ───────────────────────────────────────────────────────

/// Owns a writer thread. Submitted snapshots queue on a channel; the thread
/// only ever writes the newest one it has.
pub struct AutosaveWorker {
    sender: Option<Sender<Snapshot>>,
    handle: Option<JoinHandle<()>>,
}

impl AutosaveWorker {
    pub fn spawn(mut saver: Autosaver) -> Self {
        let (sender, receiver): (Sender<Snapshot>, Receiver<Snapshot>) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            while let Ok(mut latest) = receiver.recv() {
                while let Ok(newer) = receiver.try_recv() {
                    latest = newer;
                }
                saver.offer(&latest, Instant::now());
            }
        });
        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    pub fn sender(&self) -> Option<Sender<Snapshot>> {
        self.sender.clone()
    }

    pub fn submit(&self, snapshot: Snapshot) {
        if let Some(tx) = &self.sender {
            let _ = tx.send(snapshot);
        }
    }
}

impl Drop for AutosaveWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Tick stage forwarding each newly recorded timeline frame to the worker.
pub struct AutosaveHook {
    timeline: Arc<Mutex<Timeline>>,
    sender: Sender<Snapshot>,
    last_tick: Option<u64>,
}

impl AutosaveHook {
    pub fn new(timeline: Arc<Mutex<Timeline>>, sender: Sender<Snapshot>) -> Self {
        Self {
            timeline,
            sender,
            last_tick: None,
        }
    }
}

impl Tickable for AutosaveHook {
    fn name(&self) -> &'static str {
        "autosave"
    }

    fn update(&mut self, _world: &mut World, _dt: f64) {
        let timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(latest) = timeline.latest() else {
            return;
        };
        if self.last_tick == Some(latest.tick) {
            return;
        }
        self.last_tick = Some(latest.tick);
        let _ = self.sender.send(latest.clone());
    }
}
