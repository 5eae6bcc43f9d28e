// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Tick Scheduler

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::network::World;

/// A component driven once per tick.
pub trait Tickable: Send {
    fn name(&self) -> &'static str;
    fn update(&mut self, world: &mut World, dt: f64);
}

pub type SharedTickable = Arc<Mutex<dyn Tickable>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    stage: SharedTickable,
}

#[derive(Default)]
struct Subscribers {
    entries: Vec<Subscriber>,
    next_id: u64,
}

/// Ordered list of tick subscribers. Registration may happen from another
/// thread while a tick runs; each tick works on the list as it was when the
/// tick started.
#[derive(Default)]
pub struct TickScheduler {
    subscribers: Mutex<Subscribers>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. Stages run in subscription order.
    pub fn subscribe(&self, stage: SharedTickable) -> SubscriptionId {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(subs.next_id);
        subs.next_id += 1;
        let name = stage.lock().map(|s| s.name()).unwrap_or("poisoned");
        debug!(stage = name, subscription = id.0, "stage subscribed");
        subs.entries.push(Subscriber { id, stage });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subs.entries.len();
        subs.entries.retain(|s| s.id != id);
        subs.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.snapshot()
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).name())
            .collect()
    }

    fn snapshot(&self) -> Vec<SharedTickable> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|s| s.stage.clone())
            .collect()
    }

    /// Run every stage once. The subscriber lock is released before any
    /// stage runs.
    pub fn run(&self, world: &mut World, dt: f64) {
        for stage in self.snapshot() {
            let mut guard = stage.lock().unwrap_or_else(PoisonError::into_inner);
            trace!(stage = guard.name(), "stage update");
            guard.update(world, dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Tickable for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        fn update(&mut self, _world: &mut World, _dt: f64) {
            self.log.lock().unwrap().push(self.label);
        }
    }

    fn recorder(label: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> SharedTickable {
        Arc::new(Mutex::new(Recorder {
            label,
            log: log.clone(),
        }))
    }

    #[test]
    fn test_runs_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scheduler = TickScheduler::new();
        scheduler.subscribe(recorder("motion", &log));
        scheduler.subscribe(recorder("collision", &log));
        let mut world = World::new(SimConfig::default());
        scheduler.run(&mut world, 0.1);
        assert_eq!(*log.lock().unwrap(), vec!["motion", "collision"]);
    }

    #[test]
    fn test_unsubscribe() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scheduler = TickScheduler::new();
        let a = scheduler.subscribe(recorder("a", &log));
        scheduler.subscribe(recorder("b", &log));
        assert!(scheduler.unsubscribe(a));
        assert!(!scheduler.unsubscribe(a));
        assert_eq!(scheduler.stage_names(), vec!["b"]);
    }

    #[test]
    fn test_subscribe_from_other_thread() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Arc::new(TickScheduler::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                let stage = recorder("ui", &log);
                std::thread::spawn(move || scheduler.subscribe(stage))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(scheduler.len(), 4);
        let mut world = World::new(SimConfig::default());
        scheduler.run(&mut world, 0.1);
        assert_eq!(log.lock().unwrap().len(), 4);
    }
}
