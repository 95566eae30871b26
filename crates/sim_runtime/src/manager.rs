//! The tick scheduler.
//!
//! One tick is: sample pause → commit the database → fan systems out on
//! the worker pool → wait → advance simulation time. Commits are serial;
//! fan-out is parallel across systems with callbacks of one system running
//! sequentially in registration order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::ThreadPool;
use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
use tracing::{debug, error, info, trace, warn};

use sim_component::Entity;

use crate::database::ComponentDatabase;
use crate::diagnostics::{Diagnostics, NullDiagnostics};
use crate::error::ManagerError;
use crate::facade::EntityRef;
use crate::handle::DataHandle;
use crate::system::{LoadedSystem, QueryView, Registrar, System};

/// Tuning knobs for a [`Manager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Fan-out worker threads. `0` picks the rayon default (one per core).
    pub worker_threads: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { worker_threads: 0 }
    }
}

#[derive(Debug, Default)]
struct TimeState {
    /// Committed simulation time, in seconds.
    committed: f64,
    /// Value staged by `set_simulation_time`, applied at the next tick's
    /// final step.
    staged: Option<f64>,
}

/// The tick scheduler and owner of the component database.
pub struct Manager {
    db: ComponentDatabase,
    systems: Mutex<Vec<LoadedSystem>>,
    pool: ThreadPool,
    diagnostics: Arc<dyn Diagnostics>,
    time: Mutex<TimeState>,
    pause_count: AtomicU64,
    /// Pause state sampled at the start of the most recent tick, so systems
    /// see one consistent value for the whole tick.
    paused: AtomicBool,
    tick_count: AtomicU64,
    running: AtomicBool,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Manager {
    /// Build a manager with no-op diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::WorkerPool`] if the fan-out pool cannot be
    /// built.
    pub fn new(config: ManagerConfig) -> Result<Self, ManagerError> {
        Self::with_diagnostics(config, Arc::new(NullDiagnostics))
    }

    /// Build a manager with an explicit diagnostics collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::WorkerPool`] if the fan-out pool cannot be
    /// built.
    pub fn with_diagnostics(
        config: ManagerConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self, ManagerError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("sim-worker-{i}"))
            .build()?;
        info!(worker_threads = pool.current_num_threads(), "manager created");
        Ok(Self {
            db: ComponentDatabase::new(),
            systems: Mutex::new(Vec::new()),
            pool,
            diagnostics,
            time: Mutex::new(TimeState::default()),
            pause_count: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            tick_count: AtomicU64::new(0),
            running: AtomicBool::new(false),
            loop_thread: Mutex::new(None),
        })
    }

    /// The component database. Prefer the manager/handle surface for
    /// entity lifecycle; direct access is for componentizers and tooling.
    #[must_use]
    pub fn database(&self) -> &ComponentDatabase {
        &self.db
    }

    // -- System loading --

    /// Load a system: run its `init` phase and store the resulting
    /// (query, callback) pairs beside the instance.
    ///
    /// The system list is locked during fan-out, so this must not be
    /// called from a system callback.
    pub fn load_system(&self, mut system: impl System + 'static) {
        let name = system.name().to_owned();
        let mut registrar = Registrar::new(&self.db, &name);
        system.init(&mut registrar);
        let slots = registrar.into_slots();
        info!(system = %name, callbacks = slots.len(), "system loaded");
        self.systems.lock().push(LoadedSystem {
            name,
            system: Box::new(system),
            slots,
        });
    }

    // -- Entity surface --

    /// Allocate a live entity. Visible to queries after the next tick.
    pub fn create_entity(&self) -> Entity {
        self.db.create_entity()
    }

    /// Schedule an entity for deletion at the next tick's commit.
    pub fn delete_entity(&self, entity: Entity) -> bool {
        self.db.delete_entity(entity)
    }

    /// Typed façade over one entity.
    #[must_use]
    pub fn entity(&self, entity: Entity) -> EntityRef<'_> {
        EntityRef::new(&self.db, entity)
    }

    /// Snapshot of the entities holding all the named component types,
    /// without installing a standing query. Unknown names match nothing.
    #[must_use]
    pub fn query_entities(&self, type_names: &[&str]) -> Vec<Entity> {
        let registry = self.db.registry();
        let mut required = Vec::with_capacity(type_names.len());
        for name in type_names {
            let ty = registry.type_id(name);
            if !ty.is_valid() {
                warn!(type_name = name, "query_entities on unregistered type");
                return Vec::new();
            }
            required.push(ty);
        }
        self.db.snapshot_matching(&required)
    }

    // -- Data handles --

    /// Acquire a scoped lease that blocks commits while held. Blocks if a
    /// commit is mid-flight.
    #[must_use]
    pub fn data_handle(&self) -> DataHandle<'_> {
        DataHandle::new(self)
    }

    // -- Simulation time --

    /// The committed simulation time, in seconds.
    #[must_use]
    pub fn simulation_time(&self) -> f64 {
        self.time.lock().committed
    }

    /// Stage a new simulation time, applied at the next tick's final step.
    /// Refused (returns `false`) while paused or when `time` would move the
    /// clock backwards.
    pub fn set_simulation_time(&self, time: f64) -> bool {
        if self.paused() {
            return false;
        }
        let mut state = self.time.lock();
        if time < state.committed {
            warn!(
                requested = time,
                committed = state.committed,
                "refusing to move simulation time backwards"
            );
            return false;
        }
        state.staged = Some(time);
        true
    }

    // -- Pause discipline --

    /// Increment the pause count. Takes effect at the next tick's sample.
    pub fn begin_pause(&self) -> u64 {
        self.pause_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement the pause count, never below zero.
    pub fn end_pause(&self) -> u64 {
        let mut current = self.pause_count.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return 0;
            }
            match self.pause_count.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return current - 1,
                Err(actual) => current = actual,
            }
        }
    }

    /// The pause state sampled at the start of the most recent tick.
    #[must_use]
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    // -- Ticking --

    /// Run one tick: commit, fan out, advance simulation time.
    pub fn update_once(&self) {
        self.tick(None);
    }

    /// Run one tick, then sleep so the elapsed wall time approximates
    /// (simulation-time delta / `real_time_factor`). The sleep only ever
    /// lengthens the tick.
    pub fn update_once_paced(&self, real_time_factor: f64) {
        self.tick(Some(real_time_factor));
    }

    fn tick(&self, real_time_factor: Option<f64>) {
        let started = Instant::now();
        let time_before = self.simulation_time();

        // 1. Sample the pause count once for the whole tick.
        let paused = self.pause_count.load(Ordering::SeqCst) > 0;
        self.paused.store(paused, Ordering::SeqCst);

        self.diagnostics.tick_begin(time_before);

        // 2. Serial commit phase. Waits out live data handles.
        self.diagnostics.start_timer("commit");
        self.db.commit();
        self.diagnostics.stop_timer("commit");

        // 3–4. Parallel fan-out, one work item per system. The guard is not
        // Send, so hand the pool a plain reborrow of the system list.
        let mut systems_guard = self.systems.lock();
        let systems: &mut Vec<LoadedSystem> = &mut systems_guard;
        self.pool.install(|| {
            systems.par_iter_mut().for_each(|system| {
                self.diagnostics.start_timer(&system.name);
                self.run_system(system);
                self.diagnostics.stop_timer(&system.name);
            });
        });
        drop(systems_guard);

        // 5. Advance simulation time to the staged value. A tick that
        // sampled paused leaves the stage untouched; the value applies at
        // the next unpaused tick.
        let time_after = {
            let mut state = self.time.lock();
            if !paused && let Some(staged) = state.staged.take() {
                state.committed = staged;
            }
            state.committed
        };

        self.diagnostics.tick_end();
        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(tick, sim_time = time_after, paused, "tick complete");

        if let Some(rtf) = real_time_factor
            && rtf > 0.0
        {
            let sim_delta = time_after - time_before;
            if sim_delta > 0.0 {
                let target = Duration::from_secs_f64(sim_delta / rtf);
                self.diagnostics.start_timer("pacing");
                if let Some(remaining) = target.checked_sub(started.elapsed()) {
                    std::thread::sleep(remaining);
                }
                self.diagnostics.stop_timer("pacing");
            }
        }
    }

    /// Dispatch one system's callbacks sequentially, in registration order.
    /// A panicking callback aborts the rest of this system's slots for the
    /// tick; other systems and the tick itself continue.
    fn run_system(&self, system: &mut LoadedSystem) {
        for (query_id, callback) in &mut system.slots {
            let Some(entities) = self.db.query_entity_ids(*query_id) else {
                continue;
            };
            let view = QueryView::new(&self.db, *query_id, entities);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&view, self)));
            if outcome.is_err() {
                error!(
                    system = %system.name,
                    query_id = query_id.0,
                    "system callback panicked, skipping its remaining callbacks this tick"
                );
                break;
            }
        }
    }

    // -- Background loop --

    /// Detach a background thread that calls `update_once_paced(1.0)` until
    /// [`Manager::stop`]. No-op if already running.
    pub fn run(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("sim-tick-loop".to_owned())
            .spawn(move || {
                debug!("tick loop started");
                while manager.running.load(Ordering::SeqCst) {
                    manager.update_once_paced(1.0);
                }
                debug!("tick loop stopped");
            });
        match spawned {
            Ok(handle) => *self.loop_thread.lock() = Some(handle),
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                error!(%err, "failed to spawn the tick loop thread");
            }
        }
    }

    /// Signal the background loop to stop and wait for the current tick to
    /// finish. Cancellation is coarse, at tick boundaries.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.loop_thread.lock().take()
            && let Err(panic) = handle.join()
        {
            error!(?panic, "tick loop thread panicked");
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_component::{Component, QueryDescriptor};
    use std::sync::atomic::AtomicUsize;

    use crate::system::FnSystem;

    #[derive(Debug, Clone, Default)]
    struct Heading {
        radians: f32,
    }
    impl Component for Heading {
        fn type_name() -> &'static str {
            "Heading"
        }
    }

    fn manager() -> Manager {
        Manager::new(ManagerConfig { worker_threads: 2 }).unwrap()
    }

    #[test]
    fn test_pause_is_sampled_per_tick() {
        let m = manager();
        assert!(!m.paused());
        assert_eq!(m.begin_pause(), 1);
        assert_eq!(m.begin_pause(), 2);
        // Not yet sampled.
        assert!(!m.paused());
        m.update_once();
        assert!(m.paused());

        assert_eq!(m.end_pause(), 1);
        assert_eq!(m.end_pause(), 0);
        // Count never goes negative.
        assert_eq!(m.end_pause(), 0);
        // Still paused until the next tick samples.
        assert!(m.paused());
        m.update_once();
        assert!(!m.paused());
    }

    #[test]
    fn test_set_time_refused_while_paused() {
        let m = manager();
        m.begin_pause();
        m.update_once();
        assert!(!m.set_simulation_time(10.0));
        m.update_once();
        assert_eq!(m.simulation_time(), 0.0);
    }

    #[test]
    fn test_time_advances_at_tick_boundary() {
        let m = manager();
        assert!(m.set_simulation_time(5.0));
        // Staged, not yet committed.
        assert_eq!(m.simulation_time(), 0.0);
        m.update_once();
        assert_eq!(m.simulation_time(), 5.0);
        // Monotonic: going backwards is refused.
        assert!(!m.set_simulation_time(2.0));
        assert_eq!(m.simulation_time(), 5.0);
    }

    #[test]
    fn test_time_staged_before_pause_waits_for_unpaused_tick() {
        let m = manager();
        // Staged while unpaused, so the setter accepts it.
        assert!(m.set_simulation_time(5.0));
        m.begin_pause();
        // The paused tick must not advance the clock.
        m.update_once();
        assert!(m.paused());
        assert_eq!(m.simulation_time(), 0.0);
        m.update_once();
        assert_eq!(m.simulation_time(), 0.0);
        // The stage survives and applies at the next unpaused tick.
        m.end_pause();
        m.update_once();
        assert_eq!(m.simulation_time(), 5.0);
    }

    #[test]
    fn test_callback_panic_is_isolated() {
        let m = manager();
        m.database().registry().register::<Heading>().unwrap();
        let e = m.create_entity();
        m.entity(e).add::<Heading>().unwrap();

        let survivor_runs = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&survivor_runs);

        let desc = QueryDescriptor::from_types(&[Heading::component_type_id()]);
        m.load_system(FnSystem::new("panicky", desc.clone(), |view, _m| {
            if !view.is_empty() {
                panic!("boom");
            }
        }));
        m.load_system(FnSystem::new("survivor", desc, move |view, _m| {
            counted.fetch_add(1, Ordering::SeqCst);
            for e in view.entities() {
                view.get_mut::<Heading>(*e).unwrap().radians += 1.0;
            }
        }));

        m.update_once(); // component committed; both systems see it
        m.update_once(); // panicky panics, survivor still runs
        assert_eq!(survivor_runs.load(Ordering::SeqCst), 2);
        assert!(m.entity(e).get::<Heading>().unwrap().radians >= 1.0);
    }

    #[test]
    fn test_registration_with_unknown_type_is_dropped() {
        let m = manager();
        let ran = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&ran);
        let desc = QueryDescriptor::from_types(&[Heading::component_type_id()]);
        m.load_system(FnSystem::new("orphan", desc, move |_view, _m| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        m.update_once();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_entities_created_in_fanout_visible_next_tick() {
        let m = manager();
        m.database().registry().register::<Heading>().unwrap();
        let seed = m.create_entity();
        m.entity(seed).add::<Heading>().unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&seen);
        let desc = QueryDescriptor::from_types(&[Heading::component_type_id()]);
        m.load_system(FnSystem::new("spawner", desc, move |view, mgr| {
            counted.store(view.len(), Ordering::SeqCst);
            if mgr.tick_count() == 0 {
                let e = mgr.create_entity();
                mgr.entity(e).add::<Heading>().unwrap();
            }
        }));

        m.update_once();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        m.update_once();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_and_stop_background_loop() {
        let m = Arc::new(manager());
        m.run();
        // Second run is a no-op.
        m.run();
        std::thread::sleep(Duration::from_millis(20));
        m.stop();
        assert!(m.tick_count() > 0);
        let after = m.tick_count();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(m.tick_count(), after);
    }
}
