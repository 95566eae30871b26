//! Diagnostics hook points.
//!
//! The manager invokes these around commit, around each system fan-out
//! slot, and around the real-time-factor sleep. Implementations must be
//! thread-safe: timer calls for different systems arrive concurrently
//! during fan-out.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

/// Observer of tick boundaries and named phases.
pub trait Diagnostics: Send + Sync {
    /// A tick is starting; `sim_time` is the committed simulation time.
    fn tick_begin(&self, sim_time: f64);

    /// The tick completed (all systems done, simulation time advanced).
    fn tick_end(&self);

    /// A named phase started. Phases may overlap across threads but a
    /// given name is started at most once per tick.
    fn start_timer(&self, name: &str);

    /// The named phase ended.
    fn stop_timer(&self, name: &str);
}

/// No-op diagnostics, the default collaborator.
#[derive(Debug, Default)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn tick_begin(&self, _sim_time: f64) {}
    fn tick_end(&self) {}
    fn start_timer(&self, _name: &str) {}
    fn stop_timer(&self, _name: &str) {}
}

/// One named phase measurement within a tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerEntry {
    pub name: String,
    pub micros: u64,
}

/// Summary of one completed tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TickReport {
    /// Sequence number, starting at 1.
    pub tick: u64,
    /// Committed simulation time at tick start, in seconds.
    pub sim_time: f64,
    /// Wall-clock duration of the whole tick, in microseconds.
    pub total_micros: u64,
    /// Completed phase timers, in completion order.
    pub timers: Vec<TimerEntry>,
}

#[derive(Debug, Default)]
struct TimingState {
    tick: u64,
    current: Option<InFlight>,
    completed: Vec<TickReport>,
}

#[derive(Debug)]
struct InFlight {
    report: TickReport,
    started: Instant,
    open: HashMap<String, Instant>,
}

/// Aggregates phase timers into per-tick [`TickReport`]s.
#[derive(Debug, Default)]
pub struct TimingDiagnostics {
    state: Mutex<TimingState>,
}

impl TimingDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently completed tick's report.
    #[must_use]
    pub fn last_report(&self) -> Option<TickReport> {
        self.state.lock().completed.last().cloned()
    }

    /// Drain all completed reports.
    pub fn take_reports(&self) -> Vec<TickReport> {
        std::mem::take(&mut self.state.lock().completed)
    }
}

impl Diagnostics for TimingDiagnostics {
    fn tick_begin(&self, sim_time: f64) {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        state.current = Some(InFlight {
            report: TickReport {
                tick,
                sim_time,
                total_micros: 0,
                timers: Vec::new(),
            },
            started: Instant::now(),
            open: HashMap::new(),
        });
    }

    fn tick_end(&self) {
        let mut state = self.state.lock();
        if let Some(mut flight) = state.current.take() {
            flight.report.total_micros = flight.started.elapsed().as_micros() as u64;
            state.completed.push(flight.report);
        }
    }

    fn start_timer(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(flight) = state.current.as_mut() {
            flight.open.insert(name.to_owned(), Instant::now());
        }
    }

    fn stop_timer(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(flight) = state.current.as_mut() {
            match flight.open.remove(name) {
                Some(started) => flight.report.timers.push(TimerEntry {
                    name: name.to_owned(),
                    micros: started.elapsed().as_micros() as u64,
                }),
                None => warn!(timer = name, "stop_timer without matching start_timer"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_collects_one_report_per_tick() {
        let diag = TimingDiagnostics::new();
        diag.tick_begin(0.0);
        diag.start_timer("commit");
        diag.stop_timer("commit");
        diag.tick_end();

        diag.tick_begin(0.5);
        diag.tick_end();

        let reports = diag.take_reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].tick, 1);
        assert_eq!(reports[0].timers.len(), 1);
        assert_eq!(reports[0].timers[0].name, "commit");
        assert_eq!(reports[1].tick, 2);
        assert_eq!(reports[1].sim_time, 0.5);
        assert!(diag.take_reports().is_empty());
    }

    #[test]
    fn test_unmatched_stop_is_ignored() {
        let diag = TimingDiagnostics::new();
        diag.tick_begin(0.0);
        diag.stop_timer("nope");
        diag.tick_end();
        assert!(diag.last_report().unwrap().timers.is_empty());
    }

    #[test]
    fn test_timers_outside_tick_are_ignored() {
        let diag = TimingDiagnostics::new();
        diag.start_timer("commit");
        diag.stop_timer("commit");
        assert!(diag.last_report().is_none());
    }

    #[test]
    fn test_report_serialises() {
        let diag = TimingDiagnostics::new();
        diag.tick_begin(1.25);
        diag.tick_end();
        let json = serde_json::to_value(diag.last_report().unwrap()).unwrap();
        assert_eq!(json["tick"], 1);
        assert_eq!(json["sim_time"], 1.25);
    }
}
