//! One-shot gates, countdown latches and the per-run gate wiring
//!
//! A [`Gate`] fires once and stays open. A [`Latch`] releases its waiters
//! once it was counted down to zero. [`GateSet`] allocates one gate per
//! (lane, step) pair and knows which gate a finished step has to open:
//!
//! ```text
//! first  #0 ──► second #0 ──► first #1 ──► second #1 ──► ... ──► second #n-1
//!  ▲
//!  start signal
//! ```
//!
//! Gates are created fresh for every run and never reused.

use lockstep_core::LaneId;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Single-use, single-trigger signal
///
/// Opening an open gate is a no-op, so forced unblocking after a failure
/// can open gates that normal progression already opened.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    /// Create a closed gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate, releasing every current and future waiter
    pub fn open(&self) {
        let mut open = self.open.lock();
        if !*open {
            *open = true;
            self.cond.notify_all();
        }
    }

    /// Whether the gate has been opened
    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Block until the gate is opened
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    /// Block until the gate is opened or the timeout elapses
    ///
    /// Returns true if the gate is open.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut open = self.open.lock();
        self.cond.wait_while_for(&mut open, |open| !*open, timeout);
        *open
    }
}

/// Countdown latch used for the run rendezvous points
#[derive(Debug)]
pub struct Latch {
    remaining: Mutex<usize>,
    cond: Condvar,
}

impl Latch {
    /// Create a latch expecting `count` arrivals
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    /// Record one arrival; the last arrival releases all waiters
    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            if *remaining == 0 {
                self.cond.notify_all();
            }
        }
    }

    /// Arrivals still missing
    pub fn count(&self) -> usize {
        *self.remaining.lock()
    }

    /// Block until every expected arrival happened
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.cond.wait(&mut remaining);
        }
    }
}

/// Gate wiring of one run
///
/// `first[0]` doubles as the start signal. Every other gate is opened by
/// exactly one step of the opposite lane.
#[derive(Debug)]
pub struct GateSet {
    first: Vec<Gate>,
    second: Vec<Gate>,
}

impl GateSet {
    /// Allocate gates for `steps` paired steps
    pub fn new(steps: usize) -> Self {
        Self {
            first: (0..steps).map(|_| Gate::new()).collect(),
            second: (0..steps).map(|_| Gate::new()).collect(),
        }
    }

    /// Number of paired steps
    pub fn steps(&self) -> usize {
        self.first.len()
    }

    fn lane(&self, lane: LaneId) -> &[Gate] {
        match lane {
            LaneId::First => &self.first,
            LaneId::Second => &self.second,
        }
    }

    /// Release the first lane's step 0
    pub fn open_start(&self) {
        if let Some(start) = self.first.first() {
            start.open();
        }
    }

    /// The gate a lane waits on before running step `index`
    pub fn entry(&self, lane: LaneId, index: usize) -> &Gate {
        &self.lane(lane)[index]
    }

    /// The gate opened when a lane finishes step `index`
    ///
    /// First lane step i opens second lane step i; second lane step i opens
    /// first lane step i+1. The second lane's last step has no successor.
    pub fn successor(&self, lane: LaneId, index: usize) -> Option<&Gate> {
        match lane {
            LaneId::First => self.second.get(index),
            LaneId::Second => self.first.get(index + 1),
        }
    }

    /// Open the successor of step `index`
    pub fn fire(&self, lane: LaneId, index: usize) {
        if let Some(gate) = self.successor(lane, index) {
            gate.open();
        }
    }

    /// Open every successor of this lane from step `index` on
    ///
    /// Used when a lane stops early so the other lane is never left parked
    /// on a gate nobody will open.
    pub fn release_from(&self, lane: LaneId, index: usize) {
        for i in index..self.steps() {
            self.fire(lane, i);
        }
    }
}
