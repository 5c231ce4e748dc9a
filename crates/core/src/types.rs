//! Core types for the lockstep harness
//!
//! This module defines the foundational types:
//! - RunId: Unique identifier for a single run of a two-lane configuration
//! - LaneId: Which of the two participants a step belongs to
//! - FailurePoint: Where in a lane's lifecycle a failure happened
//! - FailureRecord: The single failure that survives a run

use crate::error::StepError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one run
///
/// A RunId is a wrapper around a UUID v4. A fresh RunId is allocated every
/// time a configuration is run, and it is attached to every trace line the
/// run emits so interleaved logs of consecutive runs can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random RunId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a RunId from a string representation
    ///
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this RunId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the two participants of a run
///
/// The first lane always opens the interleaving: its step 0 is released by
/// the shared start signal, and each of its steps hands over to the second
/// lane's step with the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneId {
    /// The lane that starts the run (`T1` by default)
    First,
    /// The lane that answers each of the first lane's steps (`T2` by default)
    Second,
}

impl LaneId {
    /// Both lanes, in start order
    pub const BOTH: [LaneId; 2] = [LaneId::First, LaneId::Second];

    /// The opposite lane
    pub fn other(self) -> LaneId {
        match self {
            LaneId::First => LaneId::Second,
            LaneId::Second => LaneId::First,
        }
    }

    /// Position of the lane (0 for first, 1 for second)
    pub fn index(self) -> usize {
        match self {
            LaneId::First => 0,
            LaneId::Second => 1,
        }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneId::First => write!(f, "first"),
            LaneId::Second => write!(f, "second"),
        }
    }
}

/// Where in a lane's lifecycle a failure was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailurePoint {
    /// Opening the lane's resource, before any step ran
    Open,
    /// Executing the step with this 0-based index
    Step(usize),
    /// Releasing the lane's resource after both lanes finished their steps
    Release,
    /// The lane's worker could not be started or died outside a step body
    Worker,
}

impl FailurePoint {
    /// Step index, if the failure happened inside a step body
    pub fn step(&self) -> Option<usize> {
        match self {
            FailurePoint::Step(index) => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for FailurePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePoint::Open => write!(f, "resource open"),
            FailurePoint::Step(index) => write!(f, "step #{}", index),
            FailurePoint::Release => write!(f, "resource release"),
            FailurePoint::Worker => write!(f, "worker"),
        }
    }
}

/// The failure that ended a run
///
/// At most one record survives per run: the first lane to record a failure
/// wins, and every later failure is only logged.
#[derive(Debug)]
pub struct FailureRecord {
    /// Lane that failed
    pub lane: LaneId,
    /// Diagnostic name of that lane (e.g. "T1")
    pub lane_name: String,
    /// Where the failure happened
    pub point: FailurePoint,
    /// The captured error, forwarded unchanged
    pub error: StepError,
}

impl FailureRecord {
    /// Create a record for a failed step body
    pub fn step(lane: LaneId, lane_name: impl Into<String>, index: usize, error: StepError) -> Self {
        Self {
            lane,
            lane_name: lane_name.into(),
            point: FailurePoint::Step(index),
            error,
        }
    }

    /// Step index of the failure, if it happened inside a step body
    pub fn step_index(&self) -> Option<usize> {
        self.point.step()
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed in lane {} ({}): {}",
            self.point, self.lane_name, self.lane, self.error
        )
    }
}
