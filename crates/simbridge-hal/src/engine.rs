//! Generic `SimulationEngine` trait and the values a step produces.
//!
//! The bridge never looks inside the simulator.  It drives any type
//! implementing [`SimulationEngine`] through `step` / `render` / `reset`, so
//! the built-in [`KinematicSim`][crate::sim::KinematicSim], an external
//! simulator binding, or a scripted test double can be swapped without
//! touching the control loop.

use simbridge_types::{ActionVector, BridgeError, Frame};

/// Robot pose in the map frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Metres along the map's x axis.
    pub x: f64,
    /// Metres along the map's y axis.
    pub y: f64,
    /// Heading in radians, counter-clockwise from +x.
    pub heading_rad: f64,
}

/// Auxiliary per-step information.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepInfo {
    /// Steps taken in the current episode, including this one.
    pub step: u64,
    /// Episodes started since construction (the first one is `0`).
    pub episode: u64,
    /// Full robot pose; only present when the engine exposes its state.
    pub pose: Option<Pose>,
}

/// Everything a single `step` call returns.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observation: Frame,
    pub reward: f64,
    /// The episode is over and the engine must be reset before stepping on.
    pub done: bool,
    pub info: StepInfo,
}

/// An opaque, stateful simulator stepped by the control loop.
///
/// Implementations are owned by exactly one loop and never shared, so the
/// methods take `&mut self` and need no internal locking.
pub trait SimulationEngine: Send {
    /// Advance the simulation by one timestep using `action`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Engine`] on an internal simulator failure.
    fn step(&mut self, action: ActionVector) -> Result<StepOutcome, BridgeError>;

    /// Render the current camera view in the engine's native channel order.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Engine`] when the frame cannot be produced.
    fn render(&mut self) -> Result<Frame, BridgeError>;

    /// Start a fresh episode and return its first observation.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Engine`] when the episode cannot be set up.
    fn reset(&mut self) -> Result<Frame, BridgeError>;
}

impl<E: SimulationEngine + ?Sized> SimulationEngine for Box<E> {
    fn step(&mut self, action: ActionVector) -> Result<StepOutcome, BridgeError> {
        (**self).step(action)
    }

    fn render(&mut self) -> Result<Frame, BridgeError> {
        (**self).render()
    }

    fn reset(&mut self) -> Result<Frame, BridgeError> {
        (**self).reset()
    }
}
