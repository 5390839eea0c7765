//! `simbridge-hal` – the simulation engine seam
//!
//! Everything the bridge needs to know about a simulator lives behind the
//! [`SimulationEngine`] trait.  This crate also ships a self-contained
//! engine so the node runs without any external simulator.
//!
//! # Modules
//!
//! - [`engine`] – [`SimulationEngine`] plus the [`StepOutcome`] /
//!   [`StepInfo`] / [`Pose`] values a step returns.
//! - [`config`] – [`SimulatorConfig`], the construction-time parameters
//!   (seed, map, step ceiling, camera resolution, start-angle tolerance,
//!   rendering flags).
//! - [`maps`] – catalogue of tiled maps and lane geometry.
//! - [`sim`] – [`KinematicSim`], a deterministic differential-drive simulator
//!   with a synthetic camera.

pub mod config;
pub mod engine;
pub mod maps;
pub mod sim;

pub use config::SimulatorConfig;
pub use engine::{Pose, SimulationEngine, StepInfo, StepOutcome};
pub use sim::KinematicSim;
