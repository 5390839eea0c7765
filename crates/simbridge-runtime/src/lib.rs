//! `simbridge-runtime` – the bridge node
//!
//! Glues command input, the simulation engine and the image output together.
//!
//! ```text
//! wheel_cmd / joy ─► CommandIngestor ─► ActionState ─► SimulationLoop ─► FrameEmitter ─► image topic
//!                                                        (engine.step/render/reset)
//! ```
//!
//! # Modules
//!
//! - [`action_state`] – [`ActionState`], the mutex-guarded current action
//!   shared by the command handlers and the loop.
//! - [`command`] – [`CommandIngestor`]: differential-wheel and joystick
//!   handlers that normalise inbound messages into actions.
//! - [`rate`] – [`Rate`], a drift-free fixed-frequency sleeper.
//! - [`emitter`] – [`FrameEmitter`] plus the [`ImageEncoder`] seam and its
//!   [`JpegEncoder`] implementation.
//! - [`sim_loop`] – [`SimulationLoop`], the step → render → reset → emit
//!   cycle, and the cooperative [`StopHandle`].
//! - [`node`] – [`SimulationWrapperNode`] and [`NodeConfig`]: topic
//!   resolution, handler subscription and the loop thread.
//! - [`telemetry`] – [`init_tracing`]: console logging with optional OTLP
//!   span export.

pub mod action_state;
pub mod command;
pub mod emitter;
pub mod node;
pub mod rate;
pub mod sim_loop;
pub mod telemetry;

pub use action_state::ActionState;
pub use command::CommandIngestor;
pub use emitter::{FrameEmitter, ImageEncoder, JpegEncoder};
pub use node::{NodeConfig, NodeHandle, SimulationWrapperNode, Topics};
pub use rate::Rate;
pub use sim_loop::{SimulationLoop, StopHandle, TickReport};
pub use telemetry::{TracerProviderGuard, init_tracing};
