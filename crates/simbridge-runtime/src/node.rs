//! [`SimulationWrapperNode`] – wires the pieces into one running node.
//!
//! Starting a node
//!
//! 1. resolves its three topic names against the node name,
//! 2. advertises the image topic with the configured queue depth,
//! 3. subscribes the [`CommandIngestor`] handlers (one Tokio task per topic),
//! 4. moves the engine into a [`SimulationLoop`] on a dedicated OS thread.
//!
//! The returned [`NodeHandle`] stops the loop and collects its result.
//! Dropping the handle stops the loop as well, without waiting for it.

use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use simbridge_hal::SimulationEngine;
use simbridge_middleware::{EventBus, resolve_name};
use simbridge_types::BridgeError;
use tracing::{debug, info};

use crate::action_state::ActionState;
use crate::command::CommandIngestor;
use crate::emitter::{DEFAULT_JPEG_QUALITY, FrameEmitter, JpegEncoder};
use crate::rate::Rate;
use crate::sim_loop::{SimulationLoop, StopHandle};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Node-level settings: naming, topics, cadence and output encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_name: String,
    /// Differential-wheel command topic (may be private, `~name`).
    pub wheel_cmd_topic: String,
    pub joy_topic: String,
    pub image_topic: String,
    /// Backlog of unread frames kept for slow image subscribers.
    pub image_queue_size: usize,
    /// Loop frequency in hertz.
    pub rate_hz: f64,
    pub jpeg_quality: u8,
    /// Back-to-back publish failures tolerated before the loop aborts.
    pub publish_failure_limit: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "simulation_wrapper_node".to_string(),
            wheel_cmd_topic: "~wheel_cmd".to_string(),
            joy_topic: "~joy".to_string(),
            image_topic: "~simulation_images/compressed".to_string(),
            image_queue_size: 10,
            rate_hz: 30.0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            publish_failure_limit: 1,
        }
    }
}

impl NodeConfig {
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.rate_hz.is_finite() || self.rate_hz <= 0.0 {
            return Err(BridgeError::Config(format!(
                "rate_hz must be positive, got {}",
                self.rate_hz
            )));
        }
        if self.image_queue_size == 0 {
            return Err(BridgeError::Config(
                "image_queue_size must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(BridgeError::Config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.publish_failure_limit == 0 {
            return Err(BridgeError::Config(
                "publish_failure_limit must be at least 1".into(),
            ));
        }
        self.resolved_topics().map(|_| ())
    }

    /// Fully qualified topic names for this node.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the node name or a topic name is
    /// not a legal graph name.
    pub fn resolved_topics(&self) -> Result<Topics, BridgeError> {
        Ok(Topics {
            wheel_cmd: resolve_name(&self.node_name, &self.wheel_cmd_topic)?,
            joy: resolve_name(&self.node_name, &self.joy_topic)?,
            image: resolve_name(&self.node_name, &self.image_topic)?,
        })
    }
}

/// Resolved topic names of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub wheel_cmd: String,
    pub joy: String,
    pub image: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────────────────────

/// A configured, not yet running node.
pub struct SimulationWrapperNode<E: SimulationEngine + 'static> {
    config: NodeConfig,
    topics: Topics,
    bus: EventBus,
    engine: E,
    state: ActionState,
}

impl<E: SimulationEngine + 'static> SimulationWrapperNode<E> {
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when `config` is invalid.
    pub fn new(config: NodeConfig, bus: EventBus, engine: E) -> Result<Self, BridgeError> {
        config.validate()?;
        let topics = config.resolved_topics()?;
        Ok(Self {
            config,
            topics,
            bus,
            engine,
            state: ActionState::new(),
        })
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// The node's action slot, initialised to `(0.0, 0.0)`.
    pub fn action_state(&self) -> ActionState {
        self.state.clone()
    }

    /// Subscribe the command handlers and start the loop thread.
    ///
    /// Must be called from within a Tokio runtime; the command handlers are
    /// spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the image topic cannot be
    /// advertised and [`BridgeError::Transport`] when the loop thread cannot
    /// be spawned.
    pub fn start(self) -> Result<NodeHandle, BridgeError> {
        let Self {
            config,
            topics,
            bus,
            engine,
            state,
        } = self;

        let publisher = bus.advertise(topics.image.clone(), config.image_queue_size)?;
        let encoder = JpegEncoder::new(config.jpeg_quality)?;
        let emitter = FrameEmitter::new(
            Box::new(encoder),
            Box::new(publisher),
            config.publish_failure_limit,
        );
        let rate = Rate::new(config.rate_hz)?;
        let stop = StopHandle::new();

        let ingestor = Arc::new(CommandIngestor::new(
            state.clone(),
            topics.wheel_cmd.clone(),
            topics.joy.clone(),
        ));
        let command_tasks = ingestor.spawn(&bus);

        let mut sim = SimulationLoop::new(engine, state.clone(), emitter, rate, stop.clone());
        let loop_thread = thread::Builder::new()
            .name("sim-loop".into())
            .spawn(move || sim.run())
            .map_err(|e| BridgeError::Transport(format!("failed to spawn loop thread: {e}")))?;

        info!(
            node = %config.node_name,
            wheel_cmd = %topics.wheel_cmd,
            joy = %topics.joy,
            image = %topics.image,
            rate_hz = config.rate_hz,
            "node started"
        );

        Ok(NodeHandle {
            stop,
            state,
            topics,
            loop_thread: Some(loop_thread),
            command_tasks,
        })
    }
}

/// Control handle for a running node.
///
/// Dropping it requests a stop; the loop thread exits at its next tick
/// boundary.
#[derive(Debug)]
pub struct NodeHandle {
    stop: StopHandle,
    state: ActionState,
    topics: Topics,
    loop_thread: Option<thread::JoinHandle<Result<u64, BridgeError>>>,
    command_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl NodeHandle {
    /// A clonable stop flag, e.g. for a signal handler.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn action_state(&self) -> ActionState {
        self.state.clone()
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// The loop has exited, either stopped or failed.
    pub fn is_finished(&self) -> bool {
        self.loop_thread
            .as_ref()
            .is_none_or(thread::JoinHandle::is_finished)
    }

    /// Request a stop and wait for the loop to finish.
    ///
    /// # Errors
    ///
    /// See [`NodeHandle::join`].
    pub fn shutdown(self) -> Result<u64, BridgeError> {
        self.stop.stop();
        self.join()
    }

    /// Wait for the loop to exit on its own (stop flag or fatal error) and
    /// detach the command handlers.  Returns the number of completed ticks.
    ///
    /// # Errors
    ///
    /// The loop's fatal error, or [`BridgeError::Engine`] if the loop thread
    /// panicked.
    pub fn join(mut self) -> Result<u64, BridgeError> {
        let result = match self.loop_thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(BridgeError::engine("loop", "simulation thread panicked"))),
            None => Err(BridgeError::engine("loop", "simulation thread already joined")),
        };
        self.abort_command_tasks();
        info!(ok = result.is_ok(), "node stopped");
        result
    }

    fn abort_command_tasks(&mut self) {
        for task in self.command_tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.stop.stop();
        self.abort_command_tasks();
        if self.loop_thread.is_some() {
            debug!("node handle dropped; loop stops at the next tick");
        }
    }
}
