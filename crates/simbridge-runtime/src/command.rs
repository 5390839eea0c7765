//! [`CommandIngestor`] – turns inbound commands into [`ActionState`] writes.
//!
//! Two independent handlers, one per command source:
//!
//! | Source | Mapping |
//! |---|---|
//! | Differential wheels `(vel_left, vel_right)` | passed through, rescaled onto the `√2` circle when its norm exceeds `√2` |
//! | Joystick `axes` | `axes[1] * (0.5, 0.5) + axes[3] * (-0.25, 0.25)`, unclamped |
//!
//! Each handler overwrites the shared slot in full.  The sources are merged
//! last-writer-wins; nothing orders a wheel command against a joystick
//! message that arrives around the same time.
//!
//! A message that cannot be mapped (too few axes, non-finite values, a payload
//! of the wrong kind for its topic) is logged and discarded.  The slot keeps
//! its previous value and the error never leaves the handler.

use std::sync::Arc;

use simbridge_middleware::{EventBus, TopicReceiver};
use simbridge_types::{
    ActionVector, BridgeError, Event, EventPayload, Joy, MAX_WHEEL_NORM, WheelsCmd,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::action_state::ActionState;

// ─────────────────────────────────────────────────────────────────────────────
// Joystick mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Forward/back axis; `+1` is full forward.
pub const JOY_FORWARD_AXIS: usize = 1;

/// Left/right axis; `+1` is full left.
pub const JOY_SIDE_AXIS: usize = 3;

const FORWARD_GAIN: ActionVector = ActionVector::new(0.5, 0.5);
const SIDE_GAIN: ActionVector = ActionVector::new(-0.25, 0.25);

// ─────────────────────────────────────────────────────────────────────────────
// Pure mappings
// ─────────────────────────────────────────────────────────────────────────────

/// Map a differential-wheel command to an action with norm at most `√2`.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedCommand`] when either velocity is not
/// finite.
pub fn wheels_to_action(topic: &str, cmd: &WheelsCmd) -> Result<ActionVector, BridgeError> {
    let action = ActionVector::new(cmd.vel_left, cmd.vel_right);
    if !action.is_finite() {
        return Err(malformed(topic, format!("non-finite wheel velocities {cmd:?}")));
    }
    if action.norm() <= MAX_WHEEL_NORM {
        return Ok(action);
    }
    // Normalise by the larger component first: `hypot` of two finite values
    // near `f64::MAX` is infinite.
    let largest = action.left.abs().max(action.right.abs());
    let unit = action.scaled(1.0 / largest);
    Ok(unit.scaled(MAX_WHEEL_NORM / unit.norm()))
}

/// Map a joystick message to an action.
///
/// Out-of-range axis values are passed through unclamped.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedCommand`] when fewer than four axes are
/// present or a used axis is not finite.
pub fn joy_to_action(topic: &str, joy: &Joy) -> Result<ActionVector, BridgeError> {
    let (Some(&forward), Some(&side)) = (joy.axes.get(JOY_FORWARD_AXIS), joy.axes.get(JOY_SIDE_AXIS))
    else {
        return Err(malformed(
            topic,
            format!("expected at least {} axes, got {}", JOY_SIDE_AXIS + 1, joy.axes.len()),
        ));
    };
    if !forward.is_finite() || !side.is_finite() {
        return Err(malformed(topic, format!("non-finite axes {:?}", joy.axes)));
    }
    Ok(FORWARD_GAIN.scaled(forward) + SIDE_GAIN.scaled(side))
}

fn malformed(topic: &str, reason: String) -> BridgeError {
    BridgeError::MalformedCommand {
        topic: topic.to_string(),
        reason,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandIngestor
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the two command handlers and the topics they listen on.
#[derive(Debug)]
pub struct CommandIngestor {
    state: ActionState,
    wheel_cmd_topic: String,
    joy_topic: String,
}

impl CommandIngestor {
    /// Create handlers writing to `state` for the given resolved topics.
    pub fn new(
        state: ActionState,
        wheel_cmd_topic: impl Into<String>,
        joy_topic: impl Into<String>,
    ) -> Self {
        Self {
            state,
            wheel_cmd_topic: wheel_cmd_topic.into(),
            joy_topic: joy_topic.into(),
        }
    }

    /// Differential-wheel handler.  Returns the written action, or `None`
    /// when the command was rejected.
    pub fn handle_wheels_cmd(&self, cmd: &WheelsCmd) -> Option<ActionVector> {
        self.apply(wheels_to_action(&self.wheel_cmd_topic, cmd))
    }

    /// Joystick handler.  Returns the written action, or `None` when the
    /// message was rejected.
    pub fn handle_joy(&self, joy: &Joy) -> Option<ActionVector> {
        self.apply(joy_to_action(&self.joy_topic, joy))
    }

    /// Route a bus event to the handler for its topic.
    pub fn handle_event(&self, event: &Event) -> Option<ActionVector> {
        match &event.payload {
            EventPayload::WheelsCmd(cmd) if event.topic == self.wheel_cmd_topic => {
                self.handle_wheels_cmd(cmd)
            }
            EventPayload::Joy(joy) if event.topic == self.joy_topic => self.handle_joy(joy),
            other => self.apply(Err(malformed(
                &event.topic,
                format!("unexpected payload {}", payload_kind(other)),
            ))),
        }
    }

    /// Subscribe both handlers to `bus` and run each in its own task.
    ///
    /// Subscriptions are in place when this returns, so no message published
    /// afterwards is missed.  Must be called from within a Tokio runtime.
    pub fn spawn(self: Arc<Self>, bus: &EventBus) -> Vec<JoinHandle<()>> {
        let wheel_rx = bus.subscribe(&self.wheel_cmd_topic);
        let joy_rx = bus.subscribe(&self.joy_topic);
        vec![
            tokio::spawn(Self::pump(Arc::clone(&self), wheel_rx)),
            tokio::spawn(Self::pump(self, joy_rx)),
        ]
    }

    async fn pump(self: Arc<Self>, mut rx: TopicReceiver) {
        while let Some(event) = rx.recv().await {
            self.handle_event(&event);
        }
        debug!(topic = rx.topic(), "command subscription closed");
    }

    fn apply(&self, result: Result<ActionVector, BridgeError>) -> Option<ActionVector> {
        match result {
            Ok(action) => {
                self.state.write(action);
                debug!(left = action.left, right = action.right, "action updated");
                Some(action)
            }
            Err(e) => {
                warn!(error = %e, "rejected command; keeping previous action");
                None
            }
        }
    }
}

fn payload_kind(payload: &EventPayload) -> &'static str {
    match payload {
        EventPayload::WheelsCmd(_) => "WheelsCmd",
        EventPayload::Joy(_) => "Joy",
        EventPayload::CompressedImage(_) => "CompressedImage",
    }
}
