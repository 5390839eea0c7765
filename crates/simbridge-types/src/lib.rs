use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Largest norm a differential-wheel command may have once normalised:
/// two independent unit-range axes give `√2`.
pub const MAX_WHEEL_NORM: f64 = std::f64::consts::SQRT_2;

/// Two-wheel actuation command consumed by the simulation engine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionVector {
    pub left: f64,
    pub right: f64,
}

impl ActionVector {
    /// The idle command every node starts with.
    pub const ZERO: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    pub const fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Euclidean norm of the `(left, right)` pair.
    pub fn norm(&self) -> f64 {
        self.left.hypot(self.right)
    }

    /// Multiply both components by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.left * factor, self.right * factor)
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }
}

impl std::ops::Add for ActionVector {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.left + rhs.left, self.right + rhs.right)
    }
}

/// Raw differential-wheel command (`duckietown_msgs/WheelsCmd` shape).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelsCmd {
    pub vel_left: f64,
    pub vel_right: f64,
}

/// Joystick state (`sensor_msgs/Joy` shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joy {
    pub axes: Vec<f64>,
    #[serde(default)]
    pub buttons: Vec<i32>,
}

/// Channel order of a raw [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelEncoding {
    Rgb8,
    Bgr8,
}

impl PixelEncoding {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        3
    }

    /// The encoding obtained by reversing the channel axis.
    pub fn reversed(self) -> Self {
        match self {
            PixelEncoding::Rgb8 => PixelEncoding::Bgr8,
            PixelEncoding::Bgr8 => PixelEncoding::Rgb8,
        }
    }
}

/// A raw rendered image, row-major, interleaved channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
    pub data: Vec<u8>,
}

impl Frame {
    /// Allocate a black frame.
    pub fn blank(width: u32, height: u32, encoding: PixelEncoding) -> Self {
        let len = width as usize * height as usize * encoding.channels();
        Self {
            width,
            height,
            encoding,
            data: vec![0; len],
        }
    }

    /// Expected buffer length for the frame's dimensions and encoding.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.encoding.channels()
    }

    /// Reverse every pixel's channel order in place (RGB → BGR and back).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Encode`] when the buffer length does not match
    /// the frame dimensions.
    pub fn into_reversed_channels(mut self) -> Result<Frame, BridgeError> {
        if self.data.len() != self.expected_len() {
            return Err(BridgeError::Encode(format!(
                "frame buffer is {} bytes, expected {} for {}x{} {:?}",
                self.data.len(),
                self.expected_len(),
                self.width,
                self.height,
                self.encoding,
            )));
        }
        for px in self.data.chunks_exact_mut(self.encoding.channels()) {
            px.reverse();
        }
        self.encoding = self.encoding.reversed();
        Ok(self)
    }
}

/// Encoded image payload (`sensor_msgs/CompressedImage` shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedImage {
    /// Codec tag, e.g. `"jpeg"`.
    pub format: String,
    pub data: Vec<u8>,
}

/// Unified event wrapper for the topic bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Fully resolved topic name, e.g. `"/simulation_wrapper_node/joy"`.
    pub topic: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(topic: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }
}

/// Variants of data routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    WheelsCmd(WheelsCmd),
    Joy(Joy),
    CompressedImage(CompressedImage),
}

/// Error type shared by every SimBridge crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    /// An inbound command could not be turned into an [`ActionVector`].
    #[error("Malformed command on {topic}: {reason}")]
    MalformedCommand { topic: String, reason: String },

    /// The simulation engine failed inside `step`, `render` or `reset`.
    #[error("Engine error during {operation}: {details}")]
    Engine { operation: String, details: String },

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Shorthand for an [`BridgeError::Engine`] error.
    pub fn engine(operation: &str, details: impl Into<String>) -> Self {
        BridgeError::Engine {
            operation: operation.to_string(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_vector_norm_and_scale() {
        let v = ActionVector::new(3.0, 4.0);
        assert!((v.norm() - 5.0).abs() < 1e-12);
        let half = v.scaled(0.5);
        assert_eq!(half, ActionVector::new(1.5, 2.0));
    }

    #[test]
    fn action_vector_add() {
        let sum = ActionVector::new(0.5, 0.5) + ActionVector::new(-0.25, 0.25);
        assert_eq!(sum, ActionVector::new(0.25, 0.75));
    }

    #[test]
    fn reversing_channels_swaps_red_and_blue() {
        let frame = Frame {
            width: 2,
            height: 1,
            encoding: PixelEncoding::Rgb8,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        let bgr = frame.clone().into_reversed_channels().unwrap();
        assert_eq!(bgr.encoding, PixelEncoding::Bgr8);
        assert_eq!(bgr.data, vec![3, 2, 1, 6, 5, 4]);
        // Reversing twice restores the original.
        assert_eq!(bgr.into_reversed_channels().unwrap(), frame);
    }

    #[test]
    fn reversing_channels_rejects_short_buffer() {
        let frame = Frame {
            width: 4,
            height: 4,
            encoding: PixelEncoding::Rgb8,
            data: vec![0; 10],
        };
        assert!(matches!(
            frame.into_reversed_channels(),
            Err(BridgeError::Encode(_))
        ));
    }

    #[test]
    fn joy_buttons_default_to_empty() {
        let joy: Joy = serde_json::from_str(r#"{"axes":[0.0,1.0,0.0,0.5]}"#).unwrap();
        assert_eq!(joy.axes.len(), 4);
        assert!(joy.buttons.is_empty());
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "/simulation_wrapper_node/wheel_cmd",
            EventPayload::WheelsCmd(WheelsCmd {
                vel_left: 0.2,
                vel_right: -0.2,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.topic, back.topic);
    }

    #[test]
    fn bridge_error_display() {
        let err = BridgeError::engine("step", "physics exploded");
        assert!(err.to_string().contains("step"));
        assert!(err.to_string().contains("physics exploded"));

        let err = BridgeError::MalformedCommand {
            topic: "/joy".to_string(),
            reason: "expected at least 4 axes".to_string(),
        };
        assert!(err.to_string().contains("/joy"));
    }
}
