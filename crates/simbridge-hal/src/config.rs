//! Construction-time parameters of the built-in simulator.

use serde::{Deserialize, Serialize};
use simbridge_types::BridgeError;

use crate::maps;

/// Fixed simulator parameters.  Set once at construction, never changed at
/// runtime.
///
/// Every field has a default, so a partial `[simulator]` TOML table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Random seed for spawn poses and domain randomisation.
    pub seed: u64,
    /// Map identifier, see [`maps::names`].
    pub map_name: String,
    /// Steps after which the engine reports `done` by itself.  Set far above
    /// any real session length to disable.
    pub max_steps: u64,
    /// Perturb rendering colours on every reset.
    pub domain_rand: bool,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Maximum deviation of the spawn heading from the lane direction.
    pub accept_start_angle_deg: f64,
    /// Expose the full robot pose in every step's info.
    pub full_transparency: bool,
    /// Apply the lens-distortion effect to rendered frames.
    pub distortion: bool,
    /// Physics rate of the simulator itself (one `step` = `1 / frame_rate` s).
    pub frame_rate: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 123,
            map_name: "loop_empty".to_string(),
            max_steps: 500_001,
            domain_rand: false,
            camera_width: 640,
            camera_height: 480,
            accept_start_angle_deg: 4.0,
            full_transparency: true,
            distortion: true,
            frame_rate: 30.0,
        }
    }
}

impl SimulatorConfig {
    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if maps::lookup(&self.map_name).is_none() {
            return Err(BridgeError::Config(format!(
                "unknown map {:?} (known: {})",
                self.map_name,
                maps::names().join(", ")
            )));
        }
        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(BridgeError::Config(format!(
                "camera resolution {}x{} must be non-zero",
                self.camera_width, self.camera_height
            )));
        }
        if self.max_steps == 0 {
            return Err(BridgeError::Config("max_steps must be at least 1".to_string()));
        }
        if !self.accept_start_angle_deg.is_finite() || self.accept_start_angle_deg < 0.0 {
            return Err(BridgeError::Config(format!(
                "accept_start_angle_deg must be a non-negative number, got {}",
                self.accept_start_angle_deg
            )));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(BridgeError::Config(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SimulatorConfig::default();
        cfg.validate().expect("defaults must validate");
        assert_eq!(cfg.seed, 123);
        assert_eq!(cfg.map_name, "loop_empty");
        assert_eq!((cfg.camera_width, cfg.camera_height), (640, 480));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: SimulatorConfig = toml::from_str("map_name = \"straight_road\"\nseed = 7").unwrap();
        assert_eq!(cfg.map_name, "straight_road");
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.max_steps, 500_001);
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let unknown_map = SimulatorConfig {
            map_name: "atlantis".to_string(),
            ..Default::default()
        };
        assert!(matches!(unknown_map.validate(), Err(BridgeError::Config(_))));

        let zero_width = SimulatorConfig {
            camera_width: 0,
            ..Default::default()
        };
        assert!(zero_width.validate().is_err());

        let negative_angle = SimulatorConfig {
            accept_start_angle_deg: -1.0,
            ..Default::default()
        };
        assert!(negative_angle.validate().is_err());

        let bad_rate = SimulatorConfig {
            frame_rate: f64::NAN,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());
    }
}
