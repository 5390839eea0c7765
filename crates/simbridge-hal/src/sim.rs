//! In-process kinematic simulator for running the bridge without an external
//! simulation engine.
//!
//! [`KinematicSim`] models a differential-drive robot on one of the maps in
//! [`crate::maps`] and renders a synthetic forward camera view.  It is
//! deterministic for a given [`SimulatorConfig::seed`], which makes it usable
//! in headless tests and CI pipelines.
//!
//! # Example
//!
//! ```rust
//! use simbridge_hal::{KinematicSim, SimulationEngine, SimulatorConfig};
//! use simbridge_types::ActionVector;
//!
//! let mut sim = KinematicSim::new(SimulatorConfig {
//!     camera_width: 64,
//!     camera_height: 48,
//!     ..Default::default()
//! })
//! .expect("default map must load");
//!
//! let outcome = sim.step(ActionVector::new(0.5, 0.5)).expect("step must succeed");
//! assert_eq!(outcome.info.step, 1);
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simbridge_types::{ActionVector, BridgeError, Frame, PixelEncoding};
use tracing::{debug, info};

use crate::config::SimulatorConfig;
use crate::engine::{Pose, SimulationEngine, StepInfo, StepOutcome};
use crate::maps::{self, MapSpec, TILE_SIZE, wrap_angle};

// ────────────────────────────────────────────────────────────────────────────
// Constants
// ────────────────────────────────────────────────────────────────────────────

/// Wheel surface speed (m/s) for a unit wheel command.
const ROBOT_SPEED: f64 = 1.2;

/// Distance between the wheels in metres.
const WHEEL_DIST: f64 = 0.102;

/// Reward for the step that leaves the map.
const OFF_MAP_REWARD: f64 = -1000.0;

/// Reward penalty per metre of lateral offset from the lane centreline.
const LATERAL_PENALTY: f64 = 10.0;

/// Share of the frame height above the horizon.
const HORIZON_FRACTION: f64 = 0.4;

/// Brightness lost at the frame corners when distortion is enabled.
const VIGNETTE_STRENGTH: f64 = 0.35;

// ────────────────────────────────────────────────────────────────────────────
// Palette
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Palette {
    sky: [u8; 3],
    ground: [u8; 3],
    lane: [u8; 3],
    edge: [u8; 3],
}

const DEFAULT_PALETTE: Palette = Palette {
    sky: [160, 200, 235],
    ground: [70, 70, 75],
    lane: [240, 200, 40],
    edge: [235, 235, 235],
};

impl Palette {
    fn jittered(rng: &mut StdRng) -> Self {
        let mut jitter = |c: [u8; 3]| c.map(|v| (i16::from(v) + rng.gen_range(-30..=30)).clamp(0, 255) as u8);
        Palette {
            sky: jitter(DEFAULT_PALETTE.sky),
            ground: jitter(DEFAULT_PALETTE.ground),
            lane: jitter(DEFAULT_PALETTE.lane),
            edge: jitter(DEFAULT_PALETTE.edge),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// KinematicSim
// ────────────────────────────────────────────────────────────────────────────

/// Differential-drive robot on a tiled map with a synthetic camera.
pub struct KinematicSim {
    config: SimulatorConfig,
    map: &'static MapSpec,
    rng: StdRng,
    pose: Pose,
    step_count: u64,
    episode: u64,
    palette: Palette,
    /// Frame drawn by the last `step`, handed out by the next `render`.
    pending: Option<Frame>,
    frames_drawn: u64,
}

impl KinematicSim {
    /// Build a simulator and spawn the robot for the first episode.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when `config` fails validation.
    pub fn new(config: SimulatorConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        let map = maps::lookup(&config.map_name)
            .ok_or_else(|| BridgeError::Config(format!("unknown map {:?}", config.map_name)))?;
        let rng = StdRng::seed_from_u64(config.seed);
        let mut sim = Self {
            config,
            map,
            rng,
            pose: Pose {
                x: 0.0,
                y: 0.0,
                heading_rad: 0.0,
            },
            step_count: 0,
            episode: 0,
            palette: DEFAULT_PALETTE,
            pending: None,
            frames_drawn: 0,
        };
        sim.spawn();
        info!(
            map = sim.map.name,
            seed = sim.config.seed,
            width = sim.config.camera_width,
            height = sim.config.camera_height,
            "simulator ready"
        );
        Ok(sim)
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Current robot pose.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Steps taken in the current episode.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Index of the current episode.
    pub fn episode(&self) -> u64 {
        self.episode
    }

    /// Camera frames rasterised so far.
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    fn draw(&mut self) -> Frame {
        self.frames_drawn += 1;
        self.render_frame()
    }

    /// Place the robot on the map's spawn segment.
    fn spawn(&mut self) {
        self.pending = None;
        let (x_min, x_max, y) = self.map.spawn_segment();
        let x = self.rng.gen_range(x_min..=x_max);
        let max_dev = self.config.accept_start_angle_deg.to_radians();
        let heading_rad = if max_dev > 0.0 {
            self.rng.gen_range(-max_dev..=max_dev)
        } else {
            0.0
        };
        self.pose = Pose { x, y, heading_rad };
        self.step_count = 0;
        if self.config.domain_rand {
            self.palette = Palette::jittered(&mut self.rng);
        }
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            step: self.step_count,
            episode: self.episode,
            pose: self.config.full_transparency.then_some(self.pose),
        }
    }

    fn render_frame(&self) -> Frame {
        let w = self.config.camera_width as usize;
        let h = self.config.camera_height as usize;
        let mut frame = Frame::blank(
            self.config.camera_width,
            self.config.camera_height,
            PixelEncoding::Rgb8,
        );

        let horizon = (h as f64 * HORIZON_FRACTION) as usize;
        let lane = self.map.lane_frame(self.pose.x, self.pose.y);
        let heading_err = wrap_angle(self.pose.heading_rad - lane.tangent_rad);
        let (cx, cy) = ((w as f64 - 1.0) / 2.0, (h as f64 - 1.0) / 2.0);
        let max_r2 = (cx * cx + cy * cy).max(1.0);

        for row in 0..h {
            // 0 at the horizon, 1 at the bottom edge.
            let depth = if row > horizon {
                (row - horizon) as f64 / (h - horizon) as f64
            } else {
                0.0
            };
            let centre = w as f64 / 2.0
                * (1.0 + 2.0 * depth * lane.lateral_offset / TILE_SIZE + 2.0 * (1.0 - depth) * heading_err);
            let edge_half = 0.45 * w as f64 * depth;
            let stripe_half = 1.0 + 0.01 * w as f64 * depth;

            for col in 0..w {
                let mut px = if row <= horizon {
                    self.palette.sky
                } else {
                    let dx = (col as f64 - centre).abs();
                    if dx <= stripe_half {
                        self.palette.lane
                    } else if (dx - edge_half).abs() <= stripe_half {
                        self.palette.edge
                    } else {
                        self.palette.ground
                    }
                };
                if self.config.distortion {
                    let (dx, dy) = (col as f64 - cx, row as f64 - cy);
                    let k = 1.0 - VIGNETTE_STRENGTH * (dx * dx + dy * dy) / max_r2;
                    px = px.map(|c| (f64::from(c) * k) as u8);
                }
                let i = (row * w + col) * 3;
                frame.data[i..i + 3].copy_from_slice(&px);
            }
        }
        frame
    }
}

impl SimulationEngine for KinematicSim {
    fn step(&mut self, action: ActionVector) -> Result<StepOutcome, BridgeError> {
        if !action.is_finite() {
            return Err(BridgeError::engine("step", format!("non-finite action {action:?}")));
        }

        let dt = 1.0 / self.config.frame_rate;
        let vl = action.left * ROBOT_SPEED;
        let vr = action.right * ROBOT_SPEED;
        let v = (vl + vr) / 2.0;
        let omega = (vr - vl) / WHEEL_DIST;

        // Midpoint integration keeps arcs reasonably round at 30 Hz.
        let mid_heading = self.pose.heading_rad + omega * dt / 2.0;
        self.pose.x += v * mid_heading.cos() * dt;
        self.pose.y += v * mid_heading.sin() * dt;
        self.pose.heading_rad = wrap_angle(self.pose.heading_rad + omega * dt);
        self.step_count += 1;

        let on_map = self.map.contains(self.pose.x, self.pose.y);
        let reward = if on_map {
            let lane = self.map.lane_frame(self.pose.x, self.pose.y);
            v * wrap_angle(self.pose.heading_rad - lane.tangent_rad).cos()
                - LATERAL_PENALTY * lane.lateral_offset.abs()
        } else {
            OFF_MAP_REWARD
        };
        let done = !on_map || self.step_count >= self.config.max_steps;
        if done {
            debug!(
                episode = self.episode,
                step = self.step_count,
                on_map,
                "episode finished"
            );
        }

        let observation = self.draw();
        self.pending = Some(observation.clone());
        Ok(StepOutcome {
            observation,
            reward,
            done,
            info: self.info(),
        })
    }

    fn render(&mut self) -> Result<Frame, BridgeError> {
        // Nothing moves between a step and the following render.
        match self.pending.take() {
            Some(frame) => Ok(frame),
            None => Ok(self.draw()),
        }
    }

    fn reset(&mut self) -> Result<Frame, BridgeError> {
        self.episode += 1;
        self.spawn();
        Ok(self.draw())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn small(config: SimulatorConfig) -> SimulatorConfig {
        SimulatorConfig {
            camera_width: 32,
            camera_height: 24,
            ..config
        }
    }

    fn sim() -> KinematicSim {
        KinematicSim::new(small(SimulatorConfig::default())).unwrap()
    }

    #[test]
    fn render_matches_configured_resolution() {
        let mut sim = sim();
        let frame = sim.render().unwrap();
        assert_eq!((frame.width, frame.height), (32, 24));
        assert_eq!(frame.encoding, PixelEncoding::Rgb8);
        assert_eq!(frame.data.len(), 32 * 24 * 3);
    }

    #[test]
    fn render_after_step_reuses_the_observation() {
        let mut sim = sim();
        let drawn = sim.frames_drawn();
        let outcome = sim.step(ActionVector::new(0.4, 0.2)).unwrap();
        let frame = sim.render().unwrap();
        assert_eq!(frame, outcome.observation);
        assert_eq!(sim.frames_drawn(), drawn + 1);

        // A second render with no step in between draws again.
        assert_eq!(sim.render().unwrap(), frame);
        assert_eq!(sim.frames_drawn(), drawn + 2);
    }

    #[test]
    fn reset_discards_the_pending_frame() {
        let mut sim = KinematicSim::new(small(SimulatorConfig {
            domain_rand: true,
            distortion: false,
            ..Default::default()
        }))
        .unwrap();
        sim.step(ActionVector::new(1.0, 1.0)).unwrap();
        let first = sim.reset().unwrap();
        // The render reflects the new episode, not the stepped pose.
        assert_eq!(sim.render().unwrap(), first);
    }

    #[test]
    fn same_seed_gives_same_spawn() {
        assert_eq!(sim().pose(), sim().pose());
    }

    #[test]
    fn spawn_heading_stays_within_tolerance() {
        let limit = 4.0_f64.to_radians();
        for seed in 0..50 {
            let sim = KinematicSim::new(small(SimulatorConfig {
                seed,
                ..Default::default()
            }))
            .unwrap();
            assert!(sim.pose().heading_rad.abs() <= limit + 1e-12, "seed {seed}");
        }
    }

    #[test]
    fn zero_action_keeps_pose() {
        let mut sim = sim();
        let before = sim.pose();
        sim.step(ActionVector::ZERO).unwrap();
        assert_eq!(sim.pose(), before);
        assert_eq!(sim.step_count(), 1);
    }

    #[test]
    fn forward_command_moves_along_heading() {
        let mut sim = KinematicSim::new(small(SimulatorConfig {
            accept_start_angle_deg: 0.0,
            ..Default::default()
        }))
        .unwrap();
        let before = sim.pose();
        let outcome = sim.step(ActionVector::new(0.5, 0.5)).unwrap();
        let after = sim.pose();
        assert!((after.x - before.x - 0.6 / 30.0).abs() < 1e-9);
        assert!((after.y - before.y).abs() < 1e-12);
        assert!(outcome.reward > 0.0);
    }

    #[test]
    fn faster_right_wheel_turns_left() {
        let mut sim = KinematicSim::new(small(SimulatorConfig {
            accept_start_angle_deg: 0.0,
            ..Default::default()
        }))
        .unwrap();
        sim.step(ActionVector::new(-0.25, 0.25)).unwrap();
        assert!(sim.pose().heading_rad > 0.0);
    }

    #[test]
    fn leaving_the_map_ends_the_episode() {
        let mut sim = KinematicSim::new(small(SimulatorConfig {
            map_name: "straight_road".to_string(),
            ..Default::default()
        }))
        .unwrap();
        // Face +y, straight off the one-tile-wide road.
        sim.pose.heading_rad = std::f64::consts::FRAC_PI_2;
        let mut last = None;
        for _ in 0..100 {
            let outcome = sim.step(ActionVector::new(1.0, 1.0)).unwrap();
            if outcome.done {
                last = Some(outcome);
                break;
            }
        }
        let outcome = last.expect("robot must leave the road");
        assert_eq!(outcome.reward, OFF_MAP_REWARD);
    }

    #[test]
    fn max_steps_ends_the_episode() {
        let mut sim = KinematicSim::new(small(SimulatorConfig {
            max_steps: 3,
            ..Default::default()
        }))
        .unwrap();
        assert!(!sim.step(ActionVector::ZERO).unwrap().done);
        assert!(!sim.step(ActionVector::ZERO).unwrap().done);
        assert!(sim.step(ActionVector::ZERO).unwrap().done);
    }

    #[test]
    fn reset_starts_a_new_episode() {
        let mut sim = sim();
        sim.step(ActionVector::new(0.3, 0.3)).unwrap();
        sim.reset().unwrap();
        assert_eq!(sim.episode(), 1);
        assert_eq!(sim.step_count(), 0);
        let outcome = sim.step(ActionVector::ZERO).unwrap();
        assert_eq!(outcome.info.episode, 1);
        assert_eq!(outcome.info.step, 1);
    }

    #[test]
    fn pose_is_hidden_without_full_transparency() {
        let mut opaque = KinematicSim::new(small(SimulatorConfig {
            full_transparency: false,
            ..Default::default()
        }))
        .unwrap();
        assert!(opaque.step(ActionVector::ZERO).unwrap().info.pose.is_none());

        let mut transparent = sim();
        let info = transparent.step(ActionVector::ZERO).unwrap().info;
        assert_eq!(info.pose, Some(transparent.pose()));
    }

    #[test]
    fn non_finite_action_is_an_engine_error() {
        let mut sim = sim();
        let err = sim.step(ActionVector::new(f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, BridgeError::Engine { .. }));
    }

    #[test]
    fn distortion_darkens_corners() {
        let mut plain = KinematicSim::new(small(SimulatorConfig {
            distortion: false,
            ..Default::default()
        }))
        .unwrap();
        let mut lens = sim();
        let a = plain.render().unwrap();
        let b = lens.render().unwrap();
        // Top-left pixel is sky in both.
        assert!(b.data[0] < a.data[0]);
        assert_eq!(&a.data[0..3], &DEFAULT_PALETTE.sky);
    }

    #[test]
    fn domain_randomisation_changes_palette() {
        let mut sim = KinematicSim::new(small(SimulatorConfig {
            domain_rand: true,
            distortion: false,
            ..Default::default()
        }))
        .unwrap();
        let mut skies = vec![sim.render().unwrap().data[0..3].to_vec()];
        for _ in 0..5 {
            skies.push(sim.reset().unwrap().data[0..3].to_vec());
        }
        skies.dedup();
        assert!(skies.len() > 1, "palette never changed: {skies:?}");
    }
}
