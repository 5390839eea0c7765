//! Catalogue of drivable maps for [`KinematicSim`][crate::sim::KinematicSim].
//!
//! Every map is a rectangle of square road tiles with a single lane
//! centreline.  Loop maps run the lane counter-clockwise around a rectangle
//! inset half a tile from the border; straight maps run it along +x through
//! the middle.

use std::f64::consts::{FRAC_PI_2, PI};

/// Edge length of one road tile in metres.
pub const TILE_SIZE: f64 = 0.585;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneShape {
    Straight,
    Loop,
}

/// A named map layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapSpec {
    pub name: &'static str,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub shape: LaneShape,
}

const MAPS: &[MapSpec] = &[
    MapSpec {
        name: "loop_empty",
        tiles_x: 3,
        tiles_y: 3,
        shape: LaneShape::Loop,
    },
    MapSpec {
        name: "small_loop",
        tiles_x: 2,
        tiles_y: 2,
        shape: LaneShape::Loop,
    },
    MapSpec {
        name: "straight_road",
        tiles_x: 6,
        tiles_y: 1,
        shape: LaneShape::Straight,
    },
];

/// Find a map by name.
pub fn lookup(name: &str) -> Option<&'static MapSpec> {
    MAPS.iter().find(|m| m.name == name)
}

/// Names of every known map.
pub fn names() -> Vec<&'static str> {
    MAPS.iter().map(|m| m.name).collect()
}

/// Position of a point relative to the lane centreline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneFrame {
    /// Signed distance from the centreline in metres, positive to the left
    /// of the driving direction.
    pub lateral_offset: f64,
    /// Driving direction of the lane at the nearest centreline point.
    pub tangent_rad: f64,
}

impl MapSpec {
    pub fn width(&self) -> f64 {
        f64::from(self.tiles_x) * TILE_SIZE
    }

    pub fn height(&self) -> f64 {
        f64::from(self.tiles_y) * TILE_SIZE
    }

    /// `true` while `(x, y)` lies on the map.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (0.0..=self.width()).contains(&x) && (0.0..=self.height()).contains(&y)
    }

    /// Locate `(x, y)` relative to the nearest point on the lane centreline.
    pub fn lane_frame(&self, x: f64, y: f64) -> LaneFrame {
        match self.shape {
            LaneShape::Straight => LaneFrame {
                lateral_offset: y - self.height() / 2.0,
                tangent_rad: 0.0,
            },
            LaneShape::Loop => {
                let h = TILE_SIZE / 2.0;
                let (x0, y0, x1, y1) = (h, h, self.width() - h, self.height() - h);
                // (start, end, heading) of each side, counter-clockwise.
                let sides = [
                    ((x0, y0), (x1, y0), 0.0),
                    ((x1, y0), (x1, y1), FRAC_PI_2),
                    ((x1, y1), (x0, y1), PI),
                    ((x0, y1), (x0, y0), -FRAC_PI_2),
                ];
                let mut best: Option<(f64, LaneFrame)> = None;
                for (a, b, heading) in sides {
                    let (qx, qy) = closest_on_segment((x, y), a, b);
                    let (dx, dy) = (x - qx, y - qy);
                    let dist = dx.hypot(dy);
                    let lateral = heading_cross(heading, dx, dy);
                    if best.is_none_or(|(d, _)| dist < d) {
                        best = Some((
                            dist,
                            LaneFrame {
                                lateral_offset: lateral,
                                tangent_rad: heading,
                            },
                        ));
                    }
                }
                best.map(|(_, frame)| frame).unwrap_or(LaneFrame {
                    lateral_offset: 0.0,
                    tangent_rad: 0.0,
                })
            }
        }
    }

    /// The lane segment robots are spawned on, as `(x_min, x_max, y)`; the
    /// spawn heading is always `0` (driving along +x).
    pub fn spawn_segment(&self) -> (f64, f64, f64) {
        match self.shape {
            LaneShape::Straight => (TILE_SIZE / 2.0, self.width() / 2.0, self.height() / 2.0),
            LaneShape::Loop => {
                let h = TILE_SIZE / 2.0;
                (h, self.width() - h, h)
            }
        }
    }
}

fn closest_on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let len2 = abx * abx + aby * aby;
    if len2 == 0.0 {
        return a;
    }
    let t = (((p.0 - a.0) * abx + (p.1 - a.1) * aby) / len2).clamp(0.0, 1.0);
    (a.0 + t * abx, a.1 + t * aby)
}

/// z-component of `(cos h, sin h) × (dx, dy)`.
fn heading_cross(heading: f64, dx: f64, dy: f64) -> f64 {
    heading.cos() * dy - heading.sin() * dx
}

/// Wrap an angle into `(-π, π]`.
pub fn wrap_angle(a: f64) -> f64 {
    let wrapped = (a + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI { PI } else { wrapped }
}
