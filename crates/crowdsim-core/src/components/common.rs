//! Common geometry shared by agents and ephemeral objects.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Host clock time in milliseconds (e.g. a frame callback timestamp)
pub type Millis = f64;

/// 2D vector in playfield units
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            Self::ZERO
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn midpoint(&self, other: &Self) -> Self {
        Self {
            x: (self.x + other.x) * 0.5,
            y: (self.y + other.y) * 0.5,
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f32) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

/// Playfield rectangle with an inner margin agents never cross
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl Bounds {
    pub fn new(width: f32, height: f32, margin: f32) -> Self {
        Self {
            width,
            height,
            margin,
        }
    }

    pub fn min_x(&self) -> f32 {
        self.margin
    }
    pub fn max_x(&self) -> f32 {
        self.width - self.margin
    }
    pub fn min_y(&self) -> f32 {
        self.margin
    }
    pub fn max_y(&self) -> f32 {
        self.height - self.margin
    }

    pub fn contains(&self, point: &Vec2) -> bool {
        point.x >= self.min_x()
            && point.x <= self.max_x()
            && point.y >= self.min_y()
            && point.y <= self.max_y()
    }

    /// Clamp a point into the margin-inset rectangle, axis by axis.
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        Vec2 {
            x: point.x.clamp(self.min_x(), self.max_x()),
            y: point.y.clamp(self.min_y(), self.max_y()),
        }
    }

    /// Uniform random point inside the margins.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        Vec2 {
            x: sample_axis(rng, self.min_x(), self.max_x()),
            y: sample_axis(rng, self.min_y(), self.max_y()),
        }
    }
}

fn sample_axis<R: Rng + ?Sized>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    // A zero-width axis is legal (margin == half the size)
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

/// Cardinal facing used to pick sprite rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    #[default]
    South,
    East,
    West,
}

impl Direction {
    /// Facing implied by a velocity. The dominant axis wins, ties go horizontal.
    /// Returns `None` for a stationary velocity so callers keep the old facing.
    pub fn from_velocity(velocity: Vec2) -> Option<Self> {
        if velocity.is_zero() {
            return None;
        }
        if velocity.x.abs() >= velocity.y.abs() {
            if velocity.x >= 0.0 {
                Some(Direction::East)
            } else {
                Some(Direction::West)
            }
        } else if velocity.y > 0.0 {
            // Screen coordinates: +y points down
            Some(Direction::South)
        } else {
            Some(Direction::North)
        }
    }
}
