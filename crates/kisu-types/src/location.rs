use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in the world.
///
/// Coordinates are kept as `f64` because the host reports player positions
/// with sub-block precision; storage locations are compared exactly, so the
/// same coordinate must be reused for spawn, lookup, and snapshot capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    /// Create a new coordinate.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The same column, with `y` replaced.
    pub fn with_y(self, y: f64) -> Self {
        Self { y, ..self }
    }

    /// Offset by `dy` along the vertical axis.
    pub fn above(self, dy: f64) -> Self {
        Self {
            y: self.y + dy,
            ..self
        }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_y_keeps_column() {
        let v = Vector3::new(12.5, 64.0, -3.0).with_y(318.0);
        assert_eq!(v, Vector3::new(12.5, 318.0, -3.0));
    }

    #[test]
    fn above_offsets_vertically() {
        let v = Vector3::new(0.0, 318.0, 0.0).above(1.0);
        assert_eq!(v.y, 319.0);
    }

    #[test]
    fn display_is_command_friendly() {
        assert_eq!(Vector3::new(1.0, 2.0, 3.0).to_string(), "1 2 3");
        assert_eq!(Vector3::new(1.5, 318.0, -7.25).to_string(), "1.5 318 -7.25");
    }
}
