use serde::{Deserialize, Serialize};

/// A position in surface-local coordinates (pixels, y grows downwards)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Measured size of the surface hosting a knob
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
    pub knob_diameter: f64,
}

impl Surface {
    pub fn new(width: f64, height: f64, knob_diameter: f64) -> Self {
        Self {
            width,
            height,
            knob_diameter,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// Travel available to the knob center before it leaves the surface.
    /// Zero or negative for surfaces that are too small to move in.
    pub fn max_radius(&self) -> f64 {
        self.width / 2.0 - self.knob_diameter / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_radius_follow_size() {
        let surface = Surface::new(200.0, 160.0, 60.0);
        assert_eq!(surface.center(), Point::new(100.0, 80.0));
        assert_eq!(surface.max_radius(), 70.0);
    }

    #[test]
    fn knob_larger_than_surface_has_no_travel() {
        assert!(Surface::new(40.0, 40.0, 60.0).max_radius() < 0.0);
        assert_eq!(Surface::default().max_radius(), 0.0);
    }
}
