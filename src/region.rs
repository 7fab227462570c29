//! Region membership test consumed by the spatial filter
//!
//! The feed only needs a yes/no answer per coordinate. The default region is
//! the bounding box stored in the settings file; anything implementing
//! [`RegionTest`] (including plain closures) can be plugged in instead.
//!
//! Boxes crossing the anti-meridian or a pole are not supported.

use serde::{Deserialize, Serialize};

pub trait RegionTest: Send + Sync {
    fn contains(&self, lat: f64, lon: f64) -> bool;
}

impl<F> RegionTest for F
where
    F: Fn(f64, f64) -> bool + Send + Sync,
{
    fn contains(&self, lat: f64, lon: f64) -> bool {
        self(lat, lon)
    }
}

/// Axis-aligned latitude/longitude box, edges excluded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl BoundingBox {
    /// Reject boxes that are inverted or wrap around the globe
    pub fn validate(&self) -> Result<(), String> {
        let values = [self.top, self.bottom, self.left, self.right];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("bounds must be finite numbers".to_string());
        }
        if self.top <= self.bottom {
            return Err(format!(
                "bounds top ({}) must be greater than bottom ({})",
                self.top, self.bottom
            ));
        }
        if self.right <= self.left {
            return Err(format!(
                "bounds right ({}) must be greater than left ({}); anti-meridian crossing is unsupported",
                self.right, self.left
            ));
        }
        Ok(())
    }
}

impl RegionTest for BoundingBox {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        lat < self.top && lat > self.bottom && lon < self.right && lon > self.left
    }
}
