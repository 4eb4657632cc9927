//! Axis-aligned partition extents.

use glam::DVec3;
use partix_core::{ConfigError, PeriodicBox};

/// Half-open axis-aligned box `[min, max)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    min: DVec3,
    max: DVec3,
}

impl Extent {
    /// Create an extent. Every component must be finite with `min < max`.
    pub fn new(min: DVec3, max: DVec3) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "extent",
                reason: "non-finite corner".into(),
            });
        }
        if !min.cmplt(max).all() {
            return Err(ConfigError::InvalidParameter {
                name: "extent",
                reason: format!("min {min} is not below max {max} on every axis"),
            });
        }
        Ok(Self { min, max })
    }

    /// The whole box as a single extent.
    pub fn whole(pbox: &PeriodicBox) -> Self {
        Self {
            min: DVec3::ZERO,
            max: pbox.size(),
        }
    }

    /// Lower corner (inclusive).
    pub fn min(&self) -> DVec3 {
        self.min
    }

    /// Upper corner (exclusive).
    pub fn max(&self) -> DVec3 {
        self.max
    }

    /// Whether `p` lies in `[min, max)` on every axis.
    pub fn contains(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmplt(self.max).all()
    }

    /// Whether this extent lies inside the periodic box.
    pub fn fits_in(&self, pbox: &PeriodicBox) -> bool {
        self.min.cmpge(DVec3::ZERO).all() && self.max.cmple(pbox.size()).all()
    }

    /// Require at least `reach` of width on every axis along which the
    /// box is split. Replicas are only exchanged with adjacent
    /// partitions, so a narrower extent would miss partners two cells
    /// away.
    pub fn check_reach(&self, pbox: &PeriodicBox, reach: f64) -> Result<(), ConfigError> {
        let width = self.max - self.min;
        let size = pbox.size();
        for axis in 0..3 {
            if width[axis] < size[axis] && width[axis] < reach {
                return Err(ConfigError::OutOfRange {
                    name: "partition_width",
                    value: width[axis],
                    min: reach,
                    max: size[axis],
                });
            }
        }
        Ok(())
    }
}
