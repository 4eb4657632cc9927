//! Periodic box geometry.

use glam::DVec3;

use crate::error::ConfigError;

/// An axis-aligned box `[0, size)` with periodic boundaries on every axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodicBox {
    size: DVec3,
    half: DVec3,
}

impl PeriodicBox {
    /// Create a box, rejecting non-finite or non-positive sizes.
    pub fn new(size: DVec3) -> Result<Self, ConfigError> {
        for (axis, v) in size.to_array().into_iter().enumerate() {
            if !v.is_finite() || v <= 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name: "box_size",
                    reason: format!("axis {axis} has size {v}"),
                });
            }
        }
        Ok(Self {
            size,
            half: size * 0.5,
        })
    }

    /// Box edge lengths.
    pub fn size(&self) -> DVec3 {
        self.size
    }

    /// Minimum-image separation vector pointing from `from` to `to`.
    ///
    /// Applies a single wrap per axis, so the result is exact only when
    /// both points lie inside the box.
    pub fn separation(&self, from: DVec3, to: DVec3) -> DVec3 {
        let mut r = to - from;
        for axis in 0..3 {
            if r[axis] > self.half[axis] {
                r[axis] -= self.size[axis];
            } else if r[axis] < -self.half[axis] {
                r[axis] += self.size[axis];
            }
        }
        r
    }

    /// Squared minimum-image distance between two points.
    pub fn distance_squared(&self, a: DVec3, b: DVec3) -> f64 {
        self.separation(a, b).length_squared()
    }

    /// Map a point that is at most one box length outside into `[0, size)`.
    ///
    /// Points further out are left outside; [`contains`](Self::contains)
    /// reports them.
    pub fn wrap(&self, p: DVec3) -> DVec3 {
        let mut w = p;
        for axis in 0..3 {
            let l = self.size[axis];
            if w[axis] >= l {
                w[axis] -= l;
            } else if w[axis] < 0.0 {
                w[axis] += l;
                // -ε + L can round up to exactly L
                if w[axis] >= l {
                    w[axis] = 0.0;
                }
            }
        }
        w
    }

    /// Whether `p` is finite and inside `[0, size)` on every axis.
    pub fn contains(&self, p: DVec3) -> bool {
        (0..3).all(|axis| p[axis].is_finite() && p[axis] >= 0.0 && p[axis] < self.size[axis])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cube(l: f64) -> PeriodicBox {
        PeriodicBox::new(DVec3::splat(l)).unwrap()
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert!(PeriodicBox::new(DVec3::new(1.0, 0.0, 1.0)).is_err());
        assert!(PeriodicBox::new(DVec3::new(1.0, f64::NAN, 1.0)).is_err());
        assert!(PeriodicBox::new(DVec3::new(-1.0, 1.0, 1.0)).is_err());
    }

    #[test]
    fn separation_uses_minimum_image() {
        let b = cube(10.0);
        let r = b.separation(DVec3::new(9.5, 0.0, 0.0), DVec3::new(0.5, 0.0, 0.0));
        assert!((r.x - 1.0).abs() < 1e-12);
        let r = b.separation(DVec3::new(0.5, 0.0, 0.0), DVec3::new(9.5, 0.0, 0.0));
        assert!((r.x + 1.0).abs() < 1e-12);
    }

    #[test]
    fn wrap_maps_box_length_to_zero() {
        let b = cube(10.0);
        assert_eq!(b.wrap(DVec3::new(10.0, 3.0, 0.0)).x, 0.0);
        assert!(b.contains(b.wrap(DVec3::new(10.0, 3.0, 0.0))));
    }

    #[test]
    fn wrap_of_tiny_negative_stays_inside() {
        let b = cube(10.0);
        let w = b.wrap(DVec3::new(-1e-300, 1.0, 1.0));
        assert!(b.contains(w));
    }

    #[test]
    fn contains_rejects_nan() {
        let b = cube(10.0);
        assert!(!b.contains(DVec3::new(f64::NAN, 1.0, 1.0)));
    }

    proptest! {
        #[test]
        fn wrap_lands_inside(x in -9.99f64..19.99, y in -9.99f64..19.99, z in -9.99f64..19.99) {
            let b = cube(10.0);
            prop_assert!(b.contains(b.wrap(DVec3::new(x, y, z))));
        }

        #[test]
        fn separation_is_antisymmetric_and_bounded(
            ax in 0.0f64..10.0, ay in 0.0f64..10.0, az in 0.0f64..10.0,
            bx in 0.0f64..10.0, by in 0.0f64..10.0, bz in 0.0f64..10.0,
        ) {
            let b = cube(10.0);
            let p = DVec3::new(ax, ay, az);
            let q = DVec3::new(bx, by, bz);
            let r = b.separation(p, q);
            prop_assert!(r.abs().max_element() <= 5.0 + 1e-12);
            let back = b.separation(q, p);
            // Antisymmetric except where a component sits exactly on the half box.
            for axis in 0..3 {
                if (r[axis].abs() - 5.0).abs() > 1e-9 {
                    prop_assert!((r[axis] + back[axis]).abs() < 1e-9);
                }
            }
        }
    }
}
