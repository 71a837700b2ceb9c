//! Geometry of spaces and the rescaling between walls.

use serde::{Deserialize, Serialize};

/// Overall dimensions of a space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    /// Width in pixels.
    pub w: i64,
    /// Height in pixels.
    pub h: i64,
}

impl Extent {
    /// Extent of `w` by `h`.
    pub const fn new(w: i64, h: i64) -> Self {
        Self { w, h }
    }
}

/// An axis-aligned rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: i64,
    /// Top edge.
    pub y: i64,
    /// Width.
    pub w: i64,
    /// Height.
    pub h: i64,
}

impl Rect {
    /// Rectangle at (`x`, `y`) of size `w` by `h`.
    pub const fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }
}

/// Map a rectangle on the primary wall onto a secondary wall.
///
/// Each axis is scaled independently by `secondary / primary`, so a
/// rectangle covering a given fraction of the primary lands on the same
/// fraction of the secondary even when the aspect ratios differ. Every
/// component is floored. An axis with a non-positive primary dimension
/// is left unscaled.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn rescale_geometry(primary: Extent, secondary: Extent, x: i64, y: i64, w: i64, h: i64) -> Rect {
    let factor = |p: i64, s: i64| if p > 0 { s as f64 / p as f64 } else { 1.0 };
    let wf = factor(primary.w, secondary.w);
    let hf = factor(primary.h, secondary.h);
    let scale = |v: i64, f: f64| (v as f64 * f).floor() as i64;
    Rect {
        x: scale(x, wf),
        y: scale(y, hf),
        w: scale(w, wf),
        h: scale(h, hf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_width_only() {
        let r = rescale_geometry(Extent::new(100, 50), Extent::new(200, 50), 10, 10, 20, 10);
        assert_eq!(r, Rect::new(20, 10, 40, 10));
    }

    #[test]
    fn identity_when_same_extent() {
        let e = Extent::new(1920, 1080);
        assert_eq!(rescale_geometry(e, e, 5, 6, 7, 8), Rect::new(5, 6, 7, 8));
    }

    #[test]
    fn components_are_floored() {
        let r = rescale_geometry(Extent::new(3, 3), Extent::new(2, 2), 1, 2, 4, 5);
        // 0.66, 1.33, 2.66, 3.33
        assert_eq!(r, Rect::new(0, 1, 2, 3));
    }

    #[test]
    fn negative_offsets_floor_downwards() {
        let r = rescale_geometry(Extent::new(4, 4), Extent::new(2, 2), -3, -1, 4, 4);
        assert_eq!(r, Rect::new(-2, -1, 2, 2));
    }

    #[test]
    fn zero_primary_leaves_axis_unscaled() {
        let r = rescale_geometry(Extent::new(0, 10), Extent::new(500, 20), 3, 3, 3, 3);
        assert_eq!(r, Rect::new(3, 6, 3, 6));
    }
}
