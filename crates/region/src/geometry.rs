//! Pure rectangle geometry used by the region store and gesture controllers.

use crate::coords::{CanvasPoint, CanvasRect, CanvasSize};

/// Interiors intersect. Shared edges and corners do not count, and a
/// zero-area rectangle never overlaps anything.
pub fn overlaps(a: &CanvasRect, b: &CanvasRect) -> bool {
    if is_degenerate(a) || is_degenerate(b) {
        return false;
    }
    let (a_min, a_max) = (a.min(), a.max());
    let (b_min, b_max) = (b.min(), b.max());
    a_min.x() < b_max.x() && b_min.x() < a_max.x() && a_min.y() < b_max.y() && b_min.y() < a_max.y()
}

fn is_degenerate(rect: &CanvasRect) -> bool {
    !(rect.width() > 0.0 && rect.height() > 0.0)
}

/// NaN and negative values become 0.
pub fn sanitize(value: f32) -> f32 {
    if value.is_nan() || value < 0.0 {
        0.0
    } else {
        value
    }
}

/// Non-finite coordinates become 0.
pub fn sanitize_point(point: CanvasPoint) -> CanvasPoint {
    let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
    CanvasPoint::new(finite(point.x()), finite(point.y()))
}

/// Component-wise `max(size, min)` after sanitizing both sides.
pub fn clamp_min_size(size: CanvasSize, min: f32) -> CanvasSize {
    let min = sanitize(min);
    CanvasSize::new(
        sanitize(size.width()).max(min),
        sanitize(size.height()).max(min),
    )
}

/// The rectangle spanned by two corner points, whichever way they were dragged.
pub fn normalize(a: CanvasPoint, b: CanvasPoint) -> CanvasRect {
    let min = a.0.min(b.0);
    let max = a.0.max(b.0);
    CanvasRect::new(CanvasPoint(min), CanvasSize(max - min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> CanvasRect {
        CanvasRect::from_xywh(x, y, w, h)
    }

    #[test]
    fn test_overlap_is_strict() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        assert!(overlaps(&a, &rect(50.0, 50.0, 100.0, 100.0)));
        assert!(!overlaps(&a, &rect(100.0, 0.0, 100.0, 100.0)));
        assert!(!overlaps(&a, &rect(100.0, 100.0, 10.0, 10.0)));
        assert!(overlaps(&a, &rect(10.0, 10.0, 10.0, 10.0)));
    }

    #[test]
    fn test_zero_area_never_overlaps() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        assert!(!overlaps(&a, &rect(50.0, 50.0, 0.0, 0.0)));
        assert!(!overlaps(&a, &rect(50.0, 50.0, 0.0, 20.0)));
        assert!(!overlaps(&rect(50.0, 50.0, 0.0, 0.0), &a));
        assert!(!overlaps(&rect(50.0, 50.0, 0.0, 0.0), &rect(50.0, 50.0, 0.0, 0.0)));
        assert!(!overlaps(&a, &rect(0.0, 0.0, f32::NAN, 10.0)));
    }

    #[test]
    fn test_sanitize_point() {
        assert_eq!(
            sanitize_point(CanvasPoint::new(f32::NAN, f32::INFINITY)),
            CanvasPoint::new(0.0, 0.0)
        );
        assert_eq!(
            sanitize_point(CanvasPoint::new(-20.0, 35.5)),
            CanvasPoint::new(-20.0, 35.5)
        );
    }

    #[test]
    fn test_normalize_any_direction() {
        let r = normalize(CanvasPoint::new(300.0, 250.0), CanvasPoint::new(100.0, 50.0));
        assert_eq!(r, rect(100.0, 50.0, 200.0, 200.0));
    }

    #[test]
    fn test_sanitize_bad_input() {
        assert_eq!(sanitize(f32::NAN), 0.0);
        assert_eq!(sanitize(-4.0), 0.0);
        assert_eq!(
            clamp_min_size(CanvasSize::new(f32::NAN, 250.0), 100.0),
            CanvasSize::new(100.0, 250.0)
        );
    }

    proptest! {
        #[test]
        fn clamp_never_below_min(w in -1000.0f32..1000.0, h in -1000.0f32..1000.0, min in 0.0f32..500.0) {
            let clamped = clamp_min_size(CanvasSize::new(w, h), min);
            prop_assert!(clamped.width() >= min);
            prop_assert!(clamped.height() >= min);
            if w >= min {
                prop_assert_eq!(clamped.width(), w);
            }
        }

        #[test]
        fn overlap_is_symmetric(
            ax in -500.0f32..500.0, ay in -500.0f32..500.0, aw in 0.0f32..300.0, ah in 0.0f32..300.0,
            bx in -500.0f32..500.0, by in -500.0f32..500.0, bw in 0.0f32..300.0, bh in 0.0f32..300.0,
        ) {
            let a = rect(ax, ay, aw, ah);
            let b = rect(bx, by, bw, bh);
            prop_assert_eq!(overlaps(&a, &b), overlaps(&b, &a));
        }

        #[test]
        fn zero_width_overlaps_nothing(
            ax in -500.0f32..500.0, ay in -500.0f32..500.0, ah in 0.0f32..300.0,
            bx in -500.0f32..500.0, by in -500.0f32..500.0, bw in 0.0f32..300.0, bh in 0.0f32..300.0,
        ) {
            let a = rect(ax, ay, 0.0, ah);
            prop_assert!(!overlaps(&a, &rect(bx, by, bw, bh)));
        }
    }
}
