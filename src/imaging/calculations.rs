//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Largest dimensions within `bounds` that keep the aspect ratio of
/// `original`. Never upscales: an original already inside the box comes
/// back unchanged.
///
/// Each axis is constrained independently (scale to the width limit, scale
/// to the height limit) and the smaller result wins on both axes, with the
/// scaled side rounded to the nearest pixel.
///
/// # Examples
/// ```
/// # use picstory::imaging::fit_within;
/// // 4000x3000 into the 800x600 box → 800x600
/// assert_eq!(fit_within((4000, 3000), (800, 600)), (800, 600));
///
/// // Portrait 3000x4000 is height-limited → 450x600
/// assert_eq!(fit_within((3000, 4000), (800, 600)), (450, 600));
///
/// // Already small → unchanged
/// assert_eq!(fit_within((320, 200), (800, 600)), (320, 200));
/// ```
pub fn fit_within(original: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    let (max_w, max_h) = bounds;

    // Constrained by width
    let (mut w1, mut h1) = (orig_w, orig_h);
    if orig_w > max_w {
        h1 = (max_w as f64 / orig_w as f64 * orig_h as f64).round() as u32;
        w1 = max_w;
    }

    // Constrained by height
    let (mut w2, mut h2) = (orig_w, orig_h);
    if orig_h > max_h {
        w2 = (max_h as f64 / orig_h as f64 * orig_w as f64).round() as u32;
        h2 = max_h;
    }

    // Extreme aspect ratios can round a side to zero
    (w1.min(w2).max(1), h1.min(h2).max(1))
}

/// Whether `target` is strictly smaller than `original` on either axis.
pub fn needs_resize(original: (u32, u32), target: (u32, u32)) -> bool {
    target.0 < original.0 || target.1 < original.1
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // fit_within tests
    // =========================================================================

    #[test]
    fn fit_landscape_matching_box_aspect() {
        assert_eq!(fit_within((4000, 3000), (800, 600)), (800, 600));
    }

    #[test]
    fn fit_wide_landscape_is_width_limited() {
        // 3:2 → 800 wide, 533 high
        assert_eq!(fit_within((3000, 2000), (800, 600)), (800, 533));
    }

    #[test]
    fn fit_portrait_is_height_limited() {
        assert_eq!(fit_within((3000, 4000), (800, 600)), (450, 600));
    }

    #[test]
    fn fit_square() {
        assert_eq!(fit_within((1000, 1000), (400, 300)), (300, 300));
    }

    #[test]
    fn fit_small_image_unchanged() {
        assert_eq!(fit_within((320, 200), (800, 600)), (320, 200));
    }

    #[test]
    fn fit_only_height_too_big() {
        // 700x900 fits the width but not the height of 800x600
        assert_eq!(fit_within((700, 900), (800, 600)), (467, 600));
    }

    #[test]
    fn fit_extreme_aspect_never_zero() {
        assert_eq!(fit_within((10000, 1), (100, 75)), (100, 1));
    }

    #[test]
    fn fit_never_exceeds_box_or_upscales() {
        let boxes = [(800, 600), (600, 450), (400, 300), (300, 225), (200, 150), (100, 75)];
        let originals = [
            (1, 1),
            (99, 3000),
            (640, 480),
            (801, 601),
            (1024, 768),
            (2448, 3264),
            (5000, 200),
            (6000, 4000),
        ];
        for bounds in boxes {
            for original in originals {
                let (w, h) = fit_within(original, bounds);
                assert!(w <= bounds.0 && h <= bounds.1, "{original:?} in {bounds:?}");
                assert!(w <= original.0 && h <= original.1, "{original:?} upscaled");
            }
        }
    }

    // =========================================================================
    // needs_resize tests
    // =========================================================================

    #[test]
    fn needs_resize_only_when_smaller() {
        assert!(needs_resize((800, 600), (400, 300)));
        assert!(!needs_resize((320, 200), (320, 200)));
    }
}
