//! Pixel-budget enforcement for memory-constrained model families.
//!
//! The wan21 family runs out of VRAM above a fixed pixel count, so
//! requested dimensions are uniformly scaled down to fit the budget
//! and snapped to the latent tile size. Scaling never goes *up*: a
//! small request stays small.

use crate::error::CoreError;

/// Hard ceiling on width x height for the resource-bounded family.
pub const PIXEL_BUDGET: u64 = 350_000;

/// Latent tiling requires both dimensions to be multiples of this.
pub const LATENT_ALIGN: u32 = 8;

/// Maximum dimension (width or height) accepted from callers.
const MAX_DIMENSION: u32 = 7680;

/// Validate that width and height are positive and within bounds.
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), CoreError> {
    if width == 0 || height == 0 {
        return Err(CoreError::Validation(
            "Width and height must be greater than 0".to_string(),
        ));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CoreError::Validation(format!(
            "Dimensions must not exceed {MAX_DIMENSION}px (got {width}x{height})"
        )));
    }
    Ok(())
}

/// Snap a dimension down to the latent tile size, never below one tile.
fn align_down(dim: u32) -> u32 {
    std::cmp::max(dim - dim % LATENT_ALIGN, LATENT_ALIGN)
}

/// Scale `(width, height)` uniformly so the result fits `budget`
/// pixels, with both dimensions aligned to [`LATENT_ALIGN`].
///
/// Deterministic. Never scales up, and neither output dimension
/// exceeds its requested value. Alignment always rounds down so the
/// budget holds after snapping.
pub fn fit_pixel_budget(width: u32, height: u32, budget: u64) -> (u32, u32) {
    let pixels = width as u64 * height as u64;
    if pixels <= budget {
        return (align_down(width), align_down(height));
    }

    let scale = (budget as f64 / pixels as f64).sqrt();
    let scaled_w = ((width as f64) * scale).floor() as u32;
    let scaled_h = ((height as f64) * scale).floor() as u32;
    (align_down(scaled_w.max(1)), align_down(scaled_h.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_budget_invariants(req_w: u32, req_h: u32) {
        let (w, h) = fit_pixel_budget(req_w, req_h, PIXEL_BUDGET);
        assert_eq!(w % LATENT_ALIGN, 0, "{req_w}x{req_h}: width not aligned");
        assert_eq!(h % LATENT_ALIGN, 0, "{req_w}x{req_h}: height not aligned");
        assert!(
            w as u64 * h as u64 <= PIXEL_BUDGET,
            "{req_w}x{req_h}: {w}x{h} over budget"
        );
        assert!(w <= req_w.max(LATENT_ALIGN) && h <= req_h.max(LATENT_ALIGN));
        assert!(w >= LATENT_ALIGN && h >= LATENT_ALIGN);
    }

    #[test]
    fn small_request_passes_through_aligned() {
        assert_eq!(fit_pixel_budget(512, 512, PIXEL_BUDGET), (512, 512));
        assert_eq!(fit_pixel_budget(500, 300, PIXEL_BUDGET), (496, 296));
    }

    #[test]
    fn oversized_request_scaled_down() {
        let (w, h) = fit_pixel_budget(1920, 1080, PIXEL_BUDGET);
        assert!(w < 1920 && h < 1080);
        assert!(w as u64 * h as u64 <= PIXEL_BUDGET);
    }

    #[test]
    fn never_scales_up() {
        let (w, h) = fit_pixel_budget(64, 64, PIXEL_BUDGET);
        assert_eq!((w, h), (64, 64));
    }

    #[test]
    fn aspect_ratio_roughly_preserved() {
        let (w, h) = fit_pixel_budget(1600, 900, PIXEL_BUDGET);
        let requested = 1600.0 / 900.0;
        let got = w as f64 / h as f64;
        assert!((got - requested).abs() / requested < 0.05);
    }

    #[test]
    fn invariants_hold_across_a_spread_of_requests() {
        for (w, h) in [
            (1, 1),
            (8, 8),
            (512, 512),
            (593, 593),
            (640, 640),
            (1024, 1024),
            (1920, 1080),
            (1080, 1920),
            (7680, 4320),
            (350, 1001),
        ] {
            assert_budget_invariants(w, h);
        }
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            fit_pixel_budget(1920, 1080, PIXEL_BUDGET),
            fit_pixel_budget(1920, 1080, PIXEL_BUDGET)
        );
    }

    // -- validate_dimensions --

    #[test]
    fn zero_dimension_rejected() {
        assert!(validate_dimensions(0, 512).is_err());
        assert!(validate_dimensions(512, 0).is_err());
    }

    #[test]
    fn oversized_dimension_rejected() {
        assert!(validate_dimensions(7681, 512).is_err());
    }

    #[test]
    fn normal_dimensions_accepted() {
        assert!(validate_dimensions(512, 512).is_ok());
        assert!(validate_dimensions(7680, 4320).is_ok());
    }
}
