use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use nopp_core::{ColorImage, Mask, NoppError, NoppResult};
use nopp_detect::regions;

/// Share of the highlight colour in blended pill pixels
pub const OVERLAY_ALPHA: f64 = 0.3;
const HIGHLIGHT: [u8; 3] = [0, 255, 0];
const MIN_MARKER_RADIUS: i32 = 2;

/// Image with pill pixels tinted green and a circle around every pill
pub fn render_overlay(image: &ColorImage, mask: &Mask) -> NoppResult<RgbImage> {
    let (w, h) = image.dimensions();
    if (mask.width, mask.height) != (w as usize, h as usize) {
        return Err(NoppError::invalid_input(format!(
            "mask {}x{} does not match image {}x{}",
            mask.width, mask.height, w, h
        )));
    }
    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if mask.get(x as usize, y as usize) {
            for c in 0..3 {
                let blended = (1.0 - OVERLAY_ALPHA) * pixel.0[c] as f64 + OVERLAY_ALPHA * HIGHLIGHT[c] as f64;
                pixel.0[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    for region in regions(mask) {
        let (cx, cy) = region.centroid;
        let radius = (region.equivalent_radius().round() as i32 + 1).max(MIN_MARKER_RADIUS);
        draw_hollow_circle_mut(&mut out, (cx.round() as i32, cy.round() as i32), radius, Rgb(HIGHLIGHT));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_and_marker() {
        let image = ColorImage::from_pixel(30, 30, Rgb([100, 100, 100]));
        let mask = Mask::from_fn(30, 30, |x, y| (12..18).contains(&x) && (12..18).contains(&y));
        let out = render_overlay(&image, &mask).unwrap();
        let [r, g, b] = out.get_pixel(14, 14).0;
        assert_eq!((r, b), (70, 70));
        assert!((146..=147).contains(&g));
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100]);
        let marked = out.pixels().filter(|p| p.0 == HIGHLIGHT).count();
        assert!(marked > 0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let image = ColorImage::new(10, 10);
        assert!(render_overlay(&image, &Mask::new(5, 10)).is_err());
    }
}
