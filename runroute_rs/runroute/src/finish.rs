//! Checkered finish-flag marker, rasterised to RGBA.

use crate::RouteError;

const CELLS: u32 = 4;
const LIGHT: [u8; 3] = [0xff, 0xff, 0xff];
const DARK: [u8; 3] = [0x22, 0x22, 0x22];
const RING: [u8; 3] = [0xff, 0xff, 0xff];
const RING_WIDTH: f64 = 1.5;

/// Square RGBA icon, row-major, 4 bytes per pixel, anchored at its centre.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishIcon {
    size: u32,
    rgba: Vec<u8>,
}

impl FinishIcon {
    /// Draw a 4x4 checkerboard clipped to a circle with a thin white ring.
    pub fn generate(size: u32) -> Result<Self, RouteError> {
        if size == 0 {
            return Err(RouteError::InvalidParameter(
                "finish icon size must be positive".into(),
            ));
        }
        let radius = f64::from(size) / 2.0;
        let cell = f64::from(size) / f64::from(CELLS);
        // Ring stroke is centred half a pixel inside the clip edge.
        let ring_inner = radius - 0.5 - RING_WIDTH / 2.0;

        let mut rgba = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let cx = f64::from(x) + 0.5;
                let cy = f64::from(y) + 0.5;
                let dist = (cx - radius).hypot(cy - radius);
                let coverage = (radius - dist + 0.5).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    rgba.extend_from_slice(&[0, 0, 0, 0]);
                    continue;
                }
                let rgb = if dist >= ring_inner {
                    RING
                } else {
                    let col = ((cx / cell) as u32).min(CELLS - 1);
                    let row = ((cy / cell) as u32).min(CELLS - 1);
                    if (row + col) % 2 == 0 {
                        LIGHT
                    } else {
                        DARK
                    }
                };
                rgba.extend_from_slice(&rgb);
                rgba.push((coverage * 255.0).round() as u8);
            }
        }
        Ok(Self { size, rgba })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Pixel offset of the icon's anchor from its top-left corner.
    pub fn anchor(&self) -> (f64, f64) {
        let r = f64::from(self.size) / 2.0;
        (r, r)
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.rgba
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size || y >= self.size {
            return None;
        }
        let idx = ((y * self.size + x) * 4) as usize;
        let px = &self.rgba[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }
}
