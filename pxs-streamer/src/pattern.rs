//! Synthetic RGBA test pattern.

/// Horizontal slice of the full frame rendered by one producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub x: u32,
    pub width: u32,
}

impl Band {
    /// Split `width` into `count` vertical bands, the last absorbing the
    /// remainder.
    pub fn split(width: u32, count: u32) -> Vec<Band> {
        let count = count.clamp(1, width.max(1));
        let base = width / count;
        (0..count)
            .map(|i| Band {
                x: i * base,
                width: if i + 1 == count { width - i * base } else { base },
            })
            .collect()
    }
}

/// Diagonal gradient scrolling with `frame`, with a white vertical bar
/// sweeping across the full width.
pub fn render(band: Band, full_width: u32, height: u32, frame: u64) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(band.width as usize * height as usize * 4);
    let shift = (frame as u32).wrapping_mul(4);
    let bar = (frame as u32).wrapping_mul(8) % full_width.max(1);

    for y in 0..height {
        for col in 0..band.width {
            let x = band.x + col;
            if x.abs_diff(bar) < 4 {
                pixels.extend_from_slice(&[255, 255, 255, 255]);
                continue;
            }
            let r = (x.wrapping_add(shift) & 0xFF) as u8;
            let g = (y.wrapping_add(shift) & 0xFF) as u8;
            let b = (((x + y) / 4) & 0xFF) as u8;
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_cover_width() {
        let bands = Band::split(1000, 3);
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[0], Band { x: 0, width: 333 });
        assert_eq!(bands[2], Band { x: 666, width: 334 });
        assert_eq!(Band::split(10, 0), vec![Band { x: 0, width: 10 }]);
    }

    #[test]
    fn render_size_and_opacity() {
        let band = Band { x: 100, width: 50 };
        let pixels = render(band, 400, 20, 7);
        assert_eq!(pixels.len(), 50 * 20 * 4);
        assert!(pixels.chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn pattern_moves_between_frames() {
        let band = Band { x: 0, width: 32 };
        assert_ne!(render(band, 32, 8, 0), render(band, 32, 8, 1));
    }
}
