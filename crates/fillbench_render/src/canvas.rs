//! Software painter over an ARGB8888 pixel target
//!
//! Pixels are little-endian `0xAARRGGBB` words with straight (not
//! premultiplied) alpha, so each pixel is stored as `[B, G, R, A]`.

use fillbench_core::PixelTarget;
use glam::IVec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn grey(level: u8, a: u8) -> Self {
        Self::rgba(level, level, level, a)
    }

    pub fn argb(self) -> u32 {
        u32::from_be_bytes([self.a, self.r, self.g, self.b])
    }

    pub fn from_argb(word: u32) -> Self {
        let [a, r, g, b] = word.to_be_bytes();
        Self { r, g, b, a }
    }

    fn to_bytes(self) -> [u8; 4] {
        self.argb().to_le_bytes()
    }

    fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::from_argb(u32::from_le_bytes(bytes))
    }
}

/// How a drawn pixel combines with the one underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Composite {
    /// Replace the destination, alpha included.
    Source,
    #[default]
    SourceOver,
}

/// Straight-alpha source-over.
pub fn over(dst: Color, src: Color) -> Color {
    match src.a {
        0 => return dst,
        255 => return src,
        _ => {}
    }

    let sa = u32::from(src.a);
    // Destination weight, scaled by 255.
    let dw = mul_div255(u32::from(dst.a), 255 - sa);
    let out_a = sa + dw;
    if out_a == 0 {
        return Color::TRANSPARENT;
    }

    let channel = |s: u8, d: u8| -> u8 {
        let numer = u32::from(s) * sa + u32::from(d) * dw;
        ((numer + out_a / 2) / out_a).min(255) as u8
    };

    Color {
        r: channel(src.r, dst.r),
        g: channel(src.g, dst.g),
        b: channel(src.b, dst.b),
        a: out_a.min(255) as u8,
    }
}

fn mul_div255(x: u32, y: u32) -> u32 {
    (x * y + 127) / 255
}

pub struct Canvas<'a> {
    pixels: &'a mut [u8],
    width: i32,
    height: i32,
    stride: usize,
}

impl<'a> Canvas<'a> {
    pub fn new(target: &'a mut PixelTarget<'_>) -> Self {
        let width = i32::try_from(target.width()).unwrap_or(i32::MAX);
        let height = i32::try_from(target.height()).unwrap_or(i32::MAX);
        let stride = target.stride() as usize;
        Self {
            pixels: target.pixels_mut(),
            width,
            height,
            stride,
        }
    }

    pub fn size(&self) -> IVec2 {
        IVec2::new(self.width, self.height)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        let offset = self.offset(x, y)?;
        let bytes = self.pixels.get(offset..offset + 4)?;
        Some(Color::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn clear(&mut self, color: Color) {
        self.fill_rect(IVec2::ZERO, self.size(), color, Composite::Source);
    }

    /// Fill the rectangle at `origin` of `size`, clipped to the canvas.
    pub fn fill_rect(&mut self, origin: IVec2, size: IVec2, color: Color, mode: Composite) {
        let min = origin.max(IVec2::ZERO);
        let max = (origin + size).min(self.size());
        if min.x >= max.x || min.y >= max.y {
            return;
        }

        let opaque = mode == Composite::Source || color.a == 255;
        let bytes = color.to_bytes();
        let (x0, x1) = (min.x as usize * 4, max.x as usize * 4);

        for y in min.y..max.y {
            let row_start = y as usize * self.stride;
            let row = &mut self.pixels[row_start + x0..row_start + x1];
            for pixel in row.chunks_exact_mut(4) {
                if opaque {
                    pixel.copy_from_slice(&bytes);
                } else {
                    let dst = Color::from_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]);
                    pixel.copy_from_slice(&over(dst, color).to_bytes());
                }
            }
        }
    }

    /// One-pixel line from `from` to `to`, both ends included.
    pub fn draw_line(&mut self, from: IVec2, to: IVec2, color: Color) {
        let delta = (to - from).abs();
        let step = IVec2::new(
            if from.x < to.x { 1 } else { -1 },
            if from.y < to.y { 1 } else { -1 },
        );
        let mut err = delta.x - delta.y;
        let mut point = from;

        loop {
            self.plot(point, color);
            if point == to {
                break;
            }
            let e2 = 2 * err;
            if e2 > -delta.y {
                err -= delta.y;
                point.x += step.x;
            }
            if e2 < delta.x {
                err += delta.x;
                point.y += step.y;
            }
        }
    }

    fn plot(&mut self, point: IVec2, color: Color) {
        let Some(offset) = self.offset(point.x, point.y) else {
            return;
        };
        let pixel = &mut self.pixels[offset..offset + 4];
        let dst = Color::from_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]);
        pixel.copy_from_slice(&over(dst, color).to_bytes());
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.stride + x as usize * 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn with_canvas(width: u32, height: u32, paint: impl FnOnce(&mut Canvas<'_>)) -> Vec<u8> {
        let stride = width * 4;
        let mut pixels = vec![0u8; (stride * height) as usize];
        let mut target = PixelTarget::new(&mut pixels, width, height, stride);
        paint(&mut Canvas::new(&mut target));
        pixels
    }

    fn word(pixels: &[u8], width: u32, x: u32, y: u32) -> u32 {
        let words: &[u32] = bytemuck::cast_slice(pixels);
        words[(y * width + x) as usize]
    }

    #[test]
    fn argb_word_layout() {
        assert_eq!(Color::rgba(0x11, 0x22, 0x33, 0x44).argb(), 0x4411_2233);
        assert_eq!(Color::rgb(1, 2, 3).to_bytes(), [3, 2, 1, 255]);
    }

    #[test]
    fn over_edge_cases() {
        let dst = Color::rgba(10, 20, 30, 40);
        assert_eq!(over(dst, Color::TRANSPARENT), dst);
        assert_eq!(over(dst, Color::rgb(1, 2, 3)), Color::rgb(1, 2, 3));
        assert_eq!(over(Color::TRANSPARENT, Color::rgba(100, 110, 120, 200)), Color::rgba(100, 110, 120, 200));
    }

    #[test]
    fn over_on_opaque_stays_opaque() {
        let out = over(Color::rgb(0, 0, 0), Color::rgba(255, 255, 255, 128));
        assert_eq!(out.a, 255);
        assert!((127..=129).contains(&out.r));
    }

    #[test]
    fn clear_uses_source_composition() {
        let pixels = with_canvas(4, 2, |canvas| {
            canvas.fill_rect(IVec2::ZERO, IVec2::new(4, 2), Color::rgb(9, 9, 9), Composite::Source);
            canvas.clear(Color::TRANSPARENT);
        });
        assert!(pixels.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn fill_rect_is_clipped() {
        let pixels = with_canvas(4, 4, |canvas| {
            canvas.fill_rect(IVec2::new(2, 2), IVec2::new(10, 10), Color::rgb(255, 0, 0), Composite::SourceOver);
        });
        assert_eq!(word(&pixels, 4, 1, 1), 0);
        assert_eq!(word(&pixels, 4, 3, 3), 0xffff_0000);
        assert_eq!(word(&pixels, 4, 2, 3), 0xffff_0000);
    }

    #[test]
    fn diagonal_line_hits_both_ends() {
        let pixels = with_canvas(8, 8, |canvas| {
            canvas.draw_line(IVec2::new(5, 0), IVec2::new(0, 5), Color::grey(7, 255));
        });
        for i in 0..=5 {
            assert_eq!(word(&pixels, 8, 5 - i, i), 0xff07_0707);
        }
        assert_eq!(word(&pixels, 8, 6, 0), 0);
    }

    #[test]
    fn padded_stride_leaves_padding_alone() {
        let (width, height, stride) = (2u32, 2u32, 12u32);
        let mut pixels = vec![0xaau8; (stride * height) as usize];
        let mut target = PixelTarget::new(&mut pixels, width, height, stride);
        Canvas::new(&mut target).clear(Color::TRANSPARENT);

        assert!(pixels[8..12].iter().all(|&byte| byte == 0xaa));
        assert!(pixels[0..8].iter().all(|&byte| byte == 0));
    }

    proptest! {
        #[test]
        fn over_never_lowers_alpha(
            dst in any::<[u8; 4]>(),
            src in any::<[u8; 4]>(),
        ) {
            let dst = Color::from_bytes(dst);
            let src = Color::from_bytes(src);
            let out = over(dst, src);
            prop_assert!(out.a >= dst.a.max(src.a));
        }

        #[test]
        fn line_stays_inside_canvas(
            x0 in -20i32..20, y0 in -20i32..20,
            x1 in -20i32..20, y1 in -20i32..20,
        ) {
            // Must not panic when endpoints fall outside.
            with_canvas(8, 8, |canvas| {
                canvas.draw_line(IVec2::new(x0, y0), IVec2::new(x1, y1), Color::BLACK);
            });
        }
    }
}
