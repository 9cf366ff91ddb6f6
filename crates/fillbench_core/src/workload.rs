//! The pixel workload seam
//!
//! A workload receives a writable view of one buffer and fills it. It must
//! finish synchronously and touch nothing outside the view.

/// Writable pixels of one buffer: `height` rows of `stride` bytes, the first
/// `width * 4` bytes of each row being ARGB8888 pixels.
pub struct PixelTarget<'a> {
    pixels: &'a mut [u8],
    width: u32,
    height: u32,
    stride: u32,
}

impl<'a> PixelTarget<'a> {
    /// Wrap `pixels`, which must hold at least `stride * height` bytes.
    pub fn new(pixels: &'a mut [u8], width: u32, height: u32, stride: u32) -> Self {
        assert!(stride >= width * 4, "stride {stride} too small for width {width}");
        assert!(
            pixels.len() >= stride as usize * height as usize,
            "pixel slice shorter than stride * height"
        );
        Self {
            pixels,
            width,
            height,
            stride,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn base_address(&self) -> *const u8 {
        self.pixels.as_ptr()
    }

    pub fn pixels(&self) -> &[u8] {
        self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.pixels
    }

    /// Pixel bytes of row `y`, without the stride padding.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride as usize;
        &mut self.pixels[start..start + self.width as usize * 4]
    }
}

pub trait Workload {
    fn fill(&mut self, target: &mut PixelTarget<'_>);
}

impl<W: Workload + ?Sized> Workload for &mut W {
    fn fill(&mut self, target: &mut PixelTarget<'_>) {
        (**self).fill(target);
    }
}
