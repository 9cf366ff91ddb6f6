//! The paced workload: a grid of translucent random rectangles

use crate::canvas::{Canvas, Color, Composite};
use fillbench_core::{PixelTarget, Workload};
use glam::IVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SLICES: u32 = 100;

/// Alpha of every grid cell.
pub const CELL_ALPHA: u8 = 200;

/// Clears the target to transparent, then draws `slices x slices` cells of
/// random colour over it. Cell size is the target size divided by `slices`,
/// so a remainder strip along the right and bottom edges stays clear.
pub struct GridWorkload {
    slices: u32,
    rng: StdRng,
    fills: u64,
}

impl GridWorkload {
    pub fn new(slices: u32, seed: u64) -> Self {
        Self {
            slices: slices.max(1),
            rng: StdRng::seed_from_u64(seed),
            fills: 0,
        }
    }

    pub fn slices(&self) -> u32 {
        self.slices
    }

    pub fn fills(&self) -> u64 {
        self.fills
    }

    fn next_color(&mut self) -> Color {
        Color::rgba(
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            CELL_ALPHA,
        )
    }
}

impl Default for GridWorkload {
    fn default() -> Self {
        Self::new(DEFAULT_SLICES, 0)
    }
}

impl Workload for GridWorkload {
    fn fill(&mut self, target: &mut PixelTarget<'_>) {
        let mut canvas = Canvas::new(target);
        canvas.clear(Color::TRANSPARENT);

        let slices = i32::try_from(self.slices).unwrap_or(i32::MAX);
        let cell = canvas.size() / slices;
        for x in 0..slices {
            for y in 0..slices {
                let color = self.next_color();
                canvas.fill_rect(IVec2::new(x, y) * cell, cell, color, Composite::SourceOver);
            }
        }
        self.fills += 1;
    }
}
