//! Client-only drawing probes
//!
//! Each probe paints directly into one buffer, without the compositor, and
//! repeats its drawing `PROBE_LOOPS` times. Fenced buffers are bracketed by a
//! single write fence around all repetitions.

use crate::canvas::{Canvas, Color, Composite};
use fillbench_core::{Buffer, FenceError, PixelTarget, Strategy, Workload};
use glam::IVec2;
use std::fmt;
use std::time::{Duration, Instant};

pub const PROBE_LOOPS: u32 = 10;

/// Alpha used by the translucent probes.
pub const PROBE_ALPHA: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    OpaqueRects { slices: u32 },
    TranslucentRects { slices: u32 },
    OpaqueLines,
    TranslucentLines,
}

impl Probe {
    /// Probe order of a full report.
    pub fn standard() -> Vec<Probe> {
        let mut probes = Vec::new();
        for slices in [100, 10, 1] {
            probes.push(Probe::OpaqueRects { slices });
            probes.push(Probe::TranslucentRects { slices });
        }
        probes.push(Probe::OpaqueLines);
        probes.push(Probe::TranslucentLines);
        probes
    }

    /// Draw calls issued per repetition on a `width x height` buffer.
    pub fn calls(self, width: u32) -> u32 {
        match self {
            Probe::OpaqueRects { slices } | Probe::TranslucentRects { slices } => {
                slices * slices
            }
            Probe::OpaqueLines | Probe::TranslucentLines => width,
        }
    }

    fn alpha(self) -> u8 {
        match self {
            Probe::OpaqueRects { .. } | Probe::OpaqueLines => 255,
            Probe::TranslucentRects { .. } | Probe::TranslucentLines => PROBE_ALPHA,
        }
    }

    fn draw(self, canvas: &mut Canvas<'_>) {
        let size = canvas.size();
        let alpha = self.alpha();
        match self {
            Probe::OpaqueRects { slices } | Probe::TranslucentRects { slices } => {
                let slices = i32::try_from(slices.max(1)).unwrap_or(i32::MAX);
                let cell = size / slices;
                for x in 0..slices {
                    for y in 0..slices {
                        let color = Color::rgba(channel(x), channel(y), channel(x + y), alpha);
                        canvas.fill_rect(IVec2::new(x, y) * cell, cell, color, Composite::SourceOver);
                    }
                }
            }
            Probe::OpaqueLines | Probe::TranslucentLines => {
                for x in 0..size.x {
                    let color = Color::grey((x % 255) as u8, alpha);
                    canvas.draw_line(IVec2::new(x, 0), IVec2::new(0, x), color);
                }
            }
        }
    }
}

fn channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::OpaqueRects { slices } => write!(f, "opaque rects {slices}x{slices}"),
            Probe::TranslucentRects { slices } => write!(f, "translucent rects {slices}x{slices}"),
            Probe::OpaqueLines => f.write_str("opaque diagonal lines"),
            Probe::TranslucentLines => f.write_str("translucent diagonal lines"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub probe: Probe,
    pub strategy: Strategy,
    pub calls: u32,
    /// Mean wall time of one repetition, fence included.
    pub per_loop: Duration,
}

struct Repeat {
    probe: Probe,
    loops: u32,
}

impl Workload for Repeat {
    fn fill(&mut self, target: &mut PixelTarget<'_>) {
        let mut canvas = Canvas::new(target);
        for _ in 0..self.loops {
            self.probe.draw(&mut canvas);
        }
    }
}

/// Run one probe against `buffer`.
pub fn run_probe(buffer: &mut Buffer, probe: Probe) -> Result<ProbeResult, FenceError> {
    let mut repeat = Repeat {
        probe,
        loops: PROBE_LOOPS,
    };

    let start = Instant::now();
    buffer.write(&mut repeat)?;
    let per_loop = start.elapsed() / PROBE_LOOPS;

    let result = ProbeResult {
        probe,
        strategy: buffer.handle().strategy,
        calls: probe.calls(buffer.width()),
        per_loop,
    };
    tracing::info!(
        probe = %result.probe,
        strategy = %result.strategy,
        calls = result.calls,
        ns = result.per_loop.as_nanos() as u64,
        "probe"
    );
    Ok(result)
}
