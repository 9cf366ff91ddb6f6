//! Fillbench Render
//!
//! Software drawing into mapped buffers: the ARGB painter, the paced grid
//! workload and the client-only throughput probes.

pub mod canvas;
pub mod grid;
pub mod probe;

pub use canvas::{Canvas, Color, Composite};
pub use grid::{GridWorkload, DEFAULT_SLICES};
pub use probe::{run_probe, Probe, ProbeResult, PROBE_LOOPS};
