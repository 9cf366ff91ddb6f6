//! Fillbench Runtime
//!
//! Binary that measures how fast a Wayland client can keep a surface fed
//! from host-memory (`wl_shm`) buffers versus GPU-shared (DMA-BUF) buffers.

use anyhow::{Context as _, Result};
use clap::Parser;
use fillbench_core::{
    Bench, Clock, HarnessConfig, Harness, HeapAllocator, MonotonicClock, RunReport, Session,
    SimulatedCompositor, Strategy,
};
use fillbench_render::{run_probe, GridWorkload, Probe};
use fillbench_services::BenchSettings;
use fillbench_wayland::{WaylandConfig, WaylandSession};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fillbench", version)]
struct Cli {
    /// Compositor name, echoed in the report.
    compositor: Option<String>,

    /// Buffer width in pixels.
    width: Option<u32>,

    /// Buffer height in pixels.
    height: Option<u32>,

    /// Surface buffer scale.
    scale: Option<u32>,

    /// JSON settings file, applied before the flags below.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds each paced run lasts.
    #[arg(long)]
    budget_secs: Option<u64>,

    /// Idle milliseconds before each paced run.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Grid cells per axis in the paced workload.
    #[arg(long)]
    slices: Option<u32>,

    /// Seed of the workload colour stream.
    #[arg(long)]
    seed: Option<u64>,

    /// DRM render node for GPU-shared buffers.
    #[arg(long)]
    drm_device: Option<PathBuf>,

    /// Refresh rate of the simulated compositor.
    #[arg(long)]
    refresh_hz: Option<u32>,

    /// Run against an in-process compositor with heap buffers.
    #[arg(long)]
    headless: bool,

    /// Skip the client-only drawing probes.
    #[arg(long)]
    skip_probes: bool,
}

impl Cli {
    /// Defaults, then the settings file, then flags.
    fn settings(&self) -> Result<BenchSettings> {
        let mut settings = match &self.config {
            Some(path) => BenchSettings::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => BenchSettings::default(),
        };

        if let Some(compositor) = &self.compositor {
            settings.compositor = compositor.clone();
        }
        override_with(&mut settings.width, self.width);
        override_with(&mut settings.height, self.height);
        override_with(&mut settings.scale, self.scale);
        override_with(&mut settings.budget_secs, self.budget_secs);
        override_with(&mut settings.settle_ms, self.settle_ms);
        override_with(&mut settings.slices, self.slices);
        override_with(&mut settings.seed, self.seed);
        if let Some(path) = &self.drm_device {
            settings.drm_device = Some(path.clone());
        }
        override_with(&mut settings.refresh_hz, self.refresh_hz);
        settings.headless |= self.headless;
        settings.skip_probes |= self.skip_probes;

        settings.validate().context("invalid settings")?;
        Ok(settings)
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Cli::parse().settings()?;
    tracing::info!(
        version = fillbench_core::VERSION,
        compositor = %settings.compositor,
        width = settings.width,
        height = settings.height,
        scale = settings.scale,
        headless = settings.headless,
        "fillbench starting"
    );

    let harness = Harness::new(
        MonotonicClock,
        HarnessConfig {
            budget: settings.budget(),
            settle: settings.settle(),
        },
    );

    if settings.headless {
        let session = SimulatedCompositor::with_refresh_hz(MonotonicClock, settings.refresh_hz);
        let bench = Bench::new(
            session,
            &mut HeapAllocator::new(),
            settings.width,
            settings.height,
            harness,
        )
        .context("allocating buffer pools")?;
        run(bench, &settings)
    } else {
        let config = WaylandConfig {
            scale: settings.scale,
            drm_device: settings.drm_device.clone(),
            ..WaylandConfig::default()
        };
        let session = WaylandSession::connect(&config).context("connecting to the compositor")?;
        let bench =
            Bench::with_session_allocator(session, settings.width, settings.height, harness)
                .context("allocating buffer pools")?;
        run(bench, &settings)
    }
}

fn run<S: Session, C: Clock>(mut bench: Bench<S, C>, settings: &BenchSettings) -> Result<()> {
    if settings.skip_probes {
        tracing::info!("skipping client-only probes");
    } else {
        run_probes(&mut bench)?;
    }

    let mut workload = GridWorkload::new(settings.slices, settings.seed);
    let reports = bench.run_all(&mut workload).context("paced run failed")?;
    print_summary(&settings.compositor, &reports);
    Ok(())
}

/// Draw straight into buffer 0 of each pool, before anything is submitted.
fn run_probes<S: Session, C: Clock>(bench: &mut Bench<S, C>) -> Result<()> {
    for probe in Probe::standard() {
        for strategy in Strategy::ALL {
            let buffer = bench.pool_mut(strategy).buffer_mut(0);
            run_probe(buffer, probe)
                .with_context(|| format!("probe '{probe}' on {strategy} buffer"))?;
        }
    }
    Ok(())
}

fn print_summary(compositor: &str, reports: &[RunReport]) {
    println!("compositor: {compositor}");
    for report in reports {
        println!(
            "{}: {} frames in {:.2}s = {:.1} fps, {} writes, avg write {:?}",
            report.strategy,
            report.frames,
            report.elapsed_secs(),
            report.fps(),
            report.writes,
            report.average_write(),
        );
    }

    if let [host, gpu] = reports {
        if host.fps() > 0.0 {
            println!("{} / {} fps ratio: {:.2}", gpu.strategy, host.strategy, gpu.fps() / host.fps());
        }
    }
}
