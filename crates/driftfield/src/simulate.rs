use anyhow::{Context, Result};
use fieldconfig::FieldConfig;
use particles::{
    CountingHost, FieldController, FixedStepTimeSource, HeadlessBackend, HeadlessSurface,
    ResourceLedger, TickOutcome, TimeSource, Viewport,
};
use serde::Serialize;

use crate::cli::{parse_surface_size, SimulateArgs};
use crate::run::apply_field_args;

const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);

/// What a headless run observed. Printed as text or JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub variant: String,
    pub seed: u64,
    pub ticks: u64,
    pub rendered: u64,
    pub layers: usize,
    pub particles: usize,
    pub edges_last: usize,
    pub edges_max: usize,
    pub edge_cap: usize,
    pub max_abs_component: f32,
    pub boundary: f32,
    pub finite: bool,
    pub allocations: u64,
    pub releases: u64,
    pub live_after_teardown: u64,
}

pub fn run(args: SimulateArgs, mut config: FieldConfig) -> Result<SimulationSummary> {
    if !(args.dt.is_finite() && args.dt > 0.0) {
        anyhow::bail!("--dt must be a positive number of seconds, got {}", args.dt);
    }
    apply_field_args(&args.field, &mut config);
    let (width, height) = match args.size.as_deref() {
        Some(spec) => parse_surface_size(spec)?,
        None => DEFAULT_VIEWPORT,
    };

    let resolved = config
        .resolve(args.field.variant.as_deref())
        .context("failed to resolve field configuration")?;
    let ledger = ResourceLedger::new();
    let mut controller = FieldController::<HeadlessBackend>::new(
        config,
        HeadlessSurface::new(),
        Viewport::new(width, height),
        ledger.clone(),
    );
    let mut host = CountingHost::default();
    if let Some(variant) = args.field.variant.as_deref() {
        controller.set_variant(variant, &mut host)?;
    }
    controller.set_speaking(args.field.speaking);
    controller.set_enabled(true, &mut host)?;
    if let Some((x, y)) = args.pointer {
        controller.handle_pointer(x, y);
    }

    let mut time = FixedStepTimeSource::new(args.dt);
    let mut edges_last = 0;
    let mut edges_max = 0;
    for _ in 0..args.ticks {
        match controller.on_frame(time.sample(), &mut host) {
            TickOutcome::Rendered { edges } => {
                edges_last = edges;
                edges_max = edges_max.max(edges);
            }
            TickOutcome::Skipped => {}
            TickOutcome::Stopped => break,
        }
    }

    let field = controller
        .field()
        .context("particle field did not mount")?;
    let layers = field.state().layers();
    let layer_count = layers.len();
    let particles = layers.particle_count();
    let finite = layers.all_finite();
    let max_abs_component = layers.max_abs_component();

    controller.shutdown()?;
    let report = controller.last_report().unwrap_or_default();
    tracing::debug!(ticks = report.ticks, host_requests = host.requests, "simulation finished");

    Ok(SimulationSummary {
        variant: resolved.variant,
        seed: resolved.seed,
        ticks: report.ticks,
        rendered: report.rendered,
        layers: layer_count,
        particles,
        edges_last,
        edges_max,
        edge_cap: resolved.connection_cap,
        max_abs_component,
        boundary: resolved.boundary,
        finite,
        allocations: ledger.allocated_total(),
        releases: ledger.released_total(),
        live_after_teardown: ledger.live(),
    })
}

pub fn print(summary: &SimulationSummary, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(summary).context("failed to serialise summary")?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Simulation summary:");
    println!("  variant:        {}", summary.variant);
    println!("  seed:           {}", summary.seed);
    println!("  ticks:          {} ({} rendered)", summary.ticks, summary.rendered);
    println!("  particles:      {} in {} layers", summary.particles, summary.layers);
    println!(
        "  edges:          {} last, {} max (cap {})",
        summary.edges_last, summary.edges_max, summary.edge_cap
    );
    println!(
        "  max |coord|:    {:.3} (boundary {})",
        summary.max_abs_component, summary.boundary
    );
    println!("  finite:         {}", summary.finite);
    println!(
        "  resources:      {} allocated, {} released, {} live",
        summary.allocations, summary.releases, summary.live_after_teardown
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::FieldArgs;
    use fieldconfig::LayerSettings;

    fn small_config() -> FieldConfig {
        let mut config = FieldConfig::default();
        config.field.glow_particle_count = 8;
        config.field.layers = vec![
            LayerSettings {
                name: "far".into(),
                count: 40,
                base_depth: -60.0,
                size: 1.0,
                speed_factor: 0.5,
                opacity: 0.4,
                radius: None,
            },
            LayerSettings {
                name: "near".into(),
                count: 30,
                base_depth: 0.0,
                size: 2.0,
                speed_factor: 1.0,
                opacity: 0.8,
                radius: None,
            },
        ];
        config
    }

    fn args(ticks: u64) -> SimulateArgs {
        SimulateArgs {
            field: FieldArgs::default(),
            ticks,
            dt: 0.016,
            pointer: Some((0.25, -0.25)),
            size: None,
            json: true,
        }
    }

    #[test]
    fn headless_run_stays_bounded_and_releases_everything() {
        let summary = run(args(120), small_config()).unwrap();
        assert_eq!(summary.ticks, 120);
        assert_eq!(summary.rendered, 120);
        assert_eq!(summary.particles, 8 + 40 + 30);
        assert!(summary.finite);
        assert!(summary.max_abs_component <= summary.boundary + 1e-3);
        assert!(summary.edges_max <= summary.edge_cap);
        assert!(summary.allocations > 0);
        assert_eq!(summary.allocations, summary.releases);
        assert_eq!(summary.live_after_teardown, 0);
    }

    #[test]
    fn same_seed_gives_identical_summaries() {
        let first = run(args(60), small_config()).unwrap();
        let second = run(args(60), small_config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_non_positive_step() {
        let mut bad = args(1);
        bad.dt = 0.0;
        assert!(run(bad, small_config()).is_err());
    }

    #[test]
    fn unknown_variant_fails() {
        let mut bad = args(1);
        bad.field.variant = Some("zzz".into());
        assert!(run(bad, small_config()).is_err());
    }
}
