mod cli;
mod control;
mod paths;
mod run;
mod simulate;

use std::path::Path;

use anyhow::Result;
use cli::{Command, ConfigAction};
use fieldconfig::FieldConfig;
use paths::ConfigOrigin;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Simulate(args)) => {
            let (config, origin) = paths::load_config(args.field.config.as_deref())?;
            tracing::debug!(config = %origin, ticks = args.ticks, dt = args.dt, "headless simulation");
            let json = args.json;
            let summary = simulate::run(args, config)?;
            simulate::print(&summary, json)
        }
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action),
        None => run::run(cli.run),
    }
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { file } => run_config_check(file.as_deref()),
        ConfigAction::Print { file } => {
            let (config, _) = paths::load_config(file.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigAction::Where => {
            match paths::config_dir() {
                Some(dir) => println!("config dir: {}", dir.display()),
                None => println!("config dir: (unavailable)"),
            }
            println!("effective:  {}", paths::locate_config(None));
            Ok(())
        }
    }
}

fn run_config_check(file: Option<&Path>) -> Result<()> {
    let (config, origin) = paths::load_config(file)?;
    if origin == ConfigOrigin::Defaults {
        println!("No configuration file found; built-in defaults are valid.");
    } else {
        println!("{origin}: ok");
    }
    describe_config(&config)
}

fn describe_config(config: &FieldConfig) -> Result<()> {
    println!("  seed:     {}", config.seed);
    println!("  variant:  {} (available: {})", config.variant, config.variants().join(", "));
    let resolved = config.resolve(None)?;
    println!("  layers:");
    for layer in &resolved.layers {
        println!(
            "    {:<8} count={:<6} depth={:<8} radius={:<8.1} size={}",
            layer.name, layer.count, layer.base_depth, layer.radius, layer.size
        );
    }
    println!(
        "  graph:    threshold={} cap={} stride={}",
        resolved.connection_threshold, resolved.connection_cap, resolved.connection_stride
    );
    println!("  boundary: {}", resolved.boundary);
    Ok(())
}
