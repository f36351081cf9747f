use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::Antialiasing;

#[derive(Parser, Debug)]
#[command(
    name = "driftfield",
    author,
    version,
    about = "Ambient particle field renderer",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Options shared by the window host and headless runs.
#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    /// Field configuration file; overrides `$DRIFTFIELD_CONFIG_DIR/field.toml`.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Geometry and palette preset to mount (e.g. `a`, `b`).
    #[arg(long, value_name = "NAME")]
    pub variant: Option<String>,

    /// Start with the speaking animation profile.
    #[arg(long)]
    pub speaking: bool,

    /// Override the configured random seed.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub field: FieldArgs,

    /// Open the window with the field unmounted; `enable` on stdin or `E` mounts it.
    #[arg(long)]
    pub disabled: bool,

    /// Window size in physical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Optional FPS cap (0=uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Anti-aliasing policy: `auto`, `off`, or an explicit MSAA sample count (e.g. `4`).
    #[arg(
        long,
        value_name = "MODE",
        value_parser = parse_antialias,
        default_value = "auto"
    )]
    pub antialias: Antialiasing,

    /// Create the window without showing it.
    #[arg(long)]
    pub hidden: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the field headless for a fixed number of ticks and print a summary.
    Simulate(SimulateArgs),
    /// Inspect field configuration files.
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub field: FieldArgs,

    /// Number of frames to run.
    #[arg(long, value_name = "N", default_value_t = 600)]
    pub ticks: u64,

    /// Fixed time step in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.016)]
    pub dt: f32,

    /// Pointer position in normalized device coordinates (e.g. `0.5,-0.25`).
    #[arg(long, value_name = "X,Y", value_parser = parse_pointer, allow_hyphen_values = true)]
    pub pointer: Option<(f32, f32)>,

    /// Viewport the camera projects into.
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate a configuration file and summarise its layers and variants.
    Check {
        /// File to check; defaults to the discovered configuration.
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML.
    Print {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Print where configuration is looked up.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_antialias(value: &str) -> Result<Antialiasing, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("anti-alias mode must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "default" => Ok(Antialiasing::Auto),
        "off" | "none" | "disable" | "disabled" | "0" => Ok(Antialiasing::Off),
        _ => {
            let samples: u32 = normalized.parse().map_err(|_| {
                format!("invalid anti-alias sample count '{trimmed}'; use auto/off or 2/4/8/16")
            })?;

            if samples == 1 {
                return Ok(Antialiasing::Off);
            }

            if !matches!(samples, 2 | 4 | 8 | 16) {
                return Err(format!(
                    "unsupported sample count {samples}; supported values are 2, 4, 8, or 16"
                ));
            }

            Ok(Antialiasing::Samples(samples))
        }
    }
}

pub fn parse_pointer(value: &str) -> Result<(f32, f32), String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| "expected X,Y (e.g. 0.5,-0.25)".to_string())?;
    let x: f32 = x
        .trim()
        .parse()
        .map_err(|_| format!("invalid pointer x '{}'", x.trim()))?;
    let y: f32 = y
        .trim()
        .parse()
        .map_err(|_| format!("invalid pointer y '{}'", y.trim()))?;
    if !x.is_finite() || !y.is_finite() {
        return Err("pointer coordinates must be finite".into());
    }
    Ok((x, y))
}

pub fn parse_surface_size(spec: &str) -> anyhow::Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_antialias_modes() {
        assert_eq!(parse_antialias("auto").unwrap(), Antialiasing::Auto);
        assert_eq!(parse_antialias("OFF").unwrap(), Antialiasing::Off);
        assert_eq!(parse_antialias("1").unwrap(), Antialiasing::Off);
        assert_eq!(parse_antialias("4").unwrap(), Antialiasing::Samples(4));
        assert!(parse_antialias("3").is_err());
        assert!(parse_antialias("").is_err());
    }

    #[test]
    fn parses_pointer_pairs() {
        assert_eq!(parse_pointer("0.5,-0.25").unwrap(), (0.5, -0.25));
        assert_eq!(parse_pointer(" 1 , 0 ").unwrap(), (1.0, 0.0));
        assert!(parse_pointer("0.5").is_err());
        assert!(parse_pointer("a,b").is_err());
        assert!(parse_pointer("NaN,0").is_err());
    }

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_surface_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_surface_size("640X480").unwrap(), (640, 480));
        assert!(parse_surface_size("0x10").is_err());
        assert!(parse_surface_size("wide").is_err());
    }

    #[test]
    fn simulate_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "driftfield",
            "simulate",
            "--ticks",
            "10",
            "--pointer",
            "-0.5,0.5",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Simulate(args)) => {
                assert_eq!(args.ticks, 10);
                assert_eq!(args.pointer, Some((-0.5, 0.5)));
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
