use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use renderer::{RendererConfig, WindowRuntime};
use tracing_subscriber::EnvFilter;

use crate::cli::{parse_surface_size, FieldArgs, RunArgs};
use crate::control::{parse_command, ControlCommand};
use crate::paths;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: RunArgs) -> Result<()> {
    let (mut field, origin) = paths::load_config(args.field.config.as_deref())?;
    apply_field_args(&args.field, &mut field);

    let surface_size = match args.size.as_deref() {
        Some(spec) => parse_surface_size(spec)?,
        None => RendererConfig::default().surface_size,
    };
    let renderer_config = RendererConfig {
        surface_size,
        target_fps: args.fps.filter(|fps| *fps > 0.0),
        antialiasing: args.antialias,
        field,
        variant: args.field.variant.clone(),
        speaking: args.field.speaking,
        enabled: !args.disabled,
        show_window: !args.hidden,
        ..RendererConfig::default()
    };
    tracing::info!(
        config = %origin,
        width = surface_size.0,
        height = surface_size.1,
        enabled = renderer_config.enabled,
        "starting driftfield window"
    );

    let runtime = WindowRuntime::spawn(renderer_config)?;
    let commands = spawn_stdin_reader()?;
    drive(&runtime, commands);
    runtime.shutdown()
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn apply_field_args(args: &FieldArgs, config: &mut fieldconfig::FieldConfig) {
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
}

/// Forwards stdin commands until `quit`, or until the window closes on its
/// own. Once stdin hits EOF the window keeps running until it is closed.
fn drive(runtime: &WindowRuntime, commands: Receiver<String>) {
    let mut stdin_open = true;
    while !runtime.is_finished() {
        if !stdin_open {
            thread::sleep(POLL_INTERVAL);
            continue;
        }
        let line = match commands.recv_timeout(POLL_INTERVAL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("stdin closed; waiting for the window to close");
                stdin_open = false;
                continue;
            }
        };
        match parse_command(&line) {
            Ok(Some(ControlCommand::Quit)) => {
                tracing::info!("quit requested");
                return;
            }
            Ok(Some(ControlCommand::Field(command))) => {
                if let Err(err) = runtime.send(command) {
                    tracing::warn!(error = %err, "failed to forward command");
                    return;
                }
            }
            Ok(None) => {}
            Err(message) => tracing::warn!("{message}"),
        }
    }
    tracing::debug!("window closed");
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("driftfield-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to spawn stdin reader")?;
    Ok(rx)
}
