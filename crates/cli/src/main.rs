#![deny(unsafe_code)]
//! Diagnostics CLI for the WebGL device layer.
//!
//! Subcommands:
//! - `formats` prints the pixel format table for an emulated context
//! - `caps` prints the capabilities detected on an emulated context
//! - `simulate` replays a scripted frame and reports native call counts

mod error;
mod frame;
mod logging;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use error::CliError;
use frame::{CallSummary, FrameReport, Scene};
use logging::{init_logging, LoggingConfig};
use webgl_device_core::{
    Capabilities, Device, DeviceOptions, FormatTable, PixelFormat, RecordingGl,
};

#[derive(Parser)]
#[command(name = "webgl-device", about = "WebGL device layer diagnostics")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// API generation to emulate.
    #[arg(long, global = true, value_enum, default_value_t = Generation::Webgl2)]
    generation: Generation,

    /// Extensions to advertise on top of the generation's typical set
    /// (comma separated).
    #[arg(long, global = true, value_delimiter = ',')]
    extensions: Vec<String>,

    /// Start from an empty extension set.
    #[arg(long, global = true)]
    bare: bool,

    /// Device options as a JSON file.
    #[arg(long, global = true)]
    options: Option<PathBuf>,

    /// Log filter in `env_logger` syntax; overrides RUST_LOG.
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Generation {
    Webgl1,
    Webgl2,
}

#[derive(Subcommand)]
enum Command {
    /// Print the native triple of every pixel format.
    Formats,
    /// Print the detected capabilities.
    Caps,
    /// Replay a scripted frame and report native call counts.
    Simulate {
        /// Back buffer width in pixels.
        #[arg(short = 'W', long, default_value_t = 256)]
        width: u32,

        /// Back buffer height in pixels.
        #[arg(short = 'H', long, default_value_t = 256)]
        height: u32,

        /// Number of frames to replay.
        #[arg(short, long, default_value_t = 2)]
        frames: u32,

        /// Quads drawn into the offscreen target per frame.
        #[arg(short, long, default_value_t = 8)]
        quads: u32,

        /// Lose and restore the context before this frame (1-based).
        #[arg(long)]
        lose_before: Option<u32>,
    },
}

/// Builds the emulated binding the flags describe.
fn binding(cli: &Cli) -> RecordingGl {
    let mut gl = match cli.generation {
        Generation::Webgl1 => RecordingGl::webgl1(),
        Generation::Webgl2 => RecordingGl::webgl2(),
    };
    if cli.bare {
        gl = gl.without_extensions();
    }
    let extra: Vec<&str> = cli
        .extensions
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();
    gl.with_extensions(&extra)
}

fn load_options(path: Option<&Path>) -> Result<DeviceOptions, CliError> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| CliError::Io(format!("reading {}: {e}", path.display())))?;
            Ok(DeviceOptions::from_json(&json)?)
        }
        None => Ok(DeviceOptions::default()),
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let options = load_options(cli.options.as_deref())?;

    match cli.command {
        Command::Formats => {
            let caps = Capabilities::detect(&binding(&cli), &options)?;
            let table = FormatTable::build(&caps);
            let rows: Vec<_> = PixelFormat::ALL
                .iter()
                .map(|format| (*format, table.resolve(*format).ok()))
                .collect();
            if cli.json {
                let entries: Vec<_> = rows
                    .iter()
                    .map(|(format, native)| {
                        serde_json::json!({
                            "format": format,
                            "supported": native.is_some(),
                            "native": native,
                        })
                    })
                    .collect();
                let info = serde_json::json!({
                    "generation": caps.generation.name(),
                    "formats": entries,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{} formats ({} of {} supported):", caps.generation.name(), table.len(), rows.len());
                for (format, native) in rows {
                    match native {
                        Some(n) => println!(
                            "  {:<14} internal 0x{:04X}  format 0x{:04X}  type 0x{:04X}",
                            format!("{format:?}"),
                            n.internal_format,
                            n.format,
                            n.data_type
                        ),
                        None => println!("  {:<14} unsupported", format!("{format:?}")),
                    }
                }
            }
        }
        Command::Caps => {
            let caps = Capabilities::detect(&binding(&cli), &options)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&caps)?);
            } else {
                println!("generation:          {}", caps.generation.name());
                println!("max texture size:    {}", caps.max_texture_size);
                println!("max cubemap size:    {}", caps.max_cube_map_size);
                println!("max 3D texture size: {}", caps.max_3d_texture_size);
                println!("max samples:         {}", caps.max_samples);
                println!("max draw buffers:    {}", caps.max_draw_buffers);
                println!("max anisotropy:      {}", caps.max_anisotropy);
                println!("texture units:       {}", caps.max_combined_textures);
                println!("32-bit indices:      {}", caps.index_u32);
                println!("float renderable:    {}", caps.float_renderable);
                println!("compressed families: {:?}", caps.compressed_families());
            }
        }
        Command::Simulate {
            width,
            height,
            frames,
            quads,
            lose_before,
        } => {
            let mut device = Device::new(binding(&cli), options, width, height)?;
            let scene = Scene::create(&mut device, width, height, quads)?;

            let mut reports = Vec::with_capacity(frames as usize);
            for frame in 1..=frames {
                let restored = lose_before == Some(frame);
                if restored {
                    device.lose_context();
                    device.restore_context(binding(&cli))?;
                }
                device.gl().clear_calls();
                device.reset_frame_stats();
                scene.render(&mut device)?;
                reports.push(FrameReport {
                    frame,
                    restored,
                    stats: device.frame_stats(),
                    calls: CallSummary::from_calls(&device.gl().calls()),
                    vram: device.vram(),
                });
            }
            device.destroy();

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    let marker = if report.restored { " (after restore)" } else { "" };
                    println!("frame {}{marker}:", report.frame);
                    println!(
                        "  draws {} ({} instanced), primitives {}, passes {}, skipped {}",
                        report.stats.draw_calls,
                        report.stats.instanced_draw_calls,
                        report.stats.primitives,
                        report.stats.render_passes,
                        report.stats.skipped_draws
                    );
                    println!(
                        "  native calls {}: {} state, {} uniforms, {} texture binds, {} uploads, {} program binds, {} VAO binds, {} FBO binds",
                        report.calls.total,
                        report.calls.state_changes,
                        report.calls.uniforms,
                        report.calls.texture_binds,
                        report.calls.texture_uploads,
                        report.calls.program_binds,
                        report.calls.vertex_array_binds,
                        report.calls.framebuffer_binds
                    );
                    println!(
                        "  VRAM {} bytes (textures {}, vertex {}, index {})",
                        report.vram.total(),
                        report.vram.textures,
                        report.vram.vertex_buffers,
                        report.vram.index_buffers
                    );
                }
            }
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(LoggingConfig {
        env_filter: cli.log.clone(),
        ..LoggingConfig::default()
    });
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}
