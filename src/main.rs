//! Galaxy panel CLI - capture, archive and state tooling for the Galaxy Engine.
//!
//! Provides both human-friendly and agent-friendly (robot mode) interfaces.
#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::{self, BufWriter, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use console::style;
use image::{Rgba, RgbaImage};
use serde::Serialize;
use tracing::{debug, info, warn};

use gpanel::archive::{ArchiveEntry, ArchiveWriter};
use gpanel::capture::surface::{DirectorySink, ManualTicker, StaticSurface};
use gpanel::capture::{
    CaptureMetadata, CapturePhase, CaptureScheduler, ExportCompositor, NoOverlay,
    RecordingFinisher, StartOutcome,
};
use gpanel::cli::{
    ArchiveCommand, CaptureCommand, CaptureDemoArgs, Cli, ColorCommand, Commands, CompletionsArgs,
    ConfigArgs, ScenesCommand, StateCommand,
};
use gpanel::color::{self, ColorValue};
use gpanel::config::{self, PanelConfig};
use gpanel::engine::EngineBridge;
use gpanel::engine::mock::SimulatedEngine;
use gpanel::error::{PanelError, Result, ResultExt};
use gpanel::logging::init_logging;
use gpanel::storage::{SceneLibrary, SharedStore, SnapshotSlot, StateStore, open_store};
use gpanel::sync::SyncController;

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color || !io::stdout().is_terminal() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    init_logging(cli.use_json(), cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None => print_quick_start(cli),
        Some(Commands::Color(command)) => cmd_color(cli, command),
        Some(Commands::Archive(command)) => cmd_archive(cli, command),
        Some(Commands::Capture(CaptureCommand::Demo(args))) => cmd_capture_demo(cli, args),
        Some(Commands::State(command)) => cmd_state(cli, command),
        Some(Commands::Scenes(command)) => cmd_scenes(cli, command),
        Some(Commands::Config(args)) => cmd_config(cli, args),
        Some(Commands::Version) => cmd_version(cli),
        Some(Commands::Completions(args)) => cmd_completions(args),
    }
}

// === Quick Start ===

#[allow(clippy::unnecessary_wraps)]
fn print_quick_start(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        let help = RobotQuickStart {
            tool: "gpanel",
            version: build_info::VERSION,
            description: "Capture, archive and state tooling for the Galaxy Engine control panel",
            capture: RobotCapture {
                demo: "gpanel capture demo --seconds 2 --fps 30",
                archive: "gpanel archive pack <FILES>... -o out.tar",
            },
            state: RobotState {
                show: "gpanel state show --robot",
                reset: "gpanel state reset",
                promote: "gpanel state promote",
                clear_defaults: "gpanel state clear-defaults",
            },
            scenes: RobotScenes {
                list: "gpanel scenes list --robot",
                delete: "gpanel scenes delete <ID>",
                prune: "gpanel scenes prune",
            },
            output_modes: OutputModes {
                human: "--format=text (default)",
                robot: "--robot or --format=json",
                compact: "--format=json-compact",
            },
        };
        output_json(cli, &help);
    } else {
        println!(
            "{} {} - Galaxy Engine panel tooling\n",
            style("gpanel").bold().cyan(),
            build_info::VERSION
        );
        println!("{}", style("QUICK START").bold().underlined());
        println!();
        println!("  {}  Capture a test archive", style("gpanel capture demo").green());
        println!("  {}  Pack files into a tar", style("gpanel archive pack a b -o x.tar").green());
        println!("  {}  Show stored panel state", style("gpanel state show").green());
        println!("  {}  List saved scenes", style("gpanel scenes list").green());
        println!("  {}  Packed color value", style("gpanel color pack 255 0 0").green());
        println!();
        println!("{}", style("ROBOT MODE").bold().underlined());
        println!();
        println!("  {}  JSON output", style("gpanel --robot <command>").cyan());
        println!("  {}  Quick-start JSON", style("gpanel --robot").cyan());
        println!();
        println!("Run {} for full help", style("gpanel --help").yellow());
    }
    Ok(())
}

#[derive(Serialize)]
struct RobotQuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    capture: RobotCapture,
    state: RobotState,
    scenes: RobotScenes,
    output_modes: OutputModes,
}

#[derive(Serialize)]
struct RobotCapture {
    demo: &'static str,
    archive: &'static str,
}

#[derive(Serialize)]
struct RobotState {
    show: &'static str,
    reset: &'static str,
    promote: &'static str,
    clear_defaults: &'static str,
}

#[derive(Serialize)]
struct RobotScenes {
    list: &'static str,
    delete: &'static str,
    prune: &'static str,
}

#[derive(Serialize)]
struct OutputModes {
    human: &'static str,
    robot: &'static str,
    compact: &'static str,
}

// === Color ===

#[allow(clippy::unnecessary_wraps)]
fn cmd_color(cli: &Cli, command: &ColorCommand) -> Result<()> {
    let (packed, value) = match *command {
        ColorCommand::Pack { r, g, b, a } => {
            let value = ColorValue::rgba(r, g, b, a);
            (color::pack(value), value)
        }
        ColorCommand::Unpack { value } => (value, color::unpack(value)),
    };
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "packed": packed,
                "hex": value.to_hex(),
                "r": value.r,
                "g": value.g,
                "b": value.b,
                "a": value.a,
            }),
        );
    } else {
        println!(
            "{} {:#010x}  rgba({}, {}, {}, {})  {}",
            packed,
            packed,
            value.r,
            value.g,
            value.b,
            value.a,
            style(value.to_hex()).bold()
        );
    }
    Ok(())
}

// === Archive ===

fn cmd_archive(cli: &Cli, command: &ArchiveCommand) -> Result<()> {
    let ArchiveCommand::Pack {
        files,
        output,
        mtime,
    } = command;

    let entries = files
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PanelError::ArchiveSource {
                    name: path.display().to_string(),
                    reason: "path has no file name".to_string(),
                })?;
            Ok(ArchiveEntry::file(name, path))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut writer = ArchiveWriter::new();
    if let Some(mtime) = mtime {
        writer = writer.with_mtime(*mtime);
    }
    // Encode fully before touching the output so a bad entry leaves no file.
    let bytes = writer.encode(entries)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(&bytes)?;
    out.flush()?;
    info!(path = %output.display(), entries = files.len(), bytes = bytes.len(), "Archive written");

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "path": output.display().to_string(),
                "entries": files.len(),
                "bytes": bytes.len(),
            }),
        );
    } else if !cli.quiet {
        println!(
            "{} {} ({} entries, {} bytes)",
            style("Wrote").green(),
            output.display(),
            files.len(),
            bytes.len()
        );
    }
    Ok(())
}

// === Capture ===

fn cmd_capture_demo(cli: &Cli, args: &CaptureDemoArgs) -> Result<()> {
    let config = load_config(cli)?;
    validate_demo_args(args)?;
    let fps = args.fps.unwrap_or(config.capture.fps).max(1);
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.capture.resolved_output_dir());

    let mut compositor = ExportCompositor::new(config.capture.background()?);
    if let Some(profile) = &config.capture.icc_profile {
        let icc = fs::read(profile)
            .with_context(|| format!("Failed to read ICC profile {}", profile.display()))?;
        compositor = compositor.with_icc_profile(icc);
    }

    let engine = Arc::new(SimulatedEngine::new());
    let bridge = EngineBridge::new(engine);
    let finisher = RecordingFinisher::new(bridge, Arc::new(NoOverlay), config.recording);

    let surface = Arc::new(
        StaticSurface::new(args.width, args.height, ColorValue::TRANSPARENT)
            .with_ancestry(vec![ColorValue::TRANSPARENT]),
    );
    let ticker = Arc::new(ManualTicker::new());
    let sink = Arc::new(DirectorySink::new(&output_dir));
    let scheduler =
        CaptureScheduler::new(surface.clone(), ticker.clone(), sink.clone(), compositor)
            .with_finisher(finisher);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = runtime.block_on(drive_demo(&scheduler, &surface, &ticker, args, fps))?;

    let path = sink.path_for(&report.file_name);
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "path": path.display().to_string(),
                "fps": report.fps,
                "width": report.width,
                "height": report.height,
                "frame_count": report.frame_count,
                "dropped_frames": report.dropped_frames,
                "bytes": report.archive_bytes,
            }),
        );
    } else if !cli.quiet {
        println!(
            "{} {} frames at {} fps ({}x{}) into {}",
            style("Captured").green(),
            report.frame_count,
            report.fps,
            report.width,
            report.height,
            path.display()
        );
        if report.dropped_frames > 0 {
            println!(
                "{}: {} frames failed to capture",
                style("Note").yellow(),
                report.dropped_frames
            );
        }
    }
    Ok(())
}

fn validate_demo_args(args: &CaptureDemoArgs) -> Result<()> {
    if !(args.seconds.is_finite() && args.seconds > 0.0) {
        return Err(PanelError::ConfigInvalid(format!(
            "--seconds must be positive, got {}",
            args.seconds
        )));
    }
    if args.width == 0 || args.height == 0 {
        return Err(PanelError::ConfigInvalid(format!(
            "surface must be at least 1x1, got {}x{}",
            args.width, args.height
        )));
    }
    Ok(())
}

/// Paint and tick until the scheduler stops itself or the tick budget runs out.
async fn drive_demo(
    scheduler: &CaptureScheduler,
    surface: &StaticSurface,
    ticker: &ManualTicker,
    args: &CaptureDemoArgs,
    fps: u32,
) -> Result<CaptureMetadata> {
    match scheduler.start(Some(args.seconds), fps)? {
        StartOutcome::Started => {}
        other => {
            return Err(PanelError::Other(format!("capture did not start: {other:?}")));
        }
    }
    // Failed frames never count toward the ceiling, so ticks are bounded too.
    let tick_budget = (args.seconds * f64::from(fps)).ceil() as u64;
    let mut phase = scheduler.subscribe();
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
    let mut step = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if step >= tick_budget {
                    break;
                }
                surface.set_image(paint_galaxy(args.width, args.height, step as u32));
                step += 1;
                ticker.fire();
            }
            _ = phase.wait_for(|p| *p == CapturePhase::Idle) => break,
        }
    }
    debug!(ticks = step, "Demo capture finished");
    if let Some(report) = scheduler.stop().await? {
        return Ok(report);
    }
    // The ceiling already triggered a stop; wait for it to deliver.
    scheduler.wait_idle().await;
    scheduler
        .last_report()
        .ok_or_else(|| PanelError::Other("capture finished without an archive".to_string()))
}

/// A slowly rotating spiral of particles on a transparent surface.
fn paint_galaxy(width: u32, height: u32, step: u32) -> RgbaImage {
    let mut image = RgbaImage::new(width, height);
    let (cx, cy) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
    let reach = cx.min(cy);
    let spin = f64::from(step) * 0.05;
    for i in 0..600u32 {
        let t = f64::from(i) / 600.0;
        let angle = f64::from(i) * 2.399_963 + spin * (1.0 - t);
        let radius = t.sqrt() * reach;
        let x = radius.mul_add(angle.cos(), cx);
        let y = radius.mul_add(angle.sin(), cy);
        if x >= 0.0 && y >= 0.0 && (x as u32) < width && (y as u32) < height {
            let warm = (255.0 * (1.0 - t)) as u8;
            image.put_pixel(x as u32, y as u32, Rgba([255, warm, 255 - warm, 255]));
        }
    }
    image
}

// === State ===

fn cmd_state(cli: &Cli, command: &StateCommand) -> Result<()> {
    let config = load_config(cli)?;
    let store = open_store(&config.storage)?;
    let state = StateStore::with_prefix(store, config.storage.key_prefix.clone());
    let defaults_key = state.key(SnapshotSlot::Defaults);

    if matches!(command, StateCommand::ClearDefaults) {
        state.clear(SnapshotSlot::Defaults)?;
        return report_done(cli, "clear-defaults", "Saved defaults removed");
    }

    // Headless: the simulated engine stands in for the live one.
    let bridge = EngineBridge::new(Arc::new(SimulatedEngine::new()));
    let mut controller = SyncController::new(bridge, state);
    let provenance = controller.initialize()?;

    match command {
        StateCommand::Show => {
            let snapshot = controller.build_snapshot();
            if cli.use_json() {
                output_json(
                    cli,
                    &serde_json::json!({
                        "provenance": provenance,
                        "settings": snapshot.to_partial().to_value(),
                    }),
                );
            } else {
                println!("{} {:?}", style("Source:").bold(), provenance);
                for (setting, value) in snapshot.iter() {
                    println!("  {:<28} {}", setting.key(), value.to_json());
                }
            }
        }
        StateCommand::Reset => {
            let provenance = controller.reset_to_defaults()?;
            if !controller.save_now() {
                warn!("Reset applied but could not be saved");
            }
            return report_done(cli, "reset", &format!("State reset from {provenance:?}"));
        }
        StateCommand::Promote => {
            if !controller.promote_to_defaults() {
                return Err(PanelError::StorageWrite {
                    key: defaults_key,
                    reason: controller.take_notices().join("; "),
                });
            }
            return report_done(cli, "promote", "Current state saved as defaults");
        }
        StateCommand::ClearDefaults => {}
    }
    for notice in controller.take_notices() {
        debug!(%notice, "Panel notice");
    }
    Ok(())
}

// === Scenes ===

fn cmd_scenes(cli: &Cli, command: &ScenesCommand) -> Result<()> {
    let config = load_config(cli)?;
    let store: SharedStore = open_store(&config.storage)?;
    let bridge = EngineBridge::new(Arc::new(SimulatedEngine::new()));
    let library = SceneLibrary::with_prefix(store, bridge, config.storage.key_prefix.clone());

    match command {
        ScenesCommand::List => {
            let scenes = library.list_scenes()?;
            if cli.use_json() {
                output_json(cli, &scenes);
            } else if scenes.is_empty() {
                println!("No saved scenes");
            } else {
                for scene in &scenes {
                    println!(
                        "  {}  {:<24} {:>10} bytes  {}",
                        style(&scene.id).dim(),
                        scene.name,
                        scene.size_bytes,
                        scene.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            Ok(())
        }
        ScenesCommand::Delete { id } => {
            library.delete_scene(id)?;
            report_done(cli, "delete", &format!("Deleted scene {id}"))
        }
        ScenesCommand::Rename { id, name } => {
            library.rename_scene(id, name)?;
            report_done(cli, "rename", &format!("Renamed scene {id} to '{name}'"))
        }
        ScenesCommand::Prune => {
            let summary = library.prune_catalog()?;
            if cli.use_json() {
                output_json(cli, &summary);
            } else if !cli.quiet {
                if summary.catalog_rebuilt {
                    println!(
                        "Rebuilt the scene catalog: {} scenes recovered, {} unreadable removed",
                        summary.recovered_entries, summary.orphan_entries
                    );
                } else {
                    println!(
                        "Pruned {} stale catalog rows and {} orphaned scenes",
                        summary.stale_rows, summary.orphan_entries
                    );
                }
            }
            Ok(())
        }
    }
}

// === Config ===

fn cmd_config(cli: &Cli, args: &ConfigArgs) -> Result<()> {
    if args.init {
        let path = cli
            .config
            .clone()
            .or_else(config::default_config_path)
            .ok_or_else(|| PanelError::ConfigInvalid("no config directory available".to_string()))?;
        if path.exists() && !args.force {
            return Err(PanelError::ConfigInvalid(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        config::save_config(&PanelConfig::default(), &path)?;
        return report_done(cli, "init", &format!("Wrote {}", path.display()));
    }

    let config = load_config(cli)?;
    if cli.use_json() {
        output_json(cli, &config);
    } else {
        let text = toml::to_string_pretty(&config)
            .map_err(|e| PanelError::ConfigParse(e.to_string()))?;
        print!("{text}");
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PanelConfig> {
    config::load_or_default(cli.config.as_deref())
}

// === Version / completions ===

#[allow(clippy::unnecessary_wraps)]
fn cmd_version(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
            }),
        );
    } else {
        println!("gpanel {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn cmd_completions(args: &CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "gpanel", &mut io::stdout());
    Ok(())
}

// === Output helpers ===

#[allow(clippy::unnecessary_wraps)]
fn report_done(cli: &Cli, operation: &str, message: &str) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({ "ok": true, "operation": operation, "message": message }),
        );
    } else if !cli.quiet {
        println!("{} {message}", style("✓").green());
    }
    Ok(())
}

fn output_json<T: Serialize>(cli: &Cli, data: &T) {
    let json = if cli.use_compact_json() {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    match json {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

fn output_error(cli: &Cli, error: &PanelError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{json:#}");
    } else {
        eprintln!("{}: {}", style("Error").red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", style("Hint").yellow(), suggestion);
        }
    }
}

#[cfg(test)]
mod tests {
    use gpanel::capture::surface::MemorySink;

    use super::*;

    fn demo_args(seconds: f64, width: u32, height: u32) -> CaptureDemoArgs {
        CaptureDemoArgs {
            seconds,
            fps: Some(50),
            width,
            height,
            output_dir: None,
        }
    }

    fn demo_scheduler(
        surface: &Arc<StaticSurface>,
        ticker: &Arc<ManualTicker>,
    ) -> CaptureScheduler {
        CaptureScheduler::new(
            surface.clone(),
            ticker.clone(),
            Arc::new(MemorySink::new()),
            ExportCompositor::new(ColorValue::BLACK),
        )
    }

    #[test]
    fn test_empty_surface_rejected() {
        assert!(matches!(
            validate_demo_args(&demo_args(1.0, 0, 180)),
            Err(PanelError::ConfigInvalid(_))
        ));
        assert!(validate_demo_args(&demo_args(1.0, 320, 0)).is_err());
        assert!(validate_demo_args(&demo_args(0.0, 320, 180)).is_err());
        assert!(validate_demo_args(&demo_args(1.0, 1, 1)).is_ok());
    }

    #[tokio::test]
    async fn test_demo_ends_when_every_frame_fails() {
        let surface = Arc::new(StaticSurface::new(8, 8, ColorValue::TRANSPARENT));
        surface.fail_next(usize::MAX);
        let ticker = Arc::new(ManualTicker::new());
        let scheduler = demo_scheduler(&surface, &ticker);

        let args = demo_args(0.1, 8, 8);
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            drive_demo(&scheduler, &surface, &ticker, &args, 50),
        )
        .await
        .expect("demo loop must be bounded")
        .unwrap();
        assert_eq!(report.frame_count, 0);
        // Reported to the user as frames that failed to capture.
        assert!(report.dropped_frames > 0);
        assert_eq!(scheduler.phase(), CapturePhase::Idle);
    }

    #[tokio::test]
    async fn test_demo_stops_at_frame_ceiling() {
        let surface = Arc::new(StaticSurface::new(8, 8, ColorValue::TRANSPARENT));
        let ticker = Arc::new(ManualTicker::new());
        let scheduler = demo_scheduler(&surface, &ticker);

        let args = demo_args(0.1, 8, 8);
        let report = drive_demo(&scheduler, &surface, &ticker, &args, 50).await.unwrap();
        assert!((1..=5).contains(&report.frame_count));
        assert_eq!(report.fps, 50);
    }
}
