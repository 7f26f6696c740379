use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use renderer::{
    CompileCheck, Frame, FrameClock, FrameSink, PngSequenceSink, PreviewOptions, Renderer,
    ValidationService,
};
use shaderconfig::EngineConfig;
use tracing_subscriber::EnvFilter;

use crate::bindings::{self, BusParts};
use crate::cli::{CheckArgs, Cli, Command, PreviewArgs, RenderArgs};
use crate::paths::{AppPaths, ConfigLocation};

/// Offline renders with an uncapped frame rate still need a time step.
const FALLBACK_FPS: f32 = 60.0;

pub fn run(cli: Cli) -> Result<ExitCode> {
    initialise_tracing();

    let paths = AppPaths::discover()?;
    let location = paths.config_location(cli.config.as_deref());
    tracing::debug!(
        config_dir = %paths.config_dir().display(),
        config = %location.path.display(),
        explicit = location.explicit,
        "resolved ledshader paths"
    );

    let command = match cli.command {
        Command::Config => return Ok(print_config(&location)),
        command => command,
    };
    let config = load_config(&location)?;
    let base_dir = location
        .path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    match command {
        Command::Preview(args) => run_preview(&config, &base_dir, args)?,
        Command::Render(args) => run_render(&config, &base_dir, args)?,
        Command::Check(args) => return run_check(&config, args),
        Command::Config => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(location: &ConfigLocation) -> Result<EngineConfig> {
    let config = if location.explicit {
        EngineConfig::load(&location.path)
    } else {
        EngineConfig::load_or_default(&location.path)
    };
    config.with_context(|| format!("failed to load {}", location.path.display()))
}

fn print_config(location: &ConfigLocation) -> ExitCode {
    match load_config(location).and_then(|config| Ok(config.to_toml_string()?)) {
        Ok(text) => {
            println!("# {}", location.path.display());
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_preview(config: &EngineConfig, base_dir: &Path, args: PreviewArgs) -> Result<()> {
    let request = bindings::context_request(config, &args.overrides)
        .with_title(format!("ledshader: {}", args.shader.display()));
    let BusParts {
        bus,
        keyboard,
        microphone,
        midi,
    } = bindings::build_bus(config, base_dir);

    if let Some(handle) = microphone {
        bindings::spawn_stdin_capture(handle).context("failed to start audio capture thread")?;
    }
    let _midi = midi.and_then(|handle| bindings::connect_midi(config, handle));

    tracing::info!(shader = %args.shader.display(), sources = ?bus, "starting preview");
    renderer::run_preview(PreviewOptions {
        request,
        shader: args.shader,
        bus,
        keyboard,
        fps: bindings::frame_rate(config, &args.overrides),
    })
}

fn run_render(config: &EngineConfig, base_dir: &Path, args: RenderArgs) -> Result<()> {
    let frames = args.frames.unwrap_or(config.render.frames);
    if frames == 0 {
        bail!("--frames must be at least 1");
    }
    let request = bindings::context_request(config, &args.overrides);
    if !request.backend.is_offscreen() {
        tracing::info!(backend = %request.backend, "offline render uses an offscreen context");
    }

    // Producer handles are dropped, so live sources hold their rest values.
    let BusParts { bus, .. } = bindings::build_bus(config, base_dir);
    let mut renderer = Renderer::offscreen(&request, bus).context("no offscreen GL context available")?;
    renderer
        .load_shader_file(&args.shader)
        .with_context(|| format!("failed to load shader {}", args.shader.display()))?;

    let fps = bindings::frame_rate(config, &args.overrides).unwrap_or(FALLBACK_FPS);
    let mut clock = FrameClock::fixed(fps);
    let mut sink = PngSequenceSink::create(&args.out)?;
    let (width, height) = renderer.size();
    for index in 0..u64::from(frames) {
        renderer.render(clock.tick())?;
        let rgb = renderer.read_pixels()?;
        sink.write_frame(Frame {
            index,
            width,
            height,
            rgb: &rgb,
        })?;
    }
    sink.finish()?;
    renderer.cleanup();
    Ok(())
}

fn run_check(config: &EngineConfig, args: CheckArgs) -> Result<ExitCode> {
    let source = fs::read_to_string(&args.shader)
        .with_context(|| format!("failed to read {}", args.shader.display()))?;
    let preference = args
        .dialect
        .unwrap_or_else(|| bindings::dialect_preference(config.render.dialect));
    let service = ValidationService::negotiate(preference);
    let check = service.test_compile(&source);
    tracing::debug!(dialect = %service.dialect(), %check, "check finished");
    Ok(report_check(&args.shader, &check))
}

fn report_check(shader: &Path, check: &CompileCheck) -> ExitCode {
    match check {
        CompileCheck::Compiled => {
            println!("{}: ok", shader.display());
            ExitCode::SUCCESS
        }
        CompileCheck::Failed { diagnostics } => {
            println!("{}: compile failed", shader.display());
            eprintln!("{}", diagnostics.trim_end());
            ExitCode::from(1)
        }
        CompileCheck::Unavailable { reason } => {
            eprintln!("{}: validation unavailable: {reason}", shader.display());
            ExitCode::from(2)
        }
    }
}
