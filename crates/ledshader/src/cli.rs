use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::DialectPreference;

#[derive(Parser, Debug)]
#[command(
    name = "ledshader",
    author,
    version,
    about = "Shadertoy-style fragment shaders for LED matrices"
)]
pub struct Cli {
    /// Configuration file (defaults to `$LEDSHADER_CONFIG` or the user config directory).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a window and render the shader live (arrows/WASD orbit, Q/E zoom, R reloads).
    Preview(PreviewArgs),
    /// Render frames offscreen and write them as PNG files.
    Render(RenderArgs),
    /// Compile-check a shader; exits 0 when it compiles, 1 on errors, 2 when no GL is available.
    Check(CheckArgs),
    /// Print the resolved configuration.
    Config,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RenderOverrides {
    /// Override the render resolution (e.g. `64x32`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// GLSL dialect: `auto`, `120`, `330` or `300es`.
    #[arg(long, value_name = "DIALECT", value_parser = parse_dialect)]
    pub dialect: Option<DialectPreference>,

    /// Frame rate (0 = uncapped for preview; offline renders fall back to 60).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[arg(value_name = "SHADER")]
    pub shader: PathBuf,

    #[command(flatten)]
    pub overrides: RenderOverrides,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[arg(value_name = "SHADER")]
    pub shader: PathBuf,

    /// Number of frames to write (defaults to `render.frames`).
    #[arg(long, value_name = "N")]
    pub frames: Option<u32>,

    /// Output directory for `frame_NNNNN.png` files.
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    #[command(flatten)]
    pub overrides: RenderOverrides,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(value_name = "SHADER")]
    pub shader: PathBuf,

    /// GLSL dialect to validate against (defaults to `render.dialect`).
    #[arg(long, value_name = "DIALECT", value_parser = parse_dialect)]
    pub dialect: Option<DialectPreference>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err("size must be non-zero in both dimensions".to_string());
    }
    Ok((width, height))
}

pub fn parse_dialect(value: &str) -> Result<DialectPreference, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("dialect must not be empty".to_string());
    }
    trimmed.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::Dialect;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("64x32"), Ok((64, 32)));
        assert_eq!(parse_size(" 128X64 "), Ok((128, 64)));
        assert!(parse_size("64").is_err());
        assert!(parse_size("0x32").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn parses_dialects() {
        assert_eq!(parse_dialect("auto"), Ok(DialectPreference::Auto));
        assert_eq!(
            parse_dialect("330"),
            Ok(DialectPreference::Exact(Dialect::Glsl330))
        );
        assert!(parse_dialect("").is_err());
    }

    #[test]
    fn render_subcommand_takes_frames_and_out() {
        let cli = Cli::try_parse_from([
            "ledshader", "render", "demo.glsl", "--frames", "3", "--out", "frames", "--size", "8x4",
        ])
        .unwrap();
        match cli.command {
            Command::Render(args) => {
                assert_eq!(args.frames, Some(3));
                assert_eq!(args.out, PathBuf::from("frames"));
                assert_eq!(args.overrides.size, Some((8, 4)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
