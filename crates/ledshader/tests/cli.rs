use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const GOOD_SHADER: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    fragColor = vec4(fragCoord / iResolution.xy, 0.5 + 0.5 * sin(iTime), 1.0);\n}\n";
const BAD_SHADER: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    fragColor = vec4(notDeclaredAnywhere);\n}\n";

fn ledshader(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ledshader"))
        .env("LEDSHADER_CONFIG_DIR", config_dir)
        .env_remove("LEDSHADER_CONFIG")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run ledshader")
}

#[test]
fn config_prints_defaults_without_a_file() {
    let root = TempDir::new().unwrap();
    let output = ledshader(root.path(), &["config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[render]"), "{stdout}");
    assert!(stdout.contains("width = 64"), "{stdout}");
    assert!(stdout.contains("\"keyboard\""), "{stdout}");
}

#[test]
fn config_reports_validation_problems() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("broken.toml");
    fs::write(&path, "version = 1\n[render]\nwidth = 0\n").unwrap();

    let output = ledshader(root.path(), &["config", "--config", path.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("render.width"), "{stderr}");
}

#[test]
fn config_env_override_is_honoured() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("panel.toml");
    fs::write(&path, "version = 1\n[render]\nwidth = 96\nheight = 48\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_ledshader"))
        .env("LEDSHADER_CONFIG_DIR", root.path())
        .env("LEDSHADER_CONFIG", &path)
        .arg("config")
        .output()
        .expect("failed to run ledshader config");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("width = 96"), "{stdout}");
}

#[test]
fn check_missing_shader_fails() {
    let root = TempDir::new().unwrap();
    let output = ledshader(root.path(), &["check", "does-not-exist.glsl"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn check_exit_codes_follow_outcome() {
    let root = TempDir::new().unwrap();
    let good = root.path().join("good.glsl");
    let bad = root.path().join("bad.glsl");
    fs::write(&good, GOOD_SHADER).unwrap();
    fs::write(&bad, BAD_SHADER).unwrap();

    let good_status = ledshader(root.path(), &["check", good.to_str().unwrap()]);
    if good_status.status.code() == Some(2) {
        eprintln!("skipping: no GL context for validation");
        return;
    }
    assert_eq!(good_status.status.code(), Some(0));

    let bad_status = ledshader(root.path(), &["check", bad.to_str().unwrap()]);
    assert_eq!(bad_status.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&bad_status.stderr);
    assert!(stderr.contains("notDeclaredAnywhere"), "{stderr}");
}

#[test]
fn render_writes_png_frames() {
    let root = TempDir::new().unwrap();
    let shader = root.path().join("gradient.glsl");
    let out = root.path().join("frames");
    fs::write(&shader, GOOD_SHADER).unwrap();

    let output = ledshader(
        root.path(),
        &[
            "render",
            shader.to_str().unwrap(),
            "--frames",
            "2",
            "--out",
            out.to_str().unwrap(),
            "--size",
            "8x4",
        ],
    );
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("no offscreen GL context"), "{stderr}");
        eprintln!("skipping: {stderr}");
        return;
    }
    assert!(out.join("frame_00000.png").is_file());
    assert!(out.join("frame_00001.png").is_file());
    assert!(!out.join("frame_00002.png").exists());
}
