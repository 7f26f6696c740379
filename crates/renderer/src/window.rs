//! Interactive preview: a visible window driven by the winit event loop.
//!
//! Keys are translated into engine [`Key`]s and forwarded to the keyboard
//! source, which in turn drives the camera source through the shared
//! [`crate::InputHandle`].

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, warn};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::gpu::{ContextProvider, Renderer};
use crate::input::{Key, KeyboardHandle, UniformBus};
use crate::runtime::FrameClock;
use crate::types::{ContextBackend, ContextRequest};

/// Everything the preview loop needs.
pub struct PreviewOptions {
    pub request: ContextRequest,
    pub shader: PathBuf,
    pub bus: UniformBus,
    /// Receives translated key presses; `None` disables camera keys.
    pub keyboard: Option<KeyboardHandle>,
    /// Frame cap; `None` renders as fast as vsync allows.
    pub fps: Option<f32>,
}

/// Maps a physical key to the engine key it drives.
pub fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::ArrowLeft | KeyCode::KeyA => Some(Key::Left),
        KeyCode::ArrowRight | KeyCode::KeyD => Some(Key::Right),
        KeyCode::ArrowUp | KeyCode::KeyW => Some(Key::Up),
        KeyCode::ArrowDown | KeyCode::KeyS => Some(Key::Down),
        KeyCode::KeyE | KeyCode::PageUp => Some(Key::Forward),
        KeyCode::KeyQ | KeyCode::PageDown => Some(Key::Back),
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Some(Key::Modifier),
        _ => None,
    }
}

/// Opens a window, loads the shader and renders until the window closes.
///
/// `Escape` quits and `R` reloads the shader from disk; a failed reload keeps
/// the previous program running.
pub fn run_preview(options: PreviewOptions) -> Result<()> {
    let PreviewOptions {
        request,
        shader,
        bus,
        keyboard,
        fps,
    } = options;
    let request = ContextRequest {
        backend: ContextBackend::Windowed,
        ..request
    };

    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let context = ContextProvider::create(&request, Some(&*event_loop))
        .context("failed to create preview window")?;
    let mut renderer = Renderer::new(context, bus).context("failed to initialise renderer")?;
    renderer
        .load_shader_file(&shader)
        .with_context(|| format!("failed to load shader {}", shader.display()))?;

    let window_id = renderer
        .context()
        .window()
        .map(|window| window.id())
        .ok_or_else(|| anyhow!("windowed context has no window"))?;
    info!(shader = %shader.display(), "preview running; Esc quits, R reloads");

    let mut clock = FrameClock::realtime();
    let mut frame_start = Instant::now();
    let mut failure: Option<anyhow::Error> = None;

    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id: id, event } if id == window_id => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                let pressed = event.state == ElementState::Pressed;
                match code {
                    KeyCode::Escape if pressed => elwt.exit(),
                    KeyCode::KeyR if pressed && !event.repeat => {
                        if let Err(err) = renderer.load_shader_file(&shader) {
                            warn!(shader = %shader.display(), error = %err, "reload failed");
                        }
                    }
                    code => {
                        if let (Some(key), Some(keyboard)) = (map_key(code), keyboard.as_ref()) {
                            if !keyboard.send(key, pressed) {
                                debug!(?key, "keyboard source dropped; ignoring key");
                            }
                        }
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Err(err) = renderer.resize(size.width, size.height) {
                    warn!(error = %err, "resize failed");
                }
            }
            WindowEvent::RedrawRequested => {
                frame_start = Instant::now();
                let dt = clock.tick_at(frame_start);
                let drawn = renderer.render(dt).and_then(|()| renderer.present());
                if let Err(err) = drawn {
                    error!(error = %err, "preview frame failed");
                    failure = Some(err.into());
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let budget = fps.and_then(|fps| FrameClock::frame_budget(fps, frame_start, Instant::now()));
            match budget {
                Some(remaining) => {
                    elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + remaining));
                }
                None => {
                    if let Some(window) = renderer.context().window() {
                        window.request_redraw();
                    }
                    elwt.set_control_flow(ControlFlow::Wait);
                }
            }
        }
        _ => {}
    });

    renderer.cleanup();
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_and_wasd_share_directions() {
        assert_eq!(map_key(KeyCode::ArrowLeft), Some(Key::Left));
        assert_eq!(map_key(KeyCode::KeyA), Some(Key::Left));
        assert_eq!(map_key(KeyCode::KeyW), map_key(KeyCode::ArrowUp));
        assert_eq!(map_key(KeyCode::ShiftRight), Some(Key::Modifier));
        assert_eq!(map_key(KeyCode::KeyE), Some(Key::Forward));
        assert_eq!(map_key(KeyCode::Space), None);
    }
}
