use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::{SourceKind, UniformMap, UniformSource, UniformValue};

/// Keys the engine reacts to. Window layers translate their own key codes into these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    /// Move toward the orbit centre.
    Forward,
    /// Move away from the orbit centre.
    Back,
    /// Held to turn vertical input into zoom.
    Modifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub pressed: bool,
}

/// Axis snapshot derived from the held key set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputAxes {
    pub horizontal: f32,
    pub vertical: f32,
    pub depth: f32,
    pub modifier: bool,
}

impl InputAxes {
    fn from_held(held: &HashSet<Key>) -> Self {
        let axis = |negative: Key, positive: Key| {
            let mut value = 0.0;
            if held.contains(&negative) {
                value -= 1.0;
            }
            if held.contains(&positive) {
                value += 1.0;
            }
            value
        };
        Self {
            horizontal: axis(Key::Left, Key::Right),
            vertical: axis(Key::Down, Key::Up),
            depth: axis(Key::Forward, Key::Back),
            modifier: held.contains(&Key::Modifier),
        }
    }

    pub fn as_vec4(&self) -> [f32; 4] {
        [
            self.horizontal,
            self.vertical,
            self.depth,
            if self.modifier { 1.0 } else { 0.0 },
        ]
    }
}

/// Shared, latest-value view of the keyboard axes.
#[derive(Debug, Clone, Default)]
pub struct InputHandle {
    axes: Arc<Mutex<InputAxes>>,
}

impl InputHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> InputAxes {
        *self.axes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, axes: InputAxes) {
        *self.axes.lock().unwrap_or_else(PoisonError::into_inner) = axes;
    }
}

/// Cloneable sender side of a [`KeyboardSource`].
#[derive(Debug, Clone)]
pub struct KeyboardHandle {
    sender: Sender<KeyInput>,
}

impl KeyboardHandle {
    /// Queues a key transition. Returns `false` once the source is gone or its queue is full.
    pub fn send(&self, key: Key, pressed: bool) -> bool {
        match self.sender.try_send(KeyInput { key, pressed }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!(?key, "keyboard queue full; dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Turns key transitions into `iInput` and publishes axes for the camera.
pub struct KeyboardSource {
    receiver: Receiver<KeyInput>,
    held: HashSet<Key>,
    axes: InputAxes,
    shared: InputHandle,
}

const KEY_QUEUE_CAPACITY: usize = 256;

impl KeyboardSource {
    pub fn new() -> (Self, KeyboardHandle) {
        let (sender, receiver) = crossbeam_channel::bounded(KEY_QUEUE_CAPACITY);
        let source = Self {
            receiver,
            held: HashSet::new(),
            axes: InputAxes::default(),
            shared: InputHandle::new(),
        };
        (source, KeyboardHandle { sender })
    }

    /// Handle the camera source reads axes from.
    pub fn input_handle(&self) -> InputHandle {
        self.shared.clone()
    }

    pub fn axes(&self) -> InputAxes {
        self.axes
    }
}

impl UniformSource for KeyboardSource {
    fn name(&self) -> &str {
        "keyboard"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Keyboard
    }

    fn step(&mut self, _dt: f32) {
        while let Ok(event) = self.receiver.try_recv() {
            if event.pressed {
                self.held.insert(event.key);
            } else {
                self.held.remove(&event.key);
            }
        }
        self.axes = InputAxes::from_held(&self.held);
        self.shared.set(self.axes);
    }

    fn uniforms(&self) -> UniformMap {
        let mut map = UniformMap::new();
        map.insert("iInput".to_string(), UniformValue::Vec4(self.axes.as_vec4()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_drive_axes_and_shared_handle() {
        let (mut source, handle) = KeyboardSource::new();
        let shared = source.input_handle();

        assert!(handle.send(Key::Right, true));
        assert!(handle.send(Key::Up, true));
        assert!(handle.send(Key::Modifier, true));
        source.step(0.016);

        let expected = InputAxes {
            horizontal: 1.0,
            vertical: 1.0,
            depth: 0.0,
            modifier: true,
        };
        assert_eq!(source.axes(), expected);
        assert_eq!(shared.get(), expected);
        assert_eq!(
            source.uniforms()["iInput"],
            UniformValue::Vec4([1.0, 1.0, 0.0, 1.0])
        );

        handle.send(Key::Right, false);
        handle.send(Key::Left, true);
        handle.send(Key::Back, true);
        source.step(0.016);
        assert_eq!(source.axes().horizontal, -1.0);
        assert_eq!(source.axes().depth, 1.0);
    }

    #[test]
    fn opposing_keys_cancel() {
        let (mut source, handle) = KeyboardSource::new();
        handle.send(Key::Left, true);
        handle.send(Key::Right, true);
        source.step(0.016);
        assert_eq!(source.axes().horizontal, 0.0);
    }

    #[test]
    fn send_fails_after_source_dropped() {
        let (source, handle) = KeyboardSource::new();
        drop(source);
        assert!(!handle.send(Key::Up, true));
    }
}
