use crossbeam_channel::{Receiver, Sender};

use super::{SourceKind, UniformMap, UniformSource, UniformValue};

/// Number of `iParamN` uniforms MIDI controllers can drive.
pub const PARAM_COUNT: usize = 4;

const PARAM_NAMES: [&str; PARAM_COUNT] = ["iParam0", "iParam1", "iParam2", "iParam3"];
const CONTROL_CHANGE: u8 = 0xB0;
const MIDI_QUEUE: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct MidiSettings {
    /// Only accept messages on this channel (0-15); `None` accepts every channel.
    pub channel: Option<u8>,
    /// Controller number driving each `iParamN`.
    pub controllers: [u8; PARAM_COUNT],
    /// Exponential easing rate toward new targets, per second.
    pub smoothing_rate: f32,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            channel: None,
            controllers: [1, 2, 3, 4],
            smoothing_rate: 12.0,
        }
    }
}

/// Cloneable sender for raw 3-byte MIDI messages.
#[derive(Debug, Clone)]
pub struct MidiHandle {
    sender: Sender<[u8; 3]>,
}

impl MidiHandle {
    pub fn send(&self, message: [u8; 3]) -> bool {
        self.sender.try_send(message).is_ok()
    }

    /// Forwards a message of arbitrary length; only 3-byte messages are kept.
    pub fn forward(&self, message: &[u8]) -> bool {
        match <[u8; 3]>::try_from(message) {
            Ok(message) => self.send(message),
            Err(_) => false,
        }
    }
}

/// Maps MIDI control changes onto eased `iParam0..3` values in `[0, 1]`.
pub struct MidiSource {
    receiver: Receiver<[u8; 3]>,
    settings: MidiSettings,
    targets: [f32; PARAM_COUNT],
    values: [f32; PARAM_COUNT],
}

impl MidiSource {
    pub fn new(settings: MidiSettings) -> (Self, MidiHandle) {
        let (sender, receiver) = crossbeam_channel::bounded(MIDI_QUEUE);
        let source = Self {
            receiver,
            settings,
            targets: [0.0; PARAM_COUNT],
            values: [0.0; PARAM_COUNT],
        };
        (source, MidiHandle { sender })
    }

    pub fn values(&self) -> [f32; PARAM_COUNT] {
        self.values
    }

    fn apply(&mut self, [status, controller, value]: [u8; 3]) {
        if status & 0xF0 != CONTROL_CHANGE {
            return;
        }
        let channel = status & 0x0F;
        if self.settings.channel.is_some_and(|wanted| wanted != channel) {
            return;
        }
        for (slot, mapped) in self.settings.controllers.iter().enumerate() {
            if *mapped == controller {
                self.targets[slot] = f32::from(value.min(127)) / 127.0;
            }
        }
    }
}

impl UniformSource for MidiSource {
    fn name(&self) -> &str {
        "midi"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Midi
    }

    fn step(&mut self, dt: f32) {
        while let Ok(message) = self.receiver.try_recv() {
            self.apply(message);
        }
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let blend = 1.0 - (-self.settings.smoothing_rate.max(0.0) * dt).exp();
        for (value, target) in self.values.iter_mut().zip(self.targets) {
            *value += (target - *value) * blend;
        }
    }

    fn uniforms(&self) -> UniformMap {
        PARAM_NAMES
            .iter()
            .zip(self.values)
            .map(|(name, value)| (name.to_string(), UniformValue::Float(value)))
            .collect()
    }
}

/// Live connection to a MIDI input port; dropping it disconnects.
#[cfg(feature = "midi")]
pub struct MidiConnection {
    port: String,
    _connection: midir::MidiInputConnection<()>,
}

#[cfg(feature = "midi")]
impl MidiConnection {
    pub fn port_name(&self) -> &str {
        &self.port
    }
}

/// Connects to the first input port whose name contains `hint` (case-insensitive),
/// or the first port when no hint is given, and forwards messages into `handle`.
#[cfg(feature = "midi")]
pub fn connect_midi_input(hint: Option<&str>, handle: MidiHandle) -> anyhow::Result<MidiConnection> {
    use anyhow::anyhow;
    use midir::{Ignore, MidiInput};

    let mut input = MidiInput::new("ledshader-midi")
        .map_err(|error| anyhow!("failed to initialise MIDI input: {error}"))?;
    input.ignore(Ignore::All);

    let ports = input.ports();
    let names: Vec<String> = ports
        .iter()
        .map(|port| input.port_name(port).unwrap_or_else(|_| "unknown".to_string()))
        .collect();
    let wanted = hint.map(str::to_lowercase);
    let index = match &wanted {
        Some(wanted) => names
            .iter()
            .position(|name| name.to_lowercase().contains(wanted.as_str())),
        None => (!ports.is_empty()).then_some(0),
    }
    .ok_or_else(|| {
        anyhow!(
            "no MIDI input port matches {:?} (available: {})",
            hint.unwrap_or("any"),
            if names.is_empty() {
                "none".to_string()
            } else {
                names.join(", ")
            }
        )
    })?;

    let port = names[index].clone();
    tracing::info!(port = %port, "connecting MIDI input");
    let connection = input
        .connect(
            &ports[index],
            "ledshader-midi-in",
            move |_timestamp, message, _| {
                handle.forward(message);
            },
            (),
        )
        .map_err(|error| anyhow!("failed to connect MIDI port '{port}': {error}"))?;

    Ok(MidiConnection {
        port: names[index].clone(),
        _connection: connection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_changes_ease_toward_targets() {
        let (mut source, handle) = MidiSource::new(MidiSettings::default());
        assert!(handle.send([0xB0, 1, 127]));
        assert!(handle.send([0xB3, 3, 0]));
        assert!(handle.send([0xB5, 2, 64]));
        source.step(1.0 / 60.0);
        let first = source.values();
        assert!(first[0] > 0.0 && first[0] < 1.0);
        assert!(first[1] > 0.0 && first[1] < first[0]);
        assert_eq!(first[2], 0.0);

        for _ in 0..600 {
            source.step(1.0 / 60.0);
        }
        let settled = source.values();
        assert!((settled[0] - 1.0).abs() < 1e-3);
        assert!((settled[1] - 64.0 / 127.0).abs() < 1e-3);
        assert_eq!(
            source.uniforms()["iParam0"],
            UniformValue::Float(settled[0])
        );
    }

    #[test]
    fn ignores_unmapped_and_non_cc_messages() {
        let (mut source, handle) = MidiSource::new(MidiSettings::default());
        handle.send([0x90, 1, 127]);
        handle.send([0xB0, 74, 127]);
        assert!(!handle.forward(&[0xF8]));
        source.step(1.0);
        assert_eq!(source.values(), [0.0; PARAM_COUNT]);
    }

    #[test]
    fn channel_filter_rejects_other_channels() {
        let settings = MidiSettings {
            channel: Some(2),
            ..MidiSettings::default()
        };
        let (mut source, handle) = MidiSource::new(settings);
        handle.send([0xB0, 1, 127]);
        source.step(1.0);
        assert_eq!(source.values()[0], 0.0);
        handle.send([0xB2, 1, 127]);
        source.step(1.0);
        assert!(source.values()[0] > 0.9);
    }
}
