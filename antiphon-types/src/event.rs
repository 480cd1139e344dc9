/// MIDI input event with the driver timestamp it arrived with.
/// Timestamp is in microseconds from a driver-specific epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub timestamp_us: u64,
    pub kind: MidiEventKind,
}

/// The subset of MIDI traffic the engine understands.
///
/// A note-on with velocity 0 is kept as `NoteOn` so it can be passed through
/// untouched; the quantizer treats it as a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    Clock,
}

impl MidiEvent {
    pub fn new(timestamp_us: u64, kind: MidiEventKind) -> Self {
        Self { timestamp_us, kind }
    }

    /// The note event carried by this message, if any. Clock and control
    /// change messages yield `None`.
    pub fn note_event(&self) -> Option<NoteEvent> {
        match self.kind {
            MidiEventKind::NoteOn { note, velocity, .. } => Some(NoteEvent {
                on: true,
                pitch: note,
                velocity,
                timestamp_us: self.timestamp_us,
            }),
            MidiEventKind::NoteOff { note, velocity, .. } => Some(NoteEvent {
                on: false,
                pitch: note,
                velocity,
                timestamp_us: self.timestamp_us,
            }),
            MidiEventKind::ControlChange { .. } | MidiEventKind::Clock => None,
        }
    }
}

/// A note-on or note-off on its way through the router and quantizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    /// `true` for a note-on message, even one with velocity 0.
    pub on: bool,
    pub pitch: u8,
    pub velocity: u8,
    pub timestamp_us: u64,
}

impl NoteEvent {
    pub fn note_on(pitch: u8, velocity: u8) -> Self {
        Self { on: true, pitch, velocity, timestamp_us: 0 }
    }

    pub fn note_off(pitch: u8) -> Self {
        Self { on: false, pitch, velocity: 0, timestamp_us: 0 }
    }

    /// True for an attack: note-on with non-zero velocity.
    pub fn is_attack(&self) -> bool {
        self.on && self.velocity > 0
    }

    /// True for a release: note-off, or note-on with velocity 0.
    pub fn is_release(&self) -> bool {
        !self.is_attack()
    }

    /// Raw message for forwarding to a passthrough port.
    pub fn to_message(&self) -> NoteMessage {
        NoteMessage {
            kind: if self.on { NoteMessageKind::On } else { NoteMessageKind::Off },
            pitch: self.pitch,
            velocity: self.velocity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteMessageKind {
    On,
    Off,
}

/// Outgoing note message sent to one of the output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteMessage {
    pub kind: NoteMessageKind,
    pub pitch: u8,
    pub velocity: u8,
}

impl NoteMessage {
    pub fn on(pitch: u8, velocity: u8) -> Self {
        Self { kind: NoteMessageKind::On, pitch, velocity }
    }

    pub fn off(pitch: u8) -> Self {
        Self { kind: NoteMessageKind::Off, pitch, velocity: 0 }
    }

    /// Encode as a three-byte channel voice message on MIDI channel 1.
    pub fn to_bytes(&self) -> [u8; 3] {
        let status = match self.kind {
            NoteMessageKind::On => 0x90,
            NoteMessageKind::Off => 0x80,
        };
        [status, self.pitch & 0x7F, self.velocity & 0x7F]
    }
}
