//! MIDI transport: hardware input via midir, event sources for the scheduler,
//! and the output sinks the engine writes to.

mod output;
mod ports;

pub use output::{MidiOutPort, MidiSink, NullSink, Outputs, SinkError, SinkResult, TestSink};
pub(crate) use output::send_logged;
pub use ports::{list_input_ports, list_output_ports, open_output, select_port, MidiPortInfo};

use std::time::Duration;

use antiphon_types::{MidiEvent, MidiEventKind};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use midir::{MidiInput, MidiInputConnection};

/// Where the scheduler takes its input from.
pub trait EventSource {
    /// Take the next pending event without blocking.
    fn try_next(&mut self) -> Option<MidiEvent>;

    /// Park until an event is pending or `timeout` elapses. The event, if
    /// any, is kept for the next `try_next` call.
    fn wait_for_event(&mut self, timeout: Duration);
}

/// Event source backed by a crossbeam channel.
pub struct ChannelSource {
    rx: Receiver<MidiEvent>,
    pending: Option<MidiEvent>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<MidiEvent>) -> Self {
        Self { rx, pending: None }
    }

    /// Create a connected sender/source pair.
    pub fn channel() -> (Sender<MidiEvent>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Self::new(rx))
    }
}

impl EventSource for ChannelSource {
    fn try_next(&mut self) -> Option<MidiEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn wait_for_event(&mut self, timeout: Duration) {
        if self.pending.is_some() {
            return;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(event) => self.pending = Some(event),
            Err(RecvTimeoutError::Timeout) => {}
            // Nobody will ever send again; still honour the timeout so the
            // caller does not spin.
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(timeout),
        }
    }
}

/// MIDI input manager
pub struct MidiInputManager {
    connection: Option<MidiInputConnection<()>>,
    source: Option<ChannelSource>,
    connected_port_name: Option<String>,
}

impl MidiInputManager {
    pub fn new() -> Self {
        Self {
            connection: None,
            source: None,
            connected_port_name: None,
        }
    }

    /// Check if connected to a MIDI port
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Get the name of the connected port
    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    /// Connect to a MIDI input port by index
    pub fn connect(&mut self, port_index: usize) -> Result<(), String> {
        self.disconnect();

        let mut midi_in = MidiInput::new("antiphon").map_err(|e| e.to_string())?;
        // Clock messages are parsed and discarded downstream; keep sysex and
        // active sensing out entirely.
        midi_in.ignore(midir::Ignore::SysexAndActiveSense);
        let ports = midi_in.ports();

        let port = ports
            .get(port_index)
            .ok_or_else(|| format!("Invalid port index: {}", port_index))?;
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let (tx, source) = ChannelSource::channel();

        let connection = midi_in
            .connect(
                port,
                "antiphon-input",
                move |timestamp, message, _| {
                    if let Some(kind) = parse_midi_message(message) {
                        let _ = tx.send(MidiEvent::new(timestamp, kind));
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        log::info!(target: "midi", "connected input: {}", port_name);
        self.connection = Some(connection);
        self.source = Some(source);
        self.connected_port_name = Some(port_name);
        Ok(())
    }

    /// Disconnect from the current MIDI input port
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.source = None;
        self.connected_port_name = None;
    }
}

impl Default for MidiInputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl EventSource for MidiInputManager {
    fn try_next(&mut self) -> Option<MidiEvent> {
        self.source.as_mut()?.try_next()
    }

    fn wait_for_event(&mut self, timeout: Duration) {
        match self.source.as_mut() {
            Some(source) => source.wait_for_event(timeout),
            None => std::thread::sleep(timeout),
        }
    }
}

/// Parse a raw MIDI message into a MidiEventKind
pub fn parse_midi_message(data: &[u8]) -> Option<MidiEventKind> {
    let (&status, rest) = data.split_first()?;

    if status == 0xF8 {
        return Some(MidiEventKind::Clock);
    }

    let channel = status & 0x0F;
    match (status & 0xF0, rest) {
        (0x80, [note, velocity, ..]) => Some(MidiEventKind::NoteOff {
            channel,
            note: *note,
            velocity: *velocity,
        }),
        (0x90, [note, velocity, ..]) => Some(MidiEventKind::NoteOn {
            channel,
            note: *note,
            velocity: *velocity,
        }),
        (0xB0, [controller, value, ..]) => Some(MidiEventKind::ControlChange {
            channel,
            controller: *controller,
            value: *value,
        }),
        _ => None,
    }
}
