use midir::{MidiInput, MidiOutput};

use super::output::MidiOutPort;

/// Information about an available MIDI port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<MidiPortInfo>, String> {
    let midi_in = MidiInput::new("antiphon-enumerate")
        .map_err(|e| format!("Failed to create MIDI input: {}", e))?;
    Ok(midi_in
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| MidiPortInfo {
            index,
            name: midi_in
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Device {}", index)),
        })
        .collect())
}

/// List available MIDI output ports
pub fn list_output_ports() -> Result<Vec<MidiPortInfo>, String> {
    let midi_out = MidiOutput::new("antiphon-enumerate")
        .map_err(|e| format!("Failed to create MIDI output: {}", e))?;
    Ok(midi_out
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| MidiPortInfo {
            index,
            name: midi_out
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Device {}", index)),
        })
        .collect())
}

/// Resolve a port selector against a port list.
///
/// A selector that parses as a number is taken as an index; anything else
/// matches the first port whose name contains it, ignoring case.
pub fn select_port(ports: &[MidiPortInfo], selector: &str) -> Option<usize> {
    let selector = selector.trim();
    if let Ok(index) = selector.parse::<usize>() {
        return ports.iter().find(|p| p.index == index).map(|p| p.index);
    }
    let needle = selector.to_lowercase();
    ports
        .iter()
        .find(|p| p.name.to_lowercase().contains(&needle))
        .map(|p| p.index)
}

/// Open an output port chosen by selector. `label` names the role the port
/// plays (e.g. "metronome") and is used as the sink name.
pub fn open_output(selector: &str, label: &str) -> Result<MidiOutPort, String> {
    let ports = list_output_ports()?;
    let index = select_port(&ports, selector)
        .ok_or_else(|| format!("No MIDI output matches '{}' for {}", selector, label))?;

    let midi_out = MidiOutput::new("antiphon")
        .map_err(|e| format!("Failed to create MIDI output: {}", e))?;
    let out_ports = midi_out.ports();
    let port = out_ports
        .get(index)
        .ok_or_else(|| format!("Output port {} disappeared", index))?;
    let port_name = midi_out
        .port_name(port)
        .unwrap_or_else(|_| format!("Device {}", index));

    let connection = midi_out
        .connect(port, &format!("antiphon-{}", label))
        .map_err(|e| format!("Failed to connect to {}: {}", port_name, e))?;

    log::info!(target: "midi", "{} -> {}", label, port_name);
    Ok(MidiOutPort::new(format!("{} ({})", label, port_name), connection))
}
