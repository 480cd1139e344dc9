use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use antiphon_core::config::{Config, PortSelection};
use antiphon_core::generation::PITCH_VOCABULARY_SIZE;
use antiphon_core::midi::{
    list_input_ports, list_output_ports, open_output, select_port, MidiInputManager, MidiSink,
    NullSink, Outputs,
};
use antiphon_core::model::EchoModel;
use antiphon_core::scheduler::TimingScheduler;

const USAGE: &str = "\
usage: antiphon [options]

  --list-ports         print MIDI inputs and outputs, then exit
  --config PATH        read settings from PATH instead of the user config
  --bpm N              override the tempo
  --input SEL          input port (index or part of its name)
  --metronome SEL      metronome output
  --high-ref SEL       passthrough output for the high range
  --low-ref SEL        passthrough output for the low range
  --high-gen SEL       generated playback output for the high range
  --low-gen SEL        generated playback output for the low range
  -v, --verbose        debug logging";

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("antiphon")
        .join("antiphon.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    match File::create(&log_path)
        .or_else(|_| File::create(std::env::temp_dir().join("antiphon.log")))
    {
        Ok(file) => loggers.push(WriteLogger::new(log_level, Config::default(), file)),
        Err(e) => eprintln!("antiphon: cannot create log file: {}", e),
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("antiphon: failed to initialize logger: {}", e);
    }

    log::info!("antiphon starting (log level: {:?})", log_level);
}

/// Value following `flag`, if present.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

/// Command-line port selectors take precedence over the config file.
fn apply_port_flags(args: &[String], ports: &mut PortSelection) {
    let overrides = [
        ("--input", &mut ports.input),
        ("--metronome", &mut ports.metronome),
        ("--high-ref", &mut ports.high_reference),
        ("--low-ref", &mut ports.low_reference),
        ("--high-gen", &mut ports.high_generation),
        ("--low-gen", &mut ports.low_generation),
    ];
    for (flag, slot) in overrides {
        if let Some(value) = flag_value(args, flag) {
            *slot = Some(value);
        }
    }
}

fn print_ports() -> Result<(), String> {
    println!("MIDI inputs:");
    for port in list_input_ports()? {
        println!("  {}: {}", port.index, port.name);
    }
    println!("MIDI outputs:");
    for port in list_output_ports()? {
        println!("  {}: {}", port.index, port.name);
    }
    Ok(())
}

fn open_sink(selector: Option<&str>, label: &str) -> Result<Arc<dyn MidiSink>, String> {
    match selector {
        Some(selector) => Ok(Arc::new(open_output(selector, label)?)),
        None => {
            log::info!(target: "midi", "{} not configured, discarding its output", label);
            Ok(Arc::new(NullSink::new(label)))
        }
    }
}

fn open_outputs(ports: &PortSelection) -> Result<Outputs, String> {
    Ok(Outputs {
        metronome: open_sink(ports.metronome.as_deref(), "metronome")?,
        high_passthrough: open_sink(ports.high_reference.as_deref(), "high-reference")?,
        low_passthrough: open_sink(ports.low_reference.as_deref(), "low-reference")?,
        high_playback: open_sink(ports.high_generation.as_deref(), "high-generation")?,
        low_playback: open_sink(ports.low_generation.as_deref(), "low-generation")?,
    })
}

fn connect_input(selector: Option<&str>) -> Result<MidiInputManager, String> {
    let ports = list_input_ports()?;
    let index = match selector {
        Some(selector) => select_port(&ports, selector)
            .ok_or_else(|| format!("No MIDI input matches '{}'", selector))?,
        None => {
            let first = ports.first().ok_or("No MIDI input ports available")?;
            log::info!(target: "midi", "no input selected, using {}", first.name);
            first.index
        }
    };

    let mut input = MidiInputManager::new();
    input.connect(index)?;
    Ok(input)
}

fn run(args: &[String]) -> Result<(), String> {
    if args.iter().any(|a| a == "--list-ports") {
        return print_ports();
    }

    let config = match flag_value(args, "--config") {
        Some(path) => Config::load_from(&PathBuf::from(path)),
        None => Config::load(),
    };

    let mut settings = config.settings();
    if let Some(bpm) = flag_value(args, "--bpm") {
        settings.bpm = bpm
            .parse()
            .map_err(|_| format!("--bpm expects a number, got '{}'", bpm))?;
        settings = settings.validated();
    }

    let mut ports = config.ports();
    apply_port_flags(args, &mut ports);

    let input = connect_input(ports.input.as_deref())?;
    let outputs = open_outputs(&ports)?;
    let model = EchoModel::new(
        PITCH_VOCABULARY_SIZE,
        settings.steps_per_beat,
        settings.midi_pitch_adjustment,
        settings.echo_spread,
    );

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed))
        .map_err(|e| format!("Failed to install Ctrl-C handler: {}", e))?;

    log::info!(
        "listening on {} at {} bpm",
        input.connected_port_name().unwrap_or("unknown"),
        settings.bpm
    );
    let mut scheduler = TimingScheduler::new(
        &settings,
        config.metronome(),
        outputs,
        Arc::new(model),
        input,
    );
    scheduler.run(&stop);
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_reads_following_argument() {
        let a = args(&["antiphon", "--bpm", "96", "--input"]);
        assert_eq!(flag_value(&a, "--bpm"), Some("96".to_string()));
        assert_eq!(flag_value(&a, "--input"), None);
        assert_eq!(flag_value(&a, "--metronome"), None);
    }

    #[test]
    fn port_flags_override_config() {
        let mut ports = PortSelection {
            input: Some("keystation".into()),
            metronome: Some("1".into()),
            ..PortSelection::default()
        };
        apply_port_flags(&args(&["antiphon", "--input", "2", "--low-gen", "iac"]), &mut ports);
        assert_eq!(ports.input.as_deref(), Some("2"));
        assert_eq!(ports.metronome.as_deref(), Some("1"));
        assert_eq!(ports.low_generation.as_deref(), Some("iac"));
        assert_eq!(ports.high_generation, None);
    }
}
