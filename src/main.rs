use std::io::{self, BufRead, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use crossterm::execute;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use openpauw::{
    Board, Channel, Config, FakeBoard, IndicatorState, Instrument, Level, Pad, PinMap,
    StatusIndicator,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Host-side simulator for the OpenPauw probe router.
///
/// Runs the router firmware against a simulated switch matrix and serves the
/// command protocol on a serial port or on this console.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Serial port to serve, e.g. /dev/ttyACM0. Opens the menu when omitted.
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate of the serial port.
    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    /// Start straight in manual console mode.
    #[arg(long, conflicts_with = "port")]
    manual: bool,

    /// Starting state of the simulated switch matrix.
    #[arg(long, value_enum, default_value_t = Wiring::Full)]
    wiring: Wiring,

    /// Break one switch, as CHANNEL:PAD (e.g. VM:D). May be repeated.
    #[arg(long = "break", value_name = "CHANNEL:PAD", value_parser = parse_switch)]
    broken: Vec<(Channel, Pad)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Wiring {
    /// Every switch closes.
    Full,
    /// No switch closes.
    Open,
}

fn parse_switch(arg: &str) -> Result<(Channel, Pad), String> {
    let (channel, pad) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected CHANNEL:PAD, got '{arg}'"))?;
    let channel = Channel::ALL
        .into_iter()
        .find(|c| c.name().eq_ignore_ascii_case(channel))
        .ok_or_else(|| format!("unknown channel '{channel}'"))?;
    let mut letters = pad.chars();
    match (letters.next().and_then(Pad::from_letter), letters.next()) {
        (Some(pad), None) => Ok((channel, pad)),
        _ => Err(format!("unknown pad '{pad}'")),
    }
}

/// Simulated matrix with wall-clock timing.
struct HostBoard {
    matrix: FakeBoard,
    started: Instant,
}

impl Board for HostBoard {
    fn write_pin(&mut self, pin: u8, level: Level) {
        self.matrix.write_pin(pin, level);
    }

    fn read_pin(&mut self, pin: u8) -> Level {
        self.matrix.read_pin(pin)
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(u64::from(us)));
    }

    fn millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Shows status-light changes as coloured text on stderr.
struct TerminalIndicator;

impl StatusIndicator for TerminalIndicator {
    fn set_state(&mut self, state: IndicatorState) {
        let color = match state {
            IndicatorState::Idle | IndicatorState::Pass => Color::Green,
            IndicatorState::Busy => Color::Blue,
            IndicatorState::Partial => Color::Yellow,
            IndicatorState::Fail | IndicatorState::Error => Color::Red,
        };
        let result = execute!(
            io::stderr(),
            SetForegroundColor(color),
            Print(format!("[LED] {state}\n")),
            ResetColor
        );
        if let Err(e) = result {
            warn!("could not draw indicator: {e}");
        }
    }
}

// The main entry point for the command-line simulator application.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    println!("=============================");
    println!("  OpenPauw Router Simulator  ");
    println!("=============================");

    let pins = PinMap::default();
    let mut matrix = match args.wiring {
        Wiring::Full => FakeBoard::new(pins.clone()),
        Wiring::Open => FakeBoard::unwired(pins.clone()),
    }
    .without_history();
    for (channel, pad) in &args.broken {
        info!("breaking switch {channel}:{pad}");
        matrix.set_wired(*channel, *pad, false);
    }

    let board = HostBoard {
        matrix,
        started: Instant::now(),
    };
    let config = Config {
        pins,
        ..Config::default()
    };
    let mut instrument = Instrument::new(board, config)
        .with_test_cycler()
        .with_validator()
        .with_indicator(Box::new(TerminalIndicator));
    let banner = instrument.begin();

    if let Some(port_name) = &args.port {
        run_serial_mode(&mut instrument, port_name, args.baud, &banner);
        return;
    }

    let console = spawn_console();
    if args.manual {
        print_lines(&banner);
        run_manual_mode(&mut instrument, &console);
        return;
    }
    print_lines(&banner);

    // Main menu loop.
    loop {
        println!("\nSelect mode:");
        println!("  1. Manual Command Input");
        println!("  2. Listen on Serial Port");
        println!("  3. Exit");

        let Some(choice) = prompt(&console, "> ") else {
            break;
        };

        match choice.trim() {
            "1" => run_manual_mode(&mut instrument, &console),
            "2" => {
                if let Some((port_name, baud)) = choose_serial_port(&console) {
                    run_serial_mode(&mut instrument, &port_name, baud, &banner);
                }
            }
            "3" => break,
            _ => error!("Invalid choice. Please enter 1, 2, or 3."),
        }
    }
}

/// Reads stdin on its own thread so the main loop can keep ticking the
/// instrument while waiting for input.
fn spawn_console() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("stdin: {e}");
                    break;
                }
            }
        }
    });
    rx
}

fn prompt(console: &Receiver<String>, text: &str) -> Option<String> {
    print!("{text}");
    if let Err(e) = io::stdout().flush() {
        warn!("stdout: {e}");
    }
    console.recv().ok()
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

// Handles the manual command input mode.
fn run_manual_mode(instrument: &mut Instrument<HostBoard>, console: &Receiver<String>) {
    println!("\n--- Manual Mode ---");
    println!("Enter commands, or type 'back' to return to the main menu.");

    loop {
        match console.recv_timeout(Duration::from_millis(10)) {
            Ok(input) => {
                if input.trim().eq_ignore_ascii_case("back") {
                    break;
                }
                let mut bytes = input.into_bytes();
                bytes.push(b'\n');
                print_lines(&instrument.feed(&bytes));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        print_lines(&instrument.tick());
    }
}

fn choose_serial_port(console: &Receiver<String>) -> Option<(String, u32)> {
    // List available serial ports.
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            error!("Could not enumerate serial ports: {e}");
            return None;
        }
    };

    if ports.is_empty() {
        error!("No serial ports found.");
        return None;
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }

    let port_choice = prompt(console, "Select a port (number): ")?;
    let port_index: usize = match port_choice.trim().parse() {
        Ok(i) if i < ports.len() => i,
        _ => {
            error!("Invalid port selection.");
            return None;
        }
    };

    let baud_rates = [9600, 19200, 38400, 57600, 115200];
    println!("Available baud rates:");
    for (i, &rate) in baud_rates.iter().enumerate() {
        println!("  {}: {}", i, rate);
    }
    let baud_choice = prompt(console, "Select a baud rate (number): ")?;
    let baud_rate = match baud_choice.trim().parse::<usize>() {
        Ok(i) if i < baud_rates.len() => baud_rates[i],
        _ => {
            error!("Invalid baud rate selection.");
            return None;
        }
    };

    Some((ports[port_index].port_name.clone(), baud_rate))
}

// Writes response lines to the host. Returns false once the port fails.
fn send_lines(port: &mut dyn serialport::SerialPort, lines: Vec<String>) -> bool {
    for line in lines {
        println!("< {line}");
        if let Err(e) = port.write_all(format!("{line}\n").as_bytes()) {
            error!("Failed to write to serial port: {e}");
            return false;
        }
    }
    true
}

// Serves the protocol on a serial port until the port fails.
fn run_serial_mode(
    instrument: &mut Instrument<HostBoard>,
    port_name: &str,
    baud_rate: u32,
    banner: &[String],
) {
    println!("\n--- Serial Mode ---");

    let mut port = match serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(10))
        .open()
    {
        Ok(port) => port,
        Err(e) => {
            error!("Failed to open port '{port_name}': {e}");
            return;
        }
    };

    println!(
        "Listening on {} at {} baud. Press Ctrl+C to exit.",
        port_name, baud_rate
    );

    if !send_lines(port.as_mut(), banner.to_vec()) {
        return;
    }

    let mut serial_buf = [0u8; 128];
    loop {
        match port.read(&mut serial_buf) {
            Ok(bytes_read) => {
                let responses = instrument.feed(&serial_buf[..bytes_read]);
                if !send_lines(port.as_mut(), responses) {
                    return;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => (),
            Err(e) => {
                error!("Serial port error: {e}");
                return;
            }
        }
        let steps = instrument.tick();
        if !send_lines(port.as_mut(), steps) {
            return;
        }
    }
}
