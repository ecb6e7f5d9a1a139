//! Host command parsing and line assembly.
//!
//! Commands are ASCII lines, matched case-insensitively and split on
//! whitespace. Token counts are strict.

use std::num::ParseIntError;

use thiserror::Error;

use crate::routing::{EnableMask, Pad, RoutingAssignment};

/// Sent for every rejected line, whatever the reason.
pub const ERR: &str = "ERR";

/// Why a line was rejected. The host only ever sees [`ERR`].
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    /// The first token is not a known command.
    #[error("unknown command `{0}`")]
    Unknown(String),
    /// The command is known but has the wrong number of tokens.
    #[error("`{command}` takes {expected}, got {got} token(s)")]
    WrongArity {
        command: &'static str,
        expected: String,
        got: usize,
    },
    /// A pad token is not a single letter A-D.
    #[error("invalid pad `{0}`")]
    InvalidPad(String),
    /// The config id is not a number.
    #[error("invalid config id")]
    InvalidConfigNumber(#[source] ParseIntError),
    /// The config id is a number but names no preset.
    #[error("no preset {0}")]
    UnknownConfig(u8),
    /// The enable mask is not an unsigned integer in 0-15.
    #[error("invalid enable mask `{0}`")]
    InvalidMask(String),
    /// The cycling period is not an unsigned integer.
    #[error("invalid period")]
    InvalidPeriod(#[source] ParseIntError),
    /// The command needs a component this instrument was built without.
    #[error("{0} is not available")]
    Unavailable(&'static str),
}

/// A parsed host request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Help,
    State,
    Config(u8),
    Set(RoutingAssignment),
    EnableMask(EnableMask),
    /// Start free-running cycling, optionally with a new period.
    TestOn(Option<u32>),
    TestOff,
    TestStep,
    TestStatus,
    SwitchTest,
    ConfigTest,
}

impl Command {
    /// Parses one trimmed, non-empty line.
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let upper = line.to_ascii_uppercase();
        let tokens: Vec<&str> = upper.split_whitespace().collect();
        let Some(&name) = tokens.first() else {
            return Err(CommandError::Unknown(String::new()));
        };

        match name {
            "PING" => expect_arity(&tokens, "PING", 1).map(|_| Command::Ping),
            "HELP" => expect_arity(&tokens, "HELP", 1).map(|_| Command::Help),
            "STATE?" => expect_arity(&tokens, "STATE?", 1).map(|_| Command::State),
            "TEST?" => expect_arity(&tokens, "TEST?", 1).map(|_| Command::TestStatus),
            "SWTEST" => expect_arity(&tokens, "SWTEST", 1).map(|_| Command::SwitchTest),
            "CFGTEST" => expect_arity(&tokens, "CFGTEST", 1).map(|_| Command::ConfigTest),
            "CFG" => {
                expect_arity(&tokens, "CFG", 2)?;
                let cfg_id = tokens[1]
                    .parse::<u8>()
                    .map_err(CommandError::InvalidConfigNumber)?;
                Ok(Command::Config(cfg_id))
            }
            "SET" => {
                expect_arity(&tokens, "SET", 5)?;
                Ok(Command::Set(RoutingAssignment::new(
                    parse_pad(tokens[1])?,
                    parse_pad(tokens[2])?,
                    parse_pad(tokens[3])?,
                    parse_pad(tokens[4])?,
                )))
            }
            "ENMASK" => {
                expect_arity(&tokens, "ENMASK", 2)?;
                parse_mask(tokens[1]).map(Command::EnableMask)
            }
            "TEST" => parse_test(&tokens),
            _ => Err(CommandError::Unknown(name.to_string())),
        }
    }
}

fn expect_arity(
    tokens: &[&str],
    command: &'static str,
    count: usize,
) -> Result<(), CommandError> {
    if tokens.len() == count {
        Ok(())
    } else {
        Err(CommandError::WrongArity {
            command,
            expected: count.to_string(),
            got: tokens.len(),
        })
    }
}

fn parse_pad(token: &str) -> Result<Pad, CommandError> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => {
            Pad::from_letter(letter).ok_or_else(|| CommandError::InvalidPad(token.to_string()))
        }
        _ => Err(CommandError::InvalidPad(token.to_string())),
    }
}

fn parse_mask(token: &str) -> Result<EnableMask, CommandError> {
    token
        .parse::<u8>()
        .ok()
        .and_then(EnableMask::from_bits)
        .ok_or_else(|| CommandError::InvalidMask(token.to_string()))
}

fn parse_test(tokens: &[&str]) -> Result<Command, CommandError> {
    match tokens {
        ["TEST"] | ["TEST", "ON"] => Ok(Command::TestOn(None)),
        ["TEST", "ON", period] => period
            .parse::<u32>()
            .map(|ms| Command::TestOn(Some(ms)))
            .map_err(CommandError::InvalidPeriod),
        ["TEST", "OFF"] => Ok(Command::TestOff),
        ["TEST", "STEP"] => Ok(Command::TestStep),
        ["TEST", mode] | ["TEST", mode, _] if !matches!(*mode, "ON" | "OFF" | "STEP") => {
            Err(CommandError::Unknown(format!("TEST {mode}")))
        }
        _ => Err(CommandError::WrongArity {
            command: "TEST",
            expected: "1-3".to_string(),
            got: tokens.len(),
        }),
    }
}

/// Help text, one entry per line.
pub fn help_lines() -> Vec<String> {
    [
        concat!("OpenPauw firmware ", env!("CARGO_PKG_VERSION")),
        "PING -> PONG",
        "CFG n (1-4) -> apply preset",
        "SET ip im vp vm (A-D) -> apply routing",
        "ENMASK m (0-15) -> channel enables, bit0=IP bit1=IM bit2=VP bit3=VM",
        "STATE? -> report current state",
        "TEST [ON [ms]] -> start automatic cycling",
        "TEST STEP -> apply next pad/channel combination",
        "TEST OFF -> stop cycling and restore routing",
        "TEST? -> report cycling status",
        "SWTEST -> scan switch matrix",
        "CFGTEST -> verify current routing against switch matrix",
        "HELP -> this message",
    ]
    .iter()
    .map(|line| line.to_string())
    .collect()
}

/// Assembles input bytes into lines.
///
/// `\n` ends a line and `\r` is dropped. Bytes past `limit` are discarded
/// until the next `\n`, so an overlong line is handled as its truncated
/// prefix.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl LineBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Takes one byte. Returns the finished line, trimmed, when `byte` ends a
    /// non-blank line.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\r' => None,
            b'\n' => {
                let line = String::from_utf8_lossy(&self.buf).trim().to_string();
                self.buf.clear();
                (!line.is_empty()).then_some(line)
            }
            _ => {
                if self.buf.len() < self.limit {
                    self.buf.push(byte);
                }
                None
            }
        }
    }

    /// Bytes held for the line in progress.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
