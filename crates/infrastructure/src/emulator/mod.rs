//! Mewtocol responder used to stand in for a real PLC.

mod server;

pub use server::EmulatorServer;

use crate::protocol::mewtocol::MAX_ADDRESS;

pub const DEFAULT_REGISTER_WORDS: usize = 10_000;

pub const REPLY_MALFORMED: &str = "<01!41**\r";
pub const REPLY_UNSUPPORTED: &str = "<01!42**\r";
pub const REPLY_OUT_OF_RANGE: &str = "<01!61**\r";
pub const REPLY_WRITE_ACK: &str = "<01$WD**\r";

const HEADER: &str = "<01#";
const TRAILER: &str = "**";
const ADDRESS_DIGITS: usize = 5;

#[derive(Debug, PartialEq, Eq)]
enum Request<'a> {
    Read { start: usize, end: usize },
    Write { start: usize, end: usize, hex: &'a str },
}

#[derive(Debug, PartialEq, Eq)]
enum Rejection {
    Malformed,
    Unsupported,
}

fn parse_address(digits: &str) -> Result<usize, Rejection> {
    if digits.len() != ADDRESS_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Rejection::Malformed);
    }
    digits.parse().map_err(|_| Rejection::Malformed)
}

fn parse_request(frame: &str) -> Result<Request<'_>, Rejection> {
    let body = frame.strip_prefix(HEADER).ok_or(Rejection::Malformed)?;
    let body = body.strip_suffix(TRAILER).ok_or(Rejection::Malformed)?;

    let (is_write, rest) = if let Some(rest) = body.strip_prefix("RDD") {
        (false, rest)
    } else if let Some(rest) = body.strip_prefix("WDD") {
        (true, rest)
    } else {
        return Err(Rejection::Unsupported);
    };

    let start = parse_address(rest.get(..ADDRESS_DIGITS).ok_or(Rejection::Malformed)?)?;
    let end = parse_address(
        rest.get(ADDRESS_DIGITS..2 * ADDRESS_DIGITS)
            .ok_or(Rejection::Malformed)?,
    )?;
    if end < start || end > MAX_ADDRESS as usize {
        return Err(Rejection::Malformed);
    }

    let tail = &rest[2 * ADDRESS_DIGITS..];
    if is_write {
        Ok(Request::Write {
            start,
            end,
            hex: tail,
        })
    } else if tail.is_empty() {
        Ok(Request::Read { start, end })
    } else {
        Err(Rejection::Malformed)
    }
}

/// In-memory register image answering Mewtocol `RD`/`WD` requests.
#[derive(Debug, Clone)]
pub struct MewtocolEmulator {
    registers: Vec<u8>,
}

impl MewtocolEmulator {
    pub fn new(words: usize) -> Self {
        Self {
            registers: vec![0; words * 2],
        }
    }

    pub fn words(&self) -> usize {
        self.registers.len() / 2
    }

    /// Byte range of the inclusive word range `start..=end`, if it fits the image
    fn span(&self, start: usize, end: usize) -> Option<std::ops::Range<usize>> {
        let range = start.checked_mul(2)?..end.checked_add(1)?.checked_mul(2)?;
        (range.start < range.end && range.end <= self.registers.len()).then_some(range)
    }

    /// Raw bytes of `words` registers starting at `address`
    pub fn registers(&self, address: usize, words: usize) -> Option<&[u8]> {
        if words == 0 {
            return Some(&[]);
        }
        let end = address.checked_add(words - 1)?;
        self.span(address, end).map(|range| &self.registers[range])
    }

    /// Preload register bytes; `false` when out of range or not whole words
    pub fn load(&mut self, address: usize, bytes: &[u8]) -> bool {
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return false;
        }
        let Some(end) = address.checked_add(bytes.len() / 2 - 1) else {
            return false;
        };
        match self.span(address, end) {
            Some(range) => {
                self.registers[range].copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Answer one request frame (`<...` without the terminating `\r`)
    pub fn respond(&mut self, frame: &str) -> String {
        let request = match parse_request(frame) {
            Ok(request) => request,
            Err(Rejection::Unsupported) => {
                tracing::debug!(frame = %frame, "Unsupported emulator command");
                return REPLY_UNSUPPORTED.to_string();
            }
            Err(Rejection::Malformed) => {
                tracing::debug!(frame = %frame, "Malformed emulator request");
                return REPLY_MALFORMED.to_string();
            }
        };

        match request {
            Request::Read { start, end } => match self.span(start, end) {
                Some(range) => format!(
                    "<01$RD{}**\r",
                    hex::encode_upper(&self.registers[range])
                ),
                None => REPLY_OUT_OF_RANGE.to_string(),
            },
            Request::Write { start, end, hex } => {
                let Some(range) = self.span(start, end) else {
                    return REPLY_OUT_OF_RANGE.to_string();
                };
                match hex::decode(hex) {
                    Ok(bytes) if bytes.len() == range.len() => {
                        self.registers[range].copy_from_slice(&bytes);
                        REPLY_WRITE_ACK.to_string()
                    }
                    _ => REPLY_MALFORMED.to_string(),
                }
            }
        }
    }
}

impl Default for MewtocolEmulator {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTER_WORDS)
    }
}
