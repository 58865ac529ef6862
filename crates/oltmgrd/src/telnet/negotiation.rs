//! Minimal Telnet option handling.
//!
//! The OLT CLI is plain NVT text, but the device opens with a few option
//! requests. Every `DO` is refused with `WONT` and every `WILL` with `DONT`,
//! subnegotiations are skipped, and `IAC IAC` is unescaped to a literal 255.

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Data,
    Iac,
    /// Waiting for the option byte of a WILL/WONT/DO/DONT.
    Option(u8),
    Sub,
    SubIac,
}

/// Streaming decoder; command sequences may be split across reads.
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: State,
}

impl TelnetDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the data bytes of `input` to `data` and any negotiation
    /// replies to `replies`.
    pub fn decode(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match (self.state, byte) {
                (State::Data, IAC) => State::Iac,
                (State::Data, 0) => State::Data,
                (State::Data, b) => {
                    data.push(b);
                    State::Data
                }
                (State::Iac, IAC) => {
                    data.push(IAC);
                    State::Data
                }
                (State::Iac, cmd @ (WILL | WONT | DO | DONT)) => State::Option(cmd),
                (State::Iac, SB) => State::Sub,
                // NOP, GA, AYT and friends carry no payload.
                (State::Iac, _) => State::Data,
                (State::Option(cmd), option) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    State::Data
                }
                (State::Sub, IAC) => State::SubIac,
                (State::Sub, _) => State::Sub,
                (State::SubIac, SE) => State::Data,
                (State::SubIac, _) => State::Sub,
            };
        }
    }
}
