//! Minimal Telnet negotiation handling for the upstream stream
//!
//! MUD servers interleave RFC 854 IAC sequences with game text. The bridge
//! strips them out before line assembly and answers option requests with a
//! refusal (accepting only ECHO and SUPPRESS-GO-AHEAD) so the server stops
//! asking. An incomplete trailing sequence is left unconsumed for the next
//! read.

/// Interpret As Command
pub const IAC: u8 = 255;

const SE: u8 = 240;
const SB: u8 = 250;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const DONT: u8 = 254;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

/// Result of stripping Telnet negotiation from an inbound chunk
#[derive(Debug, Default, PartialEq)]
pub struct StripResult {
    /// Game text with all IAC sequences removed
    pub text: Vec<u8>,
    /// Negotiation replies to write back to the server
    pub replies: Vec<u8>,
    /// Bytes consumed from the input; the remainder is an incomplete sequence
    pub consumed: usize,
}

/// Separate game text from Telnet commands in a raw chunk
pub fn strip_negotiation(input: &[u8]) -> StripResult {
    let mut result = StripResult::default();
    let mut i = 0;

    while i < input.len() {
        if input[i] != IAC {
            result.text.push(input[i]);
            i += 1;
            continue;
        }

        let Some(&cmd) = input.get(i + 1) else {
            break; // lone IAC at the end, wait for more data
        };

        match cmd {
            IAC => {
                // escaped 0xFF data byte
                result.text.push(IAC);
                i += 2;
            }
            WILL | WONT | DO | DONT => {
                let Some(&option) = input.get(i + 2) else {
                    break;
                };
                result.replies.extend_from_slice(&negotiate(cmd, option));
                i += 3;
            }
            SB => {
                // skip to IAC SE; subnegotiation payloads are ignored
                let mut j = i + 2;
                let mut closed = false;
                while j + 1 < input.len() {
                    if input[j] == IAC && input[j + 1] == SE {
                        closed = true;
                        break;
                    }
                    j += 1;
                }
                if !closed {
                    break;
                }
                i = j + 2;
            }
            _ => {
                // NOP, GA and friends carry no payload
                i += 2;
            }
        }
    }

    result.consumed = i;
    result
}

/// Answer a WILL/WONT/DO/DONT for one option
fn negotiate(cmd: u8, option: u8) -> Vec<u8> {
    let accept = option == OPT_ECHO || option == OPT_SGA;
    match cmd {
        WILL => vec![IAC, if accept { DO } else { DONT }, option],
        DO => vec![IAC, if accept { WILL } else { WONT }, option],
        _ => Vec::new(), // WONT/DONT need no acknowledgement
    }
}
