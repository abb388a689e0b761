//! Port conventions shared by the server and the client.

use std::fmt;

/// Port used when none is given on the command line.
pub const DEFAULT_PORT: u16 = 2000;

/// A user-supplied port that is not a number in `1..=65535`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPort(pub String);

impl fmt::Display for InvalidPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid port {:?}: must be digits only, in the range 1-65535",
            self.0
        )
    }
}

impl std::error::Error for InvalidPort {}

/// Parse a port given by a user.
///
/// Only ASCII digits are accepted (no sign, no whitespace) and port 0 is
/// rejected, since asking for an ephemeral port makes no sense for a
/// chat endpoint someone has to connect to.
pub fn parse_port(raw: &str) -> Result<u16, InvalidPort> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidPort(raw.to_string()));
    }
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}
