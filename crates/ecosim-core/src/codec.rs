//! Wire codec for the co-simulation protocol.
//!
//! The external simulator speaks a line-oriented ASCII protocol: one message
//! per line, whitespace-separated tokens, `\n`-terminated. Every message
//! carries a six-field header followed by zero or more floating-point
//! values:
//!
//! ```text
//! version flag nDoubles nIntegers nBooleans elapsedSecs v1 v2 ... vN
//! ```
//!
//! `flag` is [`FLAG_NORMAL`] for an ordinary step exchange and
//! [`FLAG_TERMINATE`] for the shutdown handshake. Floats are rendered in
//! fixed-width scientific notation with 15 fractional digits and a
//! two-digit signed exponent, which is what the simulator's own formatter
//! produces and what its parser is tested against.
//!
//! Decoding is strict: a malformed line is a protocol violation, not
//! something to paper over. The error propagates to the episode state
//! machine, which treats it as fatal for the current episode.

use thiserror::Error;

/// Flag value for a normal step exchange.
pub const FLAG_NORMAL: i32 = 0;

/// Flag value for the terminate handshake.
pub const FLAG_TERMINATE: i32 = 1;

/// Errors produced while decoding a wire message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Fewer than the six mandatory header tokens were present.
    #[error("truncated message: expected at least 6 header tokens, found {found}")]
    TruncatedHeader {
        /// Number of tokens actually found.
        found: usize,
    },

    /// A header token failed integer or float parsing.
    #[error("invalid header field `{field}`: {token:?}")]
    InvalidHeader {
        /// Name of the offending header field.
        field: &'static str,
        /// The token that failed to parse.
        token: String,
    },

    /// A value token failed float parsing.
    #[error("invalid value token {token:?} at index {index}")]
    InvalidValue {
        /// Zero-based index of the value within the message.
        index: usize,
        /// The token that failed to parse.
        token: String,
    },
}

/// A decoded protocol message.
///
/// The same shape is used in both directions: outbound messages carry the
/// action values chosen by the caller, inbound messages carry the
/// simulator's sensor readings. The three count fields mirror the wire
/// header; only `n_doubles` is meaningful for the exchanges this driver
/// performs, and the simulator is not consistent about keeping it in sync
/// with the actual value count, so [`WireMessage::decode`] does not
/// cross-check it.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    /// Wire-format version, echoed from the simulator's handshake.
    pub version: i32,
    /// Step flag: [`FLAG_NORMAL`] or [`FLAG_TERMINATE`].
    pub flag: i32,
    /// Declared number of double values.
    pub n_doubles: i32,
    /// Declared number of integer values (always 0 in this protocol).
    pub n_integers: i32,
    /// Declared number of boolean values (always 0 in this protocol).
    pub n_booleans: i32,
    /// Simulated seconds since the start of the episode.
    pub elapsed_secs: f64,
    /// Payload values: actions outbound, observations inbound.
    pub values: Vec<f64>,
}

impl WireMessage {
    /// Builds an outbound step message (`flag = 0`).
    #[must_use]
    pub fn step(version: i32, values: Vec<f64>, elapsed_secs: f64) -> Self {
        Self::with_flag(version, FLAG_NORMAL, values, elapsed_secs)
    }

    /// Builds an outbound terminate message (`flag = 1`).
    #[must_use]
    pub fn terminate(version: i32, values: Vec<f64>, elapsed_secs: f64) -> Self {
        Self::with_flag(version, FLAG_TERMINATE, values, elapsed_secs)
    }

    fn with_flag(version: i32, flag: i32, values: Vec<f64>, elapsed_secs: f64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let n_doubles = values.len() as i32;
        Self {
            version,
            flag,
            n_doubles,
            n_integers: 0,
            n_booleans: 0,
            elapsed_secs,
            values,
        }
    }

    /// Returns `true` if this message carries the terminate flag.
    #[must_use]
    pub const fn is_terminate(&self) -> bool {
        self.flag == FLAG_TERMINATE
    }

    /// Encodes the message as a single protocol line.
    ///
    /// The line ends with a space before the terminating newline; the
    /// simulator's tokenizer relies on every field, including the last
    /// value, being space-delimited.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(32 + 24 * self.values.len());
        line.push_str(&format!(
            "{} {} {} {} {} {} ",
            self.version,
            self.flag,
            self.n_doubles,
            self.n_integers,
            self.n_booleans,
            format_sci(self.elapsed_secs)
        ));
        for value in &self.values {
            line.push_str(&format_sci(*value));
            line.push(' ');
        }
        line.push('\n');
        line
    }

    /// Decodes one protocol line.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TruncatedHeader`] if fewer than six tokens are
    /// present, [`CodecError::InvalidHeader`] if a header token is not
    /// numeric, and [`CodecError::InvalidValue`] if a payload token fails
    /// float parsing.
    pub fn decode(line: &str) -> Result<Self, CodecError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 6 {
            return Err(CodecError::TruncatedHeader {
                found: tokens.len(),
            });
        }

        let version = parse_header_int(tokens[0], "version")?;
        let flag = parse_header_int(tokens[1], "flag")?;
        let n_doubles = parse_header_int(tokens[2], "nDoubles")?;
        let n_integers = parse_header_int(tokens[3], "nIntegers")?;
        let n_booleans = parse_header_int(tokens[4], "nBooleans")?;
        let elapsed_secs: f64 =
            tokens[5]
                .parse()
                .map_err(|_| CodecError::InvalidHeader {
                    field: "elapsedSecs",
                    token: tokens[5].to_string(),
                })?;

        let values = tokens[6..]
            .iter()
            .enumerate()
            .map(|(index, token)| {
                token.parse::<f64>().map_err(|_| CodecError::InvalidValue {
                    index,
                    token: (*token).to_string(),
                })
            })
            .collect::<Result<Vec<f64>, CodecError>>()?;

        Ok(Self {
            version,
            flag,
            n_doubles,
            n_integers,
            n_booleans,
            elapsed_secs,
            values,
        })
    }
}

fn parse_header_int(token: &str, field: &'static str) -> Result<i32, CodecError> {
    token.parse().map_err(|_| CodecError::InvalidHeader {
        field,
        token: token.to_string(),
    })
}

/// Formats a float the way the simulator's C formatter does (`%.15e`):
/// 15 fractional digits and a sign-carrying, zero-padded two-digit
/// exponent, e.g. `2.100000000000000e+01`.
fn format_sci(value: f64) -> String {
    let rendered = format!("{value:.15e}");
    // Rust renders the exponent bare ("e1", "e-2"); rewrite it as "e+01".
    let Some((mantissa, exponent)) = rendered.split_once('e') else {
        // NaN / infinity have no exponent part; nothing sensible to do.
        return rendered;
    };
    let (sign, digits) = exponent
        .strip_prefix('-')
        .map_or(("+", exponent), |rest| ("-", rest));
    if digits.len() < 2 {
        format!("{mantissa}e{sign}0{digits}")
    } else {
        format!("{mantissa}e{sign}{digits}")
    }
}
