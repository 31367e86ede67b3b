//! Input events fed to a console process.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Ordering tag carried by an [`Input`].
///
/// On the wire this is a single integer: `-1` means [`Sequence::Ignore`],
/// `-2` means [`Sequence::Flush`] and any non-negative value is an ordered
/// sequence number assigned by the producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Sequence {
    /// Deliver immediately, outside of sequencing
    #[default]
    Ignore,
    /// Deliver immediately and release everything queued ahead of it
    Flush,
    /// Deliver strictly in order
    Ordered(u64),
}

impl Sequence {
    /// Wire value of [`Sequence::Ignore`].
    pub const IGNORE: i64 = -1;
    /// Wire value of [`Sequence::Flush`].
    pub const FLUSH: i64 = -2;

    /// Decode a wire value.
    pub fn from_wire(value: i64) -> Result<Self> {
        match value {
            Self::IGNORE => Ok(Sequence::Ignore),
            Self::FLUSH => Ok(Sequence::Flush),
            n if n >= 0 => Ok(Sequence::Ordered(n as u64)),
            n => Err(Error::InvalidInput(format!("invalid input sequence: {n}"))),
        }
    }

    /// Encode as a wire value.
    pub fn to_wire(self) -> i64 {
        match self {
            Sequence::Ignore => Self::IGNORE,
            Sequence::Flush => Self::FLUSH,
            Sequence::Ordered(n) => n as i64,
        }
    }

    /// Whether this is a real sequence number rather than a sentinel.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Sequence::Ordered(_))
    }
}

impl TryFrom<i64> for Sequence {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Sequence::from_wire(value)
    }
}

impl From<Sequence> for i64 {
    fn from(sequence: Sequence) -> Self {
        sequence.to_wire()
    }
}

/// A unit of input for a console process: text or an interrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Input {
    /// Text to write to the process
    #[serde(default)]
    pub text: String,
    /// Send an interrupt instead of text
    #[serde(default)]
    pub interrupt: bool,
    /// Echo the input into the transcript (line-oriented processes only)
    #[serde(default)]
    pub echo_input: bool,
    /// Ordering tag
    #[serde(default)]
    #[schemars(with = "i64")]
    pub sequence: Sequence,
}

impl Input {
    /// Unsequenced text input.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            interrupt: false,
            echo_input: false,
            sequence: Sequence::Ignore,
        }
    }

    /// Unsequenced interrupt.
    pub fn interrupt() -> Self {
        Self {
            text: String::new(),
            interrupt: true,
            echo_input: false,
            sequence: Sequence::Ignore,
        }
    }

    /// Set the ordering tag.
    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the echo flag.
    pub fn with_echo(mut self, echo_input: bool) -> Self {
        self.echo_input = echo_input;
        self
    }

    /// No text and no interrupt.
    pub fn is_empty(&self) -> bool {
        !self.interrupt && self.text.is_empty()
    }

    /// Whether this input submits a command line (ends with Enter).
    pub fn submits_command(&self) -> bool {
        !self.interrupt && self.text.ends_with('\r')
    }
}
