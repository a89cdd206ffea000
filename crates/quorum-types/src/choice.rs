use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A ballot option. Polls always offer the same fixed eight options,
/// labelled A through H on the ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl Choice {
    /// All options in ballot order.
    pub const ALL: [Choice; 8] = [
        Choice::A,
        Choice::B,
        Choice::C,
        Choice::D,
        Choice::E,
        Choice::F,
        Choice::G,
        Choice::H,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::A => "A",
            Choice::B => "B",
            Choice::C => "C",
            Choice::D => "D",
            Choice::E => "E",
            Choice::F => "F",
            Choice::G => "G",
            Choice::H => "H",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = crate::error::ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Choice::A),
            "B" => Ok(Choice::B),
            "C" => Ok(Choice::C),
            "D" => Ok(Choice::D),
            "E" => Ok(Choice::E),
            "F" => Ok(Choice::F),
            "G" => Ok(Choice::G),
            "H" => Ok(Choice::H),
            other => Err(crate::error::ServiceError::InvalidInput(format!(
                "unknown vote choice: {other}"
            ))),
        }
    }
}
