//! Small value types shared by the circuit model and the design queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::circuit::CircuitError;

/// Index of a pin in a circuit's element store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinId(pub(crate) usize);

/// Index of a gate in a circuit's element store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GateId(pub(crate) usize);

/// Index of a cell type in a circuit's element store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellTypeId(pub(crate) usize);

/// Pin direction relative to the gate (or design) that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "input" => Ok(Direction::Input),
            "output" => Ok(Direction::Output),
            other => Err(CircuitError::UnknownDirection(other.to_string())),
        }
    }
}

/// What a pin is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinKind {
    /// Pin on a gate instance (`<gate>/<leaf>`).
    Gate,
    PrimaryInput,
    PrimaryOutput,
}

/// Simulated or captured logic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogicValue {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "X")]
    X,
    #[serde(rename = "Z")]
    Z,
}

impl LogicValue {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(LogicValue::Zero),
            '1' => Some(LogicValue::One),
            'X' | 'x' => Some(LogicValue::X),
            'Z' | 'z' => Some(LogicValue::Z),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            LogicValue::Zero => '0',
            LogicValue::One => '1',
            LogicValue::X => 'X',
            LogicValue::Z => 'Z',
        }
    }

    pub fn is_x(self) -> bool {
        self == LogicValue::X
    }
}

impl fmt::Display for LogicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for LogicValue {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next().and_then(LogicValue::from_char), chars.next()) {
            (Some(value), None) => Ok(value),
            _ => Err(CircuitError::UnknownValue(trimmed.to_string())),
        }
    }
}

/// Render captured values as a compact string, e.g. `01X`.
pub fn format_values(values: &[LogicValue]) -> String {
    values.iter().map(|v| v.as_char()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_tool_output() {
        assert_eq!("input\n".parse::<Direction>().expect("parse"), Direction::Input);
        assert!("inout".parse::<Direction>().is_err());
    }

    #[test]
    fn logic_value_parses_single_character() {
        assert_eq!("X".parse::<LogicValue>().expect("parse"), LogicValue::X);
        assert_eq!(" 1 ".parse::<LogicValue>().expect("parse"), LogicValue::One);
        assert!("01".parse::<LogicValue>().is_err());
        assert!("".parse::<LogicValue>().is_err());
    }

    #[test]
    fn logic_values_serialize_as_characters() {
        let json = serde_json::to_string(&[LogicValue::Zero, LogicValue::X]).expect("json");
        assert_eq!(json, r#"["0","X"]"#);
        assert_eq!(format_values(&[LogicValue::One, LogicValue::Zero]), "10");
    }
}
