//! Constant values known at analysis time.
//!
//! A node either has a known value or it does not; absence is expressed
//! with `Option` at the use site. A known zero is not the same thing as
//! an unknown value, and null-pointer detection depends on that
//! distinction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A compile-time constant surfaced during construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    /// Character constants are tracked by code point, not by glyph.
    Char(i64),
    Float(f64),
    Str(String),
}

impl ConstValue {
    /// Integer view of the value, when it has one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(i) | ConstValue::Char(i) => Some(*i),
            ConstValue::Float(_) | ConstValue::Str(_) => None,
        }
    }

    /// True for a known integral zero (a null-pointer candidate).
    pub fn is_zero(&self) -> bool {
        matches!(self, ConstValue::Int(0) | ConstValue::Char(0))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, ConstValue::Str(_))
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(i) => write!(f, "{}", i),
            ConstValue::Char(c) => match char::from_u32(*c as u32) {
                Some(ch) if !ch.is_control() => write!(f, "'{}'", ch),
                _ => write!(f, "'\\{}'", c),
            },
            ConstValue::Float(x) => write!(f, "{}", x),
            ConstValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}
