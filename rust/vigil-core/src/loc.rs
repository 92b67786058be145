//! Source locations attached to nodes and diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in a source file: file name plus 1-based line and column.
///
/// A location is attached to a node once at construction and only moves
/// through the explicit relocation operations on expression nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub file: String,
    pub line: usize,
    pub col: usize,
}

impl Loc {
    pub fn new(file: impl Into<String>, line: usize, col: usize) -> Self {
        Loc {
            file: file.into(),
            line,
            col,
        }
    }

    /// Placeholder for nodes that have no source position yet.
    pub fn dummy() -> Self {
        Loc::new("<none>", 0, 0)
    }

    /// Location for entries the checker creates itself (predefined names).
    pub fn builtin() -> Self {
        Loc::new("<builtin>", 0, 0)
    }

    pub fn is_dummy(&self) -> bool {
        self.file == "<none>"
    }

    pub fn is_builtin(&self) -> bool {
        self.file == "<builtin>"
    }

    /// True when the location falls in a header file (`.h` or `.lh`).
    pub fn is_header(&self) -> bool {
        self.file.ends_with(".h") || self.file.ends_with(".lh")
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}
