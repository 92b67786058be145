//! Annotation qualifiers attached to declarations.
//!
//! The reconciler consumes a closed vocabulary of qualifiers. Each
//! belongs to exactly one family; the families decide where a qualifier
//! may legally appear (globals lists accept state, allocation, null, and
//! plain C qualifiers, nothing else).

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// An annotation qualifier, rendered with its source spelling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum Qual {
    // Global-state qualifiers: definedness transitions over a call.
    Undef,
    Killed,
    // Allocation qualifiers.
    Out,
    Partial,
    RelDef,
    Special,
    // Null qualifiers.
    Null,
    RelNull,
    NotNull,
    // Plain C qualifiers.
    Const,
    Volatile,
    // Datatype abstraction.
    Abstract,
    Concrete,
    Mutable,
    Immutable,
    // Checking levels.
    Checked,
    CheckMod,
    CheckedStrict,
    Unchecked,
    // Function and parameter qualifiers.
    NoReturn,
    Yield,
    Returned,
    Unused,
}

impl Qual {
    /// Definedness-over-a-call qualifiers (`undef`, `killed`).
    pub fn is_global_state(self) -> bool {
        matches!(self, Qual::Undef | Qual::Killed)
    }

    pub fn is_alloc(self) -> bool {
        matches!(self, Qual::Out | Qual::Partial | Qual::RelDef | Qual::Special)
    }

    pub fn is_null(self) -> bool {
        matches!(self, Qual::Null | Qual::RelNull | Qual::NotNull)
    }

    pub fn is_c_qual(self) -> bool {
        matches!(self, Qual::Const | Qual::Volatile)
    }

    pub fn is_abstraction(self) -> bool {
        matches!(
            self,
            Qual::Abstract | Qual::Concrete | Qual::Mutable | Qual::Immutable
        )
    }

    pub fn is_check(self) -> bool {
        matches!(
            self,
            Qual::Checked | Qual::CheckMod | Qual::CheckedStrict | Qual::Unchecked
        )
    }

    /// Whether the qualifier is meaningful inside a globals list.
    pub fn applies_in_globals_list(self) -> bool {
        self.is_global_state() || self.is_alloc() || self.is_null() || self.is_c_qual()
    }
}
