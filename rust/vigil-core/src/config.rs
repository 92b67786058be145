//! Checker configuration.
//!
//! All policy that was tunable in the checker lives here as plain data:
//! boolean type conventions, abstraction defaults, declaration limits,
//! and the implicit checking policy for variables that carry no explicit
//! checking annotation. Configuration deserializes from TOML.

use crate::store::VarScope;
use serde::{Deserialize, Serialize};

/// How thoroughly an unannotated variable is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckLevel {
    Unknown,
    Unchecked,
    CheckMod,
    Checked,
    CheckedStrict,
}

/// Default checking for one scope class. Precedence when several are
/// set: strict over checked over checkmod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopePolicy {
    pub checked_strict: bool,
    pub checked: bool,
    pub checkmod: bool,
}

impl ScopePolicy {
    pub fn level(self) -> CheckLevel {
        if self.checked_strict {
            CheckLevel::CheckedStrict
        } else if self.checked {
            CheckLevel::Checked
        } else if self.checkmod {
            CheckLevel::CheckMod
        } else {
            CheckLevel::Unchecked
        }
    }
}

/// The implicit checking table: local, file-static, and global scope
/// each get a default level, applied only when a variable's checking
/// level is still unknown at declaration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitCheckPolicy {
    /// Locals either default to checkmod or stay unchecked.
    pub local_checkmod: bool,
    pub statics: ScopePolicy,
    pub globals: ScopePolicy,
}

impl ImplicitCheckPolicy {
    /// The default level for a scope, as a pure function of the policy.
    pub fn default_level(&self, scope: VarScope) -> CheckLevel {
        match scope {
            VarScope::Local => {
                if self.local_checkmod {
                    CheckLevel::CheckMod
                } else {
                    CheckLevel::Unchecked
                }
            }
            VarScope::FileStatic => self.statics.level(),
            VarScope::Global => self.globals.level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// The type name treated as the boolean type.
    pub bool_name: String,
    /// Enumerator spellings representing true and false.
    pub true_name: String,
    pub false_name: String,
    /// Suggest the configured boolean type when a typedef uses a
    /// bool-alike spelling.
    pub likely_bool: bool,
    /// Accept a boolean typedef over int without comment.
    pub bool_int: bool,
    /// Unannotated typedefs become abstract datatypes.
    pub imp_abstract: bool,
    /// Declaration limits, checked when set. Defaults are the ISO C90
    /// translation limits.
    pub max_enum_members: Option<usize>,
    pub max_struct_fields: Option<usize>,
    pub policy: ImplicitCheckPolicy,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            bool_name: "bool".into(),
            true_name: "true".into(),
            false_name: "false".into(),
            likely_bool: true,
            bool_int: false,
            imp_abstract: false,
            max_enum_members: Some(127),
            max_struct_fields: Some(127),
            policy: ImplicitCheckPolicy::default(),
        }
    }
}

impl CheckerConfig {
    /// Spellings that usually mean "I wanted a boolean type".
    pub const LIKELY_BOOL_NAMES: [&'static str; 6] =
        ["bool", "Bool", "BOOL", "boolean", "Boolean", "BOOLEAN"];

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// True when `name` is one of the configured true/false spellings.
    pub fn is_bool_member_name(&self, name: &str) -> bool {
        name == self.true_name || name == self.false_name
    }

    pub fn is_likely_bool_name(&self, name: &str) -> bool {
        Self::LIKELY_BOOL_NAMES.contains(&name)
    }
}
