//! Diagnostic categories, the reporter trait, and sinks.
//!
//! The core reports every diagnostic it generates; whether a category is
//! shown, suppressed, or promoted is the sink's decision. Reporting is
//! fire-and-forget, so the trait takes `&self` and sinks use interior
//! mutability.

use crate::loc::Loc;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use strum_macros::{Display, EnumIter};

/// The diagnostic families generated by the core.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Syntax,
    UnrecognizedIdentifier,
    InconsistentDeclaration,
    TypeMismatch,
    BoolType,
    LikelyBool,
    MutableRep,
    AbstractRep,
    EnumMemberLimit,
    StructFieldLimit,
    ExportedType,
    NestedExtern,
    UnreachableCode,
    OldStyle,
    DuplicateQualifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    pub loc: Loc,
}

impl Diagnostic {
    pub fn warning(category: Category, message: impl Into<String>, loc: Loc) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            category,
            message: message.into(),
            loc,
        }
    }

    pub fn error(category: Category, message: impl Into<String>, loc: Loc) -> Self {
        Diagnostic {
            severity: Severity::Error,
            category,
            message: message.into(),
            loc,
        }
    }

    pub fn render_plain(&self) -> String {
        format!(
            "{}[{}]: {}\n  --> {}",
            self.severity, self.category, self.message, self.loc
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_plain())
    }
}

/// Where diagnostics go. Implementations decide policy.
pub trait Reporter {
    fn report(&self, diag: Diagnostic);
}

/// A collecting sink, shared by handle between the checker and whoever
/// reads the results.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        DiagnosticLog::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Snapshot of everything reported so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Diagnostic> {
        self.entries.take()
    }

    pub fn count_of(&self, category: Category) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|d| d.category == category)
            .count()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|d| d.message.clone())
            .collect()
    }

    /// Machine-readable dump of the log.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.entries.borrow())
    }
}

impl Reporter for DiagnosticLog {
    fn report(&self, diag: Diagnostic) {
        log::debug!("{}", diag.render_plain());
        self.entries.borrow_mut().push(diag);
    }
}
