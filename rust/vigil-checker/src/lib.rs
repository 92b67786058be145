//! Vigil Checker
//!
//! Declaration reconciliation, effect clauses, and the expression-node
//! model for one translation unit. The grammar drives [`Checker`] in
//! source order; recoverable problems flow through the configured
//! [`Reporter`](vigil_core::diag::Reporter) and the checker patches
//! itself up, while protocol violations and unrecoverable source
//! errors surface as [`CheckFatal`].

pub mod checker;

use thiserror::Error;
use vigil_core::loc::Loc;

pub use checker::Checker;

/// Errors that end checking. The protocol variants mean the grammar
/// drove the checker out of order; the source variants mean the input
/// cannot be patched into something checkable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckFatal {
    #[error("declaration of {attempted} begun while {in_flight} is still in flight")]
    ModeConflict {
        in_flight: &'static str,
        attempted: &'static str,
    },
    #[error("globals list asserts both nothing and named state")]
    GlobalsConflict,
    #[error("scope override requested while one is already active")]
    NestedScopeOverride,
    #[error("parameter declarations ended with no function in flight")]
    MissingSavedFunction,
    #[error("{loc}: old-style parameter list names the type {name}")]
    ParamListTypeName { name: String, loc: Loc },
    #[error("{loc}: declaration of {name}, which is not a listed parameter")]
    UnlistedParameter { name: String, loc: Loc },
    #[error("{0}: va_dcl without va_alist")]
    VaDclWithoutAlist(Loc),
    #[error("{loc}: effect clauses attached to {name}, which is not a function")]
    ClausesOnNonFunction { name: String, loc: Loc },
}
