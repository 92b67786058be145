//! The checking engine.
//!
//! ## Design overview
//!
//! [`Checker`] owns everything one translation unit of checking needs:
//! the configuration, the scoped symbol table, the diagnostic reporter,
//! and the in-flight declaration context. The grammar calls into it in
//! source order and never touches the collaborators directly, so all
//! sequencing rules live in one place.
//!
//! - [`decl`] reconciles declarations against the symbol table and
//!   attaches effect contracts to functions;
//! - [`enums`] completes enumerations and the boolean-type convention;
//! - [`expr`] builds expression nodes carrying their checking facts;
//! - [`clauses`] models globals, modifies, state, and warn clauses;
//! - [`context`] tracks the declaration in flight;
//! - [`symtab`] is the scoped name store underneath it all.
//!
//! Recoverable problems go through the [`Reporter`]; protocol
//! violations and unrecoverable source errors surface as
//! [`CheckFatal`](crate::CheckFatal) results.

pub mod clauses;
pub mod context;
pub mod decl;
pub mod enums;
pub mod expr;
pub mod symtab;

use crate::checker::context::DeclContext;
use crate::checker::expr::{ExprKind, ExprNode};
use crate::checker::symtab::SymbolTable;
use std::rc::Rc;
use vigil_core::config::CheckerConfig;
use vigil_core::diag::{Category, Diagnostic, Reporter};
use vigil_core::loc::Loc;

/// One translation unit's checking state.
pub struct Checker {
    config: CheckerConfig,
    table: SymbolTable,
    reporter: Rc<dyn Reporter>,
    ctx: DeclContext,
}

impl Checker {
    pub fn new(reporter: Rc<dyn Reporter>) -> Self {
        Checker::with_config(CheckerConfig::default(), reporter)
    }

    pub fn with_config(config: CheckerConfig, reporter: Rc<dyn Reporter>) -> Self {
        Checker {
            config,
            table: SymbolTable::new(),
            reporter,
            ctx: DeclContext::default(),
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut SymbolTable {
        &mut self.table
    }

    pub fn context(&self) -> &DeclContext {
        &self.ctx
    }

    pub(crate) fn report(&self, diag: Diagnostic) {
        self.reporter.report(diag);
    }

    pub(crate) fn warn(&self, category: Category, message: String, loc: &Loc) {
        self.report(Diagnostic::warning(category, message, loc.clone()));
    }

    // ── Expression entry points ─────────────────────────────────────

    /// Build an identifier node from the current scope. An unbound name
    /// draws a diagnostic and yields an error node the rest of the
    /// expression can absorb.
    pub fn expr_ident(&mut self, name: &str, loc: &Loc) -> ExprNode {
        match self.table.lookup(name) {
            Some(id) => {
                self.table.entry_mut(id).mark_used();
                ExprNode::ident(id, self.table.entry(id), loc.clone())
            }
            None => {
                self.warn(
                    Category::UnrecognizedIdentifier,
                    format!("unrecognized identifier: {}", name),
                    loc,
                );
                ExprNode::error(loc.clone())
            }
        }
    }

    /// Build a call node, resolving the callee's recorded contract when
    /// it names a declared function.
    pub fn expr_call(&self, callee: ExprNode, args: Vec<ExprNode>, loc: &Loc) -> ExprNode {
        let info = match &callee.kind {
            ExprKind::Ident { id, .. } => self.table.entry(*id).function_info().cloned(),
            _ => None,
        };
        ExprNode::call(callee, args, info.as_ref(), loc.clone())
    }

    /// Sequence two statements, reporting unreachable code through the
    /// attached reporter.
    pub fn stmt_seq(&self, first: ExprNode, second: ExprNode) -> ExprNode {
        ExprNode::concat(self.reporter.as_ref(), first, second)
    }
}
