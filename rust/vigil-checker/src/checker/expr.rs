//! The expression-node model.
//!
//! ## Design overview
//!
//! Every expression and statement form is an [`ExprNode`] built by one
//! constructor per syntactic kind. Semantic facts are bound at
//! construction and never recomputed: the node's type, its constant
//! value when one is known, the storage it denotes, the sets of
//! references it reads (`uses`), definitely writes (`sets`) and possibly
//! writes (`msets`), the non-null facts it guarantees when used as a
//! predicate (`guards`), and its control-flow exit behavior.
//!
//! Children keep their own facts; parents copy what they need. Constant
//! folding happens only here: literals, `sizeof`/`alignof`/`offsetof`
//! of fixed layouts, and comparisons of two known values. Nothing folds
//! after construction.

use crate::checker::symtab::{Entry, FunctionInfo, SymbolId};
use std::fmt;
use strum_macros::Display;
use vigil_core::diag::{Category, Diagnostic, Reporter};
use vigil_core::loc::Loc;
use vigil_core::store::{RefSet, StoreRef};
use vigil_core::types::Ty;
use vigil_core::values::ConstValue;

// ── Operators ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AssignOp {
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "+=")]
    AddAssign,
    #[strum(serialize = "-=")]
    SubAssign,
    #[strum(serialize = "*=")]
    MulAssign,
    #[strum(serialize = "/=")]
    DivAssign,
    #[strum(serialize = "%=")]
    ModAssign,
    #[strum(serialize = "&=")]
    AndAssign,
    #[strum(serialize = "|=")]
    OrAssign,
    #[strum(serialize = "^=")]
    XorAssign,
    #[strum(serialize = "<<=")]
    ShlAssign,
    #[strum(serialize = ">>=")]
    ShrAssign,
}

impl AssignOp {
    /// Compound assignments read the target as well as write it.
    pub fn is_compound(self) -> bool {
        self != AssignOp::Assign
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOp {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    BitNot,
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "*")]
    Deref,
    #[strum(serialize = "&")]
    AddrOf,
    #[strum(serialize = "++")]
    PreInc,
    #[strum(serialize = "--")]
    PreDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PostOp {
    #[strum(serialize = "++")]
    Inc,
    #[strum(serialize = "--")]
    Dec,
}

// ── Exit modes ──────────────────────────────────────────────────────

/// Where control goes after the node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitMode {
    #[default]
    Normal,
    /// Control may never reach the successor (a branch diverges).
    MayDiverge,
    /// goto, break, continue.
    MustJump,
    MustReturn,
    /// The process terminates.
    MustExit,
}

impl ExitMode {
    pub fn must_escape(self) -> bool {
        matches!(
            self,
            ExitMode::MustJump | ExitMode::MustReturn | ExitMode::MustExit
        )
    }

    pub fn may_escape(self) -> bool {
        self.must_escape() || self == ExitMode::MayDiverge
    }

    /// Join two exits when exactly one branch runs. Both branches must
    /// diverge for the join to diverge; the process-exit mode survives
    /// only when both sides carry it.
    pub fn branch_join(self, other: ExitMode) -> ExitMode {
        if self == ExitMode::MustExit && other == ExitMode::MustExit {
            ExitMode::MustExit
        } else if self.must_escape() && other.must_escape() {
            ExitMode::MustReturn
        } else if self.may_escape() || other.may_escape() {
            ExitMode::MayDiverge
        } else {
            ExitMode::Normal
        }
    }
}

/// Join two exits when the second runs after the first.
fn exit_seq(first: ExitMode, second: ExitMode) -> ExitMode {
    if first.must_escape() {
        first
    } else if second.must_escape() {
        second
    } else if first == ExitMode::MayDiverge || second == ExitMode::MayDiverge {
        ExitMode::MayDiverge
    } else {
        ExitMode::Normal
    }
}

// ── Guards ──────────────────────────────────────────────────────────

/// References known non-null on each branch when the expression is used
/// as a predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardSet {
    pub on_true: RefSet,
    pub on_false: RefSet,
}

impl GuardSet {
    pub fn new() -> Self {
        GuardSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.on_true.is_empty() && self.on_false.is_empty()
    }

    pub fn invert(&mut self) {
        std::mem::swap(&mut self.on_true, &mut self.on_false);
    }

    /// `a && b`: both predicates held on the true branch; only facts
    /// common to both falsifications hold on the false branch.
    pub fn and_join(&self, other: &GuardSet) -> GuardSet {
        let mut on_true = self.on_true.clone();
        on_true.union_with(&other.on_true);
        let mut on_false = self.on_false.clone();
        on_false.intersect_with(&other.on_false);
        GuardSet { on_true, on_false }
    }

    /// `a || b`: dual of [`GuardSet::and_join`].
    pub fn or_join(&self, other: &GuardSet) -> GuardSet {
        let mut on_false = self.on_false.clone();
        on_false.union_with(&other.on_false);
        let mut on_true = self.on_true.clone();
        on_true.intersect_with(&other.on_true);
        GuardSet { on_true, on_false }
    }
}

// ── Kinds ───────────────────────────────────────────────────────────

/// Which identifier namespace an [`ExprKind::Ident`] resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentKind {
    Variable,
    Constant,
    EnumMember,
}

/// Payload-carrying expression and statement kinds. Sub-nodes are
/// owned; iterator start and end symbols are observed by id.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Parse-error sentinel, distinct from an empty node.
    Error,
    Empty,
    Parens(Box<ExprNode>),
    Ident { name: String, id: SymbolId, kind: IdentKind },
    NumLit,
    CharLit,
    StrLit,
    Assign { op: AssignOp, lhs: Box<ExprNode>, rhs: Box<ExprNode> },
    Binary { op: BinOp, lhs: Box<ExprNode>, rhs: Box<ExprNode> },
    Unary { op: UnaryOp, operand: Box<ExprNode> },
    Post { op: PostOp, operand: Box<ExprNode> },
    SizeofExpr(Box<ExprNode>),
    SizeofType(Ty),
    AlignofExpr(Box<ExprNode>),
    AlignofType(Ty),
    Offsetof { ty: Ty, fields: Vec<String> },
    Cast { ty: Ty, operand: Box<ExprNode> },
    Index { array: Box<ExprNode>, index: Box<ExprNode> },
    Field { record: Box<ExprNode>, field: String },
    Arrow { record: Box<ExprNode>, field: String },
    Call { callee: Box<ExprNode>, args: Vec<ExprNode> },
    Comma { first: Box<ExprNode>, second: Box<ExprNode> },
    Cond { pred: Box<ExprNode>, then: Box<ExprNode>, other: Box<ExprNode> },
    VaArg { ap: Box<ExprNode>, ty: Ty },
    Stmt(Box<ExprNode>),
    StmtList { first: Box<ExprNode>, second: Box<ExprNode> },
    Block(Box<ExprNode>),
    Label(String),
    Goto(String),
    Continue,
    Break,
    Return(Option<Box<ExprNode>>),
    If { pred: Box<ExprNode>, then: Box<ExprNode> },
    IfElse { pred: Box<ExprNode>, then: Box<ExprNode>, other: Box<ExprNode> },
    While { pred: Box<ExprNode>, body: Box<ExprNode> },
    WhilePred(Box<ExprNode>),
    DoWhile { body: Box<ExprNode>, pred: Box<ExprNode> },
    For { pred: Box<ExprNode>, body: Box<ExprNode> },
    ForPred { init: Box<ExprNode>, cond: Box<ExprNode>, inc: Box<ExprNode> },
    Switch { pred: Box<ExprNode>, body: Box<ExprNode> },
    Case { value: Box<ExprNode>, fallthrough: bool },
    Default { fallthrough: bool },
    Init { name: String, init: Box<ExprNode> },
    InitBlock(Vec<ExprNode>),
    Iter { iter: SymbolId, args: Vec<ExprNode>, body: Box<ExprNode>, end: SymbolId },
    IterCall { iter: SymbolId, args: Vec<ExprNode> },
    /// Raw token passthrough for grammar plumbing.
    Tok(String),
    /// Distinguished process-exit marker.
    MustExit,
}

// ── Nodes ───────────────────────────────────────────────────────────

/// One expression or statement with its construction-time facts.
#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: Ty,
    pub value: Option<ConstValue>,
    pub loc: Loc,
    /// The storage this expression denotes, when it is lvalue-ish.
    pub sref: Option<StoreRef>,
    pub uses: RefSet,
    pub sets: RefSet,
    pub msets: RefSet,
    pub guards: GuardSet,
    pub exit: ExitMode,
    pub reachable: bool,
    /// Labels and case/default markers; control may arrive by jump.
    pub jump_target: bool,
    pub can_break: bool,
    pub must_break: bool,
}

fn both(a: &RefSet, b: &RefSet) -> RefSet {
    let mut out = a.clone();
    out.union_with(b);
    out
}

fn align_up(off: u64, align: u64) -> u64 {
    (off + align - 1) / align * align
}

/// Byte offset of a field path within a record layout, when fixed.
fn field_offset(ty: &Ty, path: &[String]) -> Option<u64> {
    let mut cur = ty.real().clone();
    let mut total = 0u64;
    for name in path {
        match &cur {
            Ty::Struct(r) => {
                if !r.defined {
                    return None;
                }
                let mut off = 0u64;
                let mut next = None;
                for f in &r.fields {
                    let fl = f.ty.layout()?;
                    off = align_up(off, fl.align);
                    if &f.name == name {
                        next = Some((off, f.ty.real().clone()));
                        break;
                    }
                    off += fl.size;
                }
                let (off, nt) = next?;
                total += off;
                cur = nt;
            }
            Ty::Union(r) => {
                if !r.defined {
                    return None;
                }
                let f = r.fields.iter().find(|f| &f.name == name)?;
                cur = f.ty.real().clone();
            }
            _ => return None,
        }
    }
    Some(total)
}

impl ExprNode {
    fn bare(kind: ExprKind, ty: Ty, loc: Loc) -> ExprNode {
        ExprNode {
            kind,
            ty,
            value: None,
            loc,
            sref: None,
            uses: RefSet::new(),
            sets: RefSet::new(),
            msets: RefSet::new(),
            guards: GuardSet::new(),
            exit: ExitMode::Normal,
            reachable: true,
            jump_target: false,
            can_break: false,
            must_break: false,
        }
    }

    /// A pointer-ish expression used as a predicate guarantees its own
    /// storage non-null on the true branch.
    fn bind_predicate_guard(&mut self) {
        if self.ty.is_pointer_or_array() {
            if let Some(sref) = &self.sref {
                self.guards.on_true.insert(sref.clone());
            }
        }
    }

    // ── Sentinels and leaves ────────────────────────────────────────

    pub fn error(loc: Loc) -> ExprNode {
        ExprNode::bare(ExprKind::Error, Ty::Unknown, loc)
    }

    pub fn empty(loc: Loc) -> ExprNode {
        ExprNode::bare(ExprKind::Empty, Ty::Unknown, loc)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ExprKind::Error)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, ExprKind::Empty)
    }

    /// An identifier resolved against its symbol entry: type, storage
    /// and any known constant value come from the entry.
    pub fn ident(id: SymbolId, entry: &Entry, loc: Loc) -> ExprNode {
        let kind = if entry.is_enum_constant() {
            IdentKind::EnumMember
        } else if entry.constant_value().is_some() {
            IdentKind::Constant
        } else {
            IdentKind::Variable
        };
        let mut n = ExprNode::bare(
            ExprKind::Ident {
                name: entry.name.clone(),
                id,
                kind,
            },
            entry.ty.clone(),
            loc,
        );
        n.value = entry.constant_value();
        n.sref = Some(entry.sref.clone());
        n.uses = RefSet::single(entry.sref.clone());
        n.bind_predicate_guard();
        n
    }

    pub fn int_lit(value: i64, ty: Ty, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::NumLit, ty, loc);
        n.value = Some(ConstValue::Int(value));
        n
    }

    pub fn float_lit(value: f64, ty: Ty, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::NumLit, ty, loc);
        n.value = Some(ConstValue::Float(value));
        n
    }

    pub fn char_lit(value: i64, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::CharLit, Ty::Char, loc);
        n.value = Some(ConstValue::Char(value));
        n
    }

    pub fn str_lit(text: impl Into<String>, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::StrLit, Ty::pointer(Ty::Char), loc);
        n.value = Some(ConstValue::Str(text.into()));
        n
    }

    pub fn tok(text: impl Into<String>, loc: Loc) -> ExprNode {
        ExprNode::bare(ExprKind::Tok(text.into()), Ty::Unknown, loc)
    }

    // ── Assignment ──────────────────────────────────────────────────

    /// `lhs op rhs`. A simple assignment does not read its target: the
    /// target's own storage leaves `uses`, while the reads that computed
    /// the target's address stay. Compound assignment keeps the read.
    pub fn assign(op: AssignOp, lhs: ExprNode, rhs: ExprNode, loc: Loc) -> ExprNode {
        let ty = lhs.ty.clone();
        let mut uses = both(&lhs.uses, &rhs.uses);
        let mut sets = both(&lhs.sets, &rhs.sets);
        let msets = both(&lhs.msets, &rhs.msets);
        if let Some(target) = &lhs.sref {
            if !op.is_compound() {
                uses.remove(target);
            }
            sets.insert(target.clone());
        }
        let exit = exit_seq(rhs.exit, lhs.exit);
        let mut n = ExprNode::bare(
            ExprKind::Assign {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            loc,
        );
        n.uses = uses;
        n.sets = sets;
        n.msets = msets;
        n.exit = exit;
        n
    }

    // ── Operators ───────────────────────────────────────────────────

    pub fn binary(op: BinOp, lhs: ExprNode, rhs: ExprNode, loc: Loc) -> ExprNode {
        let ty = if op.is_comparison() || op.is_logical() {
            Ty::Bool
        } else {
            lhs.ty.clone()
        };
        let value = if op.is_comparison() {
            fold_comparison(op, &lhs, &rhs)
        } else {
            None
        };
        let guards = match op {
            BinOp::And => lhs.guards.and_join(&rhs.guards),
            BinOp::Or => lhs.guards.or_join(&rhs.guards),
            BinOp::Eq | BinOp::Ne => null_comparison_guard(op, &lhs, &rhs),
            _ => GuardSet::new(),
        };
        let exit = exit_seq(lhs.exit, rhs.exit);
        let uses = both(&lhs.uses, &rhs.uses);
        let sets = both(&lhs.sets, &rhs.sets);
        let msets = both(&lhs.msets, &rhs.msets);
        let mut n = ExprNode::bare(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            loc,
        );
        n.value = value;
        n.guards = guards;
        n.exit = exit;
        n.uses = uses;
        n.sets = sets;
        n.msets = msets;
        n
    }

    pub fn unary(op: UnaryOp, operand: ExprNode, loc: Loc) -> ExprNode {
        let mut n = match op {
            UnaryOp::Not => {
                let mut n = ExprNode::bare(ExprKind::Error, Ty::Bool, loc);
                n.uses = operand.uses.clone();
                n.guards = operand.guards.clone();
                n.guards.invert();
                n
            }
            UnaryOp::BitNot | UnaryOp::Neg | UnaryOp::Plus => {
                let mut n = ExprNode::bare(ExprKind::Error, operand.ty.clone(), loc);
                n.uses = operand.uses.clone();
                n
            }
            UnaryOp::Deref => {
                let pointee = operand
                    .ty
                    .base_type()
                    .cloned()
                    .unwrap_or(Ty::Unknown);
                let mut n = ExprNode::bare(ExprKind::Error, pointee.clone(), loc);
                n.uses = operand.uses.clone();
                n.sref = operand.sref.clone().map(|s| s.deref(pointee));
                if let Some(sref) = &n.sref {
                    n.uses.insert(sref.clone());
                }
                n.bind_predicate_guard();
                n
            }
            UnaryOp::AddrOf => {
                // Taking an address does not read the storage.
                let mut n = ExprNode::bare(ExprKind::Error, Ty::pointer(operand.ty.clone()), loc);
                n.uses = operand.uses.clone();
                if let Some(sref) = &operand.sref {
                    n.uses.remove(sref);
                }
                n
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let mut n = ExprNode::bare(ExprKind::Error, operand.ty.clone(), loc);
                n.uses = operand.uses.clone();
                if let Some(sref) = &operand.sref {
                    n.sets.insert(sref.clone());
                }
                n
            }
        };
        n.sets.union_with(&operand.sets);
        n.msets.union_with(&operand.msets);
        n.exit = operand.exit;
        n.kind = ExprKind::Unary {
            op,
            operand: Box::new(operand),
        };
        n
    }

    /// Postfix `++`/`--`: the operand is both read and written.
    pub fn post(op: PostOp, operand: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, operand.ty.clone(), loc);
        n.uses = operand.uses.clone();
        n.sets = operand.sets.clone();
        n.msets = operand.msets.clone();
        if let Some(sref) = &operand.sref {
            n.sets.insert(sref.clone());
        }
        n.exit = operand.exit;
        n.kind = ExprKind::Post {
            op,
            operand: Box::new(operand),
        };
        n
    }

    // ── sizeof, alignof, offsetof ───────────────────────────────────

    /// `sizeof e` does not evaluate its operand: no uses, no effects.
    pub fn sizeof_expr(operand: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::ULong, loc);
        n.value = operand.ty.size_of().map(|s| ConstValue::Int(s as i64));
        n.kind = ExprKind::SizeofExpr(Box::new(operand));
        n
    }

    pub fn sizeof_type(ty: Ty, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::SizeofType(ty.clone()), Ty::ULong, loc);
        n.value = ty.size_of().map(|s| ConstValue::Int(s as i64));
        n
    }

    pub fn alignof_expr(operand: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::ULong, loc);
        n.value = operand.ty.align_of().map(|a| ConstValue::Int(a as i64));
        n.kind = ExprKind::AlignofExpr(Box::new(operand));
        n
    }

    pub fn alignof_type(ty: Ty, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::AlignofType(ty.clone()), Ty::ULong, loc);
        n.value = ty.align_of().map(|a| ConstValue::Int(a as i64));
        n
    }

    pub fn offsetof(ty: Ty, fields: Vec<String>, loc: Loc) -> ExprNode {
        let value = field_offset(&ty, &fields).map(|o| ConstValue::Int(o as i64));
        let mut n = ExprNode::bare(ExprKind::Offsetof { ty, fields }, Ty::ULong, loc);
        n.value = value;
        n
    }

    // ── Storage-denoting forms ──────────────────────────────────────

    pub fn cast(ty: Ty, operand: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, ty, loc);
        n.value = operand.value.clone();
        n.sref = operand.sref.clone();
        n.uses = operand.uses.clone();
        n.sets = operand.sets.clone();
        n.msets = operand.msets.clone();
        n.exit = operand.exit;
        n.bind_predicate_guard();
        n.kind = ExprKind::Cast {
            ty: n.ty.clone(),
            operand: Box::new(operand),
        };
        n
    }

    pub fn index(array: ExprNode, index: ExprNode, loc: Loc) -> ExprNode {
        let elem = array.ty.base_type().cloned().unwrap_or(Ty::Unknown);
        let mut n = ExprNode::bare(ExprKind::Error, elem.clone(), loc);
        n.uses = both(&array.uses, &index.uses);
        n.sets = both(&array.sets, &index.sets);
        n.msets = both(&array.msets, &index.msets);
        n.sref = array.sref.clone().map(|s| s.any_index(elem));
        if let Some(sref) = &n.sref {
            n.uses.insert(sref.clone());
        }
        n.exit = exit_seq(array.exit, index.exit);
        n.bind_predicate_guard();
        n.kind = ExprKind::Index {
            array: Box::new(array),
            index: Box::new(index),
        };
        n
    }

    pub fn field(record: ExprNode, field: impl Into<String>, loc: Loc) -> ExprNode {
        let field = field.into();
        let fty = record
            .ty
            .field(&field)
            .map(|f| f.ty.clone())
            .unwrap_or(Ty::Unknown);
        let mut n = ExprNode::bare(ExprKind::Error, fty.clone(), loc);
        n.uses = record.uses.clone();
        n.sets = record.sets.clone();
        n.msets = record.msets.clone();
        n.sref = record.sref.clone().map(|s| s.field(field.clone(), fty));
        if let Some(sref) = &n.sref {
            n.uses.insert(sref.clone());
        }
        n.exit = record.exit;
        n.bind_predicate_guard();
        n.kind = ExprKind::Field {
            record: Box::new(record),
            field,
        };
        n
    }

    pub fn arrow(record: ExprNode, field: impl Into<String>, loc: Loc) -> ExprNode {
        let field = field.into();
        let pointee = record.ty.base_type().cloned().unwrap_or(Ty::Unknown);
        let fty = pointee
            .field(&field)
            .map(|f| f.ty.clone())
            .unwrap_or(Ty::Unknown);
        let mut n = ExprNode::bare(ExprKind::Error, fty.clone(), loc);
        n.uses = record.uses.clone();
        n.sets = record.sets.clone();
        n.msets = record.msets.clone();
        n.sref = record
            .sref
            .clone()
            .map(|s| s.deref(pointee).field(field.clone(), fty));
        if let Some(sref) = &n.sref {
            n.uses.insert(sref.clone());
        }
        n.exit = record.exit;
        n.bind_predicate_guard();
        n.kind = ExprKind::Arrow {
            record: Box::new(record),
            field,
        };
        n
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// A function call. The callee's declared contract maps onto the
    /// call site: its globals are read, its modifies set lands in
    /// `msets` with parameter-indexed references rewritten onto the
    /// actual arguments. A callee with no entry at all conservatively
    /// uses and may-set unconstrained external state. A callee declared
    /// never-returning makes the call a process exit.
    pub fn call(
        callee: ExprNode,
        args: Vec<ExprNode>,
        info: Option<&FunctionInfo>,
        loc: Loc,
    ) -> ExprNode {
        let ret = callee.ty.return_type().cloned().unwrap_or(Ty::Unknown);
        let mut uses = callee.uses.clone();
        let mut sets = callee.sets.clone();
        let mut msets = callee.msets.clone();
        let mut exit = callee.exit;
        for a in &args {
            uses.union_with(&a.uses);
            sets.union_with(&a.sets);
            msets.union_with(&a.msets);
            exit = exit_seq(exit, a.exit);
        }

        match info {
            Some(info) => {
                if let Some(globals) = info.contract.globals.refs() {
                    for g in globals {
                        uses.insert(g.clone());
                    }
                }
                if let Some(modifies) = &info.contract.modifies {
                    let actuals: Vec<Option<&StoreRef>> =
                        args.iter().map(|a| a.sref.as_ref()).collect();
                    for m in modifies {
                        if m.base == vigil_core::store::RefBase::Nothing {
                            continue;
                        }
                        if m.base.root_param().is_some() {
                            if let Some(mapped) = m.substitute_params(&actuals) {
                                msets.insert(mapped);
                            }
                        } else {
                            msets.insert(m.clone());
                        }
                    }
                }
                if info.never_returns {
                    exit = ExitMode::MustExit;
                }
            }
            None => {
                uses.insert(StoreRef::unknown());
                msets.insert(StoreRef::unknown());
            }
        }

        let mut n = ExprNode::bare(ExprKind::Error, ret, loc);
        n.uses = uses;
        n.sets = sets;
        n.msets = msets;
        n.exit = exit;
        n.kind = ExprKind::Call {
            callee: Box::new(callee),
            args,
        };
        n
    }

    // ── Expression composition ──────────────────────────────────────

    pub fn comma(first: ExprNode, second: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, second.ty.clone(), loc);
        n.value = second.value.clone();
        n.uses = both(&first.uses, &second.uses);
        n.sets = both(&first.sets, &second.sets);
        n.msets = both(&first.msets, &second.msets);
        n.guards = second.guards.clone();
        n.exit = exit_seq(first.exit, second.exit);
        n.kind = ExprKind::Comma {
            first: Box::new(first),
            second: Box::new(second),
        };
        n
    }

    pub fn cond(pred: ExprNode, then: ExprNode, other: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, then.ty.clone(), loc);
        n.uses = both(&pred.uses, &both(&then.uses, &other.uses));
        n.sets = both(&pred.sets, &both(&then.sets, &other.sets));
        n.msets = both(&pred.msets, &both(&then.msets, &other.msets));
        n.exit = exit_seq(pred.exit, then.exit.branch_join(other.exit));
        n.kind = ExprKind::Cond {
            pred: Box::new(pred),
            then: Box::new(then),
            other: Box::new(other),
        };
        n
    }

    /// `va_arg(ap, ty)` reads and advances the argument cursor.
    pub fn va_arg(ap: ExprNode, ty: Ty, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, ty.clone(), loc);
        n.uses = ap.uses.clone();
        if let Some(sref) = &ap.sref {
            n.sets.insert(sref.clone());
        }
        n.exit = ap.exit;
        n.kind = ExprKind::VaArg {
            ap: Box::new(ap),
            ty,
        };
        n
    }

    // ── Statements ──────────────────────────────────────────────────

    pub fn stmt(expr: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = expr.uses.clone();
        n.sets = expr.sets.clone();
        n.msets = expr.msets.clone();
        n.exit = expr.exit;
        n.can_break = expr.can_break;
        n.must_break = expr.must_break;
        n.kind = ExprKind::Stmt(Box::new(expr));
        n
    }

    /// Sequence two statements. When the first must escape and the
    /// second is not a jump target, the second can never run: it is
    /// reported and flagged unreachable, and the escape carries through
    /// the pair. A jump target resets the exit to its own.
    pub fn concat(reporter: &dyn Reporter, first: ExprNode, mut second: ExprNode) -> ExprNode {
        let exit = if first.exit.must_escape() && !second.jump_target {
            if second.reachable && !second.is_empty() && !second.is_error() {
                reporter.report(Diagnostic::warning(
                    Category::UnreachableCode,
                    "statement cannot be reached".to_string(),
                    second.loc.clone(),
                ));
                second.mark_unreachable();
            }
            first.exit
        } else if second.jump_target {
            second.exit
        } else {
            exit_seq(first.exit, second.exit)
        };

        let loc = first.loc.clone();
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = both(&first.uses, &second.uses);
        n.sets = both(&first.sets, &second.sets);
        n.msets = both(&first.msets, &second.msets);
        n.exit = exit;
        n.jump_target = first.jump_target;
        n.can_break = first.can_break || second.can_break;
        n.must_break =
            first.must_break || (!first.exit.must_escape() && second.must_break);
        n.kind = ExprKind::StmtList {
            first: Box::new(first),
            second: Box::new(second),
        };
        n
    }

    pub fn block(body: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = body.uses.clone();
        n.sets = body.sets.clone();
        n.msets = body.msets.clone();
        n.exit = body.exit;
        n.can_break = body.can_break;
        n.must_break = body.must_break;
        n.jump_target = body.jump_target;
        n.kind = ExprKind::Block(Box::new(body));
        n
    }

    pub fn label(name: impl Into<String>, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Label(name.into()), Ty::Void, loc);
        n.jump_target = true;
        n
    }

    pub fn goto_stmt(name: impl Into<String>, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Goto(name.into()), Ty::Void, loc);
        n.exit = ExitMode::MustJump;
        n
    }

    pub fn continue_stmt(loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Continue, Ty::Void, loc);
        n.exit = ExitMode::MustJump;
        n
    }

    pub fn break_stmt(loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Break, Ty::Void, loc);
        n.exit = ExitMode::MustJump;
        n.can_break = true;
        n.must_break = true;
        n
    }

    pub fn return_stmt(value: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = value.uses.clone();
        n.sets = value.sets.clone();
        n.msets = value.msets.clone();
        n.exit = ExitMode::MustReturn;
        n.kind = ExprKind::Return(Some(Box::new(value)));
        n
    }

    pub fn return_void(loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Return(None), Ty::Void, loc);
        n.exit = ExitMode::MustReturn;
        n
    }

    // ── Conditionals and loops ──────────────────────────────────────

    /// Single-armed `if`: a diverging branch makes the whole statement
    /// only possibly divergent.
    pub fn if_stmt(pred: ExprNode, then: ExprNode, loc: Loc) -> ExprNode {
        let branch = if then.exit == ExitMode::Normal {
            ExitMode::Normal
        } else {
            ExitMode::MayDiverge
        };
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = both(&pred.uses, &then.uses);
        n.sets = both(&pred.sets, &then.sets);
        n.msets = both(&pred.msets, &then.msets);
        n.exit = exit_seq(pred.exit, branch);
        n.can_break = then.can_break;
        n.kind = ExprKind::If {
            pred: Box::new(pred),
            then: Box::new(then),
        };
        n
    }

    pub fn if_else(pred: ExprNode, then: ExprNode, other: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = both(&pred.uses, &both(&then.uses, &other.uses));
        n.sets = both(&pred.sets, &both(&then.sets, &other.sets));
        n.msets = both(&pred.msets, &both(&then.msets, &other.msets));
        n.exit = exit_seq(pred.exit, then.exit.branch_join(other.exit));
        n.can_break = then.can_break || other.can_break;
        n.must_break = then.must_break && other.must_break;
        n.kind = ExprKind::IfElse {
            pred: Box::new(pred),
            then: Box::new(then),
            other: Box::new(other),
        };
        n
    }

    /// Grammar marker around a loop predicate; facts pass through.
    pub fn while_pred(pred: ExprNode) -> ExprNode {
        let loc = pred.loc.clone();
        let mut n = ExprNode::bare(ExprKind::Error, pred.ty.clone(), loc);
        n.value = pred.value.clone();
        n.uses = pred.uses.clone();
        n.sets = pred.sets.clone();
        n.msets = pred.msets.clone();
        n.guards = pred.guards.clone();
        n.exit = pred.exit;
        n.kind = ExprKind::WhilePred(Box::new(pred));
        n
    }

    /// `while`: the body may run zero times, so its exit behavior never
    /// propagates out of the loop. Breaks bind here.
    pub fn while_stmt(pred: ExprNode, body: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = both(&pred.uses, &body.uses);
        n.sets = both(&pred.sets, &body.sets);
        n.msets = both(&pred.msets, &body.msets);
        n.exit = if pred.exit.must_escape() {
            pred.exit
        } else {
            ExitMode::Normal
        };
        n.kind = ExprKind::While {
            pred: Box::new(pred),
            body: Box::new(body),
        };
        n
    }

    /// `do`-`while`: the body runs at least once, so a diverging body
    /// with no break path diverges.
    pub fn do_while(body: ExprNode, pred: ExprNode, loc: Loc) -> ExprNode {
        let body_exit = if body.can_break {
            ExitMode::Normal
        } else {
            body.exit
        };
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = both(&body.uses, &pred.uses);
        n.sets = both(&body.sets, &pred.sets);
        n.msets = both(&body.msets, &pred.msets);
        n.exit = exit_seq(body_exit, pred.exit);
        n.kind = ExprKind::DoWhile {
            body: Box::new(body),
            pred: Box::new(pred),
        };
        n
    }

    /// The classic `for` triple, combined before the body arrives.
    pub fn for_pred(init: ExprNode, cond: ExprNode, inc: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = both(&init.uses, &both(&cond.uses, &inc.uses));
        n.sets = both(&init.sets, &both(&cond.sets, &inc.sets));
        n.msets = both(&init.msets, &both(&cond.msets, &inc.msets));
        n.exit = exit_seq(init.exit, cond.exit);
        n.kind = ExprKind::ForPred {
            init: Box::new(init),
            cond: Box::new(cond),
            inc: Box::new(inc),
        };
        n
    }

    pub fn for_stmt(pred: ExprNode, body: ExprNode, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = both(&pred.uses, &body.uses);
        n.sets = both(&pred.sets, &body.sets);
        n.msets = both(&pred.msets, &body.msets);
        n.exit = if pred.exit.must_escape() {
            pred.exit
        } else {
            ExitMode::Normal
        };
        n.kind = ExprKind::For {
            pred: Box::new(pred),
            body: Box::new(body),
        };
        n
    }

    // ── switch ──────────────────────────────────────────────────────

    /// `switch` diverges only when every path through the body escapes:
    /// the body must escape, contain no break, and handle every value
    /// via a default marker.
    pub fn switch_stmt(pred: ExprNode, body: ExprNode, loc: Loc) -> ExprNode {
        let exhaustive = contains_default(&body);
        let exit = if body.exit.must_escape() && !body.can_break && exhaustive {
            body.exit
        } else {
            exit_seq(pred.exit, ExitMode::Normal)
        };
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = both(&pred.uses, &body.uses);
        n.sets = both(&pred.sets, &body.sets);
        n.msets = both(&pred.msets, &body.msets);
        n.exit = exit;
        n.kind = ExprKind::Switch {
            pred: Box::new(pred),
            body: Box::new(body),
        };
        n
    }

    /// A case marker. `fallthrough` records whether control can arrive
    /// from the preceding group; the grammar knows whether a `break`
    /// intervened.
    pub fn case_marker(value: ExprNode, fallthrough: bool, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        n.uses = value.uses.clone();
        n.jump_target = true;
        n.kind = ExprKind::Case {
            value: Box::new(value),
            fallthrough,
        };
        n
    }

    pub fn default_marker(fallthrough: bool, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Default { fallthrough }, Ty::Void, loc);
        n.jump_target = true;
        n
    }

    // ── Initializers ────────────────────────────────────────────────

    /// A declarator initializer: definitely sets the declared storage.
    pub fn initialization(
        name: impl Into<String>,
        sref: Option<StoreRef>,
        init: ExprNode,
        loc: Loc,
    ) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, init.ty.clone(), loc);
        n.uses = init.uses.clone();
        n.msets = init.msets.clone();
        n.sets = init.sets.clone();
        if let Some(sref) = sref {
            n.sets.insert(sref);
        }
        n.exit = init.exit;
        n.kind = ExprKind::Init {
            name: name.into(),
            init: Box::new(init),
        };
        n
    }

    pub fn init_block(items: Vec<ExprNode>, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Unknown, loc);
        for item in &items {
            n.uses.union_with(&item.uses);
            n.sets.union_with(&item.sets);
            n.msets.union_with(&item.msets);
        }
        n.kind = ExprKind::InitBlock(items);
        n
    }

    // ── Iterators ───────────────────────────────────────────────────

    /// An iteration statement: `iter(args) body end`. The start and end
    /// symbols are observed by id; the body runs zero or more times, so
    /// its exit behavior stays inside like a `while` body's.
    pub fn iter_loop(
        iter: SymbolId,
        args: Vec<ExprNode>,
        body: ExprNode,
        end: SymbolId,
        loc: Loc,
    ) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Void, loc);
        for a in &args {
            n.uses.union_with(&a.uses);
            n.sets.union_with(&a.sets);
            n.msets.union_with(&a.msets);
        }
        n.uses.union_with(&body.uses);
        n.sets.union_with(&body.sets);
        n.msets.union_with(&body.msets);
        n.kind = ExprKind::Iter {
            iter,
            args,
            body: Box::new(body),
            end,
        };
        n
    }

    pub fn iter_call(iter: SymbolId, args: Vec<ExprNode>, loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, Ty::Unknown, loc);
        for a in &args {
            n.uses.union_with(&a.uses);
            n.sets.union_with(&a.sets);
            n.msets.union_with(&a.msets);
        }
        n.kind = ExprKind::IterCall { iter, args };
        n
    }

    /// The distinguished node whose only effect is ending the process.
    pub fn must_exit(loc: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::MustExit, Ty::Void, loc);
        n.exit = ExitMode::MustExit;
        n
    }

    // ── Wrap and maintenance operations ─────────────────────────────

    /// Wrap in parentheses. Every fact carries through; the location
    /// moves to the open paren.
    pub fn add_parens(self, lparen: Loc) -> ExprNode {
        let mut n = ExprNode::bare(ExprKind::Error, self.ty.clone(), lparen);
        n.value = self.value.clone();
        n.sref = self.sref.clone();
        n.uses = self.uses.clone();
        n.sets = self.sets.clone();
        n.msets = self.msets.clone();
        n.guards = self.guards.clone();
        n.exit = self.exit;
        n.can_break = self.can_break;
        n.must_break = self.must_break;
        n.jump_target = self.jump_target;
        n.kind = ExprKind::Parens(Box::new(self));
        n
    }

    pub fn update_location(&mut self, loc: Loc) {
        self.loc = loc;
    }

    pub fn mark_unreachable(&mut self) {
        self.reachable = false;
    }
}

fn contains_default(e: &ExprNode) -> bool {
    match &e.kind {
        ExprKind::Default { .. } => true,
        ExprKind::StmtList { first, second } => {
            contains_default(first) || contains_default(second)
        }
        ExprKind::Block(body) | ExprKind::Stmt(body) | ExprKind::Parens(body) => {
            contains_default(body)
        }
        _ => false,
    }
}

/// Fold a comparison of two known values to 0 or 1.
fn fold_comparison(op: BinOp, lhs: &ExprNode, rhs: &ExprNode) -> Option<ConstValue> {
    use std::cmp::Ordering;
    fn numeric(v: &ConstValue) -> Option<f64> {
        match v {
            ConstValue::Int(i) | ConstValue::Char(i) => Some(*i as f64),
            ConstValue::Float(f) => Some(*f),
            ConstValue::Str(_) => None,
        }
    }
    let a = lhs.value.as_ref()?;
    let b = rhs.value.as_ref()?;
    let ord = match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => numeric(a)?.partial_cmp(&numeric(b)?)?,
    };
    let holds = match op {
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        BinOp::Eq => ord == Ordering::Equal,
        BinOp::Ne => ord != Ordering::Equal,
        _ => return None,
    };
    Some(ConstValue::Int(holds as i64))
}

/// Guard facts from a pointer-against-null comparison: `p != 0` proves
/// `p` non-null on the true branch, `p == 0` on the false branch.
fn null_comparison_guard(op: BinOp, lhs: &ExprNode, rhs: &ExprNode) -> GuardSet {
    let pointer_side = |e: &ExprNode| -> Option<StoreRef> {
        if e.ty.is_pointer_or_array() {
            e.sref.clone()
        } else {
            None
        }
    };
    let is_null = |e: &ExprNode| e.value.as_ref().map(|v| v.is_zero()).unwrap_or(false);

    let guarded = if is_null(rhs) {
        pointer_side(lhs)
    } else if is_null(lhs) {
        pointer_side(rhs)
    } else {
        None
    };

    let mut guards = GuardSet::new();
    if let Some(sref) = guarded {
        match op {
            BinOp::Ne => {
                guards.on_true.insert(sref);
            }
            BinOp::Eq => {
                guards.on_false.insert(sref);
            }
            _ => {}
        }
    }
    guards
}

// ── Rendering ───────────────────────────────────────────────────────

impl fmt::Display for ExprNode {
    /// Best-effort source rendering for diagnostics. Never load-bearing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Error => write!(f, "<error>"),
            ExprKind::Empty => Ok(()),
            ExprKind::Parens(e) => write!(f, "({})", e),
            ExprKind::Ident { name, .. } => write!(f, "{}", name),
            ExprKind::NumLit | ExprKind::CharLit | ExprKind::StrLit => match &self.value {
                Some(v) => write!(f, "{}", v),
                None => write!(f, "<literal>"),
            },
            ExprKind::Assign { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            ExprKind::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::PreInc | UnaryOp::PreDec => write!(f, "{}{}", op, operand),
                _ => write!(f, "{}{}", op, operand),
            },
            ExprKind::Post { op, operand } => write!(f, "{}{}", operand, op),
            ExprKind::SizeofExpr(e) => write!(f, "sizeof({})", e),
            ExprKind::SizeofType(t) => write!(f, "sizeof({})", t),
            ExprKind::AlignofExpr(e) => write!(f, "alignof({})", e),
            ExprKind::AlignofType(t) => write!(f, "alignof({})", t),
            ExprKind::Offsetof { ty, fields } => {
                write!(f, "offsetof({}, {})", ty, fields.join("."))
            }
            ExprKind::Cast { ty, operand } => write!(f, "({}){}", ty, operand),
            ExprKind::Index { array, index } => write!(f, "{}[{}]", array, index),
            ExprKind::Field { record, field } => write!(f, "{}.{}", record, field),
            ExprKind::Arrow { record, field } => write!(f, "{}->{}", record, field),
            ExprKind::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            ExprKind::Comma { first, second } => write!(f, "{}, {}", first, second),
            ExprKind::Cond { pred, then, other } => {
                write!(f, "{} ? {} : {}", pred, then, other)
            }
            ExprKind::VaArg { ap, ty } => write!(f, "va_arg({}, {})", ap, ty),
            ExprKind::Stmt(e) => write!(f, "{};", e),
            ExprKind::StmtList { first, second } => write!(f, "{} {}", first, second),
            ExprKind::Block(body) => write!(f, "{{ {} }}", body),
            ExprKind::Label(name) => write!(f, "{}:", name),
            ExprKind::Goto(name) => write!(f, "goto {};", name),
            ExprKind::Continue => write!(f, "continue;"),
            ExprKind::Break => write!(f, "break;"),
            ExprKind::Return(Some(e)) => write!(f, "return {};", e),
            ExprKind::Return(None) => write!(f, "return;"),
            ExprKind::If { pred, then } => write!(f, "if ({}) {}", pred, then),
            ExprKind::IfElse { pred, then, other } => {
                write!(f, "if ({}) {} else {}", pred, then, other)
            }
            ExprKind::While { pred, body } => write!(f, "while ({}) {}", pred, body),
            ExprKind::WhilePred(pred) => write!(f, "{}", pred),
            ExprKind::DoWhile { body, pred } => write!(f, "do {} while ({});", body, pred),
            ExprKind::For { pred, body } => write!(f, "for {} {}", pred, body),
            ExprKind::ForPred { init, cond, inc } => {
                write!(f, "({}; {}; {})", init, cond, inc)
            }
            ExprKind::Switch { pred, body } => write!(f, "switch ({}) {}", pred, body),
            ExprKind::Case { value, .. } => write!(f, "case {}:", value),
            ExprKind::Default { .. } => write!(f, "default:"),
            ExprKind::Init { name, init } => write!(f, "{} = {}", name, init),
            ExprKind::InitBlock(items) => {
                write!(f, "{{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, " }}")
            }
            ExprKind::Iter { args, body, .. } => {
                write!(f, "iter(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ") {}", body)
            }
            ExprKind::IterCall { args, .. } => {
                write!(f, "itercall(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            ExprKind::Tok(text) => write!(f, "{}", text),
            ExprKind::MustExit => write!(f, "<exit>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::clauses::{EffectContract, GlobalsSpec};
    use vigil_core::diag::DiagnosticLog;
    use vigil_core::store::{RefBase, VarScope};
    use vigil_core::types::{Field, RecordTy};

    fn var(name: &str, ty: Ty) -> ExprNode {
        let entry = Entry::var(name, ty, VarScope::Local, Loc::dummy());
        ExprNode::ident(SymbolId(0), &entry, Loc::dummy())
    }

    fn var_ref(name: &str, ty: Ty) -> StoreRef {
        StoreRef::var(name, VarScope::Local, ty)
    }

    fn lit(v: i64) -> ExprNode {
        ExprNode::int_lit(v, Ty::Int, Loc::dummy())
    }

    // ── Use/set propagation tests ───────────────────────────────────

    #[test]
    fn test_simple_assignment_is_disjoint() {
        // x = y + z
        let sum = ExprNode::binary(
            BinOp::Add,
            var("y", Ty::Int),
            var("z", Ty::Int),
            Loc::dummy(),
        );
        let a = ExprNode::assign(AssignOp::Assign, var("x", Ty::Int), sum, Loc::dummy());

        assert_eq!(a.sets.len(), 1);
        assert!(a.sets.contains(&var_ref("x", Ty::Int)));
        assert!(!a.uses.contains(&var_ref("x", Ty::Int)));
        assert!(a.uses.contains(&var_ref("y", Ty::Int)));
        assert!(a.uses.contains(&var_ref("z", Ty::Int)));
        for used in a.uses.iter() {
            assert!(!a.sets.contains(used), "{} both used and set", used);
        }
    }

    #[test]
    fn test_compound_assignment_reads_target() {
        let a = ExprNode::assign(
            AssignOp::AddAssign,
            var("x", Ty::Int),
            var("y", Ty::Int),
            Loc::dummy(),
        );
        assert!(a.uses.contains(&var_ref("x", Ty::Int)));
        assert!(a.sets.contains(&var_ref("x", Ty::Int)));
    }

    #[test]
    fn test_indexed_assignment_keeps_addressing_reads() {
        // a[i] = v
        let fetch = ExprNode::index(
            var("a", Ty::array(Ty::Int, Some(8))),
            var("i", Ty::Int),
            Loc::dummy(),
        );
        let elem = fetch.sref.clone().unwrap();
        let asg = ExprNode::assign(AssignOp::Assign, fetch, var("v", Ty::Int), Loc::dummy());

        assert!(asg.sets.contains(&elem));
        assert!(!asg.uses.contains(&elem));
        assert!(asg.uses.contains(&var_ref("a", Ty::array(Ty::Int, Some(8)))));
        assert!(asg.uses.contains(&var_ref("i", Ty::Int)));
        assert!(asg.uses.contains(&var_ref("v", Ty::Int)));
    }

    #[test]
    fn test_address_of_does_not_read() {
        let n = ExprNode::unary(UnaryOp::AddrOf, var("x", Ty::Int), Loc::dummy());
        assert!(n.uses.is_empty());
        assert_eq!(n.ty, Ty::pointer(Ty::Int));
    }

    #[test]
    fn test_increment_uses_and_sets() {
        let n = ExprNode::post(PostOp::Inc, var("x", Ty::Int), Loc::dummy());
        assert!(n.uses.contains(&var_ref("x", Ty::Int)));
        assert!(n.sets.contains(&var_ref("x", Ty::Int)));
    }

    // ── Folding tests ───────────────────────────────────────────────

    #[test]
    fn test_comparison_of_known_values_folds() {
        let n = ExprNode::binary(BinOp::Lt, lit(3), lit(5), Loc::dummy());
        assert_eq!(n.value, Some(ConstValue::Int(1)));
        assert_eq!(n.ty, Ty::Bool);

        let n = ExprNode::binary(BinOp::Eq, lit(3), lit(5), Loc::dummy());
        assert_eq!(n.value, Some(ConstValue::Int(0)));

        // Arithmetic does not fold.
        let n = ExprNode::binary(BinOp::Add, lit(3), lit(5), Loc::dummy());
        assert_eq!(n.value, None);
    }

    #[test]
    fn test_sizeof_folds_without_evaluating() {
        let n = ExprNode::sizeof_expr(var("x", Ty::Int), Loc::dummy());
        assert_eq!(n.value, Some(ConstValue::Int(4)));
        assert!(n.uses.is_empty());

        let n = ExprNode::sizeof_type(Ty::pointer(Ty::Void), Loc::dummy());
        assert_eq!(n.value, Some(ConstValue::Int(8)));

        // Incomplete layout stays unfolded.
        let n = ExprNode::sizeof_type(Ty::Void, Loc::dummy());
        assert_eq!(n.value, None);
    }

    #[test]
    fn test_offsetof_folds_fixed_layouts() {
        let rec = Ty::Struct(RecordTy {
            tag: Some("pair".into()),
            fields: vec![
                Field {
                    name: "x".into(),
                    ty: Ty::Int,
                },
                Field {
                    name: "y".into(),
                    ty: Ty::Double,
                },
            ],
            defined: true,
        });
        let n = ExprNode::offsetof(rec, vec!["y".into()], Loc::dummy());
        assert_eq!(n.value, Some(ConstValue::Int(8)));
    }

    // ── Guard tests ─────────────────────────────────────────────────

    #[test]
    fn test_null_comparison_guards() {
        let p = var("p", Ty::pointer(Ty::Int));
        let pref = p.sref.clone().unwrap();
        let null = lit(0);
        let ne = ExprNode::binary(BinOp::Ne, p, null, Loc::dummy());
        assert!(ne.guards.on_true.contains(&pref));
        assert!(ne.guards.on_false.is_empty());

        let p = var("p", Ty::pointer(Ty::Int));
        let eq = ExprNode::binary(BinOp::Eq, p, lit(0), Loc::dummy());
        assert!(eq.guards.on_false.contains(&pref));
    }

    #[test]
    fn test_logical_guard_composition() {
        // p && q: both non-null on the true branch.
        let p = var("p", Ty::pointer(Ty::Int));
        let q = var("q", Ty::pointer(Ty::Int));
        let pref = p.sref.clone().unwrap();
        let qref = q.sref.clone().unwrap();
        let and = ExprNode::binary(BinOp::And, p, q, Loc::dummy());
        assert!(and.guards.on_true.contains(&pref));
        assert!(and.guards.on_true.contains(&qref));

        // !p swaps the branches.
        let mut not = ExprNode::unary(
            UnaryOp::Not,
            var("p", Ty::pointer(Ty::Int)),
            Loc::dummy(),
        );
        assert!(not.guards.on_false.contains(&pref));
        not.guards.invert();
        assert!(not.guards.on_true.contains(&pref));
    }

    // ── Call tests ──────────────────────────────────────────────────

    fn callee(name: &str, ret: Ty) -> ExprNode {
        let ty = Ty::function(ret, vec![], false);
        let entry = Entry::function(name, ty, VarScope::Global, Loc::dummy());
        ExprNode::ident(SymbolId(9), &entry, Loc::dummy())
    }

    #[test]
    fn test_call_maps_contract_onto_actuals() {
        let info = FunctionInfo {
            contract: EffectContract {
                globals: GlobalsSpec::Listed(RefSet::single(StoreRef::var(
                    "g",
                    VarScope::Global,
                    Ty::Int,
                ))),
                modifies: Some(RefSet::single(
                    StoreRef::param(0, Ty::pointer(Ty::Int)).deref(Ty::Int),
                )),
                state: vec![],
                warn: None,
            },
            ..FunctionInfo::default()
        };

        let arg = var("buf", Ty::pointer(Ty::Int));
        let call = ExprNode::call(callee("f", Ty::Int), vec![arg], Some(&info), Loc::dummy());

        assert!(call.uses.contains(&StoreRef::var("g", VarScope::Global, Ty::Int)));
        let mapped = StoreRef::new(
            RefBase::Deref(Box::new(RefBase::Var {
                name: "buf".into(),
                scope: VarScope::Local,
            })),
            Ty::Int,
        );
        assert!(call.msets.contains(&mapped));
        assert!(call.sets.is_empty());
        assert_eq!(call.exit, ExitMode::Normal);
    }

    #[test]
    fn test_unknown_callee_is_conservative() {
        let call = ExprNode::call(callee("mystery", Ty::Int), vec![], None, Loc::dummy());
        assert!(call.uses.contains(&StoreRef::unknown()));
        assert!(call.msets.contains(&StoreRef::unknown()));
    }

    #[test]
    fn test_never_returning_callee_exits() {
        let info = FunctionInfo {
            never_returns: true,
            ..FunctionInfo::default()
        };
        let call = ExprNode::call(callee("fatal", Ty::Void), vec![], Some(&info), Loc::dummy());
        assert_eq!(call.exit, ExitMode::MustExit);
    }

    // ── Control flow tests ──────────────────────────────────────────

    fn returning() -> ExprNode {
        ExprNode::return_stmt(lit(1), Loc::dummy())
    }

    #[test]
    fn test_if_else_divergence() {
        let both = ExprNode::if_else(var("c", Ty::Int), returning(), returning(), Loc::dummy());
        assert_eq!(both.exit, ExitMode::MustReturn);

        let one = ExprNode::if_stmt(var("c", Ty::Int), returning(), Loc::dummy());
        assert_eq!(one.exit, ExitMode::MayDiverge);

        let exits = ExprNode::if_else(
            var("c", Ty::Int),
            ExprNode::must_exit(Loc::dummy()),
            ExprNode::must_exit(Loc::dummy()),
            Loc::dummy(),
        );
        assert_eq!(exits.exit, ExitMode::MustExit);
    }

    #[test]
    fn test_unreachable_statement_after_divergence() {
        let log = DiagnosticLog::new();
        let seq = ExprNode::concat(
            &log,
            returning(),
            ExprNode::stmt(var("x", Ty::Int), Loc::dummy()),
        );
        assert_eq!(seq.exit, ExitMode::MustReturn);
        assert_eq!(log.count_of(Category::UnreachableCode), 1);
        match &seq.kind {
            ExprKind::StmtList { second, .. } => assert!(!second.reachable),
            other => panic!("expected statement list, got {:?}", other),
        }
    }

    #[test]
    fn test_jump_target_resumes_flow() {
        let log = DiagnosticLog::new();
        let seq = ExprNode::concat(&log, returning(), ExprNode::label("out", Loc::dummy()));
        assert!(log.is_empty());
        assert_eq!(seq.exit, ExitMode::Normal);
    }

    #[test]
    fn test_while_contains_divergence_but_do_while_does_not() {
        let w = ExprNode::while_stmt(var("c", Ty::Int), returning(), Loc::dummy());
        assert_eq!(w.exit, ExitMode::Normal);

        let d = ExprNode::do_while(returning(), var("c", Ty::Int), Loc::dummy());
        assert_eq!(d.exit, ExitMode::MustReturn);
    }

    #[test]
    fn test_break_escapes_do_while_divergence() {
        let log = DiagnosticLog::new();
        // do { if (c) break; return 1; } while (c);
        let body = ExprNode::concat(
            &log,
            ExprNode::if_stmt(
                var("c", Ty::Int),
                ExprNode::break_stmt(Loc::dummy()),
                Loc::dummy(),
            ),
            returning(),
        );
        assert!(body.can_break);
        let d = ExprNode::do_while(body, var("c", Ty::Int), Loc::dummy());
        assert_eq!(d.exit, ExitMode::Normal);
    }

    #[test]
    fn test_switch_divergence_requires_default() {
        let log = DiagnosticLog::new();
        let arm = |fall| ExprNode::concat(&log, ExprNode::case_marker(lit(1), fall, Loc::dummy()), returning());

        // No default marker: control can fall past the switch.
        let s = ExprNode::switch_stmt(var("c", Ty::Int), arm(false), Loc::dummy());
        assert_eq!(s.exit, ExitMode::Normal);

        // With a default and no breaks, every path returns.
        let body = ExprNode::concat(
            &log,
            arm(false),
            ExprNode::concat(
                &log,
                ExprNode::default_marker(false, Loc::dummy()),
                returning(),
            ),
        );
        let s = ExprNode::switch_stmt(var("c", Ty::Int), body, Loc::dummy());
        assert_eq!(s.exit, ExitMode::MustReturn);
    }

    // ── Wrap tests ──────────────────────────────────────────────────

    #[test]
    fn test_parens_preserve_facts() {
        let p = var("p", Ty::pointer(Ty::Int));
        let pref = p.sref.clone().unwrap();
        let open = Loc::new("t.c", 4, 1);
        let wrapped = p.add_parens(open.clone());
        assert_eq!(wrapped.loc, open);
        assert_eq!(wrapped.sref.as_ref(), Some(&pref));
        assert!(wrapped.uses.contains(&pref));
        assert!(wrapped.guards.on_true.contains(&pref));
    }

    #[test]
    fn test_rendering() {
        let a = ExprNode::assign(
            AssignOp::AddAssign,
            var("x", Ty::Int),
            lit(3),
            Loc::dummy(),
        );
        assert_eq!(a.to_string(), "x += 3");

        let c = ExprNode::call(callee("f", Ty::Int), vec![lit(1), lit(2)], None, Loc::dummy());
        assert_eq!(c.to_string(), "f(1, 2)");

        let fetch = ExprNode::index(
            var("a", Ty::array(Ty::Int, None)),
            var("i", Ty::Int),
            Loc::dummy(),
        );
        assert_eq!(fetch.to_string(), "a[i]");
    }
}
