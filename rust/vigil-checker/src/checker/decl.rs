//! Declaration reconciliation.
//!
//! ## Design overview
//!
//! The grammar drives declarations through a small lifecycle: a
//! declaration begins (variables, typedef, or globals list), storage
//! classes and effect clauses accumulate in the [`DeclContext`], each
//! declarator is reconciled against the symbol table, and the
//! declaration ends. Exactly one mode applies per declarator:
//!
//! - a globals-list item resolves an existing entry and appends a
//!   qualified copy of its storage reference to the pending set;
//! - with an old-style parameter list in flight, declarators stamp the
//!   types of the saved parameters;
//! - inside an iterator definition, declarators matching yield
//!   parameters bind them directly;
//! - ordinary declarators install variables or functions, attaching
//!   pending contracts to the latter;
//! - typedefs handle boolean conventions and datatype abstraction.
//!
//! Anything recoverable is reported and patched up; protocol violations
//! and unrecoverable source errors return [`CheckFatal`].

use crate::checker::clauses::{
    resolve_globals_id, resolve_modifies_id, resolve_state_clause_id, StateClause, WarnClause,
};
use crate::checker::context::{DeclMode, Declarator, QualType};
use crate::checker::expr::ExprNode;
use crate::checker::symtab::{Entry, EntryKind, SpecialCode, Storage, SymbolId};
use crate::checker::Checker;
use crate::CheckFatal;
use log::debug;
use vigil_core::config::CheckLevel;
use vigil_core::diag::Category;
use vigil_core::loc::Loc;
use vigil_core::qual::Qual;
use vigil_core::store::{RefBase, RefSet, StoreRef, VarScope};
use vigil_core::types::{Field, Param, RecordTy, Ty};

fn check_level_from(q: Qual) -> Option<CheckLevel> {
    match q {
        Qual::Checked => Some(CheckLevel::Checked),
        Qual::CheckMod => Some(CheckLevel::CheckMod),
        Qual::CheckedStrict => Some(CheckLevel::CheckedStrict),
        Qual::Unchecked => Some(CheckLevel::Unchecked),
        _ => None,
    }
}

/// Build the field list for one member declaration group.
pub fn field_group(base: &QualType, declarators: &[Declarator]) -> Vec<Field> {
    declarators
        .iter()
        .map(|d| Field {
            name: d.name.clone(),
            ty: d.resolved_type(&base.ty),
        })
        .collect()
}

/// An unnamed struct/union member, merged into the outer field list at
/// record declaration.
pub fn unnamed_member(ty: Ty) -> Field {
    Field {
        name: String::new(),
        ty,
    }
}

impl Checker {
    // ── Declaration lifecycle ───────────────────────────────────────

    pub fn begin_var_declaration(&mut self, base: QualType) -> Result<(), CheckFatal> {
        self.ctx.begin_vars(base)
    }

    pub fn begin_typedef_declaration(&mut self, base: QualType) -> Result<(), CheckFatal> {
        self.ctx.begin_typedef(base)
    }

    pub fn begin_globals_list(&mut self) -> Result<(), CheckFatal> {
        self.ctx.begin_globals_list()
    }

    pub fn set_storage_class(&mut self, storage: Storage, loc: &Loc) {
        let previous = self.ctx.set_storage(storage);
        if previous != Storage::None && previous != storage {
            self.warn(
                Category::InconsistentDeclaration,
                format!("conflicting storage classes {:?} and {:?}", previous, storage),
                loc,
            );
        }
    }

    pub fn end_declaration(&mut self) {
        self.ctx.end_declaration();
    }

    // ── Declarator dispatch ─────────────────────────────────────────

    /// Reconcile one declarator against the in-flight declaration.
    /// Returns the installed symbol when one was created or updated.
    pub fn reconcile_declarator(&mut self, d: Declarator) -> Result<Option<SymbolId>, CheckFatal> {
        let mode = self.ctx.mode().clone();
        match mode {
            DeclMode::GlobalsList => self.reconcile_globals_item(d).map(|_| None),
            DeclMode::Vars(base) => {
                if self.ctx.in_old_style_params() {
                    return self.stamp_old_style_param(d, &base);
                }
                if let Some(iter) = self.ctx.current_iter() {
                    if let Some(id) = self.bind_iter_param(iter, &d, &base) {
                        return Ok(Some(id));
                    }
                }
                let resolved = d.resolved_type(&base.ty);
                if matches!(resolved, Ty::Function(_)) {
                    self.reconcile_function(d, resolved, &base)
                } else {
                    self.reconcile_variable(d, resolved, &base)
                }
            }
            DeclMode::Typedef(base) => self.reconcile_typedef(d, &base),
            DeclMode::None => {
                self.warn(
                    Category::Syntax,
                    format!("declarator {} appears outside any declaration", d.name),
                    &d.loc,
                );
                Ok(None)
            }
        }
    }

    // ── Globals-list items ──────────────────────────────────────────

    /// One item of a globals list: resolve the declared entry, check the
    /// repeated type, qualify a copy of its storage reference, and
    /// append it to the pending set. An undeclared name draws exactly
    /// one diagnostic and leaves the pending set unchanged.
    fn reconcile_globals_item(&mut self, d: Declarator) -> Result<(), CheckFatal> {
        let Some(id) = self.table.lookup(&d.name) else {
            self.warn(
                Category::UnrecognizedIdentifier,
                format!("unrecognized identifier in globals list: {}", d.name),
                &d.loc,
            );
            return Ok(());
        };

        let (declared_ty, mut sref) = {
            let entry = self.table.entry(id);
            (entry.ty.clone(), entry.sref.clone())
        };

        // The list may repeat the type; the original declaration wins on
        // a mismatch.
        if !d.ty.is_unknown() && !d.ty.matches(&declared_ty) {
            self.warn(
                Category::InconsistentDeclaration,
                format!(
                    "{} listed as {} but declared as {}, keeping the declared type",
                    d.name, d.ty, declared_ty
                ),
                &d.loc,
            );
        }

        for q in &d.quals {
            if q.is_global_state() {
                sref.def = sref.def.reflect_global_qual(*q);
            } else if q.is_alloc() {
                let indirected = declared_ty.is_pointer_or_array()
                    || declared_ty.is_struct_or_union()
                    || declared_ty.is_abstract()
                    || declared_ty.is_unknown();
                if indirected {
                    sref.def = sref.def.reflect_alloc_qual(*q);
                } else {
                    self.warn(
                        Category::Syntax,
                        format!(
                            "{} qualifier needs indirected storage, {} has type {}",
                            q, d.name, declared_ty
                        ),
                        &d.loc,
                    );
                }
            } else if q.is_null() {
                sref.null = sref.null.reflect_null_qual(*q);
            } else if q.is_c_qual() {
                // const and volatile are repeated harmlessly.
            } else {
                self.warn(
                    Category::Syntax,
                    format!("qualifier {} cannot be used in a globals list", q),
                    &d.loc,
                );
            }
        }

        self.ctx.add_global(sref)
    }

    // ── Old-style parameter stamping ────────────────────────────────

    /// A declaration between an old-style parameter list and the body:
    /// the declarator must name one of the saved parameters, whose type
    /// it stamps.
    fn stamp_old_style_param(
        &mut self,
        d: Declarator,
        base: &QualType,
    ) -> Result<Option<SymbolId>, CheckFatal> {
        let resolved = d.resolved_type(&base.ty);
        let unlisted = || CheckFatal::UnlistedParameter {
            name: d.name.clone(),
            loc: d.loc.clone(),
        };

        let id = self.table.lookup(&d.name).ok_or_else(unlisted)?;
        if !self.table.entry(id).is_param() {
            return Err(unlisted());
        }

        let entry = self.table.entry_mut(id);
        entry.set_type(resolved);
        if let EntryKind::Param { typed, .. } = &mut entry.kind {
            *typed = true;
        }
        for q in base.quals.iter().chain(d.quals.iter()) {
            if q.is_null() {
                entry.sref.null = entry.sref.null.reflect_null_qual(*q);
            } else if q.is_alloc() {
                entry.sref.def = entry.sref.def.reflect_alloc_qual(*q);
            }
        }
        Ok(Some(id))
    }

    // ── Iterator yield binding ──────────────────────────────────────

    /// Inside an iterator definition, a declarator naming a yield
    /// parameter binds it directly, skipping ordinary processing.
    fn bind_iter_param(
        &mut self,
        iter: SymbolId,
        d: &Declarator,
        base: &QualType,
    ) -> Option<SymbolId> {
        let position = {
            let entry = self.table.entry(iter);
            let position = entry
                .ty
                .params()?
                .iter()
                .position(|p| p.name.as_deref() == Some(d.name.as_str()))?;
            match &entry.kind {
                EntryKind::Iter { yields } if yields.contains(&position) => position,
                _ => return None,
            }
        };
        let resolved = d.resolved_type(&base.ty);
        debug!("binding yield parameter {} of the current iterator", d.name);
        Some(
            self.table
                .declare(Entry::param(d.name.clone(), position, resolved, d.loc.clone())),
        )
    }

    // ── Variables ───────────────────────────────────────────────────

    fn reconcile_variable(
        &mut self,
        d: Declarator,
        resolved: Ty,
        base: &QualType,
    ) -> Result<Option<SymbolId>, CheckFatal> {
        if self.ctx.has_pending_effects() {
            return Err(CheckFatal::ClausesOnNonFunction {
                name: d.name,
                loc: d.loc,
            });
        }

        let storage = self.ctx.storage();
        let at_file_scope = self.table.at_file_scope();
        if storage == Storage::Extern && !at_file_scope {
            self.warn(
                Category::NestedExtern,
                format!("extern declaration of {} inside a function", d.name),
                &d.loc,
            );
        }

        let scope = if at_file_scope {
            if storage == Storage::Static {
                VarScope::FileStatic
            } else {
                VarScope::Global
            }
        } else {
            VarScope::Local
        };

        let mut entry = Entry::var(&d.name, resolved, scope, d.loc.clone());
        entry.storage = storage;
        for q in base.quals.iter().chain(d.quals.iter()) {
            if q.is_null() {
                entry.sref.null = entry.sref.null.reflect_null_qual(*q);
            } else if q.is_alloc() {
                entry.sref.def = entry.sref.def.reflect_alloc_qual(*q);
            } else if let Some(level) = check_level_from(*q) {
                entry.set_check_level(level);
            } else if *q == Qual::Unused {
                entry.mark_used();
            }
        }

        // Entries with no stated checking level get the policy default
        // for their scope.
        if entry.check_level() == Some(CheckLevel::Unknown) {
            entry.set_check_level(self.config.policy.default_level(scope));
        }

        if at_file_scope {
            // The original declaration wins on a type mismatch.
            if let Some(old) = self.table.lookup_global(&d.name) {
                let old_ty = self.table.entry(old).ty.clone();
                if !old_ty.matches(&entry.ty) {
                    self.warn(
                        Category::InconsistentDeclaration,
                        format!(
                            "{} redeclared with type {}, previously {}",
                            d.name, entry.ty, old_ty
                        ),
                        &d.loc,
                    );
                    return Ok(Some(old));
                }
            }
            Ok(Some(self.table.declare_global(entry)))
        } else {
            Ok(Some(self.table.declare(entry)))
        }
    }

    // ── Functions ───────────────────────────────────────────────────

    fn reconcile_function(
        &mut self,
        d: Declarator,
        resolved: Ty,
        base: &QualType,
    ) -> Result<Option<SymbolId>, CheckFatal> {
        let inside_body = self.ctx.saved_function().is_some() && !self.table.at_file_scope();
        if inside_body {
            // No function entries inside a function body: demote to an
            // ordinary variable in the enclosing scope.
            self.warn(
                Category::Syntax,
                format!(
                    "function {} declared inside a function, treating it as a variable",
                    d.name
                ),
                &d.loc,
            );
            if self.ctx.has_pending_effects() {
                debug!("dropping effect clauses attached to the demoted declarator");
                let _ = self.ctx.take_contract();
            }
            return self.reconcile_variable(d, resolved, base);
        }

        // Function declarations install at file scope; from an inner
        // non-function scope that takes the one-level override.
        let needs_override = !self.table.at_file_scope();
        if needs_override {
            self.ctx.enter_scope_override()?;
        }
        let result = self.install_function(d, resolved, base);
        if needs_override {
            self.ctx.exit_scope_override();
        }
        result
    }

    fn install_function(
        &mut self,
        d: Declarator,
        resolved: Ty,
        base: &QualType,
    ) -> Result<Option<SymbolId>, CheckFatal> {
        let storage = self.ctx.storage();

        let existing = self
            .table
            .lookup_global(&d.name)
            .filter(|id| self.table.entry(*id).is_function());
        let id = match existing {
            Some(id) => {
                let old_ty = self.table.entry(id).ty.clone();
                if old_ty.matches(&resolved) {
                    self.table.entry_mut(id).set_type(resolved);
                } else {
                    self.warn(
                        Category::InconsistentDeclaration,
                        format!(
                            "{} redeclared with type {}, previously {}",
                            d.name, resolved, old_ty
                        ),
                        &d.loc,
                    );
                }
                id
            }
            None => {
                let mut entry =
                    Entry::function(&d.name, resolved, VarScope::Global, d.loc.clone());
                entry.storage = storage;
                self.table.declare_global(entry)
            }
        };

        let params = self
            .table
            .entry(id)
            .ty
            .params()
            .map(|p| p.to_vec())
            .unwrap_or_default();
        for (i, p) in params.iter().enumerate() {
            if let Some(name) = &p.name {
                if params[..i]
                    .iter()
                    .any(|q| q.name.as_deref() == Some(name.as_str()))
                {
                    self.warn(
                        Category::InconsistentDeclaration,
                        format!("parameter {} repeated in the declaration of {}", name, d.name),
                        &d.loc,
                    );
                }
            }
        }

        // Drain the pending contract and reflections onto the entry.
        let contract = self.ctx.take_contract();
        let special = self.ctx.take_special();
        let args_used = self.ctx.take_args_used();
        let never_returns = base.has(Qual::NoReturn) || d.has_qual(Qual::NoReturn);
        {
            let entry = self.table.entry_mut(id);
            if storage != Storage::None {
                entry.storage = storage;
            }
            if let Some(info) = entry.function_info_mut() {
                info.contract.absorb(contract);
                if special.is_some() {
                    info.special = special;
                }
                if args_used {
                    info.args_used = true;
                }
                if never_returns {
                    info.never_returns = true;
                }
            }
        }
        debug!("function {} reconciled", d.name);

        // An identifier-list declarator opens the old-style parameter
        // phase: untyped named parameters await their declarations.
        let id_list = !params.is_empty()
            && params.iter().all(|p| p.ty.is_unknown() && p.name.is_some());
        if id_list {
            self.warn(
                Category::OldStyle,
                format!("function {} uses an old-style parameter list", d.name),
                &d.loc,
            );
            self.table.enter_scope();
            for (i, p) in params.iter().enumerate() {
                let Some(name) = p.name.clone() else { continue };
                if let Some(tid) = self.table.lookup_global(&name) {
                    if self.table.entry(tid).is_datatype() {
                        return Err(CheckFatal::ParamListTypeName {
                            name,
                            loc: d.loc.clone(),
                        });
                    }
                }
                self.table
                    .declare(Entry::param(name, i, Ty::Unknown, d.loc.clone()));
            }
            self.ctx.save_function(id);
            self.ctx.begin_old_style_params();
        }

        Ok(Some(id))
    }

    /// Enter a function definition: the parameter scope opens and the
    /// declared parameters become entries.
    pub fn begin_function_definition(&mut self, id: SymbolId, loc: Loc) {
        let params = self
            .table
            .entry(id)
            .ty
            .params()
            .map(|p| p.to_vec())
            .unwrap_or_default();
        debug!("entering function {}", self.table.entry(id).name);
        self.table.enter_scope();
        for (i, p) in params.iter().enumerate() {
            if let Some(name) = &p.name {
                self.table
                    .declare(Entry::param(name.clone(), i, p.ty.clone(), loc.clone()));
            }
        }
        self.table.entry_mut(id).defined = Some(loc);
        self.ctx.save_function(id);
    }

    pub fn end_function_definition(&mut self) {
        self.ctx.end_old_style_params();
        let _ = self.ctx.take_saved_function();
        if !self.table.at_file_scope() {
            self.table.exit_scope();
        }
        debug!("leaving function scope");
    }

    // ── Old-style completion ────────────────────────────────────────

    /// The grammar signals the end of the parameter declarations. By
    /// then a function must have been saved.
    pub fn done_params(&mut self) -> Result<(), CheckFatal> {
        if self.ctx.in_old_style_params() && self.ctx.saved_function().is_none() {
            return Err(CheckFatal::MissingSavedFunction);
        }
        Ok(())
    }

    /// Complete an old-style definition as the body begins: parameters
    /// never declared default to `int`, and the function type gains the
    /// discovered parameter list.
    pub fn check_done_params(&mut self) -> Result<SymbolId, CheckFatal> {
        let fid = self
            .ctx
            .saved_function()
            .ok_or(CheckFatal::MissingSavedFunction)?;
        self.ctx.end_old_style_params();

        let mut params: Vec<(usize, SymbolId)> = self
            .table
            .scope_symbols()
            .into_iter()
            .filter_map(|id| match self.table.entry(id).kind {
                EntryKind::Param { index, .. } => Some((index, id)),
                _ => None,
            })
            .collect();
        params.sort_by_key(|(index, _)| *index);

        let mut completed = Vec::with_capacity(params.len());
        for (_, pid) in params {
            if self.table.entry(pid).ty.is_unknown() {
                let (name, loc) = {
                    let entry = self.table.entry(pid);
                    (entry.name.clone(), entry.declared.clone())
                };
                self.warn(
                    Category::OldStyle,
                    format!("parameter {} has no declared type, assuming int", name),
                    &loc.unwrap_or_else(Loc::dummy),
                );
                let entry = self.table.entry_mut(pid);
                entry.set_type(Ty::Int);
                if let EntryKind::Param { typed, .. } = &mut entry.kind {
                    *typed = true;
                }
            }
            let entry = self.table.entry(pid);
            completed.push(Param {
                name: Some(entry.name.clone()),
                ty: entry.ty.clone(),
            });
        }

        let (ret, varargs) = {
            let ty = &self.table.entry(fid).ty;
            let ret = ty.return_type().cloned().unwrap_or(Ty::Unknown);
            let varargs = match ty.real() {
                Ty::Function(f) => f.varargs,
                _ => false,
            };
            (ret, varargs)
        };
        self.table
            .entry_mut(fid)
            .set_type(Ty::function(ret, completed, varargs));
        debug!(
            "old-style parameter list completed for {}",
            self.table.entry(fid).name
        );
        Ok(fid)
    }

    // ── va_dcl ──────────────────────────────────────────────────────

    /// `va_dcl` in a parameter context requires the `va_alist` marker
    /// and makes the function variadic. Anywhere else it degrades to an
    /// ordinary variable declaration.
    pub fn handle_va_dcl(&mut self, loc: Loc) -> Result<Option<SymbolId>, CheckFatal> {
        if self.ctx.in_old_style_params() {
            let has_alist = self
                .table
                .scope_symbols()
                .into_iter()
                .any(|id| self.table.entry(id).name == "va_alist");
            if !has_alist {
                return Err(CheckFatal::VaDclWithoutAlist(loc));
            }
            if let Some(fid) = self.ctx.saved_function() {
                let (ret, params) = {
                    match self.table.entry(fid).ty.real() {
                        Ty::Function(f) => (f.ret.clone(), f.params.clone()),
                        _ => (Ty::Unknown, Vec::new()),
                    }
                };
                self.table
                    .entry_mut(fid)
                    .set_type(Ty::function(ret, params, true));
            }
            Ok(None)
        } else {
            self.warn(
                Category::Syntax,
                "va_dcl outside a parameter declaration, treating it as a variable".to_string(),
                &loc,
            );
            let scope = if self.table.at_file_scope() {
                VarScope::Global
            } else {
                VarScope::Local
            };
            let id = self
                .table
                .declare(Entry::var("va_alist", Ty::Unknown, scope, loc));
            Ok(Some(id))
        }
    }

    // ── Typedefs ────────────────────────────────────────────────────

    fn reconcile_typedef(
        &mut self,
        d: Declarator,
        base: &QualType,
    ) -> Result<Option<SymbolId>, CheckFatal> {
        let resolved = d.resolved_type(&base.ty);
        let name = d.name.clone();
        let loc = d.loc.clone();

        // The configured boolean name coerces to the boolean type, with
        // complaints when the representation is unsuitable.
        if name == self.config.bool_name {
            if resolved.is_enum() {
                self.retype_bool_members(&resolved);
            } else if resolved.is_integral() && !resolved.is_unknown() {
                if !self.config.bool_int {
                    self.warn(
                        Category::BoolType,
                        format!("boolean type {} defined using {}", name, resolved),
                        &loc,
                    );
                }
            } else if !resolved.is_unknown() {
                self.warn(
                    Category::BoolType,
                    format!(
                        "boolean type {} must be integral, char, or enum, not {}",
                        name, resolved
                    ),
                    &loc,
                );
            }
            let mut entry = Entry::datatype(name, Ty::Bool, false, false, loc);
            entry.storage = self.ctx.storage();
            return Ok(Some(self.table.declare_global(entry)));
        }

        if self.config.likely_bool && self.config.is_likely_bool_name(&name) {
            self.warn(
                Category::LikelyBool,
                format!(
                    "type {} looks boolean, the boolean type here is {}",
                    name, self.config.bool_name
                ),
                &loc,
            );
        }

        let explicit_abstract = base.has(Qual::Abstract) || d.has_qual(Qual::Abstract);
        let explicit_concrete = base.has(Qual::Concrete) || d.has_qual(Qual::Concrete);
        let is_abstract =
            explicit_abstract || (self.config.imp_abstract && !explicit_concrete);
        let is_mutable = base.has(Qual::Mutable) || d.has_qual(Qual::Mutable);

        if is_abstract && is_mutable {
            let indirected = resolved.is_pointer_or_array()
                || resolved.is_abstract()
                || resolved.is_unknown();
            if !indirected {
                self.warn(
                    Category::MutableRep,
                    format!(
                        "mutable abstract type {} needs pointer indirection, {} has none",
                        name, resolved
                    ),
                    &loc,
                );
            }
        }

        let entry_ty = if is_abstract {
            Ty::abstract_type(name.clone(), resolved.clone())
        } else {
            resolved.clone()
        };

        // Hiding an enum behind an abstraction retypes its members.
        if is_abstract && resolved.is_enum() {
            self.retype_enum_members(&resolved, &entry_ty);
        }

        if loc.is_header() && self.ctx.storage() != Storage::Static {
            self.warn(
                Category::ExportedType,
                format!("type {} exported from a header", name),
                &loc,
            );
        }

        let mut entry = Entry::datatype(name, entry_ty, is_abstract, is_mutable, loc);
        entry.storage = self.ctx.storage();
        Ok(Some(self.table.declare_global(entry)))
    }

    // ── Structs and unions ──────────────────────────────────────────

    pub fn declare_struct(&mut self, tag: Option<String>, members: Vec<Field>, loc: &Loc) -> Ty {
        self.declare_record(false, tag, members, loc)
    }

    pub fn declare_union(&mut self, tag: Option<String>, members: Vec<Field>, loc: &Loc) -> Ty {
        self.declare_record(true, tag, members, loc)
    }

    fn declare_record(
        &mut self,
        is_union: bool,
        tag: Option<String>,
        members: Vec<Field>,
        loc: &Loc,
    ) -> Ty {
        let what = if is_union { "union" } else { "struct" };
        let mut fields: Vec<Field> = Vec::new();
        let mut push_checked = |this: &Self, fields: &mut Vec<Field>, f: Field| {
            if fields.iter().any(|g| g.name == f.name) {
                this.warn(
                    Category::InconsistentDeclaration,
                    format!("field {} already declared in this {}", f.name, what),
                    loc,
                );
            } else {
                fields.push(f);
            }
        };

        for member in members {
            if member.name.is_empty() && member.ty.is_struct_or_union() {
                // Merge the members of an unnamed inner record.
                let inner: Vec<Field> =
                    member.ty.fields().map(|f| f.to_vec()).unwrap_or_default();
                for f in inner {
                    push_checked(self, &mut fields, f);
                }
            } else {
                push_checked(self, &mut fields, member);
            }
        }

        if let Some(max) = self.config.max_struct_fields {
            if fields.len() > max {
                self.warn(
                    Category::StructFieldLimit,
                    format!(
                        "{} has {} fields, more than the checked limit of {}",
                        what,
                        fields.len(),
                        max
                    ),
                    loc,
                );
            }
        }

        let record = RecordTy {
            tag: tag.clone(),
            fields,
            defined: true,
        };
        let ty = if is_union {
            Ty::Union(record)
        } else {
            Ty::Struct(record)
        };
        if let Some(tag) = tag {
            self.table
                .declare_tag(Entry::datatype(tag, ty.clone(), false, false, loc.clone()));
        }
        ty
    }

    /// Resolve a struct tag reference, creating an incomplete record for
    /// a forward reference.
    pub fn handle_struct(&mut self, tag: &str, loc: &Loc) -> Ty {
        if let Some(id) = self.table.lookup_tag(tag) {
            return self.table.entry(id).ty.clone();
        }
        let ty = Ty::Struct(RecordTy {
            tag: Some(tag.to_string()),
            fields: Vec::new(),
            defined: false,
        });
        self.table
            .declare_tag(Entry::datatype(tag, ty.clone(), false, false, loc.clone()));
        ty
    }

    pub fn handle_union(&mut self, tag: &str, loc: &Loc) -> Ty {
        if let Some(id) = self.table.lookup_tag(tag) {
            return self.table.entry(id).ty.clone();
        }
        let ty = Ty::Union(RecordTy {
            tag: Some(tag.to_string()),
            fields: Vec::new(),
            defined: false,
        });
        self.table
            .declare_tag(Entry::datatype(tag, ty.clone(), false, false, loc.clone()));
        ty
    }

    // ── Constants ───────────────────────────────────────────────────

    /// Install a constant entry. A literal initializer of a matching
    /// type records the value; on a mismatch the declared type wins and
    /// the value stays unknown.
    pub fn declare_constant(
        &mut self,
        d: Declarator,
        base: &QualType,
        init: Option<&ExprNode>,
    ) -> SymbolId {
        let resolved = d.resolved_type(&base.ty);
        let value = init.and_then(|e| e.value.clone()).and_then(|v| {
            let vty = match &v {
                vigil_core::values::ConstValue::Int(_) => Ty::Int,
                vigil_core::values::ConstValue::Char(_) => Ty::Char,
                vigil_core::values::ConstValue::Float(_) => Ty::Double,
                vigil_core::values::ConstValue::Str(_) => Ty::pointer(Ty::Char),
            };
            if resolved.matches(&vty) {
                Some(v)
            } else {
                self.warn(
                    Category::InconsistentDeclaration,
                    format!(
                        "constant {} declared {} but initialized with {}",
                        d.name, resolved, vty
                    ),
                    &d.loc,
                );
                None
            }
        });
        self.table
            .declare_global(Entry::constant(d.name, resolved, value, d.loc))
    }

    // ── Iterators ───────────────────────────────────────────────────

    /// Install an iterator and its matching end marker. `yields` lists
    /// the positions of yield-annotated parameters, which body
    /// declarators may bind.
    pub fn declare_iter(
        &mut self,
        name: &str,
        params: Vec<Param>,
        yields: Vec<usize>,
        loc: &Loc,
    ) -> SymbolId {
        let ty = Ty::function(Ty::Void, params, false);
        self.table
            .declare_global(Entry::end_iter(format!("end_{}", name), loc.clone()));
        let id = self
            .table
            .declare_global(Entry::iter(name, ty, yields, loc.clone()));
        debug!("iterator {} declared with its end marker", name);
        id
    }

    pub fn begin_iter_body(&mut self, id: SymbolId) {
        self.table.enter_scope();
        self.ctx.begin_iter_body(id);
    }

    pub fn end_iter_body(&mut self) {
        self.ctx.end_iter_body();
        if !self.table.at_file_scope() {
            self.table.exit_scope();
        }
    }

    // ── Special codes and the args-used flag ────────────────────────

    /// Mark the next function declarator printf-like, scanf-like, or
    /// message-like.
    pub fn set_special_function(&mut self, code: SpecialCode, loc: &Loc) {
        if self.ctx.set_special(code).is_some() {
            self.warn(
                Category::DuplicateQualifier,
                "special function code applied more than once".to_string(),
                loc,
            );
        }
    }

    pub fn mark_args_used(&mut self, loc: &Loc) {
        if self.ctx.set_args_used() {
            self.warn(
                Category::DuplicateQualifier,
                "args-used applied more than once".to_string(),
                loc,
            );
        }
    }

    // ── Clause entry points ─────────────────────────────────────────

    /// One identifier of a globals clause: pseudo-locations and declared
    /// variables land in the pending set, anything else is skipped with
    /// a diagnostic.
    pub fn globals_clause_id(&mut self, name: &str, loc: &Loc) -> Result<(), CheckFatal> {
        let resolved = resolve_globals_id(self.reporter.as_ref(), &self.table, name, loc);
        match resolved {
            Some(r) if r.base == RefBase::Nothing => self.ctx.set_no_globals(),
            Some(r) => self.ctx.add_global(r),
            None => Ok(()),
        }
    }

    /// Resolve one identifier of a modifies clause for the grammar to
    /// extend into a reference path.
    pub fn modifies_clause_ref(&mut self, name: &str, loc: &Loc) -> Option<StoreRef> {
        resolve_modifies_id(self.reporter.as_ref(), &self.table, name, loc)
    }

    pub fn state_clause_ref(&mut self, name: &str, loc: &Loc) -> Option<StoreRef> {
        resolve_state_clause_id(self.reporter.as_ref(), &self.table, name, loc)
    }

    pub fn set_modifies_clause(&mut self, refs: RefSet) {
        self.ctx.set_modifies(refs);
    }

    pub fn add_state_clause(&mut self, clause: StateClause) {
        self.ctx.add_state_clause(clause);
    }

    pub fn set_warn_clause(&mut self, flag: impl Into<String>, message: impl Into<String>) {
        self.ctx.set_warn(WarnClause {
            flag: flag.into(),
            message: message.into(),
        });
    }
}
