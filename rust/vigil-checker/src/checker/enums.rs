//! Enumeration declarations.
//!
//! Enum members are installed one at a time as the grammar produces
//! them, with unknown type and whatever explicit value the initializer
//! supplied. Completing the enum stamps the member entries with the
//! enum type, fills in implicit values, checks the boolean-name
//! convention, and installs the tag. The boolean retyping entry points
//! serve the typedef path: naming an enum as the configured boolean
//! type or hiding one behind an abstraction moves its members to the
//! new type.

use crate::checker::symtab::{Entry, EntryKind, SymbolId};
use crate::checker::Checker;
use vigil_core::diag::Category;
use vigil_core::loc::Loc;
use vigil_core::types::{EnumTy, Ty};

impl Checker {
    /// Install one enum member with an optional explicit value. The
    /// type stays unknown until the enclosing enum completes. A name
    /// already bound to an enum constant reuses that entry, so the
    /// completion pass can compare the types.
    pub fn declare_enum_member(&mut self, name: &str, value: Option<i64>, loc: &Loc) -> SymbolId {
        if let Some(id) = self.table.lookup_global(name) {
            if self.table.entry(id).is_enum_constant() {
                if value.is_some() {
                    if let EntryKind::EnumConstant { value: slot } =
                        &mut self.table.entry_mut(id).kind
                    {
                        *slot = value;
                    }
                }
                return id;
            }
        }
        self.table
            .declare_global(Entry::enum_constant(name, Ty::Unknown, value, loc.clone()))
    }

    /// Complete an enum from its member entries: assign implicit
    /// values, stamp member types, check the member-name flavor and the
    /// member limit, and install the tag.
    pub fn declare_enum(&mut self, tag: Option<String>, members: Vec<SymbolId>, loc: &Loc) -> Ty {
        let names: Vec<String> = members
            .iter()
            .map(|id| self.table.entry(*id).name.clone())
            .collect();

        if let Some(max) = self.config.max_enum_members {
            if names.len() > max {
                self.warn(
                    Category::EnumMemberLimit,
                    format!(
                        "enum has {} members, more than the checked limit of {}",
                        names.len(),
                        max
                    ),
                    loc,
                );
            }
        }

        // The first member decides whether this list spells booleans;
        // mixing true/false spellings with plain names is reported per
        // offending member.
        let boolean_flavored = names
            .first()
            .map(|n| self.config.is_bool_member_name(n))
            .unwrap_or(false);
        for name in names.iter().skip(1) {
            if self.config.is_bool_member_name(name) != boolean_flavored {
                self.warn(
                    Category::InconsistentDeclaration,
                    format!("member {} mixes boolean and plain names in one enum", name),
                    loc,
                );
            }
        }

        let ty = Ty::Enum(EnumTy {
            tag: tag.clone(),
            members: names,
        });

        let mut next = 0i64;
        for &id in &members {
            let (member_ty, explicit) = {
                let entry = self.table.entry(id);
                let value = match &entry.kind {
                    EntryKind::EnumConstant { value } => *value,
                    _ => None,
                };
                (entry.ty.clone(), value)
            };
            if let Some(v) = explicit {
                next = v;
            } else if let EntryKind::EnumConstant { value } = &mut self.table.entry_mut(id).kind {
                *value = Some(next);
            }
            next = next.wrapping_add(1);

            if member_ty.is_unknown() {
                self.table.entry_mut(id).set_type(ty.clone());
            } else if !member_ty.matches(&ty) {
                let name = self.table.entry(id).name.clone();
                self.warn(
                    Category::InconsistentDeclaration,
                    format!("enum member {} already declared with type {}", name, member_ty),
                    loc,
                );
            }
        }

        if let Some(tag) = tag {
            self.table
                .declare_tag(Entry::datatype(tag, ty.clone(), false, false, loc.clone()));
        }
        ty
    }

    /// Resolve an enum tag reference, creating an empty forward enum
    /// when the tag is new.
    pub fn handle_enum(&mut self, tag: &str, loc: &Loc) -> Ty {
        if let Some(id) = self.table.lookup_tag(tag) {
            return self.table.entry(id).ty.clone();
        }
        let ty = Ty::Enum(EnumTy {
            tag: Some(tag.to_string()),
            members: Vec::new(),
        });
        self.table
            .declare_tag(Entry::datatype(tag, ty.clone(), false, false, loc.clone()));
        ty
    }

    /// The enum became the boolean type: members spelled as the
    /// configured true/false names move to bool without comment, any
    /// other member draws one diagnostic and moves anyway.
    pub(crate) fn retype_bool_members(&mut self, enum_ty: &Ty) {
        let names: Vec<String> = enum_ty
            .enum_members()
            .map(|m| m.to_vec())
            .unwrap_or_default();
        for name in names {
            let Some(id) = self.table.lookup_global(&name) else {
                continue;
            };
            if !self.table.entry(id).is_enum_constant() {
                continue;
            }
            if !self.config.is_bool_member_name(&name) {
                let loc = self
                    .table
                    .entry(id)
                    .declared
                    .clone()
                    .unwrap_or_else(Loc::dummy);
                self.warn(
                    Category::BoolType,
                    format!(
                        "member {} of the boolean type is neither {} nor {}",
                        name, self.config.true_name, self.config.false_name
                    ),
                    &loc,
                );
            }
            self.table.entry_mut(id).set_type(Ty::Bool);
        }
    }

    /// The enum was hidden behind an abstract datatype: members take
    /// the abstract type silently.
    pub(crate) fn retype_enum_members(&mut self, from: &Ty, to: &Ty) {
        let names: Vec<String> = from.enum_members().map(|m| m.to_vec()).unwrap_or_default();
        for name in names {
            let Some(id) = self.table.lookup_global(&name) else {
                continue;
            };
            if self.table.entry(id).is_enum_constant() {
                self.table.entry_mut(id).set_type(to.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::config::CheckerConfig;
    use vigil_core::diag::DiagnosticLog;
    use std::rc::Rc;

    fn checker() -> (Checker, Rc<DiagnosticLog>) {
        let log = Rc::new(DiagnosticLog::new());
        (Checker::new(log.clone()), log)
    }

    fn member_value(ck: &Checker, id: SymbolId) -> Option<i64> {
        match ck.table().entry(id).kind {
            EntryKind::EnumConstant { value } => value,
            _ => None,
        }
    }

    #[test]
    fn test_members_stamped_and_valued() {
        let (mut ck, log) = checker();
        let loc = Loc::dummy();
        let a = ck.declare_enum_member("apple", None, &loc);
        let b = ck.declare_enum_member("banana", Some(5), &loc);
        let c = ck.declare_enum_member("cherry", None, &loc);
        let ty = ck.declare_enum(Some("fruit".into()), vec![a, b, c], &loc);

        assert!(log.is_empty());
        assert_eq!(member_value(&ck, a), Some(0));
        assert_eq!(member_value(&ck, b), Some(5));
        assert_eq!(member_value(&ck, c), Some(6));
        assert!(ck.table().entry(a).ty.matches(&ty));
        assert_eq!(ty.enum_members().map(|m| m.len()), Some(3));
    }

    #[test]
    fn test_member_limit_enforced() {
        let log = Rc::new(DiagnosticLog::new());
        let config = CheckerConfig {
            max_enum_members: Some(2),
            ..CheckerConfig::default()
        };
        let mut ck = Checker::with_config(config, log.clone());

        let loc = Loc::dummy();
        let ids: Vec<SymbolId> = ["a", "b", "c"]
            .iter()
            .map(|n| ck.declare_enum_member(n, None, &loc))
            .collect();
        ck.declare_enum(None, ids, &loc);
        assert_eq!(log.count_of(Category::EnumMemberLimit), 1);
    }

    #[test]
    fn test_mixed_flavor_diagnosed_per_member() {
        let (mut ck, log) = checker();
        let loc = Loc::dummy();
        let t = ck.declare_enum_member("true", None, &loc);
        let f = ck.declare_enum_member("false", None, &loc);
        let m = ck.declare_enum_member("maybe", None, &loc);
        ck.declare_enum(None, vec![t, f, m], &loc);
        assert_eq!(log.count_of(Category::InconsistentDeclaration), 1);
    }

    #[test]
    fn test_member_reuse_across_named_enums() {
        let (mut ck, log) = checker();
        let loc = Loc::dummy();
        let r = ck.declare_enum_member("red", None, &loc);
        ck.declare_enum(Some("color".into()), vec![r], &loc);

        let r2 = ck.declare_enum_member("red", None, &loc);
        assert_eq!(r, r2);
        ck.declare_enum(Some("signal".into()), vec![r2], &loc);
        assert_eq!(log.count_of(Category::InconsistentDeclaration), 1);
    }

    #[test]
    fn test_bool_retype_silent_for_spelled_members() {
        let (mut ck, log) = checker();
        let loc = Loc::dummy();
        let t = ck.declare_enum_member("true", None, &loc);
        let f = ck.declare_enum_member("false", None, &loc);
        let ty = ck.declare_enum(None, vec![t, f], &loc);
        assert!(log.is_empty());

        ck.retype_bool_members(&ty);
        assert!(log.is_empty());
        assert_eq!(ck.table().entry(t).ty, Ty::Bool);
        assert_eq!(ck.table().entry(f).ty, Ty::Bool);
    }

    #[test]
    fn test_bool_retype_reports_stray_member_once() {
        let (mut ck, log) = checker();
        let loc = Loc::dummy();
        let t = ck.declare_enum_member("true", None, &loc);
        let f = ck.declare_enum_member("false", None, &loc);
        let m = ck.declare_enum_member("maybe", None, &loc);
        let ty = ck.declare_enum(None, vec![t, f, m], &loc);

        ck.retype_bool_members(&ty);
        assert_eq!(log.count_of(Category::BoolType), 1);
        assert_eq!(ck.table().entry(m).ty, Ty::Bool);
    }

    #[test]
    fn test_forward_enum_reference() {
        let (mut ck, log) = checker();
        let loc = Loc::dummy();
        let fwd = ck.handle_enum("mode", &loc);
        assert_eq!(fwd.enum_members().map(|m| m.len()), Some(0));

        let a = ck.declare_enum_member("on", None, &loc);
        let b = ck.declare_enum_member("off", None, &loc);
        ck.declare_enum(Some("mode".into()), vec![a, b], &loc);

        let seen = ck.handle_enum("mode", &loc);
        assert_eq!(seen.enum_members().map(|m| m.len()), Some(2));
        assert!(log.is_empty());
    }
}
