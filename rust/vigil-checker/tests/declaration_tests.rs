//! Declaration reconciliation end to end:
//! - variables, storage classes, and implicit checking levels
//! - function installation, redeclaration, and demotion inside bodies
//! - old-style parameter lists and their completion
//! - typedefs: boolean conventions, abstraction, header export
//! - structs, iterators, va_dcl

use std::rc::Rc;
use vigil_checker::checker::context::{Declarator, QualType};
use vigil_checker::checker::decl::field_group;
use vigil_checker::checker::symtab::{SpecialCode, Storage, SymbolId};
use vigil_checker::{CheckFatal, Checker};
use vigil_core::config::{CheckLevel, CheckerConfig, ImplicitCheckPolicy, ScopePolicy};
use vigil_core::diag::{Category, DiagnosticLog};
use vigil_core::loc::Loc;
use vigil_core::qual::Qual;
use vigil_core::types::{Param, Ty};

fn checker() -> (Checker, Rc<DiagnosticLog>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let log = Rc::new(DiagnosticLog::new());
    (Checker::new(log.clone()), log)
}

fn checker_with(config: CheckerConfig) -> (Checker, Rc<DiagnosticLog>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let log = Rc::new(DiagnosticLog::new());
    (Checker::with_config(config, log.clone()), log)
}

fn at(line: usize) -> Loc {
    Loc::new("unit.c", line, 1)
}

fn named_param(name: &str, ty: Ty) -> Param {
    Param {
        name: Some(name.into()),
        ty,
    }
}

/// Declarator shape for a function with an unknown return slot.
fn fn_shape(params: Vec<Param>) -> Ty {
    Ty::function(Ty::Unknown, params, false)
}

/// Declare `base name;` at the current scope.
fn declare_var(ck: &mut Checker, base: Ty, name: &str, line: usize) -> SymbolId {
    ck.begin_var_declaration(QualType::new(base)).unwrap();
    let id = ck
        .reconcile_declarator(Declarator::new(name, at(line)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    id
}

/// Declare `int name(params);` at the current scope.
fn declare_fn(ck: &mut Checker, name: &str, params: Vec<Param>, line: usize) -> SymbolId {
    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    let id = ck
        .reconcile_declarator(Declarator::with_type(name, fn_shape(params), at(line)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    id
}

// ============================================================================
// VARIABLES AND CHECKING LEVELS
// ============================================================================

#[test]
fn test_policy_defaults_apply_per_scope() {
    let config = CheckerConfig {
        policy: ImplicitCheckPolicy {
            local_checkmod: true,
            statics: ScopePolicy {
                checkmod: true,
                ..ScopePolicy::default()
            },
            globals: ScopePolicy {
                checked: true,
                ..ScopePolicy::default()
            },
        },
        ..CheckerConfig::default()
    };
    let (mut ck, log) = checker_with(config);

    let g = declare_var(&mut ck, Ty::Int, "g", 1);
    assert_eq!(ck.table().entry(g).check_level(), Some(CheckLevel::Checked));

    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    ck.set_storage_class(Storage::Static, &at(2));
    let s = ck
        .reconcile_declarator(Declarator::new("s", at(2)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    assert_eq!(ck.table().entry(s).check_level(), Some(CheckLevel::CheckMod));

    ck.table_mut().enter_scope();
    let x = declare_var(&mut ck, Ty::Int, "x", 3);
    assert_eq!(ck.table().entry(x).check_level(), Some(CheckLevel::CheckMod));
    ck.table_mut().exit_scope();

    assert!(log.is_empty());
}

#[test]
fn test_unannotated_defaults_are_unchecked() {
    let (mut ck, _log) = checker();
    let g = declare_var(&mut ck, Ty::Int, "g", 1);
    assert_eq!(
        ck.table().entry(g).check_level(),
        Some(CheckLevel::Unchecked)
    );
}

#[test]
fn test_explicit_checking_annotation_beats_policy() {
    let config = CheckerConfig {
        policy: ImplicitCheckPolicy {
            globals: ScopePolicy {
                checked: true,
                ..ScopePolicy::default()
            },
            ..ImplicitCheckPolicy::default()
        },
        ..CheckerConfig::default()
    };
    let (mut ck, log) = checker_with(config);

    ck.begin_var_declaration(QualType::with_quals(Ty::Int, vec![Qual::Unchecked]))
        .unwrap();
    let u = ck
        .reconcile_declarator(Declarator::new("u", at(1)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    assert_eq!(
        ck.table().entry(u).check_level(),
        Some(CheckLevel::Unchecked)
    );
    assert!(log.is_empty());
}

#[test]
fn test_variable_redeclaration_keeps_original_type() {
    let (mut ck, log) = checker();
    let first = declare_var(&mut ck, Ty::Int, "g", 1);
    let second = declare_var(&mut ck, Ty::Double, "g", 2);

    assert_eq!(first, second);
    assert_eq!(ck.table().entry(first).ty, Ty::Int);
    assert_eq!(log.count_of(Category::InconsistentDeclaration), 1);
}

#[test]
fn test_extern_inside_function_diagnosed() {
    let (mut ck, log) = checker();
    let f = declare_fn(&mut ck, "f", vec![], 1);
    ck.begin_function_definition(f, at(2));

    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    ck.set_storage_class(Storage::Extern, &at(3));
    let e = ck
        .reconcile_declarator(Declarator::new("e", at(3)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    ck.end_function_definition();

    assert!(ck.table().entry(e).is_var());
    assert_eq!(log.count_of(Category::NestedExtern), 1);
}

// ============================================================================
// FUNCTIONS
// ============================================================================

#[test]
fn test_function_declaration_records_signature() {
    let (mut ck, log) = checker();
    let f = declare_fn(&mut ck, "f", vec![named_param("n", Ty::Int)], 1);

    let entry = ck.table().entry(f);
    assert!(entry.is_function());
    assert_eq!(entry.ty.return_type(), Some(&Ty::Int));
    assert_eq!(entry.ty.params().map(|p| p.len()), Some(1));
    assert!(log.is_empty());
}

#[test]
fn test_duplicate_parameter_names_diagnosed() {
    let (mut ck, log) = checker();
    declare_fn(
        &mut ck,
        "f",
        vec![named_param("a", Ty::Int), named_param("a", Ty::Int)],
        1,
    );
    assert_eq!(log.count_of(Category::InconsistentDeclaration), 1);
}

#[test]
fn test_function_redeclaration_type_conflict_keeps_first() {
    let (mut ck, log) = checker();
    let f = declare_fn(&mut ck, "f", vec![named_param("n", Ty::Int)], 1);

    ck.begin_var_declaration(QualType::new(Ty::Double)).unwrap();
    let again = ck
        .reconcile_declarator(Declarator::with_type(
            "f",
            fn_shape(vec![named_param("n", Ty::Int)]),
            at(2),
        ))
        .unwrap()
        .unwrap();
    ck.end_declaration();

    assert_eq!(f, again);
    assert_eq!(ck.table().entry(f).ty.return_type(), Some(&Ty::Int));
    assert_eq!(log.count_of(Category::InconsistentDeclaration), 1);
}

#[test]
fn test_noreturn_function_flagged() {
    let (mut ck, _log) = checker();
    ck.begin_var_declaration(QualType::with_quals(Ty::Void, vec![Qual::NoReturn]))
        .unwrap();
    let f = ck
        .reconcile_declarator(Declarator::with_type("fatal_exit", fn_shape(vec![]), at(1)))
        .unwrap()
        .unwrap();
    ck.end_declaration();

    assert!(ck.table().entry(f).function_info().unwrap().never_returns);
}

#[test]
fn test_special_code_applies_to_next_function() {
    let (mut ck, log) = checker();
    ck.set_special_function(SpecialCode::PrintfLike, &at(1));
    let f = declare_fn(&mut ck, "log_fmt", vec![], 1);
    assert_eq!(
        ck.table().entry(f).function_info().unwrap().special,
        Some(SpecialCode::PrintfLike)
    );

    // A second application before the next declarator repeats itself.
    ck.set_special_function(SpecialCode::ScanfLike, &at(2));
    ck.set_special_function(SpecialCode::ScanfLike, &at(2));
    assert_eq!(log.count_of(Category::DuplicateQualifier), 1);
}

#[test]
fn test_function_inside_function_demoted_to_variable() {
    let (mut ck, log) = checker();
    let f = declare_fn(&mut ck, "f", vec![], 1);
    ck.begin_function_definition(f, at(2));

    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    let g = ck
        .reconcile_declarator(Declarator::with_type("g", fn_shape(vec![]), at(3)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    ck.end_function_definition();

    assert!(ck.table().entry(g).is_var());
    assert_eq!(log.count_of(Category::Syntax), 1);
}

#[test]
fn test_function_from_inner_scope_installs_globally() {
    let (mut ck, log) = checker();
    ck.table_mut().enter_scope();
    let h = declare_fn(&mut ck, "h", vec![], 1);
    ck.table_mut().exit_scope();

    assert_eq!(ck.table().lookup_global("h"), Some(h));
    assert!(ck.table().entry(h).is_function());
    assert!(log.is_empty());
}

// ============================================================================
// OLD-STYLE PARAMETER LISTS
// ============================================================================

/// Install `int f(a, b)` as an identifier-list definition and leave the
/// checker inside the parameter declaration phase.
fn install_old_style(ck: &mut Checker, names: &[&str]) -> SymbolId {
    let params = names
        .iter()
        .map(|n| named_param(n, Ty::Unknown))
        .collect::<Vec<_>>();
    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    let f = ck
        .reconcile_declarator(Declarator::with_type("f", fn_shape(params), at(1)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    f
}

#[test]
fn test_old_style_params_default_to_int() {
    let (mut ck, log) = checker();
    let f = install_old_style(&mut ck, &["a", "b"]);

    ck.done_params().unwrap();
    let fid = ck.check_done_params().unwrap();
    assert_eq!(fid, f);

    let ty = ck.table().entry(f).ty.clone();
    let params = ty.params().unwrap();
    assert_eq!(params.len(), 2);
    assert!(params.iter().all(|p| p.ty == Ty::Int));
    assert_eq!(ty.return_type(), Some(&Ty::Int));

    // One report for the list form, one per assumed parameter.
    assert_eq!(log.count_of(Category::OldStyle), 3);
    ck.end_function_definition();
}

#[test]
fn test_old_style_declaration_stamps_type() {
    let (mut ck, log) = checker();
    let f = install_old_style(&mut ck, &["a", "b"]);

    ck.begin_var_declaration(QualType::new(Ty::Double)).unwrap();
    ck.reconcile_declarator(Declarator::new("b", at(2)))
        .unwrap()
        .unwrap();
    ck.end_declaration();

    ck.done_params().unwrap();
    ck.check_done_params().unwrap();

    let ty = ck.table().entry(f).ty.clone();
    let params = ty.params().unwrap();
    assert_eq!(params[0].ty, Ty::Int);
    assert_eq!(params[1].ty, Ty::Double);
    assert_eq!(log.count_of(Category::OldStyle), 2);
    ck.end_function_definition();
}

#[test]
fn test_unlisted_old_style_parameter_is_fatal() {
    let (mut ck, _log) = checker();
    install_old_style(&mut ck, &["a"]);

    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    let err = ck.reconcile_declarator(Declarator::new("c", at(2)));
    assert!(matches!(err, Err(CheckFatal::UnlistedParameter { .. })));
}

#[test]
fn test_old_style_list_naming_a_type_is_fatal() {
    let (mut ck, _log) = checker();
    ck.begin_typedef_declaration(QualType::new(Ty::Int)).unwrap();
    ck.reconcile_declarator(Declarator::new("size", at(1)))
        .unwrap();
    ck.end_declaration();

    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    let err = ck.reconcile_declarator(Declarator::with_type(
        "f",
        fn_shape(vec![named_param("size", Ty::Unknown)]),
        at(2),
    ));
    assert!(matches!(err, Err(CheckFatal::ParamListTypeName { .. })));
}

#[test]
fn test_va_dcl_makes_function_variadic() {
    let (mut ck, _log) = checker();
    let f = install_old_style(&mut ck, &["va_alist"]);

    assert_eq!(ck.handle_va_dcl(at(2)).unwrap(), None);
    match ck.table().entry(f).ty.real() {
        Ty::Function(ft) => assert!(ft.varargs),
        other => panic!("expected function type, got {:?}", other),
    }
}

#[test]
fn test_va_dcl_without_va_alist_is_fatal() {
    let (mut ck, _log) = checker();
    install_old_style(&mut ck, &["x"]);
    let err = ck.handle_va_dcl(at(2));
    assert!(matches!(err, Err(CheckFatal::VaDclWithoutAlist(_))));
}

// ============================================================================
// TYPEDEFS
// ============================================================================

#[test]
fn test_boolean_typedef_retypes_members_silently() {
    let (mut ck, log) = checker();
    let f = ck.declare_enum_member("false", None, &at(1));
    let t = ck.declare_enum_member("true", None, &at(1));
    let ety = ck.declare_enum(None, vec![f, t], &at(1));

    ck.begin_typedef_declaration(QualType::new(ety)).unwrap();
    let b = ck
        .reconcile_declarator(Declarator::new("bool", at(1)))
        .unwrap()
        .unwrap();
    ck.end_declaration();

    assert!(log.is_empty());
    assert_eq!(ck.table().entry(b).ty, Ty::Bool);
    assert_eq!(ck.table().entry(f).ty, Ty::Bool);
    assert_eq!(ck.table().entry(t).ty, Ty::Bool);
}

#[test]
fn test_boolean_typedef_reports_stray_member_once() {
    let (mut ck, log) = checker();
    let f = ck.declare_enum_member("false", None, &at(1));
    let t = ck.declare_enum_member("true", None, &at(1));
    let m = ck.declare_enum_member("maybe", None, &at(1));
    let ety = ck.declare_enum(None, vec![f, t, m], &at(1));

    ck.begin_typedef_declaration(QualType::new(ety)).unwrap();
    ck.reconcile_declarator(Declarator::new("bool", at(1)))
        .unwrap();
    ck.end_declaration();

    assert_eq!(log.count_of(Category::BoolType), 1);
    assert_eq!(ck.table().entry(m).ty, Ty::Bool);
}

#[test]
fn test_boolean_typedef_over_int_commented() {
    let (mut ck, log) = checker();
    ck.begin_typedef_declaration(QualType::new(Ty::Int)).unwrap();
    let b = ck
        .reconcile_declarator(Declarator::new("bool", at(1)))
        .unwrap()
        .unwrap();
    ck.end_declaration();

    assert_eq!(log.count_of(Category::BoolType), 1);
    assert_eq!(ck.table().entry(b).ty, Ty::Bool);
}

#[test]
fn test_bool_int_config_accepts_int_representation() {
    let config = CheckerConfig {
        bool_int: true,
        ..CheckerConfig::default()
    };
    let (mut ck, log) = checker_with(config);
    ck.begin_typedef_declaration(QualType::new(Ty::Int)).unwrap();
    ck.reconcile_declarator(Declarator::new("bool", at(1)))
        .unwrap();
    ck.end_declaration();
    assert!(log.is_empty());
}

#[test]
fn test_likely_bool_spelling_suggested() {
    let (mut ck, log) = checker();
    ck.begin_typedef_declaration(QualType::new(Ty::Int)).unwrap();
    let b = ck
        .reconcile_declarator(Declarator::new("BOOL", at(1)))
        .unwrap()
        .unwrap();
    ck.end_declaration();

    assert_eq!(log.count_of(Category::LikelyBool), 1);
    // The suggestion does not coerce the type.
    assert_eq!(ck.table().entry(b).ty, Ty::Int);
}

#[test]
fn test_mutable_abstract_type_needs_indirection() {
    let (mut ck, log) = checker();
    ck.begin_typedef_declaration(QualType::with_quals(
        Ty::Int,
        vec![Qual::Abstract, Qual::Mutable],
    ))
    .unwrap();
    let m = ck
        .reconcile_declarator(Declarator::new("counter", at(1)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    assert_eq!(log.count_of(Category::MutableRep), 1);
    assert!(ck.table().entry(m).ty.is_abstract());

    // A pointer representation passes without comment.
    ck.begin_typedef_declaration(QualType::with_quals(
        Ty::pointer(Ty::Char),
        vec![Qual::Abstract, Qual::Mutable],
    ))
    .unwrap();
    ck.reconcile_declarator(Declarator::new("handle", at(2)))
        .unwrap();
    ck.end_declaration();
    assert_eq!(log.count_of(Category::MutableRep), 1);
}

#[test]
fn test_abstract_enum_typedef_retypes_members() {
    let (mut ck, log) = checker();
    let r = ck.declare_enum_member("red", None, &at(1));
    let g = ck.declare_enum_member("green", None, &at(1));
    let ety = ck.declare_enum(Some("color_tag".into()), vec![r, g], &at(1));

    ck.begin_typedef_declaration(QualType::with_quals(ety, vec![Qual::Abstract]))
        .unwrap();
    let c = ck
        .reconcile_declarator(Declarator::new("color", at(2)))
        .unwrap()
        .unwrap();
    ck.end_declaration();

    assert!(log.is_empty());
    assert!(ck.table().entry(c).ty.is_abstract());
    assert!(ck.table().entry(r).ty.is_abstract());
    assert!(ck.table().entry(g).ty.is_abstract());
}

#[test]
fn test_implicit_abstraction_config() {
    let config = CheckerConfig {
        imp_abstract: true,
        ..CheckerConfig::default()
    };
    let (mut ck, _log) = checker_with(config);

    ck.begin_typedef_declaration(QualType::new(Ty::Int)).unwrap();
    let h = ck
        .reconcile_declarator(Declarator::new("handle", at(1)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    assert!(ck.table().entry(h).ty.is_abstract());

    ck.begin_typedef_declaration(QualType::with_quals(Ty::Int, vec![Qual::Concrete]))
        .unwrap();
    let raw = ck
        .reconcile_declarator(Declarator::new("raw", at(2)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    assert_eq!(ck.table().entry(raw).ty, Ty::Int);
}

#[test]
fn test_exported_type_from_header() {
    let (mut ck, log) = checker();
    ck.begin_typedef_declaration(QualType::new(Ty::Int)).unwrap();
    ck.reconcile_declarator(Declarator::new("counter", Loc::new("defs.h", 4, 1)))
        .unwrap();
    ck.end_declaration();
    assert_eq!(log.count_of(Category::ExportedType), 1);

    ck.begin_typedef_declaration(QualType::new(Ty::Int)).unwrap();
    ck.reconcile_declarator(Declarator::new("local_counter", at(5)))
        .unwrap();
    ck.end_declaration();
    assert_eq!(log.count_of(Category::ExportedType), 1);
}

// ============================================================================
// STRUCTS AND ITERATORS
// ============================================================================

#[test]
fn test_member_groups_build_against_base_type() {
    let (mut ck, log) = checker();
    let base = QualType::new(Ty::Int);
    let declarators = vec![
        Declarator::new("x", at(1)),
        Declarator::with_type("next", Ty::pointer(Ty::Unknown), at(1)),
    ];
    let fields = field_group(&base, &declarators);
    assert_eq!(fields[0].ty, Ty::Int);
    assert_eq!(fields[1].ty, Ty::pointer(Ty::Int));

    let ty = ck.declare_struct(Some("node".into()), fields, &at(1));
    assert!(ty.field("x").is_some());
    assert!(ty.field("next").is_some());
    assert!(log.is_empty());
}

#[test]
fn test_iterator_declaration_and_yield_binding() {
    let (mut ck, log) = checker();
    let params = vec![
        named_param("el", Ty::Unknown),
        named_param("max", Ty::Int),
    ];
    let it = ck.declare_iter("elements", params, vec![0], &at(1));
    assert!(ck.table().lookup_global("end_elements").is_some());

    ck.begin_iter_body(it);
    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    let bound = ck
        .reconcile_declarator(Declarator::new("el", at(2)))
        .unwrap()
        .unwrap();
    ck.end_declaration();

    // A yield parameter binds directly; any other name declares an
    // ordinary local.
    assert!(ck.table().entry(bound).is_param());
    assert_eq!(ck.table().entry(bound).ty, Ty::Int);

    ck.begin_var_declaration(QualType::new(Ty::Int)).unwrap();
    let plain = ck
        .reconcile_declarator(Declarator::new("max", at(3)))
        .unwrap()
        .unwrap();
    ck.end_declaration();
    assert!(ck.table().entry(plain).is_var());

    ck.end_iter_body();
    assert!(log.is_empty());
}
