use symbol_table::GlobalSymbol as Symbol;

use crate::compiler::CompilePhase;
use crate::error::ErrorKind;
use crate::semantic::{ScopeKind, ScopedIdentifier, Storage};
use crate::tests::test_utils::{expression_type, run_pipeline_error, setup_analysis};

fn names<'a>(symbols: impl Iterator<Item = &'a Symbol>) -> Vec<String> {
    symbols.map(|s| s.to_string()).collect()
}

#[test]
fn test_function_scope_holds_parameters_and_outer_locals() {
    let (_, unit) = setup_analysis(
        r#"
int f(int a, int b) {
    int c;
    { int d; }
    { int e; { int g; } }
    return a;
}
"#,
    );
    let function = &unit.info.functions[0];
    assert_eq!(function.name, Symbol::new("f"));

    let scope = unit.symbols.scope(function.scope);
    assert_eq!(scope.kind, ScopeKind::Function);
    assert_eq!(names(scope.symbols.keys()), vec!["a", "b", "c"]);
    assert_eq!(scope.children.len(), 2);

    let first = unit.symbols.scope(scope.children[0]);
    assert_eq!(first.kind, ScopeKind::Block);
    assert_eq!(names(first.symbols.keys()), vec!["d"]);
    let second = unit.symbols.scope(scope.children[1]);
    assert_eq!(names(second.symbols.keys()), vec!["e"]);
    assert_eq!(second.children.len(), 1);
    assert_eq!(second.parent, Some(function.scope));
}

#[test]
fn test_inner_declaration_shadows_outer() {
    let decls = "int x;";
    assert_eq!(expression_type(decls, "x"), "int");
    let source = "int x; void f(void) { char x; { double x; } x; }";
    let (ast, unit) = setup_analysis(source);
    let node = crate::tests::test_utils::last_expression_statement(&ast);
    let ty = unit.info.expression_type(node).expect("x is typed");
    assert_eq!(unit.registry.display(ty), "char");
}

#[test]
fn test_for_loop_declaration_gets_its_own_scope() {
    let (_, unit) = setup_analysis(
        r#"
void f(void) {
    int i;
    for (int i = 0; i < 3; i++) { int j = i; }
}
"#,
    );
    let scope = unit.symbols.scope(unit.info.functions[0].scope);
    assert_eq!(names(scope.symbols.keys()), vec!["i"]);
    let for_scope = unit.symbols.scope(scope.children[0]);
    assert_eq!(names(for_scope.symbols.keys()), vec!["i"]);
    let body = unit.symbols.scope(for_scope.children[0]);
    assert_eq!(names(body.symbols.keys()), vec!["j"]);
}

#[test]
fn test_storage_classes_of_declared_objects() {
    let (_, unit) = setup_analysis(
        r#"
int e;
static int s;
_Thread_local int t;
static _Thread_local int st;
extern _Thread_local int et;
void f(void) {
    static int local_static;
    register int r;
    int a;
    extern int g;
}
"#,
    );
    let storage = |scope: &crate::semantic::symbol_table::Scope, name: &str| match scope.symbols.get(&Symbol::new(name)) {
        Some(ScopedIdentifier::Object { storage, .. }) => *storage,
        other => panic!("'{}' is not an object: {:?}", name, other),
    };
    let global = unit.symbols.scope(crate::semantic::ScopeId::GLOBAL);
    assert_eq!(storage(global, "e"), Storage::Extern);
    assert_eq!(storage(global, "s"), Storage::Static);
    assert_eq!(storage(global, "t"), Storage::ThreadLocal);
    assert_eq!(storage(global, "st"), Storage::StaticThreadLocal);
    assert_eq!(storage(global, "et"), Storage::ExternThreadLocal);

    let local = unit.symbols.scope(unit.info.functions[0].scope);
    assert_eq!(storage(local, "local_static"), Storage::Static);
    assert_eq!(storage(local, "r"), Storage::Register);
    assert_eq!(storage(local, "a"), Storage::Auto);
    assert_eq!(storage(local, "g"), Storage::Extern);
}

#[test]
fn test_block_scope_thread_local_requires_storage_class() {
    let err = run_pipeline_error("void f(void) { _Thread_local int x; }", CompilePhase::Analyze);
    assert_eq!(err.kind, ErrorKind::MalformedInput);
    assert_eq!(err.message, "'_Thread_local' at block scope requires 'static' or 'extern'");
}

#[test]
fn test_tags_live_in_their_own_namespace() {
    let decls = "struct T { int a; }; typedef int T; struct T s; T t;";
    assert_eq!(expression_type(decls, "s.a"), "int");
    assert_eq!(expression_type(decls, "t"), "int");
}

#[test]
fn test_inner_tag_declaration_hides_outer_definition() {
    let err = run_pipeline_error(
        r#"
struct S { int a; };
void f(void) {
    struct S;
    struct S *p;
    p->a;
}
"#,
        CompilePhase::Analyze,
    );
    assert_eq!(err.message, "incomplete definition of type 'struct S'");
}

#[test]
fn test_file_scope_redeclarations_merge() {
    let (_, unit) = setup_analysis(
        r#"
int counter;
extern int counter;
int counter = 3;
int twice(int);
int twice(int x) { return x * 2; }
"#,
    );
    match unit.symbols.lookup_global(Symbol::new("counter")) {
        Some(ScopedIdentifier::Object { defined, storage, .. }) => {
            assert!(*defined);
            assert_eq!(*storage, Storage::Extern);
        }
        other => panic!("counter is not an object: {:?}", other),
    }
    match unit.symbols.lookup_global(Symbol::new("twice")) {
        Some(ScopedIdentifier::Function { defined, .. }) => assert!(*defined),
        other => panic!("twice is not a function: {:?}", other),
    }
}

#[test]
fn test_labels_are_function_scoped() {
    setup_analysis(
        r#"
void f(void) {
    goto done;
    { done: ; }
}
"#,
    );
    let err = run_pipeline_error("void f(void) { goto missing; }", CompilePhase::Analyze);
    assert_eq!(err.message, "use of undeclared label 'missing'");
}

#[test]
fn test_switch_and_loop_context() {
    setup_analysis(
        r#"
int f(int x) {
    switch (x) {
    case 1: return 10;
    case 2: { break; }
    default: break;
    }
    while (x) { if (x > 3) break; x--; continue; }
    return 0;
}
"#,
    );
    let err = run_pipeline_error("void f(int x) { switch (x) { case 1: case 1: break; } }", CompilePhase::Analyze);
    assert_eq!(err.message, "duplicate case value '1'");
    let err = run_pipeline_error("void f(void) { continue; }", CompilePhase::Analyze);
    assert_eq!(err.message, "'continue' statement not in loop statement");
}

#[test]
fn test_block_extern_inherits_file_scope_linkage() {
    let (_, unit) = setup_analysis(
        r#"
static int hidden;
int shared;
void f(void) {
    extern int hidden;
    extern int shared;
    { int hidden; { extern int hidden; } }
}
"#,
    );
    let function = unit.symbols.scope(unit.info.functions[0].scope);
    let object = |scope: &crate::semantic::symbol_table::Scope, name: &str| match scope.symbols.get(&Symbol::new(name)) {
        Some(ScopedIdentifier::Object {
            storage,
            file_scope_entity,
            ..
        }) => (*storage, *file_scope_entity),
        other => panic!("'{}' is not an object: {:?}", name, other),
    };
    assert_eq!(object(function, "hidden"), (Storage::Static, true));
    assert_eq!(object(function, "shared"), (Storage::Extern, true));

    // an automatic declaration in between hides the file-scope object
    let block = unit.symbols.scope(function.children[0]);
    assert_eq!(object(block, "hidden"), (Storage::Auto, false));
    let inner = unit.symbols.scope(block.children[0]);
    assert_eq!(object(inner, "hidden"), (Storage::Extern, false));

    let err = run_pipeline_error("static int v; void f(void) { extern long v; }", CompilePhase::Analyze);
    assert_eq!(err.message, "conflicting types for 'v' ('long' vs 'int')");
}
