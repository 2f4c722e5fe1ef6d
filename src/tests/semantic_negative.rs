use symbol_table::GlobalSymbol as Symbol;

use crate::compiler::{CompilationUnit, CompilePhase, CompileOptions};
use crate::diagnostic::DiagnosticLevel;
use crate::error::ErrorKind;
use crate::pp::VirtualSourceLocator;
use crate::tests::test_utils::run_pipeline_error;

fn assert_rejected(source: &str, kind: ErrorKind, message: &str) {
    let err = run_pipeline_error(source, CompilePhase::Analyze);
    assert_eq!(err.kind, kind, "for {:?}: {}", source, err.message);
    assert_eq!(err.message, message, "for {:?}", source);
}

#[test]
fn test_undeclared_identifier() {
    assert_rejected(
        "int f(void) { return y; }",
        ErrorKind::NotFound,
        "use of undeclared identifier 'y'",
    );
}

#[test]
fn test_variable_of_incomplete_type() {
    assert_rejected(
        "struct S; void f(void) { struct S s; }",
        ErrorKind::MalformedInput,
        "variable 's' has incomplete type 'struct S'",
    );
    assert_rejected("void v;", ErrorKind::MalformedInput, "variable 'v' has type 'void'");
}

#[test]
fn test_failed_static_assertion() {
    assert_rejected(
        "_Static_assert(sizeof(int) == 8, \"int is 8 bytes\");",
        ErrorKind::MalformedInput,
        "static assertion failed: int is 8 bytes",
    );
    assert_rejected("_Static_assert(0);", ErrorKind::MalformedInput, "static assertion failed");
}

#[test]
fn test_static_assertion_requires_constant() {
    let err = run_pipeline_error("int n; _Static_assert(n, \"n\");", CompilePhase::Analyze);
    assert_ne!(err.kind, ErrorKind::InternalError);
}

#[test]
fn test_redefinitions() {
    assert_rejected("int x = 1; int x = 2;", ErrorKind::MalformedInput, "redefinition of 'x'");
    assert_rejected(
        "void f(void) { int a; int a; }",
        ErrorKind::MalformedInput,
        "redefinition of 'a'",
    );
    assert_rejected(
        "void g(void) {} void g(void) {}",
        ErrorKind::MalformedInput,
        "redefinition of function 'g'",
    );
    assert_rejected(
        "struct S { int a; }; struct S { int b; };",
        ErrorKind::MalformedInput,
        "redefinition of 'struct S'",
    );
    assert_rejected(
        "typedef int T; typedef long T;",
        ErrorKind::MalformedInput,
        "typedef redefinition of 'T' with different types ('long' vs 'int')",
    );
    assert_rejected(
        "int x; long x;",
        ErrorKind::MalformedInput,
        "conflicting types for 'x' ('long' vs 'int')",
    );
}

#[test]
fn test_invalid_operands() {
    assert_rejected(
        "struct S { int a; } s; int f(void) { return s + 1; }",
        ErrorKind::MalformedInput,
        "invalid operands to binary expression ('struct S' and 'int')",
    );
    assert_rejected(
        "double d; int f(void) { return d % 2; }",
        ErrorKind::MalformedInput,
        "invalid operands to binary expression ('double' and 'int')",
    );
    assert_rejected(
        "int i; void f(void) { *i; }",
        ErrorKind::MalformedInput,
        "indirection requires pointer operand ('int' invalid)",
    );
}

#[test]
fn test_assignment_constraints() {
    assert_rejected(
        "const int c = 1; void f(void) { c = 2; }",
        ErrorKind::MalformedInput,
        "cannot assign to variable 'c' with const-qualified type",
    );
    assert_rejected(
        "int a[2]; void f(void) { a = 0; }",
        ErrorKind::MalformedInput,
        "expression is not assignable",
    );
    assert_rejected(
        "struct S { int a; } s; int *p; void f(void) { p = s; }",
        ErrorKind::MalformedInput,
        "incompatible types assigning to 'int *' from 'struct S'",
    );
    assert_rejected(
        "void f(void) { register int r; &r; }",
        ErrorKind::MalformedInput,
        "address of register variable 'r' requested",
    );
}

#[test]
fn test_call_constraints() {
    assert_rejected(
        "int g(int, int); void f(void) { g(1); }",
        ErrorKind::MalformedInput,
        "too few arguments to function call, expected 2, have 1",
    );
    assert_rejected(
        "int x; void f(void) { x(); }",
        ErrorKind::MalformedInput,
        "called object type 'int' is not a function or function pointer",
    );
}

#[test]
fn test_sizeof_constraints() {
    assert_rejected(
        "struct S; unsigned long n = sizeof(struct S);",
        ErrorKind::MalformedInput,
        "invalid application of 'sizeof' to an incomplete type 'struct S'",
    );
    assert_rejected(
        "struct B { int x : 3; } b; void f(void) { sizeof b.x; }",
        ErrorKind::MalformedInput,
        "invalid application of 'sizeof' to a bit-field",
    );
}

#[test]
fn test_bit_field_constraints() {
    assert_rejected(
        "struct B { float f : 3; };",
        ErrorKind::MalformedInput,
        "bit-field 'f' has non-integral type 'float'",
    );
    assert_rejected(
        "struct B { int z : 0; };",
        ErrorKind::MalformedInput,
        "named bit-field 'z' has zero width",
    );
    assert_rejected(
        "struct B { char c : 9; };",
        ErrorKind::MalformedInput,
        "width of bit-field 'c' (9 bits) exceeds the width of its type (8 bits)",
    );
}

#[test]
fn test_statement_context_constraints() {
    assert_rejected(
        "void f(void) { break; }",
        ErrorKind::MalformedInput,
        "'break' statement not in loop or switch statement",
    );
    assert_rejected(
        "void f(void) { return 1; }",
        ErrorKind::MalformedInput,
        "void function 'f' should not return a value",
    );
    assert_rejected(
        "struct S { int a; } s; void f(void) { if (s) {} }",
        ErrorKind::MalformedInput,
        "statement requires expression of scalar type ('struct S' invalid)",
    );
}

#[test]
fn test_complex_types_are_not_supported() {
    assert_rejected("_Complex double z;", ErrorKind::NotSupported, "complex types are not supported");
}

#[test]
fn test_warnings_are_collected_without_failing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let locator = VirtualSourceLocator::new();
    let mut unit = CompilationUnit::new(&locator, CompileOptions::default());
    let source = "int; int f(void) { return; }";
    let artifact = unit
        .run(source, Symbol::new("warn.c"), CompilePhase::Analyze)
        .expect("warnings do not stop analysis");
    assert!(artifact.analyzed.is_some());

    let warnings: Vec<&str> = unit.diagnostics().warnings().map(|d| d.message.as_str()).collect();
    assert_eq!(
        warnings,
        vec![
            "declaration does not declare anything",
            "non-void function 'f' should return a value"
        ]
    );
    assert!(!unit.diagnostics().has_errors());
}

#[test]
fn test_errors_are_reported_to_diagnostics() {
    let _ = env_logger::builder().is_test(true).try_init();
    let locator = VirtualSourceLocator::new();
    let mut unit = CompilationUnit::new(&locator, CompileOptions::default());
    let result = unit.run("int f(void) { return y; }", Symbol::new("err.c"), CompilePhase::Analyze);
    assert!(result.is_err());
    assert!(unit.diagnostics().has_errors());
    let error = unit
        .diagnostics()
        .diagnostics()
        .iter()
        .find(|d| d.level == DiagnosticLevel::Error)
        .expect("an error diagnostic");
    assert!(error.message.ends_with("use of undeclared identifier 'y'"));
    assert!(error.location.is_some());
}
