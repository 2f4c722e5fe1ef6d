use crate::ast::{Ast, Declarator, NodeKind, NodeRef};
use crate::compiler::CompilePhase;
use crate::error::ErrorKind;
use crate::tests::test_utils::{run_pipeline_error, setup_parse};

/// Wrapper structure of a declarator, innermost identifier last.
fn shape(declarator: &Declarator) -> String {
    match declarator {
        Declarator::Identifier(name, _) => name.to_string(),
        Declarator::Abstract => "_".to_string(),
        Declarator::Pointer(_, inner) => format!("ptr({})", shape(inner)),
        Declarator::Array(inner, _) => format!("array({})", shape(inner)),
        Declarator::Function { inner, params, .. } => format!("fn[{}]({})", params.len(), shape(inner)),
    }
}

fn declarator_shapes(source: &str) -> Vec<String> {
    let ast = setup_parse(source);
    ast.kinds
        .iter()
        .filter_map(|kind| match kind {
            NodeKind::Declaration(data) => Some(data.init_declarators.iter().map(|d| shape(&d.declarator))),
            _ => None,
        })
        .flatten()
        .collect()
}

fn statement(ast: &Ast, node: NodeRef) -> String {
    match ast.get_kind(node) {
        NodeKind::Compound(items) => {
            let items: Vec<String> = items.iter().map(|&item| statement(ast, item)).collect();
            format!("{{{}}}", items.join(" "))
        }
        NodeKind::ExpressionStatement(Some(_)) => "expr".to_string(),
        NodeKind::ExpressionStatement(None) => ";".to_string(),
        NodeKind::Declaration(_) => "decl".to_string(),
        NodeKind::If(stmt) => format!(
            "(if {} {})",
            statement(ast, stmt.then_branch),
            stmt.else_branch.map_or("-".to_string(), |e| statement(ast, e))
        ),
        NodeKind::While(stmt) => format!("(while {})", statement(ast, stmt.body)),
        NodeKind::DoWhile(body, _) => format!("(do {})", statement(ast, *body)),
        NodeKind::For(stmt) => format!(
            "(for {} {})",
            stmt.init.map_or("-".to_string(), |i| statement(ast, i)),
            statement(ast, stmt.body)
        ),
        NodeKind::Switch(_, body) => format!("(switch {})", statement(ast, *body)),
        NodeKind::Case(_, body) => format!("(case {})", statement(ast, *body)),
        NodeKind::Default(body) => format!("(default {})", statement(ast, *body)),
        NodeKind::Label(name, body) => format!("({}: {})", name, statement(ast, *body)),
        NodeKind::Goto(name) => format!("(goto {})", name),
        NodeKind::Break => "break".to_string(),
        NodeKind::Continue => "continue".to_string(),
        NodeKind::Return(None) => "return".to_string(),
        NodeKind::Return(Some(_)) => "(return expr)".to_string(),
        other => format!("<{:?}>", other),
    }
}

/// Statement tree of the last function definition in `source`.
fn function_body(source: &str) -> String {
    let ast = setup_parse(source);
    let body = ast
        .kinds
        .iter()
        .rev()
        .find_map(|kind| match kind {
            NodeKind::FunctionDef(data) => Some(data.body),
            _ => None,
        })
        .expect("no function definition in source");
    statement(&ast, body)
}

#[test]
fn test_declarator_wrappers() {
    let shapes = declarator_shapes(
        r#"
int *a[3];
int (*b)[3];
int (*fp)(int, char);
int **const *p;
int (*(*x)(void))[2];
int f(int, ...), g;
"#,
    );
    assert_eq!(
        shapes,
        vec![
            "ptr(array(a))",
            "array(ptr(b))",
            "fn[2](ptr(fp))",
            "ptr(ptr(ptr(p)))",
            "array(ptr(fn[0](ptr(x))))",
            "fn[1](f)",
            "g",
        ]
    );
}

#[test]
fn test_abstract_declarators_in_parameters() {
    let ast = setup_parse("void h(int *, int [], int (*)(void));");
    let params: Vec<String> = ast
        .kinds
        .iter()
        .find_map(|kind| match kind {
            NodeKind::Declaration(data) => data.init_declarators.first().cloned(),
            _ => None,
        })
        .and_then(|d| match d.declarator {
            Declarator::Function { params, .. } => Some(params.iter().map(|p| shape(&p.declarator)).collect()),
            _ => None,
        })
        .expect("h is a function declarator");
    assert_eq!(params, vec!["ptr(_)", "array(_)", "fn[0](ptr(_))"]);
}

#[test]
fn test_statement_forms() {
    let body = function_body(
        r#"
void f(int x) {
    if (x) x = 1; else x = 2;
    while (x) x--;
    do x++; while (x < 3);
    for (int i = 0; i < 3; i++) ;
    for (;;) { continue; }
    switch (x) { case 1: break; default: ; }
    l: goto l;
    return;
}
"#,
    );
    insta::assert_snapshot!(
        body,
        @"{(if expr expr) (while expr) (do expr) (for decl ;) (for - {continue}) (switch {(case break) (default ;)}) (l: (goto l)) return}"
    );
}

#[test]
fn test_else_binds_to_nearest_if() {
    let body = function_body("int f(int a, int b) { if (a) if (b) return 1; else return 2; return 0; }");
    insta::assert_snapshot!(body, @"{(if (if (return expr) (return expr)) -) (return expr)}");
}

#[test]
fn test_typedef_name_starts_a_declaration() {
    let body = function_body("typedef int T; int a, *p; void f(void) { T * p; a * p; }");
    insta::assert_snapshot!(body, @"{decl expr}");
}

#[test]
fn test_typedef_visibility_follows_blocks() {
    // the typedef declared in the inner block is gone after it closes
    let body = function_body("int U, *q; void f(void) { { typedef int U; U * q; } U * q; }");
    insta::assert_snapshot!(body, @"{{decl decl} expr}");
}

#[test]
fn test_identifier_lists_are_not_supported() {
    let err = run_pipeline_error("int f(a, b) int a, b; { return a + b; }", CompilePhase::Parse);
    assert_eq!(err.kind, ErrorKind::NotSupported);
    assert_eq!(err.message, "identifier lists in function declarators are not supported");
}

#[test]
fn test_missing_identifier_in_declaration() {
    let err = run_pipeline_error("int *;", CompilePhase::Parse);
    assert_eq!(err.kind, ErrorKind::MalformedInput);
    insta::assert_snapshot!(err.message, @"expected identifier, found ';'");
}
