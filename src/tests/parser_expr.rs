use crate::ast::{Ast, NodeKind, NodeRef};
use crate::compiler::CompilePhase;
use crate::error::ErrorKind;
use crate::lexer::Constant;
use crate::tests::test_utils::{run_pipeline_error, setup_parse};

/// Fully parenthesized rendering of an expression tree.
fn sexpr(ast: &Ast, node: NodeRef) -> String {
    let join = |nodes: &[NodeRef]| nodes.iter().map(|&n| sexpr(ast, n)).collect::<Vec<_>>().join(" ");
    match ast.get_kind(node) {
        NodeKind::Identifier(name) => name.to_string(),
        NodeKind::Constant(Constant::Integer { value, .. }) => value.to_string(),
        NodeKind::Binary(op, l, r) | NodeKind::Assignment(op, l, r) => format!("({:?} {})", op, join(&[*l, *r])),
        NodeKind::Unary(op, e) => format!("({:?} {})", op, sexpr(ast, *e)),
        NodeKind::PostIncrement(e) => format!("(post++ {})", sexpr(ast, *e)),
        NodeKind::PostDecrement(e) => format!("(post-- {})", sexpr(ast, *e)),
        NodeKind::Conditional(c, t, e) => format!("(? {})", join(&[*c, *t, *e])),
        NodeKind::Call(f, args) => {
            let mut nodes = vec![*f];
            nodes.extend(args.iter().copied());
            format!("(call {})", join(&nodes))
        }
        NodeKind::Index(a, i) => format!("([] {})", join(&[*a, *i])),
        NodeKind::Member(o, field, true) => format!("(-> {} {})", sexpr(ast, *o), field),
        NodeKind::Member(o, field, false) => format!("(. {} {})", sexpr(ast, *o), field),
        NodeKind::Cast(_, e) => format!("(cast {})", sexpr(ast, *e)),
        NodeKind::SizeOfExpr(e) => format!("(sizeof {})", sexpr(ast, *e)),
        NodeKind::SizeOfType(_) => "(sizeof <type>)".to_string(),
        NodeKind::CompoundLiteral(_, _) => "<compound-literal>".to_string(),
        other => format!("<{:?}>", other),
    }
}

/// Every expression statement of `body`, parsed inside a function.
fn parse_statements(declarations: &str, body: &str) -> Vec<String> {
    let ast = setup_parse(&format!("{}\nvoid f(void) {{ {} }}\n", declarations, body));
    ast.kinds
        .iter()
        .filter_map(|kind| match kind {
            NodeKind::ExpressionStatement(Some(expr)) => Some(sexpr(&ast, *expr)),
            _ => None,
        })
        .collect()
}

fn parse_expr(expr: &str) -> String {
    let mut statements = parse_statements("", &format!("{};", expr));
    assert_eq!(statements.len(), 1, "expected one expression statement");
    statements.remove(0)
}

#[test]
fn test_multiplicative_binds_tighter_than_additive() {
    insta::assert_snapshot!(parse_expr("a + b * c"), @"(Add a (Mul b c))");
    insta::assert_snapshot!(parse_expr("a * b + c"), @"(Add (Mul a b) c)");
}

#[test]
fn test_binary_operators_are_left_associative() {
    insta::assert_snapshot!(parse_expr("a - b - c"), @"(Sub (Sub a b) c)");
    insta::assert_snapshot!(parse_expr("a / b % c"), @"(Mod (Div a b) c)");
}

#[test]
fn test_assignment_is_right_associative() {
    insta::assert_snapshot!(parse_expr("a = b = c"), @"(Assign a (Assign b c))");
    insta::assert_snapshot!(parse_expr("a += b <<= 2"), @"(AssignAdd a (AssignLShift b 2))");
}

#[test]
fn test_conditional_nests_to_the_right() {
    insta::assert_snapshot!(parse_expr("a ? b : c ? d : e"), @"(? a b (? c d e))");
    insta::assert_snapshot!(parse_expr("a || b ? c , d : e"), @"(? (LogicOr a b) (Comma c d) e)");
}

#[test]
fn test_operator_precedence_ladder() {
    insta::assert_snapshot!(parse_expr("a << 1 < b & c"), @"(BitAnd (Less (LShift a 1) b) c)");
    insta::assert_snapshot!(parse_expr("a || b && c | d ^ e"), @"(LogicOr a (LogicAnd b (BitOr c (BitXor d e))))");
    insta::assert_snapshot!(parse_expr("a == b != c"), @"(NotEqual (Equal a b) c)");
}

#[test]
fn test_comma_has_lowest_precedence() {
    insta::assert_snapshot!(parse_expr("a, b = 1"), @"(Comma a (Assign b 1))");
}

#[test]
fn test_postfix_and_unary_operators() {
    insta::assert_snapshot!(parse_expr("-a[1]++"), @"(Minus (post++ ([] a 1)))");
    insta::assert_snapshot!(parse_expr("*p++"), @"(Deref (post++ p))");
    insta::assert_snapshot!(parse_expr("f(a, b)->x.y"), @"(. (-> (call f a b) x) y)");
    insta::assert_snapshot!(parse_expr("!~--x"), @"(LogicNot (BitNot (PreDecrement x)))");
}

#[test]
fn test_sizeof_operand_forms() {
    insta::assert_snapshot!(parse_expr("sizeof a + 1"), @"(Add (sizeof a) 1)");
    insta::assert_snapshot!(parse_expr("sizeof (int) * 2"), @"(Mul (sizeof <type>) 2)");
    insta::assert_snapshot!(parse_expr("sizeof (int){1}"), @"(sizeof <compound-literal>)");
}

#[test]
fn test_parenthesized_typedef_name_starts_a_cast() {
    let statements = parse_statements("typedef int T; int a; int *p;", "(T)*p; (a)*p; (long)a + 1;");
    assert_eq!(statements, vec!["(cast (Deref p))", "(Mul a (Deref p))", "(Add (cast a) 1)"]);
}

#[test]
fn test_local_declaration_shadows_typedef_name() {
    // after `int T;` the name is an ordinary identifier again
    let statements = parse_statements("typedef int T; int *p;", "int T; (T)*p;");
    assert_eq!(statements, vec!["(Mul T (Deref p))"]);
}

#[test]
fn test_unbalanced_parenthesis_is_malformed() {
    let err = run_pipeline_error("void f(void) { (a + b; }", CompilePhase::Parse);
    assert_eq!(err.kind, ErrorKind::MalformedInput);
    insta::assert_snapshot!(err.message, @"expected ')', found ';'");
}

#[test]
fn test_missing_operand_is_malformed() {
    let err = run_pipeline_error("int x = 1 + ;", CompilePhase::Parse);
    assert_eq!(err.kind, ErrorKind::MalformedInput);
    insta::assert_snapshot!(err.message, @"expected expression, found ';'");
}

#[test]
fn test_pathological_nesting_is_rejected() {
    let depth = 300;
    let source = format!("int x = {}1{};", "(".repeat(depth), ")".repeat(depth));
    let err = run_pipeline_error(&source, CompilePhase::Parse);
    assert_eq!(err.kind, ErrorKind::OutOfBounds);
}
