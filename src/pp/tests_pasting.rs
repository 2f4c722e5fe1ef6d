use super::*;
use crate::diagnostic::DiagnosticEngine;
use crate::error::{Error, ErrorKind};
use crate::lang_options::Environment;
use crate::lexer::{Punctuator, Token, TokenFlags, TokenKind};
use symbol_table::GlobalSymbol as Symbol;

/// Helper function to set up preprocessor testing
fn setup_preprocessor_test(src: &str) -> Result<Vec<Token>, Error> {
    let _ = env_logger::builder().is_test(true).try_init();

    let locator = VirtualSourceLocator::new();
    let mut diagnostics = DiagnosticEngine::new();
    let mut preprocessor = Preprocessor::new(
        &locator,
        &mut diagnostics,
        &Environment::default(),
        PreprocessorConfig::default(),
    )?;
    let mut tokens = preprocessor.process(src, Symbol::new("<test>"))?;
    tokens.retain(|t| !t.is_sentinel());
    Ok(tokens)
}

/// Helper macro to assert token sequence kinds
macro_rules! assert_token_kinds {
    ($tokens:expr, $( $expected:expr ),* $(,)?) => {{
        let expected_kinds = vec![$($expected),*];
        assert_eq!($tokens.len(), expected_kinds.len(), "Token count mismatch: {:?}", $tokens);
        for (i, (token, expected)) in $tokens.iter().zip(expected_kinds.iter()).enumerate() {
            assert_eq!(token.kind, *expected, "Token {} kind mismatch: expected {:?}, got {:?}", i, expected, token.kind);
        }
    }};
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(Symbol::new(name))
}

fn number(text: &str) -> TokenKind {
    TokenKind::PpNumber(Symbol::new(text))
}

#[test]
fn test_paste_numbers() {
    let src = r#"
#define CAT(a, b) a ## b
int x = CAT(12, 34);
"#;
    let tokens = setup_preprocessor_test(src).unwrap();

    // 1234 is one pp-number, not two
    assert_token_kinds!(
        tokens,
        ident("int"),
        ident("x"),
        TokenKind::Punctuator(Punctuator::Assign),
        number("1234"),
        TokenKind::Punctuator(Punctuator::Semicolon)
    );
    assert!(tokens[3].flags.contains(TokenFlags::MACRO_EXPANDED));
}

#[test]
fn test_paste_with_empty_argument_is_identity() {
    let src = "#define CAT(a, b) a##b\nCAT(x,) CAT(,y) CAT(,) end";
    let tokens = setup_preprocessor_test(src).unwrap();
    assert_token_kinds!(tokens, ident("x"), ident("y"), ident("end"));
}

#[test]
fn test_paste_operators() {
    let src = r#"
#define PASTE(a, b) a ## b
x PASTE(+, +); y PASTE(<<, =) 1; p PASTE(-, >) f;
"#;
    let tokens = setup_preprocessor_test(src).unwrap();
    assert_token_kinds!(
        tokens,
        ident("x"),
        TokenKind::Punctuator(Punctuator::Increment),
        TokenKind::Punctuator(Punctuator::Semicolon),
        ident("y"),
        TokenKind::Punctuator(Punctuator::LeftShiftAssign),
        number("1"),
        TokenKind::Punctuator(Punctuator::Semicolon),
        ident("p"),
        TokenKind::Punctuator(Punctuator::Arrow),
        ident("f"),
        TokenKind::Punctuator(Punctuator::Semicolon)
    );
}

#[test]
fn test_invalid_paste_reports_left_operand() {
    let src = "#define PASTE(a, b) a ## b\n\nint y = PASTE(+, -);";
    let err = setup_preprocessor_test(src).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedInput);
    assert_eq!(err.location.map(|l| l.line), Some(3));
    assert_eq!(err.message, "pasting \"+\" and \"-\" does not give a valid preprocessing token");
}

#[test]
fn test_pasted_identifier_is_rescanned() {
    let src = "#define ab 42\n#define CAT(a, b) a##b\nCAT(a, b)";
    let tokens = setup_preprocessor_test(src).unwrap();
    assert_token_kinds!(tokens, number("42"));
}

#[test]
fn test_paste_joins_only_adjacent_tokens_of_arguments() {
    let src = "#define CAT(a, b) a##b\nCAT(x y, z w)";
    let tokens = setup_preprocessor_test(src).unwrap();
    assert_token_kinds!(tokens, ident("x"), ident("yz"), ident("w"));
}

#[test]
fn test_paste_in_object_macro() {
    let src = "#define HH x ## y\nHH";
    let tokens = setup_preprocessor_test(src).unwrap();
    assert_token_kinds!(tokens, ident("xy"));
}

#[test]
fn test_paste_chain() {
    let src = "#define CAT3(a, b, c) a ## b ## c\nCAT3(1, 2, 3) CAT3(a, , c)";
    let tokens = setup_preprocessor_test(src).unwrap();
    assert_token_kinds!(tokens, number("123"), ident("ac"));
}

#[test]
fn test_variadic_paste_and_stringify() {
    let src = "#define LOG(fmt, ...) log(fmt, __VA_ARGS__)\n#define NAME(...) #__VA_ARGS__\nLOG(\"a\", 1) NAME(x, y)";
    let tokens = setup_preprocessor_test(src).unwrap();
    assert_eq!(render(&tokens), "log ( \"a\" , 1 ) \"x, y\"");
}

#[test]
fn test_digraph_directives_and_paste() {
    let src = "%:define STR(x) %:x\n%:define CAT(a, b) a %:%: b\nSTR(v) CAT(%:, %:) <: :>";
    let tokens = setup_preprocessor_test(src).unwrap();
    assert_eq!(render(&tokens), "\"v\" %:%: <: :>");
    assert!(tokens[1].is_punctuator(Punctuator::HashHash));
    assert!(tokens[1].flags.contains(TokenFlags::DIGRAPH));
    assert!(tokens[2].is_punctuator(Punctuator::LeftBracket));
}
