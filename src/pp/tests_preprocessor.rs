use super::*;
use crate::diagnostic::{Diagnostic, DiagnosticEngine};
use crate::error::{ErrorKind, Result};
use crate::lang_options::Environment;
use crate::lexer::{Token, TokenFlags, TokenKind};
use symbol_table::GlobalSymbol as Symbol;

/// Helper function to set up preprocessor testing
fn setup_preprocessor_test(src: &str) -> String {
    render(&setup_preprocessor_tokens(src, &VirtualSourceLocator::new(), PreprocessorConfig::default()).unwrap().0)
}

/// Helper function to set up preprocessor testing and return diagnostics
fn setup_preprocessor_tokens(
    src: &str,
    locator: &dyn SourceLocator,
    config: PreprocessorConfig,
) -> Result<(Vec<Token>, Vec<Diagnostic>)> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut diagnostics = DiagnosticEngine::new();
    let tokens = {
        let mut preprocessor = Preprocessor::new(locator, &mut diagnostics, &Environment::default(), config)?;
        preprocessor.process(src, Symbol::new("<test>"))?
    };
    Ok((tokens, diagnostics.diagnostics().to_vec()))
}

fn preprocess_error(src: &str) -> crate::error::Error {
    setup_preprocessor_tokens(src, &VirtualSourceLocator::new(), PreprocessorConfig::default()).unwrap_err()
}

fn warnings_of(src: &str) -> Vec<String> {
    let (_, diagnostics) =
        setup_preprocessor_tokens(src, &VirtualSourceLocator::new(), PreprocessorConfig::default()).unwrap();
    diagnostics.into_iter().map(|d| d.message).collect()
}

#[test]
fn test_simple_macro_definition_and_expansion() {
    let src = r#"
#define TEN 10
int x = TEN;
"#;
    insta::assert_snapshot!(setup_preprocessor_test(src), @"int x = 10 ;");
}

#[test]
fn test_output_ends_with_sentinel() {
    let (tokens, _) =
        setup_preprocessor_tokens("int x;", &VirtualSourceLocator::new(), PreprocessorConfig::default()).unwrap();
    assert!(tokens.last().is_some_and(Token::is_sentinel));
    assert!(tokens.iter().all(|t| !t.is_whitespace()));
}

#[test]
fn test_function_macro_substitutes_arguments() {
    let src = "#define SUM(x,y) (x)+(y)\nSUM(1,2)";
    insta::assert_snapshot!(setup_preprocessor_test(src), @"( 1 ) + ( 2 )");
}

#[test]
fn test_self_referential_macro_is_painted() {
    let (tokens, _) =
        setup_preprocessor_tokens("#define A A\nA", &VirtualSourceLocator::new(), PreprocessorConfig::default())
            .unwrap();
    assert_eq!(render(&tokens), "A");
    assert_eq!(tokens[0].kind, TokenKind::Identifier(Symbol::new("A")));
    assert!(tokens[0].flags.contains(TokenFlags::NO_EXPAND));
    assert!(tokens[0].flags.contains(TokenFlags::MACRO_EXPANDED));
}

#[test]
fn test_standard_rescanning_example() {
    let src = r#"
#define x 3
#define f(a) f(x * (a))
#undef x
#define x 2
#define g f
#define z z[0]
f(y+1) + f(f(z)) % g(2)
"#;
    insta::assert_snapshot!(
        setup_preprocessor_test(src),
        @"f ( 2 * ( y + 1 ) ) + f ( 2 * ( f ( 2 * ( z [ 0 ] ) ) ) ) % f ( 2 * ( 2 ) )"
    );
}

#[test]
fn test_stringification_normalizes_spacing() {
    let src = "#define STR(x) #x\nSTR(a + b) STR(  a   +   b  ) STR(a+b) STR()";
    insta::assert_snapshot!(setup_preprocessor_test(src), @r#""a + b" "a + b" "a+b" """#);
}

#[test]
fn test_stringification_uses_raw_argument() {
    let src = "#define ONE 1\n#define STR(x) #x\n#define XSTR(x) STR(x)\nSTR(ONE) XSTR(ONE)";
    insta::assert_snapshot!(setup_preprocessor_test(src), @r#""ONE" "1""#);
}

#[test]
fn test_function_macro_name_without_arguments() {
    let src = "#define f(x) [x]\nint f; f (1)";
    insta::assert_snapshot!(setup_preprocessor_test(src), @"int f ; [ 1 ]");
}

#[test]
fn test_invocation_spans_lines() {
    let src = "#define F(a, b) a b\nF(1,\n  2)\nend";
    insta::assert_snapshot!(setup_preprocessor_test(src), @"1 2 end");
}

#[test]
fn test_ifdef_else_both_directions() {
    let src = "#define X\n#ifdef X\nyes\n#else\nno\n#endif";
    assert_eq!(setup_preprocessor_test(src), "yes");

    let src = "#ifdef X\nyes\n#else\nno\n#endif";
    assert_eq!(setup_preprocessor_test(src), "no");

    let src = "#ifndef X\nmissing\n#endif\n#define X\n#ifndef X\nnever\n#endif";
    assert_eq!(setup_preprocessor_test(src), "missing");
}

#[test]
fn test_nested_conditionals_in_skipped_group() {
    let src = r#"
#if 0
#if 1
bad
#else
bad2
#endif
#elif 0
bad3
#else
good
#endif
"#;
    assert_eq!(setup_preprocessor_test(src), "good");
}

#[test]
fn test_elif_chain_takes_first_true_branch() {
    let src = r#"
#define V 2
#if V == 1
one
#elif V == 2
two
#elif V >= 2
again
#else
other
#endif
"#;
    assert_eq!(setup_preprocessor_test(src), "two");
}

#[test]
fn test_condition_operators() {
    let src = r#"
#define A 1
#if defined(A) && !defined B && UNKNOWN == 0 && (A ? 10 : 20) == 10
ok
#endif
#if A + 1 > 1 && -1 < 0 && (1 << 4) == 16
shift
#endif
"#;
    assert_eq!(setup_preprocessor_test(src), "ok shift");
}

#[test]
fn test_condition_with_function_macro() {
    let src = "#define MAX(a, b) ((a) > (b) ? (a) : (b))\n#if MAX(3, 7) == 7\nseven\n#endif";
    assert_eq!(setup_preprocessor_test(src), "seven");
}

#[test]
fn test_invalid_condition() {
    assert_eq!(preprocess_error("#if 1 +\nx\n#endif").kind, ErrorKind::MalformedInput);
    assert_eq!(preprocess_error("#if\n#endif").kind, ErrorKind::MalformedInput);
}

#[test]
fn test_unbalanced_conditionals() {
    let err = preprocess_error("#if 1\nx\n");
    assert!(err.message.contains("unterminated"), "{}", err);

    let err = preprocess_error("x\n#endif\n");
    assert_eq!(err.message, "#endif without #if");

    let err = preprocess_error("#if 1\n#else\n#else\n#endif\n");
    assert_eq!(err.message, "#else after #else");
}

#[test]
fn test_include_through_virtual_locator() {
    let locator = VirtualSourceLocator::new()
        .with_file("inc.h", "#define FROM_HEADER 7\nint header;\n")
        .with_file("sys/types.h", "typedef int size;\n");
    let src = "#include \"inc.h\"\n#include <sys/types.h>\nint x = FROM_HEADER;";
    let (tokens, _) = setup_preprocessor_tokens(src, &locator, PreprocessorConfig::default()).unwrap();
    insta::assert_snapshot!(render(&tokens), @"int header ; typedef int size ; int x = 7 ;");
    assert_eq!(tokens[0].location.file.as_str(), "inc.h");
    assert_eq!(tokens.last().map(|t| t.location.file.as_str()), Some("<test>"));
}

#[test]
fn test_include_from_macro() {
    let locator = VirtualSourceLocator::new().with_file("config.h", "configured");
    let src = "#define HEADER \"config.h\"\n#define ANGLED <config.h>\n#include HEADER\n#include ANGLED";
    let (tokens, _) = setup_preprocessor_tokens(src, &locator, PreprocessorConfig::default()).unwrap();
    assert_eq!(render(&tokens), "configured configured");
}

#[test]
fn test_include_errors() {
    let err = preprocess_error("#include \"missing.h\"\n");
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.location.map(|l| l.line), Some(1));

    let err = preprocess_error("#include 42\n");
    assert_eq!(err.kind, ErrorKind::MalformedInput);

    let locator = VirtualSourceLocator::new().with_file("loop.h", "#include \"loop.h\"\n");
    let config = PreprocessorConfig {
        max_include_depth: 16,
        ..Default::default()
    };
    let err = setup_preprocessor_tokens("#include \"loop.h\"", &locator, config).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfBounds);
}

#[test]
fn test_line_directive() {
    let src = "#line 100 \"renamed.c\"\nint x = __LINE__;\nconst char *f = __FILE__;";
    let (tokens, _) = setup_preprocessor_tokens(src, &VirtualSourceLocator::new(), PreprocessorConfig::default()).unwrap();
    insta::assert_snapshot!(render(&tokens), @r#"int x = 100 ; const char * f = "renamed.c" ;"#);
    assert_eq!(tokens[0].location.line, 100);
    assert_eq!(tokens[0].location.file.as_str(), "renamed.c");

    assert_eq!(preprocess_error("#line x\n").kind, ErrorKind::MalformedInput);
    assert_eq!(preprocess_error("#line 0\n").kind, ErrorKind::OutOfBounds);
}

#[test]
fn test_dynamic_builtins() {
    let src = "\n\nint l = __LINE__;\n#define HERE __LINE__\nint m = HERE;\nconst char *d = __DATE__;";
    insta::assert_snapshot!(
        setup_preprocessor_test(src),
        @r#"int l = 3 ; int m = 5 ; const char * d = "Jan  1 1970" ;"#
    );
}

#[test]
fn test_error_directive() {
    let err = preprocess_error("#error stop   here\n");
    assert_eq!(err.kind, ErrorKind::MalformedInput);
    assert_eq!(err.message, "#error stop here");

    // inactive groups never raise
    assert_eq!(setup_preprocessor_test("#if 0\n#error no\n#foo\n#endif\nok"), "ok");
}

#[test]
fn test_warning_and_pragma_directives() {
    let (tokens, diagnostics) = setup_preprocessor_tokens(
        "#warning careful now\n#pragma once\n_Pragma(\"pack(1)\") int x;",
        &VirtualSourceLocator::new(),
        PreprocessorConfig::default(),
    )
    .unwrap();
    assert_eq!(render(&tokens), "int x ;");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "#warning careful now");
}

#[test]
fn test_undef() {
    assert_eq!(setup_preprocessor_test("#define A 1\n#undef A\nA"), "A");
    assert_eq!(setup_preprocessor_test("#undef NEVER_DEFINED\nok"), "ok");

    let err = preprocess_error("#undef __LINE__\n");
    assert_eq!(err.kind, ErrorKind::MalformedInput);
    assert!(err.message.contains("builtin"));
}

#[test]
fn test_redefinition_warnings() {
    assert_eq!(warnings_of("#define A 1\n#define A 2\n"), ["'A' macro redefined", "previous definition is here"]);
    assert!(warnings_of("#define A (1 + 2)\n#define A (1   + 2)\n").is_empty());
    assert_eq!(warnings_of("#define __STDC__ 2\n"), ["redefining builtin macro '__STDC__'"]);
    assert_eq!(setup_preprocessor_test("#define A 1\n#define A 2\nA"), "2");
}

#[test]
fn test_argument_count_mismatch() {
    let err = preprocess_error("#define F(a,b) a\nF(1)");
    assert_eq!(err.kind, ErrorKind::OutOfBounds);
    assert_eq!(err.message, "macro 'F' requires 2 arguments, but 1 given");

    let err = preprocess_error("#define F(a) a\nF(1");
    assert_eq!(err.kind, ErrorKind::MalformedInput);
}

#[test]
fn test_invalid_directive() {
    let err = preprocess_error("#foo bar\n");
    assert_eq!(err.message, "invalid preprocessing directive '#foo'");
}

#[test]
fn test_command_line_defines() {
    let config = PreprocessorConfig {
        defines: vec![
            ("DEBUG".to_string(), "1".to_string()),
            ("SQ(x)".to_string(), "((x)*(x))".to_string()),
        ],
        ..Default::default()
    };
    let (tokens, _) =
        setup_preprocessor_tokens("#if DEBUG\nSQ(3)\n#endif", &VirtualSourceLocator::new(), config).unwrap();
    insta::assert_snapshot!(render(&tokens), @"( ( 3 ) * ( 3 ) )");
}

#[test]
fn test_recursive_expansion_limit() {
    let config = PreprocessorConfig {
        max_expansion_depth: 8,
        ..Default::default()
    };
    let src = "#define A0 x\n#define A1 A0 A0\n#define A2 A1\n#define A3 A2\n#define A4 A3\n#define A5 A4\n#define A6 A5\n#define A7 A6\n#define A8 A7\n#define A9 A8\nA9";
    let err = setup_preprocessor_tokens(src, &VirtualSourceLocator::new(), config).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfBounds);
}

#[test]
fn test_conditional_nesting_limit() {
    let src = format!("{}x\n{}", "#if 1\n".repeat(5000), "#endif\n".repeat(5000));
    let err = preprocess_error(&src);
    assert_eq!(err.kind, ErrorKind::OutOfBounds);
    insta::assert_snapshot!(err.message, @"conditional directives nested too deeply");
    assert_eq!(err.location.map(|l| l.line), Some(257));

    let src = format!("{}x\n{}", "#ifdef __STDC__\n".repeat(40), "#endif\n".repeat(40));
    assert_eq!(setup_preprocessor_test(&src), "x");
}

#[test]
fn test_nested_macro_arguments_are_bounded() {
    let config = PreprocessorConfig {
        max_expansion_depth: 64,
        ..Default::default()
    };
    let src = format!("#define f(x) x\n{}1{}", "f(".repeat(2000), ")".repeat(2000));
    let err = setup_preprocessor_tokens(&src, &VirtualSourceLocator::new(), config).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfBounds);

    let src = format!("#define f(x) x\n{}1{}", "f(".repeat(50), ")".repeat(50));
    assert_eq!(setup_preprocessor_test(&src), "1");
}
