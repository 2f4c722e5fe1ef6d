//! End-to-end tests of the public compilation pipeline.

use cfront::pp::{render, VirtualSourceLocator};
use cfront::{CompilationUnit, CompileOptions, CompilePhase, ErrorKind};
use symbol_table::GlobalSymbol as Symbol;

fn preprocess(locator: &VirtualSourceLocator, source: &str) -> String {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut unit = CompilationUnit::new(locator, CompileOptions::default());
    let tokens = unit.preprocess(source, Symbol::new("main.c")).unwrap();
    render(&tokens)
}

#[test]
fn test_punctuators_survive_preprocessing() {
    let locator = VirtualSourceLocator::new();
    insta::assert_snapshot!(preprocess(&locator, "a <<= 1; b >>= c ... d"), @"a <<= 1 ; b >>= c ... d");
    insta::assert_snapshot!(preprocess(&locator, "#define CAT(a, b) a ## b\nx CAT(<<, =) y"), @"x <<= y");
}

#[test]
fn test_function_like_macro() {
    let locator = VirtualSourceLocator::new();
    insta::assert_snapshot!(preprocess(&locator, "#define SUM(x,y) (x)+(y)\nSUM(1,2)"), @"( 1 ) + ( 2 )");
}

#[test]
fn test_self_referential_macro_stops() {
    let locator = VirtualSourceLocator::new();
    insta::assert_snapshot!(preprocess(&locator, "#define A A\nA"), @"A");
    insta::assert_snapshot!(preprocess(&locator, "#define f(x) g(x)\n#define g(x) f(x)\nf(1)"), @"f ( 1 )");
}

#[test]
fn test_included_definitions_reach_the_analyzer() {
    let _ = env_logger::builder().is_test(true).try_init();
    let locator = VirtualSourceLocator::new().with_file("defs.h", "#define N 4\ntypedef long word_t;\n");
    let mut unit = CompilationUnit::new(&locator, CompileOptions::default());
    let artifact = unit
        .run("#include \"defs.h\"\nint a[N];\nword_t w;\n", Symbol::new("main.c"), CompilePhase::Analyze)
        .unwrap();
    let analyzed = artifact.analyzed.unwrap();
    let type_of = |name: &str| {
        let identifier = analyzed.symbols.lookup_global(Symbol::new(name)).unwrap();
        analyzed.registry.display(identifier.ty())
    };
    assert_eq!(type_of("a"), "int [4]");
    assert_eq!(type_of("w"), "long");
}

#[test]
fn test_command_line_definitions() {
    let _ = env_logger::builder().is_test(true).try_init();
    let locator = VirtualSourceLocator::new();
    let mut options = CompileOptions::default();
    options.preprocessor.defines.push(("WIDTH".to_string(), "8".to_string()));
    let mut unit = CompilationUnit::new(&locator, options);
    let tokens = unit.preprocess("char buf[WIDTH];", Symbol::new("main.c")).unwrap();
    assert_eq!(render(&tokens), "char buf [ 8 ] ;");
}

#[test]
fn test_missing_include_is_reported() {
    let _ = env_logger::builder().is_test(true).try_init();
    let locator = VirtualSourceLocator::new();
    let mut unit = CompilationUnit::new(&locator, CompileOptions::default());
    let err = unit
        .run("#include \"missing.h\"\n", Symbol::new("main.c"), CompilePhase::Translate)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(unit.diagnostics().has_errors());
}

#[test]
fn test_statics_share_one_descriptor() {
    let _ = env_logger::builder().is_test(true).try_init();
    let locator = VirtualSourceLocator::new();
    let mut unit = CompilationUnit::new(&locator, CompileOptions::default());
    let translated = unit
        .translate(
            "static int counter;\nstatic double ratio;\nint bump(void) { static int calls; return ++calls; }\n",
            Symbol::new("main.c"),
        )
        .unwrap();

    let globals = &translated.globals;
    let counter = globals.static_objects[&Symbol::new("counter")];
    let ratio = globals.static_objects[&Symbol::new("ratio")];
    assert_eq!(counter.descriptor, ratio.descriptor);
    assert_eq!(counter.descriptor, globals.static_layout);
    assert_eq!((counter.index, ratio.index), (0, 1));

    let calls = translated.functions[0]
        .objects
        .values()
        .next()
        .copied()
        .unwrap();
    assert_eq!(calls.descriptor, globals.static_layout);
    assert_eq!(calls.index, 2);
}

#[test]
fn test_every_descriptor_satisfies_the_entry_count_invariant() {
    let _ = env_logger::builder().is_test(true).try_init();
    let source = r#"
struct Node { int value; struct Node *next; unsigned flags : 3; unsigned : 5; char tag[4]; };
union Cell { struct Node node; long raw[3]; };
static union Cell pool[8];
_Thread_local struct Node current;
int walk(struct Node *n) {
    int total = 0;
    for (struct Node *p = n; p; p = p->next) { int v = p->value; total += v; }
    while (total > 100) { long shrink = total / 2; total = (int)shrink; }
    return total;
}
"#;
    let locator = VirtualSourceLocator::new();
    let mut unit = CompilationUnit::new(&locator, CompileOptions::default());
    let translated = unit.translate(source, Symbol::new("main.c")).unwrap();
    for (id, ty) in translated.module.types() {
        assert!(ty.validate().is_ok(), "{} breaks the entry-count invariant:\n{}", id, ty);
        if let Ok(roots) = ty.top_level() {
            let covered: usize = roots.iter().map(|&root| ty.subtree_len(root).unwrap()).sum();
            assert_eq!(covered, ty.len());
        }
    }
    assert!(translated.module.functions.contains_key(&Symbol::new("walk")));
}
