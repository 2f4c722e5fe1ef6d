use symbol_table::GlobalSymbol as Symbol;

use crate::compiler::CompilePhase;
use crate::error::ErrorKind;
use crate::ir::{IrFieldEntry, IrSlot, IrTypeTranslator, TranslatedUnit};
use crate::semantic::types::BitFieldLayout;
use crate::tests::test_utils::{run_pipeline_error, run_pipeline_success, setup_translation};

fn local_slots(unit: &TranslatedUnit, function: usize) -> Vec<(String, usize)> {
    unit.functions[function]
        .objects
        .iter()
        .map(|((_, name), slot)| (name.to_string(), slot.index))
        .collect()
}

#[test]
fn test_module_layout() {
    let unit = setup_translation(
        r#"
static int a;
static char b[4];
_Thread_local long t;
int e;
extern struct Incomplete inc;
void f(int p) { int x; { char y; } { short z; static int s; } }
"#,
    );
    insta::assert_snapshot!(unit.module.to_string(), @r"
    type1:
      int
      array(4)
        char
      int
    type2:
      long
    type3:
      int
    type4:
      struct(3)
        int
        int
        union(2)
          struct(1)
            char
          struct(1)
            short
    function f: locals type4
    ");
    assert!(unit.module.validate().is_ok());
}

#[test]
fn test_statics_share_one_descriptor() {
    let unit = setup_translation("static int a; static char b[4]; _Thread_local long t; static _Thread_local int u;");
    let globals = &unit.globals;
    assert_ne!(globals.static_layout, globals.static_thread_local_layout);

    let a = globals.static_objects[&Symbol::new("a")];
    let b = globals.static_objects[&Symbol::new("b")];
    assert_eq!(a.descriptor, b.descriptor);
    assert_eq!((a.index, b.index), (0, 1));

    let t = globals.static_thread_local_objects[&Symbol::new("t")];
    let u = globals.static_thread_local_objects[&Symbol::new("u")];
    assert_eq!(t.descriptor, globals.static_thread_local_layout);
    assert_eq!((t.index, u.index), (0, 1));
    assert_eq!(unit.module.get_type(globals.static_layout).top_level().unwrap(), vec![0, 1]);
}

#[test]
fn test_external_objects_get_their_own_descriptor() {
    let unit = setup_translation(
        r#"
int e;
extern int arr[];
extern _Thread_local int et;
extern struct Incomplete inc;
void f(void) { extern int g; }
"#,
    );
    let globals = &unit.globals;
    let e = globals.external_objects[&Symbol::new("e")].expect("e is complete");
    insta::assert_snapshot!(unit.module.get_type(e).to_string(), @"int");
    let arr = globals.external_objects[&Symbol::new("arr")].expect("arr has a complete element type");
    insta::assert_snapshot!(unit.module.get_type(arr).to_string(), @r"
    array(0)
      int
    ");
    assert!(globals.external_thread_local_objects[&Symbol::new("et")].is_some());
    assert_eq!(globals.external_objects[&Symbol::new("inc")], None);
    assert!(globals.external_objects[&Symbol::new("g")].is_some());
    assert!(unit.functions[0].objects.is_empty());
}

#[test]
fn test_local_blocks_overlap_in_a_union() {
    let unit = setup_translation("void f(int p) { int x; { char y; } { short z; static int s; } }");
    assert_eq!(
        local_slots(&unit, 0),
        vec![
            ("p".to_string(), 1),
            ("x".to_string(), 2),
            ("y".to_string(), 5),
            ("z".to_string(), 7),
            ("s".to_string(), 0),
        ]
    );
    let function = &unit.functions[0];
    let s = function
        .objects
        .iter()
        .find(|((_, name), _)| *name == Symbol::new("s"))
        .map(|(_, slot)| *slot);
    assert_eq!(
        s,
        Some(IrSlot {
            descriptor: unit.globals.static_layout,
            index: 0
        })
    );
    assert_eq!(unit.module.functions[&Symbol::new("f")].locals, function.locals);
}

#[test]
fn test_function_without_blocks_is_a_flat_struct() {
    let unit = setup_translation("int g(int a, long b) { double d; return a; }");
    insta::assert_snapshot!(unit.module.get_type(unit.functions[0].locals).to_string(), @r"
    struct(3)
      int
      long
      float64
    ");
}

#[test]
fn test_bit_fields_become_shared_units_and_padding() {
    let source = "struct B { int a : 3; int b : 5; int : 0; int : 7; char c; }; static struct B g;";
    let unit = setup_translation(source);
    insta::assert_snapshot!(unit.module.get_type(unit.globals.static_layout).to_string(), @r"
    struct(3)
      int
      pad(4) align 4
      char
    ");
}

#[test]
fn test_field_entries_locate_bit_fields() {
    let source = "struct B { int a : 3; int b : 5; int : 0; int : 7; char c; }; static struct B g;";
    let mut artifact = run_pipeline_success(source, CompilePhase::Translate);
    let translated = artifact.translated.take().expect("No IR available");
    let mut analyzed = artifact.analyzed.take().expect("No analysis available");

    let record = analyzed
        .symbols
        .lookup_global(Symbol::new("g"))
        .expect("g is declared")
        .ty();
    let slot = translated.globals.static_objects[&Symbol::new("g")];
    let ir = translated.module.get_type(slot.descriptor);
    let mut translator = IrTypeTranslator::new(&mut analyzed.registry);
    let entries = translator.field_entries(record, slot.index, ir).unwrap();

    let bits = |bit_offset, width| Some(BitFieldLayout { bit_offset, width });
    assert_eq!(
        entries,
        vec![
            Some(IrFieldEntry { entry: 1, bit_field: bits(0, 3) }),
            Some(IrFieldEntry { entry: 1, bit_field: bits(3, 5) }),
            None,
            Some(IrFieldEntry { entry: 2, bit_field: bits(0, 7) }),
            Some(IrFieldEntry { entry: 3, bit_field: None }),
        ]
    );
}

#[test]
fn test_nested_records_and_qualifiers() {
    let unit = setup_translation(
        r#"
enum Color { RED, GREEN };
struct Inner { char c; const double d; };
static struct Outer { struct Inner in[2]; enum Color color; int *p; } o;
"#,
    );
    insta::assert_snapshot!(unit.module.get_type(unit.globals.static_layout).to_string(), @r"
    struct(3)
      array(2)
        struct(2)
          char
          float64
      int
      word
    ");
}

#[test]
fn test_explicit_alignment_is_recorded() {
    let unit = setup_translation("static _Alignas(16) int w; struct P { char c; _Alignas(8) int i; }; static struct P q;");
    insta::assert_snapshot!(unit.module.get_type(unit.globals.static_layout).to_string(), @r"
    int align 16
    struct(2)
      char
      int align 8
    ");
}

#[test]
fn test_variable_length_arrays_are_not_implemented() {
    let err = run_pipeline_error("void f(int n) { int a[n]; }", CompilePhase::Translate);
    assert_eq!(err.kind, ErrorKind::NotImplemented);
    assert_eq!(err.message, "variable length arrays are not implemented");
}

#[test]
fn test_file_scope_automatic_object_is_rejected() {
    let err = run_pipeline_error("auto int x;", CompilePhase::Translate);
    assert_eq!(err.kind, ErrorKind::MalformedInput);
    assert_eq!(err.message, "file-scope object 'x' cannot have automatic storage");
}

#[test]
fn test_block_extern_reuses_internal_object() {
    let unit = setup_translation(
        r#"
static int x;
_Thread_local int t;
void f(void) { extern int x; extern _Thread_local int t; x = t; }
"#,
    );
    let globals = &unit.globals;
    assert!(!globals.external_objects.contains_key(&Symbol::new("x")));
    assert!(!globals.external_thread_local_objects.contains_key(&Symbol::new("t")));
    assert_eq!(unit.module.get_type(globals.static_layout).top_level().unwrap(), vec![0]);

    let x = globals.static_objects[&Symbol::new("x")];
    let t = globals.static_thread_local_objects[&Symbol::new("t")];
    let slots: Vec<IrSlot> = unit.functions[0].objects.values().copied().collect();
    assert_eq!(slots, vec![x, t]);
}

#[test]
fn test_descriptor_serializes_its_entries() {
    let unit = setup_translation("struct S { char c; short s[2]; }; static struct S v;");
    insta::assert_yaml_snapshot!(unit.module.get_type(unit.globals.static_layout), @r"
    entries:
      - code: Struct
        alignment: 0
        param: 2
      - code: Char
        alignment: 0
        param: 0
      - code: Array
        alignment: 0
        param: 2
      - code: Short
        alignment: 0
        param: 0
    ");
}
