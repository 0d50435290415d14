use pretty_assertions::assert_eq;

use super::generate;
use crate::frontend::FrontEnd;
use crate::middle::eval::{Evaluator, RtValue};
use crate::middle::ir::*;
use crate::middle::optimize::{OptLevel, Optimizer, SizeLevel};
use crate::middle::verify::verify_module;
use crate::utils::{Diagnostics, Error, FileCache};

fn lower_with(src: &str, diagnostics: &mut Diagnostics) -> Result<IRModule, Error> {
    let mut cache = FileCache::new();
    let file = cache.register_source("test.em", src);
    let ast = FrontEnd::run(&file)?;
    generate(&ast, false, diagnostics)
}

fn lower(src: &str) -> IRModule {
    let module = lower_with(src, &mut Diagnostics::new()).unwrap();
    verify_module(&module).unwrap();
    module
}

fn lower_err(src: &str) -> Error {
    lower_with(src, &mut Diagnostics::new()).unwrap_err()
}

fn run(module: &IRModule, name: &str, args: Vec<RtValue>) -> RtValue {
    Evaluator::new(module).call(name, args).unwrap()
}

fn labels(func: &IRFunction) -> Vec<&str> {
    func.blocks.iter().map(|b| b.label.as_str()).collect()
}

#[test]
fn test_integer_add_folds() {
    let mut module = lower("def f(): i32 { return 1 + 2; }");
    let f = module.function("f").unwrap();
    assert_eq!(f.ret_type, IRType::I32);
    assert!(matches!(f.blocks[0].instructions[0], Instruction::BinOp { op: BinOp::Add, .. }));

    Optimizer::new(OptLevel(2), SizeLevel(0)).optimize(&mut module).unwrap();
    let f = module.function("f").unwrap();
    assert!(f.blocks[0].instructions.is_empty());
    assert_eq!(f.blocks[0].terminator, Some(Terminator::Return { value: Some(Value::int(3)) }));
}

#[test]
fn test_while_loop() {
    let module = lower("def g(): i32 { var i: i32 = 0; while i < 10 { i = i + 1; } return i; }");
    let g = module.function("g").unwrap();
    assert_eq!(labels(g), vec!["entry", "loopcond", "loopbody", "loopend"]);
    assert_eq!(run(&module, "g", vec![]), RtValue::int(10));
}

#[test]
fn test_if_condition_compares_against_zero() {
    let module = lower("def h(x: i32): i32 { if x { return 1; } return 0; }");
    let h = module.function("h").unwrap();

    let cmp = h.blocks[0].instructions.iter().find_map(|i| match i {
        Instruction::Cmp { pred, ty, right, .. } => Some((*pred, ty.clone(), right.clone())),
        _ => None,
    });
    assert_eq!(cmp, Some((CmpPred::Ne, IRType::I32, Value::int(0))));

    let returning = h
        .blocks
        .iter()
        .filter(|b| matches!(b.terminator, Some(Terminator::Return { .. })))
        .count();
    assert_eq!(returning, 2);
    assert_eq!(run(&module, "h", vec![RtValue::int(7)]), RtValue::int(1));
    assert_eq!(run(&module, "h", vec![RtValue::int(0)]), RtValue::int(0));
}

#[test]
fn test_call_argument_mismatch() {
    let err = lower_err(
        "def add(a: i32, b: i32): i32 { return a + b; }\ndef main(): i32 { return add(1, true); }",
    );
    assert_eq!(err.tag(), "TypeMismatch");
    assert!(err.to_string().contains("argument 2"), "{}", err);
}

#[test]
fn test_call_arity_mismatch() {
    let err = lower_err("def one(a: i32): i32 { return a; }\ndef main(): i32 { return one(); }");
    assert_eq!(err.tag(), "TypeMismatch");
    assert!(err.to_string().contains("1 arguments to one"), "{}", err);
}

#[test]
fn test_void_function_gets_ret_void() {
    let module = lower("def v(): void { }");
    let v = module.function("v").unwrap();
    assert_eq!(v.blocks.len(), 1);
    assert_eq!(v.blocks[0].terminator, Some(Terminator::Return { value: None }));
}

#[test]
fn test_redefinition_in_block() {
    let err = lower_err("def f(): void { var x: i32; var x: i32; }");
    assert_eq!(err.tag(), "RedefinedSymbol");
}

#[test]
fn test_shadowing_in_nested_block_is_allowed() {
    let module = lower("def f(): i32 { var x: i32 = 1; if true { var x: i32 = 5; } return x; }");
    assert_eq!(run(&module, "f", vec![]), RtValue::int(1));
}

#[test]
fn test_missing_return() {
    let err = lower_err("def f(x: i32): i32 { if x { return 1; } }");
    assert_eq!(err.tag(), "MissingReturn");
}

#[test]
fn test_unreachable_final_block_is_not_missing_return() {
    let module = lower("def f(x: i32): i32 { if x { return 1; } else { return 2; } }");
    let f = module.function("f").unwrap();
    let last = f.blocks.last().unwrap();
    assert_eq!(last.label, "ifcont");
    assert_eq!(last.terminator, Some(Terminator::Unreachable));
}

#[test]
fn test_undefined_symbol() {
    let err = lower_err("def f(): i32 { return y; }");
    assert_eq!(err.tag(), "UndefinedSymbol");
}

#[test]
fn test_assignment_to_immutable_binding() {
    let err = lower_err("def f(): void { let x = 1; x = 2; }");
    assert_eq!(err.tag(), "TypeMismatch");
    assert!(err.to_string().contains("mut i32"), "{}", err);
}

#[test]
fn test_return_type_mismatch() {
    let err = lower_err("def f(): i32 { return true; }");
    assert_eq!(err.tag(), "TypeMismatch");
}

#[test]
fn test_ref_parameter_writes_through() {
    let module = lower(
        "def inc(ref x: i32): void { x = x + 1; }\n\
         def main(): i32 { var a: i32 = 41; inc(a); return a; }",
    );
    assert_eq!(module.function("inc").unwrap().params[0].1, IRType::Ptr);
    assert_eq!(run(&module, "main", vec![]), RtValue::int(42));
}

#[test]
fn test_ref_parameter_needs_mutable_argument() {
    let err = lower_err(
        "def inc(ref x: i32): void { x = x + 1; }\n\
         def main(): void { let a: i32 = 1; inc(a); }",
    );
    assert_eq!(err.tag(), "TypeMismatch");
}

#[test]
fn test_unreachable_code_warning() {
    let mut diagnostics = Diagnostics::new();
    let module = lower_with("def f(): i32 { return 1; return 2; }", &mut diagnostics).unwrap();
    let tags: Vec<&str> = diagnostics.warnings().map(|d| d.tag).collect();
    assert_eq!(tags, vec!["UnreachableCode"]);
    assert_eq!(module.function("f").unwrap().blocks.len(), 1);
}

#[test]
fn test_uninitialized_variable_warning() {
    let mut diagnostics = Diagnostics::new();
    lower_with("def f(): void { var x: i32; }", &mut diagnostics).unwrap();
    let tags: Vec<&str> = diagnostics.warnings().map(|d| d.tag).collect();
    assert_eq!(tags, vec!["UninitializedVariable"]);
}

#[test]
fn test_globals() {
    let module = lower(
        "module demo;\nimport \"lib/io.em\";\nlet limit: i32 = 10;\nvar counter = 0;\n\
         def f(): i32 { counter = counter + limit; return counter; }",
    );
    assert_eq!(module.name, "demo");
    assert_eq!(module.imports, vec!["lib/io.em".to_string()]);
    let limit = module.global("limit").unwrap();
    assert_eq!((limit.ty.clone(), limit.init.clone(), limit.mutable), (IRType::I32, Constant::Int(10), false));
    assert!(module.global("counter").unwrap().mutable);
    assert_eq!(run(&module, "f", vec![]), RtValue::int(10));
}

#[test]
fn test_non_constant_global_initializer() {
    let err = lower_err("def seven(): i32 { return 7; }\nlet x: i32 = seven();");
    assert_eq!(err.tag(), "UnsupportedOperation");
}

#[test]
fn test_call_before_definition() {
    let module = lower(
        "def f(): i32;\ndef main(): i32 { return f() + 1; }\ndef f(): i32 { return 7; }",
    );
    assert_eq!(module.functions.iter().filter(|f| f.name == "f").count(), 1);
    assert_eq!(run(&module, "main", vec![]), RtValue::int(8));
}

#[test]
fn test_conflicting_prototype() {
    let err = lower_err("def f(): i32;\ndef f(): i64 { return 1; }");
    assert_eq!(err.tag(), "TypeMismatch");
}

#[test]
fn test_second_body_is_redefinition() {
    let err = lower_err("def f(): i32 { return 1; }\ndef f(): i32 { return 2; }");
    assert_eq!(err.tag(), "RedefinedSymbol");
}

#[test]
fn test_primitive_name_cannot_be_rebound() {
    let err = lower_err("def f(): void { var i32: i32 = 1; }");
    assert_eq!(err.tag(), "RedefinedSymbol");
}

#[test]
fn test_member_access_is_unsupported() {
    let err = lower_err("def f(x: i32): void { x.y; }");
    assert_eq!(err.tag(), "UnsupportedOperation");
}

#[test]
fn test_foreach_is_unsupported() {
    let err = lower_err("def f(): void { for c in items { } }");
    assert_eq!(err.tag(), "UnsupportedOperation");
}

#[test]
fn test_literals_adapt_to_wider_types() {
    let module = lower(
        "def big(): i64 { return 5000000000; }\n\
         def g(): i64 { let x: i64 = 1; return x + 2; }\n\
         def h(): f32 { return 1.5; }",
    );
    assert_eq!(run(&module, "big", vec![]), RtValue::int(5_000_000_000));
    assert_eq!(run(&module, "g", vec![]), RtValue::int(3));
    assert_eq!(module.function("h").unwrap().ret_type, IRType::F32);
}

#[test]
fn test_out_of_range_literal_is_a_mismatch() {
    let err = lower_err("def f(): i8 { var x: i8 = 300; return x; }");
    assert_eq!(err.tag(), "TypeMismatch");
    assert_eq!(lower_err("def b(): byte { return 256; }").tag(), "TypeMismatch");
    assert_eq!(lower_err("def b(): byte { return -1; }").tag(), "TypeMismatch");

    let module = lower("def b(): byte { return 255; }\ndef n(): i8 { return -128; }");
    assert_eq!(run(&module, "n", vec![]), RtValue::int(-128));
    assert!(module.function("b").is_some());
}

#[test]
fn test_literal_operands_meet_at_the_wider_type() {
    let module = lower("def f(): i64 { return 5000000000 + 1; }\ndef g(): i64 { return 1 - 5000000000; }");
    assert_eq!(run(&module, "f", vec![]), RtValue::int(5_000_000_001));
    assert_eq!(run(&module, "g", vec![]), RtValue::int(-4_999_999_999));
}

#[test]
fn test_type_alias_is_basic_equal_to_its_target() {
    let module = lower("type score = i32;\ndef f(a: score): score { let b: i32 = a; return b + 1; }");
    assert_eq!(run(&module, "f", vec![RtValue::int(41)]), RtValue::int(42));
    assert_eq!(module.function("f").unwrap().mangled, "_E1fFI32I32E");

    assert_eq!(lower_err("type i32 = i64;").tag(), "RedefinedSymbol");
    assert_eq!(lower_err("type t = u7;").tag(), "TypeNotFound");
    assert_eq!(lower_err("def f(): void { type t = i32; }").tag(), "SyntaxError");
}

#[test]
fn test_debug_info_records_position_and_types() {
    let mut cache = FileCache::new();
    let file = cache.register_source("test.em", "\ndef f(b: byte): bool { return b == 0; }");
    let ast = FrontEnd::run(&file).unwrap();
    let module = generate(&ast, true, &mut Diagnostics::new()).unwrap();

    let debug = module.function("f").unwrap().debug.clone().unwrap();
    assert_eq!(debug.line, 2);
    assert_eq!(debug.types, vec!["bool:1:DW_ATE_boolean", "byte:8:DW_ATE_unsigned"]);
    let ir = crate::middle::ir_printer::print_ir(&module);
    assert!(ir.contains("; !dbg test.em:2 [bool:1:DW_ATE_boolean, byte:8:DW_ATE_unsigned]"), "{}", ir);
}

#[test]
fn test_explicit_casts() {
    let module = lower("def f(x: i32): i64 { return x as i64 * 3; }\ndef b(x: f64): bool { return x as bool; }");
    assert_eq!(run(&module, "f", vec![RtValue::int(-4)]), RtValue::int(-12));
    let err = lower_err("def f(x: string): i32 { return x as i32; }");
    assert_eq!(err.tag(), "TypeMismatch");
}

#[test]
fn test_mangled_names() {
    let module = lower("def add(a: i32, b: i32): i32 { return a + b; }\ndef inc(ref x: i32): void { x += 1; }");
    assert_eq!(module.function("add").unwrap().mangled, "_E3addFI32I32I32E");
    assert_eq!(module.function("inc").unwrap().mangled, "_E3incFVRI32E");
}

#[test]
fn test_for_loop() {
    let module = lower(
        "def s(): i32 { var t: i32 = 0; for var k: i32 = 0; k < 4; k = k + 1 { t += k; } return t; }",
    );
    let s = module.function("s").unwrap();
    assert_eq!(
        labels(s),
        vec!["entry", "forinit", "forcond", "forbody", "forstep", "forend"]
    );
    assert_eq!(run(&module, "s", vec![]), RtValue::int(6));
}

#[test]
fn test_inline_functions_fold_away_at_o1() {
    let mut module = lower("inline def sq(x: i32): i32 { return x * x; }\ndef main(): i32 { return sq(6); }");
    Optimizer::new(OptLevel(1), SizeLevel(0)).optimize(&mut module).unwrap();
    let main = module.function("main").unwrap();
    let calls = main
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| matches!(i, Instruction::Call { .. }))
        .count();
    assert_eq!(calls, 0);
    assert_eq!(run(&module, "main", vec![]), RtValue::int(36));
}
