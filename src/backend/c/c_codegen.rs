//! C Code Generator
//!
//! Translates Ember IR to C and compiles it with the system C compiler.
//! Registers become typed locals, stack slots become locals addressed
//! through `void*`, and phi nodes are resolved as copies on incoming edges.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::codegen::{host_triple, CodeGen};
use crate::middle::ir::*;
use crate::utils::{Error, Result};

/// Compilers tried in order
const COMPILERS: [&str; 3] = ["cc", "clang", "gcc"];

/// Distinguishes temp files of modules compiled concurrently
static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// C code generator
pub struct CCodeGen {
    target_triple: String,
    output: String,
    indent: usize,
    debug_info: bool,
    /// Block id to C label, per function
    block_labels: HashMap<BlockId, String>,
    /// Parameter types of every function in the module
    signatures: HashMap<String, Vec<IRType>>,
}

impl CCodeGen {
    pub fn new(target: &str) -> Self {
        Self {
            target_triple: target.to_string(),
            output: String::new(),
            indent: 0,
            debug_info: false,
            block_labels: HashMap::new(),
            signatures: HashMap::new(),
        }
    }

    /// Emit `#line` markers and compile with `-g`
    pub fn with_debug_info(mut self, debug_info: bool) -> Self {
        self.debug_info = debug_info;
        self
    }

    /// Write indented line
    fn writeln(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(line);
        self.output.push('\n');
    }

    // ==================== Types and values ====================

    fn c_type(ty: &IRType) -> &'static str {
        match ty {
            IRType::Void => "void",
            IRType::Bool => "bool",
            IRType::I8 => "int8_t",
            IRType::I16 => "int16_t",
            IRType::I32 => "int32_t",
            IRType::I64 => "int64_t",
            IRType::F32 => "float",
            IRType::F64 => "double",
            IRType::Ptr | IRType::Function { .. } => "void*",
        }
    }

    /// Unsigned counterpart used for wrapping arithmetic
    fn c_unsigned(ty: &IRType) -> &'static str {
        match ty {
            IRType::I8 => "uint8_t",
            IRType::I16 => "uint16_t",
            IRType::I32 => "uint32_t",
            IRType::I64 => "uint64_t",
            other => Self::c_type(other),
        }
    }

    fn c_constant(c: &Constant, ty: &IRType) -> String {
        match c {
            Constant::Int(n) if *n == i64::MIN => "INT64_MIN".to_string(),
            Constant::Int(n) if ty.is_float() => format!("{}.0", n),
            Constant::Int(n) => match ty {
                IRType::I64 | IRType::Ptr => format!("INT64_C({})", n),
                IRType::Bool => if *n & 1 == 1 { "true" } else { "false" }.to_string(),
                _ => n.to_string(),
            },
            Constant::Float(x) if x.is_nan() => "NAN".to_string(),
            Constant::Float(x) if x.is_infinite() => {
                if *x > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string()
            }
            Constant::Float(x) => match ty {
                IRType::F32 => format!("{:?}f", *x as f32),
                _ => format!("{:?}", x),
            },
            Constant::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Constant::String(s) => escape_c_string(s),
        }
    }

    /// C expression for `value`, typed as `ty` where that matters
    fn c_value(value: &Value, ty: &IRType) -> String {
        match value {
            Value::Register(r) => format!("_t{}", r.0),
            Value::Constant(c) => Self::c_constant(c, ty),
            Value::Parameter(i) => format!("_arg{}", i),
            Value::Global(name) | Value::Function(name) => format!("((void*)&{})", name),
            Value::Undef(_) | Value::Unit => match ty {
                IRType::Ptr | IRType::Function { .. } => "NULL".to_string(),
                other => format!("(({})0)", Self::c_type(other)),
            },
        }
    }

    fn label(&self, block: BlockId) -> String {
        self.block_labels
            .get(&block)
            .cloned()
            .unwrap_or_else(|| format!("bb{}", block.0))
    }

    fn prototype(func: &IRFunction, named: bool) -> String {
        let params: Vec<String> = func
            .params
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| {
                if named {
                    format!("{} _arg{}", Self::c_type(ty), i)
                } else {
                    Self::c_type(ty).to_string()
                }
            })
            .collect();
        let params = if params.is_empty() { "void".to_string() } else { params.join(", ") };
        format!("{} {}({})", Self::c_type(&func.ret_type), func.name, params)
    }

    // ==================== Functions ====================

    fn generate_function(&mut self, func: &IRFunction) -> Result<()> {
        self.block_labels = func
            .blocks
            .iter()
            .map(|b| (b.id, format!("bb{}_{}", b.id.0, sanitize(&b.label))))
            .collect();

        if !func.mangled.is_empty() {
            self.writeln(&format!("/* {} */", func.mangled));
        }
        if let (true, Some(debug)) = (self.debug_info, &func.debug) {
            self.writeln(&format!("#line {} {}", debug.line, escape_c_string(&debug.file)));
        }
        self.writeln(&format!("{} {{", Self::prototype(func, true)));
        self.indent += 1;

        // Every register and stack slot is declared up front
        for (i, ty) in func.registers.iter().enumerate() {
            if *ty != IRType::Void {
                self.writeln(&format!("{} _t{};", Self::c_type(ty), i));
            }
        }
        for inst in func.blocks.iter().flat_map(|b| &b.instructions) {
            if let Instruction::Alloca { dest, ty } = inst {
                self.writeln(&format!("{} _slot{};", Self::c_type(ty), dest.0));
            }
        }
        if func.entry_block != BlockId(0) {
            let entry = self.label(func.entry_block);
            self.writeln(&format!("goto {};", entry));
        }

        for block in &func.blocks {
            let label = self.label(block.id);
            self.indent -= 1;
            self.writeln(&format!("{}:;", label));
            self.indent += 1;

            for inst in &block.instructions {
                self.generate_instruction(func, inst)?;
            }
            match &block.terminator {
                Some(term) => self.generate_terminator(func, block.id, term)?,
                None => {
                    return Err(Error::Backend(format!(
                        "{}: block {} has no terminator",
                        func.name, block.label
                    )))
                }
            }
        }

        self.indent -= 1;
        self.writeln("}");
        self.writeln("");
        Ok(())
    }

    fn generate_instruction(&mut self, func: &IRFunction, inst: &Instruction) -> Result<()> {
        let line = match inst {
            Instruction::Assign { dest, value } => {
                let ty = func.register_type(*dest).cloned().unwrap_or(IRType::I64);
                format!("_t{} = {};", dest.0, Self::c_value(value, &ty))
            }
            Instruction::BinOp { dest, op, ty, left, right } => {
                let (l, r) = (Self::c_value(left, ty), Self::c_value(right, ty));
                let (t, u) = (Self::c_type(ty), Self::c_unsigned(ty));
                let expr = match op {
                    BinOp::Add => format!("({})(({}){} + ({}){})", t, u, l, u, r),
                    BinOp::Sub => format!("({})(({}){} - ({}){})", t, u, l, u, r),
                    BinOp::Mul => format!("({})(({}){} * ({}){})", t, u, l, u, r),
                    BinOp::Shl => format!("({})(({}){} << {})", t, u, l, r),
                    BinOp::SDiv => format!("{} / {}", l, r),
                    BinOp::SRem => format!("{} % {}", l, r),
                    BinOp::UDiv => format!("({})(({}){} / ({}){})", t, u, l, u, r),
                    BinOp::URem => format!("({})(({}){} % ({}){})", t, u, l, u, r),
                    BinOp::AShr => format!("{} >> {}", l, r),
                    BinOp::LShr => format!("({})(({}){} >> {})", t, u, l, r),
                    BinOp::And => format!("{} & {}", l, r),
                    BinOp::Or => format!("{} | {}", l, r),
                    BinOp::Xor => format!("{} ^ {}", l, r),
                    BinOp::FAdd => format!("{} + {}", l, r),
                    BinOp::FSub => format!("{} - {}", l, r),
                    BinOp::FMul => format!("{} * {}", l, r),
                    BinOp::FDiv => format!("{} / {}", l, r),
                    BinOp::FRem if *ty == IRType::F32 => format!("fmodf({}, {})", l, r),
                    BinOp::FRem => format!("fmod({}, {})", l, r),
                };
                format!("_t{} = {};", dest.0, expr)
            }
            Instruction::Cmp { dest, pred, ty, left, right } => {
                let (l, r) = (Self::c_value(left, ty), Self::c_value(right, ty));
                let u = Self::c_unsigned(ty);
                let expr = match pred {
                    CmpPred::Eq | CmpPred::Oeq => format!("{} == {}", l, r),
                    CmpPred::Ne | CmpPred::Une => format!("{} != {}", l, r),
                    CmpPred::Slt | CmpPred::Olt => format!("{} < {}", l, r),
                    CmpPred::Sle | CmpPred::Ole => format!("{} <= {}", l, r),
                    CmpPred::Sgt | CmpPred::Ogt => format!("{} > {}", l, r),
                    CmpPred::Sge | CmpPred::Oge => format!("{} >= {}", l, r),
                    CmpPred::Ult => format!("({}){} < ({}){}", u, l, u, r),
                    CmpPred::Ule => format!("({}){} <= ({}){}", u, l, u, r),
                    CmpPred::Ugt => format!("({}){} > ({}){}", u, l, u, r),
                    CmpPred::Uge => format!("({}){} >= ({}){}", u, l, u, r),
                    CmpPred::One => format!("({} < {} || {} > {})", l, r, l, r),
                };
                format!("_t{} = {};", dest.0, expr)
            }
            Instruction::UnaryOp { dest, op, ty, value } => {
                let v = Self::c_value(value, ty);
                let expr = match op {
                    UnaryOp::Neg => format!("({})(0 - ({}){})", Self::c_type(ty), Self::c_unsigned(ty), v),
                    UnaryOp::FNeg => format!("-{}", v),
                    UnaryOp::Not if *ty == IRType::Bool => format!("!{}", v),
                    UnaryOp::Not => format!("~{}", v),
                };
                format!("_t{} = {};", dest.0, expr)
            }
            Instruction::Cast { dest, op, value, from, to } => {
                let v = Self::c_value(value, from);
                let to_c = Self::c_type(to);
                let expr = match op {
                    CastOp::ZExt | CastOp::UIToFP => format!("({})({}){}", to_c, Self::c_unsigned(from), v),
                    CastOp::FPToUI => format!("({})({}){}", to_c, Self::c_unsigned(to), v),
                    CastOp::Bitcast if from == to => v,
                    CastOp::Bitcast if *to == IRType::Ptr => format!("(void*)(intptr_t){}", v),
                    CastOp::Bitcast if *from == IRType::Ptr => format!("({})(intptr_t){}", to_c, v),
                    _ => format!("({}){}", to_c, v),
                };
                format!("_t{} = {};", dest.0, expr)
            }
            Instruction::Call { dest, func: callee, args, ret } => {
                let params = match self.signatures.get(callee) {
                    Some(params) => params.clone(),
                    None => args.iter().map(|a| func.value_type(a).unwrap_or(IRType::I64)).collect(),
                };
                let args: Vec<String> = args
                    .iter()
                    .zip(&params)
                    .map(|(arg, ty)| Self::c_value(arg, ty))
                    .collect();
                let call = format!("{}({})", callee, args.join(", "));
                match dest {
                    Some(d) if *ret != IRType::Void => format!("_t{} = {};", d.0, call),
                    _ => format!("{};", call),
                }
            }
            Instruction::Alloca { dest, .. } => format!("_t{} = &_slot{};", dest.0, dest.0),
            Instruction::Load { dest, ptr, ty } => {
                format!("_t{} = *({}*){};", dest.0, Self::c_type(ty), Self::c_value(ptr, &IRType::Ptr))
            }
            Instruction::Store { ptr, value, ty } => format!(
                "*({}*){} = {};",
                Self::c_type(ty),
                Self::c_value(ptr, &IRType::Ptr),
                Self::c_value(value, ty)
            ),
            // Assigned on the incoming edges
            Instruction::Phi { .. } => return Ok(()),
        };
        self.writeln(&line);
        Ok(())
    }

    /// Copies feeding the phis of `target` along the edge from `from`
    fn edge_copies(func: &IRFunction, from: BlockId, target: BlockId) -> Vec<String> {
        let phis: Vec<(Register, &IRType, &Value)> = func
            .get_block(target)
            .into_iter()
            .flat_map(|b| &b.instructions)
            .filter_map(|inst| match inst {
                Instruction::Phi { dest, ty, incoming } => incoming
                    .iter()
                    .find(|(_, b)| *b == from)
                    .map(|(v, _)| (*dest, ty, v)),
                _ => None,
            })
            .collect();

        match phis.as_slice() {
            [] => Vec::new(),
            [(dest, ty, value)] => vec![format!("_t{} = {};", dest.0, Self::c_value(value, ty))],
            // Parallel copy through temporaries
            _ => {
                let mut lines: Vec<String> = phis
                    .iter()
                    .enumerate()
                    .map(|(i, (_, ty, value))| {
                        format!("{} _phi{} = {};", Self::c_type(ty), i, Self::c_value(value, ty))
                    })
                    .collect();
                lines.extend(phis.iter().enumerate().map(|(i, (dest, _, _))| format!("_t{} = _phi{};", dest.0, i)));
                vec![format!("{{ {} }}", lines.join(" "))]
            }
        }
    }

    fn generate_terminator(&mut self, func: &IRFunction, from: BlockId, term: &Terminator) -> Result<()> {
        match term {
            Terminator::Return { value: Some(v) } => {
                let line = format!("return {};", Self::c_value(v, &func.ret_type));
                self.writeln(&line);
            }
            Terminator::Return { value: None } => self.writeln("return;"),
            Terminator::Jump { target } => {
                for line in Self::edge_copies(func, from, *target) {
                    self.writeln(&line);
                }
                let line = format!("goto {};", self.label(*target));
                self.writeln(&line);
            }
            Terminator::Branch { cond, then_target, else_target } => {
                let cond = Self::c_value(cond, &IRType::Bool);
                let arm = |this: &Self, target: BlockId| {
                    let mut parts = Self::edge_copies(func, from, target);
                    parts.push(format!("goto {};", this.label(target)));
                    parts.join(" ")
                };
                let line = format!(
                    "if ({}) {{ {} }} else {{ {} }}",
                    cond,
                    arm(self, *then_target),
                    arm(self, *else_target)
                );
                self.writeln(&line);
            }
            Terminator::Unreachable => self.writeln("__builtin_unreachable();"),
        }
        Ok(())
    }

    /// Generate the complete C source file
    pub fn generate_source(&mut self, module: &IRModule) -> Result<String> {
        self.output.clear();
        self.indent = 0;
        self.signatures = module
            .functions
            .iter()
            .map(|f| (f.name.clone(), f.params.iter().map(|(_, ty)| ty.clone()).collect()))
            .collect();

        self.writeln(&format!("/* {} - generated by emberc */", module.name));
        for header in ["stdbool.h", "stddef.h", "stdint.h", "math.h"] {
            self.writeln(&format!("#include <{}>", header));
        }
        for import in &module.imports {
            self.writeln(&format!("/* import {} */", import));
        }
        self.writeln("");

        for global in &module.globals {
            let qualifier = if global.mutable { "" } else { "const " };
            let line = format!(
                "static {}{} {} = {};",
                qualifier,
                Self::c_type(&global.ty),
                global.name,
                Self::c_constant(&global.init, &global.ty)
            );
            self.writeln(&line);
        }
        if !module.globals.is_empty() {
            self.writeln("");
        }

        for func in &module.functions {
            let line = format!("{};", Self::prototype(func, false));
            self.writeln(&line);
        }
        self.writeln("");

        for func in module.functions.iter().filter(|f| !f.is_declaration()) {
            self.generate_function(func)?;
        }
        Ok(std::mem::take(&mut self.output))
    }

    /// Compile C source to an object file with the first compiler that works
    fn compile_c_to_object(&self, module: &IRModule, c_source: &str) -> Result<Vec<u8>> {
        let (c_file, obj_file) = temp_paths(&module.name);
        fs::write(&c_file, c_source).map_err(|e| Error::Io {
            path: c_file.display().to_string(),
            message: e.to_string(),
        })?;

        let mut last_error = String::from("no C compiler found");
        for compiler in COMPILERS {
            let mut command = Command::new(compiler);
            command.args(["-c", "-w", "-o"]).arg(&obj_file).arg(&c_file);
            if self.debug_info {
                command.arg("-g");
            }
            log::debug!("{}: running {:?}", module.name, command);

            match command.output() {
                Ok(output) if output.status.success() => {
                    let bytes = fs::read(&obj_file).map_err(|e| Error::Io {
                        path: obj_file.display().to_string(),
                        message: e.to_string(),
                    });
                    let _ = fs::remove_file(&c_file);
                    let _ = fs::remove_file(&obj_file);
                    return bytes;
                }
                Ok(output) => last_error = String::from_utf8_lossy(&output.stderr).trim().to_string(),
                Err(e) => last_error = format!("{}: {}", compiler, e),
            }
        }

        let _ = fs::remove_file(&c_file);
        Err(Error::Backend(format!("failed to compile C code: {}", last_error)))
    }
}

impl Default for CCodeGen {
    fn default() -> Self {
        Self::new(&host_triple())
    }
}

impl CodeGen for CCodeGen {
    fn generate(&mut self, module: &IRModule) -> Result<Vec<u8>> {
        let c_source = self.generate_source(module)?;
        self.compile_c_to_object(module, &c_source)
    }

    fn target_triple(&self) -> &str {
        &self.target_triple
    }

    fn name(&self) -> &str {
        "C"
    }
}

fn temp_paths(module: &str) -> (PathBuf, PathBuf) {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let stem = format!("ember-{}-{}-{}", std::process::id(), n, sanitize(module));
    let dir = std::env::temp_dir();
    (dir.join(format!("{}.c", stem)), dir.join(format!("{}.o", stem)))
}

/// Identifier-safe form of a label or module name
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for byte in s.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{:03o}", byte)),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::FrontEnd;
    use crate::middle::codegen::generate;
    use crate::middle::optimize::{OptLevel, Optimizer, SizeLevel};
    use crate::utils::{Diagnostics, FileCache};

    fn compile_to_ir(source: &str, opt: u8) -> IRModule {
        let mut cache = FileCache::new();
        let file = cache.register_source("test.em", source);
        let ast = FrontEnd::run(&file).unwrap();
        let mut module = generate(&ast, false, &mut Diagnostics::new()).unwrap();
        Optimizer::new(OptLevel(opt), SizeLevel(0)).optimize(&mut module).unwrap();
        module
    }

    fn generate_c(source: &str, opt: u8) -> String {
        let module = compile_to_ir(source, opt);
        CCodeGen::default().generate_source(&module).unwrap()
    }

    #[test]
    fn test_empty_function() {
        let c = generate_c("def main(): void {}", 0);
        assert!(c.contains("void main(void) {"));
        assert!(c.contains("return;"));
    }

    #[test]
    fn test_folded_return() {
        let c = generate_c("def answer(): i64 { let x: i64 = 40; return x + 2; }", 2);
        assert!(c.contains("return INT64_C(42);"), "{}", c);
    }

    #[test]
    fn test_wrapping_arithmetic_and_slots() {
        let c = generate_c("def add(a: i32, b: i32): i32 { return a + b; }", 0);
        assert!(c.contains("int32_t add(int32_t _arg0, int32_t _arg1) {"));
        assert!(c.contains("(int32_t)((uint32_t)"), "{}", c);
        assert!(c.contains("int32_t _slot"), "{}", c);
        assert!(c.contains("/* _E3addFI32I32I32E */"));
    }

    #[test]
    fn test_branches_and_globals() {
        let c = generate_c("var hits = 0;\ndef test(x: i32): i32 { if x { hits += 1; return 1; } return 0; }", 0);
        assert!(c.contains("static int32_t hits = 0;"));
        assert!(c.contains("((void*)&hits)"));
        assert!(c.contains("if (_t"));
        assert!(c.contains("goto bb"));
    }

    #[test]
    fn test_phi_copies_on_edges() {
        let c = generate_c(
            "inline def pick(x: i32): i32 { if x { return 1; } return 2; }\ndef main(x: i32): i32 { return pick(x); }",
            1,
        );
        assert!(!c.contains("phi"));
        assert!(c.contains("int32_t main(int32_t _arg0)"));
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(escape_c_string("a\"b\n\u{e9}"), "\"a\\\"b\\n\\303\\251\"");
        assert_eq!(sanitize("then.1"), "then_1");
    }

    #[test]
    fn test_object_generation_when_compiler_present() {
        let available = COMPILERS
            .iter()
            .any(|c| Command::new(c).arg("--version").output().is_ok_and(|o| o.status.success()));
        if !available {
            return;
        }
        let module = compile_to_ir("def sq(x: i64): i64 { return x * x; }", 2);
        let bytes = CCodeGen::default().generate(&module).unwrap();
        assert!(!bytes.is_empty());
    }
}
