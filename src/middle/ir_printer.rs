//! IR Printer - textual form of Ember IR
//!
//! The output reads like LLVM assembly (`%3 = add i32 %1, %2`) and is what
//! `--emit ir` writes to `.eir` files.

use std::fmt::{self, Write};
use std::fs;
use std::path::Path;

use crate::middle::ir::*;
use crate::utils::{Error, Result};

/// Pretty printer for Ember IR
pub struct IRPrinter {
    output: String,
}

impl IRPrinter {
    pub fn new() -> Self {
        Self { output: String::new() }
    }

    /// Print an IR module to string
    pub fn print_module(&mut self, module: &IRModule) -> String {
        self.output.clear();
        // Writing into a String cannot fail
        let _ = self.write_module(module);
        std::mem::take(&mut self.output)
    }

    fn write_module(&mut self, module: &IRModule) -> fmt::Result {
        writeln!(self.output, "; ModuleID = '{}'", module.name)?;
        if !module.source.is_empty() {
            writeln!(self.output, "source_filename = \"{}\"", module.source)?;
        }
        for import in &module.imports {
            writeln!(self.output, "; import {}", import)?;
        }

        if !module.globals.is_empty() {
            writeln!(self.output)?;
        }
        for global in &module.globals {
            let kind = if global.mutable { "global" } else { "constant" };
            writeln!(self.output, "@{} = {} {} {}", global.name, kind, global.ty, global.init)?;
        }

        for func in &module.functions {
            writeln!(self.output)?;
            self.write_function(func)?;
        }
        Ok(())
    }

    fn write_function(&mut self, func: &IRFunction) -> fmt::Result {
        if func.is_declaration() {
            let params: Vec<String> = func.params.iter().map(|(_, ty)| ty.to_string()).collect();
            return writeln!(self.output, "declare {} @{}({})", func.ret_type, func.name, params.join(", "));
        }

        if !func.mangled.is_empty() {
            writeln!(self.output, "; mangled: {}", func.mangled)?;
        }
        if let Some(debug) = &func.debug {
            write!(self.output, "; !dbg {}:{}", debug.file, debug.line)?;
            if !debug.types.is_empty() {
                write!(self.output, " [{}]", debug.types.join(", "))?;
            }
            writeln!(self.output)?;
        }
        let params: Vec<String> = func
            .params
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| format!("{} %arg{}", ty, i))
            .collect();
        let attrs = if func.always_inline { " alwaysinline" } else { "" };
        writeln!(self.output, "define {} @{}({}){} {{", func.ret_type, func.name, params.join(", "), attrs)?;

        for (i, block) in func.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(self.output)?;
            }
            self.write_block(func, block)?;
        }
        writeln!(self.output, "}}")
    }

    fn write_block(&mut self, func: &IRFunction, block: &BasicBlock) -> fmt::Result {
        writeln!(self.output, "{}:", block.label)?;
        for inst in &block.instructions {
            write!(self.output, "  ")?;
            self.write_instruction(func, inst)?;
            writeln!(self.output)?;
        }
        if let Some(term) = &block.terminator {
            write!(self.output, "  ")?;
            self.write_terminator(func, term)?;
            writeln!(self.output)?;
        }
        Ok(())
    }

    fn write_instruction(&mut self, func: &IRFunction, inst: &Instruction) -> fmt::Result {
        let out = &mut self.output;
        match inst {
            Instruction::Assign { dest, value } => {
                let ty = func.register_type(*dest).cloned().unwrap_or(IRType::Void);
                write!(out, "{} = copy {} {}", dest, ty, value)
            }
            Instruction::BinOp { dest, op, ty, left, right } => {
                write!(out, "{} = {} {} {}, {}", dest, op, ty, left, right)
            }
            Instruction::Cmp { dest, pred, ty, left, right } => {
                let kind = if pred.is_float() { "fcmp" } else { "icmp" };
                write!(out, "{} = {} {} {} {}, {}", dest, kind, pred.name(), ty, left, right)
            }
            Instruction::UnaryOp { dest, op, ty, value } => write!(out, "{} = {} {} {}", dest, op, ty, value),
            Instruction::Cast { dest, op, value, from, to } => {
                write!(out, "{} = {} {} {} to {}", dest, op, from, value, to)
            }
            Instruction::Call { dest, func: callee, args, ret } => {
                if let Some(d) = dest {
                    write!(out, "{} = ", d)?;
                }
                write!(out, "call {} @{}(", ret, callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    let ty = func.value_type(arg).unwrap_or(IRType::Ptr);
                    write!(out, "{} {}", ty, arg)?;
                }
                write!(out, ")")
            }
            Instruction::Alloca { dest, ty } => write!(out, "{} = alloca {}", dest, ty),
            Instruction::Load { dest, ptr, ty } => write!(out, "{} = load {}, ptr {}", dest, ty, ptr),
            Instruction::Store { ptr, value, ty } => write!(out, "store {} {}, ptr {}", ty, value, ptr),
            Instruction::Phi { dest, ty, incoming } => {
                write!(out, "{} = phi {} ", dest, ty)?;
                for (i, (value, block)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write!(out, "[ {}, %{} ]", value, label(func, *block))?;
                }
                Ok(())
            }
        }
    }

    fn write_terminator(&mut self, func: &IRFunction, term: &Terminator) -> fmt::Result {
        let out = &mut self.output;
        match term {
            Terminator::Return { value: Some(v) } => write!(out, "ret {} {}", func.ret_type, v),
            Terminator::Return { value: None } => write!(out, "ret void"),
            Terminator::Jump { target } => write!(out, "br label %{}", label(func, *target)),
            Terminator::Branch { cond, then_target, else_target } => write!(
                out,
                "br i1 {}, label %{}, label %{}",
                cond,
                label(func, *then_target),
                label(func, *else_target)
            ),
            Terminator::Unreachable => write!(out, "unreachable"),
        }
    }
}

fn label(func: &IRFunction, block: BlockId) -> String {
    func.get_block(block)
        .map(|b| b.label.clone())
        .unwrap_or_else(|| format!("bb{}", block.0))
}

impl Default for IRPrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to print a module
pub fn print_ir(module: &IRModule) -> String {
    let mut printer = IRPrinter::new();
    printer.print_module(module)
}

impl IRModule {
    /// Write the textual IR to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, print_ir(self)).map_err(|e| Error::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::builder::{IrBuilder, ModuleBuilder};

    fn sample() -> IRModule {
        let mut b = ModuleBuilder::new("sample");
        b.add_global(IRGlobal { name: "limit".into(), ty: IRType::I64, init: Constant::Int(10), mutable: false });
        let f = b.declare_function("add", vec![("a".into(), IRType::I32), ("b".into(), IRType::I32)], IRType::I32);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        b.set_insert_point(entry);
        let sum = b.create_binop(BinOp::Add, IRType::I32, Value::Parameter(0), Value::Parameter(1)).unwrap();
        b.create_ret(sum).unwrap();
        b.declare_function("puts", vec![("s".into(), IRType::Ptr)], IRType::I32);
        b.finish()
    }

    #[test]
    fn test_print_function() {
        let ir = print_ir(&sample());
        assert!(ir.contains("; ModuleID = 'sample'"));
        assert!(ir.contains("@limit = constant i64 10"));
        assert!(ir.contains("define i32 @add(i32 %arg0, i32 %arg1) {"));
        assert!(ir.contains("%0 = add i32 %arg0, %arg1"));
        assert!(ir.contains("ret i32 %0"));
        assert!(ir.contains("declare i32 @puts(ptr)"));
    }

    #[test]
    fn test_print_branches_use_labels() {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("f", vec![("c".into(), IRType::Bool)], IRType::Void);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        let then = b.append_block("then").unwrap();
        b.set_insert_point(entry);
        b.create_cond_br(Value::Parameter(0), then, then).unwrap();
        b.set_insert_point(then);
        b.create_ret_void().unwrap();

        let ir = print_ir(&b.finish());
        assert!(ir.contains("br i1 %arg0, label %then, label %then"));
        assert!(ir.contains("ret void"));
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let err = sample()
            .write(Path::new("/nonexistent-dir/out.eir"))
            .unwrap_err();
        assert_eq!(err.tag(), "IoError");
    }
}
