//! Structural IR verifier
//!
//! Run by the optimizer before and after its pipelines. Any failure is an
//! internal invariant violation, not a user error.

use std::collections::HashSet;

use crate::middle::ir::*;
use crate::utils::{Error, Result};

pub fn verify_module(module: &IRModule) -> Result<()> {
    for function in &module.functions {
        verify_function(module, function)?;
    }
    Ok(())
}

pub fn verify_function(module: &IRModule, function: &IRFunction) -> Result<()> {
    if function.is_declaration() {
        return Ok(());
    }
    let fail = |message: String| Err(Error::invariant(format!("{}: {}", function.name, message)));

    if function.get_block(function.entry_block).is_none() {
        return fail("entry block is missing".to_string());
    }

    let mut defined = HashSet::new();
    for block in &function.blocks {
        for inst in &block.instructions {
            if let Some(dest) = inst.dest() {
                if dest.0 >= function.registers.len() {
                    return fail(format!("{} has no recorded type", dest));
                }
                if !defined.insert(dest) {
                    return fail(format!("{} is defined twice", dest));
                }
            }
        }
    }

    let check_value = |value: &Value| -> Result<()> {
        match value {
            Value::Register(r) if !defined.contains(r) => fail(format!("use of undefined register {}", r)),
            Value::Parameter(i) if *i >= function.params.len() => fail(format!("use of missing parameter {}", i)),
            Value::Global(name) if module.global(name).is_none() => fail(format!("unknown global @{}", name)),
            _ => Ok(()),
        }
    };
    let check_target = |block: &BasicBlock, target: BlockId| -> Result<()> {
        if function.get_block(target).is_none() {
            return fail(format!("block {} branches to missing block {}", block.label, target.0));
        }
        Ok(())
    };

    for block in &function.blocks {
        for inst in &block.instructions {
            for value in inst.operands() {
                check_value(value)?;
            }
            match inst {
                Instruction::Call { func, args, dest, .. } => {
                    let Some(callee) = module.function(func) else {
                        return fail(format!("call to unknown function {}", func));
                    };
                    if callee.params.len() != args.len() {
                        return fail(format!(
                            "call to {} passes {} arguments, expected {}",
                            func,
                            args.len(),
                            callee.params.len()
                        ));
                    }
                    if dest.is_some() == (callee.ret_type == IRType::Void) {
                        return fail(format!("call to {} has a mismatched result", func));
                    }
                }
                Instruction::Phi { incoming, .. } => {
                    for (_, from) in incoming {
                        check_target(block, *from)?;
                    }
                }
                _ => {}
            }
        }

        let Some(term) = &block.terminator else {
            return fail(format!("block {} is not terminated", block.label));
        };
        for value in term.operands() {
            check_value(value)?;
        }
        for target in term.successors() {
            check_target(block, target)?;
        }
        if let Terminator::Return { value } = term {
            if value.is_none() != (function.ret_type == IRType::Void) {
                return fail(format!("return in block {} does not match {}", block.label, function.ret_type));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::builder::{IrBuilder, ModuleBuilder};

    fn function_with_entry(ret: IRType) -> ModuleBuilder {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("f", vec![], ret);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        b.set_insert_point(entry);
        b
    }

    #[test]
    fn test_well_formed_module_passes() {
        let mut b = function_with_entry(IRType::I32);
        let x = b.create_binop(BinOp::Add, IRType::I32, Value::int(1), Value::int(2)).unwrap();
        b.create_ret(x).unwrap();
        assert!(verify_module(b.module()).is_ok());
    }

    #[test]
    fn test_unterminated_block_fails() {
        let mut b = function_with_entry(IRType::Void);
        b.create_binop(BinOp::Add, IRType::I32, Value::int(1), Value::int(2)).unwrap();
        let err = verify_module(b.module()).unwrap_err();
        assert!(err.to_string().contains("not terminated"));
    }

    #[test]
    fn test_missing_target_and_arity() {
        let mut b = function_with_entry(IRType::Void);
        b.create_br(BlockId(7)).unwrap();
        assert!(verify_module(b.module()).is_err());

        let mut b = function_with_entry(IRType::Void);
        b.create_call("f", vec![Value::int(1)], IRType::Void).unwrap();
        b.create_ret_void().unwrap();
        let err = verify_module(b.module()).unwrap_err();
        assert!(err.to_string().contains("passes 1 arguments"));
    }

    #[test]
    fn test_undefined_register_fails() {
        let mut b = function_with_entry(IRType::I32);
        b.create_ret(Value::Register(Register(3))).unwrap();
        let err = verify_module(b.module()).unwrap_err();
        assert_eq!(err.tag(), "InternalInvariant");
    }
}
