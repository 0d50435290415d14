//! Codegen - AST to Ember IR
//!
//! Walks the arena AST with a scoped symbol table and lowers it through the
//! [`IrBuilder`] interface. The first error aborts the whole file.

mod expr;
mod stmt;
#[cfg(test)]
mod tests;

use std::collections::HashSet;

use crate::frontend::ast::{Ast, NodeId, NodeKind, PassMode, TypeRef, VariableDefinition};
use crate::middle::builder::{IrBuilder, ModuleBuilder};
use crate::middle::ir::{DebugSubprogram, IRGlobal, IRModule, Value};
use crate::middle::symbols::{Symbol, SymbolKind, SymbolTable};
use crate::types::{cast, is_same_or_implicitly_castable, CastMode, OpContext, TypeId, TypeTable, TypedValue};
use crate::utils::{Diagnostics, Error, Result, SourceLoc};

/// Lower a whole compilation unit into an IR module
pub fn generate(ast: &Ast, debug_info: bool, diagnostics: &mut Diagnostics) -> Result<IRModule> {
    let mut codegen = CodegenVisitor::new(ast, debug_info, diagnostics);
    codegen.lower_unit()?;
    Ok(codegen.builder.finish())
}

/// The function whose body is being lowered
struct FunctionState {
    ret: TypeId,
}

/// AST to IR lowering state for one file
pub struct CodegenVisitor<'a> {
    ast: &'a Ast,
    builder: ModuleBuilder,
    types: TypeTable,
    symbols: SymbolTable,
    diagnostics: &'a mut Diagnostics,
    /// Functions that already received a body
    defined: HashSet<String>,
    current: Option<FunctionState>,
}

impl<'a> CodegenVisitor<'a> {
    pub fn new(ast: &'a Ast, debug_info: bool, diagnostics: &'a mut Diagnostics) -> Self {
        let mut builder = ModuleBuilder::new(ast.file.stem());
        builder.module_mut().source = ast.file.path.display().to_string();
        Self {
            ast,
            builder,
            types: TypeTable::new(debug_info),
            symbols: SymbolTable::new(),
            diagnostics,
            defined: HashSet::new(),
            current: None,
        }
    }

    /// Two passes over the global block: declarations, then bodies
    fn lower_unit(&mut self) -> Result<()> {
        let ast = self.ast;
        let top = ast.top_level();

        for &id in top {
            let loc = ast.loc(id);
            match ast.kind(id) {
                NodeKind::Module { name } => self.builder.set_module_name(name),
                NodeKind::Import { target, .. } => {
                    log::debug!("{}: import {}", loc, target);
                    self.builder.add_import(target);
                }
                NodeKind::TypeAlias { name, target } => {
                    let target = self.resolve_type(target)?;
                    self.types.insert_alias(name, target, loc)?;
                }
                NodeKind::GlobalVariableDefinition(def) => self.lower_global(id, def)?,
                NodeKind::FunctionDefinition { prototype, .. } => {
                    self.lower_prototype(*prototype)?;
                }
                NodeKind::EmptyStmt => {}
                other => return Err(Error::unsupported(other.name(), "global scope", loc)),
            }
        }

        for &id in top {
            if let NodeKind::FunctionDefinition { prototype, body: Some(body), .. } = ast.kind(id) {
                self.lower_function(*prototype, *body)?;
            }
        }
        Ok(())
    }

    // ==================== Helpers ====================

    fn ctx(&mut self, loc: SourceLoc) -> OpContext<'_> {
        OpContext::new(&mut self.builder, &mut self.types, loc)
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.types.get(ty).decorated_name()
    }

    fn resolve_type(&mut self, ty: &TypeRef) -> Result<TypeId> {
        self.types.resolve(ty)
    }

    /// Debug records of a function's return and parameter types
    fn debug_types(&self, fn_ty: TypeId) -> Vec<String> {
        let Some(signature) = &self.types.get(fn_ty).signature else {
            return Vec::new();
        };
        std::iter::once(signature.ret)
            .chain(signature.params.iter().map(|(ty, _)| *ty))
            .map(|ty| match &self.types.get(ty).debug {
                Some(debug) => debug.to_string(),
                None => self.type_name(ty),
            })
            .collect()
    }

    /// Names of primitive types cannot be rebound
    fn check_not_reserved(&self, name: &str, loc: SourceLoc) -> Result<()> {
        if self.types.is_defined_undecorated(name) > 0 {
            return Err(Error::RedefinedSymbol { name: name.to_string(), loc });
        }
        Ok(())
    }

    fn check_sized(&self, ty: TypeId, loc: SourceLoc) -> Result<()> {
        if !self.types.is_sized(ty) {
            return Err(Error::UnsizedType { name: self.type_name(ty), loc });
        }
        Ok(())
    }

    /// Coerce `value` to `target` at an assignment-like site
    fn coerce(&mut self, value: TypedValue, target: TypeId, loc: SourceLoc) -> Result<TypedValue> {
        let value = self.adapt_literal(value, target);
        if !is_same_or_implicitly_castable(&self.types, &value, target) {
            return Err(Error::mismatch(self.type_name(target), self.type_name(value.ty), loc));
        }
        cast(&mut self.ctx(loc), CastMode::Implicit, value, target)
    }

    /// The current block is the entry block or some branch targets it
    fn current_block_reachable(&self) -> bool {
        match (self.builder.current_function(), self.builder.get_insert_block()) {
            (Some(f), Some(b)) => f.reachable_targets().get(b.0).copied().unwrap_or(false),
            _ => false,
        }
    }

    // ==================== Globals ====================

    fn lower_global(&mut self, id: NodeId, def: &VariableDefinition) -> Result<()> {
        let loc = self.ast.loc(id);
        self.check_not_reserved(&def.name, loc)?;

        let init_id = def.init.ok_or_else(|| Error::Grammar {
            node: "GlobalVariableDefinition".to_string(),
            message: format!("global `{}` has no initializer", def.name),
            loc,
        })?;
        let init = self.lower_constant(init_id)?;

        let declared = match &def.ty {
            Some(ty) if !def.inferred => self.resolve_type(ty)?,
            _ => init.ty,
        };
        let base = self.types.immutable_of(declared);
        self.check_sized(base, loc)?;
        let init = self.coerce(init, base, loc)?;
        let Value::Constant(constant) = init.value else {
            return Err(Error::unsupported("non-constant initializer", self.type_name(base), loc));
        };

        let ty = if def.mutable { self.types.mutable_of(base) } else { base };
        self.symbols.insert(Symbol::variable(
            &def.name,
            TypedValue::lvalue(ty, Value::Global(def.name.clone()), def.mutable),
            loc,
        ))?;
        self.builder.add_global(IRGlobal {
            name: def.name.clone(),
            ty: self.types.get(base).ir.clone(),
            init: constant,
            mutable: def.mutable,
        });
        Ok(())
    }

    // ==================== Functions ====================

    /// Resolve the signature, intern its type and declare the function once
    fn lower_prototype(&mut self, proto_id: NodeId) -> Result<TypedValue> {
        let ast = self.ast;
        let loc = ast.loc(proto_id);
        let NodeKind::FunctionPrototype { name, return_type, params, always_inline } = ast.kind(proto_id) else {
            return Err(Error::invariant("function definition without prototype"));
        };

        let ret = self.resolve_type(return_type)?;
        let ret = self.types.immutable_of(ret);

        let mut signature = Vec::with_capacity(params.len());
        let mut ir_params = Vec::with_capacity(params.len());
        for &param in params {
            let (def, mode) = self.parameter(param)?;
            let param_loc = ast.loc(param);
            let ty_ref = def.ty.as_ref().ok_or_else(|| Error::Grammar {
                node: "FunctionParameter".to_string(),
                message: format!("parameter `{}` has no type", def.name),
                loc: param_loc,
            })?;
            let ty = self.resolve_type(ty_ref)?;
            let ty = self.types.immutable_of(ty);
            self.check_sized(ty, param_loc)?;
            ir_params.push((def.name.clone(), self.types.param_ir_type(ty, mode)));
            signature.push((ty, mode));
        }
        let fn_ty = self.types.function_type(ret, signature);

        if let Some(existing) = self.symbols.find(name) {
            return match existing.kind {
                SymbolKind::Function if existing.value.ty == fn_ty => {
                    let value = existing.value.clone();
                    if *always_inline {
                        if let Some(f) = self.builder.module_mut().function_mut(name) {
                            f.always_inline = true;
                        }
                    }
                    Ok(value)
                }
                SymbolKind::Function => Err(Error::mismatch(
                    self.type_name(existing.value.ty),
                    self.type_name(fn_ty),
                    loc,
                )),
                SymbolKind::Variable => Err(Error::RedefinedSymbol { name: name.clone(), loc }),
            };
        }
        self.check_not_reserved(name, loc)?;

        let ret_ir = self.types.get(ret).ir.clone();
        let index = self.builder.declare_function(name, ir_params, ret_ir);
        let mangled = self.types.mangle_function(name, fn_ty);
        let debug = self.types.debug_info().then(|| DebugSubprogram {
            file: self.ast.file.path.display().to_string(),
            line: loc.line,
            types: self.debug_types(fn_ty),
        });
        if let Some(f) = self.builder.module_mut().functions.get_mut(index) {
            f.mangled = mangled;
            f.always_inline = *always_inline;
            f.debug = debug;
        }

        let value = TypedValue::rvalue(fn_ty, Value::Function(name.clone()));
        self.symbols
            .insert(Symbol::function(name, value.clone(), loc))?;
        log::trace!("declared {}: {}", name, self.type_name(fn_ty));
        Ok(value)
    }

    fn parameter(&self, param: NodeId) -> Result<(&'a VariableDefinition, PassMode)> {
        let ast = self.ast;
        let NodeKind::FunctionParameter { def, mode } = ast.kind(param) else {
            return Err(Error::invariant("prototype parameter is not a FunctionParameter"));
        };
        let NodeKind::VariableDefinition(var) = ast.kind(*def) else {
            return Err(Error::invariant("parameter without variable definition"));
        };
        Ok((var, *mode))
    }

    /// Lower a function body into its declared IR function
    fn lower_function(&mut self, proto_id: NodeId, body: NodeId) -> Result<()> {
        let ast = self.ast;
        let loc = ast.loc(proto_id);
        let NodeKind::FunctionPrototype { name, params, .. } = ast.kind(proto_id) else {
            return Err(Error::invariant("function definition without prototype"));
        };
        if !self.defined.insert(name.clone()) {
            return Err(Error::RedefinedSymbol { name: name.clone(), loc });
        }

        let fn_ty = self
            .symbols
            .find(name)
            .map(|s| s.value.ty)
            .ok_or_else(|| Error::UndefinedSymbol { name: name.clone(), loc })?;
        let signature = self
            .types
            .get(fn_ty)
            .signature
            .clone()
            .ok_or_else(|| Error::invariant(format!("{} has no function type", name)))?;
        let index = self
            .builder
            .module()
            .function_index(name)
            .ok_or_else(|| Error::invariant(format!("{} was never declared", name)))?;

        self.builder.enter_function(index)?;
        let entry = self.builder.append_block("entry")?;
        self.builder.set_insert_point(entry);
        self.current = Some(FunctionState { ret: signature.ret });

        self.symbols.push_scope();
        for (i, (&param, (ty, mode))) in params.iter().zip(signature.params.iter()).enumerate() {
            self.lower_parameter(i, param, *ty, *mode)?;
        }
        self.lower_stmt(body)?;

        if !self.builder.is_terminated() {
            if self.types.is_void(signature.ret) {
                self.builder.create_ret_void()?;
            } else if self.current_block_reachable() {
                return Err(Error::MissingReturn { name: name.clone(), loc });
            } else {
                self.builder.create_unreachable()?;
            }
        }
        self.symbols.pop_scope();
        self.current = None;
        Ok(())
    }

    /// Bind a parameter: `ref` binds the incoming address, the rest get a slot
    fn lower_parameter(&mut self, index: usize, param: NodeId, ty: TypeId, mode: PassMode) -> Result<()> {
        let (def, _) = self.parameter(param)?;
        let loc = self.ast.loc(param);
        self.check_not_reserved(&def.name, loc)?;

        let value = match mode {
            PassMode::Ref => {
                let ty = self.types.mutable_of(ty);
                TypedValue::lvalue(ty, Value::Parameter(index), true)
            }
            PassMode::Copy | PassMode::View => {
                let mutable = mode == PassMode::Copy && def.mutable;
                let ir = self.types.get(ty).ir.clone();
                let slot = self.builder.create_entry_alloca(ir.clone())?;
                self.builder.create_store(ir, Value::Parameter(index), slot.clone())?;
                let ty = if mutable { self.types.mutable_of(ty) } else { ty };
                TypedValue::lvalue(ty, slot, mutable)
            }
        };
        self.symbols.insert(Symbol::variable(&def.name, value, loc))
    }
}
