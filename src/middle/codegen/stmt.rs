//! Statement lowering: blocks, control flow, returns and local variables

use crate::frontend::ast::{NodeId, NodeKind, VariableDefinition};
use crate::middle::builder::IrBuilder;
use crate::middle::ir::Value;
use crate::middle::symbols::Symbol;
use crate::types::{cast, CastMode, TypedValue};
use crate::utils::{Error, Result};

use super::CodegenVisitor;

impl<'a> CodegenVisitor<'a> {
    pub(super) fn lower_stmt(&mut self, id: NodeId) -> Result<()> {
        let ast = self.ast;
        let loc = ast.loc(id);
        match ast.kind(id) {
            NodeKind::EmptyStmt => Ok(()),
            NodeKind::Block { stmts } => self.lower_block(stmts),
            NodeKind::ExprStmt { expr } => self.lower_expr(*expr).map(drop),
            NodeKind::VariableDefinition(def) => self.lower_variable(id, def).map(drop),
            NodeKind::If { cond, then_block, else_block } => self.lower_if(*cond, *then_block, *else_block),
            NodeKind::While { cond, body } => self.lower_while(*cond, *body),
            NodeKind::For { init, end, step, body } => self.lower_for(*init, *end, *step, *body),
            NodeKind::ForEach { .. } => Err(Error::unsupported("foreach", "loop", loc)),
            NodeKind::Return { value } => self.lower_return(id, *value),
            NodeKind::FunctionDefinition { .. }
            | NodeKind::FunctionPrototype { .. }
            | NodeKind::GlobalVariableDefinition(_)
            | NodeKind::Import { .. }
            | NodeKind::Module { .. }
            | NodeKind::TypeAlias { .. } => Err(Error::unsupported(ast.kind(id).name(), "function body", loc)),
            NodeKind::FunctionParameter { .. } => Err(Error::invariant("parameter outside a prototype")),
            _ => self.lower_expr(id).map(drop),
        }
    }

    /// A fresh scope; statements after a terminator are skipped with a warning
    fn lower_block(&mut self, stmts: &[NodeId]) -> Result<()> {
        self.symbols.push_scope();
        for &stmt in stmts {
            if self.builder.is_terminated() {
                self.diagnostics
                    .warn("UnreachableCode", "statement is never executed", self.ast.loc(stmt));
                break;
            }
            self.lower_stmt(stmt)?;
        }
        self.symbols.pop_scope();
        Ok(())
    }

    /// Lower a condition and coerce it to `bool`
    fn lower_condition(&mut self, cond: NodeId) -> Result<Value> {
        let loc = self.ast.loc(cond);
        let value = self.lower_expr(cond)?;
        let value = self.ctx(loc).load(value)?;
        let bool_ty = self.types.bool();
        Ok(cast(&mut self.ctx(loc), CastMode::Explicit, value, bool_ty)?.value)
    }

    fn lower_if(&mut self, cond: NodeId, then_block: NodeId, else_block: Option<NodeId>) -> Result<()> {
        let cond = self.lower_condition(cond)?;

        let then_bb = self.builder.append_block("then")?;
        let else_bb = match else_block {
            Some(_) => Some(self.builder.append_block("else")?),
            None => None,
        };
        let merge_bb = self.builder.append_block("ifcont")?;
        self.builder.create_cond_br(cond, then_bb, else_bb.unwrap_or(merge_bb))?;

        self.builder.set_insert_point(then_bb);
        self.lower_stmt(then_block)?;
        if !self.builder.is_terminated() {
            self.builder.create_br(merge_bb)?;
        }

        if let (Some(else_block), Some(else_bb)) = (else_block, else_bb) {
            self.builder.set_insert_point(else_bb);
            self.lower_stmt(else_block)?;
            if !self.builder.is_terminated() {
                self.builder.create_br(merge_bb)?;
            }
        }

        self.builder.set_insert_point(merge_bb);
        Ok(())
    }

    fn lower_while(&mut self, cond: NodeId, body: NodeId) -> Result<()> {
        let cond_bb = self.builder.append_block("loopcond")?;
        let body_bb = self.builder.append_block("loopbody")?;
        let end_bb = self.builder.append_block("loopend")?;
        self.builder.create_br(cond_bb)?;

        self.builder.set_insert_point(cond_bb);
        let cond = self.lower_condition(cond)?;
        self.builder.create_cond_br(cond, body_bb, end_bb)?;

        self.builder.set_insert_point(body_bb);
        self.lower_stmt(body)?;
        if !self.builder.is_terminated() {
            self.builder.create_br(cond_bb)?;
        }

        self.builder.set_insert_point(end_bb);
        Ok(())
    }

    /// `for init; end; step body`; the init binding is scoped to the loop
    fn lower_for(
        &mut self,
        init: Option<NodeId>,
        end: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    ) -> Result<()> {
        let init_bb = self.builder.append_block("forinit")?;
        let cond_bb = self.builder.append_block("forcond")?;
        let body_bb = self.builder.append_block("forbody")?;
        let step_bb = self.builder.append_block("forstep")?;
        let end_bb = self.builder.append_block("forend")?;
        self.builder.create_br(init_bb)?;

        self.symbols.push_scope();
        self.builder.set_insert_point(init_bb);
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }
        self.builder.create_br(cond_bb)?;

        self.builder.set_insert_point(cond_bb);
        match end {
            Some(end) => {
                let cond = self.lower_condition(end)?;
                self.builder.create_cond_br(cond, body_bb, end_bb)?;
            }
            None => self.builder.create_br(body_bb)?,
        }

        self.builder.set_insert_point(body_bb);
        self.lower_stmt(body)?;
        if !self.builder.is_terminated() {
            self.builder.create_br(step_bb)?;
        }

        self.builder.set_insert_point(step_bb);
        if let Some(step) = step {
            self.lower_expr(step)?;
        }
        self.builder.create_br(cond_bb)?;
        self.symbols.pop_scope();

        self.builder.set_insert_point(end_bb);
        Ok(())
    }

    fn lower_return(&mut self, id: NodeId, value: Option<NodeId>) -> Result<()> {
        let loc = self.ast.loc(id);
        let ret = self
            .current
            .as_ref()
            .map(|f| f.ret)
            .ok_or_else(|| Error::invariant("return outside a function"))?;

        let value = match value {
            Some(v) if !matches!(self.ast.kind(v), NodeKind::NoneLiteral) => {
                let lowered = self.lower_expr(v)?;
                Some(self.ctx(loc).load(lowered)?)
            }
            _ => None,
        };

        match value {
            None if self.types.is_void(ret) => self.builder.create_ret_void(),
            None => Err(Error::mismatch(self.type_name(ret), "void", loc)),
            Some(v) if self.types.is_void(ret) && self.types.is_void(v.ty) => self.builder.create_ret_void(),
            Some(v) => {
                let v = self.coerce(v, ret, loc)?;
                self.builder.create_ret(v.value)
            }
        }
    }

    /// Bind a local: evaluate the initializer, allocate a slot, store
    pub(super) fn lower_variable(&mut self, id: NodeId, def: &VariableDefinition) -> Result<TypedValue> {
        let loc = self.ast.loc(id);
        self.check_not_reserved(&def.name, loc)?;

        let init = match def.init {
            Some(init) => {
                let lowered = self.lower_expr(init)?;
                Some(self.ctx(loc).load(lowered)?)
            }
            None => None,
        };

        let declared = match (&def.ty, &init) {
            (Some(ty), _) if !def.inferred => self.resolve_type(ty)?,
            (_, Some(init)) => init.ty,
            (None, None) => {
                return Err(Error::Grammar {
                    node: "VariableDefinition".to_string(),
                    message: format!("`{}` has neither a type nor an initializer", def.name),
                    loc,
                })
            }
            (Some(ty), None) => self.resolve_type(ty)?,
        };
        let base = self.types.immutable_of(declared);
        self.check_sized(base, loc)?;
        let ir = self.types.get(base).ir.clone();

        let stored = match init {
            Some(init) => self.coerce(init, base, loc)?.value,
            None if def.mutable => {
                self.diagnostics.warn(
                    "UninitializedVariable",
                    format!("`{}` is used before being assigned a value", def.name),
                    loc,
                );
                Value::Undef(ir.clone())
            }
            None => {
                self.diagnostics.warn(
                    "UselessBinding",
                    format!("immutable `{}` has no initializer", def.name),
                    loc,
                );
                Value::Undef(ir.clone())
            }
        };

        let slot = self.builder.create_entry_alloca(ir.clone())?;
        self.builder.create_store(ir, stored, slot.clone())?;

        let ty = if def.mutable { self.types.mutable_of(base) } else { base };
        let value = TypedValue::lvalue(ty, slot, def.mutable);
        self.symbols.insert(Symbol::variable(&def.name, value.clone(), loc))?;
        Ok(value)
    }
}
