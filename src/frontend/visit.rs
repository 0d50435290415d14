//! Trait definition for an AST visitor which walks the arena in DFS order

use super::ast::{Ast, NodeId, NodeKind, PassMode, VariableDefinition};

pub trait Visitor<'ast>: Sized {
    /// Entry point for every node; dispatches on the node kind
    fn visit_node(&mut self, ast: &'ast Ast, id: NodeId) {
        walk_node(self, ast, id)
    }

    fn visit_block(&mut self, ast: &'ast Ast, _id: NodeId, stmts: &'ast [NodeId]) {
        walk_list(self, ast, stmts)
    }

    fn visit_variable_definition(
        &mut self,
        ast: &'ast Ast,
        _id: NodeId,
        def: &'ast VariableDefinition,
    ) {
        if let Some(init) = def.init {
            self.visit_node(ast, init);
        }
    }

    fn visit_function_parameter(
        &mut self,
        ast: &'ast Ast,
        _id: NodeId,
        def: NodeId,
        _mode: PassMode,
    ) {
        self.visit_node(ast, def)
    }

    fn visit_function_definition(
        &mut self,
        ast: &'ast Ast,
        _id: NodeId,
        prototype: NodeId,
        body: Option<NodeId>,
    ) {
        self.visit_node(ast, prototype);
        if let Some(body) = body {
            self.visit_node(ast, body);
        }
    }

    /// Every other kind
    fn visit_other(&mut self, ast: &'ast Ast, id: NodeId) {
        walk_children(self, ast, id)
    }
}

pub fn walk_ast<'a>(visitor: &mut impl Visitor<'a>, ast: &'a Ast) {
    visitor.visit_node(ast, ast.root);
}

pub fn walk_node<'a>(visitor: &mut impl Visitor<'a>, ast: &'a Ast, id: NodeId) {
    match ast.kind(id) {
        NodeKind::Block { stmts } => visitor.visit_block(ast, id, stmts),
        NodeKind::VariableDefinition(def) | NodeKind::GlobalVariableDefinition(def) => {
            visitor.visit_variable_definition(ast, id, def)
        }
        NodeKind::FunctionParameter { def, mode } => {
            visitor.visit_function_parameter(ast, id, *def, *mode)
        }
        NodeKind::FunctionDefinition { prototype, body, .. } => {
            visitor.visit_function_definition(ast, id, *prototype, *body)
        }
        _ => visitor.visit_other(ast, id),
    }
}

pub fn walk_children<'a>(visitor: &mut impl Visitor<'a>, ast: &'a Ast, id: NodeId) {
    for child in ast.kind(id).children() {
        visitor.visit_node(ast, child);
    }
}

pub fn walk_list<'a>(visitor: &mut impl Visitor<'a>, ast: &'a Ast, ids: &'a [NodeId]) {
    for id in ids {
        visitor.visit_node(ast, *id);
    }
}
