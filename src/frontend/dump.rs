//! Textual AST dump for diagnostics

use std::fmt::Write;

use super::ast::{Ast, ImportKind, NodeId, NodeKind, StringKind};
use super::visit::{walk_ast, walk_node, Visitor};

/// Render the tree, one node per line: `KindName [details] @line:col`
pub fn dump(ast: &Ast) -> String {
    let mut dumper = DumpVisitor { out: String::new(), depth: 0 };
    walk_ast(&mut dumper, ast);
    dumper.out
}

struct DumpVisitor {
    out: String,
    depth: usize,
}

impl<'ast> Visitor<'ast> for DumpVisitor {
    fn visit_node(&mut self, ast: &'ast Ast, id: NodeId) {
        let node = ast.node(id);
        let details = details(&node.kind);
        let _ = write!(self.out, "{:indent$}{}", "", node.kind.name(), indent = self.depth * 2);
        if !details.is_empty() {
            let _ = write!(self.out, " {}", details);
        }
        let _ = writeln!(self.out, " @{}", node.loc);

        self.depth += 1;
        walk_node(self, ast, id);
        self.depth -= 1;
    }
}

fn details(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Identifier { name } | NodeKind::VariableReference { name } => name.clone(),
        NodeKind::VariableDefinition(def) | NodeKind::GlobalVariableDefinition(def) => {
            let mut s = def.name.clone();
            if let Some(ty) = &def.ty {
                let _ = write!(s, ": {}", ty);
            }
            if def.inferred {
                s.push_str(" inferred");
            }
            if def.mutable {
                s.push_str(" mut");
            }
            s
        }
        NodeKind::Cast { ty, .. } => format!("as {}", ty),
        NodeKind::MemberAccess { member, .. } => format!(".{}", member),
        NodeKind::IntegerLiteral(n) => n.to_string(),
        NodeKind::FloatLiteral(f) => format!("{:?}", f),
        NodeKind::StringLiteral { value, kind } => match kind {
            StringKind::Plain => format!("{:?}", value),
            StringKind::C => format!("c{:?}", value),
        },
        NodeKind::CharLiteral { value, byte } => {
            let c = char::from_u32(*value).unwrap_or(char::REPLACEMENT_CHARACTER);
            if *byte {
                format!("b{:?}", c)
            } else {
                format!("{:?}", c)
            }
        }
        NodeKind::BoolLiteral(b) => b.to_string(),
        NodeKind::UnaryOp { op, .. }
        | NodeKind::BinaryOp { op, .. }
        | NodeKind::AssignmentOp { op, .. } => op.symbol().to_string(),
        NodeKind::Import { target, kind, is_path } => {
            let kind = match kind {
                ImportKind::Unspecified => "",
                ImportKind::Module => "module ",
                ImportKind::Package => "package ",
            };
            if *is_path {
                format!("{}{:?}", kind, target)
            } else {
                format!("{}{}", kind, target)
            }
        }
        NodeKind::Module { name } => name.clone(),
        NodeKind::TypeAlias { name, target } => format!("{} = {}", name, target),
        NodeKind::FunctionParameter { mode, .. } => mode.to_string(),
        NodeKind::FunctionPrototype { name, return_type, always_inline, .. } => {
            let mut s = format!("{}: {}", name, return_type);
            if *always_inline {
                s.push_str(" inline");
            }
            s
        }
        NodeKind::FunctionDefinition { is_declaration: true, .. } => "declaration".to_string(),
        _ => String::new(),
    }
}
