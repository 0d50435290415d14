//! Structural checks that run after parsing and before codegen

use super::ast::{Ast, NodeId, NodeKind, PassMode, VariableDefinition};
use super::visit::{walk_ast, walk_children, walk_list, walk_node, Visitor};
use crate::utils::{Error, Result};

/// Check the shape of the whole tree. The first violation is returned.
pub fn check_grammar(ast: &Ast) -> Result<()> {
    let mut checker = GrammarChecker { error: None };
    walk_ast(&mut checker, ast);
    match checker.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct GrammarChecker {
    error: Option<Error>,
}

impl GrammarChecker {
    fn fail(&mut self, ast: &Ast, id: NodeId, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(Error::Grammar {
                node: ast.kind(id).name().to_string(),
                message: message.into(),
                loc: ast.loc(id),
            });
        }
    }

    fn check_definition(&mut self, ast: &Ast, id: NodeId, def: &VariableDefinition) {
        if def.name.is_empty() {
            self.fail(ast, id, "variable has no name");
        } else if def.inferred && def.ty.is_some() {
            self.fail(ast, id, format!("`{}` is inferred but declares a type", def.name));
        } else if def.inferred && def.init.is_none() {
            self.fail(ast, id, format!("`{}` needs a type or an initializer", def.name));
        } else if !def.inferred && def.ty.is_none() {
            self.fail(ast, id, format!("`{}` has no type", def.name));
        }
    }
}

impl<'ast> Visitor<'ast> for GrammarChecker {
    fn visit_node(&mut self, ast: &'ast Ast, id: NodeId) {
        if self.error.is_none() {
            walk_node(self, ast, id);
        }
    }

    fn visit_block(&mut self, ast: &'ast Ast, _id: NodeId, stmts: &'ast [NodeId]) {
        walk_list(self, ast, stmts)
    }

    fn visit_variable_definition(
        &mut self,
        ast: &'ast Ast,
        id: NodeId,
        def: &'ast VariableDefinition,
    ) {
        self.check_definition(ast, id, def);
        if matches!(ast.kind(id), NodeKind::GlobalVariableDefinition(_)) && def.init.is_none() {
            self.fail(ast, id, format!("global `{}` has no initializer", def.name));
        }
        if let Some(init) = def.init {
            self.visit_node(ast, init);
        }
    }

    fn visit_function_parameter(
        &mut self,
        ast: &'ast Ast,
        id: NodeId,
        def: NodeId,
        _mode: PassMode,
    ) {
        let NodeKind::VariableDefinition(param) = ast.kind(def) else {
            return self.fail(ast, id, "parameter is not a variable definition");
        };
        if param.inferred || param.ty.is_none() {
            self.fail(ast, id, format!("parameter `{}` has no type", param.name));
        } else if param.init.is_some() {
            self.fail(ast, id, format!("parameter `{}` has a default value", param.name));
        } else if param.ty.as_ref().is_some_and(|t| t.name == "void") {
            self.fail(ast, id, format!("parameter `{}` has unsized type void", param.name));
        } else {
            self.check_definition(ast, def, param);
        }
    }

    fn visit_function_definition(
        &mut self,
        ast: &'ast Ast,
        id: NodeId,
        prototype: NodeId,
        body: Option<NodeId>,
    ) {
        if !matches!(ast.kind(prototype), NodeKind::FunctionPrototype { .. }) {
            return self.fail(ast, id, "missing prototype");
        }
        self.visit_node(ast, prototype);
        if let Some(body) = body {
            if !matches!(ast.kind(body), NodeKind::Block { .. }) {
                return self.fail(ast, id, "function body is not a block");
            }
            self.visit_node(ast, body);
        }
    }

    fn visit_other(&mut self, ast: &'ast Ast, id: NodeId) {
        // The foreach binding takes its value from the iteratee
        if let NodeKind::ForEach { iteratee, body, .. } = ast.kind(id) {
            self.visit_node(ast, *iteratee);
            self.visit_node(ast, *body);
            return;
        }
        walk_children(self, ast, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::Parser;
    use crate::utils::{FileId, SourceFile};
    use std::sync::Arc;

    fn check(source: &str) -> Result<()> {
        let ast = Parser::new(Arc::new(SourceFile::new(FileId(0), "t.em", source)))
            .parse()
            .unwrap();
        check_grammar(&ast)
    }

    #[test]
    fn test_well_formed() {
        assert!(check("let g: i32 = 1;\ndef f(a: i32): i32 { let b = a; var c: i32; for x in a { } return b; }").is_ok());
    }

    #[test]
    fn test_parent_links_keep_a_checked_tree_valid() {
        let mut ast = Parser::new(Arc::new(SourceFile::new(
            FileId(0),
            "t.em",
            "let g: i32 = 1;\nvar h = 2;\n\
             def f(a: i32, ref b: i64): i32 {\n\
               for var i: i32 = 0; i < a; i = i + 1 { { let c = i; } }\n\
               for x in a { var d: i32; }\n\
               return a;\n\
             }",
        )))
        .parse()
        .unwrap();
        assert!(check_grammar(&ast).is_ok());

        crate::frontend::solve_parents(&mut ast);
        assert!(check_grammar(&ast).is_ok());
        let parents: Vec<_> = ast.reachable().into_iter().map(|id| ast.node(id).parent).collect();
        assert_eq!(ast.node(ast.root).parent, None);

        crate::frontend::solve_parents(&mut ast);
        assert!(check_grammar(&ast).is_ok());
        let again: Vec<_> = ast.reachable().into_iter().map(|id| ast.node(id).parent).collect();
        assert_eq!(parents, again);
    }

    #[test]
    fn test_inferred_without_initializer() {
        let err = check("def f(): void { let x; }").unwrap_err();
        assert_eq!(err.tag(), "GrammarError");
        assert_eq!(err.loc().map(|l| (l.line, l.column)), Some((1, 17)));
    }

    #[test]
    fn test_global_without_initializer() {
        let err = check("var counter: i32;").unwrap_err();
        assert!(err.to_string().contains("counter"));
    }

    #[test]
    fn test_void_parameter() {
        let err = check("def f(x: void): void { }").unwrap_err();
        assert_eq!(err.tag(), "GrammarError");
    }

    #[test]
    fn test_untyped_parameter() {
        assert!(check("def f(x): void { }").is_err());
    }

    #[test]
    fn test_first_violation_wins() {
        let err = check("def f(): void { let a; let b; }").unwrap_err();
        assert!(err.to_string().contains("`a`"));
    }
}
