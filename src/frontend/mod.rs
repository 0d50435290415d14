//! Frontend module - Lexer, Parser, AST passes

pub mod ast;
pub mod dump;
pub mod grammar;
pub mod lexer;
pub mod parents;
pub mod parser;
pub mod token;
pub mod visit;

use std::sync::Arc;

use crate::utils::{Result, SourceFile};

pub use ast::Ast;
pub use dump::dump;
pub use grammar::check_grammar;
pub use parents::solve_parents;

/// Parses a source file into an owned, parent-linked, grammar-checked AST
pub struct FrontEnd;

impl FrontEnd {
    pub fn run(file: &Arc<SourceFile>) -> Result<Ast> {
        log::debug!("parsing {}", file.path.display());
        let mut ast = parser::Parser::new(Arc::clone(file)).parse()?;
        solve_parents(&mut ast);
        check_grammar(&ast)?;
        log::trace!("{}: {} nodes", file.path.display(), ast.len());
        Ok(ast)
    }
}
