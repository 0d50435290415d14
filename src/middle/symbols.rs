//! Lexically scoped symbol table used by codegen

use std::collections::HashMap;

use crate::types::TypedValue;
use crate::utils::{Error, Result, SourceLoc};

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Variable,
    Function,
}

/// A named value: a storage slot for variables, the function itself otherwise
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub value: TypedValue,
    pub loc: SourceLoc,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn variable(name: &str, value: TypedValue, loc: SourceLoc) -> Self {
        Self {
            name: name.to_string(),
            value,
            loc,
            kind: SymbolKind::Variable,
        }
    }

    pub fn function(name: &str, value: TypedValue, loc: SourceLoc) -> Self {
        Self {
            name: name.to_string(),
            value,
            loc,
            kind: SymbolKind::Function,
        }
    }
}

/// LIFO stack of scopes
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, Symbol>>,
}

impl SymbolTable {
    /// A table with the global scope open
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind in the innermost scope; a name already bound there is an error
    pub fn insert(&mut self, symbol: Symbol) -> Result<()> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| Error::invariant("symbol insert with no open scope"))?;
        if scope.contains_key(&symbol.name) {
            return Err(Error::RedefinedSymbol {
                name: symbol.name,
                loc: symbol.loc,
            });
        }
        scope.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Innermost binding of `name`
    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}
