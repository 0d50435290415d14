//! Parser for Ember
//!
//! Recursive descent parser with Pratt parsing for expressions. Nodes are
//! pushed straight into the [`Ast`] arena.

use std::sync::Arc;

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result, SourceFile, SourceLoc};

/// The parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
}

impl Parser {
    /// Create a parser over a registered source file
    pub fn new(file: Arc<SourceFile>) -> Self {
        let tokens = Lexer::new(&file.contents, file.id).tokenize();
        Self {
            tokens,
            pos: 0,
            ast: Ast::new(file),
        }
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn error(&self, expected: impl Into<String>) -> Error {
        Error::Syntax {
            expected: expected.into(),
            got: format!("{:?}", self.current_kind()),
            loc: self.current().loc,
        }
    }

    fn out_of_range(&self, text: String) -> Error {
        Error::Syntax {
            expected: "integer literal in i64 range".to_string(),
            got: text,
            loc: self.current().loc,
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("{:?}", expected)))
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: NodeKind, loc: SourceLoc) -> NodeId {
        self.ast.push(kind, loc)
    }

    // ==================== Parsing Methods ====================

    /// Parse a complete compilation unit
    pub fn parse(mut self) -> Result<Ast> {
        let mut items = Vec::new();

        while !self.is_at_end() {
            items.push(self.parse_item()?);
        }

        let root = self.ast.root;
        self.ast.node_mut(root).kind = NodeKind::Block { stmts: items };
        Ok(self.ast)
    }

    /// Parse a top-level item
    fn parse_item(&mut self) -> Result<NodeId> {
        match self.current_kind() {
            TokenKind::Def | TokenKind::Inline => self.parse_function(),
            TokenKind::Let | TokenKind::Var => self.parse_variable(true),
            TokenKind::Import => self.parse_import(),
            TokenKind::Module => self.parse_module(),
            TokenKind::Type => self.parse_type_alias(),
            TokenKind::Semicolon => {
                let loc = self.advance().loc;
                Ok(self.push(NodeKind::EmptyStmt, loc))
            }
            _ => Err(self.error("item (def, let, var, import, module, type)")),
        }
    }

    fn parse_module(&mut self) -> Result<NodeId> {
        let loc = self.expect(TokenKind::Module)?.loc;
        let name = self.parse_path_name()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(self.push(NodeKind::Module { name }, loc))
    }

    fn parse_import(&mut self) -> Result<NodeId> {
        let loc = self.expect(TokenKind::Import)?.loc;

        let kind = if self.consume(&TokenKind::Module) {
            ImportKind::Module
        } else if self.consume(&TokenKind::Package) {
            ImportKind::Package
        } else {
            ImportKind::Unspecified
        };

        let (target, is_path) = match self.current_kind().clone() {
            TokenKind::StringLit(path) => {
                self.advance();
                (path, true)
            }
            _ => (self.parse_path_name()?, false),
        };
        self.expect(TokenKind::Semicolon)?;

        Ok(self.push(NodeKind::Import { target, kind, is_path }, loc))
    }

    /// `a` or `a.b.c`
    fn parse_path_name(&mut self) -> Result<String> {
        let mut name = self.parse_ident()?;
        while self.consume(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.parse_ident()?);
        }
        Ok(name)
    }

    /// Parse a function definition or declaration
    fn parse_function(&mut self) -> Result<NodeId> {
        let start = self.current().loc;
        let always_inline = self.consume(&TokenKind::Inline);
        self.expect(TokenKind::Def)?;

        let name = self.parse_ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            params.push(self.parse_param()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        let return_type = if self.consume(&TokenKind::Colon) {
            self.parse_type()?
        } else {
            TypeRef {
                name: "void".to_string(),
                mutable: false,
                loc: self.current().loc,
            }
        };

        let prototype = self.push(
            NodeKind::FunctionPrototype { name, return_type, params, always_inline },
            start,
        );

        let (body, is_declaration) = if self.consume(&TokenKind::Semicolon) {
            (None, true)
        } else {
            (Some(self.parse_block()?), false)
        };

        Ok(self.push(
            NodeKind::FunctionDefinition { prototype, body, is_declaration },
            start,
        ))
    }

    fn parse_param(&mut self) -> Result<NodeId> {
        let loc = self.current().loc;
        let mode = match self.current_kind() {
            TokenKind::Copy => PassMode::Copy,
            TokenKind::View => PassMode::View,
            TokenKind::Ref => PassMode::Ref,
            _ => PassMode::Copy,
        };
        if matches!(self.current_kind(), TokenKind::Copy | TokenKind::View | TokenKind::Ref) {
            self.advance();
        }

        let def_loc = self.current().loc;
        let name = self.parse_ident()?;

        // Parameters always carry a type; a missing one is left for the
        // grammar check to report
        let ty = if self.consume(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let mutable = mode == PassMode::Ref || ty.as_ref().is_some_and(|t| t.mutable);
        let def = self.push(
            NodeKind::VariableDefinition(VariableDefinition {
                name,
                inferred: ty.is_none(),
                ty,
                init: None,
                mutable,
            }),
            def_loc,
        );

        Ok(self.push(NodeKind::FunctionParameter { def, mode }, loc))
    }

    fn parse_ident(&mut self) -> Result<String> {
        match self.current_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    /// `T` or `mut T`
    /// `type name = T;`
    fn parse_type_alias(&mut self) -> Result<NodeId> {
        let loc = self.expect(TokenKind::Type)?.loc;
        let name = self.parse_ident()?;
        self.expect(TokenKind::Eq)?;
        let target = self.parse_type()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(self.push(NodeKind::TypeAlias { name, target }, loc))
    }

    fn parse_type(&mut self) -> Result<TypeRef> {
        let loc = self.current().loc;
        let mutable = self.consume(&TokenKind::Mut);
        let name = self.parse_ident().map_err(|_| self.error("type"))?;
        Ok(TypeRef { name, mutable, loc })
    }

    // ==================== Statement Parsing ====================

    fn parse_block(&mut self) -> Result<NodeId> {
        let loc = self.expect(TokenKind::LBrace)?.loc;

        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.parse_stmt()?);
        }

        self.expect(TokenKind::RBrace)?;
        Ok(self.push(NodeKind::Block { stmts }, loc))
    }

    fn parse_stmt(&mut self) -> Result<NodeId> {
        match self.current_kind() {
            TokenKind::Let | TokenKind::Var => self.parse_variable(false),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Semicolon => {
                let loc = self.advance().loc;
                Ok(self.push(NodeKind::EmptyStmt, loc))
            }
            _ => {
                let loc = self.current().loc;
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(self.push(NodeKind::ExprStmt { expr }, loc))
            }
        }
    }

    /// `let [mut] name[: T] [= init];` or `var name[: T] [= init];`
    fn parse_variable(&mut self, global: bool) -> Result<NodeId> {
        let def = self.parse_variable_head(global)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(def)
    }

    fn parse_variable_head(&mut self, global: bool) -> Result<NodeId> {
        let loc = self.current().loc;
        let mut mutable = matches!(self.advance().kind, TokenKind::Var);
        if self.consume(&TokenKind::Mut) {
            mutable = true;
        }

        let name = self.parse_ident()?;
        let ty = if self.consume(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.consume(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let def = VariableDefinition {
            name,
            inferred: ty.is_none(),
            mutable: mutable || ty.as_ref().is_some_and(|t| t.mutable),
            ty,
            init,
        };
        let kind = if global {
            NodeKind::GlobalVariableDefinition(def)
        } else {
            NodeKind::VariableDefinition(def)
        };
        Ok(self.push(kind, loc))
    }

    fn parse_if(&mut self) -> Result<NodeId> {
        let loc = self.expect(TokenKind::If)?.loc;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;

        let else_block = if self.consume(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(self.parse_if()?)
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(self.push(NodeKind::If { cond, then_block, else_block }, loc))
    }

    fn parse_while(&mut self) -> Result<NodeId> {
        let loc = self.expect(TokenKind::While)?.loc;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(self.push(NodeKind::While { cond, body }, loc))
    }

    /// `for init; end; step { }` or `for x in e { }`
    fn parse_for(&mut self) -> Result<NodeId> {
        let loc = self.expect(TokenKind::For)?.loc;

        if matches!(self.current_kind(), TokenKind::Ident(_))
            && matches!(self.peek_kind(), Some(TokenKind::In))
        {
            let var_loc = self.current().loc;
            let name = self.parse_ident()?;
            self.expect(TokenKind::In)?;
            let iterator = self.push(
                NodeKind::VariableDefinition(VariableDefinition {
                    name,
                    ty: None,
                    init: None,
                    inferred: true,
                    mutable: false,
                }),
                var_loc,
            );
            let iteratee = self.parse_expr()?;
            let body = self.parse_block()?;
            return Ok(self.push(NodeKind::ForEach { iterator, iteratee, body }, loc));
        }

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else if matches!(self.current_kind(), TokenKind::Let | TokenKind::Var) {
            Some(self.parse_variable_head(false)?)
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;

        let end = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;

        let step = if self.check(&TokenKind::LBrace) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let body = self.parse_block()?;

        Ok(self.push(NodeKind::For { init, end, step, body }, loc))
    }

    fn parse_return(&mut self) -> Result<NodeId> {
        let loc = self.expect(TokenKind::Return)?.loc;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(self.push(NodeKind::Return { value }, loc))
    }

    // ==================== Expression Parsing (Pratt) ====================

    fn parse_expr(&mut self) -> Result<NodeId> {
        self.parse_expr_bp(0)
    }

    /// Parse expression with binding power (Pratt parsing)
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<NodeId> {
        let mut left = self.parse_unary()?;

        loop {
            let op_token = self.current().clone();
            let Some(bp) = op_token.kind.binary_precedence() else {
                break;
            };

            if bp < min_bp {
                break;
            }

            self.advance();

            if op_token.kind == TokenKind::As {
                let ty = self.parse_type()?;
                left = self.push(NodeKind::Cast { expr: left, ty }, op_token.loc);
                continue;
            }

            let op = Self::token_to_operator(&op_token.kind)
                .ok_or_else(|| Error::invariant("binary precedence without operator"))?;

            if op_token.kind.is_assignment() {
                // Right-associative
                let rhs = self.parse_expr_bp(bp)?;
                let lhs = self.assignment_target(left);
                left = self.push(NodeKind::AssignmentOp { op, lhs, rhs }, op_token.loc);
            } else {
                let rhs = self.parse_expr_bp(bp + 1)?;
                left = self.push(NodeKind::BinaryOp { op, lhs: left, rhs }, op_token.loc);
            }
        }

        Ok(left)
    }

    /// A plain name on the left of `=` is an identifier, not a load
    fn assignment_target(&mut self, target: NodeId) -> NodeId {
        if let NodeKind::VariableReference { name } = self.ast.kind(target) {
            let name = name.clone();
            self.ast.node_mut(target).kind = NodeKind::Identifier { name };
        }
        target
    }

    fn parse_unary(&mut self) -> Result<NodeId> {
        let token = self.current().clone();
        let op = match token.kind {
            TokenKind::Plus => OperatorKind::UnaryPlus,
            TokenKind::Minus => OperatorKind::UnaryMinus,
            TokenKind::Not => OperatorKind::LogicalNot,
            TokenKind::Tilde => OperatorKind::BitNot,
            _ => return self.parse_postfix(),
        };
        self.advance();

        // i64::MIN has no positive counterpart
        if op == OperatorKind::UnaryMinus && matches!(self.current_kind(), TokenKind::IntLit(n) if *n == 1 << 63) {
            self.advance();
            return Ok(self.push(NodeKind::IntegerLiteral(i64::MIN), token.loc));
        }
        let operand = self.parse_unary()?;

        // Fold `-literal` into a negative literal
        if op == OperatorKind::UnaryMinus {
            let folded = match self.ast.kind(operand) {
                NodeKind::IntegerLiteral(n) => Some(NodeKind::IntegerLiteral(n.wrapping_neg())),
                NodeKind::FloatLiteral(f) => Some(NodeKind::FloatLiteral(-f)),
                _ => None,
            };
            if let Some(kind) = folded {
                let node = self.ast.node_mut(operand);
                node.kind = kind;
                node.loc = token.loc;
                return Ok(operand);
            }
        }

        Ok(self.push(NodeKind::UnaryOp { op, operand }, token.loc))
    }

    fn parse_primary(&mut self) -> Result<NodeId> {
        let token = self.current().clone();

        let kind = match token.kind {
            TokenKind::IntLit(n) => match i64::try_from(n) {
                Ok(n) => NodeKind::IntegerLiteral(n),
                Err(_) => return Err(self.out_of_range(n.to_string())),
            },
            TokenKind::OversizedInt(text) => return Err(self.out_of_range(text)),
            TokenKind::FloatLit(f) => NodeKind::FloatLiteral(f),
            TokenKind::StringLit(value) => NodeKind::StringLiteral { value, kind: StringKind::Plain },
            TokenKind::CStringLit(value) => NodeKind::StringLiteral { value, kind: StringKind::C },
            TokenKind::CharLit(c) => NodeKind::CharLiteral { value: u32::from(c), byte: false },
            TokenKind::ByteCharLit(b) => NodeKind::CharLiteral { value: u32::from(b), byte: true },
            TokenKind::True => NodeKind::BoolLiteral(true),
            TokenKind::False => NodeKind::BoolLiteral(false),
            TokenKind::None => NodeKind::NoneLiteral,
            TokenKind::Ident(name) => NodeKind::VariableReference { name },
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            _ => return Err(self.error("expression")),
        };

        self.advance();
        Ok(self.push(kind, token.loc))
    }

    fn parse_postfix(&mut self) -> Result<NodeId> {
        let mut expr = self.parse_primary()?;
        loop {
            let loc = self.current().loc;
            if self.consume(&TokenKind::LParen) {
                let mut args = Vec::new();
                while !self.check(&TokenKind::RParen) && !self.is_at_end() {
                    args.push(self.parse_expr()?);
                    if !self.consume(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
                let callee = self.assignment_target(expr);
                expr = self.push(NodeKind::Call { callee, args }, loc);
            } else if self.consume(&TokenKind::Dot) {
                let member = self.parse_ident()?;
                expr = self.push(NodeKind::MemberAccess { object: expr, member }, loc);
            } else if self.consume(&TokenKind::LBracket) {
                let start = if self.check(&TokenKind::Colon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                if self.consume(&TokenKind::Colon) {
                    let end = if self.check(&TokenKind::RBracket) {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect(TokenKind::RBracket)?;
                    expr = self.push(NodeKind::SubscriptRanged { object: expr, start, end }, loc);
                } else {
                    let index = start.ok_or_else(|| self.error("index expression"))?;
                    self.expect(TokenKind::RBracket)?;
                    expr = self.push(NodeKind::Subscript { object: expr, index }, loc);
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn token_to_operator(kind: &TokenKind) -> Option<OperatorKind> {
        Some(match kind {
            TokenKind::Plus => OperatorKind::Add,
            TokenKind::Minus => OperatorKind::Sub,
            TokenKind::Star => OperatorKind::Mul,
            TokenKind::Slash => OperatorKind::Div,
            TokenKind::Percent => OperatorKind::Mod,
            TokenKind::EqEq => OperatorKind::Eq,
            TokenKind::Ne => OperatorKind::Ne,
            TokenKind::Lt => OperatorKind::Lt,
            TokenKind::Le => OperatorKind::Le,
            TokenKind::Gt => OperatorKind::Gt,
            TokenKind::Ge => OperatorKind::Ge,
            TokenKind::AndAnd => OperatorKind::LogicalAnd,
            TokenKind::OrOr => OperatorKind::LogicalOr,
            TokenKind::And => OperatorKind::BitAnd,
            TokenKind::Or => OperatorKind::BitOr,
            TokenKind::Caret => OperatorKind::BitXor,
            TokenKind::Shl => OperatorKind::Shl,
            TokenKind::Shr => OperatorKind::Shr,
            TokenKind::Eq => OperatorKind::Assign,
            TokenKind::PlusEq => OperatorKind::AddAssign,
            TokenKind::MinusEq => OperatorKind::SubAssign,
            TokenKind::StarEq => OperatorKind::MulAssign,
            TokenKind::SlashEq => OperatorKind::DivAssign,
            TokenKind::PercentEq => OperatorKind::ModAssign,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::FileId;

    fn parse(source: &str) -> Result<Ast> {
        Parser::new(Arc::new(SourceFile::new(FileId(0), "test.em", source))).parse()
    }

    fn first_body(ast: &Ast) -> Vec<NodeId> {
        let NodeKind::FunctionDefinition { body: Some(body), .. } = ast.kind(ast.top_level()[0]) else {
            panic!("expected function with body");
        };
        ast.kind(*body).children()
    }

    #[test]
    fn test_empty_function() {
        let ast = parse("def main(): void {}").unwrap();
        assert_eq!(ast.top_level().len(), 1);
        assert!(first_body(&ast).is_empty());
    }

    #[test]
    fn test_function_with_params() {
        let ast = parse("def f(copy a: i32, view b: i32, ref out: i32): void { out = a + b; }").unwrap();
        let NodeKind::FunctionDefinition { prototype, .. } = ast.kind(ast.top_level()[0]) else {
            panic!("expected function");
        };
        let NodeKind::FunctionPrototype { params, .. } = ast.kind(*prototype) else {
            panic!("expected prototype");
        };
        let modes: Vec<PassMode> = params
            .iter()
            .map(|p| match ast.kind(*p) {
                NodeKind::FunctionParameter { mode, .. } => *mode,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(modes, vec![PassMode::Copy, PassMode::View, PassMode::Ref]);
    }

    #[test]
    fn test_declaration_and_inline() {
        let ast = parse("def ext(x: f64): f64;\ninline def sq(x: i32): i32 { return x * x; }").unwrap();
        assert!(matches!(
            ast.kind(ast.top_level()[0]),
            NodeKind::FunctionDefinition { body: None, is_declaration: true, .. }
        ));
        let NodeKind::FunctionDefinition { prototype, .. } = ast.kind(ast.top_level()[1]) else {
            panic!("expected function");
        };
        assert!(matches!(
            ast.kind(*prototype),
            NodeKind::FunctionPrototype { always_inline: true, .. }
        ));
    }

    #[test]
    fn test_variable_definitions() {
        let ast = parse("def main(): void { let x = 42; var y: i32 = 1; let mut z = 2; }").unwrap();
        let stmts = first_body(&ast);
        let defs: Vec<(bool, bool)> = stmts
            .iter()
            .map(|s| match ast.kind(*s) {
                NodeKind::VariableDefinition(def) => (def.inferred, def.mutable),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(defs, vec![(true, false), (false, true), (true, true)]);
    }

    #[test]
    fn test_globals_and_imports() {
        let ast = parse("module demo;\nimport \"lib/io.em\";\nimport package std;\nlet limit: i32 = 10;").unwrap();
        let top = ast.top_level();
        assert!(matches!(ast.kind(top[0]), NodeKind::Module { name } if name == "demo"));
        assert!(matches!(ast.kind(top[1]), NodeKind::Import { is_path: true, .. }));
        assert!(matches!(
            ast.kind(top[2]),
            NodeKind::Import { kind: ImportKind::Package, is_path: false, .. }
        ));
        assert!(matches!(ast.kind(top[3]), NodeKind::GlobalVariableDefinition(_)));
    }

    #[test]
    fn test_precedence_and_assignment() {
        let ast = parse("def main(): void { x = 1 + 2 * 3; }").unwrap();
        let stmts = first_body(&ast);
        let NodeKind::ExprStmt { expr } = ast.kind(stmts[0]) else {
            panic!("expected expression statement");
        };
        let NodeKind::AssignmentOp { lhs, rhs, .. } = ast.kind(*expr) else {
            panic!("expected assignment");
        };
        assert!(matches!(ast.kind(*lhs), NodeKind::Identifier { name } if name == "x"));
        let NodeKind::BinaryOp { op, rhs: mul, .. } = ast.kind(*rhs) else {
            panic!("expected binary op");
        };
        assert_eq!(*op, OperatorKind::Add);
        assert!(matches!(ast.kind(*mul), NodeKind::BinaryOp { op: OperatorKind::Mul, .. }));
    }

    #[test]
    fn test_negative_literal_folded() {
        let ast = parse("def main(): i32 { return -5; }").unwrap();
        let NodeKind::Return { value: Some(v) } = ast.kind(first_body(&ast)[0]) else {
            panic!("expected return");
        };
        assert_eq!(ast.kind(*v), &NodeKind::IntegerLiteral(-5));
    }

    #[test]
    fn test_type_alias() {
        let ast = parse("type score = i32;").unwrap();
        let NodeKind::TypeAlias { name, target } = ast.kind(ast.top_level()[0]) else {
            panic!("expected type alias");
        };
        assert_eq!(name, "score");
        assert_eq!(target.name, "i32");
    }

    #[test]
    fn test_i64_min_literal() {
        let ast = parse("def main(): i64 { return -9223372036854775808; }").unwrap();
        let NodeKind::Return { value: Some(v) } = ast.kind(first_body(&ast)[0]) else {
            panic!("expected return");
        };
        assert_eq!(ast.kind(*v), &NodeKind::IntegerLiteral(i64::MIN));
    }

    #[test]
    fn test_integer_literal_out_of_range() {
        for source in [
            "def main(): i64 { return 9223372036854775808; }",
            "def main(): i64 { return 99999999999999999999; }",
            "def main(): i64 { return -0xFFFF_FFFF_FFFF_FFFF_F; }",
        ] {
            let err = parse(source).unwrap_err();
            assert_eq!(err.tag(), "SyntaxError");
            assert!(err.to_string().contains("integer literal in i64 range"), "{}", err);
        }
    }

    #[test]
    fn test_loops() {
        let ast = parse(
            "def g(): void { while i < 10 { i += 1; } for var k = 0; k < 3; k = k + 1 { } for c in items { } }",
        )
        .unwrap();
        let stmts = first_body(&ast);
        assert!(matches!(ast.kind(stmts[0]), NodeKind::While { .. }));
        assert!(matches!(
            ast.kind(stmts[1]),
            NodeKind::For { init: Some(_), end: Some(_), step: Some(_), .. }
        ));
        assert!(matches!(ast.kind(stmts[2]), NodeKind::ForEach { .. }));
    }

    #[test]
    fn test_postfix_and_cast() {
        let ast = parse("def main(): void { f(a[1], b[1:], c.d) as i64; }").unwrap();
        let NodeKind::ExprStmt { expr } = ast.kind(first_body(&ast)[0]) else {
            panic!("expected expression statement");
        };
        let NodeKind::Cast { expr: call, ty } = ast.kind(*expr) else {
            panic!("expected cast");
        };
        assert_eq!(ty.name, "i64");
        let NodeKind::Call { callee, args } = ast.kind(*call) else {
            panic!("expected call");
        };
        assert!(matches!(ast.kind(*callee), NodeKind::Identifier { .. }));
        assert!(matches!(ast.kind(args[0]), NodeKind::Subscript { .. }));
        assert!(matches!(ast.kind(args[1]), NodeKind::SubscriptRanged { end: None, .. }));
        assert!(matches!(ast.kind(args[2]), NodeKind::MemberAccess { .. }));
    }

    #[test]
    fn test_syntax_error_location() {
        let err = parse("def main(): i32 {\n  return 1 +;\n}").unwrap_err();
        assert_eq!(err.tag(), "SyntaxError");
        let loc = err.loc().unwrap();
        assert_eq!((loc.line, loc.column), (2, 13));
    }
}
