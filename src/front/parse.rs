//! The parser: recursive descent over the token stream, with a
//! two-stack shunting-yard subroutine for expressions (§4.1.1). Symbol
//! resolution (§4.1.2) and type checking (§4.1.3) happen inline, as in
//! the original: a declaration is entered into the function table the
//! moment it is parsed, so a later statement in the same function can
//! already see it, and every condition/return/call-argument is checked
//! against its expected type as soon as it is built.

use crate::common::{intern, Id};
use crate::error::{CompileError, ErrorKind, Result};
use crate::front::ast::*;
use crate::front::lex::{Lexer, Token, TokenKind};
use crate::front::symbol::{FunctionSig, FunctionTable, GlobalTable, SymbolKind};

pub fn parse(input: &str) -> Result<Program> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(&tokens).parse_program()
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    globals: GlobalTable,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Parser { tokens, pos: 0, globals: GlobalTable::new() }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }

    fn pos_here(&self) -> crate::common::Position {
        self.peek().map(|t| t.pos).unwrap_or(crate::common::Position { line: 0, col: 0 })
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn syntax_err(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(message, self.pos_here())
    }

    /// Consume a token of exactly `kind`, or fail with `message`.
    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token> {
        if self.peek_kind() == kind {
            Ok(self.advance().unwrap())
        } else {
            Err(self.syntax_err(format!("{message} (found {})", self.peek_kind())))
        }
    }

    fn expect_ident(&mut self, message: &str) -> Result<Id> {
        let tok = self.expect(TokenKind::Ident, message)?;
        Ok(intern(&tok.text))
    }

    // -- types -----------------------------------------------------------

    /// A parameter/local type: only `entier` is valid.
    fn parse_type(&mut self) -> Result<VarType> {
        match self.peek_kind() {
            TokenKind::Entier => {
                self.advance();
                Ok(VarType::Integer)
            }
            _ => Err(self.syntax_err("expected a type ('entier')")),
        }
    }

    /// A return type: `entier` or `rien`.
    fn parse_return_type(&mut self) -> Result<VarType> {
        match self.peek_kind() {
            TokenKind::Entier => {
                self.advance();
                Ok(VarType::Integer)
            }
            TokenKind::Rien => {
                self.advance();
                Ok(VarType::Void)
            }
            _ => Err(self.syntax_err("expected a return type ('entier' or 'rien')")),
        }
    }

    // -- expressions -------------------------------------------------------

    fn token_to_binop(kind: TokenKind) -> Option<BinOp> {
        use TokenKind::*;
        Some(match kind {
            Plus => BinOp::Plus,
            Minus => BinOp::Minus,
            Star => BinOp::Mult,
            Slash => BinOp::Div,
            Lt => BinOp::Lt,
            Le => BinOp::Lte,
            Gt => BinOp::Gt,
            Ge => BinOp::Gte,
            EqEq => BinOp::Eq,
            Ne => BinOp::Neq,
            Et => BinOp::And,
            Ou => BinOp::Or,
            _ => return None,
        })
    }

    fn at_expression_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Semicolon | TokenKind::RParen | TokenKind::Comma)
    }

    /// A single primary: an integer literal (possibly negative, only in
    /// this value position — see the module doc comment on `lex.rs`), a
    /// parenthesized sub-expression, a variable, or a call.
    fn parse_primary(&mut self, table: &mut FunctionTable) -> Result<Expr> {
        if self.peek_kind() == TokenKind::Minus {
            self.advance();
            let tok = self.expect(TokenKind::Number, "expected a number after unary '-'")?;
            let value: i64 = tok
                .text
                .parse()
                .map_err(|_| CompileError::lex("number literal out of range", tok.pos))?;
            return Ok(Expr::Integer(-value));
        }
        if self.peek_kind() == TokenKind::Number {
            let tok = self.advance().unwrap();
            let value: i64 = tok
                .text
                .parse()
                .map_err(|_| CompileError::lex("number literal out of range", tok.pos))?;
            return Ok(Expr::Integer(value));
        }
        if self.peek_kind() == TokenKind::LParen {
            self.advance();
            let inner = self.parse_expression(table)?;
            self.expect(TokenKind::RParen, "missing ')' at the end of the expression")?;
            return Ok(Expr::Paren(Box::new(inner)));
        }
        self.parse_known_symbol(table)
    }

    /// An identifier in value position: either a variable reference
    /// resolved in the enclosing function table, or a call resolved in
    /// the global table (§4.1.2).
    fn parse_known_symbol(&mut self, table: &mut FunctionTable) -> Result<Expr> {
        let pos = self.pos_here();
        let name = self.expect_ident("expected an identifier")?;

        if let Some(sym) = table.lookup(name) {
            return Ok(Expr::Variable(Variable { name, ty: sym.ty }));
        }
        if let Some(sig) = self.globals.lookup(name) {
            let sig = sig.clone();
            self.expect(TokenKind::LParen, "a function call must be followed by '('")?;
            let args = self.parse_arguments(table, &sig, name)?;
            return Ok(Expr::FnCall { name, args });
        }
        Err(CompileError::name(format!("identifier '{name}' is used before declaration"), pos))
    }

    fn parse_arguments(
        &mut self,
        table: &mut FunctionTable,
        sig: &FunctionSig,
        fn_name: Id,
    ) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        let pos = self.pos_here();
        if self.peek_kind() == TokenKind::RParen {
            self.advance();
            if !sig.params.is_empty() {
                return Err(CompileError::ty_at(
                    format!(
                        "function '{fn_name}' expects {} argument(s), found 0",
                        sig.params.len()
                    ),
                    pos,
                ));
            }
            return Ok(args);
        }
        loop {
            let pos = self.pos_here();
            let arg = self.parse_expression(table)?;
            let expected = sig.params.get(args.len()).copied().ok_or_else(|| {
                CompileError::ty_at(
                    format!("too many arguments to function '{fn_name}'"),
                    pos,
                )
            })?;
            let actual = self.expr_type(&arg, table)?;
            if actual != expected {
                return Err(CompileError::ty_at(
                    format!(
                        "argument {} to '{fn_name}' has type {actual}, expected {expected}",
                        args.len() + 1
                    ),
                    pos,
                ));
            }
            args.push(arg);
            match self.peek_kind() {
                TokenKind::RParen => {
                    self.advance();
                    if args.len() != sig.params.len() {
                        return Err(CompileError::ty_at(
                            format!(
                                "function '{fn_name}' expects {} argument(s), found {}",
                                sig.params.len(),
                                args.len()
                            ),
                            pos,
                        ));
                    }
                    return Ok(args);
                }
                TokenKind::Comma => {
                    self.advance();
                }
                _ => return Err(self.syntax_err("expected ',' or ')' after argument")),
            }
        }
    }

    /// Two-stack shunting-yard over the precedence ladder in §4.1.1.
    /// Ends at `;`, `)`, or `,` at the current nesting depth (a nested
    /// `(...)` is consumed whole by `parse_primary` before control
    /// returns here).
    fn parse_expression(&mut self, table: &mut FunctionTable) -> Result<Expr> {
        let mut output: Vec<Expr> = Vec::new();
        let mut ops: Vec<BinOp> = Vec::new();

        output.push(self.parse_primary(table)?);

        while !self.at_expression_end() {
            let op = Self::token_to_binop(self.peek_kind())
                .ok_or_else(|| self.syntax_err("expected a binary operator"))?;
            self.advance();

            while let Some(top) = ops.last() {
                if top.priority() >= op.priority() {
                    let top = ops.pop().unwrap();
                    Self::reduce(&mut output, top)?;
                } else {
                    break;
                }
            }
            ops.push(op);
            output.push(self.parse_primary(table)?);
        }

        while let Some(top) = ops.pop() {
            Self::reduce(&mut output, top)?;
        }

        output.pop().ok_or_else(|| self.syntax_err("empty expression"))
    }

    fn reduce(output: &mut Vec<Expr>, op: BinOp) -> Result<()> {
        let right = output.pop().expect("shunting-yard output underflow");
        let left = output.pop().expect("shunting-yard output underflow");
        output.push(Expr::Binary { op, left: Box::new(left), right: Box::new(right) });
        Ok(())
    }

    /// The type-checker of §4.1.3: every `Binary` node is Integer
    /// (arithmetic on Integer operands) or Boolean (comparison or
    /// `ET`/`OU`); mismatched operand types are a Type error.
    fn expr_type(&self, expr: &Expr, table: &FunctionTable) -> Result<VarType> {
        match expr {
            Expr::Integer(_) => Ok(VarType::Integer),
            Expr::Variable(v) => Ok(v.ty),
            Expr::Paren(inner) => self.expr_type(inner, table),
            Expr::FnCall { name, .. } => {
                // Resolution already checked the call when it was parsed;
                // this just recovers its type for the enclosing context.
                let _ = table;
                Ok(self
                    .globals
                    .lookup(*name)
                    .expect("call was resolved against the global table at parse time")
                    .return_type)
            }
            Expr::Binary { op, left, right } => {
                let lt = self.expr_type(left, table)?;
                let rt = self.expr_type(right, table)?;
                if op.is_arithmetic() {
                    if lt == VarType::Integer && rt == VarType::Integer {
                        Ok(VarType::Integer)
                    } else {
                        Err(CompileError::ty(format!(
                            "arithmetic operator '{}' requires entier operands, found {lt} and {rt}",
                            op.symbol()
                        )))
                    }
                } else if op.is_comparison() {
                    if lt == VarType::Integer && rt == VarType::Integer {
                        Ok(VarType::Boolean)
                    } else {
                        Err(CompileError::ty(format!(
                            "comparison '{}' requires entier operands, found {lt} and {rt}",
                            op.symbol()
                        )))
                    }
                } else {
                    debug_assert!(op.is_boolean());
                    if lt == VarType::Boolean && rt == VarType::Boolean {
                        Ok(VarType::Boolean)
                    } else {
                        Err(CompileError::ty(format!(
                            "'{}' requires booleen operands, found {lt} and {rt}",
                            op.symbol()
                        )))
                    }
                }
            }
        }
    }

    // -- statements --------------------------------------------------------

    fn parse_declaration(&mut self, table: &mut FunctionTable) -> Result<Stmt> {
        let ty = self.parse_type()?;
        let pos = self.pos_here();
        let name = self.expect_ident("expected a variable name")?;

        table
            .add(name, SymbolKind::Var, ty)
            .map_err(|_| CompileError::name(format!("identifier '{name}' already declared"), pos))?;
        let lvalue = Variable { name, ty };

        match self.peek_kind() {
            TokenKind::Semicolon => Ok(Stmt::Declaration { lvalue, rvalue: None }),
            TokenKind::Equals => {
                self.advance();
                let rvalue = self.parse_expression(table)?;
                let rty = self.expr_type(&rvalue, table)?;
                if rty != ty {
                    return Err(CompileError::ty_at(
                        format!("cannot initialize {ty} variable '{name}' with a {rty} value"),
                        pos,
                    ));
                }
                Ok(Stmt::Declaration { lvalue, rvalue: Some(rvalue) })
            }
            _ => Err(self.syntax_err("expected '=' or ';' after a declaration")),
        }
    }

    fn parse_assignment(&mut self, table: &mut FunctionTable, name: Id, pos: crate::common::Position) -> Result<Stmt> {
        let sym = table.lookup(name).expect("caller already confirmed the symbol exists");
        let ty = sym.ty;
        let lvalue = Variable { name, ty };
        self.expect(TokenKind::Equals, "expected '=' in assignment")?;
        let rvalue = self.parse_expression(table)?;
        let rty = self.expr_type(&rvalue, table)?;
        if rty != ty {
            return Err(CompileError::ty_at(
                format!("cannot assign a {rty} value to {ty} variable '{name}'"),
                pos,
            ));
        }
        Ok(Stmt::Assignment { lvalue, rvalue })
    }

    fn parse_condition(&mut self, table: &mut FunctionTable) -> Result<Expr> {
        self.expect(TokenKind::LParen, "a condition should be followed by '('")?;
        let pos = self.pos_here();
        let cond = self.parse_expression(table)?;
        if self.expr_type(&cond, table)? != VarType::Boolean {
            return Err(CompileError::ty_at("condition must be a booleen expression", pos));
        }
        self.expect(TokenKind::RParen, "condition should be ended by ')'")?;
        Ok(cond)
    }

    fn parse_branch(&mut self, table: &mut FunctionTable, return_type: VarType) -> Result<Stmt> {
        self.expect(TokenKind::Si, "expected 'si'")?;
        let condition = self.parse_condition(table)?;
        let valid = Box::new(self.parse_statement(table, return_type)?);

        let invalid = if self.peek_kind() == TokenKind::Sinon {
            self.advance();
            Some(Box::new(self.parse_statement(table, return_type)?))
        } else {
            None
        };
        Ok(Stmt::Branch { condition, valid, invalid })
    }

    fn parse_loop(&mut self, table: &mut FunctionTable, return_type: VarType) -> Result<Stmt> {
        self.expect(TokenKind::Tantque, "expected 'tantque'")?;
        let condition = self.parse_condition(table)?;
        let body = Box::new(self.parse_statement(table, return_type)?);
        Ok(Stmt::Loop { condition, body })
    }

    fn parse_compound(&mut self, table: &mut FunctionTable, return_type: VarType) -> Result<Stmt> {
        self.expect(TokenKind::LBrace, "expected '{'")?;
        let mut stmts = Vec::new();
        while self.peek_kind() != TokenKind::RBrace {
            if self.peek().is_none() {
                return Err(self.syntax_err("unexpected end of input inside a block"));
            }
            stmts.push(self.parse_statement(table, return_type)?);
        }
        self.advance();
        Ok(Stmt::Compound(stmts))
    }

    fn parse_statement(&mut self, table: &mut FunctionTable, return_type: VarType) -> Result<Stmt> {
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_compound(table, return_type),
            TokenKind::Si => self.parse_branch(table, return_type),
            TokenKind::Tantque => self.parse_loop(table, return_type),
            TokenKind::Retourner => {
                let pos = self.pos_here();
                self.advance();
                let stmt = if self.peek_kind() == TokenKind::Semicolon {
                    if return_type != VarType::Void {
                        return Err(CompileError::ty_at(
                            format!("function must return a {return_type} value"),
                            pos,
                        ));
                    }
                    Stmt::Return(None)
                } else {
                    if return_type == VarType::Void {
                        return Err(CompileError::ty_at(
                            "a 'rien' function cannot return a value",
                            pos,
                        ));
                    }
                    let expr = self.parse_expression(table)?;
                    let ty = self.expr_type(&expr, table)?;
                    if ty != return_type {
                        return Err(CompileError::ty_at(
                            format!("returned {ty} value, expected {return_type}"),
                            pos,
                        ));
                    }
                    Stmt::Return(Some(expr))
                };
                self.expect(TokenKind::Semicolon, "statement should end with ';'")?;
                Ok(stmt)
            }
            TokenKind::Entier => {
                let stmt = self.parse_declaration(table)?;
                self.expect(TokenKind::Semicolon, "statement should end with ';'")?;
                Ok(stmt)
            }
            TokenKind::Ident
                if self.tokens.get(self.pos + 1).map(|t| t.kind) == Some(TokenKind::Equals) =>
            {
                let pos = self.pos_here();
                let name = self.expect_ident("expected an identifier")?;
                if table.lookup(name).is_none() {
                    return Err(CompileError::name(
                        format!("identifier '{name}' is used before declaration"),
                        pos,
                    ));
                }
                let stmt = self.parse_assignment(table, name, pos)?;
                self.expect(TokenKind::Semicolon, "statement should end with ';'")?;
                Ok(stmt)
            }
            _ => {
                let expr = self.parse_expression(table)?;
                self.expect(TokenKind::Semicolon, "statement should end with ';'")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    // -- functions & program -------------------------------------------------

    fn parse_parameters(&mut self, table: &mut FunctionTable) -> Result<Vec<Variable>> {
        self.expect(TokenKind::LParen, "expecting a '(' after the function name")?;
        let mut params = Vec::new();
        if self.peek_kind() == TokenKind::RParen {
            self.advance();
            return Ok(params);
        }
        loop {
            let ty = self.parse_type()?;
            let pos = self.pos_here();
            let name = self.expect_ident("expected a parameter name")?;
            table.add(name, SymbolKind::Param, ty).map_err(|_| {
                CompileError::name(format!("identifier '{name}' already declared"), pos)
            })?;
            params.push(Variable { name, ty });
            match self.peek_kind() {
                TokenKind::RParen => {
                    self.advance();
                    return Ok(params);
                }
                TokenKind::Comma => {
                    self.advance();
                }
                _ => return Err(self.syntax_err("unexpected end of parameter list")),
            }
        }
    }

    fn parse_function(&mut self) -> Result<Function> {
        self.expect(TokenKind::Fonction, "expected 'fonction'")?;
        let pos = self.pos_here();
        let name = self.expect_ident("expected a function name")?;

        let mut table = FunctionTable::new();
        let params = self.parse_parameters(&mut table)?;
        self.expect(TokenKind::Colon, "parameters should be followed by ':'")?;
        let return_type = self.parse_return_type()?;

        let sig = FunctionSig {
            return_type,
            params: params.iter().map(|p| p.ty).collect(),
        };
        self.globals
            .add(name, sig)
            .map_err(|_| CompileError::name(format!("function '{name}' already declared"), pos))?;

        self.expect(TokenKind::LBrace, "function body should start with '{'")?;
        let mut body = Vec::new();
        while self.peek_kind() != TokenKind::RBrace {
            if self.peek().is_none() {
                return Err(self.syntax_err("function body should end with '}'"));
            }
            body.push(self.parse_statement(&mut table, return_type)?);
        }
        self.expect(TokenKind::RBrace, "function body should end with '}'")?;

        Ok(Function { name, return_type, params, body, table })
    }

    fn parse_program(&mut self) -> Result<Program> {
        let mut functions = Vec::new();
        while self.peek().is_some() {
            if self.peek_kind() != TokenKind::Fonction {
                return Err(self.syntax_err("only functions are allowed at global scope"));
            }
            functions.push(self.parse_function()?);
        }
        if self.globals.lookup(intern("main")).is_none() {
            return Err(CompileError::new(ErrorKind::Name, "no 'main' function was found"));
        }
        Ok(Program { functions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_groups_multiplication_tighter_than_addition() {
        let program = parse(
            "fonction main(): entier { retourner 1 + 2 * 3; }",
        )
        .unwrap();
        let body = &program.functions[0].body;
        match &body[0] {
            Stmt::Return(Some(Expr::Binary { op: BinOp::Plus, right, .. })) => match &**right {
                Expr::Binary { op: BinOp::Mult, .. } => {}
                other => panic!("expected nested Mult, got {other:?}"),
            },
            other => panic!("expected Plus at the root, got {other:?}"),
        }
    }

    #[test]
    fn parenthesized_group_becomes_the_left_child() {
        let program = parse("fonction main(): entier { retourner (1 + 2) * 3; }").unwrap();
        match &program.functions[0].body[0] {
            Stmt::Return(Some(Expr::Binary { op: BinOp::Mult, left, .. })) => match &**left {
                Expr::Paren(inner) => match &**inner {
                    Expr::Binary { op: BinOp::Plus, .. } => {}
                    other => panic!("expected Plus inside parens, got {other:?}"),
                },
                other => panic!("expected a Paren node, got {other:?}"),
            },
            other => panic!("expected Mult at the root, got {other:?}"),
        }
    }

    #[test]
    fn rejects_use_before_declaration() {
        let err = parse("fonction main(): entier { retourner x; }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);
    }

    #[test]
    fn rejects_non_boolean_condition() {
        let err =
            parse("fonction main(): entier { si (1 + 1) retourner 0; }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn negative_literal_only_parses_in_value_position() {
        let program = parse("fonction main(): entier { retourner -5; }").unwrap();
        match &program.functions[0].body[0] {
            Stmt::Return(Some(Expr::Integer(-5))) => {}
            other => panic!("expected Integer(-5), got {other:?}"),
        }

        let program = parse("fonction main(entier a): entier { retourner a - 5; }").unwrap();
        match &program.functions[0].body[0] {
            Stmt::Return(Some(Expr::Binary { op: BinOp::Minus, .. })) => {}
            other => panic!("expected binary Minus, got {other:?}"),
        }
    }

    #[test]
    fn call_argument_count_is_checked() {
        // Too many arguments: caught mid-loop against sig.params.
        let err = parse(
            "fonction f(entier x): entier { retourner x; } \
             fonction main(): entier { retourner f(1, 2); }",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);

        // Too few arguments: caught at the closing ')'.
        let err = parse(
            "fonction f(entier x, entier y): entier { retourner x; } \
             fonction main(): entier { retourner f(1); }",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn requires_a_main_function() {
        let err = parse("fonction f(): entier { retourner 1; }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);
    }
}
