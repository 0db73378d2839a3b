//! Pratt-style recursive descent parser (spec §4.2).
//!
//! Grammar levels, weakest first: assignment -> ternary -> logical-or ->
//! logical-and -> equality -> comparison -> addition -> multiplication ->
//! exponentiation (right-associative) -> unary -> call/member -> primary.

use ultrascript_sdk::{DataType, ParseError, Span};

use crate::lexer::{SpannedToken, TemplatePart, TokenKind};
use crate::parser::ast::*;
use crate::scope::ParseTimeScopeTracker;

pub struct Parser<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
    pub tracker: ParseTimeScopeTracker,
}

type PResult<T> = Result<T, ParseError>;

pub fn parse(tokens: &[SpannedToken], source_path: &str) -> Result<(Program, ParseTimeScopeTracker), ParseError> {
    let mut parser = Parser::new(tokens);
    let mut statements = Vec::new();
    while !parser.at_eof() {
        statements.push(parser.parse_statement()?);
    }
    Ok((
        Program { statements, source_path: source_path.to_string() },
        parser.tracker,
    ))
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [SpannedToken]) -> Self {
        Self { tokens, pos: 0, tracker: ParseTimeScopeTracker::new() }
    }

    fn current(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn at_eof(&self) -> bool {
        matches!(self.current(), TokenKind::Eof)
    }

    fn advance(&mut self) -> &SpannedToken {
        let tok = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> PResult<&SpannedToken> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let span = self.current_span();
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current().to_string(),
            line: span.line,
            column: span.column,
            source_line: String::new(),
        }
    }

    fn illegal(&self, message: impl Into<String>) -> ParseError {
        let span = self.current_span();
        ParseError::IllegalDeclaration {
            message: message.into(),
            line: span.line,
            column: span.column,
            source_line: String::new(),
        }
    }

    fn ident_name(&mut self) -> PResult<String> {
        match self.current().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    // ---- statements ----------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Stmt> {
        match self.current().clone() {
            TokenKind::Var | TokenKind::Let | TokenKind::Const => self.parse_var_decl(),
            TokenKind::Function => self.parse_function_decl().map(Stmt::FunctionDecl),
            TokenKind::Class => self.parse_class_decl().map(Stmt::ClassDecl),
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Return(value))
            }
            TokenKind::Break => {
                self.advance();
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Break)
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::Export => self.parse_export(),
            TokenKind::LeftBrace => {
                self.advance();
                self.tracker.enter_scope(false);
                let mut body = Vec::new();
                while !self.check(&TokenKind::RightBrace) && !self.at_eof() {
                    body.push(self.parse_statement()?);
                }
                self.expect(TokenKind::RightBrace, "'}'")?;
                self.tracker.exit_scope();
                Ok(Stmt::Block(body))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn decl_kind_for(kind: &TokenKind) -> DeclarationKind {
        match kind {
            TokenKind::Var => DeclarationKind::Var,
            TokenKind::Let => DeclarationKind::Let,
            TokenKind::Const => DeclarationKind::Const,
            _ => DeclarationKind::None,
        }
    }

    fn parse_var_decl(&mut self) -> PResult<Stmt> {
        let kind = Self::decl_kind_for(self.current());
        let span = self.current_span();
        self.advance();
        let mut declarations = Vec::new();
        loop {
            let name = self.ident_name()?;
            let value = if self.matches(&TokenKind::Equal) { Some(self.parse_assignment()?) } else { None };
            self.tracker.declare_variable(&name, kind, DataType::Any);
            declarations.push((name, value));
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.matches(&TokenKind::Semicolon);
        Ok(Stmt::VarDecl { kind, declarations, span })
    }

    fn parse_param_list(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LeftParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let name = self.ident_name()?;
            let default_value = if self.matches(&TokenKind::Equal) { Some(self.parse_assignment()?) } else { None };
            params.push(Param { name, declared_type: None, default_value });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(params)
    }

    fn parse_function_decl(&mut self) -> PResult<FunctionDecl> {
        let span = self.current_span();
        self.expect(TokenKind::Function, "'function'")?;
        let name = match self.current().clone() {
            TokenKind::Identifier(n) => {
                self.advance();
                Some(n)
            }
            _ => None,
        };
        if let Some(name) = &name {
            self.tracker.register_function_in_current_scope(name);
        }
        let params = self.parse_param_list()?;
        let scope_id = self.tracker.enter_scope(true);
        for p in &params {
            self.tracker.declare_variable(&p.name, DeclarationKind::Let, DataType::Any);
        }
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        self.tracker.exit_scope();
        Ok(FunctionDecl {
            name,
            params,
            return_type: None,
            body,
            is_arrow: false,
            span,
            scope_id: std::cell::RefCell::new(Some(scope_id)),
            function_id: std::cell::RefCell::new(None),
        })
    }

    fn parse_class_decl(&mut self) -> PResult<ClassDecl> {
        let span = self.current_span();
        self.expect(TokenKind::Class, "'class'")?;
        let name = self.ident_name()?;
        let parent = if self.matches(&TokenKind::Extends) { Some(self.ident_name()?) } else { None };
        self.expect(TokenKind::LeftBrace, "'{'")?;

        let mut fields = Vec::new();
        let mut constructor = None;
        let mut methods = Vec::new();
        let mut operator_overloads = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.at_eof() {
            self.matches(&TokenKind::Public);
            self.matches(&TokenKind::Private);
            self.matches(&TokenKind::Protected);
            let is_static = self.matches(&TokenKind::Default) && false;

            if self.check(&TokenKind::Constructor) {
                self.advance();
                let params = self.parse_param_list()?;
                let scope_id = self.tracker.enter_scope(true);
                for p in &params {
                    self.tracker.declare_variable(&p.name, DeclarationKind::Let, DataType::Any);
                }
                self.expect(TokenKind::LeftBrace, "'{'")?;
                let mut body = Vec::new();
                while !self.check(&TokenKind::RightBrace) && !self.at_eof() {
                    body.push(self.parse_statement()?);
                }
                self.expect(TokenKind::RightBrace, "'}'")?;
                self.tracker.exit_scope();
                constructor = Some(FunctionDecl {
                    name: Some("constructor".to_string()),
                    params,
                    return_type: None,
                    body,
                    is_arrow: false,
                    span,
                    scope_id: std::cell::RefCell::new(Some(scope_id)),
                    function_id: std::cell::RefCell::new(None),
                });
            } else if self.check(&TokenKind::Operator) {
                self.advance();
                let op_kind = self.parse_operator_kind()?;
                let params = self.parse_param_list()?;
                let scope_id = self.tracker.enter_scope(true);
                for p in &params {
                    self.tracker.declare_variable(&p.name, DeclarationKind::Let, DataType::Any);
                }
                self.expect(TokenKind::LeftBrace, "'{'")?;
                let mut body = Vec::new();
                while !self.check(&TokenKind::RightBrace) && !self.at_eof() {
                    body.push(self.parse_statement()?);
                }
                self.expect(TokenKind::RightBrace, "'}'")?;
                self.tracker.exit_scope();
                operator_overloads.push(OperatorOverloadDecl {
                    operator: op_kind,
                    function: FunctionDecl {
                        name: None,
                        params,
                        return_type: None,
                        body,
                        is_arrow: false,
                        span,
                        scope_id: std::cell::RefCell::new(Some(scope_id)),
                        function_id: std::cell::RefCell::new(None),
                    },
                });
            } else if self.check(&TokenKind::Identifier(String::new())) {
                let name = self.ident_name()?;
                if self.check(&TokenKind::LeftParen) {
                    let params = self.parse_param_list()?;
                    let scope_id = self.tracker.enter_scope(true);
                    for p in &params {
                        self.tracker.declare_variable(&p.name, DeclarationKind::Let, DataType::Any);
                    }
                    self.expect(TokenKind::LeftBrace, "'{'")?;
                    let mut body = Vec::new();
                    while !self.check(&TokenKind::RightBrace) && !self.at_eof() {
                        body.push(self.parse_statement()?);
                    }
                    self.expect(TokenKind::RightBrace, "'}'")?;
                    self.tracker.exit_scope();
                    methods.push(MethodDecl {
                        name,
                        is_static,
                        function: FunctionDecl {
                            name: None,
                            params,
                            return_type: None,
                            body,
                            is_arrow: false,
                            span,
                            scope_id: std::cell::RefCell::new(Some(scope_id)),
                            function_id: std::cell::RefCell::new(None),
                        },
                    });
                } else {
                    let default_value =
                        if self.matches(&TokenKind::Equal) { Some(self.parse_assignment()?) } else { None };
                    self.matches(&TokenKind::Semicolon);
                    fields.push(ClassField { name, declared_type: None, default_value, is_static });
                }
            } else {
                return Err(self.illegal("expected class member"));
            }
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(ClassDecl { name, parent, fields, constructor, methods, operator_overloads, span })
    }

    fn parse_operator_kind(&mut self) -> PResult<OperatorKind> {
        match self.current().clone() {
            TokenKind::Plus => {
                self.advance();
                Ok(OperatorKind::Add)
            }
            TokenKind::Minus => {
                self.advance();
                Ok(OperatorKind::Sub)
            }
            TokenKind::Star => {
                self.advance();
                Ok(OperatorKind::Mul)
            }
            TokenKind::Slash => {
                self.advance();
                Ok(OperatorKind::Div)
            }
            TokenKind::EqualEqual => {
                self.advance();
                Ok(OperatorKind::Eq)
            }
            TokenKind::Less => {
                self.advance();
                Ok(OperatorKind::Lt)
            }
            TokenKind::Greater => {
                self.advance();
                Ok(OperatorKind::Gt)
            }
            _ => Err(self.unexpected("overloadable operator")),
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect(TokenKind::LeftParen, "'('")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "')'")?;
        let then_branch = self.parse_block_or_single()?;
        let else_branch = if self.matches(&TokenKind::Else) { Some(self.parse_block_or_single()?) } else { None };
        Ok(Stmt::If { cond, then_branch, else_branch })
    }

    fn parse_block_or_single(&mut self) -> PResult<Vec<Stmt>> {
        if self.check(&TokenKind::LeftBrace) {
            match self.parse_statement()? {
                Stmt::Block(body) => Ok(body),
                other => Ok(vec![other]),
            }
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.advance();
        if self.matches(&TokenKind::Each) {
            self.expect(TokenKind::LeftParen, "'('")?;
            let first = self.ident_name()?;
            let (key_binding, value_binding) = if self.matches(&TokenKind::Comma) {
                let second = self.ident_name()?;
                (Some(first), second)
            } else {
                (None, first)
            };
            self.expect(TokenKind::In, "'in'")?;
            let iterable = self.parse_expression()?;
            self.expect(TokenKind::RightParen, "')'")?;
            let scope_id = self.tracker.enter_scope(false);
            self.tracker.current_scope();
            if let Some(k) = &key_binding {
                self.tracker.declare_variable(k, DeclarationKind::Let, DataType::Any);
            }
            self.tracker.declare_variable(&value_binding, DeclarationKind::Let, DataType::Any);
            let body = self.parse_block_or_single()?;
            self.tracker.exit_scope();
            return Ok(Stmt::ForEach {
                key_binding,
                value_binding,
                iterable,
                body,
                scope_id: std::cell::RefCell::new(Some(scope_id)),
            });
        }

        self.expect(TokenKind::LeftParen, "'('")?;
        let scope_id = self.tracker.enter_scope(false);
        let init = if self.check(&TokenKind::Semicolon) {
            self.advance();
            ForInit::None
        } else if matches!(self.current(), TokenKind::Var | TokenKind::Let | TokenKind::Const) {
            let kind = Self::decl_kind_for(self.current());
            self.advance();
            let name = self.ident_name()?;
            let value = if self.matches(&TokenKind::Equal) { Some(self.parse_assignment()?) } else { None };
            self.tracker.declare_variable(&name, kind, DataType::Any);
            self.expect(TokenKind::Semicolon, "';'")?;
            ForInit::Decl { kind, name, value }
        } else {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            ForInit::Expr(expr)
        };
        let cond = if self.check(&TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.expect(TokenKind::Semicolon, "';'")?;
        let update = if self.check(&TokenKind::RightParen) { None } else { Some(self.parse_expression()?) };
        self.expect(TokenKind::RightParen, "')'")?;
        let body = self.parse_block_or_single()?;
        self.tracker.exit_scope();
        Ok(Stmt::ForClassic { init: Box::new(init), cond, update, body, scope_id: std::cell::RefCell::new(Some(scope_id)) })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect(TokenKind::LeftParen, "'('")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "')'")?;
        let body = self.parse_block_or_single()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect(TokenKind::LeftParen, "'('")?;
        let discriminant = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "')'")?;
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut cases = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.at_eof() {
            let test = if self.matches(&TokenKind::Case) {
                let e = self.parse_expression()?;
                self.expect(TokenKind::Colon, "':'")?;
                Some(e)
            } else {
                self.expect(TokenKind::Default, "'case' or 'default'")?;
                self.expect(TokenKind::Colon, "':'")?;
                None
            };
            let mut body = Vec::new();
            if self.check(&TokenKind::LeftBrace) {
                match self.parse_statement()? {
                    Stmt::Block(b) => body = b,
                    other => body.push(other),
                }
            } else {
                while !matches!(self.current(), TokenKind::Case | TokenKind::Default | TokenKind::RightBrace) {
                    body.push(self.parse_statement()?);
                }
            }
            cases.push(CaseClause { test, body });
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(Stmt::Switch { discriminant, cases })
    }

    fn parse_import(&mut self) -> PResult<Stmt> {
        self.advance();
        let clause = if self.check(&TokenKind::LeftBrace) {
            self.advance();
            let mut names = Vec::new();
            while !self.check(&TokenKind::RightBrace) {
                let name = self.ident_name()?;
                let alias = if self.matches(&TokenKind::As) { Some(self.ident_name()?) } else { None };
                names.push((name, alias));
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RightBrace, "'}'")?;
            ImportClause::Named(names)
        } else if self.matches(&TokenKind::Star) {
            self.expect(TokenKind::As, "'as'")?;
            ImportClause::Namespace(self.ident_name()?)
        } else {
            ImportClause::Default(self.ident_name()?)
        };
        self.expect(TokenKind::From, "'from'")?;
        let source = match self.current().clone() {
            TokenKind::String(s) => {
                self.advance();
                s
            }
            _ => return Err(self.unexpected("module path string")),
        };
        self.matches(&TokenKind::Semicolon);
        Ok(Stmt::Import { clause, source })
    }

    fn parse_export(&mut self) -> PResult<Stmt> {
        self.advance();
        if self.matches(&TokenKind::Default) {
            let expr = self.parse_assignment()?;
            self.matches(&TokenKind::Semicolon);
            return Ok(Stmt::Export(ExportStmt::Default(Box::new(expr))));
        }
        if self.check(&TokenKind::LeftBrace) {
            self.advance();
            let mut names = Vec::new();
            while !self.check(&TokenKind::RightBrace) {
                names.push(self.ident_name()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RightBrace, "'}'")?;
            self.matches(&TokenKind::Semicolon);
            return Ok(Stmt::Export(ExportStmt::Named(names)));
        }
        let decl = self.parse_statement()?;
        Ok(Stmt::Export(ExportStmt::Declaration(Box::new(decl))))
    }

    // ---- expressions -----------------------------------------------------

    fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let target = self.parse_ternary()?;
        let compound_op = match self.current() {
            TokenKind::Equal => None,
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Sub),
            TokenKind::StarEqual => Some(BinaryOp::Mul),
            TokenKind::SlashEqual => Some(BinaryOp::Div),
            _ => return Ok(target),
        };
        let span = target.span;
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::new(
            ExprKind::Assignment { decl_kind: DeclarationKind::None, target: Box::new(target), value: Box::new(value), compound_op },
            span,
        ))
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let cond = self.parse_logical_or()?;
        if self.matches(&TokenKind::Question) {
            let span = cond.span;
            let then_branch = self.parse_assignment()?;
            self.expect(TokenKind::Colon, "':'")?;
            let else_branch = self.parse_assignment()?;
            return Ok(Expr::new(
                ExprKind::Ternary { cond: Box::new(cond), then_branch: Box::new(then_branch), else_branch: Box::new(else_branch) },
                span,
            ));
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_logical_and()?;
        while self.matches(&TokenKind::PipePipe) {
            let right = self.parse_logical_and()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.matches(&TokenKind::AmpAmp) {
            let right = self.parse_equality()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current() {
                TokenKind::EqualEqual => BinaryOp::Eq,
                TokenKind::EqualEqualEqual => BinaryOp::StrictEq,
                TokenKind::BangEqual => BinaryOp::NotEq,
                TokenKind::BangEqualEqual => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_addition()?;
        loop {
            let op = match self.current() {
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::LessEqual => BinaryOp::LtEq,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::GreaterEqual => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_addition()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_addition(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplication()?;
        loop {
            let op = match self.current() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplication()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> PResult<Expr> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.current() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_exponent()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    /// Right-associative (spec §4.2).
    fn parse_exponent(&mut self) -> PResult<Expr> {
        let left = self.parse_unary()?;
        if self.matches(&TokenKind::StarStar) {
            let right = self.parse_exponent()?;
            let span = left.span.merge(&right.span);
            return Ok(Expr::new(ExprKind::Binary { op: BinaryOp::Pow, left: Box::new(left), right: Box::new(right) }, span));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let span = self.current_span();
        let op = match self.current() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, span));
        }
        if matches!(self.current(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let is_increment = matches!(self.current(), TokenKind::PlusPlus);
            self.advance();
            let target = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::PostfixIncDec { target: Box::new(target), is_increment }, span));
        }
        if self.matches(&TokenKind::Go) {
            let call = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Go { call: Box::new(call) }, span));
        }
        if self.matches(&TokenKind::Await) {
            let value = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::AwaitExpr { value: Box::new(value) }, span));
        }
        self.parse_call_or_member()
    }

    fn parse_call_or_member(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(&TokenKind::LeftParen) {
                let args = self.parse_args()?;
                let span = expr.span;
                expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args }, span);
            } else if self.matches(&TokenKind::Dot) {
                let name = self.ident_name()?;
                let span = expr.span;
                if self.matches(&TokenKind::LeftParen) {
                    let args = self.parse_args()?;
                    expr = Expr::new(
                        ExprKind::MethodCall { object: Box::new(expr), method: PropertyKey::Name(name), computed_method: None, args },
                        span,
                    );
                } else if self.matches(&TokenKind::Equal) {
                    let value = self.parse_assignment()?;
                    expr = Expr::new(
                        ExprKind::PropertyAssignment { object: Box::new(expr), key: PropertyKey::Name(name), computed_key: None, value: Box::new(value) },
                        span,
                    );
                } else {
                    expr = Expr::new(
                        ExprKind::PropertyAccess { object: Box::new(expr), key: PropertyKey::Name(name), computed_key: None },
                        span,
                    );
                }
            } else if self.check(&TokenKind::LeftBracket) {
                let span = expr.span;
                expr = self.parse_bracket_suffix(expr, span)?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Handles `a[i]`, the `[:]` full-slice token and `a[lo:hi]` slices
    /// (spec §4.2, §3 "Slice expressions").
    fn parse_bracket_suffix(&mut self, object: Expr, span: Span) -> PResult<Expr> {
        self.advance();
        if self.matches(&TokenKind::ColonColonBracket) {
            return Ok(Expr::new(ExprKind::Slice { object: Box::new(object), start: None, end: None }, span));
        }
        let start = if self.check(&TokenKind::Colon) { None } else { Some(Box::new(self.parse_expression()?)) };
        if self.matches(&TokenKind::Colon) {
            let end = if self.check(&TokenKind::RightBracket) { None } else { Some(Box::new(self.parse_expression()?)) };
            self.expect(TokenKind::RightBracket, "']'")?;
            return Ok(Expr::new(ExprKind::Slice { object: Box::new(object), start, end }, span));
        }
        let index = start.ok_or_else(|| self.unexpected("expression"))?;
        self.expect(TokenKind::RightBracket, "']'")?;
        if self.matches(&TokenKind::Equal) {
            let value = self.parse_assignment()?;
            return Ok(Expr::new(
                ExprKind::PropertyAssignment { object: Box::new(object), key: PropertyKey::Computed, computed_key: Some(index), value: Box::new(value) },
                span,
            ));
        }
        Ok(Expr::new(ExprKind::ArrayAccess { object: Box::new(object), index }, span))
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            args.push(self.parse_assignment()?);
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let span = self.current_span();
        match self.current().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(n), span))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), span))
            }
            TokenKind::Template(parts) => {
                self.advance();
                let mut out = Vec::new();
                for part in parts {
                    match part {
                        TemplatePart::String(s) => out.push(TemplatePartAst::Str(s)),
                        TemplatePart::Expression(src) => {
                            let inner_tokens = crate::lexer::tokenize(&src).map_err(|_| self.illegal("invalid template expression"))?;
                            let (sub_program, _) = parse(&inner_tokens, "<template>")?;
                            if let Some(Stmt::Expr(e)) = sub_program.statements.into_iter().next() {
                                out.push(TemplatePartAst::Expr(Box::new(e)));
                            }
                        }
                    }
                }
                Ok(Expr::new(ExprKind::Template(out), span))
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                Ok(Expr::new(ExprKind::Regex { pattern, flags }, span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), span))
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::new(ExprKind::This, span))
            }
            TokenKind::Super => {
                self.advance();
                if self.matches(&TokenKind::Dot) {
                    let method = self.ident_name()?;
                    self.expect(TokenKind::LeftParen, "'('")?;
                    let args = self.parse_args()?;
                    Ok(Expr::new(ExprKind::SuperMethodCall { method, args }, span))
                } else {
                    self.expect(TokenKind::LeftParen, "'('")?;
                    let args = self.parse_args()?;
                    Ok(Expr::new(ExprKind::SuperCall { args }, span))
                }
            }
            TokenKind::New => {
                self.advance();
                let class_name = self.ident_name()?;
                if self.matches(&TokenKind::LeftBrace) {
                    let mut dart_args = Vec::new();
                    while !self.check(&TokenKind::RightBrace) {
                        let key = self.ident_name()?;
                        self.expect(TokenKind::Colon, "':'")?;
                        let value = self.parse_assignment()?;
                        dart_args.push((key, value));
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RightBrace, "'}'")?;
                    Ok(Expr::new(ExprKind::New { class_name, args: Vec::new(), dart_args }, span))
                } else {
                    self.expect(TokenKind::LeftParen, "'('")?;
                    let args = self.parse_args()?;
                    Ok(Expr::new(ExprKind::New { class_name, args, dart_args: Vec::new() }, span))
                }
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::Arrow) {
                    return self.parse_arrow_from_single_param(name, span);
                }
                Ok(Expr::new(ExprKind::Identifier(name), span))
            }
            TokenKind::LeftParen => {
                if let Some(arrow) = self.try_parse_arrow_params(span)? {
                    return Ok(arrow);
                }
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LeftBracket => self.parse_array_literal(span),
            TokenKind::LeftBrace => self.parse_object_literal(span),
            TokenKind::Function => {
                let f = self.parse_function_decl()?;
                Ok(Expr::new(ExprKind::FunctionExpr(f), span))
            }
            TokenKind::Tensor => self.parse_typed_array(span),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_arrow_from_single_param(&mut self, name: String, span: Span) -> PResult<Expr> {
        self.expect(TokenKind::Arrow, "'=>'")?;
        self.finish_arrow(vec![Param { name, declared_type: None, default_value: None }], span)
    }

    /// `(a, b) =>` lookahead: parenthesized arrow parameters are
    /// structurally identical to a parenthesized expression until the
    /// `=>` is seen, so speculatively scan forward and roll back if it's
    /// actually just `(expr)`.
    fn try_parse_arrow_params(&mut self, span: Span) -> PResult<Option<Expr>> {
        let start = self.pos;
        let mut depth = 0i32;
        let mut idx = start;
        loop {
            match &self.tokens[idx].kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        idx += 1;
                        break;
                    }
                }
                TokenKind::Eof => return Ok(None),
                _ => {}
            }
            idx += 1;
        }
        if !matches!(self.tokens.get(idx).map(|t| &t.kind), Some(TokenKind::Arrow)) {
            return Ok(None);
        }
        self.advance();
        let params = self.parse_param_list()?;
        self.expect(TokenKind::Arrow, "'=>'")?;
        self.finish_arrow(params, span).map(Some)
    }

    fn finish_arrow(&mut self, params: Vec<Param>, span: Span) -> PResult<Expr> {
        let scope_id = self.tracker.enter_scope(true);
        for p in &params {
            self.tracker.declare_variable(&p.name, DeclarationKind::Let, DataType::Any);
        }
        let body = if self.check(&TokenKind::LeftBrace) {
            self.advance();
            let mut body = Vec::new();
            while !self.check(&TokenKind::RightBrace) && !self.at_eof() {
                body.push(self.parse_statement()?);
            }
            self.expect(TokenKind::RightBrace, "'}'")?;
            body
        } else {
            vec![Stmt::Return(Some(self.parse_assignment()?))]
        };
        self.tracker.exit_scope();
        Ok(Expr::new(
            ExprKind::ArrowFunction(FunctionDecl {
                name: None,
                params,
                return_type: None,
                body,
                is_arrow: true,
                span,
                scope_id: std::cell::RefCell::new(Some(scope_id)),
                function_id: std::cell::RefCell::new(None),
            }),
            span,
        ))
    }

    fn parse_array_literal(&mut self, span: Span) -> PResult<Expr> {
        self.advance();
        let mut items = Vec::new();
        while !self.check(&TokenKind::RightBracket) {
            items.push(self.parse_assignment()?);
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBracket, "']'")?;
        Ok(Expr::new(ExprKind::ArrayLiteral(items), span))
    }

    fn parse_object_literal(&mut self, span: Span) -> PResult<Expr> {
        self.advance();
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let key = self.ident_name()?;
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.parse_assignment()?;
            fields.push((key, value));
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(Expr::new(ExprKind::ObjectLiteral(fields), span))
    }

    fn parse_typed_array(&mut self, span: Span) -> PResult<Expr> {
        self.advance();
        self.expect(TokenKind::Less, "'<'")?;
        let element_type = match self.ident_name()?.as_str() {
            "f64" | "float64" => DataType::Float64,
            "f32" | "float32" => DataType::Float32,
            "i32" | "int32" => DataType::Int32,
            "i64" | "int64" => DataType::Int64,
            _ => DataType::Any,
        };
        self.expect(TokenKind::Greater, "'>'")?;
        self.expect(TokenKind::LeftBracket, "'['")?;
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RightBracket) {
            elements.push(self.parse_assignment()?);
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBracket, "']'")?;
        Ok(Expr::new(ExprKind::TypedArrayLiteral { element_type, elements }, span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(src: &str) -> Program {
        let tokens = tokenize(src).expect("lex");
        parse(&tokens, "<test>").expect("parse").0
    }

    #[test]
    fn parses_var_decl_with_initializer() {
        let program = parse_source("let x = 1 + 2;");
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0] {
            Stmt::VarDecl { kind, declarations, .. } => {
                assert_eq!(*kind, DeclarationKind::Let);
                assert_eq!(declarations.len(), 1);
            }
            _ => panic!("expected var decl"),
        }
    }

    #[test]
    fn exponent_is_right_associative() {
        let program = parse_source("let x = 2 ** 3 ** 2;");
        if let Stmt::VarDecl { declarations, .. } = &program.statements[0] {
            let (_, Some(expr)) = &declarations[0] else { panic!("no initializer") };
            match &expr.kind {
                ExprKind::Binary { op: BinaryOp::Pow, right, .. } => {
                    assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Pow, .. }));
                }
                _ => panic!("expected pow"),
            }
        } else {
            panic!("expected var decl");
        }
    }

    #[test]
    fn parses_function_and_call() {
        let program = parse_source("function add(a, b) { return a + b; } add(1, 2);");
        assert_eq!(program.statements.len(), 2);
        assert!(matches!(program.statements[0], Stmt::FunctionDecl(_)));
    }

    #[test]
    fn parses_new_with_dart_args() {
        let program = parse_source("new Point{x: 1, y: 2};");
        match &program.statements[0] {
            Stmt::Expr(e) => match &e.kind {
                ExprKind::New { dart_args, .. } => assert_eq!(dart_args.len(), 2),
                _ => panic!("expected new"),
            },
            _ => panic!("expected expr statement"),
        }
    }

    #[test]
    fn parses_full_slice_token() {
        let program = parse_source("let y = x[:];");
        if let Stmt::VarDecl { declarations, .. } = &program.statements[0] {
            let (_, Some(expr)) = &declarations[0] else { panic!("no initializer") };
            assert!(matches!(expr.kind, ExprKind::Slice { start: None, end: None, .. }));
        }
    }

    #[test]
    fn parses_arrow_function_single_param() {
        let program = parse_source("let f = x => x + 1;");
        if let Stmt::VarDecl { declarations, .. } = &program.statements[0] {
            let (_, Some(expr)) = &declarations[0] else { panic!("no initializer") };
            assert!(matches!(expr.kind, ExprKind::ArrowFunction(_)));
        }
    }
}
