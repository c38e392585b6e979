//! Recursive-descent parser for the !~ATH language.

use crate::ast::*;
use crate::lexer::{Token, TokenType, TokenValue};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("[line {line}, col {column}] {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn pos_of(&self, tok: &Token) -> Pos {
        Pos {
            line: tok.line,
            column: tok.column,
        }
    }

    fn check(&self, ty: TokenType) -> bool {
        self.current().ty == ty
    }

    fn check_any(&self, types: &[TokenType]) -> bool {
        types.contains(&self.current().ty)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn matches(&mut self, ty: TokenType) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, ty: TokenType, message: &str) -> PResult<Token> {
        if self.check(ty) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let tok = self.current();
        ParseError {
            message: message.into(),
            line: tok.line,
            column: tok.column,
        }
    }

    fn ident_name(tok: &Token) -> String {
        match &tok.value {
            TokenValue::Str(s) => s.clone(),
            _ => String::new(),
        }
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut statements = Vec::new();
        while !self.check(TokenType::Eof) {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        use TokenType::*;
        if self.check(Import) {
            return self.parse_import();
        }
        if self.check(Bifurcate) {
            return self.parse_bifurcate();
        }
        if self.check(TildeAth) {
            return self.parse_ath_loop();
        }
        if self.check(Birth) {
            return self.parse_var_decl();
        }
        if self.check(Entomb) {
            return self.parse_const_decl();
        }
        if self.check(Rite) {
            return self.parse_rite_def();
        }
        if self.check(Should) {
            return self.parse_conditional();
        }
        if self.check(Attempt) {
            return self.parse_attempt_salvage();
        }
        if self.check(Condemn) {
            return self.parse_condemn();
        }
        if self.check(Bequeath) {
            return self.parse_bequeath();
        }
        if self.check(Identifier) || self.check(LBracket) {
            return self.parse_die_or_assignment_or_expr();
        }
        if self.check(This) {
            return self.parse_die_or_expr();
        }
        Err(self.error(format!("Unexpected token: {:?}", self.current().ty)))
    }

    /// Statements allowed inside EXECUTE(...), RITE bodies, SHOULD/ATTEMPT
    /// blocks: identical to top-level statements, the AthLoop path is kept
    /// separate to mirror the original grammar's two entry points.
    fn parse_execute_statement(&mut self) -> PResult<Stmt> {
        self.parse_statement()
    }

    fn parse_import(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);

        use TokenType::*;
        if !self.check_any(&[Timer, Process, Connection, Watcher]) {
            return Err(self.error("Expected entity type (timer, process, connection, watcher)"));
        }
        let entity_type_tok = self.advance();
        let entity_type = match entity_type_tok.ty {
            Timer => EntityKindLiteral::Timer,
            Process => EntityKindLiteral::Process,
            Connection => EntityKindLiteral::Connection,
            Watcher => EntityKindLiteral::Watcher,
            _ => unreachable!(),
        };

        let name_token = self.consume(Identifier, "Expected entity name")?;
        let name = Self::ident_name(&name_token);

        self.consume(LParen, "Expected '(' after entity name")?;

        let mut args = Vec::new();
        if entity_type == EntityKindLiteral::Timer {
            if self.check(Duration) {
                let dur_token = self.advance();
                let (unit, value) = match dur_token.value {
                    TokenValue::Duration(u, v) => (u, v),
                    _ => unreachable!(),
                };
                args.push(Expr::Literal {
                    value: LiteralValue::Int(unit.to_ms(value)),
                    pos: self.pos_of(&dur_token),
                });
            } else if self.check(Integer) {
                let int_token = self.advance();
                let value = match int_token.value {
                    TokenValue::Int(v) => v,
                    _ => unreachable!(),
                };
                args.push(Expr::Literal {
                    value: LiteralValue::Int(value),
                    pos: self.pos_of(&int_token),
                });
            } else {
                return Err(self.error("Expected duration for timer"));
            }
        } else if !self.check(RParen) {
            args.push(self.parse_expression()?);
            while self.matches(Comma) {
                args.push(self.parse_expression()?);
            }
        }

        self.consume(RParen, "Expected ')' after import arguments")?;
        self.consume(Semicolon, "Expected ';' after import statement")?;

        Ok(Stmt::Import {
            entity_type,
            name,
            args,
            pos,
        })
    }

    fn parse_bifurcate(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);

        let entity = if self.check(TokenType::This) {
            self.advance();
            "THIS".to_string()
        } else {
            Self::ident_name(&self.consume(TokenType::Identifier, "Expected entity to bifurcate")?)
        };

        self.consume(TokenType::LBracket, "Expected '[' after entity")?;
        let branch1 = Self::ident_name(&self.consume(TokenType::Identifier, "Expected first branch name")?);
        self.consume(TokenType::Comma, "Expected ',' between branch names")?;
        let branch2 = Self::ident_name(&self.consume(TokenType::Identifier, "Expected second branch name")?);
        self.consume(TokenType::RBracket, "Expected ']' after branch names")?;
        self.consume(TokenType::Semicolon, "Expected ';' after bifurcate statement")?;

        Ok(Stmt::Bifurcate {
            entity,
            branch1,
            branch2,
            pos,
        })
    }

    fn parse_ath_loop(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);

        self.consume(TokenType::LParen, "Expected '(' after ~ATH")?;
        let entity_expr = self.parse_entity_expr()?;
        self.consume(TokenType::RParen, "Expected ')' after entity expression")?;

        self.consume(TokenType::LBrace, "Expected '{' for ~ATH body")?;
        let mut body = Vec::new();
        while !self.check(TokenType::RBrace) {
            body.push(self.parse_statement()?);
        }
        self.consume(TokenType::RBrace, "Expected '}' after ~ATH body")?;

        self.consume(TokenType::Execute, "Expected 'EXECUTE' after ~ATH body")?;
        self.consume(TokenType::LParen, "Expected '(' after EXECUTE")?;
        let execute = self.parse_execute_body()?;
        self.consume(TokenType::RParen, "Expected ')' after EXECUTE body")?;
        self.consume(TokenType::Semicolon, "Expected ';' after ~ATH loop")?;

        Ok(Stmt::AthLoop {
            entity_expr,
            body,
            execute,
            pos,
        })
    }

    fn parse_execute_body(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(TokenType::RParen) {
            stmts.push(self.parse_execute_statement()?);
            if self.check(TokenType::RParen) {
                break;
            }
        }
        Ok(stmts)
    }

    fn parse_var_decl(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);
        let name = Self::ident_name(&self.consume(TokenType::Identifier, "Expected variable name")?);
        self.consume(TokenType::With, "Expected 'WITH' after variable name")?;
        let value = self.parse_expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after variable declaration")?;
        Ok(Stmt::VarDecl { name, value, pos })
    }

    fn parse_const_decl(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);
        let name = Self::ident_name(&self.consume(TokenType::Identifier, "Expected constant name")?);
        self.consume(TokenType::With, "Expected 'WITH' after constant name")?;
        let value = self.parse_expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after constant declaration")?;
        Ok(Stmt::ConstDecl { name, value, pos })
    }

    fn parse_rite_def(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);
        let name = Self::ident_name(&self.consume(TokenType::Identifier, "Expected rite name")?);
        self.consume(TokenType::LParen, "Expected '(' after rite name")?;

        let mut params = Vec::new();
        if !self.check(TokenType::RParen) {
            params.push(Self::ident_name(
                &self.consume(TokenType::Identifier, "Expected parameter name")?,
            ));
            while self.matches(TokenType::Comma) {
                params.push(Self::ident_name(
                    &self.consume(TokenType::Identifier, "Expected parameter name")?,
                ));
            }
        }
        self.consume(TokenType::RParen, "Expected ')' after parameters")?;
        self.consume(TokenType::LBrace, "Expected '{' for rite body")?;

        let mut body = Vec::new();
        while !self.check(TokenType::RBrace) {
            body.push(self.parse_execute_statement()?);
        }
        self.consume(TokenType::RBrace, "Expected '}' after rite body")?;

        Ok(Stmt::RiteDef {
            name,
            params,
            body,
            pos,
        })
    }

    fn parse_conditional(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);

        let condition = self.parse_expression()?;
        self.consume(TokenType::LBrace, "Expected '{' after condition")?;
        let mut then_branch = Vec::new();
        while !self.check(TokenType::RBrace) {
            then_branch.push(self.parse_execute_statement()?);
        }
        self.consume(TokenType::RBrace, "Expected '}' after then branch")?;

        let mut else_branch = None;
        if self.matches(TokenType::Lest) {
            if self.check(TokenType::Should) {
                else_branch = Some(vec![self.parse_conditional()?]);
            } else {
                self.consume(TokenType::LBrace, "Expected '{' after LEST")?;
                let mut stmts = Vec::new();
                while !self.check(TokenType::RBrace) {
                    stmts.push(self.parse_execute_statement()?);
                }
                self.consume(TokenType::RBrace, "Expected '}' after else branch")?;
                else_branch = Some(stmts);
            }
        }

        Ok(Stmt::Conditional {
            condition,
            then_branch,
            else_branch,
            pos,
        })
    }

    fn parse_attempt_salvage(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);

        self.consume(TokenType::LBrace, "Expected '{' after ATTEMPT")?;
        let mut attempt_body = Vec::new();
        while !self.check(TokenType::RBrace) {
            attempt_body.push(self.parse_execute_statement()?);
        }
        self.consume(TokenType::RBrace, "Expected '}' after ATTEMPT body")?;
        self.consume(TokenType::Salvage, "Expected 'SALVAGE' after ATTEMPT block")?;

        let error_name =
            Self::ident_name(&self.consume(TokenType::Identifier, "Expected error variable name")?);

        self.consume(TokenType::LBrace, "Expected '{' after error variable")?;
        let mut salvage_body = Vec::new();
        while !self.check(TokenType::RBrace) {
            salvage_body.push(self.parse_execute_statement()?);
        }
        self.consume(TokenType::RBrace, "Expected '}' after SALVAGE body")?;

        Ok(Stmt::AttemptSalvage {
            attempt_body,
            error_name,
            salvage_body,
            pos,
        })
    }

    fn parse_condemn(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);
        let message = self.parse_expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after CONDEMN")?;
        Ok(Stmt::Condemn { message, pos })
    }

    fn parse_bequeath(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let pos = self.pos_of(&token);
        let value = if !self.check(TokenType::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expected ';' after BEQUEATH")?;
        Ok(Stmt::Bequeath { value, pos })
    }

    fn parse_die_or_assignment_or_expr(&mut self) -> PResult<Stmt> {
        if self.check(TokenType::LBracket) {
            let target = self.parse_die_target()?;
            let pos = target_pos(&target);
            self.consume(TokenType::Dot, "Expected '.' after die target")?;
            self.consume(TokenType::Die, "Expected 'DIE' after '.'")?;
            self.consume(TokenType::LParen, "Expected '(' after DIE")?;
            self.consume(TokenType::RParen, "Expected ')' after DIE(")?;
            self.consume(TokenType::Semicolon, "Expected ';' after DIE statement")?;
            return Ok(Stmt::Die { target, pos });
        }

        let expr = self.parse_expression()?;

        if let Expr::Member { member, .. } = &expr {
            if member == "DIE" {
                return Err(self.error("DIE must be called as ENTITY.DIE(), not used as expression"));
            }
        }

        if self.check(TokenType::Assign) {
            self.advance();
            let value = self.parse_expression()?;
            self.consume(TokenType::Semicolon, "Expected ';' after assignment")?;
            let pos = expr.pos();
            return Ok(Stmt::Assignment { target: expr, value, pos });
        }

        if let Expr::Call { callee, pos, .. } = &expr {
            if let Expr::Member { object, member, .. } = callee.as_ref() {
                if member == "DIE" {
                    if let Expr::Identifier { name, pos: obj_pos } = object.as_ref() {
                        let target = DieTarget::Ident {
                            name: name.clone(),
                            pos: *obj_pos,
                        };
                        self.consume(TokenType::Semicolon, "Expected ';' after DIE statement")?;
                        return Ok(Stmt::Die { target, pos: *pos });
                    } else {
                        return Err(self.error("Invalid DIE target"));
                    }
                }
            }
        }

        self.consume(TokenType::Semicolon, "Expected ';' after expression")?;
        let pos = expr.pos();
        Ok(Stmt::ExprStmt { expression: expr, pos })
    }

    fn parse_die_or_expr(&mut self) -> PResult<Stmt> {
        let pos = self.pos_of(self.current());
        let expr = self.parse_expression()?;

        if self.check(TokenType::Assign) {
            self.advance();
            let value = self.parse_expression()?;
            self.consume(TokenType::Semicolon, "Expected ';' after assignment")?;
            return Ok(Stmt::Assignment { target: expr, value, pos });
        }

        if let Expr::Call { callee, .. } = &expr {
            if let Expr::Member { object, member, .. } = callee.as_ref() {
                if member == "DIE" {
                    if let Expr::Identifier { name, pos: obj_pos } = object.as_ref() {
                        if name == "THIS" {
                            let target = DieTarget::Ident {
                                name: "THIS".to_string(),
                                pos: *obj_pos,
                            };
                            self.consume(TokenType::Semicolon, "Expected ';' after DIE statement")?;
                            return Ok(Stmt::Die { target, pos });
                        }
                    }
                }
            }
        }

        self.consume(TokenType::Semicolon, "Expected ';' after expression")?;
        Ok(Stmt::ExprStmt { expression: expr, pos })
    }

    fn parse_die_target(&mut self) -> PResult<DieTarget> {
        if self.check(TokenType::LBracket) {
            let token = self.advance();
            let pos = self.pos_of(&token);
            let left = self.parse_die_target()?;
            self.consume(TokenType::Comma, "Expected ',' in die target pair")?;
            let right = self.parse_die_target()?;
            self.consume(TokenType::RBracket, "Expected ']' after die target pair")?;
            Ok(DieTarget::Pair {
                left: Box::new(left),
                right: Box::new(right),
                pos,
            })
        } else if self.check(TokenType::This) {
            let token = self.advance();
            Ok(DieTarget::Ident {
                name: "THIS".to_string(),
                pos: self.pos_of(&token),
            })
        } else {
            let token = self.consume(TokenType::Identifier, "Expected identifier in die target")?;
            let name = Self::ident_name(&token);
            Ok(DieTarget::Ident {
                name,
                pos: self.pos_of(&token),
            })
        }
    }

    // ===== Entity expressions =====

    fn parse_entity_expr(&mut self) -> PResult<EntityExpr> {
        self.parse_entity_or()
    }

    fn parse_entity_or(&mut self) -> PResult<EntityExpr> {
        let mut left = self.parse_entity_and()?;
        while self.matches(TokenType::PipePipe) {
            let right = self.parse_entity_and()?;
            left = EntityExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_entity_and(&mut self) -> PResult<EntityExpr> {
        let mut left = self.parse_entity_unary()?;
        while self.matches(TokenType::AmpAmp) {
            let right = self.parse_entity_unary()?;
            left = EntityExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_entity_unary(&mut self) -> PResult<EntityExpr> {
        if self.check(TokenType::Bang) {
            let token = self.advance();
            let operand = self.parse_entity_unary()?;
            return Ok(EntityExpr::Not(Box::new(operand), self.pos_of(&token)));
        }
        self.parse_entity_primary()
    }

    fn parse_entity_primary(&mut self) -> PResult<EntityExpr> {
        if self.matches(TokenType::LParen) {
            let expr = self.parse_entity_expr()?;
            self.consume(TokenType::RParen, "Expected ')' after entity expression")?;
            return Ok(expr);
        }
        if self.check(TokenType::This) {
            let token = self.advance();
            return Ok(EntityExpr::Ident {
                name: "THIS".to_string(),
                pos: self.pos_of(&token),
            });
        }
        let token = self.consume(TokenType::Identifier, "Expected entity identifier")?;
        let name = Self::ident_name(&token);
        Ok(EntityExpr::Ident {
            name,
            pos: self.pos_of(&token),
        })
    }

    // ===== Expressions =====

    fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check(TokenType::Or) {
            let token = self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: "OR".into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(TokenType::And) {
            let token = self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: "AND".into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.check_any(&[TokenType::Eq, TokenType::Ne]) {
            let token = self.advance();
            let op = if token.ty == TokenType::Eq { "==" } else { "!=" };
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op: op.into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitwise_or()?;
        while self.check_any(&[TokenType::Lt, TokenType::Gt, TokenType::Le, TokenType::Ge]) {
            let token = self.advance();
            let op = match token.ty {
                TokenType::Lt => "<",
                TokenType::Gt => ">",
                TokenType::Le => "<=",
                TokenType::Ge => ">=",
                _ => unreachable!(),
            };
            let right = self.parse_bitwise_or()?;
            left = Expr::Binary {
                op: op.into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_bitwise_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitwise_xor()?;
        while self.check(TokenType::Pipe) {
            let token = self.advance();
            let right = self.parse_bitwise_xor()?;
            left = Expr::Binary {
                op: "|".into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_bitwise_xor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitwise_and()?;
        while self.check(TokenType::Caret) {
            let token = self.advance();
            let right = self.parse_bitwise_and()?;
            left = Expr::Binary {
                op: "^".into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_bitwise_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_shift()?;
        while self.check(TokenType::Amp) {
            let token = self.advance();
            let right = self.parse_shift()?;
            left = Expr::Binary {
                op: "&".into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut left = self.parse_term()?;
        while self.check_any(&[TokenType::Lshift, TokenType::Rshift]) {
            let token = self.advance();
            let op = if token.ty == TokenType::Lshift { "<<" } else { ">>" };
            let right = self.parse_term()?;
            left = Expr::Binary {
                op: op.into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        let mut left = self.parse_factor()?;
        while self.check_any(&[TokenType::Plus, TokenType::Minus]) {
            let token = self.advance();
            let op = if token.ty == TokenType::Plus { "+" } else { "-" };
            let right = self.parse_factor()?;
            left = Expr::Binary {
                op: op.into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.check_any(&[TokenType::Star, TokenType::Slash, TokenType::Percent]) {
            let token = self.advance();
            let op = match token.ty {
                TokenType::Star => "*",
                TokenType::Slash => "/",
                TokenType::Percent => "%",
                _ => unreachable!(),
            };
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op: op.into(),
                left: Box::new(left),
                right: Box::new(right),
                pos: self.pos_of(&token),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.check(TokenType::Not) {
            let token = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: "NOT".into(),
                operand: Box::new(operand),
                pos: self.pos_of(&token),
            });
        }
        if self.check(TokenType::Minus) {
            let token = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: "-".into(),
                operand: Box::new(operand),
                pos: self.pos_of(&token),
            });
        }
        if self.check(TokenType::Tilde) {
            let token = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: "~".into(),
                operand: Box::new(operand),
                pos: self.pos_of(&token),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenType::LBracket) {
                let index = self.parse_expression()?;
                self.consume(TokenType::RBracket, "Expected ']' after index")?;
                let pos = expr.pos();
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    pos,
                };
            } else if self.matches(TokenType::Dot) {
                if self.check(TokenType::Die) {
                    let die_token = self.advance();
                    if self.check(TokenType::LParen) {
                        self.advance();
                        self.consume(TokenType::RParen, "Expected ')' after DIE(")?;
                        let member_expr = Expr::Member {
                            object: Box::new(expr),
                            member: "DIE".into(),
                            pos: self.pos_of(&die_token),
                        };
                        expr = Expr::Call {
                            callee: Box::new(member_expr),
                            args: Vec::new(),
                            pos: self.pos_of(&die_token),
                        };
                    } else {
                        return Err(self.error("Expected '(' after DIE"));
                    }
                } else {
                    let member = self.consume(TokenType::Identifier, "Expected member name after '.'")?;
                    let pos = self.pos_of(&member);
                    expr = Expr::Member {
                        object: Box::new(expr),
                        member: Self::ident_name(&member),
                        pos,
                    };
                }
            } else if self.matches(TokenType::LParen) {
                let pos = expr.pos();
                let mut args = Vec::new();
                if !self.check(TokenType::RParen) {
                    args.push(self.parse_expression()?);
                    while self.matches(TokenType::Comma) {
                        args.push(self.parse_expression()?);
                    }
                }
                self.consume(TokenType::RParen, "Expected ')' after arguments")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    pos,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.current().clone();
        let pos = self.pos_of(&token);

        if self.matches(TokenType::Integer) {
            let v = match token.value {
                TokenValue::Int(v) => v,
                _ => unreachable!(),
            };
            return Ok(Expr::Literal {
                value: LiteralValue::Int(v),
                pos,
            });
        }
        if self.matches(TokenType::Float) {
            let v = match token.value {
                TokenValue::Float(v) => v,
                _ => unreachable!(),
            };
            return Ok(Expr::Literal {
                value: LiteralValue::Float(v),
                pos,
            });
        }
        if self.matches(TokenType::String) {
            let v = match token.value {
                TokenValue::Str(ref s) => s.clone(),
                _ => unreachable!(),
            };
            return Ok(Expr::Literal {
                value: LiteralValue::Str(v),
                pos,
            });
        }
        if self.matches(TokenType::Alive) {
            return Ok(Expr::Literal {
                value: LiteralValue::Bool(true),
                pos,
            });
        }
        if self.matches(TokenType::Dead) {
            return Ok(Expr::Literal {
                value: LiteralValue::Bool(false),
                pos,
            });
        }
        if self.matches(TokenType::Void) {
            return Ok(Expr::Literal {
                value: LiteralValue::Void,
                pos,
            });
        }
        if self.matches(TokenType::This) {
            return Ok(Expr::Identifier {
                name: "THIS".into(),
                pos,
            });
        }
        if self.matches(TokenType::Identifier) {
            return Ok(Expr::Identifier {
                name: Self::ident_name(&token),
                pos,
            });
        }
        if self.matches(TokenType::LParen) {
            let expr = self.parse_expression()?;
            self.consume(TokenType::RParen, "Expected ')' after expression")?;
            return Ok(expr);
        }
        if self.matches(TokenType::LBracket) {
            return self.parse_array_literal(pos);
        }
        if self.matches(TokenType::LBrace) {
            return self.parse_map_literal(pos);
        }

        Err(self.error(format!("Unexpected token in expression: {:?}", token.ty)))
    }

    fn parse_array_literal(&mut self, pos: Pos) -> PResult<Expr> {
        let mut elements = Vec::new();
        if !self.check(TokenType::RBracket) {
            elements.push(self.parse_expression()?);
            while self.matches(TokenType::Comma) {
                if self.check(TokenType::RBracket) {
                    break;
                }
                elements.push(self.parse_expression()?);
            }
        }
        self.consume(TokenType::RBracket, "Expected ']' after array elements")?;
        Ok(Expr::ArrayLiteral { elements, pos })
    }

    fn parse_map_literal(&mut self, pos: Pos) -> PResult<Expr> {
        let mut entries = Vec::new();
        if !self.check(TokenType::RBrace) {
            let key = self.parse_map_key()?;
            self.consume(TokenType::Colon, "Expected ':' after map key")?;
            let value = self.parse_expression()?;
            entries.push((key, value));

            while self.matches(TokenType::Comma) {
                if self.check(TokenType::RBrace) {
                    break;
                }
                let key = self.parse_map_key()?;
                self.consume(TokenType::Colon, "Expected ':' after map key")?;
                let value = self.parse_expression()?;
                entries.push((key, value));
            }
        }
        self.consume(TokenType::RBrace, "Expected '}' after map entries")?;
        Ok(Expr::MapLiteral { entries, pos })
    }

    fn parse_map_key(&mut self) -> PResult<String> {
        if self.check(TokenType::String) {
            let tok = self.advance();
            return Ok(Self::ident_name(&tok));
        }
        if self.check(TokenType::Identifier) {
            let tok = self.advance();
            return Ok(Self::ident_name(&tok));
        }
        Err(self.error("Expected map key (identifier or string)"))
    }
}

fn target_pos(target: &DieTarget) -> Pos {
    match target {
        DieTarget::Ident { pos, .. } => *pos,
        DieTarget::Pair { pos, .. } => *pos,
    }
}

pub fn parse(source: &str) -> Result<Program, crate::error::SyntaxError> {
    let tokens = crate::lexer::tokenize(source)?;
    let mut parser = Parser::new(tokens);
    Ok(parser.parse_program()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_var_decl() {
        let program = parse("BIRTH x WITH 5;").unwrap();
        assert_eq!(program.statements.len(), 1);
        assert!(matches!(program.statements[0], Stmt::VarDecl { .. }));
    }

    #[test]
    fn parses_ath_loop_with_execute() {
        let src = "import timer t(100ms); ~ATH(t) { } EXECUTE(UTTER(\"done\"));";
        let program = parse(src).unwrap();
        assert_eq!(program.statements.len(), 2);
        assert!(matches!(program.statements[1], Stmt::AthLoop { .. }));
    }

    #[test]
    fn parses_entity_composition() {
        let src = "import timer a(1s); import timer b(2s); ~ATH(a && !b) { } EXECUTE();";
        let program = parse(src).unwrap();
        match &program.statements[2] {
            Stmt::AthLoop { entity_expr, .. } => {
                assert!(matches!(entity_expr, EntityExpr::And(_, _)));
            }
            _ => panic!("expected AthLoop"),
        }
    }

    #[test]
    fn rejects_die_as_expression() {
        let err = parse("BIRTH x WITH a.DIE;").unwrap_err();
        assert!(matches!(err, crate::error::SyntaxError::Parse(_)));
    }

    #[test]
    fn parses_die_pair() {
        let program = parse("[[a, b], c].DIE();").unwrap();
        assert!(matches!(program.statements[0], Stmt::Die { .. }));
    }
}
