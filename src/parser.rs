use std::rc::Rc;

use crate::diagnostics::Diagnostics;
use crate::error::LoxError;
use crate::syntax::{Expr, FunctionDecl, LiteralValue, Stmt};
use crate::token::{Token, TokenType};

const MAX_ARGS: usize = 255;

/// Recursive-descent, predictive, one token of lookahead.
pub struct Parser<'t, 'd> {
    tokens: &'t [Token],
    current: usize,
    diagnostics: &'d mut Diagnostics,
}

macro_rules! matches_type {
    ( $sel:ident, $( $x:pat ),+ $(,)? ) => {
        {
            if $( $sel.check_pat(|t| matches!(t, $x)) )||+ {
                $sel.advance();
                true
            } else {
                false
            }
        }
    };
}

impl<'t, 'd> Parser<'t, 'd> {
    pub fn new(tokens: &'t [Token], diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            tokens,
            current: 0,
            diagnostics,
        }
    }

    // program := declaration* EOF
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(LoxError::Parse) => self.synchronize(),
                Err(_) => unreachable!("parser only ever produces LoxError::Parse"),
            }
        }
        statements
    }

    // declaration := classDecl | funDecl | varDecl | statement
    fn declaration(&mut self) -> Result<Stmt, LoxError> {
        if matches_type!(self, TokenType::Class) {
            self.class_declaration()
        } else if matches_type!(self, TokenType::Fun) {
            self.function("function")
                .map(|declaration| Stmt::Function { declaration: Rc::new(declaration) })
        } else if matches_type!(self, TokenType::Var) {
            self.var_declaration()
        } else {
            self.statement()
        }
    }

    // classDecl := "class" IDENT ( "<" IDENT )? "{" function* "}"
    fn class_declaration(&mut self) -> Result<Stmt, LoxError> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;

        let superclass = if matches_type!(self, TokenType::Less) {
            let super_name = self.consume(TokenType::Identifier, "Expect superclass name.")?;
            Some(Expr::Variable { name: super_name })
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;
        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            methods.push(Rc::new(self.function("method")?));
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    // function := IDENT "(" params? ")" block
    fn function(&mut self, kind: &str) -> Result<FunctionDecl, LoxError> {
        let name = self.consume(TokenType::Identifier, &format!("Expect {kind} name."))?;
        self.consume(TokenType::LeftParen, &format!("Expect '(' after {kind} name."))?;

        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= MAX_ARGS {
                    self.error(self.peek().clone(), "Can't have more than 255 parameters.");
                }
                params.push(self.consume(TokenType::Identifier, "Expect parameter name.")?);
                if !matches_type!(self, TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;

        self.consume(TokenType::LeftBrace, &format!("Expect '{{' before {kind} body."))?;
        let body = self.block()?;

        Ok(FunctionDecl { name, params, body })
    }

    // varDecl := "var" IDENT ( "=" expression )? ";"
    fn var_declaration(&mut self) -> Result<Stmt, LoxError> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;
        let initializer = if matches_type!(self, TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration.")?;
        Ok(Stmt::Var { name, initializer })
    }

    // statement := exprStmt | forStmt | ifStmt | printStmt | returnStmt | whileStmt | block
    fn statement(&mut self) -> Result<Stmt, LoxError> {
        if matches_type!(self, TokenType::For) {
            self.for_statement()
        } else if matches_type!(self, TokenType::If) {
            self.if_statement()
        } else if matches_type!(self, TokenType::Print) {
            self.print_statement()
        } else if matches_type!(self, TokenType::Return) {
            self.return_statement()
        } else if matches_type!(self, TokenType::While) {
            self.while_statement()
        } else if matches_type!(self, TokenType::LeftBrace) {
            Ok(Stmt::Block {
                statements: self.block()?,
            })
        } else {
            self.expression_statement()
        }
    }

    fn print_statement(&mut self) -> Result<Stmt, LoxError> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print { expression: value })
    }

    fn return_statement(&mut self) -> Result<Stmt, LoxError> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn if_statement(&mut self) -> Result<Stmt, LoxError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if matches_type!(self, TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, LoxError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    // No For node is built: the parser desugars directly into a block
    // wrapping a while loop, so the evaluator only ever sees primitives it
    // already knows how to run.
    fn for_statement(&mut self) -> Result<Stmt, LoxError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if matches_type!(self, TokenType::Semicolon) {
            None
        } else if matches_type!(self, TokenType::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block {
                statements: vec![body, Stmt::Expression { expression: increment }],
            };
        }

        body = Stmt::While {
            condition: condition.unwrap_or(Expr::Literal {
                value: LiteralValue::Boolean(true),
            }),
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block {
                statements: vec![initializer, body],
            };
        }

        Ok(body)
    }

    fn block(&mut self) -> Result<Vec<Stmt>, LoxError> {
        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(LoxError::Parse) => {
                    self.synchronize();
                }
                Err(_) => unreachable!(),
            }
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn expression_statement(&mut self) -> Result<Stmt, LoxError> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression { expression: value })
    }

    fn expression(&mut self) -> Result<Expr, LoxError> {
        self.assignment()
    }

    // assignment := ( call "." )? IDENT "=" assignment | logic_or
    //
    // We parse the left-hand side as a plain expression first, then check
    // whether it's followed by `=`. That works because every valid
    // assignment target also happens to parse as a valid expression.
    fn assignment(&mut self) -> Result<Expr, LoxError> {
        let expr = self.logic_or()?;

        if matches_type!(self, TokenType::Equal) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            return match expr {
                Expr::Variable { name } => Ok(Expr::Assign { name, value }),
                Expr::Get { object, name } => Ok(Expr::Set { object, name, value }),
                _ => {
                    // Not in a confused parser state, so we report without
                    // synchronizing.
                    self.diagnostics.parser_error(&equals, "Invalid assignment target.");
                    Ok(expr)
                }
            };
        }

        Ok(expr)
    }

    fn logic_or(&mut self) -> Result<Expr, LoxError> {
        let mut expr = self.logic_and()?;
        while matches_type!(self, TokenType::Or) {
            let operator = self.previous().clone();
            let right = self.logic_and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn logic_and(&mut self) -> Result<Expr, LoxError> {
        let mut expr = self.equality()?;
        while matches_type!(self, TokenType::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, LoxError> {
        let mut expr = self.comparison()?;
        while matches_type!(self, TokenType::BangEqual, TokenType::EqualEqual) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, LoxError> {
        let mut expr = self.term()?;
        while matches_type!(
            self,
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual
        ) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, LoxError> {
        let mut expr = self.factor()?;
        while matches_type!(self, TokenType::Minus, TokenType::Plus) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, LoxError> {
        let mut expr = self.unary()?;
        while matches_type!(self, TokenType::Slash, TokenType::Star) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, LoxError> {
        if matches_type!(self, TokenType::Bang, TokenType::Minus) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.call()
    }

    // call := primary ( "(" args? ")" | "." IDENT )*
    fn call(&mut self) -> Result<Expr, LoxError> {
        let mut expr = self.primary()?;

        loop {
            if matches_type!(self, TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if matches_type!(self, TokenType::Dot) {
                let name = self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, LoxError> {
        let mut arguments = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() >= MAX_ARGS {
                    self.error(self.peek().clone(), "Can't have more than 255 arguments.");
                }
                arguments.push(self.expression()?);
                if !matches_type!(self, TokenType::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    // primary := NUMBER | STRING | "true" | "false" | "nil" | "this" | IDENT
    //          | "(" expression ")" | "super" "." IDENT
    fn primary(&mut self) -> Result<Expr, LoxError> {
        if matches_type!(self, TokenType::False) {
            return Ok(Expr::Literal { value: LiteralValue::Boolean(false) });
        }
        if matches_type!(self, TokenType::True) {
            return Ok(Expr::Literal { value: LiteralValue::Boolean(true) });
        }
        if matches_type!(self, TokenType::Nil) {
            return Ok(Expr::Literal { value: LiteralValue::Nil });
        }
        if let TokenType::Number { literal } = self.peek().token_type.clone() {
            self.advance();
            return Ok(Expr::Literal { value: LiteralValue::Number(literal) });
        }
        if let TokenType::String { literal } = self.peek().token_type.clone() {
            self.advance();
            return Ok(Expr::Literal { value: LiteralValue::String(literal) });
        }
        if matches_type!(self, TokenType::Super) {
            let keyword = self.previous().clone();
            self.consume(TokenType::Dot, "Expect '.' after 'super'.")?;
            let method = self.consume(TokenType::Identifier, "Expect superclass method name.")?;
            return Ok(Expr::Super { keyword, method });
        }
        if matches_type!(self, TokenType::This) {
            return Ok(Expr::This { keyword: self.previous().clone() });
        }
        if matches_type!(self, TokenType::Identifier) {
            return Ok(Expr::Variable { name: self.previous().clone() });
        }
        if matches_type!(self, TokenType::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(Expr::Grouping { expression: Box::new(expr) });
        }

        Err(self.error(self.peek().clone(), "Expect expression."))
    }

    // On a parse error at a declaration boundary, synchronize: advance past
    // the offending tokens until we're at a statement boundary so the caller
    // can keep collecting further errors in one pass.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn check(&self, token_type: TokenType) -> bool {
        !self.is_at_end() && self.peek().token_type == token_type
    }

    fn check_pat(&self, pred: impl Fn(&TokenType) -> bool) -> bool {
        !self.is_at_end() && pred(&self.peek().token_type)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<Token, LoxError> {
        if self.check(token_type) {
            Ok(self.advance().clone())
        } else {
            Err(self.error(self.peek().clone(), message))
        }
    }

    fn error(&mut self, token: Token, message: &str) -> LoxError {
        self.diagnostics.parser_error(&token, message);
        LoxError::Parse
    }
}

/// Convenience wrapper used by callers that don't need to reuse a `Parser`
/// across multiple calls (the common case — `Lox::run` parses once).
pub fn parse(tokens: &[Token], diagnostics: &mut Diagnostics) -> Vec<Stmt> {
    Parser::new(tokens, diagnostics).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::scanner::Scanner;

    fn parse_src(src: &str) -> (Vec<Stmt>, bool) {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new(src, &mut diagnostics).scan_tokens();
        let stmts = parse(&tokens, &mut diagnostics);
        (stmts, diagnostics.had_error)
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let (stmts, had_error) = parse_src("print 1 + 2 * 3;");
        assert!(!had_error);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn for_loop_desugars_to_block_and_while() {
        let (stmts, had_error) = parse_src("for (var i = 0; i < 5; i = i + 1) print i;");
        assert!(!had_error);
        match &stmts[0] {
            Stmt::Block { statements } => {
                assert_eq!(statements.len(), 2);
                assert!(matches!(statements[1], Stmt::While { .. }));
            }
            other => panic!("expected desugared block, got {other:?}"),
        }
    }

    #[test]
    fn invalid_assignment_target_is_reported_without_synchronizing() {
        let (stmts, had_error) = parse_src("1 = 2;\nprint 3;");
        assert!(had_error);
        // Parsing still continues and collects the next statement.
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn missing_semicolon_triggers_synchronize_and_keeps_going() {
        let (stmts, had_error) = parse_src("var a = 1\nprint a;");
        assert!(had_error);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn max_parameters_reported_but_parsing_continues() {
        let mut src = "fun f(".to_string();
        for i in 0..256 {
            if i > 0 {
                src.push(',');
            }
            src.push_str(&format!("a{i}"));
        }
        src.push_str("){}");
        let (_stmts, had_error) = parse_src(&src);
        assert!(had_error);
    }
}
