use super::ScriptError;
use super::lexer::{Token, TokenKind};
use super::value::ScriptValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Expr {
    Literal(ScriptValue),
    Name(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Stmt {
    Assign(String, Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    While(Expr, Vec<Stmt>),
    Raise(Expr),
    Expr(Expr),
}

pub(super) type Program = Vec<Stmt>;

/// Deepest nesting of expressions, operator chains, and blocks a program may use.
///
/// Evaluation and drop recurse over the tree, so this also bounds their stack use.
const MAX_NESTING: usize = 200;

pub(super) fn parse(tokens: &[Token]) -> Result<Program, ScriptError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let program = parser.statements()?;
    parser.expect(&TokenKind::Eof, "end of input")?;
    Ok(program)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ScriptError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn error(&self, message: String) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message,
        }
    }

    fn enter(&mut self, what: &str) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!("{what} nested too deeply")));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn skip_separators(&mut self) {
        while self.eat(&TokenKind::Separator) {}
    }

    /// Statements up to (not including) `}` or end of input.
    fn statements(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
            if !matches!(
                self.peek(),
                TokenKind::Separator | TokenKind::RBrace | TokenKind::Eof
            ) {
                return Err(self.error(format!(
                    "expected end of statement, found {:?}",
                    self.peek()
                )));
            }
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.skip_separators();
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.enter("blocks")?;
        let body = self.statements()?;
        self.leave(1);
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek().clone() {
            TokenKind::If => self.if_statement(),
            TokenKind::While => {
                self.advance();
                let cond = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::While(cond, body))
            }
            TokenKind::Raise => {
                self.advance();
                Ok(Stmt::Raise(self.expression()?))
            }
            TokenKind::Ident(name) if self.peek_at(1) == &TokenKind::Assign => {
                self.advance();
                self.advance();
                Ok(Stmt::Assign(name, self.expression()?))
            }
            _ => Ok(Stmt::Expr(self.expression()?)),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.expect(&TokenKind::If, "'if'")?;
        let cond = self.expression()?;
        let then_body = self.block()?;

        // `else` may sit on the line after the closing brace.
        let mut lookahead = 0;
        while self.peek_at(lookahead) == &TokenKind::Separator {
            lookahead += 1;
        }
        if self.peek_at(lookahead) != &TokenKind::Else {
            return Ok(Stmt::If(cond, then_body, Vec::new()));
        }
        self.skip_separators();
        self.advance();
        let else_body = if self.peek() == &TokenKind::If {
            self.enter("blocks")?;
            let chained = self.if_statement()?;
            self.leave(1);
            vec![chained]
        } else {
            self.block()?
        };
        Ok(Stmt::If(cond, then_body, else_body))
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.enter("expression")?;
        let expr = self.or_expr()?;
        self.leave(1);
        Ok(expr)
    }

    // Operator chains build left-deep trees without recursing here, so every
    // link counts as one level until the chain ends.

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and_expr()?;
        let mut links = 0;
        while self.eat(&TokenKind::Or) {
            self.enter("expression")?;
            links += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.leave(links);
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.not_expr()?;
        let mut links = 0;
        while self.eat(&TokenKind::And) {
            self.enter("expression")?;
            links += 1;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.leave(links);
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&TokenKind::Not) {
            self.enter("expression")?;
            let inner = self.not_expr()?;
            self.leave(1);
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let left = self.additive()?;
        let op = match self.peek() {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.multiplicative()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter("expression")?;
            links += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.leave(links);
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::SlashSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.enter("expression")?;
            links += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.leave(links);
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let negate = if self.eat(&TokenKind::Minus) {
            true
        } else if self.eat(&TokenKind::Plus) {
            false
        } else {
            return self.power();
        };
        self.enter("expression")?;
        let inner = self.unary()?;
        self.leave(1);
        Ok(if negate {
            Expr::Neg(Box::new(inner))
        } else {
            inner
        })
    }

    /// `**` binds tighter than unary minus on its left and is right-associative.
    fn power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.primary()?;
        if self.eat(&TokenKind::StarStar) {
            self.enter("expression")?;
            let exponent = self.unary()?;
            self.leave(1);
            return Ok(Expr::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            TokenKind::Int(n) => Ok(Expr::Literal(ScriptValue::Int(n))),
            TokenKind::Float(x) => Ok(Expr::Literal(ScriptValue::Float(x))),
            TokenKind::Str(s) => Ok(Expr::Literal(ScriptValue::Str(s))),
            TokenKind::True => Ok(Expr::Literal(ScriptValue::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(ScriptValue::Bool(false))),
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.arguments()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Name(name))
                }
            }
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma, "',' or ')'")?;
        }
    }
}
