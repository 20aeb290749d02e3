//! Recursive-descent parser producing the transform program AST.

use serde_json::Value;

use super::eval::function_arity;
use super::lexer::{Spanned, Token};
use super::{TransformFunctionError, MAX_NESTING_DEPTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    /// `let name = expr` or `name = expr`.
    Bind(String, Expr),
    /// A bare expression, evaluated for errors and discarded.
    Expr(Expr),
}

pub(crate) fn parse(tokens: Vec<Spanned>) -> Result<Vec<Stmt>, TransformFunctionError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Vec<Stmt>, TransformFunctionError> {
        let mut stmts = Vec::new();
        loop {
            while matches!(self.peek(), Some(Token::Semi | Token::Newline)) {
                self.pos += 1;
            }
            if self.peek().is_none() {
                break;
            }
            stmts.push(self.statement()?);
            match self.peek() {
                None | Some(Token::Semi | Token::Newline) => {}
                Some(other) => {
                    return Err(self.error(&format!("expected end of statement, found {other:?}")))
                }
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, TransformFunctionError> {
        if self.eat(&Token::Let) {
            let name = self.ident()?;
            self.expect(&Token::Assign)?;
            return Ok(Stmt::Bind(name, self.expr()?));
        }
        if let (Some(Token::Ident(name)), Some(Token::Assign)) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.pos += 2;
            return Ok(Stmt::Bind(name, self.expr()?));
        }
        Ok(Stmt::Expr(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, TransformFunctionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        let result = self.or();
        self.depth -= 1;
        result
    }

    fn or(&mut self) -> Result<Expr, TransformFunctionError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, TransformFunctionError> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, TransformFunctionError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn comparison(&mut self) -> Result<Expr, TransformFunctionError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Expr, TransformFunctionError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, TransformFunctionError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, TransformFunctionError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn postfix(&mut self) -> Result<Expr, TransformFunctionError> {
        let mut expr = self.primary()?;
        while self.eat(&Token::LBracket) {
            let index = self.expr()?;
            self.expect(&Token::RBracket)?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, TransformFunctionError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of input"));
        };
        self.pos += 1;
        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::from(i))),
            Token::Float(f) => serde_json::Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| self.error("invalid float literal")),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let items = self.list(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::If => self.if_expr(),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.list(&Token::RParen)?;
                    self.check_call(&name, args.len())?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            other => {
                self.pos -= 1;
                Err(self.error(&format!("unexpected token {other:?}")))
            }
        }
    }

    /// Parse the remainder of an `if` expression (the keyword is consumed).
    fn if_expr(&mut self) -> Result<Expr, TransformFunctionError> {
        let cond = self.expr()?;
        let then = self.block()?;
        // Allow `else` on the line after the closing brace.
        let mut lookahead = self.pos;
        while matches!(self.tokens.get(lookahead).map(|s| &s.token), Some(Token::Newline)) {
            lookahead += 1;
        }
        let otherwise = if matches!(self.tokens.get(lookahead).map(|s| &s.token), Some(Token::Else))
        {
            self.pos = lookahead + 1;
            if self.eat(&Token::If) {
                Some(Box::new(self.if_expr()?))
            } else {
                Some(Box::new(self.block()?))
            }
        } else {
            None
        };
        Ok(Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise,
        })
    }

    fn block(&mut self) -> Result<Expr, TransformFunctionError> {
        self.expect(&Token::LBrace)?;
        let inner = self.expr()?;
        self.expect(&Token::RBrace)?;
        Ok(inner)
    }

    /// Comma-separated expressions up to `close` (consumed). Trailing comma allowed.
    fn list(&mut self, close: &Token) -> Result<Vec<Expr>, TransformFunctionError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&Token::Comma)?;
            if self.eat(close) {
                return Ok(items);
            }
        }
    }

    fn check_call(&self, name: &str, argc: usize) -> Result<(), TransformFunctionError> {
        let Some((min, max)) = function_arity(name) else {
            return Err(self.error(&format!("unknown function '{name}'")));
        };
        if argc < min || max.is_some_and(|max| argc > max) {
            let expected = match max {
                Some(max) if max == min => format!("{min}"),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            return Err(self.error(&format!(
                "function '{name}' takes {expected} argument(s), got {argc}"
            )));
        }
        Ok(())
    }

    fn ident(&mut self) -> Result<String, TransformFunctionError> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), TransformFunctionError> {
        if self.eat(token) {
            Ok(())
        } else {
            let found = self
                .peek()
                .map_or_else(|| "end of input".to_string(), |t| format!("{t:?}"));
            Err(self.error(&format!("expected {token:?}, found {found}")))
        }
    }

    fn error(&self, message: &str) -> TransformFunctionError {
        let line = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |s| s.line);
        TransformFunctionError::Syntax {
            line,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::super::lexer::tokenize;
    use super::*;

    fn parse_src(source: &str) -> Result<Vec<Stmt>, TransformFunctionError> {
        parse(tokenize(source)?)
    }

    #[test]
    fn precedence_mul_over_add() {
        let stmts = parse_src("result = 1 + 2 * 3").unwrap();
        let Stmt::Bind(name, expr) = &stmts[0] else {
            panic!("expected binding");
        };
        assert_eq!(name, "result");
        assert_matches!(expr, Expr::Binary(BinaryOp::Add, _, rhs)
            if matches!(**rhs, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn statements_split_by_semicolon_and_newline() {
        let stmts = parse_src("let a = 1; let b = 2\nresult = a + b").unwrap();
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn index_and_call() {
        let stmts = parse_src("result = upper(value[\"name\"])").unwrap();
        assert_matches!(&stmts[0], Stmt::Bind(_, Expr::Call(name, args))
            if name == "upper" && matches!(args[0], Expr::Index(_, _)));
    }

    #[test]
    fn if_else_chain_with_newline_before_else() {
        let src = "result = if value > 10 { \"big\" }\nelse if value > 5 { \"mid\" } else { \"small\" }";
        let stmts = parse_src(src).unwrap();
        assert_matches!(&stmts[0], Stmt::Bind(_, Expr::If { otherwise: Some(_), .. }));
    }

    #[test]
    fn unknown_function_rejected() {
        let err = parse_src("result = exec(value)").unwrap_err();
        assert_matches!(err, TransformFunctionError::Syntax { message, .. }
            if message.contains("unknown function 'exec'"));
    }

    #[test]
    fn wrong_arity_rejected() {
        let err = parse_src("result = replace(value, \"a\")").unwrap_err();
        assert_matches!(err, TransformFunctionError::Syntax { message, .. }
            if message.contains("takes 3 argument(s), got 2"));
    }

    #[test]
    fn missing_closing_paren_rejected() {
        assert!(parse_src("result = (1 + 2").is_err());
    }

    #[test]
    fn two_expressions_on_one_line_rejected() {
        assert!(parse_src("result = 1 2").is_err());
    }

    #[test]
    fn deep_nesting_rejected() {
        let src = format!("result = {}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse_src(&src).unwrap_err();
        assert_matches!(err, TransformFunctionError::Syntax { message, .. }
            if message.contains("nested too deeply"));
    }
}
