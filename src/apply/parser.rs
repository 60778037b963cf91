//! Recursive-descent parser producing an expression tree

use serde_json::Value;

use super::lexer::{tokenize, Tok, Token};
use super::Fault;

#[derive(Clone, Debug, PartialEq)]
pub enum BinaryOp {
    Add,
    Eq,
    NotEq,
    And,
    Or,
    Coalesce,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Expression node with the byte offset it starts at
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub offset: usize,
}

impl Expr {
    fn new(kind: ExprKind, offset: usize) -> Self {
        Expr { kind, offset }
    }
}

pub fn parse(input: &str) -> Result<Expr, Fault> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    let trailing = parser.peek();
    if trailing.tok != Tok::End {
        return Err(Fault::new(
            format!("unexpected {} after expression", trailing.tok.describe()),
            trailing.offset,
        ));
    }
    Ok(expr)
}

/// Deepest nesting of groups, lists, objects and `!` the parser accepts
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with End
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if &self.peek().tok == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<Token, Fault> {
        let next = self.peek();
        if next.tok == tok {
            Ok(self.bump())
        } else {
            Err(Fault::new(
                format!("expected {} but found {}", tok.describe(), next.tok.describe()),
                next.offset,
            ))
        }
    }

    fn expr(&mut self) -> Result<Expr, Fault> {
        self.enter()?;
        let expr = self.binary_level(0);
        self.depth -= 1;
        expr
    }

    fn enter(&mut self) -> Result<(), Fault> {
        if self.depth >= MAX_NESTING {
            return Err(Fault::new(
                format!("expression nested more than {} levels deep", MAX_NESTING),
                self.peek().offset,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Precedence climbing, lowest first: || && ?? (== !=) +
    fn binary_level(&mut self, level: usize) -> Result<Expr, Fault> {
        const DEPTH: usize = 5;
        if level == DEPTH {
            return self.unary();
        }

        let mut left = self.binary_level(level + 1)?;
        while let Some(op) = operator_at(level, &self.peek().tok) {
            let at = self.bump().offset;
            let right = self.binary_level(level + 1)?;
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), at);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, Fault> {
        if self.peek().tok == Tok::Bang {
            let at = self.bump().offset;
            self.enter()?;
            let inner = self.unary();
            self.depth -= 1;
            return Ok(Expr::new(ExprKind::Not(Box::new(inner?)), at));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, Fault> {
        let mut expr = self.primary()?;
        loop {
            let next = self.peek().tok.clone();
            match next {
                Tok::Dot => {
                    self.bump();
                    let name = self.bump();
                    let field = match name.tok {
                        Tok::Ident(field) | Tok::Str(field) => field,
                        other => {
                            return Err(Fault::new(
                                format!("expected field name after '.', found {}", other.describe()),
                                name.offset,
                            ));
                        }
                    };
                    let at = expr.offset;
                    expr = Expr::new(ExprKind::Member(Box::new(expr), field), at);
                }
                Tok::LBracket => {
                    self.bump();
                    let index = self.expr()?;
                    self.expect(Tok::RBracket)?;
                    let at = expr.offset;
                    expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(index)), at);
                }
                Tok::LParen => {
                    let name = match &expr.kind {
                        ExprKind::Ident(name) => name.clone(),
                        _ => {
                            return Err(Fault::new("only named functions can be called", expr.offset));
                        }
                    };
                    self.bump();
                    let args = self.list(Tok::RParen)?;
                    expr = Expr::new(ExprKind::Call(name, args), expr.offset);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, Fault> {
        let token = self.bump();
        let at = token.offset;
        let kind = match token.tok {
            Tok::Str(s) => ExprKind::Literal(Value::String(s)),
            Tok::Num(n) => ExprKind::Literal(number(n)),
            Tok::Ident(name) => match name.as_str() {
                "true" => ExprKind::Literal(Value::Bool(true)),
                "false" => ExprKind::Literal(Value::Bool(false)),
                "null" => ExprKind::Literal(Value::Null),
                _ => ExprKind::Ident(name),
            },
            Tok::LParen => {
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                return Ok(inner);
            }
            Tok::LBracket => ExprKind::Array(self.list(Tok::RBracket)?),
            Tok::LBrace => ExprKind::Object(self.object_body()?),
            other => {
                return Err(Fault::new(format!("unexpected {}", other.describe()), at));
            }
        };
        Ok(Expr::new(kind, at))
    }

    /// Comma separated expressions up to `close`; trailing comma allowed
    fn list(&mut self, close: Tok) -> Result<Vec<Expr>, Fault> {
        let mut items = Vec::new();
        loop {
            if self.eat(&close) {
                return Ok(items);
            }
            items.push(self.expr()?);
            if !self.eat(&Tok::Comma) {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    fn object_body(&mut self) -> Result<Vec<(String, Expr)>, Fault> {
        let mut fields = Vec::new();
        loop {
            if self.eat(&Tok::RBrace) {
                return Ok(fields);
            }
            let key = self.bump();
            let name = match key.tok {
                Tok::Str(name) | Tok::Ident(name) => name,
                other => {
                    return Err(Fault::new(
                        format!("expected object key, found {}", other.describe()),
                        key.offset,
                    ));
                }
            };
            self.expect(Tok::Colon)?;
            let value = self.expr()?;
            fields.push((name, value));
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RBrace)?;
                return Ok(fields);
            }
        }
    }
}

fn operator_at(level: usize, tok: &Tok) -> Option<BinaryOp> {
    match (level, tok) {
        (0, Tok::OrOr) => Some(BinaryOp::Or),
        (1, Tok::AndAnd) => Some(BinaryOp::And),
        (2, Tok::Coalesce) => Some(BinaryOp::Coalesce),
        (3, Tok::EqEq) => Some(BinaryOp::Eq),
        (3, Tok::NotEq) => Some(BinaryOp::NotEq),
        (4, Tok::Plus) => Some(BinaryOp::Add),
        _ => None,
    }
}

/// Integral values become integers so `200 == response.status` holds
pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_object() {
        let expr = parse(r#"{ headers: { "X-A": "1", "X-B": null }, method: "post" }"#).unwrap();
        let ExprKind::Object(fields) = expr.kind else {
            panic!("expected object");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "headers");
        assert_eq!(fields[1].0, "method");
    }

    #[test]
    fn test_parse_member_and_call() {
        let expr = parse(r#"upper(request.headers["X-A"]) + "-x""#).unwrap();
        assert!(matches!(expr.kind, ExprKind::Binary(BinaryOp::Add, _, _)));
    }

    #[test]
    fn test_precedence_coalesce_below_eq() {
        let expr = parse("a ?? b == c").unwrap();
        let ExprKind::Binary(BinaryOp::Coalesce, _, right) = expr.kind else {
            panic!("expected coalesce at the root");
        };
        assert!(matches!(right.kind, ExprKind::Binary(BinaryOp::Eq, _, _)));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = parse("{ a: 1 } }").unwrap_err();
        assert_eq!(err.offset, 9);
    }

    #[test]
    fn test_missing_colon() {
        let err = parse("{ a 1 }").unwrap_err();
        assert!(err.message.contains("expected `:`"));
    }

    #[test]
    fn test_deep_nesting_rejected_with_offset() {
        let err = parse(&"[".repeat(10_000)).unwrap_err();
        assert!(err.message.contains("nested"));
        assert_eq!(err.offset, MAX_NESTING);

        let bangs = format!("{}true", "!".repeat(10_000));
        assert!(parse(&bangs).unwrap_err().message.contains("nested"));

        let depth = MAX_NESTING / 2;
        let fine = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(parse(&fine).is_ok());
    }
}
