//! Filter recursive descent parser.
//!
//! Parses token streams into an [`Expr`], resolving column names against the
//! item table attributes as it goes. Supports:
//! - comparisons (`==`, `!=`, `<`, `<=`, `>`, `>=`) between columns and literals
//! - `IN (...)` / `NOT IN (...)` membership
//! - `AND`, `OR`, `NOT` and parentheses
//! - the comprehension form `[attr == 0 for attr in c0_A]`

use super::ast::*;
use super::lexer::{Token, TokenKind};

pub(crate) type ParseError = (usize, String);

/// Cursor over a token slice
struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    attributes: &'t [String],
    /// Comprehension variable and the column it stands for
    binding: Option<(&'t str, &'t str)>,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> &'t Token {
        let tokens = self.tokens;
        &tokens[self.pos.min(tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> &'t Token {
        let tok = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&'t Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            let tok = self.peek();
            Err(self.error(format!("expected {:?}, got {:?} '{}'", kind, tok.kind, tok.text)))
        }
    }

    fn error(&self, msg: String) -> ParseError {
        (self.peek().position, msg)
    }

    fn resolve(&self, tok: &Token) -> Result<ColumnRef, ParseError> {
        let mut name = tok.text.as_str();
        if let Some((var, column)) = self.binding {
            if name == var {
                name = column;
            }
        }

        if let Some(attribute) = self.attributes.iter().position(|a| a == name) {
            return Ok(ColumnRef { attribute, role: None });
        }

        match Role::split_suffix(name) {
            Some((base, role)) => {
                let attribute = self
                    .attributes
                    .iter()
                    .position(|a| a == base)
                    .ok_or_else(|| (tok.position, format!("unknown attribute `{}`", base)))?;
                let role = role.map_err(|suffix| {
                    (tok.position, format!("unknown role suffix `_{}` on `{}`", suffix, base))
                })?;
                Ok(ColumnRef { attribute, role: Some(role) })
            }
            None => Err((tok.position, format!("unknown attribute `{}`", name))),
        }
    }
}

/// Parse a filter. `attributes` are the item table's column names.
pub(crate) fn parse(tokens: &[Token], attributes: &[String]) -> Result<Expr, ParseError> {
    let n = tokens.len();
    let mut p = Parser { tokens, pos: 0, attributes, binding: None };

    // `[expr for var in column]`
    if p.at(TokenKind::LBracket) {
        let tail = n.checked_sub(6).map(|start| &tokens[start..]);
        let comprehension = match tail {
            Some([for_, var, in_, column, close, eof]) => {
                for_.kind == TokenKind::For
                    && var.kind == TokenKind::Identifier
                    && in_.kind == TokenKind::In
                    && column.kind == TokenKind::Identifier
                    && close.kind == TokenKind::RBracket
                    && eof.kind == TokenKind::Eof
            }
            _ => false,
        };
        if !comprehension {
            return Err(p.error("expected `[<expr> for <name> in <column>]`".to_string()));
        }

        p.binding = Some((tokens[n - 5].text.as_str(), tokens[n - 3].text.as_str()));
        p.advance();
        // The inner slice ends on `for`, which no rule consumes
        let mut inner = Parser { tokens: &tokens[..n - 5], ..p };
        let expr = parse_or_expr(&mut inner)?;
        if inner.pos != n - 6 {
            return Err(inner.error("unexpected token in comprehension".to_string()));
        }
        return Ok(expr);
    }

    let expr = parse_or_expr(&mut p)?;
    p.expect(TokenKind::Eof)?;
    Ok(expr)
}

fn parse_or_expr(p: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_and_expr(p)?;
    while p.eat(TokenKind::Or) {
        let right = parse_and_expr(p)?;
        left = Expr::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and_expr(p: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_not_expr(p)?;
    while p.eat(TokenKind::And) {
        let right = parse_not_expr(p)?;
        left = Expr::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_not_expr(p: &mut Parser) -> Result<Expr, ParseError> {
    if p.eat(TokenKind::Not) {
        let expr = parse_not_expr(p)?;
        Ok(Expr::Not(Box::new(expr)))
    } else {
        parse_primary(p)
    }
}

fn parse_primary(p: &mut Parser) -> Result<Expr, ParseError> {
    if p.eat(TokenKind::LParen) {
        let expr = parse_or_expr(p)?;
        p.expect(TokenKind::RParen)?;
        return Ok(expr);
    }

    let left = parse_operand(p)?;

    // Bare boolean literal
    if let Operand::Literal(lit) = &left {
        if !is_comparison_start(p.peek_kind()) {
            if let (Some(n), "True" | "False") = (lit.number, lit.text.as_str()) {
                return Ok(Expr::Constant(n != 0.0));
            }
        }
    }

    let negated = p.at(TokenKind::Not);
    if negated || p.at(TokenKind::In) {
        if negated {
            p.advance();
        }
        p.expect(TokenKind::In)?;
        p.expect(TokenKind::LParen)?;
        let mut list = vec![parse_literal(p)?];
        while p.eat(TokenKind::Comma) {
            list.push(parse_literal(p)?);
        }
        p.expect(TokenKind::RParen)?;
        return Ok(Expr::In { operand: left, list, negated });
    }

    let op = match p.peek_kind() {
        TokenKind::Eq => CompareOp::Eq,
        TokenKind::Neq => CompareOp::Neq,
        TokenKind::Lt => CompareOp::Lt,
        TokenKind::Lte => CompareOp::Lte,
        TokenKind::Gt => CompareOp::Gt,
        TokenKind::Gte => CompareOp::Gte,
        _ => {
            let tok = p.peek();
            return Err(p.error(format!("expected comparison operator, got '{}'", tok.text)));
        }
    };
    p.advance();
    let right = parse_operand(p)?;
    Ok(Expr::Compare { left, op, right })
}

fn is_comparison_start(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Eq
            | TokenKind::Neq
            | TokenKind::Lt
            | TokenKind::Lte
            | TokenKind::Gt
            | TokenKind::Gte
            | TokenKind::In
            | TokenKind::Not
    )
}

fn parse_operand(p: &mut Parser) -> Result<Operand, ParseError> {
    if p.at(TokenKind::Identifier) {
        let tok = p.advance();
        return Ok(Operand::Column(p.resolve(tok)?));
    }
    Ok(Operand::Literal(parse_literal(p)?))
}

fn parse_literal(p: &mut Parser) -> Result<Literal, ParseError> {
    let tok = p.peek();
    let lit = match tok.kind {
        TokenKind::Integer | TokenKind::Float => {
            let number: f64 = tok
                .text
                .parse()
                .map_err(|_| p.error(format!("invalid number '{}'", tok.text)))?;
            Literal::number(tok.text.clone(), number)
        }
        TokenKind::StringLiteral => Literal::string(tok.text.clone()),
        TokenKind::True => Literal::boolean(true),
        TokenKind::False => Literal::boolean(false),
        _ => return Err(p.error(format!("expected literal, got '{}'", tok.text))),
    };
    p.advance();
    Ok(lit)
}
