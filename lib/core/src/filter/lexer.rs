//! Filter lexer: tokenizes a filter expression.

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
    pub text: String,
}

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    And,
    Or,
    Not,
    In,
    For,
    True,
    False,

    // Literals
    Integer,
    Float,
    StringLiteral,

    Identifier,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,

    // Operators
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,

    Eof,
}

/// Tokenize a filter string. Errors carry the byte position of the offending character.
pub fn tokenize(input: &str) -> Result<Vec<Token>, (usize, String)> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }

            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.next() {
                                s.push(escaped);
                            }
                        }
                        Some((_, c)) if c == quote => break,
                        Some((_, c)) => s.push(c),
                        None => return Err((pos, "unterminated string literal".to_string())),
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::StringLiteral,
                    position: pos,
                    text: s,
                });
            }

            c if c.is_ascii_digit() || (c == '-' && next_is_digit(input, pos)) => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                let mut kind = TokenKind::Integer;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        chars.next();
                    } else if c == '.' && kind == TokenKind::Integer {
                        kind = TokenKind::Float;
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind,
                    position: pos,
                    text,
                });
            }

            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let kind = keyword(&text).unwrap_or(TokenKind::Identifier);
                tokens.push(Token {
                    kind,
                    position: pos,
                    text,
                });
            }

            _ => {
                chars.next();
                let next = chars.peek().map(|&(_, c)| c);
                let (kind, width) = match (ch, next) {
                    ('(', _) => (TokenKind::LParen, 1),
                    (')', _) => (TokenKind::RParen, 1),
                    ('[', _) => (TokenKind::LBracket, 1),
                    (']', _) => (TokenKind::RBracket, 1),
                    (',', _) => (TokenKind::Comma, 1),
                    ('=', Some('=')) => (TokenKind::Eq, 2),
                    ('=', _) => (TokenKind::Eq, 1),
                    ('!', Some('=')) => (TokenKind::Neq, 2),
                    ('<', Some('=')) => (TokenKind::Lte, 2),
                    ('<', Some('>')) => (TokenKind::Neq, 2),
                    ('<', _) => (TokenKind::Lt, 1),
                    ('>', Some('=')) => (TokenKind::Gte, 2),
                    ('>', _) => (TokenKind::Gt, 1),
                    (other, _) => return Err((pos, format!("unexpected character '{}'", other))),
                };
                if width == 2 {
                    chars.next();
                }
                tokens.push(Token {
                    kind,
                    position: pos,
                    text: input[pos..pos + width].to_string(),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        position: input.len(),
        text: String::new(),
    });
    Ok(tokens)
}

fn next_is_digit(input: &str, pos: usize) -> bool {
    input[pos + 1..].chars().next().map_or(false, |c| c.is_ascii_digit())
}

fn keyword(text: &str) -> Option<TokenKind> {
    match text.to_ascii_lowercase().as_str() {
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "not" => Some(TokenKind::Not),
        "in" => Some(TokenKind::In),
        "for" => Some(TokenKind::For),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_comprehension_tokens() {
        assert_eq!(
            kinds("[attr == 0 for attr in c0_A]"),
            vec![
                TokenKind::LBracket, TokenKind::Identifier, TokenKind::Eq, TokenKind::Integer,
                TokenKind::For, TokenKind::Identifier, TokenKind::In, TokenKind::Identifier,
                TokenKind::RBracket, TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            kinds("c1 != 'x' AND c2 >= -1.5"),
            vec![
                TokenKind::Identifier, TokenKind::Neq, TokenKind::StringLiteral, TokenKind::And,
                TokenKind::Identifier, TokenKind::Gte, TokenKind::Float, TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(tokenize("c0 == 'abc").unwrap_err().0, 6);
    }

    #[test]
    fn test_unexpected_character() {
        assert!(tokenize("c0 $ 1").is_err());
    }
}
