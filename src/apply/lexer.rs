//! Tokenizer for patch and assertion expressions

use super::Fault;

#[derive(Clone, Debug, PartialEq)]
pub enum Tok {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Dot,
    Plus,
    EqEq,
    NotEq,
    Bang,
    AndAnd,
    OrOr,
    Coalesce,
    Str(String),
    Num(f64),
    Ident(String),
    End,
}

impl Tok {
    pub fn describe(&self) -> String {
        match self {
            Tok::Str(s) => format!("string \"{}\"", s),
            Tok::Num(n) => format!("number {}", n),
            Tok::Ident(name) => format!("`{}`", name),
            Tok::End => "end of expression".to_string(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Tok::LBrace => "{",
            Tok::RBrace => "}",
            Tok::LBracket => "[",
            Tok::RBracket => "]",
            Tok::LParen => "(",
            Tok::RParen => ")",
            Tok::Colon => ":",
            Tok::Comma => ",",
            Tok::Dot => ".",
            Tok::Plus => "+",
            Tok::EqEq => "==",
            Tok::NotEq => "!=",
            Tok::Bang => "!",
            Tok::AndAnd => "&&",
            Tok::OrOr => "||",
            Tok::Coalesce => "??",
            _ => "",
        }
    }
}

/// Token plus its byte offset in the source text
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub offset: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, Fault> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let single = match c {
            '{' => Some(Tok::LBrace),
            '}' => Some(Tok::RBrace),
            '[' => Some(Tok::LBracket),
            ']' => Some(Tok::RBracket),
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            ':' => Some(Tok::Colon),
            ',' => Some(Tok::Comma),
            '.' => Some(Tok::Dot),
            '+' => Some(Tok::Plus),
            _ => None,
        };
        if let Some(tok) = single {
            chars.next();
            tokens.push(Token { tok, offset });
            continue;
        }

        match c {
            '"' | '\'' => {
                chars.next();
                let text = read_string(&mut chars, c, offset)?;
                tokens.push(Token { tok: Tok::Str(text), offset });
            }
            '=' | '!' | '&' | '|' | '?' => {
                chars.next();
                let next = chars.peek().map(|&(_, n)| n);
                let tok = match (c, next) {
                    ('=', Some('=')) => Tok::EqEq,
                    ('!', Some('=')) => Tok::NotEq,
                    ('&', Some('&')) => Tok::AndAnd,
                    ('|', Some('|')) => Tok::OrOr,
                    ('?', Some('?')) => Tok::Coalesce,
                    ('!', _) => {
                        tokens.push(Token { tok: Tok::Bang, offset });
                        continue;
                    }
                    _ => return Err(Fault::new(format!("unexpected character '{}'", c), offset)),
                };
                chars.next();
                tokens.push(Token { tok, offset });
            }
            '-' | '0'..='9' => {
                let mut text = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || (d == '-' && text.is_empty()) {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num = text
                    .parse::<f64>()
                    .map_err(|_| Fault::new(format!("invalid number '{}'", text), offset))?;
                tokens.push(Token { tok: Tok::Num(num), offset });
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut name = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    // Header-style names (X-Request-Id) are valid bare keys
                    if d.is_alphanumeric() || d == '_' || d == '$' || d == '-' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token { tok: Tok::Ident(name), offset });
            }
            other => {
                return Err(Fault::new(format!("unexpected character '{}'", other), offset));
            }
        }
    }

    tokens.push(Token {
        tok: Tok::End,
        offset: input.len(),
    });
    Ok(tokens)
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, Fault> {
    let mut text = String::new();
    loop {
        match chars.next() {
            Some((_, c)) if c == quote => return Ok(text),
            Some((at, '\\')) => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, 'r')) => text.push('\r'),
                Some((_, c @ ('"' | '\'' | '\\' | '/'))) => text.push(c),
                Some((_, other)) => {
                    return Err(Fault::new(format!("unknown escape '\\{}'", other), at));
                }
                None => break,
            },
            Some((_, c)) => text.push(c),
            None => break,
        }
    }
    Err(Fault::new("unterminated string", start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Tok> {
        tokenize(input).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_tokenize_object() {
        assert_eq!(
            kinds(r#"{ "X-A": 'v', n: 2 }"#),
            vec![
                Tok::LBrace,
                Tok::Str("X-A".into()),
                Tok::Colon,
                Tok::Str("v".into()),
                Tok::Comma,
                Tok::Ident("n".into()),
                Tok::Colon,
                Tok::Num(2.0),
                Tok::RBrace,
                Tok::End,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("a == b != !c ?? d && e || f"),
            vec![
                Tok::Ident("a".into()),
                Tok::EqEq,
                Tok::Ident("b".into()),
                Tok::NotEq,
                Tok::Bang,
                Tok::Ident("c".into()),
                Tok::Coalesce,
                Tok::Ident("d".into()),
                Tok::AndAnd,
                Tok::Ident("e".into()),
                Tok::OrOr,
                Tok::Ident("f".into()),
                Tok::End,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_offset() {
        let err = tokenize("{ a: \"oops }").unwrap_err();
        assert_eq!(err.offset, 5);
    }
}
