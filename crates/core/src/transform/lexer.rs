//! Tokenizer for the transform expression language.

use super::TransformFunctionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    // Keywords
    Let,
    If,
    Else,
    True,
    False,
    Null,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Newline,
}

impl Token {
    /// Tokens after which a line break cannot end a statement.
    fn continues_line(&self) -> bool {
        matches!(
            self,
            Token::Plus
                | Token::Minus
                | Token::Star
                | Token::Slash
                | Token::Percent
                | Token::Bang
                | Token::Assign
                | Token::Eq
                | Token::Ne
                | Token::Lt
                | Token::Le
                | Token::Gt
                | Token::Ge
                | Token::AndAnd
                | Token::OrOr
                | Token::Comma
                | Token::Else
        )
    }
}

/// A token with the 1-based source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Split source text into tokens.
///
/// Line breaks become [`Token::Newline`] statement separators except inside
/// brackets or right after an operator, so long expressions can wrap.
/// `#` starts a comment that runs to the end of the line.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, TransformFunctionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut depth: usize = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            let suppressed = depth > 0
                || tokens
                    .last()
                    .map_or(true, |t| t.token.continues_line() || t.token == Token::Newline);
            if !suppressed {
                tokens.push(Spanned {
                    token: Token::Newline,
                    line,
                });
            }
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let start_line = line;
        let token = if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let is_float =
                i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                Token::Float(text.parse().map_err(|_| syntax(line, "invalid number"))?)
            } else {
                Token::Int(
                    text.parse()
                        .map_err(|_| syntax(line, "integer literal out of range"))?,
                )
            }
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.as_str() {
                "let" => Token::Let,
                "if" => Token::If,
                "else" => Token::Else,
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => Token::Ident(word),
            }
        } else if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut s = String::new();
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(syntax(start_line, "unterminated string literal"));
                };
                i += 1;
                match ch {
                    _ if ch == quote => break,
                    '\\' => {
                        let escaped = *chars
                            .get(i)
                            .ok_or_else(|| syntax(line, "unterminated string literal"))?;
                        i += 1;
                        s.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '\\' => '\\',
                            '"' => '"',
                            '\'' => '\'',
                            other => {
                                return Err(syntax(line, &format!("unknown escape '\\{other}'")))
                            }
                        });
                    }
                    '\n' => {
                        line += 1;
                        s.push(ch);
                    }
                    _ => s.push(ch),
                }
            }
            Token::Str(s)
        } else {
            let next = chars.get(i + 1).copied();
            let (token, width) = match (c, next) {
                ('=', Some('=')) => (Token::Eq, 2),
                ('!', Some('=')) => (Token::Ne, 2),
                ('<', Some('=')) => (Token::Le, 2),
                ('>', Some('=')) => (Token::Ge, 2),
                ('&', Some('&')) => (Token::AndAnd, 2),
                ('|', Some('|')) => (Token::OrOr, 2),
                ('=', _) => (Token::Assign, 1),
                ('!', _) => (Token::Bang, 1),
                ('<', _) => (Token::Lt, 1),
                ('>', _) => (Token::Gt, 1),
                ('+', _) => (Token::Plus, 1),
                ('-', _) => (Token::Minus, 1),
                ('*', _) => (Token::Star, 1),
                ('/', _) => (Token::Slash, 1),
                ('%', _) => (Token::Percent, 1),
                ('(', _) => (Token::LParen, 1),
                (')', _) => (Token::RParen, 1),
                ('[', _) => (Token::LBracket, 1),
                (']', _) => (Token::RBracket, 1),
                ('{', _) => (Token::LBrace, 1),
                ('}', _) => (Token::RBrace, 1),
                (',', _) => (Token::Comma, 1),
                (';', _) => (Token::Semi, 1),
                _ => return Err(syntax(line, &format!("unexpected character '{c}'"))),
            };
            match token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            i += width;
            token
        };

        tokens.push(Spanned {
            token,
            line: start_line,
        });
    }

    Ok(tokens)
}

fn syntax(line: usize, message: &str) -> TransformFunctionError {
    TransformFunctionError::Syntax {
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn assignment_statement() {
        assert_eq!(
            kinds("result = value + 1"),
            vec![
                Token::Ident("result".into()),
                Token::Assign,
                Token::Ident("value".into()),
                Token::Plus,
                Token::Int(1),
            ]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("a == b != c <= d >= e && f || g"),
            vec![
                Token::Ident("a".into()),
                Token::Eq,
                Token::Ident("b".into()),
                Token::Ne,
                Token::Ident("c".into()),
                Token::Le,
                Token::Ident("d".into()),
                Token::Ge,
                Token::Ident("e".into()),
                Token::AndAnd,
                Token::Ident("f".into()),
                Token::OrOr,
                Token::Ident("g".into()),
            ]
        );
    }

    #[test]
    fn numbers_and_strings() {
        assert_eq!(
            kinds(r#"1.5 7 "a\"b" 'c'"#),
            vec![
                Token::Float(1.5),
                Token::Int(7),
                Token::Str("a\"b".into()),
                Token::Str("c".into()),
            ]
        );
    }

    #[test]
    fn newline_separates_statements() {
        let tokens = kinds("let a = 1\nresult = a");
        assert!(tokens.contains(&Token::Newline));
    }

    #[test]
    fn newline_inside_parens_and_after_operator_is_ignored() {
        assert!(!kinds("concat(\n a,\n b\n)").contains(&Token::Newline));
        assert!(!kinds("result = 1 +\n 2").contains(&Token::Newline));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("result = value # keep as is"),
            vec![
                Token::Ident("result".into()),
                Token::Assign,
                Token::Ident("value".into()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        let err = tokenize("result = \"abc").unwrap_err();
        assert!(matches!(err, TransformFunctionError::Syntax { line: 1, .. }));
    }

    #[test]
    fn unexpected_character_reports_line() {
        let err = tokenize("let a = 1\nresult = a @ 2").unwrap_err();
        assert!(matches!(err, TransformFunctionError::Syntax { line: 2, .. }));
    }
}
