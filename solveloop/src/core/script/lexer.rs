use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    If,
    Else,
    While,
    Raise,
    And,
    Or,
    Not,
    True,
    False,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Separator,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub(super) fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' | ';' => {
                tokens.push(Token {
                    kind: TokenKind::Separator,
                    line,
                });
                if c == '\n' {
                    line += 1;
                }
                i += 1;
            }
            ' ' | '\t' | '\r' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' | '\'' => {
                let (text, next, newlines) = lex_string(&chars, i, line)?;
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    line,
                });
                line += newlines;
                i = next;
            }
            c if c.is_ascii_digit() || (c == '.' && peek_digit(&chars, i + 1)) => {
                let (kind, next) = lex_number(&chars, i, line)?;
                tokens.push(Token { kind, line });
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Token {
                    kind: keyword_or_ident(word),
                    line,
                });
            }
            _ => {
                let (kind, width) = lex_operator(&chars, i).ok_or_else(|| ScriptError::Syntax {
                    line,
                    message: format!("unexpected character '{c}'"),
                })?;
                tokens.push(Token { kind, line });
                i += width;
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

fn peek_digit(chars: &[char], i: usize) -> bool {
    chars.get(i).is_some_and(|c| c.is_ascii_digit())
}

fn keyword_or_ident(word: String) -> TokenKind {
    match word.as_str() {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "raise" => TokenKind::Raise,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "true" | "True" => TokenKind::True,
        "false" | "False" => TokenKind::False,
        _ => TokenKind::Ident(word),
    }
}

fn lex_number(chars: &[char], start: usize, line: usize) -> Result<(TokenKind, usize), ScriptError> {
    let mut i = start;
    let mut is_float = false;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || c == '_' {
            i += 1;
        } else if c == '.' && !is_float && peek_digit(chars, i + 1) {
            is_float = true;
            i += 1;
        } else if (c == 'e' || c == 'E') && start < i {
            let sign = matches!(chars.get(i + 1), Some('+') | Some('-'));
            let digit_at = if sign { i + 2 } else { i + 1 };
            if !peek_digit(chars, digit_at) {
                break;
            }
            is_float = true;
            i = digit_at;
        } else {
            break;
        }
    }

    let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
    let invalid = || ScriptError::Syntax {
        line,
        message: format!("invalid number literal '{text}'"),
    };
    let kind = if is_float {
        TokenKind::Float(text.parse().map_err(|_| invalid())?)
    } else {
        TokenKind::Int(text.parse().map_err(|_| invalid())?)
    };
    Ok((kind, i))
}

fn lex_string(
    chars: &[char],
    start: usize,
    line: usize,
) -> Result<(String, usize, usize), ScriptError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut newlines = 0usize;
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1, newlines)),
            '\\' => {
                let escaped = chars.get(i + 1).copied().ok_or_else(|| ScriptError::Syntax {
                    line,
                    message: "unterminated string literal".to_string(),
                })?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c => {
                if c == '\n' {
                    newlines += 1;
                }
                text.push(c);
                i += 1;
            }
        }
    }
    Err(ScriptError::Syntax {
        line,
        message: "unterminated string literal".to_string(),
    })
}

fn lex_operator(chars: &[char], i: usize) -> Option<(TokenKind, usize)> {
    let next = chars.get(i + 1).copied();
    let pair = match (chars[i], next) {
        ('*', Some('*')) => Some(TokenKind::StarStar),
        ('/', Some('/')) => Some(TokenKind::SlashSlash),
        ('=', Some('=')) => Some(TokenKind::Eq),
        ('!', Some('=')) => Some(TokenKind::Ne),
        ('<', Some('=')) => Some(TokenKind::Le),
        ('>', Some('=')) => Some(TokenKind::Ge),
        _ => None,
    };
    if let Some(kind) = pair {
        return Some((kind, 2));
    }
    let kind = match chars[i] {
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Star,
        '/' => TokenKind::Slash,
        '%' => TokenKind::Percent,
        '=' => TokenKind::Assign,
        '<' => TokenKind::Lt,
        '>' => TokenKind::Gt,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        ',' => TokenKind::Comma,
        _ => return None,
    };
    Some((kind, 1))
}
