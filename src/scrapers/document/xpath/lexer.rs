//! XPath tokenizer.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    DoubleColon,
    /// `*` as a name test.
    Star,
    Multiply,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    Name(String),
    Variable(String),
}

impl Token {
    /// Whether a `*` or name following this token is an operator.
    fn ends_operand(&self) -> bool {
        !matches!(
            self,
            Token::At
                | Token::DoubleColon
                | Token::LParen
                | Token::LBracket
                | Token::Comma
                | Token::Slash
                | Token::DoubleSlash
                | Token::Pipe
                | Token::Plus
                | Token::Minus
                | Token::Multiply
                | Token::Eq
                | Token::Neq
                | Token::Lt
                | Token::Le
                | Token::Gt
                | Token::Ge
                | Token::And
                | Token::Or
                | Token::Div
                | Token::Mod
        )
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let operator_position = tokens.last().is_some_and(Token::ends_operand);

        let token = match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => {
                i += 2;
                Token::DoubleSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            ':' if next == Some(':') => {
                i += 2;
                Token::DoubleColon
            }
            '.' if next == Some('.') => {
                i += 2;
                Token::DotDot
            }
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => {
                i += 1;
                Token::Dot
            }
            '*' => {
                i += 1;
                if operator_position {
                    Token::Multiply
                } else {
                    Token::Star
                }
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if next == Some('=') => {
                i += 2;
                Token::Neq
            }
            '<' if next == Some('=') => {
                i += 2;
                Token::Le
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if next == Some('=') => {
                i += 2;
                Token::Ge
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|ch| *ch == c)
                    .ok_or_else(|| format!("unterminated string literal at {}", i))?;
                let literal: String = chars[i + 1..i + 1 + end].iter().collect();
                i += end + 2;
                Token::Literal(literal)
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                i = end;
                Token::Variable(chars[start..end].iter().collect())
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                Token::Number(n)
            }
            c if is_name_start(c) => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                // prefixed name, but not an axis separator
                if i + 1 < chars.len()
                    && chars[i] == ':'
                    && chars[i + 1] != ':'
                    && (is_name_start(chars[i + 1]) || chars[i + 1] == '*')
                {
                    i += 1;
                    while i < chars.len() && (is_name_char(chars[i]) || chars[i] == '*') {
                        i += 1;
                    }
                }
                let name: String = chars[start..i].iter().collect();
                if operator_position {
                    match name.as_str() {
                        "and" => Token::And,
                        "or" => Token::Or,
                        "div" => Token::Div,
                        "mod" => Token::Mod,
                        _ => Token::Name(name),
                    }
                } else {
                    Token::Name(name)
                }
            }
            other => return Err(format!("unexpected character '{}' at {}", other, i)),
        };

        tokens.push(token);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_and_operator_names_by_position() {
        let tokens = tokenize("//div[@id='x' and position() * 2 div 1]/*").unwrap();
        assert!(tokens.contains(&Token::And));
        assert!(tokens.contains(&Token::Multiply));
        assert!(tokens.contains(&Token::Div));
        assert_eq!(tokens.last(), Some(&Token::Star));
    }

    #[test]
    fn test_names_as_element_tests() {
        let tokens = tokenize("//div/and").unwrap();
        assert_eq!(tokens.last(), Some(&Token::Name("and".to_string())));
    }

    #[test]
    fn test_axis_and_literals() {
        let tokens = tokenize(r#"following-sibling::span[contains(., "a b")]"#).unwrap();
        assert_eq!(tokens[0], Token::Name("following-sibling".to_string()));
        assert_eq!(tokens[1], Token::DoubleColon);
        assert!(tokens.contains(&Token::Literal("a b".to_string())));
    }

    #[test]
    fn test_unterminated_literal() {
        assert!(tokenize("//a[@b='x]").is_err());
    }
}
