use super::error::ConditionError;
use super::path::FieldPath;
use regex::Regex;

/// Nesting limit for parentheses and NOT chains.
pub const MAX_DEPTH: usize = 64;

const SQL_KEYWORDS: &[&str] = &["WHERE", "SELECT", "CASE"];
const RESERVED: &[&str] = &[
    "AND",
    "OR",
    "NOT",
    "IN",
    "IS",
    "NULL",
    "LIKE",
    "MATCH",
    "CONTAINS",
    "STARTSWITH",
    "ENDSWITH",
];

/// A parsed condition expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Predicate(Predicate),
}

/// A single `path <op> literal` (or `path IS [NOT] NULL`) test.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub path: FieldPath,
    pub test: Test,
}

#[derive(Debug, Clone)]
pub enum Test {
    Eq(Literal),
    NotEq(Literal),
    Lt(Literal),
    Le(Literal),
    Gt(Literal),
    Ge(Literal),
    In(Vec<Literal>),
    NotIn(Vec<Literal>),
    Contains(String),
    NotContains(String),
    StartsWith(String),
    NotStartsWith(String),
    EndsWith(String),
    NotEndsWith(String),
    /// `MATCH 'pat'`: `*` = any run, `?` = any one char, anchored.
    WildcardMatch { pattern: String, regex: Regex },
    /// `LIKE 'pat'`: SQL `%` / `_`, anchored.
    Like { pattern: String, regex: Regex },
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Literal {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Num(n) => Some(*n),
            Literal::Str(s) => s.trim().parse().ok(),
            Literal::Bool(_) => None,
        }
    }

    /// Scalar string form used by the loose-equality comparison.
    pub fn text_form(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            Literal::Num(n) => format_num(*n),
            Literal::Bool(b) => b.to_string(),
        }
    }
}

/// Render a number the way `serde_json` renders it (no trailing `.0` for
/// integral values), so `5` and `5.0` compare equal in text form.
pub(crate) fn format_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Parse a condition string into an expression tree.
pub fn parse(input: &str) -> Result<Expr, ConditionError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.parse_or(0)?;
    if let Some(token) = parser.peek() {
        return Err(match token.tok {
            Tok::RParen => ConditionError::UnbalancedParens {
                offset: token.offset,
            },
            _ => ConditionError::TrailingInput {
                found: token.describe(),
                offset: token.offset,
            },
        });
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Str(String),
    Num(f64),
    Word(String),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

impl Token {
    fn describe(&self) -> String {
        match &self.tok {
            Tok::LParen => "(".to_string(),
            Tok::RParen => ")".to_string(),
            Tok::Comma => ",".to_string(),
            Tok::Eq => "=".to_string(),
            Tok::Ne => "!=".to_string(),
            Tok::Lt => "<".to_string(),
            Tok::Le => "<=".to_string(),
            Tok::Gt => ">".to_string(),
            Tok::Ge => ">=".to_string(),
            Tok::Str(s) => format!("'{}'", s),
            Tok::Num(n) => format_num(*n),
            Tok::Word(w) => w.clone(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.tok, Tok::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn lex(input: &str) -> Result<Vec<Token>, ConditionError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token {
                    tok: Tok::LParen,
                    offset: i,
                });
                i += 1;
            }
            ')' => {
                tokens.push(Token {
                    tok: Tok::RParen,
                    offset: i,
                });
                i += 1;
            }
            ',' => {
                tokens.push(Token {
                    tok: Tok::Comma,
                    offset: i,
                });
                i += 1;
            }
            '\'' => {
                let (value, next) = lex_string(input, i)?;
                tokens.push(Token {
                    tok: Tok::Str(value),
                    offset: i,
                });
                i = next;
            }
            '=' => {
                tokens.push(Token {
                    tok: Tok::Eq,
                    offset: i,
                });
                i += 1;
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token {
                        tok: Tok::Ne,
                        offset: i,
                    });
                    i += 2;
                } else {
                    return Err(ConditionError::UnknownOperator {
                        found: "!".to_string(),
                        offset: i,
                    });
                }
            }
            '<' => match bytes.get(i + 1) {
                Some(&b'=') => {
                    tokens.push(Token {
                        tok: Tok::Le,
                        offset: i,
                    });
                    i += 2;
                }
                Some(&b'>') => {
                    tokens.push(Token {
                        tok: Tok::Ne,
                        offset: i,
                    });
                    i += 2;
                }
                _ => {
                    tokens.push(Token {
                        tok: Tok::Lt,
                        offset: i,
                    });
                    i += 1;
                }
            },
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token {
                        tok: Tok::Ge,
                        offset: i,
                    });
                    i += 2;
                } else {
                    tokens.push(Token {
                        tok: Tok::Gt,
                        offset: i,
                    });
                    i += 1;
                }
            }
            _ => {
                let start = i;
                while i < bytes.len() && !is_word_break(bytes[i] as char) {
                    i += 1;
                }
                let word = &input[start..i];
                let first = word.chars().next().unwrap_or(' ');
                let numeric = first.is_ascii_digit() || (first == '-' && word.len() > 1);
                if numeric && let Ok(n) = word.parse::<f64>() {
                    tokens.push(Token {
                        tok: Tok::Num(n),
                        offset: start,
                    });
                } else {
                    tokens.push(Token {
                        tok: Tok::Word(word.to_string()),
                        offset: start,
                    });
                }
            }
        }
    }
    Ok(tokens)
}

fn is_word_break(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\r' | '\n' | '(' | ')' | ',' | '\'' | '=' | '!' | '<' | '>'
    )
}

/// Scan a single-quoted string starting at `open`; `''` is a literal quote.
/// Returns the unescaped value and the byte index after the closing quote.
fn lex_string(input: &str, open: usize) -> Result<(String, usize), ConditionError> {
    let bytes = input.as_bytes();
    let mut value = String::new();
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                value.push('\'');
                i += 2;
            } else {
                return Ok((value, i + 1));
            }
        } else {
            let c = input[i..].chars().next().expect("in-bounds char");
            value.push(c);
            i += c.len_utf8();
        }
    }
    Err(ConditionError::UnterminatedString { offset: open })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self, depth: usize) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_and(depth)?;
        while self.eat_keyword("OR") {
            let rhs = self.parse_and(depth)?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self, depth: usize) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_unary(depth)?;
        while self.eat_keyword("AND") {
            let rhs = self.parse_unary(depth)?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, depth: usize) -> Result<Expr, ConditionError> {
        if depth >= MAX_DEPTH {
            return Err(ConditionError::TooDeep { max: MAX_DEPTH });
        }
        // NOT here is expression negation; `NOT CONTAINS` etc. only occur
        // after a path and are bound inside parse_predicate.
        if self.eat_keyword("NOT") {
            let inner = self.parse_unary(depth + 1)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary(depth)
    }

    fn parse_primary(&mut self, depth: usize) -> Result<Expr, ConditionError> {
        if let Some(token) = self.peek()
            && token.tok == Tok::LParen
        {
            let open = token.offset;
            self.pos += 1;
            if depth + 1 >= MAX_DEPTH {
                return Err(ConditionError::TooDeep { max: MAX_DEPTH });
            }
            let inner = self.parse_or(depth + 1)?;
            match self.next() {
                Some(t) if t.tok == Tok::RParen => Ok(inner),
                _ => Err(ConditionError::UnbalancedParens { offset: open }),
            }
        } else {
            self.parse_predicate()
        }
    }

    fn parse_predicate(&mut self) -> Result<Expr, ConditionError> {
        let token = self.next().ok_or(ConditionError::ExpectedPath {
            found: "end of input".to_string(),
            offset: self.end,
        })?;
        let path = match &token.tok {
            Tok::Word(w) => {
                let upper = w.to_ascii_uppercase();
                if SQL_KEYWORDS.contains(&upper.as_str()) {
                    return Err(ConditionError::SqlKeyword {
                        keyword: w.clone(),
                        offset: token.offset,
                    });
                }
                if RESERVED.contains(&upper.as_str()) {
                    return Err(ConditionError::ExpectedPath {
                        found: w.clone(),
                        offset: token.offset,
                    });
                }
                FieldPath::parse(w)
            }
            _ => {
                return Err(ConditionError::ExpectedPath {
                    found: token.describe(),
                    offset: token.offset,
                });
            }
        };

        let test = self.parse_test(&path)?;
        Ok(Expr::Predicate(Predicate { path, test }))
    }

    fn parse_test(&mut self, path: &FieldPath) -> Result<Test, ConditionError> {
        let op = self.next().ok_or(ConditionError::ExpectedOperator {
            path: path.raw().to_string(),
            offset: self.end,
        })?;
        match &op.tok {
            Tok::Eq => Ok(Test::Eq(self.parse_literal("=")?)),
            Tok::Ne => Ok(Test::NotEq(self.parse_literal("!=")?)),
            Tok::Lt => Ok(Test::Lt(self.parse_literal("<")?)),
            Tok::Le => Ok(Test::Le(self.parse_literal("<=")?)),
            Tok::Gt => Ok(Test::Gt(self.parse_literal(">")?)),
            Tok::Ge => Ok(Test::Ge(self.parse_literal(">=")?)),
            Tok::Word(w) => self.parse_word_operator(w.clone(), op.offset),
            _ => Err(ConditionError::UnknownOperator {
                found: op.describe(),
                offset: op.offset,
            }),
        }
    }

    /// Keyword operators, longest match first: `IS [NOT] NULL`, `NOT IN`,
    /// `NOT CONTAINS`, `NOT STARTSWITH`, `NOT ENDSWITH` bind as one token.
    fn parse_word_operator(&mut self, word: String, offset: usize) -> Result<Test, ConditionError> {
        let upper = word.to_ascii_uppercase();
        match upper.as_str() {
            "IS" => {
                let negated = self.eat_keyword("NOT");
                if self.eat_keyword("NULL") {
                    Ok(if negated { Test::IsNotNull } else { Test::IsNull })
                } else {
                    let found = self
                        .peek()
                        .map_or_else(|| "end of input".to_string(), Token::describe);
                    Err(ConditionError::UnknownOperator {
                        found: if negated {
                            format!("IS NOT {}", found)
                        } else {
                            format!("IS {}", found)
                        },
                        offset,
                    })
                }
            }
            "NOT" => {
                let next = self.next().ok_or(ConditionError::TrailingOperator {
                    operator: "NOT".to_string(),
                    offset,
                })?;
                match &next.tok {
                    Tok::Word(w) => match w.to_ascii_uppercase().as_str() {
                        "IN" => Ok(Test::NotIn(self.parse_in_list(next.offset)?)),
                        "CONTAINS" => Ok(Test::NotContains(self.parse_string("NOT CONTAINS")?)),
                        "STARTSWITH" => {
                            Ok(Test::NotStartsWith(self.parse_string("NOT STARTSWITH")?))
                        }
                        "ENDSWITH" => Ok(Test::NotEndsWith(self.parse_string("NOT ENDSWITH")?)),
                        _ => Err(ConditionError::UnknownOperator {
                            found: format!("NOT {}", w),
                            offset,
                        }),
                    },
                    _ => Err(ConditionError::UnknownOperator {
                        found: format!("NOT {}", next.describe()),
                        offset,
                    }),
                }
            }
            "IN" => Ok(Test::In(self.parse_in_list(offset)?)),
            "CONTAINS" => Ok(Test::Contains(self.parse_string("CONTAINS")?)),
            "STARTSWITH" => Ok(Test::StartsWith(self.parse_string("STARTSWITH")?)),
            "ENDSWITH" => Ok(Test::EndsWith(self.parse_string("ENDSWITH")?)),
            "MATCH" => {
                let pattern = self.parse_string("MATCH")?;
                let regex = wildcard_regex(&pattern);
                Ok(Test::WildcardMatch { pattern, regex })
            }
            "LIKE" => {
                let pattern = self.parse_string("LIKE")?;
                let regex = like_regex(&pattern);
                Ok(Test::Like { pattern, regex })
            }
            _ => Err(ConditionError::UnknownOperator {
                found: word,
                offset,
            }),
        }
    }

    fn parse_literal(&mut self, operator: &str) -> Result<Literal, ConditionError> {
        let token = self.next().ok_or(ConditionError::TrailingOperator {
            operator: operator.to_string(),
            offset: self.end,
        })?;
        match &token.tok {
            Tok::Str(s) => Ok(Literal::Str(s.clone())),
            Tok::Num(n) => Ok(Literal::Num(*n)),
            Tok::Word(w) if w.eq_ignore_ascii_case("true") => Ok(Literal::Bool(true)),
            Tok::Word(w) if w.eq_ignore_ascii_case("false") => Ok(Literal::Bool(false)),
            _ => Err(ConditionError::ExpectedLiteral {
                found: token.describe(),
                offset: token.offset,
            }),
        }
    }

    fn parse_string(&mut self, operator: &str) -> Result<String, ConditionError> {
        let token = self.next().ok_or(ConditionError::TrailingOperator {
            operator: operator.to_string(),
            offset: self.end,
        })?;
        match &token.tok {
            Tok::Str(s) => Ok(s.clone()),
            _ => Err(ConditionError::ExpectedLiteral {
                found: token.describe(),
                offset: token.offset,
            }),
        }
    }

    fn parse_in_list(&mut self, op_offset: usize) -> Result<Vec<Literal>, ConditionError> {
        let open = match self.next() {
            Some(t) if t.tok == Tok::LParen => t.offset,
            Some(t) => {
                return Err(ConditionError::ExpectedLiteral {
                    found: t.describe(),
                    offset: t.offset,
                });
            }
            None => {
                return Err(ConditionError::TrailingOperator {
                    operator: "IN".to_string(),
                    offset: op_offset,
                });
            }
        };
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(t) if t.tok == Tok::RParen => {
                    self.pos += 1;
                    if items.is_empty() {
                        return Err(ConditionError::EmptyInList { offset: open });
                    }
                    return Ok(items);
                }
                Some(_) => {
                    items.push(self.parse_literal("IN")?);
                    if self.peek().is_some_and(|t| t.tok == Tok::Comma) {
                        self.pos += 1;
                    }
                }
                None => return Err(ConditionError::UnbalancedParens { offset: open }),
            }
        }
    }
}

fn wildcard_regex(pattern: &str) -> Regex {
    let mut re = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            _ => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).expect("escaped wildcard pattern")
}

fn like_regex(pattern: &str) -> Regex {
    let mut re = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            _ => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).expect("escaped like pattern")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_equality() {
        let expr = parse("eventName = 'ConsoleLogin'").unwrap();
        match expr {
            Expr::Predicate(p) => {
                assert_eq!(p.path.raw(), "eventName");
                assert!(matches!(p.test, Test::Eq(Literal::Str(ref s)) if s == "ConsoleLogin"));
            }
            other => panic!("expected predicate, got {:?}", other),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // a = 1 OR b = 2 AND c = 3  =>  a=1 OR (b=2 AND c=3)
        let expr = parse("a = 1 OR b = 2 AND c = 3").unwrap();
        match expr {
            Expr::Or(lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Predicate(_)));
                assert!(matches!(*rhs, Expr::And(_, _)));
            }
            other => panic!("expected OR at top, got {:?}", other),
        }
    }

    #[test]
    fn test_parens_override_precedence() {
        let expr = parse("(a = 1 OR b = 2) AND c = 3").unwrap();
        match expr {
            Expr::And(lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Or(_, _)));
                assert!(matches!(*rhs, Expr::Predicate(_)));
            }
            other => panic!("expected AND at top, got {:?}", other),
        }
    }

    #[test]
    fn test_not_contains_binds_as_one_operator() {
        let expr = parse("userAgent NOT CONTAINS 'curl'").unwrap();
        match expr {
            Expr::Predicate(p) => {
                assert!(matches!(p.test, Test::NotContains(ref s) if s == "curl"));
            }
            other => panic!("expected predicate, got {:?}", other),
        }
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert!(parse("a = 1 and b = 2 Or not c = 3").is_ok());
        assert!(parse("x In ('a', 'b')").is_ok());
        assert!(parse("x is not null").is_ok());
    }

    #[test]
    fn test_quoted_strings_preserve_case_and_quotes() {
        let expr = parse("name = 'O''Brien AND Co'").unwrap();
        match expr {
            Expr::Predicate(p) => {
                assert!(matches!(p.test, Test::Eq(Literal::Str(ref s)) if s == "O'Brien AND Co"));
            }
            other => panic!("expected predicate, got {:?}", other),
        }
    }

    #[test]
    fn test_unbalanced_parens() {
        assert!(matches!(
            parse("(a = 1 AND b = 2"),
            Err(ConditionError::UnbalancedParens { .. })
        ));
        assert!(matches!(
            parse("a = 1) OR b = 2"),
            Err(ConditionError::UnbalancedParens { .. })
        ));
    }

    #[test]
    fn test_empty_in_list() {
        assert!(matches!(
            parse("x IN ()"),
            Err(ConditionError::EmptyInList { .. })
        ));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            parse("x = 'abc"),
            Err(ConditionError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_where_is_rejected() {
        assert!(matches!(
            parse("WHERE eventName = 'x'"),
            Err(ConditionError::SqlKeyword { ref keyword, .. }) if keyword == "WHERE"
        ));
    }

    #[test]
    fn test_trailing_operator() {
        assert!(matches!(
            parse("x ="),
            Err(ConditionError::TrailingOperator { .. })
        ));
    }

    #[test]
    fn test_unknown_operator() {
        assert!(matches!(
            parse("x BETWEEN 1"),
            Err(ConditionError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut deep = String::new();
        for _ in 0..(MAX_DEPTH + 1) {
            deep.push('(');
        }
        deep.push_str("a = 1");
        for _ in 0..(MAX_DEPTH + 1) {
            deep.push(')');
        }
        assert!(matches!(parse(&deep), Err(ConditionError::TooDeep { .. })));
    }

    #[test]
    fn test_numeric_and_bool_literals() {
        assert!(parse("count >= 10").is_ok());
        assert!(parse("score < -1.5").is_ok());
        assert!(parse("readOnly = true").is_ok());
        assert!(parse("readOnly = FALSE").is_ok());
    }
}
