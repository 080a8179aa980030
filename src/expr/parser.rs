//! Tokenizer and recursive-descent parser for the dynamic expression language.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! predicate  := or_expr
//! or_expr    := and_expr (("OR" | "||") and_expr)*
//! and_expr   := unary (("AND" | "&&") unary)*
//! unary      := "NOT" unary | "(" or_expr ")" | term
//! term       := path cmp operand
//!             | path "." method "(" operand ")"
//!             | path "Between" operand "and" operand
//! operand    := "@" digits | number | string | true | false | null
//! ordering   := path ["ASC" | "DESC"] ("," path ["ASC" | "DESC"])*
//! projection := path | "new" "(" path ("," path)* ")"
//! ```

use serde_json::Value;

use super::{CompareOp, Expr, FieldPath, Method, Operand, Selector, SortKey};
use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Param(usize),
    Literal(Value),
    Cmp(CompareOp),
    AndAnd,
    OrOr,
    Bang,
    Dot,
    Comma,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Param(i) => format!("@{}", i),
            Token::Literal(v) => v.to_string(),
            Token::Cmp(op) => op.symbol().to_string(),
            Token::AndAnd => "&&".to_string(),
            Token::OrOr => "||".to_string(),
            Token::Bang => "!".to_string(),
            Token::Dot => ".".to_string(),
            Token::Comma => ",".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '=' => {
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                Token::Cmp(CompareOp::Eq)
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    Token::Cmp(CompareOp::NotEq)
                } else {
                    i += 1;
                    Token::Bang
                }
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    i += 2;
                    Token::Cmp(CompareOp::LtEq)
                }
                Some('>') => {
                    i += 2;
                    Token::Cmp(CompareOp::NotEq)
                }
                _ => {
                    i += 1;
                    Token::Cmp(CompareOp::Lt)
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    Token::Cmp(CompareOp::GtEq)
                } else {
                    i += 1;
                    Token::Cmp(CompareOp::Gt)
                }
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                i += 2;
                Token::AndAnd
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                i += 2;
                Token::OrOr
            }
            '@' => {
                i += 1;
                let digits_start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let raw: String = chars[digits_start..i].iter().collect();
                let index = raw
                    .parse::<usize>()
                    .map_err(|_| ExprError::InvalidNumber {
                        pos: start,
                        raw: format!("@{}", raw),
                    })?;
                Token::Param(index)
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(ExprError::UnterminatedString { pos: start }),
                        Some('\\') if i + 1 < chars.len() => {
                            s.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                Token::Literal(Value::String(s))
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let value = serde_json::from_str::<Value>(&raw)
                    .map_err(|_| ExprError::InvalidNumber { pos: start, raw })?;
                Token::Literal(value)
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                    i += 1;
                }
                Token::Ident(chars[start..i].iter().collect())
            }
            other => return Err(ExprError::UnexpectedChar { pos: start, found: other }),
        };

        tokens.push((start, token));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, ExprError> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(_, t)| t)
    }

    fn next(&mut self, expected: &'static str) -> Result<(usize, Token), ExprError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, want: Token, expected: &'static str) -> Result<(), ExprError> {
        let (pos, token) = self.next(expected)?;
        if token == want {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                pos,
                found: token.describe(),
                expected,
            })
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn finish(&self) -> Result<(), ExprError> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some((pos, token)) => Err(ExprError::UnexpectedToken {
                pos: *pos,
                found: token.describe(),
                expected: "end of expression",
            }),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExprError> {
        let mut terms = vec![self.and_expr()?];
        while self.is_keyword("or") || self.peek() == Some(&Token::OrOr) {
            self.pos += 1;
            terms.push(self.and_expr()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut terms = vec![self.unary()?];
        while self.is_keyword("and") || self.peek() == Some(&Token::AndAnd) {
            self.pos += 1;
            terms.push(self.unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.is_keyword("not") || self.peek() == Some(&Token::Bang) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or_expr()?;
            self.expect(Token::RParen, "')'")?;
            return Ok(inner);
        }
        self.term()
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let field = self.path()?;

        if self.peek() == Some(&Token::Dot) {
            // path() stops before a member call.
            self.pos += 1;
            let (pos, token) = self.next("method name")?;
            let name = match token {
                Token::Ident(name) => name,
                other => {
                    return Err(ExprError::UnexpectedToken {
                        pos,
                        found: other.describe(),
                        expected: "method name",
                    })
                }
            };
            let method = Method::parse(&name).ok_or(ExprError::UnknownMethod { pos, name })?;
            self.expect(Token::LParen, "'('")?;
            let arg = self.operand()?;
            self.expect(Token::RParen, "')'")?;
            return Ok(Expr::Call { field, method, arg });
        }

        if self.is_keyword("between") {
            self.pos += 1;
            let low = self.operand()?;
            if !self.is_keyword("and") {
                let (pos, token) = self.next("'and'")?;
                return Err(ExprError::UnexpectedToken {
                    pos,
                    found: token.describe(),
                    expected: "'and'",
                });
            }
            self.pos += 1;
            let high = self.operand()?;
            return Ok(Expr::Between { field, low, high });
        }

        let (pos, token) = self.next("comparison operator")?;
        match token {
            Token::Cmp(op) => {
                let value = self.operand()?;
                Ok(Expr::Compare { field, op, value })
            }
            other => Err(ExprError::UnexpectedToken {
                pos,
                found: other.describe(),
                expected: "comparison operator",
            }),
        }
    }

    /// `ident ('.' ident)*`, stopping before a `.method(` member call.
    fn path(&mut self) -> Result<FieldPath, ExprError> {
        let (pos, token) = self.next("field name")?;
        let mut segments = match token {
            Token::Ident(name) => vec![name],
            other => {
                return Err(ExprError::UnexpectedToken {
                    pos,
                    found: other.describe(),
                    expected: "field name",
                })
            }
        };

        while self.peek() == Some(&Token::Dot) {
            match (self.peek_at(1), self.peek_at(2)) {
                (Some(Token::Ident(_)), Some(Token::LParen)) => break,
                (Some(Token::Ident(name)), _) => {
                    segments.push(name.clone());
                    self.pos += 2;
                }
                _ => break,
            }
        }

        Ok(FieldPath(segments))
    }

    fn operand(&mut self) -> Result<Operand, ExprError> {
        let (pos, token) = self.next("operand")?;
        match token {
            Token::Param(i) => Ok(Operand::Param(i)),
            Token::Literal(v) => Ok(Operand::Literal(v)),
            Token::Ident(s) if s.eq_ignore_ascii_case("true") => Ok(Operand::Literal(Value::Bool(true))),
            Token::Ident(s) if s.eq_ignore_ascii_case("false") => Ok(Operand::Literal(Value::Bool(false))),
            Token::Ident(s) if s.eq_ignore_ascii_case("null") => Ok(Operand::Literal(Value::Null)),
            other => Err(ExprError::UnexpectedToken {
                pos,
                found: other.describe(),
                expected: "operand",
            }),
        }
    }

    fn sort_key(&mut self) -> Result<SortKey, ExprError> {
        let field = self.path()?;
        let ascending = if self.is_keyword("asc") || self.is_keyword("ascending") {
            self.pos += 1;
            true
        } else if self.is_keyword("desc") || self.is_keyword("descending") {
            self.pos += 1;
            false
        } else {
            true
        };
        Ok(SortKey { field, ascending })
    }
}

/// Parse a textual filter predicate.
pub fn parse_predicate(text: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(text)?;
    let expr = parser.or_expr()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse an ordering clause such as `Name ASC,Number DESC`.
pub fn parse_ordering(text: &str) -> Result<Vec<SortKey>, ExprError> {
    let mut parser = Parser::new(text)?;
    let mut keys = vec![parser.sort_key()?];
    while parser.peek() == Some(&Token::Comma) {
        parser.pos += 1;
        keys.push(parser.sort_key()?);
    }
    parser.finish()?;
    Ok(keys)
}

/// Parse a projection selector: a single path or `new(a, b, ...)`.
pub fn parse_projection(text: &str) -> Result<Selector, ExprError> {
    let mut parser = Parser::new(text)?;
    let selector = if parser.is_keyword("new") && parser.peek_at(1) == Some(&Token::LParen) {
        parser.pos += 2;
        let mut fields = vec![parser.path()?];
        while parser.peek() == Some(&Token::Comma) {
            parser.pos += 1;
            fields.push(parser.path()?);
        }
        parser.expect(Token::RParen, "')'")?;
        Selector::Record(fields)
    } else {
        Selector::Field(parser.path()?)
    };
    parser.finish()?;
    Ok(selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> FieldPath {
        FieldPath(s.split('.').map(String::from).collect())
    }

    #[test]
    fn test_parse_comparison() {
        let expr = parse_predicate("Number > @0").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                field: path("Number"),
                op: CompareOp::Gt,
                value: Operand::Param(0),
            }
        );
    }

    #[test]
    fn test_parse_all_comparison_symbols() {
        for (text, op) in [
            ("A == @0", CompareOp::Eq),
            ("A = @0", CompareOp::Eq),
            ("A != @0", CompareOp::NotEq),
            ("A <> @0", CompareOp::NotEq),
            ("A < @0", CompareOp::Lt),
            ("A <= @0", CompareOp::LtEq),
            ("A > @0", CompareOp::Gt),
            ("A >= @0", CompareOp::GtEq),
        ] {
            match parse_predicate(text).unwrap() {
                Expr::Compare { op: parsed, .. } => assert_eq!(parsed, op, "{}", text),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_parse_method_call() {
        let expr = parse_predicate("Name.StartsWith(@0)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                field: path("Name"),
                method: Method::StartsWith,
                arg: Operand::Param(0),
            }
        );
    }

    #[test]
    fn test_parse_nested_path_with_method() {
        let expr = parse_predicate("Address.City.EndsWith(\"ville\")").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                field: path("Address.City"),
                method: Method::EndsWith,
                arg: Operand::Literal(json!("ville")),
            }
        );
    }

    #[test]
    fn test_parse_between() {
        let expr = parse_predicate("Number Between @0 and @1").unwrap();
        assert_eq!(
            expr,
            Expr::Between {
                field: path("Number"),
                low: Operand::Param(0),
                high: Operand::Param(1),
            }
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_predicate("A == @0 OR B == @1 AND C == @2").unwrap();
        match expr {
            Expr::Or(terms) => {
                assert_eq!(terms.len(), 2);
                assert!(matches!(terms[0], Expr::Compare { .. }));
                assert!(matches!(&terms[1], Expr::And(inner) if inner.len() == 2));
            }
            other => panic!("expected OR at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_between_and_does_not_split_conjunction() {
        let expr = parse_predicate("N Between @0 and @1 AND Name == @2").unwrap();
        match expr {
            Expr::And(terms) => {
                assert!(matches!(terms[0], Expr::Between { .. }));
                assert!(matches!(terms[1], Expr::Compare { .. }));
            }
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_parentheses_and_not() {
        let expr = parse_predicate("NOT (A == 1 || B == 2) && C == true").unwrap();
        match expr {
            Expr::And(terms) => {
                assert!(matches!(&terms[0], Expr::Not(inner) if matches!(**inner, Expr::Or(_))));
            }
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_literals() {
        match parse_predicate("Score >= -1.5").unwrap() {
            Expr::Compare { value, .. } => assert_eq!(value, Operand::Literal(json!(-1.5))),
            other => panic!("unexpected {:?}", other),
        }
        match parse_predicate("Name == 'O\\'Brien'").unwrap() {
            Expr::Compare { value, .. } => assert_eq!(value, Operand::Literal(json!("O'Brien"))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_predicate("Number >"),
            Err(ExprError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            parse_predicate("Name.Matches(@0)"),
            Err(ExprError::UnknownMethod { .. })
        ));
        assert!(matches!(
            parse_predicate("Name == \"open"),
            Err(ExprError::UnterminatedString { pos: 8 })
        ));
        assert!(matches!(
            parse_predicate("A == @0 B"),
            Err(ExprError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_predicate("A # @0"),
            Err(ExprError::UnexpectedChar { found: '#', .. })
        ));
    }

    #[test]
    fn test_parse_ordering() {
        let keys = parse_ordering("Name ASC,Number DESC,Id").unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys[0].ascending);
        assert!(!keys[1].ascending);
        assert!(keys[2].ascending);
        assert_eq!(keys[1].field, path("Number"));
    }

    #[test]
    fn test_parse_projection() {
        assert_eq!(parse_projection("Name").unwrap(), Selector::Field(path("Name")));
        assert_eq!(
            parse_projection("new(Name,Number)").unwrap(),
            Selector::Record(vec![path("Name"), path("Number")])
        );
        assert!(parse_projection("new(Name").is_err());
    }
}
