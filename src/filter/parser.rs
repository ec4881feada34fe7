//! Recursive-descent parser for the canonical filter syntax
//!
//! ```text
//! filter     := or_expr
//! or_expr    := and_expr ( ("OR" | "||") and_expr )*
//! and_expr   := unary ( ("AND" | "&&") unary )*
//! unary      := "!" unary | primary
//! primary    := "(" filter ")" | "#" name | comparison | string
//! comparison := operand op operand | boolean-field
//! ```

use std::iter::Peekable;
use std::str::CharIndices;

use super::ast::{FieldRef, Literal, LogicalExpression, Node, Operand, Pattern};
use super::error::FilterParseError;
use super::eval::DEFAULT_MAX_DEPTH;
use super::operator::{ComparisonOperator, LogicalOperator};
use super::registry::FilterRegistry;
use super::resolver::{DATE_FORMAT, FieldCatalog, FieldType, format_number, parse_date};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Bang,
    And,
    Or,
    Op(ComparisonOperator),
    Ident(String),
    Alias(String),
    Str(String),
    Regex(String),
    Number(f64),
    Bool(bool),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Op(op) => format!("operator {op}"),
            Token::Ident(name) => format!("'{name}'"),
            Token::Alias(name) => format!("'#{name}'"),
            Token::Str(s) => format!("string \"{s}\""),
            Token::Regex(source) => format!("pattern /{source}/"),
            Token::Number(n) => format!("number {}", format_number(*n)),
            Token::Bool(b) => b.to_string(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn keyword(word: &str) -> Token {
    match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "TRUE" => Token::Bool(true),
        "FALSE" => Token::Bool(false),
        "CONTAINS" => Token::Op(ComparisonOperator::Contains),
        "IN" => Token::Op(ComparisonOperator::In),
        "MATCHES" => Token::Op(ComparisonOperator::Matches),
        _ => Token::Ident(word.to_string()),
    }
}

struct Lexer<'s> {
    input: &'s str,
    chars: Peekable<CharIndices<'s>>,
}

/// Split `input` into tokens paired with their byte offsets
fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, FilterParseError> {
    let mut lexer = Lexer {
        input,
        chars: input.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    while let Some(&(position, c)) = lexer.chars.peek() {
        if c.is_whitespace() {
            lexer.chars.next();
            continue;
        }
        lexer.chars.next();
        tokens.push((lexer.token(position, c)?, position));
    }
    Ok(tokens)
}

impl<'s> Lexer<'s> {
    fn token(&mut self, position: usize, c: char) -> Result<Token, FilterParseError> {
        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '!' if self.eat('=') => Token::Op(ComparisonOperator::NotEqual),
            '!' => Token::Bang,
            '=' if self.eat('=') => Token::Op(ComparisonOperator::Equal),
            '<' if self.eat('=') => Token::Op(ComparisonOperator::LessThanEqual),
            '<' => Token::Op(ComparisonOperator::LessThan),
            '>' if self.eat('=') => Token::Op(ComparisonOperator::GreaterThanEqual),
            '>' => Token::Op(ComparisonOperator::GreaterThan),
            '&' if self.eat('&') => Token::And,
            '|' if self.eat('|') => Token::Or,
            '#' => {
                let name = self.scan_from(position + 1, is_name_char);
                if name.is_empty() {
                    return Err(FilterParseError::UnexpectedToken {
                        found: "'#'".to_string(),
                        expected: "a filter name after '#'",
                        position,
                    });
                }
                Token::Alias(name.to_string())
            }
            '"' | '\'' => Token::Str(self.string(c, position)?),
            '/' => Token::Regex(self.regex(position)?),
            '-' if self.peek_is(|next| next.is_ascii_digit() || next == '.') => {
                Token::Number(self.number(position)?)
            }
            c if c.is_ascii_digit() => Token::Number(self.number(position)?),
            c if c.is_ascii_alphabetic() || c == '_' => keyword(self.scan_from(position, is_name_char)),
            other => {
                return Err(FilterParseError::UnexpectedToken {
                    found: format!("'{other}'"),
                    expected: "a filter term",
                    position,
                });
            }
        };
        Ok(token)
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|&(_, c)| c == expected).is_some()
    }

    fn peek_is(&mut self, pred: impl Fn(char) -> bool) -> bool {
        self.chars.peek().is_some_and(|&(_, c)| pred(c))
    }

    /// Consume characters matching `pred`, returning the input from `start`
    fn scan_from(&mut self, start: usize, mut pred: impl FnMut(char) -> bool) -> &'s str {
        let mut end = self.input.len();
        while let Some(&(i, c)) = self.chars.peek() {
            if !pred(c) {
                end = i;
                break;
            }
            self.chars.next();
        }
        &self.input[start..end]
    }

    fn number(&mut self, start: usize) -> Result<f64, FilterParseError> {
        let mut prev = ' ';
        let text = self.scan_from(start, |c| {
            let accepted = c.is_ascii_digit()
                || matches!(c, '.' | 'e' | 'E')
                || (matches!(c, '+' | '-') && matches!(prev, 'e' | 'E'));
            prev = c;
            accepted
        });
        text.parse::<f64>()
            .map_err(|_| FilterParseError::InvalidNumber(text.to_string()))
    }

    fn string(&mut self, quote: char, start: usize) -> Result<String, FilterParseError> {
        let mut value = String::new();
        while let Some((position, c)) = self.chars.next() {
            match c {
                c if c == quote => return Ok(value),
                '\\' => value.push(self.escape(position)?),
                c => value.push(c),
            }
        }
        Err(FilterParseError::Unterminated {
            kind: "string",
            position: start,
        })
    }

    fn escape(&mut self, position: usize) -> Result<char, FilterParseError> {
        let Some((_, c)) = self.chars.next() else {
            return Err(FilterParseError::Unterminated {
                kind: "escape sequence",
                position,
            });
        };
        let unescaped = match c {
            '"' => '"',
            '\'' => '\'',
            '\\' => '\\',
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'u' => {
                let hex: String = (0..4).filter_map(|_| self.chars.next().map(|(_, h)| h)).collect();
                let code = (hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit()))
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                code.ok_or_else(|| FilterParseError::InvalidEscape {
                    sequence: format!("u{hex}"),
                    position,
                })?
            }
            other => {
                return Err(FilterParseError::InvalidEscape {
                    sequence: other.to_string(),
                    position,
                });
            }
        };
        Ok(unescaped)
    }

    /// Body of a `/.../` literal; `\/` stands for a slash, other escapes are kept
    fn regex(&mut self, start: usize) -> Result<String, FilterParseError> {
        let mut source = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '/' => return Ok(source),
                '\\' => match self.chars.next() {
                    Some((_, '/')) => source.push('/'),
                    Some((_, next)) => {
                        source.push('\\');
                        source.push(next);
                    }
                    None => break,
                },
                c => source.push(c),
            }
        }
        Err(FilterParseError::Unterminated {
            kind: "regular expression",
            position: start,
        })
    }
}

/// Parses filter strings against a field catalog
///
/// Identifiers are looked up in the catalog first. When a registry is
/// attached, an identifier naming a saved filter becomes a rule operand.
#[derive(Clone, Copy)]
pub struct FilterParser<'a> {
    catalog: &'a dyn FieldCatalog,
    registry: Option<&'a dyn FilterRegistry>,
    max_depth: usize,
}

impl<'a> FilterParser<'a> {
    pub fn new(catalog: &'a dyn FieldCatalog) -> Self {
        Self {
            catalog,
            registry: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit on nested negations and groups
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_registry(mut self, registry: &'a dyn FilterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Parse `input` into a tree whose root is always a logical expression
    pub fn parse(&self, input: &str) -> Result<Node, FilterParseError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(FilterParseError::Empty);
        }

        let mut cursor = Cursor {
            parser: self,
            tokens,
            pos: 0,
            depth: 0,
        };
        let node = cursor.or_expr()?;
        if let Some((token, position)) = cursor.next() {
            return Err(FilterParseError::UnexpectedToken {
                found: token.describe(),
                expected: "AND, OR or the end of the filter",
                position,
            });
        }

        Ok(match node {
            Node::Expression(expr) => Node::Expression(expr),
            other => Node::Expression(LogicalExpression::new(LogicalOperator::And, other)),
        })
    }

    fn is_rule(&self, name: &str) -> bool {
        self.registry
            .is_some_and(|registry| registry.lookup(name).is_some())
    }
}

/// Parse `input` with an optional registry for rule-name operands
pub fn parse_filter(
    input: &str,
    catalog: &dyn FieldCatalog,
    registry: Option<&dyn FilterRegistry>,
) -> Result<Node, FilterParseError> {
    let parser = FilterParser::new(catalog);
    match registry {
        Some(registry) => parser.with_registry(registry).parse(input),
        None => parser.parse(input),
    }
}

struct Cursor<'p, 'a> {
    parser: &'p FilterParser<'a>,
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Cursor<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let entry = self.tokens.get(self.pos).cloned();
        if entry.is_some() {
            self.pos += 1;
        }
        entry
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn at_operator(&self) -> bool {
        matches!(self.peek(), Some(Token::Op(_)))
    }

    fn or_expr(&mut self) -> Result<Node, FilterParseError> {
        let first = self.and_expr()?;
        if self.peek() != Some(&Token::Or) {
            return Ok(first);
        }
        let mut expr = LogicalExpression::new(LogicalOperator::Or, first);
        while self.eat(&Token::Or) {
            expr = expr.with_child(self.and_expr()?);
        }
        Ok(Node::Expression(expr))
    }

    fn and_expr(&mut self) -> Result<Node, FilterParseError> {
        let first = self.unary()?;
        if self.peek() != Some(&Token::And) {
            return Ok(first);
        }
        let mut expr = LogicalExpression::new(LogicalOperator::And, first);
        while self.eat(&Token::And) {
            expr = expr.with_child(self.unary()?);
        }
        Ok(Node::Expression(expr))
    }

    /// Every nested group and negation passes through here
    fn unary(&mut self) -> Result<Node, FilterParseError> {
        if self.depth >= self.parser.max_depth {
            return Err(FilterParseError::TooDeep {
                max_depth: self.parser.max_depth,
                position: self.position(),
            });
        }

        self.depth += 1;
        let node = if self.eat(&Token::Bang) {
            self.unary().map(Node::not)
        } else {
            self.primary()
        };
        self.depth -= 1;
        node
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(_, position)| *position)
    }

    fn primary(&mut self) -> Result<Node, FilterParseError> {
        let Some((token, position)) = self.next() else {
            return Err(FilterParseError::UnexpectedEnd("a filter term"));
        };

        match token {
            Token::LParen => {
                let node = self.or_expr()?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(node),
                    Some((token, position)) => Err(FilterParseError::UnexpectedToken {
                        found: token.describe(),
                        expected: "')'",
                        position,
                    }),
                    None => Err(FilterParseError::UnexpectedEnd("')'")),
                }
            }
            Token::Alias(name) => Ok(Node::alias(name)),
            Token::Str(term) if !self.at_operator() => Ok(Node::search(term)),
            Token::Ident(name) if !self.at_operator() => self.bare_identifier(name),
            token => {
                let left = self.operand(token, position)?;
                let (op, op_position) = self.operator()?;
                let Some((token, position)) = self.next() else {
                    return Err(FilterParseError::UnexpectedEnd("a value after the operator"));
                };
                let right = self.operand(token, position)?;
                comparison(left, op, right, op_position)
            }
        }
    }

    /// An identifier standing alone: a boolean field or a saved filter
    fn bare_identifier(&mut self, name: String) -> Result<Node, FilterParseError> {
        match self.parser.catalog.field_type(&name) {
            Some(FieldType::Boolean) => Ok(Node::comparison(
                Operand::field(name, FieldType::Boolean),
                ComparisonOperator::Equal,
                Operand::boolean(true),
            )),
            Some(_) => Err(match self.next() {
                Some((token, position)) => FilterParseError::UnexpectedToken {
                    found: token.describe(),
                    expected: "a comparison operator",
                    position,
                },
                None => FilterParseError::UnexpectedEnd("a comparison operator"),
            }),
            None if self.parser.is_rule(&name) => Ok(Node::alias(name)),
            None => Err(FilterParseError::UnknownField(name)),
        }
    }

    fn operator(&mut self) -> Result<(ComparisonOperator, usize), FilterParseError> {
        match self.next() {
            Some((Token::Op(op), position)) => Ok((op, position)),
            Some((token, position)) => Err(FilterParseError::UnexpectedToken {
                found: token.describe(),
                expected: "a comparison operator",
                position,
            }),
            None => Err(FilterParseError::UnexpectedEnd("a comparison operator")),
        }
    }

    fn operand(&mut self, token: Token, position: usize) -> Result<Operand, FilterParseError> {
        let operand = match token {
            Token::Ident(name) => self.identifier(name)?,
            Token::Str(s) => Operand::text(s),
            Token::Regex(source) => Operand::Literal(Literal::Pattern(compile(source)?)),
            Token::Number(n) => Operand::number(n),
            Token::Bool(b) => Operand::boolean(b),
            Token::LBracket => self.set(position)?,
            other => {
                return Err(FilterParseError::UnexpectedToken {
                    found: other.describe(),
                    expected: "a field or a value",
                    position,
                });
            }
        };
        Ok(operand)
    }

    fn identifier(&self, name: String) -> Result<Operand, FilterParseError> {
        if let Some(field_type) = self.parser.catalog.field_type(&name) {
            return Ok(Operand::field(name, field_type));
        }
        if self.parser.is_rule(&name) {
            return Ok(Operand::Rule(name));
        }
        if name == "NaN" {
            return Ok(Operand::number(f64::NAN));
        }
        Err(FilterParseError::UnknownField(name))
    }

    fn set(&mut self, start: usize) -> Result<Operand, FilterParseError> {
        let unterminated = FilterParseError::Unterminated {
            kind: "set",
            position: start,
        };
        let mut values = Vec::new();
        // an empty set is valid and matches nothing
        if self.eat(&Token::RBracket) {
            return Ok(Operand::Literal(Literal::Set(values)));
        }
        loop {
            match self.next() {
                Some((Token::Str(s), _)) => values.push(s),
                Some((Token::Number(n), _)) => values.push(format_number(n)),
                Some((token, position)) => {
                    return Err(FilterParseError::UnexpectedToken {
                        found: token.describe(),
                        expected: "a string or number inside the set",
                        position,
                    });
                }
                None => return Err(unterminated),
            }
            match self.next() {
                Some((Token::Comma, _)) => {}
                Some((Token::RBracket, _)) => return Ok(Operand::Literal(Literal::Set(values))),
                Some((token, position)) => {
                    return Err(FilterParseError::UnexpectedToken {
                        found: token.describe(),
                        expected: "',' or ']'",
                        position,
                    });
                }
                None => return Err(unterminated),
            }
        }
    }
}

fn compile(source: String) -> Result<Pattern, FilterParseError> {
    Pattern::new(source.as_str()).map_err(|err| FilterParseError::InvalidPattern {
        pattern: source,
        message: err.to_string(),
    })
}

/// Build a comparison, typing its literal against the field it is compared with
fn comparison(
    left: Operand,
    op: ComparisonOperator,
    right: Operand,
    position: usize,
) -> Result<Node, FilterParseError> {
    let (left, right) = match (left, right) {
        (Operand::Literal(_), Operand::Literal(right)) => {
            return Err(FilterParseError::UnexpectedToken {
                found: describe_literal(&right),
                expected: "a field or filter name on one side of the comparison",
                position,
            });
        }
        (Operand::Field(field), Operand::Literal(literal)) => {
            let literal = type_literal(&field, op, literal)?;
            (Operand::Field(field), Operand::Literal(literal))
        }
        (Operand::Literal(literal), Operand::Field(field)) => {
            let literal = type_literal(&field, op.mirrored(), literal)?;
            (Operand::Literal(literal), Operand::Field(field))
        }
        pair => pair,
    };

    if is_pattern(&left) || is_pattern(&right) {
        check_pattern_operator(op, &left, &right)?;
    }

    if op.is_ordering()
        && let Some((name, field_type)) = subject(&left).or_else(|| subject(&right))
        && !field_type.is_ordered()
    {
        return Err(FilterParseError::IncompatibleOperator {
            op,
            field: name.to_string(),
            field_type,
        });
    }

    Ok(Node::comparison(left, op, right))
}

fn is_pattern(operand: &Operand) -> bool {
    matches!(operand, Operand::Literal(Literal::Pattern(_)))
}

/// Patterns only support search (`==`, `!=`) and full match (`MATCHES`)
fn check_pattern_operator(
    op: ComparisonOperator,
    left: &Operand,
    right: &Operand,
) -> Result<(), FilterParseError> {
    match op {
        ComparisonOperator::Equal | ComparisonOperator::NotEqual | ComparisonOperator::Matches => {
            Ok(())
        }
        op => Err(FilterParseError::InvalidValue {
            field: subject(left)
                .or_else(|| subject(right))
                .map_or_else(String::new, |(name, _)| name.to_string()),
            message: format!("operator {op} cannot be used with a pattern"),
        }),
    }
}

fn subject(operand: &Operand) -> Option<(&str, FieldType)> {
    match operand {
        Operand::Field(field) => Some((&field.name, field.field_type)),
        Operand::Rule(name) => Some((name, FieldType::Boolean)),
        Operand::Literal(_) => None,
    }
}

fn type_literal(
    field: &FieldRef,
    op: ComparisonOperator,
    literal: Literal,
) -> Result<Literal, FilterParseError> {
    match literal {
        Literal::Text(source) if op == ComparisonOperator::Matches => compile(source).map(Literal::Pattern),
        Literal::Text(s) if field.field_type == FieldType::Date => {
            parse_date(&s)
                .map(Literal::Date)
                .ok_or_else(|| FilterParseError::InvalidValue {
                    field: field.name.clone(),
                    message: format!("\"{s}\" is not a date in the canonical format {DATE_FORMAT}"),
                })
        }
        other => Ok(other),
    }
}

fn describe_literal(literal: &Literal) -> String {
    match literal {
        Literal::Text(s) => format!("string \"{s}\""),
        Literal::Pattern(p) => format!("pattern /{}/", p.source()),
        Literal::Date(_) => "date".to_string(),
        Literal::Number(n) => format!("number {}", format_number(*n)),
        Literal::Boolean(b) => b.to_string(),
        Literal::Set(_) => "set".to_string(),
    }
}
