//! Formula parser
//!
//! A recursive descent parser for spreadsheet formulas with the usual
//! operator precedence.

use crate::ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use sheetflow_core::{CellError, CellPosition};

/// Parse formula text into an AST
///
/// The leading `=` is optional.
///
/// # Example
/// ```rust
/// use sheetflow_formula::parse_formula;
///
/// let ast = parse_formula("=1+2").unwrap();
/// let ast = parse_formula("SUM(A1:A10)").unwrap();
/// let ast = parse_formula("='My Sheet'!$B$2*2").unwrap();
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<FormulaExpr> {
    let formula = formula.trim();
    let formula = formula.strip_prefix('=').unwrap_or(formula);
    if formula.trim().is_empty() {
        return Err(FormulaError::Parse("Empty formula".into()));
    }

    let mut parser = FormulaParser::new(formula);
    let expr = parser.parse_expression()?;

    if !matches!(parser.current_token(), Token::Eof) {
        return Err(FormulaError::Parse(format!(
            "Unexpected {:?} after expression",
            parser.current_token()
        )));
    }

    Ok(expr)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),

    // Identifiers and references
    Identifier(String),
    CellRef(String),
    SheetRef(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Colon,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,

    /// Character that cannot start any token
    Invalid(char),
    /// Unterminated string or quoted sheet name
    Unterminated,

    Eof,
}

struct FormulaParser<'a> {
    input: &'a str,
    pos: usize,
    current_token: Token,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str) -> Self {
        let mut parser = Self {
            input,
            pos: 0,
            current_token: Token::Eof,
        };
        parser.advance_token();
        parser
    }

    // === Token scanning ===

    fn advance_token(&mut self) {
        self.current_token = self.scan_token();
    }

    fn scan_token(&mut self) -> Token {
        self.skip_whitespace();

        let Some(c) = self.peek_char() else {
            return Token::Eof;
        };

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '%' => Some(Token::Percent),
            '&' => Some(Token::Ampersand),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '=' => Some(Token::Equal),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return token;
        }

        match c {
            '<' => {
                self.advance();
                match self.peek_char() {
                    Some('=') => {
                        self.advance();
                        Token::LessEqual
                    }
                    Some('>') => {
                        self.advance();
                        Token::NotEqual
                    }
                    _ => Token::LessThan,
                }
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Token::GreaterEqual
                } else {
                    Token::GreaterThan
                }
            }
            '"' => self.scan_string(),
            '\'' => self.scan_quoted_sheet(),
            c if c.is_ascii_digit()
                || (c == '.' && self.peek_char_at(1).map_or(false, |d| d.is_ascii_digit())) =>
            {
                self.scan_number()
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' || c == '#' => {
                self.scan_identifier_or_ref()
            }
            other => {
                self.advance();
                Token::Invalid(other)
            }
        }
    }

    /// Scan `"..."` with `""` as an escaped quote
    fn scan_delimited(&mut self, delimiter: char) -> Option<String> {
        self.advance();
        let mut s = String::new();
        while let Some(c) = self.peek_char() {
            self.advance();
            if c == delimiter {
                if self.peek_char() == Some(delimiter) {
                    s.push(delimiter);
                    self.advance();
                } else {
                    return Some(s);
                }
            } else {
                s.push(c);
            }
        }
        None
    }

    fn scan_string(&mut self) -> Token {
        match self.scan_delimited('"') {
            Some(s) => Token::String(s),
            None => Token::Unterminated,
        }
    }

    fn scan_quoted_sheet(&mut self) -> Token {
        match self.scan_delimited('\'') {
            Some(name) if self.peek_char() == Some('!') => {
                self.advance();
                Token::SheetRef(name)
            }
            _ => Token::Unterminated,
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;

        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E')
            && self
                .peek_char_at(1)
                .map_or(false, |c| c.is_ascii_digit() || c == '+' || c == '-')
        {
            self.advance();
            if self.peek_char().map_or(false, |c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        match self.input[start..self.pos].parse() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Invalid(self.input[start..].chars().next().unwrap_or('?')),
        }
    }

    fn scan_identifier_or_ref(&mut self) -> Token {
        if self.peek_char() == Some('#') {
            let start = self.pos;
            self.advance();
            while self
                .peek_char()
                .map_or(false, |c| c.is_ascii_alphanumeric() || c == '!' || c == '/' || c == '?')
            {
                self.advance();
            }
            let text = &self.input[start..self.pos];
            return match CellError::parse(text) {
                Some(err) => Token::Error(err),
                None => Token::Identifier(text.to_string()),
            };
        }

        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
        {
            self.advance();
        }
        let text = &self.input[start..self.pos];

        if self.peek_char() == Some('!') {
            self.advance();
            return Token::SheetRef(text.to_string());
        }

        let followed_by_paren = self.peek_char() == Some('(');
        let upper = text.to_ascii_uppercase();
        if !followed_by_paren && upper == "TRUE" {
            return Token::Boolean(true);
        }
        if !followed_by_paren && upper == "FALSE" {
            return Token::Boolean(false);
        }

        // LOG10(100) is a function call, not a cell reference
        if !followed_by_paren && is_cell_reference(text) {
            return Token::CellRef(text.to_string());
        }

        Token::Identifier(text.to_string())
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn current_token(&self) -> &Token {
        &self.current_token
    }

    fn consume(&mut self) -> Token {
        let token = std::mem::replace(&mut self.current_token, Token::Eof);
        self.advance_token();
        token
    }

    fn expect(&mut self, expected: &Token) -> FormulaResult<()> {
        if self.current_token() == expected {
            self.consume();
            Ok(())
        } else {
            Err(FormulaError::Parse(format!(
                "Expected {:?}, got {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Exponentiation: ^
    // 6. Unary: -, %
    // 7. Range: :
    // 8. Primary: literals, references, function calls, parentheses

    fn parse_expression(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_comparison()
    }

    fn binary(op: BinaryOperator, left: FormulaExpr, right: FormulaExpr) -> FormulaExpr {
        FormulaExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_comparison(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match self.current_token() {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };
            self.consume();
            let right = self.parse_concatenation()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_concatenation(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_additive()?;

        while matches!(self.current_token(), Token::Ampersand) {
            self.consume();
            let right = self.parse_additive()?;
            left = Self::binary(BinaryOperator::Concat, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.consume();
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_exponent()?;

        loop {
            let op = match self.current_token() {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };
            self.consume();
            let right = self.parse_exponent()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_exponent(&mut self) -> FormulaResult<FormulaExpr> {
        let left = self.parse_unary()?;

        if matches!(self.current_token(), Token::Caret) {
            self.consume();
            // Right associative
            let right = self.parse_exponent()?;
            return Ok(Self::binary(BinaryOperator::Power, left, right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<FormulaExpr> {
        if matches!(self.current_token(), Token::Minus) {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(FormulaExpr::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }

        // Prefix plus is a no-op
        if matches!(self.current_token(), Token::Plus) {
            self.consume();
            return self.parse_unary();
        }

        let mut expr = self.parse_range()?;

        while matches!(self.current_token(), Token::Percent) {
            self.consume();
            expr = FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    fn parse_range(&mut self) -> FormulaResult<FormulaExpr> {
        let left = self.parse_primary()?;

        if !matches!(self.current_token(), Token::Colon) {
            return Ok(left);
        }
        self.consume();
        let right = self.parse_primary()?;

        match (left, right) {
            (FormulaExpr::CellRef(start), FormulaExpr::CellRef(end)) => {
                // Sheet2!A1:B2 only qualifies the first endpoint
                let sheet = match (start.sheet, end.sheet) {
                    (Some(a), Some(b)) if !a.eq_ignore_ascii_case(&b) => {
                        return Err(FormulaError::Parse(
                            "Range references must be on the same sheet".into(),
                        ));
                    }
                    (a, b) => a.or(b),
                };
                Ok(FormulaExpr::RangeRef(RangeReference::new(
                    sheet,
                    start.position,
                    end.position,
                )))
            }
            _ => Err(FormulaError::Parse(
                "Range operator requires cell references on both sides".into(),
            )),
        }
    }

    fn parse_primary(&mut self) -> FormulaResult<FormulaExpr> {
        match self.consume() {
            Token::Number(n) => Ok(FormulaExpr::Number(n)),
            Token::String(s) => Ok(FormulaExpr::String(s)),
            Token::Boolean(b) => Ok(FormulaExpr::Boolean(b)),
            Token::Error(e) => Ok(FormulaExpr::Error(e)),

            Token::LeftParen => {
                let expr = self.parse_expression()?;
                self.expect(&Token::RightParen)?;
                Ok(FormulaExpr::Paren(Box::new(expr)))
            }

            Token::SheetRef(sheet) => match self.consume() {
                Token::CellRef(text) => parse_cell_reference(Some(sheet), &text),
                other => Err(FormulaError::Parse(format!(
                    "Expected cell reference after '{}!', got {:?}",
                    sheet, other
                ))),
            },

            Token::CellRef(text) => parse_cell_reference(None, &text),

            Token::Identifier(name) => {
                if matches!(self.current_token(), Token::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    Ok(FormulaExpr::NameRef(name))
                }
            }

            Token::Unterminated => Err(FormulaError::Parse("Unterminated quoted text".into())),
            Token::Invalid(c) => Err(FormulaError::Parse(format!("Unexpected character '{}'", c))),
            other => Err(FormulaError::Parse(format!("Unexpected token: {:?}", other))),
        }
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<FormulaExpr> {
        self.expect(&Token::LeftParen)?;

        let mut args = Vec::new();
        if !matches!(self.current_token(), Token::RightParen) {
            args.push(self.parse_expression()?);
            while matches!(self.current_token(), Token::Comma) {
                self.consume();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(&Token::RightParen)?;

        Ok(FormulaExpr::Function {
            name: name.to_ascii_uppercase(),
            args,
        })
    }
}

/// `[$]letters[$]digits` with nothing else
fn is_cell_reference(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    if bytes.get(i) == Some(&b'$') {
        i += 1;
    }
    let letters = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == letters {
        return false;
    }
    if bytes.get(i) == Some(&b'$') {
        i += 1;
    }
    let digits = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    i > digits && i == bytes.len()
}

fn parse_cell_reference(sheet: Option<String>, text: &str) -> FormulaResult<FormulaExpr> {
    let position = CellPosition::parse(text)
        .map_err(|e| FormulaError::Parse(format!("Invalid cell reference '{}': {}", text, e)))?;
    Ok(FormulaExpr::CellRef(CellReference { sheet, position }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetflow_core::PositionKind;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_formula("=42").unwrap(), FormulaExpr::Number(42.0));
        assert_eq!(parse_formula("=3.14").unwrap(), FormulaExpr::Number(3.14));
        assert_eq!(parse_formula("=1e10").unwrap(), FormulaExpr::Number(1e10));
    }

    #[test]
    fn test_leading_equals_is_optional() {
        assert_eq!(parse_formula("1+2").unwrap(), parse_formula("=1+2").unwrap());
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(
            parse_formula("=\"Hello \"\"World\"\"\"").unwrap(),
            FormulaExpr::String("Hello \"World\"".into())
        );
    }

    #[test]
    fn test_parse_precedence() {
        let ast = parse_formula("=1+2*3").unwrap();
        match ast {
            FormulaExpr::BinaryOp {
                op: BinaryOperator::Add,
                right,
                ..
            } => assert!(matches!(
                *right,
                FormulaExpr::BinaryOp {
                    op: BinaryOperator::Multiply,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_cell_reference_kinds() {
        let ast = parse_formula("=$B3").unwrap();
        let FormulaExpr::CellRef(r) = ast else {
            panic!("expected cell ref");
        };
        assert_eq!(r.position.row, 2);
        assert_eq!(r.position.col, 1);
        assert_eq!(r.position.col_kind, PositionKind::Absolute);
        assert_eq!(r.position.row_kind, PositionKind::Relative);
        assert!(r.sheet.is_none());
    }

    #[test]
    fn test_parse_sheet_qualified_range() {
        let ast = parse_formula("=SUM(Sheet2!A1:B3)").unwrap();
        let FormulaExpr::Function { name, args } = ast else {
            panic!("expected function");
        };
        assert_eq!(name, "SUM");
        let FormulaExpr::RangeRef(r) = &args[0] else {
            panic!("expected range");
        };
        assert_eq!(r.sheet.as_deref(), Some("Sheet2"));
        assert_eq!(r.range().to_string(), "A1:B3");
    }

    #[test]
    fn test_parse_quoted_sheet() {
        let ast = parse_formula("='My ''Data'''!C4").unwrap();
        let FormulaExpr::CellRef(r) = ast else {
            panic!("expected cell ref");
        };
        assert_eq!(r.sheet.as_deref(), Some("My 'Data'"));
    }

    #[test]
    fn test_function_vs_cell_reference() {
        let ast = parse_formula("=LOG10(100)").unwrap();
        assert!(matches!(ast, FormulaExpr::Function { .. }));
        let ast = parse_formula("=rate").unwrap();
        assert_eq!(ast, FormulaExpr::NameRef("rate".into()));
    }

    #[test]
    fn test_round_trip_text() {
        for text in [
            "SUM(A1:B2)*(C1+$D$1)",
            "IF(A1>=10,\"big\",\"small\")",
            "-A1%&\"x\"",
            "'My Sheet'!A1+Sheet2!$B2:C$4",
            "#REF!+1",
        ] {
            assert_eq!(parse_formula(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_formula("=").is_err());
        assert!(parse_formula("=1+").is_err());
        assert!(parse_formula("=SUM(1,2").is_err());
        assert!(parse_formula("=1 @ 2").is_err());
        assert!(parse_formula("=\"open").is_err());
        assert!(parse_formula("=1 2").is_err());
        assert!(parse_formula("=(1+2):A1").is_err());
    }
}
