use std::error::Error;
use std::fmt::{self, Display};

use cellgraph_common::{CellError, CellValue, ErrorKind, SimpleCellAddress};

use crate::reference::{ReferenceError, ReferenceType, SheetLookup, parse_reference};
use crate::tokenizer::{Associativity, Token, TokenSubType, TokenType, Tokenizer, TokenizerError};

/// A custom error type for the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "ParserError at position {}: {}", pos, self.message)
        } else {
            write!(f, "ParserError: {}", self.message)
        }
    }
}

impl Error for ParserError {}

impl From<TokenizerError> for ParserError {
    fn from(err: TokenizerError) -> Self {
        ParserError {
            message: err.message,
            position: Some(err.pos),
        }
    }
}

/// Formula AST.
///
/// References are stored relative to the cell the formula lives in, so a
/// node can be shared by every cell whose formula has the same shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ASTNode {
    Literal(CellValue),
    Reference(ReferenceType),
    UnaryOp {
        op: String,
        expr: Box<ASTNode>,
    },
    BinaryOp {
        op: String,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    Function {
        name: String,
        args: Vec<ASTNode>,
    },
    /// Text that failed to parse. Evaluates to the carried error and renders
    /// back as the raw text.
    Invalid { raw: String, error: CellError },
}

impl ASTNode {
    pub fn error(kind: ErrorKind) -> Self {
        ASTNode::Literal(CellValue::error(kind))
    }

    pub fn invalid(raw: &str, err: &ParserError) -> Self {
        ASTNode::Invalid {
            raw: raw.to_string(),
            error: CellError::parsing(err.message.clone()),
        }
    }

    /// Visit every node, parents before children.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ASTNode)) {
        f(self);
        match self {
            ASTNode::UnaryOp { expr, .. } => expr.walk(f),
            ASTNode::BinaryOp { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ASTNode::Function { args, .. } => args.iter().for_each(|a| a.walk(f)),
            ASTNode::Literal(_) | ASTNode::Reference(_) | ASTNode::Invalid { .. } => {}
        }
    }

    /// Rebuild the tree with every reference passed through `f`. A `None`
    /// from `f` replaces the reference with a `#REF!` literal.
    pub fn map_references(&self, f: &mut impl FnMut(&ReferenceType) -> Option<ReferenceType>) -> Self {
        match self {
            ASTNode::Reference(r) => match f(r) {
                Some(r) => ASTNode::Reference(r),
                None => ASTNode::error(ErrorKind::Ref),
            },
            ASTNode::UnaryOp { op, expr } => ASTNode::UnaryOp {
                op: op.clone(),
                expr: Box::new(expr.map_references(f)),
            },
            ASTNode::BinaryOp { op, left, right } => ASTNode::BinaryOp {
                op: op.clone(),
                left: Box::new(left.map_references(f)),
                right: Box::new(right.map_references(f)),
            },
            ASTNode::Function { name, args } => ASTNode::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.map_references(f)).collect(),
            },
            ASTNode::Literal(_) | ASTNode::Invalid { .. } => self.clone(),
        }
    }

    pub fn has_references(&self) -> bool {
        let mut found = false;
        self.walk(&mut |n| found |= matches!(n, ASTNode::Reference(_)));
        found
    }
}

/// Binding power of a binary operator, shared with the unparser.
pub fn binary_precedence(op: &str) -> Option<(u8, Associativity)> {
    Token {
        value: op.to_string(),
        token_type: TokenType::OpInfix,
        subtype: TokenSubType::None,
        start: 0,
        end: 0,
    }
    .get_precedence()
}

/// Precedence-climbing parser over a token stream.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    base: SimpleCellAddress,
    sheets: &'a dyn SheetLookup,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, base: SimpleCellAddress, sheets: &'a dyn SheetLookup) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|t| t.token_type != TokenType::Whitespace)
            .collect();
        Parser {
            tokens,
            position: 0,
            base,
            sheets,
        }
    }

    pub fn parse(&mut self) -> Result<ASTNode, ParserError> {
        if self.tokens.is_empty() {
            return Err(ParserError {
                message: "Empty formula".to_string(),
                position: None,
            });
        }
        let ast = self.parse_expression(0)?;
        if let Some(token) = self.tokens.get(self.position) {
            return Err(ParserError {
                message: format!("Unexpected token '{}'", token.value),
                position: Some(token.start),
            });
        }
        Ok(ast)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token, ParserError> {
        let token = self.tokens.get(self.position).cloned().ok_or(ParserError {
            message: "Unexpected end of formula".to_string(),
            position: None,
        })?;
        self.position += 1;
        Ok(token)
    }

    fn parse_expression(&mut self, min_precedence: u8) -> Result<ASTNode, ParserError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            if token.token_type != TokenType::OpInfix {
                break;
            }
            let Some((precedence, associativity)) = token.get_precedence() else {
                return Err(ParserError {
                    message: format!("Unknown operator '{}'", token.value),
                    position: Some(token.start),
                });
            };
            if precedence < min_precedence {
                break;
            }
            let op = self.next()?.value;
            let next_min = match associativity {
                Associativity::Left => precedence + 1,
                Associativity::Right => precedence,
            };
            let right = self.parse_expression(next_min)?;
            left = ASTNode::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ASTNode, ParserError> {
        if let Some(token) = self.peek() {
            if token.token_type == TokenType::OpPrefix {
                let op = self.next()?.value;
                let expr = self.parse_unary()?;
                return Ok(ASTNode::UnaryOp {
                    op,
                    expr: Box::new(expr),
                });
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<ASTNode, ParserError> {
        let mut expr = self.parse_primary()?;
        while let Some(token) = self.peek() {
            if token.token_type != TokenType::OpPostfix {
                break;
            }
            let op = self.next()?.value;
            expr = ASTNode::UnaryOp {
                op,
                expr: Box::new(expr),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<ASTNode, ParserError> {
        let token = self.next()?;
        match (token.token_type, token.subtype) {
            (TokenType::Operand, _) => self.parse_operand(&token),
            (TokenType::Func, TokenSubType::Open) => self.parse_function(&token),
            (TokenType::Paren, TokenSubType::Open) => {
                let expr = self.parse_expression(0)?;
                let close = self.next()?;
                if close.token_type != TokenType::Paren || close.subtype != TokenSubType::Close {
                    return Err(ParserError {
                        message: "Expected ')'".to_string(),
                        position: Some(close.start),
                    });
                }
                Ok(expr)
            }
            _ => Err(ParserError {
                message: format!("Unexpected token '{}'", token.value),
                position: Some(token.start),
            }),
        }
    }

    fn parse_operand(&self, token: &Token) -> Result<ASTNode, ParserError> {
        let value = token.value.as_str();
        match token.subtype {
            TokenSubType::Number => value
                .parse::<f64>()
                .map(|n| ASTNode::Literal(CellValue::Number(n)))
                .map_err(|_| ParserError {
                    message: format!("Invalid number '{value}'"),
                    position: Some(token.start),
                }),
            TokenSubType::Text => {
                let inner = &value[1..value.len() - 1];
                Ok(ASTNode::Literal(CellValue::Text(inner.replace("\"\"", "\""))))
            }
            TokenSubType::Logical => Ok(ASTNode::Literal(CellValue::Boolean(
                value.eq_ignore_ascii_case("TRUE"),
            ))),
            TokenSubType::Error => ErrorKind::parse(value)
                .map(ASTNode::error)
                .ok_or(ParserError {
                    message: format!("Invalid error literal '{value}'"),
                    position: Some(token.start),
                }),
            _ => match parse_reference(value, self.base, self.sheets) {
                Ok(reference) => Ok(ASTNode::Reference(reference)),
                Err(ReferenceError::UnknownSheet(_)) => Ok(ASTNode::error(ErrorKind::Ref)),
                Err(ReferenceError::NotAReference) => Ok(ASTNode::error(ErrorKind::Name)),
            },
        }
    }

    fn parse_function(&mut self, open: &Token) -> Result<ASTNode, ParserError> {
        let name = open.function_name().unwrap_or_default();
        let mut args = Vec::new();

        if let Some(t) = self.peek() {
            if t.token_type == TokenType::Func && t.subtype == TokenSubType::Close {
                self.position += 1;
                return Ok(ASTNode::Function { name, args });
            }
        }

        loop {
            let empty_arg = matches!(
                self.peek(),
                Some(t) if t.token_type == TokenType::Sep
                    || (t.token_type == TokenType::Func && t.subtype == TokenSubType::Close)
            );
            if empty_arg {
                args.push(ASTNode::Literal(CellValue::Empty));
            } else {
                args.push(self.parse_expression(0)?);
            }

            let t = self.next()?;
            match (t.token_type, t.subtype) {
                (TokenType::Sep, _) => continue,
                (TokenType::Func, TokenSubType::Close) => break,
                _ => {
                    return Err(ParserError {
                        message: format!("Expected ',' or ')' in call to {name}"),
                        position: Some(t.start),
                    });
                }
            }
        }

        Ok(ASTNode::Function { name, args })
    }
}

/// Tokenize and parse `formula` (which starts with `=`) as placed at `base`.
pub fn parse(
    formula: &str,
    base: SimpleCellAddress,
    sheets: &dyn SheetLookup,
) -> Result<ASTNode, ParserError> {
    let tokenizer = Tokenizer::new(formula)?;
    Parser::new(tokenizer.items, base, sheets).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{AxisRef, RelativeCell};

    fn sheets() -> Vec<&'static str> {
        vec!["Sheet1", "Sheet2"]
    }

    fn p(formula: &str) -> ASTNode {
        parse(formula, SimpleCellAddress::new(0, 0, 0), &sheets()).unwrap()
    }

    fn num(n: f64) -> ASTNode {
        ASTNode::Literal(CellValue::Number(n))
    }

    fn bin(op: &str, l: ASTNode, r: ASTNode) -> ASTNode {
        ASTNode::BinaryOp {
            op: op.into(),
            left: Box::new(l),
            right: Box::new(r),
        }
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(
            p("=1+2*3"),
            bin("+", num(1.0), bin("*", num(2.0), num(3.0)))
        );
        assert_eq!(
            p("=1-2-3"),
            bin("-", bin("-", num(1.0), num(2.0)), num(3.0))
        );
        assert_eq!(
            p("=(1+2)*3"),
            bin("*", bin("+", num(1.0), num(2.0)), num(3.0))
        );
        assert_eq!(
            p("=1&2=\"12\""),
            bin(
                "=",
                bin("&", num(1.0), num(2.0)),
                ASTNode::Literal(CellValue::Text("12".into())),
            )
        );
    }

    #[test]
    fn unary_binds_tighter_than_power() {
        let neg = ASTNode::UnaryOp {
            op: "-".into(),
            expr: Box::new(num(2.0)),
        };
        assert_eq!(p("=-2^2"), bin("^", neg, num(2.0)));
        assert_eq!(
            p("=50%"),
            ASTNode::UnaryOp {
                op: "%".into(),
                expr: Box::new(num(50.0))
            }
        );
    }

    #[test]
    fn functions_with_empty_and_nested_args() {
        match p("=if(A1,,sum(1,2))") {
            ASTNode::Function { name, args } => {
                assert_eq!(name, "IF");
                assert_eq!(args.len(), 3);
                assert_eq!(args[1], ASTNode::Literal(CellValue::Empty));
                assert!(matches!(&args[2], ASTNode::Function { name, args } if name == "SUM" && args.len() == 2));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            p("=RAND()"),
            ASTNode::Function {
                name: "RAND".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn references_are_relative() {
        assert_eq!(
            parse("=B2", SimpleCellAddress::new(0, 3, 3), &sheets()).unwrap(),
            ASTNode::Reference(ReferenceType::Cell {
                sheet: None,
                cell: RelativeCell {
                    col: AxisRef::Relative(-2),
                    row: AxisRef::Relative(-2)
                }
            })
        );
    }

    #[test]
    fn unknown_names_and_sheets_become_error_literals() {
        assert_eq!(p("=FOO"), ASTNode::error(ErrorKind::Name));
        assert_eq!(p("=Missing!A1"), ASTNode::error(ErrorKind::Ref));
        assert_eq!(p("=#DIV/0!"), ASTNode::error(ErrorKind::DivByZero));
    }

    #[test]
    fn syntax_errors() {
        let base = SimpleCellAddress::new(0, 0, 0);
        for f in ["=", "=1+", "=(1", "=1 2", "=SUM(1;;", "=*3"] {
            assert!(parse(f, base, &sheets()).is_err(), "{f}");
        }
    }

    #[test]
    fn map_references_replaces_dropped_refs() {
        let ast = p("=A1+SUM(B1:B3)");
        let mapped = ast.map_references(&mut |r| if r.is_range() { None } else { Some(r.clone()) });
        match mapped {
            ASTNode::BinaryOp { left, right, .. } => {
                assert!(matches!(*left, ASTNode::Reference(_)));
                assert_eq!(
                    *right,
                    ASTNode::Function {
                        name: "SUM".into(),
                        args: vec![ASTNode::error(ErrorKind::Ref)]
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
