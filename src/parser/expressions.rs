//! Expression parsing module
//!
//! Binary operators use precedence climbing over a binding-power table; casts,
//! unary operators and postfix chains are parsed by recursive descent.

use log::trace;
use thin_vec::ThinVec;

use super::declarations::{parse_initializer_list, parse_type_name};
use super::Parser;
use crate::ast::*;
use crate::error::Result;
use crate::lexer::{Keyword, Punctuator, TokenKind};
use crate::source::SourceLocation;

/// Binding power for binary operator precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BindingPower(u8);

impl BindingPower {
    pub const MIN: Self = Self(0);
    pub const LOGICAL_OR: Self = Self(1);
    pub const LOGICAL_AND: Self = Self(2);
    pub const BITWISE_OR: Self = Self(3);
    pub const BITWISE_XOR: Self = Self(4);
    pub const BITWISE_AND: Self = Self(5);
    pub const EQUALITY: Self = Self(6);
    pub const RELATIONAL: Self = Self(7);
    pub const SHIFT: Self = Self(8);
    pub const ADDITIVE: Self = Self(9);
    pub const MULTIPLICATIVE: Self = Self(10);

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

fn binary_operator(punctuator: Punctuator) -> Option<(BinaryOp, BindingPower)> {
    Some(match punctuator {
        Punctuator::LogicOr => (BinaryOp::LogicOr, BindingPower::LOGICAL_OR),
        Punctuator::LogicAnd => (BinaryOp::LogicAnd, BindingPower::LOGICAL_AND),
        Punctuator::Pipe => (BinaryOp::BitOr, BindingPower::BITWISE_OR),
        Punctuator::Caret => (BinaryOp::BitXor, BindingPower::BITWISE_XOR),
        Punctuator::Ampersand => (BinaryOp::BitAnd, BindingPower::BITWISE_AND),
        Punctuator::Equal => (BinaryOp::Equal, BindingPower::EQUALITY),
        Punctuator::NotEqual => (BinaryOp::NotEqual, BindingPower::EQUALITY),
        Punctuator::Less => (BinaryOp::Less, BindingPower::RELATIONAL),
        Punctuator::LessEqual => (BinaryOp::LessEqual, BindingPower::RELATIONAL),
        Punctuator::Greater => (BinaryOp::Greater, BindingPower::RELATIONAL),
        Punctuator::GreaterEqual => (BinaryOp::GreaterEqual, BindingPower::RELATIONAL),
        Punctuator::LeftShift => (BinaryOp::LShift, BindingPower::SHIFT),
        Punctuator::RightShift => (BinaryOp::RShift, BindingPower::SHIFT),
        Punctuator::Plus => (BinaryOp::Add, BindingPower::ADDITIVE),
        Punctuator::Minus => (BinaryOp::Sub, BindingPower::ADDITIVE),
        Punctuator::Star => (BinaryOp::Mul, BindingPower::MULTIPLICATIVE),
        Punctuator::Slash => (BinaryOp::Div, BindingPower::MULTIPLICATIVE),
        Punctuator::Percent => (BinaryOp::Mod, BindingPower::MULTIPLICATIVE),
        _ => return None,
    })
}

fn assignment_operator(punctuator: Punctuator) -> Option<BinaryOp> {
    Some(match punctuator {
        Punctuator::Assign => BinaryOp::Assign,
        Punctuator::PlusAssign => BinaryOp::AssignAdd,
        Punctuator::MinusAssign => BinaryOp::AssignSub,
        Punctuator::StarAssign => BinaryOp::AssignMul,
        Punctuator::SlashAssign => BinaryOp::AssignDiv,
        Punctuator::PercentAssign => BinaryOp::AssignMod,
        Punctuator::AmpersandAssign => BinaryOp::AssignBitAnd,
        Punctuator::PipeAssign => BinaryOp::AssignBitOr,
        Punctuator::CaretAssign => BinaryOp::AssignBitXor,
        Punctuator::LeftShiftAssign => BinaryOp::AssignLShift,
        Punctuator::RightShiftAssign => BinaryOp::AssignRShift,
        _ => return None,
    })
}

fn current_punctuator(parser: &Parser) -> Option<Punctuator> {
    match parser.current_kind() {
        Some(TokenKind::Punctuator(p)) => Some(*p),
        _ => None,
    }
}

/// expression: assignment-expression { , assignment-expression }
pub fn parse_expression(parser: &mut Parser) -> Result<NodeRef> {
    let mut left = parse_assignment_expression(parser)?;
    while parser.is_punct(Punctuator::Comma) {
        let location = parser.current_location();
        parser.advance();
        let right = parse_assignment_expression(parser)?;
        left = parser.push_node(NodeKind::Binary(BinaryOp::Comma, left, right), location);
    }
    Ok(left)
}

/// assignment-expression: conditional-expression | unary-expression assignment-operator assignment-expression
pub fn parse_assignment_expression(parser: &mut Parser) -> Result<NodeRef> {
    parser.nested(|parser| {
        let left = parse_conditional_expression(parser)?;
        let Some(op) = current_punctuator(parser).and_then(assignment_operator) else {
            return Ok(left);
        };
        let location = parser.current_location();
        parser.advance();
        let right = parse_assignment_expression(parser)?;
        Ok(parser.push_node(NodeKind::Assignment(op, left, right), location))
    })
}

/// conditional-expression: logical-or-expression [ ? expression : conditional-expression ]
pub fn parse_conditional_expression(parser: &mut Parser) -> Result<NodeRef> {
    let condition = parse_binary_expression(parser, BindingPower::LOGICAL_OR)?;
    if !parser.is_punct(Punctuator::Question) {
        return Ok(condition);
    }
    let location = parser.current_location();
    parser.advance();
    let then_expr = parse_expression(parser)?;
    parser.expect_punct(Punctuator::Colon)?;
    let else_expr = parser.nested(parse_conditional_expression)?;
    Ok(parser.push_node(NodeKind::Conditional(condition, then_expr, else_expr), location))
}

/// Precedence climbing over left-associative binary operators
fn parse_binary_expression(parser: &mut Parser, min_binding_power: BindingPower) -> Result<NodeRef> {
    let mut left = parse_cast_expression(parser)?;

    while let Some((op, binding_power)) = current_punctuator(parser).and_then(binary_operator) {
        if binding_power < min_binding_power {
            break;
        }
        trace!("parse_binary_expression: {:?} at {:?}", op, binding_power);
        let location = parser.current_location();
        parser.advance();
        let right = parse_binary_expression(parser, binding_power.next())?;
        left = parser.push_node(NodeKind::Binary(op, left, right), location);
    }

    Ok(left)
}

/// Check whether `(` at the current position opens a type name
fn is_parenthesized_type_name(parser: &Parser) -> bool {
    if !parser.is_punct(Punctuator::LeftParen) {
        return false;
    }
    match parser.peek_token(0).map(|t| &t.kind) {
        Some(TokenKind::Keyword(k)) => k.is_type_specifier() || k.is_type_qualifier(),
        Some(TokenKind::Identifier(symbol)) => parser.is_type_name(*symbol),
        _ => false,
    }
}

/// cast-expression: unary-expression | ( type-name ) cast-expression
pub fn parse_cast_expression(parser: &mut Parser) -> Result<NodeRef> {
    if !is_parenthesized_type_name(parser) {
        return parse_unary_expression(parser);
    }

    let location = parser.expect_punct(Punctuator::LeftParen)?;
    let type_name = parse_type_name(parser)?;
    parser.expect_punct(Punctuator::RightParen)?;

    if parser.is_punct(Punctuator::LeftBrace) {
        let literal = parse_compound_literal(parser, type_name, location)?;
        return parse_postfix_operators(parser, literal);
    }

    let operand = parser.nested(parse_cast_expression)?;
    Ok(parser.push_node(NodeKind::Cast(type_name, operand), location))
}

fn parse_compound_literal(
    parser: &mut Parser,
    type_name: NodeRef,
    location: SourceLocation,
) -> Result<NodeRef> {
    let list = parse_initializer_list(parser)?;
    Ok(parser.push_node(NodeKind::CompoundLiteral(type_name, list), location))
}

/// unary-expression
pub fn parse_unary_expression(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.current_location();
    let token = parser.current_token()?;

    let unary_op = match &token.kind {
        TokenKind::Punctuator(Punctuator::Increment) => Some(UnaryOp::PreIncrement),
        TokenKind::Punctuator(Punctuator::Decrement) => Some(UnaryOp::PreDecrement),
        TokenKind::Punctuator(Punctuator::Ampersand) => Some(UnaryOp::AddrOf),
        TokenKind::Punctuator(Punctuator::Star) => Some(UnaryOp::Deref),
        TokenKind::Punctuator(Punctuator::Plus) => Some(UnaryOp::Plus),
        TokenKind::Punctuator(Punctuator::Minus) => Some(UnaryOp::Minus),
        TokenKind::Punctuator(Punctuator::Tilde) => Some(UnaryOp::BitNot),
        TokenKind::Punctuator(Punctuator::Exclaim) => Some(UnaryOp::LogicNot),
        _ => None,
    };

    if let Some(op) = unary_op {
        parser.advance();
        let operand = parser.nested(|parser| match op {
            UnaryOp::PreIncrement | UnaryOp::PreDecrement => parse_unary_expression(parser),
            _ => parse_cast_expression(parser),
        })?;
        return Ok(parser.push_node(NodeKind::Unary(op, operand), location));
    }

    if token.is_keyword(Keyword::Sizeof) {
        parser.advance();
        if is_parenthesized_type_name(parser) {
            let paren_location = parser.expect_punct(Punctuator::LeftParen)?;
            let type_name = parse_type_name(parser)?;
            parser.expect_punct(Punctuator::RightParen)?;
            if parser.is_punct(Punctuator::LeftBrace) {
                let literal = parse_compound_literal(parser, type_name, paren_location)?;
                let operand = parse_postfix_operators(parser, literal)?;
                return Ok(parser.push_node(NodeKind::SizeOfExpr(operand), location));
            }
            return Ok(parser.push_node(NodeKind::SizeOfType(type_name), location));
        }
        let operand = parser.nested(parse_unary_expression)?;
        return Ok(parser.push_node(NodeKind::SizeOfExpr(operand), location));
    }

    if token.is_keyword(Keyword::Alignof) {
        parser.advance();
        parser.expect_punct(Punctuator::LeftParen)?;
        let type_name = parse_type_name(parser)?;
        parser.expect_punct(Punctuator::RightParen)?;
        return Ok(parser.push_node(NodeKind::AlignOf(type_name), location));
    }

    parse_postfix_expression(parser)
}

/// postfix-expression: primary-expression followed by any postfix operators
fn parse_postfix_expression(parser: &mut Parser) -> Result<NodeRef> {
    let primary = parse_primary_expression(parser)?;
    parse_postfix_operators(parser, primary)
}

fn parse_postfix_operators(parser: &mut Parser, mut expr: NodeRef) -> Result<NodeRef> {
    loop {
        let location = parser.current_location();
        let Some(punctuator) = current_punctuator(parser) else {
            break;
        };
        expr = match punctuator {
            Punctuator::LeftBracket => {
                parser.advance();
                let index = parse_expression(parser)?;
                parser.expect_punct(Punctuator::RightBracket)?;
                parser.push_node(NodeKind::Index(expr, index), location)
            }
            Punctuator::LeftParen => {
                parser.advance();
                let mut args = ThinVec::new();
                if !parser.accept_punct(Punctuator::RightParen) {
                    loop {
                        args.push(parse_assignment_expression(parser)?);
                        if !parser.accept_punct(Punctuator::Comma) {
                            break;
                        }
                    }
                    parser.expect_punct(Punctuator::RightParen)?;
                }
                parser.push_node(NodeKind::Call(expr, args), location)
            }
            Punctuator::Dot | Punctuator::Arrow => {
                parser.advance();
                let (field, _) = parser.expect_name()?;
                parser.push_node(
                    NodeKind::Member(expr, field, punctuator == Punctuator::Arrow),
                    location,
                )
            }
            Punctuator::Increment => {
                parser.advance();
                parser.push_node(NodeKind::PostIncrement(expr), location)
            }
            Punctuator::Decrement => {
                parser.advance();
                parser.push_node(NodeKind::PostDecrement(expr), location)
            }
            _ => break,
        };
    }
    Ok(expr)
}

/// primary-expression
fn parse_primary_expression(parser: &mut Parser) -> Result<NodeRef> {
    let token = parser.current_token()?;
    let location = token.location;

    match &token.kind {
        TokenKind::Identifier(symbol) => {
            parser.advance();
            Ok(parser.push_node(NodeKind::Identifier(*symbol), location))
        }
        TokenKind::Constant { value, .. } => {
            parser.advance();
            Ok(parser.push_node(NodeKind::Constant(*value), location))
        }
        TokenKind::StringLiteral(literal) => {
            parser.advance();
            Ok(parser.push_node(NodeKind::StringLiteral(literal.value.clone()), location))
        }
        TokenKind::Punctuator(Punctuator::LeftParen) => {
            parser.advance();
            let expr = parse_expression(parser)?;
            parser.expect_punct(Punctuator::RightParen)?;
            Ok(expr)
        }
        TokenKind::Keyword(Keyword::Generic) => parse_generic_selection(parser),
        _ => Err(parser.unexpected("expression")),
    }
}

/// `_Generic ( assignment-expression , generic-assoc-list )`
fn parse_generic_selection(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_keyword(Keyword::Generic)?;
    parser.expect_punct(Punctuator::LeftParen)?;
    let controlling = parse_assignment_expression(parser)?;

    let mut associations = ThinVec::new();
    while parser.accept_punct(Punctuator::Comma) {
        let type_name = if parser.accept_keyword(Keyword::Default) {
            None
        } else {
            Some(parse_type_name(parser)?)
        };
        parser.expect_punct(Punctuator::Colon)?;
        let expr = parse_assignment_expression(parser)?;
        associations.push(GenericAssociation { type_name, expr });
    }
    parser.expect_punct(Punctuator::RightParen)?;

    if associations.is_empty() {
        return Err(parser.unexpected("generic association"));
    }
    Ok(parser.push_node(NodeKind::GenericSelection(controlling, associations), location))
}
