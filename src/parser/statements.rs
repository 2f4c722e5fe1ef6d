//! Statement parsing module
//!
//! This module handles all statement parsing logic, including control flow
//! statements, compound statements, and expression statements.

use log::debug;
use thin_vec::ThinVec;

use super::declarations::parse_declaration;
use super::expressions::{parse_conditional_expression, parse_expression};
use super::Parser;
use crate::ast::*;
use crate::error::Result;
use crate::lexer::{Keyword, Punctuator, TokenKind};

/// Parse a statement
pub fn parse_statement(parser: &mut Parser) -> Result<NodeRef> {
    parser.nested(|parser| {
        let token = parser.current_token()?;
        let location = token.location;

        // Check for label: identifier :
        if let TokenKind::Identifier(label) = token.kind {
            if parser.peek_token(0).is_some_and(|t| t.is_punctuator(Punctuator::Colon)) {
                parser.advance();
                parser.advance();
                let statement = parse_statement(parser)?;
                return Ok(parser.push_node(NodeKind::Label(label, statement), location));
            }
        }

        match &token.kind {
            TokenKind::Punctuator(Punctuator::LeftBrace) => parse_compound_statement(parser),
            TokenKind::Keyword(Keyword::If) => parse_if_statement(parser),
            TokenKind::Keyword(Keyword::Switch) => parse_switch_statement(parser),
            TokenKind::Keyword(Keyword::While) => parse_while_statement(parser),
            TokenKind::Keyword(Keyword::Do) => parse_do_while_statement(parser),
            TokenKind::Keyword(Keyword::For) => parse_for_statement(parser),
            TokenKind::Keyword(Keyword::Goto) => {
                parser.advance();
                let (label, _) = parser.expect_name()?;
                parser.expect_punct(Punctuator::Semicolon)?;
                Ok(parser.push_node(NodeKind::Goto(label), location))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                parser.advance();
                parser.expect_punct(Punctuator::Semicolon)?;
                Ok(parser.push_node(NodeKind::Continue, location))
            }
            TokenKind::Keyword(Keyword::Break) => {
                parser.advance();
                parser.expect_punct(Punctuator::Semicolon)?;
                Ok(parser.push_node(NodeKind::Break, location))
            }
            TokenKind::Keyword(Keyword::Return) => {
                parser.advance();
                let value = if parser.is_punct(Punctuator::Semicolon) {
                    None
                } else {
                    Some(parse_expression(parser)?)
                };
                parser.expect_punct(Punctuator::Semicolon)?;
                Ok(parser.push_node(NodeKind::Return(value), location))
            }
            TokenKind::Keyword(Keyword::Case) => {
                parser.advance();
                let value = parse_conditional_expression(parser)?;
                parser.expect_punct(Punctuator::Colon)?;
                let statement = parse_statement(parser)?;
                Ok(parser.push_node(NodeKind::Case(value, statement), location))
            }
            TokenKind::Keyword(Keyword::Default) => {
                parser.advance();
                parser.expect_punct(Punctuator::Colon)?;
                let statement = parse_statement(parser)?;
                Ok(parser.push_node(NodeKind::Default(statement), location))
            }
            _ => parse_expression_statement(parser),
        }
    })
}

/// Parse compound statement (block)
pub fn parse_compound_statement(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_punct(Punctuator::LeftBrace)?;

    parser.push_scope();
    let items = parse_block_items(parser);
    parser.pop_scope();
    let items = items?;

    debug!("parse_compound_statement: {} block items", items.len());
    Ok(parser.push_node(NodeKind::Compound(items), location))
}

fn parse_block_items(parser: &mut Parser) -> Result<ThinVec<NodeRef>> {
    let mut items = ThinVec::new();
    while !parser.accept_punct(Punctuator::RightBrace) {
        let item = if parser.starts_declaration() {
            parse_declaration(parser)?
        } else {
            parse_statement(parser)?
        };
        items.push(item);
    }
    Ok(items)
}

fn parse_expression_statement(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.current_location();
    if parser.accept_punct(Punctuator::Semicolon) {
        return Ok(parser.push_node(NodeKind::ExpressionStatement(None), location));
    }
    let expr = parse_expression(parser)?;
    parser.expect_punct(Punctuator::Semicolon)?;
    Ok(parser.push_node(NodeKind::ExpressionStatement(Some(expr)), location))
}

fn parse_parenthesized_expression(parser: &mut Parser) -> Result<NodeRef> {
    parser.expect_punct(Punctuator::LeftParen)?;
    let expr = parse_expression(parser)?;
    parser.expect_punct(Punctuator::RightParen)?;
    Ok(expr)
}

fn parse_if_statement(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_keyword(Keyword::If)?;
    let condition = parse_parenthesized_expression(parser)?;
    let then_branch = parse_statement(parser)?;
    let else_branch = if parser.accept_keyword(Keyword::Else) {
        Some(parse_statement(parser)?)
    } else {
        None
    };
    Ok(parser.push_node(
        NodeKind::If(IfStmt {
            condition,
            then_branch,
            else_branch,
        }),
        location,
    ))
}

fn parse_switch_statement(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_keyword(Keyword::Switch)?;
    let condition = parse_parenthesized_expression(parser)?;
    let body = parse_statement(parser)?;
    Ok(parser.push_node(NodeKind::Switch(condition, body), location))
}

fn parse_while_statement(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_keyword(Keyword::While)?;
    let condition = parse_parenthesized_expression(parser)?;
    let body = parse_statement(parser)?;
    Ok(parser.push_node(NodeKind::While(WhileStmt { condition, body }), location))
}

fn parse_do_while_statement(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_keyword(Keyword::Do)?;
    let body = parse_statement(parser)?;
    parser.expect_keyword(Keyword::While)?;
    let condition = parse_parenthesized_expression(parser)?;
    parser.expect_punct(Punctuator::Semicolon)?;
    Ok(parser.push_node(NodeKind::DoWhile(body, condition), location))
}

fn parse_for_statement(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_keyword(Keyword::For)?;
    parser.expect_punct(Punctuator::LeftParen)?;

    // the init declaration is scoped to the loop
    parser.push_scope();
    let result = parse_for_rest(parser);
    parser.pop_scope();
    let (init, condition, increment, body) = result?;

    Ok(parser.push_node(
        NodeKind::For(ForStmt {
            init,
            condition,
            increment,
            body,
        }),
        location,
    ))
}

type ForParts = (Option<NodeRef>, Option<NodeRef>, Option<NodeRef>, NodeRef);

fn parse_for_rest(parser: &mut Parser) -> Result<ForParts> {
    let init = if parser.accept_punct(Punctuator::Semicolon) {
        None
    } else if parser.starts_declaration() {
        Some(parse_declaration(parser)?)
    } else {
        Some(parse_expression_statement(parser)?)
    };

    let condition = if parser.is_punct(Punctuator::Semicolon) {
        None
    } else {
        Some(parse_expression(parser)?)
    };
    parser.expect_punct(Punctuator::Semicolon)?;

    let increment = if parser.is_punct(Punctuator::RightParen) {
        None
    } else {
        Some(parse_expression(parser)?)
    };
    parser.expect_punct(Punctuator::RightParen)?;

    let body = parse_statement(parser)?;
    Ok((init, condition, increment, body))
}
