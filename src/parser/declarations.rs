//! Declaration parsing module
//!
//! Declaration specifiers, declarators, struct/union/enum specifiers, initializers,
//! `_Static_assert`, function definitions and the translation unit.

use log::debug;
use thin_vec::ThinVec;

use super::expressions::{parse_assignment_expression, parse_conditional_expression};
use super::statements::parse_compound_statement;
use super::Parser;
use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexer::{Keyword, Punctuator, TokenKind};
use crate::source::SourceLocation;

/// Which declarators are acceptable at a given position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclaratorMode {
    /// An identifier is required (ordinary declarations).
    Concrete,
    /// No identifier may appear (type names).
    Abstract,
    /// Either form (parameters).
    Either,
}

/// Parse translation unit (top level)
pub fn parse_translation_unit(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.current_location();
    let mut declarations = ThinVec::new();

    while parser.try_current_token().is_some() {
        // stray semicolons between external declarations
        if parser.accept_punct(Punctuator::Semicolon) {
            continue;
        }
        declarations.push(parse_external_declaration(parser)?);
    }

    debug!("parse_translation_unit: {} external declarations", declarations.len());
    let root = parser.push_node(NodeKind::TranslationUnit(declarations), location);
    parser.set_root(root);
    Ok(root)
}

fn parse_external_declaration(parser: &mut Parser) -> Result<NodeRef> {
    if parser.is_keyword(Keyword::StaticAssert) {
        return parse_static_assert(parser);
    }

    let location = parser.current_location();
    let specifiers = parse_declaration_specifiers(parser)?;
    if specifiers.is_empty() {
        return Err(parser.unexpected("declaration"));
    }

    if parser.accept_punct(Punctuator::Semicolon) {
        return Ok(parser.push_node(
            NodeKind::Declaration(DeclarationData {
                specifiers,
                init_declarators: ThinVec::new(),
            }),
            location,
        ));
    }

    let declarator_location = parser.current_location();
    let declarator = parse_declarator(parser, DeclaratorMode::Concrete)?;

    if parser.is_punct(Punctuator::LeftBrace) && declarator.function_parameters().is_some() {
        return parse_function_definition(parser, specifiers, declarator, location);
    }

    parse_init_declarators(parser, specifiers, declarator, declarator_location, location)
}

fn parse_function_definition(
    parser: &mut Parser,
    specifiers: ThinVec<DeclSpecifier>,
    declarator: Declarator,
    location: SourceLocation,
) -> Result<NodeRef> {
    if let Some(name) = declarator.name() {
        debug!("parse_function_definition: {}", name);
        parser.add_ordinary(name);
    }

    parser.push_scope();
    let params = declarator.function_parameters().cloned().unwrap_or_default();
    for param in &params {
        if let Some(name) = param.declarator.name() {
            parser.add_ordinary(name);
        }
    }
    let body = parse_compound_statement(parser);
    parser.pop_scope();

    Ok(parser.push_node(
        NodeKind::FunctionDef(FunctionDefData {
            specifiers,
            declarator,
            body: body?,
        }),
        location,
    ))
}

/// Parse a declaration in block scope or a `for` initializer.
pub fn parse_declaration(parser: &mut Parser) -> Result<NodeRef> {
    if parser.is_keyword(Keyword::StaticAssert) {
        return parse_static_assert(parser);
    }

    let location = parser.current_location();
    let specifiers = parse_declaration_specifiers(parser)?;
    if specifiers.is_empty() {
        return Err(parser.unexpected("declaration"));
    }

    if parser.accept_punct(Punctuator::Semicolon) {
        return Ok(parser.push_node(
            NodeKind::Declaration(DeclarationData {
                specifiers,
                init_declarators: ThinVec::new(),
            }),
            location,
        ));
    }

    let declarator_location = parser.current_location();
    let declarator = parse_declarator(parser, DeclaratorMode::Concrete)?;
    parse_init_declarators(parser, specifiers, declarator, declarator_location, location)
}

/// Parse the init-declarator list after its first declarator, through the `;`.
fn parse_init_declarators(
    parser: &mut Parser,
    specifiers: ThinVec<DeclSpecifier>,
    first: Declarator,
    first_location: SourceLocation,
    location: SourceLocation,
) -> Result<NodeRef> {
    let is_typedef = specifiers
        .iter()
        .any(|s| matches!(s, DeclSpecifier::StorageClass(StorageClass::Typedef)));

    let mut init_declarators = ThinVec::new();
    let mut declarator = first;
    let mut declarator_location = first_location;

    loop {
        // the name is in scope from the end of its declarator
        if let Some(name) = declarator.name() {
            if is_typedef {
                parser.add_typedef(name);
            } else {
                parser.add_ordinary(name);
            }
        }

        let initializer = if parser.accept_punct(Punctuator::Assign) {
            Some(parse_initializer(parser)?)
        } else {
            None
        };

        init_declarators.push(InitDeclarator {
            declarator,
            initializer,
            location: declarator_location,
        });

        if !parser.accept_punct(Punctuator::Comma) {
            break;
        }
        declarator_location = parser.current_location();
        declarator = parse_declarator(parser, DeclaratorMode::Concrete)?;
    }

    parser.expect_punct(Punctuator::Semicolon)?;
    Ok(parser.push_node(
        NodeKind::Declaration(DeclarationData {
            specifiers,
            init_declarators,
        }),
        location,
    ))
}

/// `_Static_assert ( constant-expression , string-literal ) ;`
pub fn parse_static_assert(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_keyword(Keyword::StaticAssert)?;
    parser.expect_punct(Punctuator::LeftParen)?;
    let condition = parse_conditional_expression(parser)?;

    let message = if parser.accept_punct(Punctuator::Comma) {
        match parser.current_kind() {
            Some(TokenKind::StringLiteral(literal)) => {
                parser.advance();
                Some(literal.value.clone())
            }
            _ => return Err(parser.unexpected("string literal")),
        }
    } else {
        None
    };

    parser.expect_punct(Punctuator::RightParen)?;
    parser.expect_punct(Punctuator::Semicolon)?;
    Ok(parser.push_node(NodeKind::StaticAssert(condition, message), location))
}

/// Parse declaration specifiers in source order; an empty list means none were present.
pub fn parse_declaration_specifiers(parser: &mut Parser) -> Result<ThinVec<DeclSpecifier>> {
    let mut specifiers = ThinVec::new();
    let mut has_type_specifier = false;

    while let Some(token) = parser.try_current_token() {
        let location = token.location;
        let specifier = match &token.kind {
            TokenKind::Keyword(keyword) => match keyword {
                Keyword::Typedef => storage_class(parser, StorageClass::Typedef),
                Keyword::Extern => storage_class(parser, StorageClass::Extern),
                Keyword::Static => storage_class(parser, StorageClass::Static),
                Keyword::ThreadLocal => storage_class(parser, StorageClass::ThreadLocal),
                Keyword::Auto => storage_class(parser, StorageClass::Auto),
                Keyword::Register => storage_class(parser, StorageClass::Register),

                Keyword::Const | Keyword::Volatile | Keyword::Restrict => {
                    parser.advance();
                    DeclSpecifier::TypeQualifier(qualifier_of(*keyword))
                }
                Keyword::Atomic => {
                    let is_specifier = parser.peek_token(0).is_some_and(|t| t.is_punctuator(Punctuator::LeftParen));
                    parser.advance();
                    if is_specifier {
                        parser.expect_punct(Punctuator::LeftParen)?;
                        let type_name = parse_type_name(parser)?;
                        parser.expect_punct(Punctuator::RightParen)?;
                        has_type_specifier = true;
                        DeclSpecifier::TypeSpecifier(TypeSpecifier::Atomic(type_name), location)
                    } else {
                        DeclSpecifier::TypeQualifier(TypeQualifiers::ATOMIC)
                    }
                }

                Keyword::Inline => {
                    parser.advance();
                    DeclSpecifier::FunctionSpecifier(FunctionSpecifiers::INLINE)
                }
                Keyword::Noreturn => {
                    parser.advance();
                    DeclSpecifier::FunctionSpecifier(FunctionSpecifiers::NORETURN)
                }
                Keyword::Alignas => DeclSpecifier::Alignment(parse_alignment_specifier(parser)?),

                Keyword::Struct | Keyword::Union => {
                    has_type_specifier = true;
                    let record = parse_record_specifier(parser)?;
                    DeclSpecifier::TypeSpecifier(TypeSpecifier::Record(record), location)
                }
                Keyword::Enum => {
                    has_type_specifier = true;
                    let specifier = parse_enum_specifier(parser)?;
                    DeclSpecifier::TypeSpecifier(TypeSpecifier::Enum(specifier), location)
                }
                Keyword::Imaginary => {
                    return Err(Error::not_supported(location, "'_Imaginary' types are not supported"));
                }
                other => {
                    let Some(specifier) = basic_type_specifier(*other) else {
                        break;
                    };
                    parser.advance();
                    has_type_specifier = true;
                    DeclSpecifier::TypeSpecifier(specifier, location)
                }
            },
            TokenKind::Identifier(symbol) if !has_type_specifier && parser.is_type_name(*symbol) => {
                parser.advance();
                has_type_specifier = true;
                DeclSpecifier::TypeSpecifier(TypeSpecifier::TypedefName(*symbol), location)
            }
            _ => break,
        };
        specifiers.push(specifier);
    }

    Ok(specifiers)
}

fn storage_class(parser: &mut Parser, class: StorageClass) -> DeclSpecifier {
    parser.advance();
    DeclSpecifier::StorageClass(class)
}

fn qualifier_of(keyword: Keyword) -> TypeQualifiers {
    match keyword {
        Keyword::Const => TypeQualifiers::CONST,
        Keyword::Volatile => TypeQualifiers::VOLATILE,
        Keyword::Restrict => TypeQualifiers::RESTRICT,
        Keyword::Atomic => TypeQualifiers::ATOMIC,
        _ => TypeQualifiers::empty(),
    }
}

fn basic_type_specifier(keyword: Keyword) -> Option<TypeSpecifier> {
    Some(match keyword {
        Keyword::Void => TypeSpecifier::Void,
        Keyword::Char => TypeSpecifier::Char,
        Keyword::Short => TypeSpecifier::Short,
        Keyword::Int => TypeSpecifier::Int,
        Keyword::Long => TypeSpecifier::Long,
        Keyword::Float => TypeSpecifier::Float,
        Keyword::Double => TypeSpecifier::Double,
        Keyword::Signed => TypeSpecifier::Signed,
        Keyword::Unsigned => TypeSpecifier::Unsigned,
        Keyword::Bool => TypeSpecifier::Bool,
        Keyword::Complex => TypeSpecifier::Complex,
        _ => return None,
    })
}

/// Parse a (possibly empty) run of type qualifiers, as after `*` or inside `[]`.
fn parse_type_qualifiers(parser: &mut Parser) -> TypeQualifiers {
    let mut qualifiers = TypeQualifiers::empty();
    while let Some(TokenKind::Keyword(keyword)) = parser.current_kind() {
        if !keyword.is_type_qualifier() {
            break;
        }
        qualifiers |= qualifier_of(*keyword);
        parser.advance();
    }
    qualifiers
}

/// `_Alignas ( type-name )` or `_Alignas ( constant-expression )`
fn parse_alignment_specifier(parser: &mut Parser) -> Result<AlignmentSpecifier> {
    parser.expect_keyword(Keyword::Alignas)?;
    parser.expect_punct(Punctuator::LeftParen)?;
    let specifier = if parser.is_type_name_start() {
        AlignmentSpecifier::Type(parse_type_name(parser)?)
    } else {
        AlignmentSpecifier::Expr(parse_conditional_expression(parser)?)
    };
    parser.expect_punct(Punctuator::RightParen)?;
    Ok(specifier)
}

fn parse_record_specifier(parser: &mut Parser) -> Result<RecordSpecifier> {
    let is_union = parser.is_keyword(Keyword::Union);
    parser.advance();

    let tag = match parser.current_kind() {
        Some(TokenKind::Identifier(tag)) => {
            parser.advance();
            Some(*tag)
        }
        _ => None,
    };

    if !parser.accept_punct(Punctuator::LeftBrace) {
        if tag.is_none() {
            return Err(parser.unexpected("struct tag or '{'"));
        }
        return Ok(RecordSpecifier {
            is_union,
            tag,
            members: None,
        });
    }

    let mut members = ThinVec::new();
    while !parser.accept_punct(Punctuator::RightBrace) {
        members.push(parser.nested(parse_member_declaration)?);
    }

    Ok(RecordSpecifier {
        is_union,
        tag,
        members: Some(members),
    })
}

fn parse_member_declaration(parser: &mut Parser) -> Result<MemberDeclaration> {
    if parser.is_keyword(Keyword::StaticAssert) {
        return Ok(MemberDeclaration::StaticAssert(parse_static_assert(parser)?));
    }

    let location = parser.current_location();
    let specifiers = parse_declaration_specifiers(parser)?;
    if specifiers.is_empty() {
        return Err(parser.unexpected("member declaration"));
    }

    let mut declarators = ThinVec::new();
    if !parser.accept_punct(Punctuator::Semicolon) {
        loop {
            let location = parser.current_location();
            let declarator = if parser.is_punct(Punctuator::Colon) {
                Declarator::Abstract
            } else {
                parse_declarator(parser, DeclaratorMode::Concrete)?
            };
            let bit_width = if parser.accept_punct(Punctuator::Colon) {
                Some(parse_conditional_expression(parser)?)
            } else {
                None
            };
            declarators.push(MemberDeclarator {
                declarator,
                bit_width,
                location,
            });
            if !parser.accept_punct(Punctuator::Comma) {
                break;
            }
        }
        parser.expect_punct(Punctuator::Semicolon)?;
    }

    Ok(MemberDeclaration::Fields {
        specifiers,
        declarators,
        location,
    })
}

fn parse_enum_specifier(parser: &mut Parser) -> Result<EnumSpecifier> {
    parser.expect_keyword(Keyword::Enum)?;

    let tag = match parser.current_kind() {
        Some(TokenKind::Identifier(tag)) => {
            parser.advance();
            Some(*tag)
        }
        _ => None,
    };

    if !parser.accept_punct(Punctuator::LeftBrace) {
        if tag.is_none() {
            return Err(parser.unexpected("enum tag or '{'"));
        }
        return Ok(EnumSpecifier { tag, enumerators: None });
    }

    let mut enumerators = ThinVec::new();
    loop {
        if parser.accept_punct(Punctuator::RightBrace) {
            break;
        }
        let (name, location) = parser.expect_name()?;
        let value = if parser.accept_punct(Punctuator::Assign) {
            Some(parse_conditional_expression(parser)?)
        } else {
            None
        };
        // enumerators shadow typedef names from here on
        parser.add_ordinary(name);
        enumerators.push(Enumerator { name, value, location });

        if !parser.accept_punct(Punctuator::Comma) {
            parser.expect_punct(Punctuator::RightBrace)?;
            break;
        }
    }

    if enumerators.is_empty() {
        return Err(Error::malformed(parser.current_location(), "empty enumerator list"));
    }

    Ok(EnumSpecifier {
        tag,
        enumerators: Some(enumerators),
    })
}

/// Parse a declarator. Pointer and suffix wrappers are applied to the base type from
/// the outside in, so `*a[3]` is an array of pointers and `(*a)[3]` a pointer to array.
pub(crate) fn parse_declarator(parser: &mut Parser, mode: DeclaratorMode) -> Result<Declarator> {
    parser.nested(|parser| {
        if parser.accept_punct(Punctuator::Star) {
            let qualifiers = parse_type_qualifiers(parser);
            let inner = parse_declarator(parser, mode)?;
            return Ok(Declarator::Pointer(qualifiers, Box::new(inner)));
        }

        let mut declarator = parse_direct_declarator(parser, mode)?;
        loop {
            if parser.accept_punct(Punctuator::LeftBracket) {
                let size = parse_array_size(parser)?;
                declarator = Declarator::Array(Box::new(declarator), size);
            } else if parser.is_punct(Punctuator::LeftParen) {
                let (params, is_variadic, has_prototype) = parse_parameter_list(parser)?;
                declarator = Declarator::Function {
                    inner: Box::new(declarator),
                    params,
                    is_variadic,
                    has_prototype,
                };
            } else {
                break;
            }
        }
        Ok(declarator)
    })
}

fn parse_direct_declarator(parser: &mut Parser, mode: DeclaratorMode) -> Result<Declarator> {
    match parser.current_kind() {
        Some(TokenKind::Identifier(symbol)) if mode != DeclaratorMode::Abstract => {
            let symbol = *symbol;
            let location = parser.current_location();
            parser.advance();
            Ok(Declarator::Identifier(symbol, location))
        }
        Some(TokenKind::Punctuator(Punctuator::LeftParen)) if !starts_parameter_list(parser, mode) => {
            parser.advance();
            let inner = parse_declarator(parser, mode)?;
            parser.expect_punct(Punctuator::RightParen)?;
            Ok(inner)
        }
        _ if mode == DeclaratorMode::Concrete => Err(parser.unexpected("identifier")),
        _ => Ok(Declarator::Abstract),
    }
}

/// Decide whether a `(` in declarator position opens a parameter list rather than a
/// parenthesized declarator.
fn starts_parameter_list(parser: &Parser, mode: DeclaratorMode) -> bool {
    if mode == DeclaratorMode::Concrete {
        return false;
    }
    match parser.peek_token(0).map(|t| &t.kind) {
        Some(TokenKind::Punctuator(Punctuator::RightParen)) => true,
        Some(TokenKind::Keyword(k)) => k.is_declaration_specifier_start(),
        Some(TokenKind::Identifier(symbol)) => parser.is_type_name(*symbol),
        _ => false,
    }
}

/// Parse the inside of `[ ... ]`, the `[` already consumed.
fn parse_array_size(parser: &mut Parser) -> Result<ArraySize> {
    let mut is_static = parser.accept_keyword(Keyword::Static);
    let qualifiers = parse_type_qualifiers(parser);
    is_static |= parser.accept_keyword(Keyword::Static);

    if parser.is_punct(Punctuator::Star) && parser.peek_token(0).is_some_and(|t| t.is_punctuator(Punctuator::RightBracket)) {
        parser.advance();
        parser.advance();
        return Ok(ArraySize::Star { qualifiers });
    }

    if parser.accept_punct(Punctuator::RightBracket) {
        if is_static {
            return Err(Error::malformed(parser.current_location(), "'static' array parameter requires a size"));
        }
        return Ok(ArraySize::Incomplete { qualifiers });
    }

    let expr = parse_assignment_expression(parser)?;
    parser.expect_punct(Punctuator::RightBracket)?;
    Ok(ArraySize::Expression {
        expr,
        qualifiers,
        is_static,
    })
}

/// Parse `( parameter-type-list )`, returning (params, variadic, prototyped).
fn parse_parameter_list(parser: &mut Parser) -> Result<(ThinVec<ParamData>, bool, bool)> {
    parser.expect_punct(Punctuator::LeftParen)?;

    if parser.accept_punct(Punctuator::RightParen) {
        return Ok((ThinVec::new(), false, false));
    }

    if parser.is_keyword(Keyword::Void) && parser.peek_token(0).is_some_and(|t| t.is_punctuator(Punctuator::RightParen)) {
        parser.advance();
        parser.advance();
        return Ok((ThinVec::new(), false, true));
    }

    if let Some(TokenKind::Identifier(symbol)) = parser.current_kind() {
        if !parser.is_type_name(*symbol) {
            return Err(Error::not_supported(
                parser.current_location(),
                "identifier lists in function declarators are not supported",
            ));
        }
    }

    // parameters live in their own prototype scope
    parser.push_scope();
    let result = parse_parameters(parser);
    parser.pop_scope();
    let (params, is_variadic) = result?;

    parser.expect_punct(Punctuator::RightParen)?;
    Ok((params, is_variadic, true))
}

fn parse_parameters(parser: &mut Parser) -> Result<(ThinVec<ParamData>, bool)> {
    let mut params = ThinVec::new();
    loop {
        if parser.accept_punct(Punctuator::Ellipsis) {
            if params.is_empty() {
                return Err(Error::malformed(
                    parser.current_location(),
                    "variadic function requires a named parameter",
                ));
            }
            return Ok((params, true));
        }

        let location = parser.current_location();
        let specifiers = parse_declaration_specifiers(parser)?;
        if specifiers.is_empty() {
            return Err(parser.unexpected("parameter declaration"));
        }
        let declarator = parse_declarator(parser, DeclaratorMode::Either)?;
        if let Some(name) = declarator.name() {
            parser.add_ordinary(name);
        }
        params.push(ParamData {
            specifiers,
            declarator,
            location,
        });

        if !parser.accept_punct(Punctuator::Comma) {
            return Ok((params, false));
        }
    }
}

/// Parse a type name: specifier-qualifier list plus an abstract declarator.
pub fn parse_type_name(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.current_location();
    let specifiers = parse_declaration_specifiers(parser)?;
    if specifiers.is_empty() {
        return Err(parser.unexpected("type name"));
    }
    if let Some(DeclSpecifier::StorageClass(class)) =
        specifiers.iter().find(|s| matches!(s, DeclSpecifier::StorageClass(_)))
    {
        return Err(Error::malformed(
            location,
            format!("storage class '{}' is not allowed in a type name", class.name()),
        ));
    }
    let declarator = parse_declarator(parser, DeclaratorMode::Abstract)?;
    Ok(parser.push_node(NodeKind::TypeName(TypeName { specifiers, declarator }), location))
}

/// Parse an initializer: an assignment expression or a braced list.
pub fn parse_initializer(parser: &mut Parser) -> Result<NodeRef> {
    if parser.is_punct(Punctuator::LeftBrace) {
        parse_initializer_list(parser)
    } else {
        parse_assignment_expression(parser)
    }
}

/// Parse `{ designation? initializer, ... }`
pub fn parse_initializer_list(parser: &mut Parser) -> Result<NodeRef> {
    let location = parser.expect_punct(Punctuator::LeftBrace)?;
    let mut initializers = ThinVec::new();

    parser.nested(|parser| {
        loop {
            if parser.accept_punct(Punctuator::RightBrace) {
                break;
            }

            let designators = parse_designation(parser)?;
            let initializer = parse_initializer(parser)?;
            initializers.push(DesignatedInitializer {
                designators,
                initializer,
            });

            if !parser.accept_punct(Punctuator::Comma) {
                parser.expect_punct(Punctuator::RightBrace)?;
                break;
            }
        }
        Ok(())
    })?;

    Ok(parser.push_node(NodeKind::InitializerList(initializers), location))
}

fn parse_designation(parser: &mut Parser) -> Result<ThinVec<Designator>> {
    let mut designators = ThinVec::new();
    loop {
        if parser.accept_punct(Punctuator::Dot) {
            let (name, _) = parser.expect_name()?;
            designators.push(Designator::FieldName(name));
        } else if parser.accept_punct(Punctuator::LeftBracket) {
            let index = parse_conditional_expression(parser)?;
            parser.expect_punct(Punctuator::RightBracket)?;
            designators.push(Designator::ArrayIndex(index));
        } else {
            break;
        }
    }
    if !designators.is_empty() {
        parser.expect_punct(Punctuator::Assign)?;
    }
    Ok(designators)
}
