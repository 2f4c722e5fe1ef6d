//! Expression typing.
//!
//! Every analyzed expression node gets an [`ExpressionType`] recorded in
//! `SemanticInfo::expression_types`. The recorded type is the type of the expression
//! before lvalue conversion, so `sizeof` and `&` see arrays and qualifiers intact.

use symbol_table::GlobalSymbol as Symbol;

use super::analyzer::{ExpressionType, SemanticAnalyzer};
use super::const_eval::ConstValue;
use super::conversions::{integer_promotion, usual_arithmetic_conversions, value_conversion};
use super::symbol_table::{Namespace, ScopedIdentifier, Storage};
use super::types::{ArraySize, TypeKind, TypeQualifiers, TypeRef};
use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexer::{CharType, Constant, FloatType, IntegerType, StringValue};
use crate::source::SourceLocation;

fn rvalue(ty: TypeRef) -> ExpressionType {
    ExpressionType { ty, is_lvalue: false }
}

fn lvalue(ty: TypeRef) -> ExpressionType {
    ExpressionType { ty, is_lvalue: true }
}

impl<'a> SemanticAnalyzer<'a> {
    /// Type-check `node` and record its type.
    pub(crate) fn analyze_expression(&mut self, node: NodeRef) -> Result<ExpressionType> {
        let result = self.expression_type_of(node)?;
        self.info.expression_types.insert(node, result);
        Ok(result)
    }

    /// Type after lvalue, array-to-pointer and function-to-pointer conversion.
    pub(crate) fn value_type(&mut self, ty: TypeRef) -> TypeRef {
        value_conversion(&mut self.registry, ty)
    }

    fn analyze_value(&mut self, node: NodeRef) -> Result<TypeRef> {
        let ty = self.analyze_expression(node)?.ty;
        Ok(self.value_type(ty))
    }

    fn expression_type_of(&mut self, node: NodeRef) -> Result<ExpressionType> {
        let ast = self.ast;
        let location = ast.get_location(node);
        match ast.get_kind(node) {
            NodeKind::Identifier(name) => self.identifier_type(*name, location),
            NodeKind::Constant(constant) => Ok(rvalue(self.constant_type(constant))),
            NodeKind::StringLiteral(value) => {
                let element = self.string_element_type(value);
                let ty = self.registry.array_of(element, ArraySize::Bounded(value.len() as u64 + 1));
                Ok(lvalue(ty))
            }
            NodeKind::GenericSelection(controlling, associations) => {
                self.generic_selection(*controlling, associations, location)
            }
            NodeKind::CompoundLiteral(type_name, initializer) => {
                let ty = self.resolve_type_name(*type_name)?;
                if matches!(self.registry.base_kind(ty), TypeKind::Array { size: ArraySize::Vla, .. }) {
                    return Err(Error::malformed(location, "compound literal has variable-length array type"));
                }
                let ty = self.complete_from_initializer(ty, *initializer)?;
                if !self.registry.is_complete(ty) {
                    return Err(Error::malformed(
                        location,
                        format!("compound literal has incomplete type '{}'", self.registry.display(ty)),
                    ));
                }
                self.analyze_initializer(ty, *initializer)?;
                Ok(lvalue(ty))
            }
            NodeKind::Index(base, index) => {
                let base_type = self.analyze_value(*base)?;
                let index_type = self.analyze_value(*index)?;
                let pointer = if self.registry.is_pointer(base_type) && self.registry.is_integer(index_type) {
                    base_type
                } else if self.registry.is_integer(base_type) && self.registry.is_pointer(index_type) {
                    index_type
                } else {
                    return Err(Error::malformed(location, "subscripted value is not an array or pointer"));
                };
                let element = self.complete_pointee(pointer, location)?;
                Ok(lvalue(element))
            }
            NodeKind::Call(callee, arguments) => self.call_type(*callee, arguments, location),
            NodeKind::Member(object, field, is_arrow) => self.member_type(*object, *field, *is_arrow, location),
            NodeKind::PostIncrement(operand) | NodeKind::PostDecrement(operand) => {
                self.increment_type(*operand, location)
            }
            NodeKind::Unary(op, operand) => self.unary_type(*op, *operand, location),
            NodeKind::SizeOfExpr(operand) => {
                let ty = self.analyze_expression(*operand)?.ty;
                if self.is_bit_field(*operand) {
                    return Err(Error::malformed(location, "invalid application of 'sizeof' to a bit-field"));
                }
                self.complete_layout(ty, location)?;
                Ok(rvalue(self.registry.type_unsigned_long))
            }
            NodeKind::SizeOfType(type_name) | NodeKind::AlignOf(type_name) => {
                let ty = self.resolve_type_name(*type_name)?;
                self.complete_layout(ty, location)?;
                Ok(rvalue(self.registry.type_unsigned_long))
            }
            NodeKind::Cast(type_name, operand) => self.cast_type(*type_name, *operand, location),
            NodeKind::Binary(op, left, right) => self.binary_type(*op, *left, *right, location),
            NodeKind::Conditional(condition, then_expr, else_expr) => {
                self.conditional_type(*condition, *then_expr, *else_expr, location)
            }
            NodeKind::Assignment(op, target, value) => self.assignment_type(*op, *target, *value, location),
            NodeKind::InitializerList(_) => Err(Error::malformed(location, "initializer list used as an expression")),
            other => Err(Error::internal(format!("unexpected expression node {:?}", other))),
        }
    }

    fn identifier_type(&mut self, name: Symbol, location: SourceLocation) -> Result<ExpressionType> {
        match self.symbols.lookup(name, Namespace::Ordinary) {
            Some((_, ScopedIdentifier::Object { ty, .. })) => Ok(lvalue(*ty)),
            Some((_, ScopedIdentifier::Function { ty, .. })) => Ok(rvalue(*ty)),
            Some((_, ScopedIdentifier::Constant { ty, .. })) => Ok(rvalue(*ty)),
            Some((_, ScopedIdentifier::TypeDefinition { .. })) => Err(Error::malformed(
                location,
                format!("unexpected type name '{}': expected expression", name),
            )),
            Some((_, ScopedIdentifier::Tag { .. })) | None => Err(Error::not_found(
                location,
                format!("use of undeclared identifier '{}'", name),
            )),
        }
    }

    fn constant_type(&self, constant: &Constant) -> TypeRef {
        let r = &self.registry;
        match constant {
            Constant::Integer { ty, .. } => match ty {
                IntegerType::Int => r.type_int,
                IntegerType::UnsignedInt => r.type_unsigned_int,
                IntegerType::Long => r.type_long,
                IntegerType::UnsignedLong => r.type_unsigned_long,
                IntegerType::LongLong => r.type_long_long,
                IntegerType::UnsignedLongLong => r.type_unsigned_long_long,
            },
            Constant::Floating { ty, .. } => match ty {
                FloatType::Float => r.type_float,
                FloatType::Double => r.type_double,
                FloatType::LongDouble => r.type_long_double,
            },
            Constant::Character { ty, .. } => match ty {
                CharType::Char | CharType::WideChar => r.type_int,
                CharType::Char16 => r.type_unsigned_short,
                CharType::Char32 => r.type_unsigned_int,
            },
        }
    }

    fn string_element_type(&self, value: &StringValue) -> TypeRef {
        let r = &self.registry;
        match value {
            StringValue::Multibyte(_) | StringValue::Utf8(_) => r.type_char,
            StringValue::Utf16(_) => r.type_unsigned_short,
            StringValue::Utf32(_) => r.type_unsigned_int,
            StringValue::Wide(_) => r.type_int,
        }
    }

    fn generic_selection(
        &mut self,
        controlling: NodeRef,
        associations: &'a [GenericAssociation],
        location: SourceLocation,
    ) -> Result<ExpressionType> {
        let controlling_type = self.analyze_value(controlling)?;
        let mut seen: Vec<TypeRef> = Vec::with_capacity(associations.len());
        let mut selected = None;
        let mut default = None;

        for association in associations {
            let result = self.analyze_expression(association.expr)?;
            let Some(type_name) = association.type_name else {
                if default.is_some() {
                    return Err(Error::malformed(location, "duplicate default generic association"));
                }
                default = Some(result);
                continue;
            };
            let ty = self.resolve_type_name(type_name)?;
            if !self.registry.is_complete(ty) || self.registry.is_function(ty) {
                return Err(Error::malformed(
                    self.ast.get_location(type_name),
                    format!("type '{}' in generic association is not a complete object type", self.registry.display(ty)),
                ));
            }
            if seen.iter().any(|&other| self.registry.compatible(other, ty)) {
                return Err(Error::malformed(
                    self.ast.get_location(type_name),
                    format!("type '{}' in generic association compatible with previously specified type", self.registry.display(ty)),
                ));
            }
            seen.push(ty);
            if self.registry.compatible(controlling_type, ty) {
                selected = Some(result);
            }
        }

        selected.or(default).ok_or_else(|| {
            Error::malformed(
                location,
                format!(
                    "controlling expression type '{}' not compatible with any generic association type",
                    self.registry.display(controlling_type)
                ),
            )
        })
    }

    /// Pointee of `pointer`, which must be a complete object type.
    fn complete_pointee(&self, pointer: TypeRef, location: SourceLocation) -> Result<TypeRef> {
        let pointee = self
            .registry
            .pointee(pointer)
            .ok_or_else(|| Error::internal("expected a pointer type"))?;
        if self.registry.is_function(pointee) || !self.registry.is_complete(pointee) {
            return Err(Error::malformed(
                location,
                format!("arithmetic on a pointer to incomplete type '{}'", self.registry.display(pointee)),
            ));
        }
        Ok(pointee)
    }

    fn call_type(&mut self, callee: NodeRef, arguments: &'a [NodeRef], location: SourceLocation) -> Result<ExpressionType> {
        let callee_type = self.analyze_value(callee)?;
        let function = self.registry.pointee(callee_type).filter(|&f| self.registry.is_function(f));
        let Some(function) = function else {
            return Err(Error::malformed(
                location,
                format!(
                    "called object type '{}' is not a function or function pointer",
                    self.registry.display(callee_type)
                ),
            ));
        };
        let TypeKind::Function {
            return_type,
            params,
            is_variadic,
            has_prototype,
        } = self.registry.base_kind(function).clone()
        else {
            return Err(Error::internal("function pointer without function type"));
        };

        if has_prototype {
            if arguments.len() < params.len() || (arguments.len() > params.len() && !is_variadic) {
                let which = if arguments.len() < params.len() { "few" } else { "many" };
                return Err(Error::malformed(
                    location,
                    format!(
                        "too {} arguments to function call, expected {}, have {}",
                        which,
                        params.len(),
                        arguments.len()
                    ),
                ));
            }
        }

        for (i, &argument) in arguments.iter().enumerate() {
            let source = self.analyze_expression(argument)?;
            match params.get(i).filter(|_| has_prototype) {
                Some(param) => {
                    let target = self.registry.unqualified(param.ty);
                    self.check_assignment(target, argument, source, self.ast.get_location(argument))?;
                }
                None => {
                    // passed through the default argument promotions
                    let ty = self.value_type(source.ty);
                    if !self.registry.is_void(ty) && !self.registry.is_complete(ty) {
                        return Err(Error::malformed(self.ast.get_location(argument), "argument has incomplete type"));
                    }
                }
            }
        }

        if !self.registry.is_void(return_type) && !self.registry.is_complete(return_type) {
            return Err(Error::malformed(
                location,
                format!("calling function with incomplete return type '{}'", self.registry.display(return_type)),
            ));
        }
        Ok(rvalue(return_type))
    }

    fn member_type(&mut self, object: NodeRef, field: Symbol, is_arrow: bool, location: SourceLocation) -> Result<ExpressionType> {
        let (record, is_lvalue) = if is_arrow {
            let pointer = self.analyze_value(object)?;
            let pointee = self.registry.pointee(pointer).filter(|&p| self.registry.is_record(p));
            let Some(pointee) = pointee else {
                return Err(Error::malformed(
                    location,
                    format!(
                        "member reference type '{}' is not a pointer to a structure or union",
                        self.registry.display(pointer)
                    ),
                ));
            };
            (pointee, true)
        } else {
            let object = self.analyze_expression(object)?;
            if !self.registry.is_record(object.ty) {
                return Err(Error::malformed(
                    location,
                    format!(
                        "member reference base type '{}' is not a structure or union",
                        self.registry.display(object.ty)
                    ),
                ));
            }
            (object.ty, object.is_lvalue)
        };

        if !self.registry.is_complete(record) {
            return Err(Error::malformed(
                location,
                format!("incomplete definition of type '{}'", self.registry.display(record)),
            ));
        }
        let Some((_, member)) = self.registry.find_member(record, field) else {
            return Err(Error::not_found(
                location,
                format!("no member named '{}' in '{}'", field, self.registry.display(record)),
            ));
        };
        let qualifiers = self.registry.qualifiers(record);
        let ty = self.registry.qualified(member, qualifiers);
        Ok(ExpressionType { ty, is_lvalue })
    }

    fn is_bit_field(&self, node: NodeRef) -> bool {
        let NodeKind::Member(object, field, is_arrow) = self.ast.get_kind(node) else {
            return false;
        };
        let Some(object_type) = self.info.expression_type(*object) else {
            return false;
        };
        let record = if *is_arrow {
            match self.registry.pointee(object_type) {
                Some(p) => p,
                None => return false,
            }
        } else {
            object_type
        };
        let Some((path, _)) = self.registry.find_member(record, *field) else {
            return false;
        };

        // walk the path down to the innermost record to read the field itself
        let mut current = record;
        for (depth, &index) in path.iter().enumerate() {
            let TypeKind::Record {
                definition: Some(definition),
                ..
            } = self.registry.base_kind(current)
            else {
                return false;
            };
            let Some(field) = definition.fields.get(index) else {
                return false;
            };
            if depth + 1 == path.len() {
                return field.bit_width.is_some();
            }
            current = field.ty;
        }
        false
    }

    /// Checks that `operand` designates a modifiable lvalue.
    fn check_modifiable(&self, operand: NodeRef, result: ExpressionType, location: SourceLocation) -> Result<()> {
        if !result.is_lvalue || self.registry.is_array(result.ty) || self.registry.is_function(result.ty) {
            return Err(Error::malformed(location, "expression is not assignable"));
        }
        if self.registry.qualifiers(result.ty).contains(TypeQualifiers::CONST) {
            let what = match self.ast.get_kind(operand) {
                NodeKind::Identifier(name) => format!("cannot assign to variable '{}' with const-qualified type", name),
                _ => "cannot assign to an expression with const-qualified type".to_string(),
            };
            return Err(Error::malformed(location, what));
        }
        if !self.registry.is_complete(result.ty) {
            return Err(Error::malformed(location, "assignment to an incomplete type"));
        }
        if self.has_const_member(result.ty) {
            return Err(Error::malformed(
                location,
                format!("cannot assign to '{}' with a const-qualified member", self.registry.display(result.ty)),
            ));
        }
        Ok(())
    }

    fn has_const_member(&self, ty: TypeRef) -> bool {
        let TypeKind::Record {
            definition: Some(definition),
            ..
        } = self.registry.base_kind(ty)
        else {
            return false;
        };
        definition.fields.iter().any(|field| {
            self.registry.qualifiers(field.ty).contains(TypeQualifiers::CONST) || self.has_const_member(field.ty)
        })
    }

    fn increment_type(&mut self, operand: NodeRef, location: SourceLocation) -> Result<ExpressionType> {
        let result = self.analyze_expression(operand)?;
        self.check_modifiable(operand, result, location)?;
        let ty = self.value_type(result.ty);
        if self.registry.is_pointer(ty) {
            self.complete_pointee(ty, location)?;
        } else if !self.registry.is_arithmetic(ty) {
            return Err(Error::malformed(
                location,
                format!("cannot increment value of type '{}'", self.registry.display(ty)),
            ));
        }
        Ok(rvalue(ty))
    }

    fn unary_type(&mut self, op: UnaryOp, operand: NodeRef, location: SourceLocation) -> Result<ExpressionType> {
        match op {
            UnaryOp::PreIncrement | UnaryOp::PreDecrement => self.increment_type(operand, location),
            UnaryOp::Plus | UnaryOp::Minus => {
                let ty = self.analyze_value(operand)?;
                if !self.registry.is_arithmetic(ty) {
                    return Err(invalid_operand(self, "unary expression", ty, location));
                }
                Ok(rvalue(integer_promotion(&self.registry, ty)))
            }
            UnaryOp::BitNot => {
                let ty = self.analyze_value(operand)?;
                if !self.registry.is_integer(ty) {
                    return Err(invalid_operand(self, "'~'", ty, location));
                }
                Ok(rvalue(integer_promotion(&self.registry, ty)))
            }
            UnaryOp::LogicNot => {
                let ty = self.analyze_value(operand)?;
                if !self.registry.is_scalar(ty) {
                    return Err(invalid_operand(self, "'!'", ty, location));
                }
                Ok(rvalue(self.registry.type_int))
            }
            UnaryOp::Deref => {
                let ty = self.analyze_value(operand)?;
                let Some(pointee) = self.registry.pointee(ty) else {
                    return Err(Error::malformed(
                        location,
                        format!("indirection requires pointer operand ('{}' invalid)", self.registry.display(ty)),
                    ));
                };
                let designates_object = !self.registry.is_function(pointee) && !self.registry.is_void(pointee);
                Ok(ExpressionType {
                    ty: pointee,
                    is_lvalue: designates_object,
                })
            }
            UnaryOp::AddrOf => {
                let result = self.analyze_expression(operand)?;
                if self.registry.is_function(result.ty) {
                    return Ok(rvalue(self.registry.pointer_to(result.ty)));
                }
                if !result.is_lvalue {
                    return Err(Error::malformed(location, "cannot take the address of an rvalue"));
                }
                if self.is_bit_field(operand) {
                    return Err(Error::malformed(location, "address of bit-field requested"));
                }
                if let NodeKind::Identifier(name) = self.ast.get_kind(operand) {
                    if let Some((
                        _,
                        ScopedIdentifier::Object {
                            storage: Storage::Register,
                            ..
                        },
                    )) = self.symbols.lookup(*name, Namespace::Ordinary)
                    {
                        return Err(Error::malformed(
                            location,
                            format!("address of register variable '{}' requested", name),
                        ));
                    }
                }
                Ok(rvalue(self.registry.pointer_to(result.ty)))
            }
        }
    }

    fn cast_type(&mut self, type_name: NodeRef, operand: NodeRef, location: SourceLocation) -> Result<ExpressionType> {
        let target = self.resolve_type_name(type_name)?;
        let source = self.analyze_value(operand)?;
        let target = self.registry.unqualified(target);
        if self.registry.is_void(target) {
            return Ok(rvalue(target));
        }
        let valid = self.registry.is_scalar(target)
            && self.registry.is_scalar(source)
            && !(self.registry.is_pointer(target) && self.registry.is_floating(source))
            && !(self.registry.is_floating(target) && self.registry.is_pointer(source));
        if !valid {
            return Err(Error::malformed(
                location,
                format!(
                    "cannot cast from type '{}' to '{}'",
                    self.registry.display(source),
                    self.registry.display(target)
                ),
            ));
        }
        Ok(rvalue(target))
    }

    /// Integer constant expression with value zero, or such an expression cast to `void *`.
    fn is_null_pointer_constant(&mut self, node: NodeRef, ty: TypeRef) -> bool {
        if self.registry.is_integer(ty) {
            return matches!(self.evaluate(node), Ok(ConstValue::Integer(0)));
        }
        let Some(pointee) = self.registry.pointee(ty) else {
            return false;
        };
        if !matches!(self.registry.kind(pointee), TypeKind::Void) {
            return false;
        }
        match self.ast.get_kind(node) {
            NodeKind::Cast(_, operand) => {
                let operand = *operand;
                match self.info.expression_type(operand) {
                    Some(inner) => {
                        let inner = self.value_type(inner);
                        self.is_null_pointer_constant(operand, inner)
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    fn binary_type(&mut self, op: BinaryOp, left: NodeRef, right: NodeRef, location: SourceLocation) -> Result<ExpressionType> {
        if op == BinaryOp::Comma {
            self.analyze_expression(left)?;
            let ty = self.analyze_value(right)?;
            return Ok(rvalue(ty));
        }
        let lt = self.analyze_value(left)?;
        let rt = self.analyze_value(right)?;
        let ty = self.binary_operand_type(op, left, lt, right, rt, location)?;
        Ok(rvalue(ty))
    }

    fn binary_operand_type(
        &mut self,
        op: BinaryOp,
        left: NodeRef,
        lt: TypeRef,
        right: NodeRef,
        rt: TypeRef,
        location: SourceLocation,
    ) -> Result<TypeRef> {
        let r = &self.registry;
        let arithmetic = usual_arithmetic_conversions(r, lt, rt);
        let both_integer = r.is_integer(lt) && r.is_integer(rt);
        let invalid = |this: &Self| {
            Error::malformed(
                location,
                format!(
                    "invalid operands to binary expression ('{}' and '{}')",
                    this.registry.display(lt),
                    this.registry.display(rt)
                ),
            )
        };

        match op {
            BinaryOp::Mul | BinaryOp::Div => arithmetic.ok_or_else(|| invalid(self)),
            BinaryOp::Mod | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                if !both_integer {
                    return Err(invalid(self));
                }
                arithmetic.ok_or_else(|| invalid(self))
            }
            BinaryOp::LShift | BinaryOp::RShift => {
                if !both_integer {
                    return Err(invalid(self));
                }
                Ok(integer_promotion(&self.registry, lt))
            }
            BinaryOp::Add => {
                if let Some(ty) = arithmetic {
                    return Ok(ty);
                }
                if self.registry.is_pointer(lt) && self.registry.is_integer(rt) {
                    self.complete_pointee(lt, location)?;
                    return Ok(lt);
                }
                if self.registry.is_integer(lt) && self.registry.is_pointer(rt) {
                    self.complete_pointee(rt, location)?;
                    return Ok(rt);
                }
                Err(invalid(self))
            }
            BinaryOp::Sub => {
                if let Some(ty) = arithmetic {
                    return Ok(ty);
                }
                if self.registry.is_pointer(lt) && self.registry.is_integer(rt) {
                    self.complete_pointee(lt, location)?;
                    return Ok(lt);
                }
                if self.registry.is_pointer(lt) && self.registry.is_pointer(rt) {
                    let lp = self.complete_pointee(lt, location)?;
                    let rp = self.complete_pointee(rt, location)?;
                    let (lp, rp) = (self.registry.unqualified(lp), self.registry.unqualified(rp));
                    if !self.registry.compatible(lp, rp) {
                        return Err(invalid(self));
                    }
                    return Ok(self.registry.type_long);
                }
                Err(invalid(self))
            }
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                if arithmetic.is_some() {
                    return Ok(self.registry.type_int);
                }
                if self.registry.is_pointer(lt) && self.registry.is_pointer(rt) && self.compatible_pointees(lt, rt) {
                    return Ok(self.registry.type_int);
                }
                Err(invalid(self))
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                if arithmetic.is_some() {
                    return Ok(self.registry.type_int);
                }
                let (lp, rp) = (self.registry.is_pointer(lt), self.registry.is_pointer(rt));
                let valid = (lp && rp && (self.compatible_pointees(lt, rt) || self.is_void_pointer(lt) || self.is_void_pointer(rt)))
                    || (lp && self.is_null_pointer_constant(right, rt))
                    || (rp && self.is_null_pointer_constant(left, lt));
                if !valid {
                    return Err(invalid(self));
                }
                Ok(self.registry.type_int)
            }
            BinaryOp::LogicAnd | BinaryOp::LogicOr => {
                if !self.registry.is_scalar(lt) || !self.registry.is_scalar(rt) {
                    return Err(invalid(self));
                }
                Ok(self.registry.type_int)
            }
            _ => Err(Error::internal(format!("{:?} is not a plain binary operator", op))),
        }
    }

    fn compatible_pointees(&self, a: TypeRef, b: TypeRef) -> bool {
        match (self.registry.pointee(a), self.registry.pointee(b)) {
            (Some(a), Some(b)) => self
                .registry
                .compatible(self.registry.unqualified(a), self.registry.unqualified(b)),
            _ => false,
        }
    }

    fn is_void_pointer(&self, ty: TypeRef) -> bool {
        self.registry.pointee(ty).is_some_and(|p| self.registry.is_void(p))
    }

    fn conditional_type(
        &mut self,
        condition: NodeRef,
        then_expr: NodeRef,
        else_expr: NodeRef,
        location: SourceLocation,
    ) -> Result<ExpressionType> {
        let condition_type = self.analyze_value(condition)?;
        if !self.registry.is_scalar(condition_type) {
            return Err(invalid_operand(self, "'?:' condition", condition_type, location));
        }
        let lt = self.analyze_value(then_expr)?;
        let rt = self.analyze_value(else_expr)?;

        if let Some(ty) = usual_arithmetic_conversions(&self.registry, lt, rt) {
            return Ok(rvalue(ty));
        }
        if self.registry.is_void(lt) && self.registry.is_void(rt) {
            return Ok(rvalue(self.registry.type_void));
        }
        if self.registry.is_record(lt) && self.registry.compatible(lt, rt) {
            return Ok(rvalue(lt));
        }
        if self.registry.is_pointer(lt) && self.registry.is_pointer(rt) {
            let lp = self.registry.pointee(lt);
            let rp = self.registry.pointee(rt);
            if let (Some(lp), Some(rp)) = (lp, rp) {
                let qualifiers = self.registry.qualifiers(lp) | self.registry.qualifiers(rp);
                let (ul, ur) = (self.registry.unqualified(lp), self.registry.unqualified(rp));
                let pointee = if self.registry.is_void(ul) || self.registry.is_void(ur) {
                    self.registry.type_void
                } else if self.registry.compatible(ul, ur) {
                    self.registry.composite(ul, ur, location)?
                } else {
                    return Err(Error::malformed(
                        location,
                        format!(
                            "pointer type mismatch ('{}' and '{}')",
                            self.registry.display(lt),
                            self.registry.display(rt)
                        ),
                    ));
                };
                let pointee = self.registry.qualified(pointee, qualifiers);
                return Ok(rvalue(self.registry.pointer_to(pointee)));
            }
        }
        if self.registry.is_pointer(lt) && self.is_null_pointer_constant(else_expr, rt) {
            return Ok(rvalue(lt));
        }
        if self.registry.is_pointer(rt) && self.is_null_pointer_constant(then_expr, lt) {
            return Ok(rvalue(rt));
        }
        Err(Error::malformed(
            location,
            format!(
                "incompatible operand types ('{}' and '{}')",
                self.registry.display(lt),
                self.registry.display(rt)
            ),
        ))
    }

    fn assignment_type(&mut self, op: BinaryOp, target: NodeRef, value: NodeRef, location: SourceLocation) -> Result<ExpressionType> {
        let target_result = self.analyze_expression(target)?;
        self.check_modifiable(target, target_result, location)?;
        let target_type = self.value_type(target_result.ty);
        let source = self.analyze_expression(value)?;

        match op.without_assignment() {
            None => self.check_assignment(target_type, value, source, location)?,
            Some(plain) => {
                let source_type = self.value_type(source.ty);
                let pointer_step = matches!(plain, BinaryOp::Add | BinaryOp::Sub)
                    && self.registry.is_pointer(target_type)
                    && self.registry.is_integer(source_type);
                if pointer_step {
                    self.complete_pointee(target_type, location)?;
                } else {
                    self.binary_operand_type(plain, target, target_type, value, source_type, location)?;
                }
            }
        }
        Ok(rvalue(target_type))
    }

    /// Simple-assignment constraints (C11 6.5.16.1), shared by initialization,
    /// argument passing and `return`.
    pub(crate) fn check_assignment(
        &mut self,
        target: TypeRef,
        source_node: NodeRef,
        source: ExpressionType,
        location: SourceLocation,
    ) -> Result<()> {
        let target = self.registry.unqualified(target);
        let source_type = self.value_type(source.ty);
        let r = &self.registry;

        if r.is_arithmetic(target) && r.is_arithmetic(source_type) {
            return Ok(());
        }
        if matches!(r.base_kind(target), TypeKind::Bool) && r.is_pointer(source_type) {
            return Ok(());
        }
        if r.is_record(target) && r.compatible(target, source_type) {
            return Ok(());
        }
        if r.is_pointer(target) {
            if r.is_pointer(source_type) {
                let (Some(tp), Some(sp)) = (r.pointee(target), r.pointee(source_type)) else {
                    return Err(Error::internal("pointer without pointee"));
                };
                if !r.qualifiers(tp).contains(r.qualifiers(sp)) {
                    self.diag.report_warning(
                        format!(
                            "assigning to '{}' from '{}' discards qualifiers",
                            r.display(target),
                            r.display(source_type)
                        ),
                        Some(location),
                    );
                    return Ok(());
                }
                let (ut, us) = (r.unqualified(tp), r.unqualified(sp));
                if !(r.is_void(ut) || r.is_void(us) || r.compatible(ut, us)) {
                    self.diag.report_warning(
                        format!(
                            "incompatible pointer types assigning to '{}' from '{}'",
                            r.display(target),
                            r.display(source_type)
                        ),
                        Some(location),
                    );
                }
                return Ok(());
            }
            if self.is_null_pointer_constant(source_node, source_type) {
                return Ok(());
            }
        }
        Err(Error::malformed(
            location,
            format!(
                "incompatible types assigning to '{}' from '{}'",
                self.registry.display(target),
                self.registry.display(source_type)
            ),
        ))
    }
}

fn invalid_operand(analyzer: &SemanticAnalyzer<'_>, what: &str, ty: TypeRef, location: SourceLocation) -> Error {
    Error::malformed(
        location,
        format!("invalid argument type '{}' to {}", analyzer.registry.display(ty), what),
    )
}
