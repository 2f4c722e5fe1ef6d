//! Constant expression evaluation
//!
//! Evaluates integer and arithmetic constant expressions (C11 6.6) over the AST, as
//! required for array bounds, bit-field widths, enumerator values, `_Alignas`,
//! `_Static_assert` and `#if` conditions. Anything that needs types or declarations
//! goes through [`ConstContext`], so the preprocessor can evaluate without an analyzer.

use log::trace;
use symbol_table::GlobalSymbol as Symbol;

use crate::ast::{Ast, BinaryOp, NodeKind, NodeRef, UnaryOp};
use crate::error::{Error, Result};
use crate::lexer::{CharType, Constant, IntegerType};
use crate::source::SourceLocation;

/// Result of evaluating a constant expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    None,
    Integer(i64),
    Float(f64),
}

impl ConstValue {
    pub fn is_truthy(self) -> bool {
        match self {
            ConstValue::None => false,
            ConstValue::Integer(v) => v != 0,
            ConstValue::Float(v) => v != 0.0,
        }
    }
}

/// Destination class of a cast inside a constant expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    Bool,
    Integer { size: u64, unsigned: bool },
    Float,
    Void,
}

/// What the evaluator asks its environment for.
pub trait ConstContext {
    /// Value of an enumeration constant in scope
    fn enum_constant(&self, name: Symbol) -> Option<i64>;

    /// `(size, alignment)` of the type named by a `TypeName` node
    fn type_layout(&mut self, type_name: NodeRef) -> Result<(u64, u32)>;

    /// `sizeof expr`
    fn expression_size(&mut self, expr: NodeRef) -> Result<u64>;

    fn cast_target(&mut self, type_name: NodeRef) -> Result<CastTarget>;

    /// Every integer is evaluated as `intmax_t`/`uintmax_t` (C11 6.10.1p4).
    fn intmax_arithmetic(&self) -> bool {
        false
    }
}

/// Context without declarations, used for `#if` conditions.
#[derive(Debug, Default)]
pub struct PreprocessorContext;

impl ConstContext for PreprocessorContext {
    fn enum_constant(&self, _name: Symbol) -> Option<i64> {
        None
    }

    fn type_layout(&mut self, _type_name: NodeRef) -> Result<(u64, u32)> {
        Err(Error::malformed(None, "type operand in preprocessor expression"))
    }

    fn expression_size(&mut self, _expr: NodeRef) -> Result<u64> {
        Err(Error::malformed(None, "sizeof in preprocessor expression"))
    }

    fn cast_target(&mut self, _type_name: NodeRef) -> Result<CastTarget> {
        Err(Error::malformed(None, "cast in preprocessor expression"))
    }

    fn intmax_arithmetic(&self) -> bool {
        true
    }
}

/// Width and signedness of an integer operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IntType {
    width: u32,
    unsigned: bool,
}

impl IntType {
    const INT: IntType = IntType::signed(32);
    const SIZE: IntType = IntType::unsigned(64);

    const fn signed(width: u32) -> Self {
        IntType { width, unsigned: false }
    }

    const fn unsigned(width: u32) -> Self {
        IntType { width, unsigned: true }
    }

    fn of_constant(ty: IntegerType) -> Self {
        match ty {
            IntegerType::Int => IntType::signed(32),
            IntegerType::UnsignedInt => IntType::unsigned(32),
            IntegerType::Long | IntegerType::LongLong => IntType::signed(64),
            IntegerType::UnsignedLong | IntegerType::UnsignedLongLong => IntType::unsigned(64),
        }
    }

    fn of_character(ty: CharType) -> Self {
        match ty {
            CharType::Char | CharType::WideChar => IntType::INT,
            CharType::Char16 => IntType::unsigned(16),
            CharType::Char32 => IntType::unsigned(32),
        }
    }

    /// Reduce `bits` modulo 2^width; signed results are kept sign-extended.
    fn wrap(self, bits: u64) -> u64 {
        if self.width >= 64 {
            return bits;
        }
        let shift = 64 - self.width;
        if self.unsigned {
            (bits << shift) >> shift
        } else {
            (((bits << shift) as i64) >> shift) as u64
        }
    }

    /// Integer promotion: everything narrower than `int` fits in `int`.
    fn promote(self) -> Self {
        if self.width < 32 {
            IntType::INT
        } else {
            self
        }
    }

    /// Usual arithmetic conversions over two promoted types.
    fn common(self, other: IntType) -> Self {
        let (a, b) = (self.promote(), other.promote());
        if a.unsigned == b.unsigned {
            return if a.width >= b.width { a } else { b };
        }
        let (unsigned, signed) = if a.unsigned { (a, b) } else { (b, a) };
        if unsigned.width >= signed.width {
            unsigned
        } else {
            // every value of the narrower unsigned type fits
            signed
        }
    }

    fn fits(self, value: f64) -> bool {
        let limit = 2f64.powi(self.width as i32 - i32::from(!self.unsigned));
        let low = if self.unsigned { 0.0 } else { -limit };
        value >= low && value < limit
    }
}

/// Intermediate value. Integers keep their C type so that unsigned arithmetic
/// wraps at the operand width.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Integer { bits: u64, ty: IntType },
    Float(f64),
}

impl Value {
    fn integer(bits: u64, ty: IntType) -> Value {
        Value::Integer { bits: ty.wrap(bits), ty }
    }

    fn is_zero(self) -> bool {
        match self {
            Value::Integer { bits, .. } => bits == 0,
            Value::Float(v) => v == 0.0,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Value::Integer { bits, ty } if ty.unsigned => bits as f64,
            Value::Integer { bits, .. } => bits as i64 as f64,
            Value::Float(v) => v,
        }
    }

    fn boolean(value: bool) -> Value {
        Value::integer(u64::from(value), IntType::INT)
    }
}

impl From<Value> for ConstValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Integer { bits, .. } => ConstValue::Integer(bits as i64),
            Value::Float(v) => ConstValue::Float(v),
        }
    }
}

/// Evaluate `expr` as an arithmetic constant expression.
pub fn evaluate(ast: &Ast, expr: NodeRef, ctx: &mut dyn ConstContext) -> Result<ConstValue> {
    let intmax = ctx.intmax_arithmetic();
    Evaluator { ast, ctx, intmax }.eval(expr).map(ConstValue::from)
}

/// Evaluate `expr` as an integer constant expression.
pub fn evaluate_integer(ast: &Ast, expr: NodeRef, ctx: &mut dyn ConstContext) -> Result<i64> {
    match evaluate(ast, expr, ctx)? {
        ConstValue::Integer(v) => Ok(v),
        _ => Err(Error::malformed(
            ast.get_location(expr),
            "expected an integer constant expression",
        )),
    }
}

struct Evaluator<'a, 'c> {
    ast: &'a Ast,
    ctx: &'c mut dyn ConstContext,
    intmax: bool,
}

impl Evaluator<'_, '_> {
    fn located(&self, node: NodeRef, error: Error) -> Error {
        if error.location.is_some() {
            error
        } else {
            Error {
                location: Some(self.ast.get_location(node)),
                ..error
            }
        }
    }

    fn not_constant(&self, node: NodeRef) -> Error {
        Error::malformed(self.ast.get_location(node), "expression is not a constant expression")
    }

    /// Integer of type `ty`, widened to `intmax_t`/`uintmax_t` in `#if`.
    fn integer(&self, bits: u64, ty: IntType) -> Value {
        if self.intmax {
            Value::integer(ty.wrap(bits), IntType { width: 64, ..ty })
        } else {
            Value::integer(bits, ty)
        }
    }

    fn eval(&mut self, node: NodeRef) -> Result<Value> {
        let location = self.ast.get_location(node);
        let value = match self.ast.get_kind(node) {
            NodeKind::Constant(constant) => match *constant {
                Constant::Integer { value, ty } => self.integer(value, IntType::of_constant(ty)),
                Constant::Character { value, ty } => self.integer(value as u64, IntType::of_character(ty)),
                Constant::Floating { value, .. } => Value::Float(value),
            },
            NodeKind::Identifier(name) => match self.ctx.enum_constant(*name) {
                Some(v) if i32::try_from(v).is_ok() => self.integer(v as u64, IntType::INT),
                Some(v) => self.integer(v as u64, IntType::signed(64)),
                None => return Err(Error::malformed(location, format!("'{}' is not a constant", name))),
            },
            NodeKind::Unary(op, operand) => {
                let (op, operand) = (*op, *operand);
                self.eval_unary(node, op, operand)?
            }
            NodeKind::Binary(op, left, right) => {
                let (op, left, right) = (*op, *left, *right);
                self.eval_binary(op, left, right, location)?
            }
            NodeKind::Conditional(condition, then_expr, else_expr) => {
                let (condition, then_expr, else_expr) = (*condition, *then_expr, *else_expr);
                let (taken, other) = if self.eval(condition)?.is_zero() {
                    (else_expr, then_expr)
                } else {
                    (then_expr, else_expr)
                };
                let value = self.eval(taken)?;
                // the arm not taken still contributes its type
                match (value, self.eval(other)) {
                    (Value::Integer { bits, ty }, Ok(Value::Integer { ty: other_ty, .. })) => {
                        Value::integer(bits, ty.common(other_ty))
                    }
                    (Value::Integer { .. }, Ok(Value::Float(_))) => Value::Float(value.as_f64()),
                    _ => value,
                }
            }
            NodeKind::SizeOfType(type_name) => {
                let type_name = *type_name;
                let (size, _) = self.ctx.type_layout(type_name).map_err(|e| self.located(node, e))?;
                self.integer(size, IntType::SIZE)
            }
            NodeKind::AlignOf(type_name) => {
                let type_name = *type_name;
                let (_, alignment) = self.ctx.type_layout(type_name).map_err(|e| self.located(node, e))?;
                self.integer(u64::from(alignment), IntType::SIZE)
            }
            NodeKind::SizeOfExpr(expr) => {
                let expr = *expr;
                let size = self.ctx.expression_size(expr).map_err(|e| self.located(node, e))?;
                self.integer(size, IntType::SIZE)
            }
            NodeKind::Cast(type_name, expr) => {
                let (type_name, expr) = (*type_name, *expr);
                let target = self.ctx.cast_target(type_name).map_err(|e| self.located(node, e))?;
                let value = self.eval(expr)?;
                match cast(value, target, location)? {
                    Some(value) => value,
                    None => return Err(self.not_constant(node)),
                }
            }
            _ => return Err(self.not_constant(node)),
        };
        trace!("const_eval {:?} -> {:?}", node, value);
        Ok(value)
    }

    fn eval_unary(&mut self, node: NodeRef, op: UnaryOp, operand: NodeRef) -> Result<Value> {
        let value = self.eval(operand)?;
        Ok(match (op, value) {
            (UnaryOp::Plus, Value::Integer { bits, ty }) => Value::integer(bits, ty.promote()),
            (UnaryOp::Plus, v) => v,
            (UnaryOp::Minus, Value::Integer { bits, ty }) => Value::integer(bits.wrapping_neg(), ty.promote()),
            (UnaryOp::Minus, Value::Float(v)) => Value::Float(-v),
            (UnaryOp::BitNot, Value::Integer { bits, ty }) => Value::integer(!bits, ty.promote()),
            (UnaryOp::BitNot, Value::Float(_)) => {
                return Err(Error::malformed(
                    self.ast.get_location(node),
                    "operand of '~' must have integer type",
                ))
            }
            (UnaryOp::LogicNot, v) => Value::boolean(v.is_zero()),
            _ => return Err(self.not_constant(node)),
        })
    }

    fn eval_binary(&mut self, op: BinaryOp, left: NodeRef, right: NodeRef, location: SourceLocation) -> Result<Value> {
        let lhs = self.eval(left)?;

        // Short-circuiting logic
        match op {
            BinaryOp::LogicAnd => {
                if lhs.is_zero() {
                    return Ok(Value::boolean(false));
                }
                return Ok(Value::boolean(!self.eval(right)?.is_zero()));
            }
            BinaryOp::LogicOr => {
                if !lhs.is_zero() {
                    return Ok(Value::boolean(true));
                }
                return Ok(Value::boolean(!self.eval(right)?.is_zero()));
            }
            BinaryOp::Comma => {
                return Err(Error::malformed(location, "comma operator in constant expression"));
            }
            _ => {}
        }

        let rhs = self.eval(right)?;
        let (
            Value::Integer { bits: a, ty: left_ty },
            Value::Integer { bits: b, ty: right_ty },
        ) = (lhs, rhs)
        else {
            return float_binary(op, lhs.as_f64(), rhs.as_f64(), location);
        };

        if matches!(op, BinaryOp::LShift | BinaryOp::RShift) {
            return shift(op, a, left_ty.promote(), rhs, location);
        }

        // both operands are already sign-extended or zero-extended values of their
        // own type, so conversion to the common type is a re-wrap
        let ty = left_ty.common(right_ty);
        let (a, b) = (ty.wrap(a), ty.wrap(b));
        let divide_by_zero = || Error::malformed(location, "division by zero in constant expression");
        let bits = if ty.unsigned {
            match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div | BinaryOp::Mod if b == 0 => return Err(divide_by_zero()),
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                _ => return comparison(op, a.cmp(&b), location),
            }
        } else {
            let (a, b) = (a as i64, b as i64);
            let value = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div | BinaryOp::Mod if b == 0 => return Err(divide_by_zero()),
                BinaryOp::Div => a.wrapping_div(b),
                BinaryOp::Mod => a.wrapping_rem(b),
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                _ => return comparison(op, a.cmp(&b), location),
            };
            value as u64
        };
        Ok(Value::integer(bits, ty))
    }
}

fn comparison(op: BinaryOp, ordering: std::cmp::Ordering, location: SourceLocation) -> Result<Value> {
    use std::cmp::Ordering::*;
    let result = match op {
        BinaryOp::Equal => ordering == Equal,
        BinaryOp::NotEqual => ordering != Equal,
        BinaryOp::Less => ordering == Less,
        BinaryOp::LessEqual => ordering != Greater,
        BinaryOp::Greater => ordering == Greater,
        BinaryOp::GreaterEqual => ordering != Less,
        _ => return Err(Error::malformed(location, "expression is not a constant expression")),
    };
    Ok(Value::boolean(result))
}

/// The result has the promoted type of the left operand.
fn shift(op: BinaryOp, bits: u64, ty: IntType, count: Value, location: SourceLocation) -> Result<Value> {
    let amount = match count {
        Value::Integer { bits: n, ty: count_ty } if (count_ty.unsigned || n as i64 >= 0) && n < u64::from(ty.width) => n as u32,
        _ => return Err(Error::malformed(location, "shift count out of range in constant expression")),
    };
    let bits = ty.wrap(bits);
    Ok(match op {
        BinaryOp::LShift => Value::integer(bits << amount, ty),
        _ if ty.unsigned => Value::integer(bits >> amount, ty),
        _ => Value::integer(((bits as i64) >> amount) as u64, ty),
    })
}

fn float_binary(op: BinaryOp, a: f64, b: f64, location: SourceLocation) -> Result<Value> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Equal => return Ok(Value::boolean(a == b)),
        BinaryOp::NotEqual => return Ok(Value::boolean(a != b)),
        BinaryOp::Less => return Ok(Value::boolean(a < b)),
        BinaryOp::LessEqual => return Ok(Value::boolean(a <= b)),
        BinaryOp::Greater => return Ok(Value::boolean(a > b)),
        BinaryOp::GreaterEqual => return Ok(Value::boolean(a >= b)),
        _ => {
            return Err(Error::malformed(
                location,
                "invalid operands of floating type in constant expression",
            ))
        }
    };
    Ok(Value::Float(value))
}

/// `None` when the cast does not produce an arithmetic constant.
fn cast(value: Value, target: CastTarget, location: SourceLocation) -> Result<Option<Value>> {
    Ok(Some(match target {
        CastTarget::Bool => Value::integer(u64::from(!value.is_zero()), IntType::unsigned(8)),
        CastTarget::Float => Value::Float(value.as_f64()),
        CastTarget::Void => return Ok(None),
        CastTarget::Integer { size, unsigned } => {
            let ty = IntType {
                width: (size * 8).clamp(8, 64) as u32,
                unsigned,
            };
            match value {
                Value::Integer { bits, .. } => Value::integer(bits, ty),
                Value::Float(v) => {
                    let truncated = v.trunc();
                    if !ty.fits(truncated) {
                        return Err(Error::malformed(
                            location,
                            format!("floating constant {} is out of range of the integer type", v),
                        ));
                    }
                    if ty.unsigned {
                        Value::integer(truncated as u64, ty)
                    } else {
                        Value::integer(truncated as i64 as u64, ty)
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{convert_preprocessed, Lexer, LexerMode};
    use crate::parser::parse_constant_expression;

    fn eval(text: &str) -> Result<ConstValue> {
        let tokens = Lexer::new(text, Symbol::new("<test>"), LexerMode::Preprocessor)
            .tokenize()
            .and_then(convert_preprocessed)?;
        let mut ast = Ast::new();
        let expr = parse_constant_expression(&tokens, &mut ast)?;
        evaluate(&ast, expr, &mut PreprocessorContext)
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), ConstValue::Integer(7));
        assert_eq!(eval("(1 << 4) | 3").unwrap(), ConstValue::Integer(19));
        assert_eq!(eval("-7 / 2").unwrap(), ConstValue::Integer(-3));
        assert_eq!(eval("1 ? 10 : 20").unwrap(), ConstValue::Integer(10));
        assert_eq!(eval("!0 && 3 > 2").unwrap(), ConstValue::Integer(1));
    }

    #[test]
    fn test_unsigned_comparison() {
        assert_eq!(eval("-1 < 0u").unwrap(), ConstValue::Integer(0));
        assert_eq!(eval("-1 < 0").unwrap(), ConstValue::Integer(1));
    }

    #[test]
    fn test_short_circuit_skips_division() {
        assert_eq!(eval("0 && 1 / 0").unwrap(), ConstValue::Integer(0));
        assert!(eval("1 / 0").is_err());
    }

    #[test]
    fn test_float_result() {
        assert_eq!(eval("1.5 * 2").unwrap(), ConstValue::Float(3.0));
        assert!(eval("1.5 % 2").is_err());
    }

    #[test]
    fn test_cast_truncation() {
        let here = SourceLocation::builtin();
        let int = |v: i64| Value::integer(v as u64, IntType::INT);
        assert_eq!(
            cast(int(300), CastTarget::Integer { size: 1, unsigned: true }, here).unwrap(),
            Some(Value::integer(44, IntType::unsigned(8)))
        );
        assert_eq!(
            cast(int(255), CastTarget::Integer { size: 1, unsigned: false }, here).unwrap(),
            Some(Value::integer(u64::MAX, IntType::signed(8)))
        );
        assert_eq!(
            cast(Value::Float(-2.75), CastTarget::Integer { size: 4, unsigned: false }, here).unwrap(),
            Some(int(-2))
        );
    }

    #[test]
    fn test_out_of_range_float_cast_is_rejected() {
        let here = SourceLocation::builtin();
        let err = cast(Value::Float(1e20), CastTarget::Integer { size: 4, unsigned: false }, here).unwrap_err();
        insta::assert_snapshot!(err.message, @"floating constant 100000000000000000000 is out of range of the integer type");
        assert!(cast(Value::Float(-1.0), CastTarget::Integer { size: 8, unsigned: true }, here).is_err());
        assert!(cast(Value::Float(4294967295.0), CastTarget::Integer { size: 4, unsigned: true }, here).is_ok());
    }

    #[test]
    fn test_preprocessor_arithmetic_is_intmax() {
        assert_eq!(eval("0u - 1").unwrap(), ConstValue::Integer(-1));
        assert_eq!(eval("(0u - 1) >> 31").unwrap(), ConstValue::Integer(0x1_ffff_ffff));
        assert_eq!(eval("2147483647 + 1").unwrap(), ConstValue::Integer(2147483648));
        assert_eq!(eval("1 << 40").unwrap(), ConstValue::Integer(1 << 40));
    }

    /// Context with C's own integer widths and no declarations.
    struct TypedContext;

    impl ConstContext for TypedContext {
        fn enum_constant(&self, _name: Symbol) -> Option<i64> {
            None
        }

        fn type_layout(&mut self, _type_name: NodeRef) -> Result<(u64, u32)> {
            Err(Error::malformed(None, "no types"))
        }

        fn expression_size(&mut self, _expr: NodeRef) -> Result<u64> {
            Err(Error::malformed(None, "no types"))
        }

        fn cast_target(&mut self, _type_name: NodeRef) -> Result<CastTarget> {
            Err(Error::malformed(None, "no types"))
        }
    }

    fn eval_typed(text: &str) -> Result<ConstValue> {
        let tokens = Lexer::new(text, Symbol::new("<test>"), LexerMode::Preprocessor)
            .tokenize()
            .and_then(convert_preprocessed)?;
        let mut ast = Ast::new();
        let expr = parse_constant_expression(&tokens, &mut ast)?;
        evaluate(&ast, expr, &mut TypedContext)
    }

    #[test]
    fn test_unsigned_int_wraps_at_32_bits() {
        assert_eq!(eval_typed("0u - 1").unwrap(), ConstValue::Integer(4294967295));
        assert_eq!(eval_typed("(0u - 1) >> 31").unwrap(), ConstValue::Integer(1));
        assert_eq!(eval_typed("0u - 1 == 4294967295u").unwrap(), ConstValue::Integer(1));
        assert_eq!(eval_typed("-1 < 0u").unwrap(), ConstValue::Integer(0));
        assert_eq!(eval_typed("-1 < 0ul").unwrap(), ConstValue::Integer(0));
        assert_eq!(eval_typed("-1l < 0u").unwrap(), ConstValue::Integer(1));
        assert_eq!(eval_typed("0ul - 1").unwrap(), ConstValue::Integer(-1));
        assert_eq!(eval_typed("~0u").unwrap(), ConstValue::Integer(4294967295));
        assert_eq!(eval_typed("1 ? 1 : 0u - 1").unwrap(), ConstValue::Integer(1));
        assert_eq!(eval_typed("1 ? -1 : 0u").unwrap(), ConstValue::Integer(4294967295));
        assert!(eval_typed("1 << 32").is_err());
        assert_eq!(eval_typed("1l << 32").unwrap(), ConstValue::Integer(1 << 32));
    }
}
