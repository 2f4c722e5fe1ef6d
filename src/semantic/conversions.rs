//! Implements C11 semantic conversions, such as usual arithmetic conversions
//! and integer promotions.

use super::type_registry::TypeRegistry;
use super::types::{TypeKind, TypeRef};

fn scalar_size(ctx: &TypeRegistry, ty: TypeRef) -> u64 {
    ctx.kind(ty).scalar_layout().map(|(size, _)| size).unwrap_or(0)
}

/// Performs integer promotions as specified in C11 6.3.1.1.
///
/// Integer types ranked below `int` become `int` when it holds all their values, else
/// `unsigned int`. Other types come back unqualified.
pub fn integer_promotion(ctx: &TypeRegistry, ty: TypeRef) -> TypeRef {
    let base = ctx.arithmetic_base(ty);
    let Some(rank) = ctx.kind(base).rank() else {
        return ctx.unqualified(ty);
    };
    let int_rank = TypeKind::Int.rank().unwrap_or(4);
    if rank >= int_rank {
        return base;
    }
    let fits = !ctx.kind(base).is_unsigned_integer() || scalar_size(ctx, base) < scalar_size(ctx, ctx.type_int);
    if fits {
        ctx.type_int
    } else {
        ctx.type_unsigned_int
    }
}

/// Performs the "usual arithmetic conversions" as specified in C11 6.3.1.8.
///
/// Returns `None` when either operand is not arithmetic.
pub fn usual_arithmetic_conversions(ctx: &TypeRegistry, lhs: TypeRef, rhs: TypeRef) -> Option<TypeRef> {
    if !ctx.is_arithmetic(lhs) || !ctx.is_arithmetic(rhs) {
        return None;
    }

    // Floating point conversions: long double > double > float
    let (lk, rk) = (ctx.base_kind(lhs), ctx.base_kind(rhs));
    if lk.is_floating() || rk.is_floating() {
        let common = match (lk, rk) {
            (TypeKind::LongDouble, _) | (_, TypeKind::LongDouble) => ctx.type_long_double,
            (TypeKind::Double, _) | (_, TypeKind::Double) => ctx.type_double,
            _ => ctx.type_float,
        };
        return Some(common);
    }

    let lp = integer_promotion(ctx, lhs);
    let rp = integer_promotion(ctx, rhs);
    if lp == rp {
        return Some(lp);
    }

    let (lu, lr) = (ctx.is_unsigned(lp), ctx.rank(lp)?);
    let (ru, rr) = (ctx.is_unsigned(rp), ctx.rank(rp)?);

    // Same signedness: higher rank wins
    if lu == ru {
        return Some(if lr >= rr { lp } else { rp });
    }

    let (ut, ur, st, sr) = if lu { (lp, lr, rp, rr) } else { (rp, rr, lp, lr) };
    if ur >= sr {
        Some(ut)
    } else if scalar_size(ctx, st) > scalar_size(ctx, ut) {
        // the signed type represents every value of the unsigned one
        Some(st)
    } else {
        Some(ctx.unsigned_of(st))
    }
}

/// Performs default argument promotions as specified in C11 6.5.2.2.
pub fn default_argument_promotions(ctx: &TypeRegistry, ty: TypeRef) -> TypeRef {
    match ctx.base_kind(ty) {
        TypeKind::Float => ctx.type_double,
        _ => integer_promotion(ctx, ty),
    }
}

/// Lvalue, array-to-pointer and function-to-pointer conversions (C11 6.3.2.1).
///
/// Arrays decay to a pointer to their (qualified) element type, functions to a pointer
/// to the function; every other type loses its top-level qualifiers.
pub fn value_conversion(ctx: &mut TypeRegistry, ty: TypeRef) -> TypeRef {
    match ctx.kind(ty).clone() {
        TypeKind::Array { element, .. } => ctx.pointer_to(element),
        TypeKind::Function { .. } => ctx.pointer_to(ty),
        _ => ctx.unqualified(ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::types::{ArraySize, TypeQualifiers};

    fn integer_types(reg: &TypeRegistry) -> Vec<TypeRef> {
        vec![
            reg.type_bool,
            reg.type_char,
            reg.type_signed_char,
            reg.type_unsigned_char,
            reg.type_short,
            reg.type_unsigned_short,
            reg.type_int,
            reg.type_unsigned_int,
            reg.type_long,
            reg.type_unsigned_long,
            reg.type_long_long,
            reg.type_unsigned_long_long,
        ]
    }

    #[test]
    fn test_common_arithmetic_is_commutative_and_ranked() {
        let reg = TypeRegistry::new();
        let types = integer_types(&reg);
        for &a in &types {
            for &b in &types {
                let ab = usual_arithmetic_conversions(&reg, a, b).unwrap();
                let ba = usual_arithmetic_conversions(&reg, b, a).unwrap();
                assert!(reg.same(ab, ba), "{} vs {}", reg.display(a), reg.display(b));

                let promoted = reg
                    .rank(integer_promotion(&reg, a))
                    .max(reg.rank(integer_promotion(&reg, b)));
                assert!(reg.rank(ab) >= promoted);
            }
        }
    }

    #[test]
    fn test_signedness_ladder() {
        let reg = TypeRegistry::new();
        let c = |a, b| reg.display(usual_arithmetic_conversions(&reg, a, b).unwrap());
        assert_eq!(c(reg.type_int, reg.type_unsigned_int), "unsigned int");
        assert_eq!(c(reg.type_long, reg.type_unsigned_int), "long");
        assert_eq!(c(reg.type_long_long, reg.type_unsigned_long), "unsigned long long");
        assert_eq!(c(reg.type_short, reg.type_unsigned_char), "int");
        assert_eq!(c(reg.type_int, reg.type_float), "float");
        assert_eq!(c(reg.type_double, reg.type_float), "double");
    }

    #[test]
    fn test_promotion_and_decay() {
        let mut reg = TypeRegistry::new();
        assert_eq!(integer_promotion(&reg, reg.type_bool), reg.type_int);
        assert_eq!(integer_promotion(&reg, reg.type_unsigned_short), reg.type_int);
        assert_eq!(default_argument_promotions(&reg, reg.type_float), reg.type_double);

        let const_char = reg.qualified(reg.type_char, TypeQualifiers::CONST);
        let array = reg.array_of(const_char, ArraySize::Bounded(3));
        let decayed = value_conversion(&mut reg, array);
        assert_eq!(reg.display(decayed), "const char *");
        assert_eq!(value_conversion(&mut reg, const_char), reg.type_char);
    }
}
