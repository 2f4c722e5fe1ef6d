//! Numeric constants and preprocessing numbers.
//!
//! Constants are tried as hexadecimal floating, then decimal floating, then integer.

use symbol_table::GlobalSymbol as Symbol;

use super::cursor::SourceCursor;
use super::token::{Constant, FloatType, IntegerType};
use crate::error::{Error, Result};
use crate::source::SourceLocation;

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Matches a preprocessing number: `.`? digit (digit | ident-char | [eEpP] sign | .)*
pub fn match_pp_number(cursor: &mut SourceCursor) -> Result<Symbol> {
    let start = cursor.position();
    let first = cursor.current();
    let starts = match first {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => cursor.at(1).is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    };
    if !starts {
        return Err(Error::no_match(cursor.location()));
    }
    cursor.advance(1);
    while let Some(c) = cursor.current() {
        match c {
            'e' | 'E' | 'p' | 'P' if matches!(cursor.at(1), Some('+') | Some('-')) => cursor.advance(2),
            '.' => cursor.advance(1),
            c if is_identifier_char(c) => cursor.advance(1),
            _ => break,
        }
    }
    Ok(Symbol::new(&cursor.slice(start, cursor.position())))
}

/// Converts the spelling of a preprocessing number into a constant.
pub fn parse_pp_number(spelling: &str, location: SourceLocation) -> Result<Constant> {
    let mut cursor = SourceCursor::new(spelling, location.file);
    let constant = match match_constant(&mut cursor) {
        Ok((constant, _)) => constant,
        Err(e) if e.is_no_match() => {
            return Err(Error::malformed(location, format!("invalid numeric constant '{}'", spelling)))
        }
        Err(e) => return Err(Error::new(e.kind, Some(location), e.message)),
    };
    if !cursor.is_eof() {
        return Err(Error::malformed(location, format!("invalid numeric constant '{}'", spelling)));
    }
    Ok(constant)
}

/// Matches one numeric constant at the cursor.
pub fn match_constant(cursor: &mut SourceCursor) -> Result<(Constant, Symbol)> {
    let start = cursor.position();
    let location = cursor.location();

    let matchers: [fn(&mut SourceCursor) -> Result<Constant>; 3] = [match_hex_float, match_decimal_float, match_integer];
    let mut constant = Err(Error::no_match(location));
    for matcher in matchers {
        match cursor.attempt(matcher) {
            Err(e) if e.is_no_match() => continue,
            result => {
                constant = result;
                break;
            }
        }
    }
    let constant = constant?;

    if cursor.current().is_some_and(is_identifier_char) {
        return Err(Error::malformed(
            cursor.location(),
            format!("invalid suffix '{}' on numeric constant", suffix_text(cursor)),
        ));
    }
    Ok((constant, Symbol::new(&cursor.slice(start, cursor.position()))))
}

fn suffix_text(cursor: &SourceCursor) -> String {
    let mut text = String::new();
    let mut i = 0;
    while let Some(c) = cursor.at(i).filter(|c| is_identifier_char(*c)) {
        text.push(c);
        i += 1;
    }
    text
}

/// Digits on each side of an optional `.`.
struct Fraction {
    integer: String,
    fraction: String,
    has_dot: bool,
}

fn scan_fraction(cursor: &mut SourceCursor, radix: u32) -> Result<Fraction> {
    let mut integer = String::new();
    while let Some(c) = cursor.current().filter(|c| c.is_digit(radix)) {
        integer.push(c);
        cursor.advance(1);
    }
    let mut fraction = String::new();
    let mut has_dot = false;
    // a '.' only belongs to the number when some digit was or will be seen
    if cursor.current() == Some('.') && (!integer.is_empty() || cursor.at(1).is_some_and(|c| c.is_digit(radix))) {
        has_dot = true;
        cursor.advance(1);
        while let Some(c) = cursor.current().filter(|c| c.is_digit(radix)) {
            fraction.push(c);
            cursor.advance(1);
        }
    }
    if integer.is_empty() && fraction.is_empty() {
        return Err(Error::no_match(cursor.location()));
    }
    Ok(Fraction {
        integer,
        fraction,
        has_dot,
    })
}

/// Parses `marker sign? digits`. Missing digits are reported at the marker.
fn scan_exponent(cursor: &mut SourceCursor, markers: [char; 2]) -> Result<Option<i64>> {
    match cursor.current() {
        Some(c) if markers.contains(&c) => {}
        _ => return Ok(None),
    }
    let marker_location = cursor.location();
    cursor.advance(1);
    let negative = match cursor.current() {
        Some('+') => {
            cursor.advance(1);
            false
        }
        Some('-') => {
            cursor.advance(1);
            true
        }
        _ => false,
    };
    let mut digits = 0;
    let mut value: i64 = 0;
    while let Some(d) = cursor.current().and_then(|c| c.to_digit(10)) {
        value = value.saturating_mul(10).saturating_add(d as i64);
        digits += 1;
        cursor.advance(1);
    }
    if digits == 0 {
        return Err(Error::malformed(marker_location, "expected exponent digits"));
    }
    Ok(Some(if negative { -value } else { value }))
}

fn float_suffix(cursor: &mut SourceCursor) -> FloatType {
    match cursor.current() {
        Some('f') | Some('F') => {
            cursor.advance(1);
            FloatType::Float
        }
        Some('l') | Some('L') => {
            cursor.advance(1);
            FloatType::LongDouble
        }
        _ => FloatType::Double,
    }
}

fn match_hex_float(cursor: &mut SourceCursor) -> Result<Constant> {
    if !(cursor.eat("0x") || cursor.eat("0X")) {
        return Err(Error::no_match(cursor.location()));
    }
    let fraction = scan_fraction(cursor, 16)?;
    // the binary exponent is mandatory for hexadecimal floating constants
    let Some(exponent) = scan_exponent(cursor, ['p', 'P'])? else {
        return Err(Error::no_match(cursor.location()));
    };

    let mut mantissa = 0f64;
    for c in fraction.integer.chars().chain(fraction.fraction.chars()) {
        mantissa = mantissa * 16.0 + c.to_digit(16).unwrap_or(0) as f64;
    }
    let scale = exponent - 4 * fraction.fraction.len() as i64;
    let value = mantissa * 2f64.powi(scale.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
    let ty = float_suffix(cursor);
    Ok(Constant::Floating { value, ty })
}

fn match_decimal_float(cursor: &mut SourceCursor) -> Result<Constant> {
    let location = cursor.location();
    let fraction = scan_fraction(cursor, 10)?;
    let exponent = scan_exponent(cursor, ['e', 'E'])?;
    if !fraction.has_dot && exponent.is_none() {
        return Err(Error::no_match(location));
    }

    let mut text = format!(
        "{}.{}",
        if fraction.integer.is_empty() { "0" } else { &fraction.integer },
        if fraction.fraction.is_empty() { "0" } else { &fraction.fraction }
    );
    if let Some(e) = exponent {
        text.push_str(&format!("e{}", e));
    }
    let value: f64 = text
        .parse()
        .map_err(|_| Error::malformed(location, format!("invalid floating constant '{}'", text)))?;
    let ty = float_suffix(cursor);
    Ok(Constant::Floating { value, ty })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthSuffix {
    None,
    Long,
    LongLong,
}

fn integer_suffix(cursor: &mut SourceCursor) -> (bool, LengthSuffix) {
    let mut unsigned = false;
    let mut length = LengthSuffix::None;
    for _ in 0..2 {
        if !unsigned && (cursor.eat("u") || cursor.eat("U")) {
            unsigned = true;
        } else if length == LengthSuffix::None {
            if cursor.eat("ll") || cursor.eat("LL") {
                length = LengthSuffix::LongLong;
            } else if cursor.eat("l") || cursor.eat("L") {
                length = LengthSuffix::Long;
            }
        }
    }
    (unsigned, length)
}

fn match_integer(cursor: &mut SourceCursor) -> Result<Constant> {
    let location = cursor.location();
    let radix = if (cursor.at(0) == Some('0'))
        && matches!(cursor.at(1), Some('x') | Some('X'))
        && cursor.at(2).is_some_and(|c| c.is_ascii_hexdigit())
    {
        cursor.advance(2);
        16
    } else if cursor.current() == Some('0') {
        8
    } else if cursor.current().is_some_and(|c| c.is_ascii_digit()) {
        10
    } else {
        return Err(Error::no_match(location));
    };

    let mut value: u128 = 0;
    while let Some(c) = cursor.current().filter(|c| c.is_ascii_hexdigit()) {
        let Some(d) = c.to_digit(radix) else {
            if radix == 8 && c.is_ascii_digit() {
                return Err(Error::malformed(
                    cursor.location(),
                    format!("invalid digit '{}' in octal constant", c),
                ));
            }
            break;
        };
        value = value * radix as u128 + d as u128;
        if value > u64::MAX as u128 {
            return Err(Error::malformed(location, "integer constant is too large for its type"));
        }
        cursor.advance(1);
    }
    let value = value as u64;
    let (unsigned, length) = integer_suffix(cursor);
    let ty = integer_type(value, radix == 10, unsigned, length)
        .ok_or_else(|| Error::malformed(location, "integer constant is too large for its type"))?;
    Ok(Constant::Integer { value, ty })
}

/// First type of the C11 6.4.4.1 candidate list able to represent `value`.
fn integer_type(value: u64, decimal: bool, unsigned: bool, length: LengthSuffix) -> Option<IntegerType> {
    use IntegerType::*;
    let candidates: &[IntegerType] = match (unsigned, length, decimal) {
        (false, LengthSuffix::None, true) => &[Int, Long, LongLong],
        (false, LengthSuffix::None, false) => &[Int, UnsignedInt, Long, UnsignedLong, LongLong, UnsignedLongLong],
        (true, LengthSuffix::None, _) => &[UnsignedInt, UnsignedLong, UnsignedLongLong],
        (false, LengthSuffix::Long, true) => &[Long, LongLong],
        (false, LengthSuffix::Long, false) => &[Long, UnsignedLong, LongLong, UnsignedLongLong],
        (true, LengthSuffix::Long, _) => &[UnsignedLong, UnsignedLongLong],
        (false, LengthSuffix::LongLong, true) => &[LongLong],
        (false, LengthSuffix::LongLong, false) => &[LongLong, UnsignedLongLong],
        (true, LengthSuffix::LongLong, _) => &[UnsignedLongLong],
    };
    candidates.iter().copied().find(|ty| {
        let max = match ty {
            Int => i32::MAX as u64,
            UnsignedInt => u32::MAX as u64,
            Long | LongLong => i64::MAX as u64,
            UnsignedLong | UnsignedLongLong => u64::MAX,
        };
        value <= max
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn lex(text: &str) -> Result<Constant> {
        let mut cursor = SourceCursor::new(text, Symbol::new("t.c"));
        match_constant(&mut cursor).map(|(c, _)| c)
    }

    #[test]
    fn test_integer_typing() {
        assert_eq!(lex("42").unwrap(), Constant::Integer { value: 42, ty: IntegerType::Int });
        assert_eq!(
            lex("0xFFFFFFFF").unwrap(),
            Constant::Integer { value: 0xFFFF_FFFF, ty: IntegerType::UnsignedInt }
        );
        assert_eq!(
            lex("4294967295").unwrap(),
            Constant::Integer { value: 4294967295, ty: IntegerType::Long }
        );
        assert_eq!(lex("017ull").unwrap(), Constant::Integer { value: 15, ty: IntegerType::UnsignedLongLong });
        assert_eq!(lex("1Lu").unwrap(), Constant::Integer { value: 1, ty: IntegerType::UnsignedLong });
        assert_eq!(lex("09").unwrap_err().kind, ErrorKind::MalformedInput);
    }

    #[test]
    fn test_floating_forms() {
        assert_eq!(lex("1.5").unwrap(), Constant::Floating { value: 1.5, ty: FloatType::Double });
        assert_eq!(lex(".25f").unwrap(), Constant::Floating { value: 0.25, ty: FloatType::Float });
        assert_eq!(lex("2e3").unwrap(), Constant::Floating { value: 2000.0, ty: FloatType::Double });
        assert_eq!(lex("0x1.8p1").unwrap(), Constant::Floating { value: 3.0, ty: FloatType::Double });
        assert_eq!(lex("1.L").unwrap(), Constant::Floating { value: 1.0, ty: FloatType::LongDouble });
    }

    #[test]
    fn test_exponent_error_points_at_marker() {
        let err = lex("12.5e+x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedInput);
        assert_eq!(err.message, "expected exponent digits");
        assert_eq!(err.location.map(|l| l.column), Some(5));
    }

    #[test]
    fn test_pp_number_spelling() {
        let mut cursor = SourceCursor::new("1.2e+3abc.x+1", Symbol::new("t.c"));
        assert_eq!(match_pp_number(&mut cursor).unwrap().as_str(), "1.2e+3abc.x");
        assert_eq!(cursor.current(), Some('+'));
        let err = parse_pp_number("12abc", SourceLocation::builtin()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedInput);
    }
}
