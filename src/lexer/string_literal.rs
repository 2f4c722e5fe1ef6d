//! String literals, character constants and escape sequences.

use symbol_table::GlobalSymbol as Symbol;

use super::cursor::SourceCursor;
use super::token::{CharType, Constant, StringEncoding, StringLiteral, StringValue};
use crate::error::{Error, Result};

/// One decoded element of a quoted sequence.
///
/// Code points still need encoding; raw units from octal/hex escapes are stored as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharUnit {
    CodePoint(char),
    Raw(u32),
}

/// Reads until the closing `quote`; the cursor sits right after the opening one.
pub(crate) fn scan_quoted(cursor: &mut SourceCursor, quote: char) -> Result<Vec<CharUnit>> {
    let mut units = Vec::new();
    loop {
        match cursor.current() {
            None | Some('\n') => {
                return Err(Error::malformed(
                    cursor.location(),
                    format!("missing terminating {} character", quote),
                ))
            }
            Some(c) if c == quote => {
                cursor.advance(1);
                return Ok(units);
            }
            Some('\\') => {
                cursor.advance(1);
                units.push(decode_escape(cursor)?);
            }
            Some(c) => {
                cursor.advance(1);
                units.push(CharUnit::CodePoint(c));
            }
        }
    }
}

fn decode_escape(cursor: &mut SourceCursor) -> Result<CharUnit> {
    let location = cursor.location();
    let Some(ch) = cursor.current() else {
        return Err(Error::malformed(location, "incomplete escape sequence"));
    };
    cursor.advance(1);
    let simple = match ch {
        '\'' | '"' | '?' | '\\' => Some(ch),
        'a' => Some('\u{7}'),
        'b' => Some('\u{8}'),
        'f' => Some('\u{c}'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\u{b}'),
        _ => None,
    };
    if let Some(c) = simple {
        return Ok(CharUnit::CodePoint(c));
    }

    match ch {
        '0'..='7' => {
            let mut value = ch.to_digit(8).unwrap_or(0);
            for _ in 0..2 {
                match cursor.current().and_then(|c| c.to_digit(8)) {
                    Some(d) => {
                        value = value * 8 + d;
                        cursor.advance(1);
                    }
                    None => break,
                }
            }
            Ok(CharUnit::Raw(value))
        }
        'x' => {
            let mut value: u64 = 0;
            let mut digits = 0;
            while let Some(d) = cursor.current().and_then(|c| c.to_digit(16)) {
                value = value * 16 + d as u64;
                if value > u32::MAX as u64 {
                    return Err(Error::malformed(location, "hex escape sequence out of range"));
                }
                digits += 1;
                cursor.advance(1);
            }
            if digits == 0 {
                return Err(Error::malformed(location, "\\x used with no following hex digits"));
            }
            Ok(CharUnit::Raw(value as u32))
        }
        'u' | 'U' => {
            let count = if ch == 'u' { 4 } else { 8 };
            let c = universal_character(cursor, count, location)?;
            Ok(CharUnit::CodePoint(c))
        }
        other => Err(Error::malformed(location, format!("unknown escape sequence '\\{}'", other))),
    }
}

/// Decodes the hex digits of a `\u`/`\U` universal character name.
pub(crate) fn universal_character(
    cursor: &mut SourceCursor,
    count: usize,
    location: crate::source::SourceLocation,
) -> Result<char> {
    let mut value = 0u32;
    for _ in 0..count {
        match cursor.current().and_then(|c| c.to_digit(16)) {
            Some(d) => {
                value = value * 16 + d;
                cursor.advance(1);
            }
            None => return Err(Error::malformed(location, "incomplete universal character name")),
        }
    }
    char::from_u32(value)
        .ok_or_else(|| Error::malformed(location, format!("invalid universal character \\U{:08X}", value)))
}

/// Growable literal buffer able to switch from narrow to wide encodings midway.
#[derive(Debug, Clone)]
pub struct StringBuffer {
    value: StringValue,
}

impl StringBuffer {
    pub fn new(encoding: StringEncoding) -> Self {
        let value = match encoding {
            StringEncoding::Multibyte => StringValue::Multibyte(Vec::new()),
            StringEncoding::Utf8 => StringValue::Utf8(Vec::new()),
            StringEncoding::Utf16 => StringValue::Utf16(Vec::new()),
            StringEncoding::Utf32 => StringValue::Utf32(Vec::new()),
            StringEncoding::Wide => StringValue::Wide(Vec::new()),
        };
        StringBuffer { value }
    }

    pub fn encoding(&self) -> StringEncoding {
        self.value.encoding()
    }

    pub fn push(&mut self, unit: CharUnit) -> Result<()> {
        match (&mut self.value, unit) {
            (StringValue::Multibyte(v) | StringValue::Utf8(v), CharUnit::CodePoint(c)) => {
                let mut buf = [0u8; 4];
                v.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            (StringValue::Multibyte(v) | StringValue::Utf8(v), CharUnit::Raw(r)) => {
                let byte = u8::try_from(r).map_err(|_| Error::malformed(None, "escape sequence out of range"))?;
                v.push(byte);
            }
            (StringValue::Utf16(v), CharUnit::CodePoint(c)) => {
                let mut buf = [0u16; 2];
                v.extend_from_slice(c.encode_utf16(&mut buf));
            }
            (StringValue::Utf16(v), CharUnit::Raw(r)) => {
                let unit = u16::try_from(r).map_err(|_| Error::malformed(None, "escape sequence out of range"))?;
                v.push(unit);
            }
            (StringValue::Utf32(v) | StringValue::Wide(v), CharUnit::CodePoint(c)) => v.push(c as u32),
            (StringValue::Utf32(v) | StringValue::Wide(v), CharUnit::Raw(r)) => v.push(r),
        }
        Ok(())
    }

    /// Re-encodes the buffered contents. Only narrow-to-wider conversions exist.
    pub fn convert(&mut self, target: StringEncoding) -> Result<()> {
        let current = self.encoding();
        if current == target {
            return Ok(());
        }
        let bytes = match &self.value {
            StringValue::Multibyte(v) | StringValue::Utf8(v) => v.clone(),
            _ => {
                return Err(Error::malformed(
                    None,
                    format!(
                        "cannot convert {}\"\" literal to {}\"\"",
                        current.prefix(),
                        target.prefix()
                    ),
                ))
            }
        };
        let units: Vec<CharUnit> = match std::str::from_utf8(&bytes) {
            Ok(text) => text.chars().map(CharUnit::CodePoint).collect(),
            Err(_) => bytes.iter().map(|b| CharUnit::Raw(*b as u32)).collect(),
        };
        let mut converted = StringBuffer::new(target);
        for unit in units {
            converted.push(unit)?;
        }
        *self = converted;
        Ok(())
    }

    /// Appends an adjacent literal, widening the buffer when the other side is wider.
    pub fn append(&mut self, other: &StringValue) -> Result<()> {
        let mine = self.encoding();
        let theirs = other.encoding();
        let target = match (mine, theirs) {
            (a, b) if a == b => a,
            (StringEncoding::Multibyte, b) => b,
            (a, StringEncoding::Multibyte) => a,
            (StringEncoding::Utf8, b) => b,
            (a, StringEncoding::Utf8) => a,
            (a, b) => {
                return Err(Error::malformed(
                    None,
                    format!(
                        "unsupported concatenation of {}\"\" and {}\"\" literals",
                        a.prefix(),
                        b.prefix()
                    ),
                ))
            }
        };
        self.convert(target)?;
        let mut other = StringBuffer { value: other.clone() };
        other.convert(target)?;
        match (&mut self.value, other.value) {
            (StringValue::Multibyte(a), StringValue::Multibyte(b))
            | (StringValue::Utf8(a), StringValue::Utf8(b)) => a.extend(b),
            (StringValue::Utf16(a), StringValue::Utf16(b)) => a.extend(b),
            (StringValue::Utf32(a), StringValue::Utf32(b)) | (StringValue::Wide(a), StringValue::Wide(b)) => {
                a.extend(b)
            }
            _ => return Err(Error::internal("string buffer encodings diverged after conversion")),
        }
        Ok(())
    }

    pub fn finish(self) -> StringValue {
        self.value
    }
}

const STRING_PREFIXES: [StringEncoding; 5] = [
    StringEncoding::Multibyte,
    StringEncoding::Utf8,
    StringEncoding::Utf16,
    StringEncoding::Utf32,
    StringEncoding::Wide,
];

/// Matches one string literal, trying each encoding prefix in turn.
pub fn match_string_literal(cursor: &mut SourceCursor) -> Result<StringLiteral> {
    for encoding in STRING_PREFIXES {
        match cursor.attempt(|c| match_prefixed_string(c, encoding)) {
            Err(e) if e.is_no_match() => continue,
            other => return other,
        }
    }
    Err(Error::no_match(cursor.location()))
}

fn match_prefixed_string(cursor: &mut SourceCursor, encoding: StringEncoding) -> Result<StringLiteral> {
    let start = cursor.position();
    let location = cursor.location();
    if !cursor.eat(encoding.prefix()) || !cursor.eat("\"") {
        return Err(Error::no_match(location));
    }
    let units = scan_quoted(cursor, '"')?;
    let mut buffer = StringBuffer::new(encoding);
    for unit in units {
        buffer.push(unit).map_err(|e| Error::malformed(location, e.message))?;
    }

    Ok(StringLiteral {
        spelling: Symbol::new(&cursor.slice(start, cursor.position())),
        value: buffer.finish(),
    })
}

const CHAR_PREFIXES: [(&str, CharType); 4] = [
    ("", CharType::Char),
    ("L", CharType::WideChar),
    ("u", CharType::Char16),
    ("U", CharType::Char32),
];

/// Matches a character constant, returning its value and spelling.
pub fn match_char_constant(cursor: &mut SourceCursor) -> Result<(Constant, Symbol)> {
    for (prefix, ty) in CHAR_PREFIXES {
        match cursor.attempt(|c| match_prefixed_char(c, prefix, ty)) {
            Err(e) if e.is_no_match() => continue,
            other => return other,
        }
    }
    Err(Error::no_match(cursor.location()))
}

fn match_prefixed_char(cursor: &mut SourceCursor, prefix: &str, ty: CharType) -> Result<(Constant, Symbol)> {
    let start = cursor.position();
    let location = cursor.location();
    if !cursor.eat(prefix) || !cursor.eat("'") {
        return Err(Error::no_match(location));
    }
    let units = scan_quoted(cursor, '\'')?;
    if units.is_empty() {
        return Err(Error::malformed(location, "empty character constant"));
    }

    let value = match ty {
        CharType::Char => {
            let mut buffer = StringBuffer::new(StringEncoding::Multibyte);
            for unit in &units {
                buffer.push(*unit).map_err(|e| Error::malformed(location, e.message))?;
            }
            let bytes = match buffer.finish() {
                StringValue::Multibyte(b) => b,
                _ => return Err(Error::internal("narrow buffer changed encoding")),
            };
            if bytes.len() == 1 {
                bytes[0] as i8 as i64
            } else {
                bytes.iter().fold(0i32, |acc, b| acc.wrapping_shl(8) | *b as i32) as i64
            }
        }
        CharType::WideChar => unit_value(units[units.len() - 1]) as i32 as i64,
        CharType::Char16 => {
            let v = unit_value(units[units.len() - 1]);
            if v > 0xFFFF {
                return Err(Error::malformed(location, "character too large for char16_t constant"));
            }
            v as i64
        }
        CharType::Char32 => unit_value(units[units.len() - 1]) as i64,
    };

    Ok((
        Constant::Character { value, ty },
        Symbol::new(&cursor.slice(start, cursor.position())),
    ))
}

fn unit_value(unit: CharUnit) -> u32 {
    match unit {
        CharUnit::CodePoint(c) => c as u32,
        CharUnit::Raw(r) => r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cursor(text: &str) -> SourceCursor {
        SourceCursor::new(text, Symbol::new("t.c"))
    }

    #[test]
    fn test_prefix_alternation() {
        let lit = match_string_literal(&mut cursor("u8\"a\\n\"")).unwrap();
        assert_eq!(lit.value, StringValue::Utf8(vec![b'a', b'\n']));
        assert_eq!(lit.spelling.as_str(), "u8\"a\\n\"");

        let lit = match_string_literal(&mut cursor("L\"\\x100\"")).unwrap();
        assert_eq!(lit.value, StringValue::Wide(vec![0x100]));

        let lit = match_string_literal(&mut cursor("u\"\\U0001F600\"")).unwrap();
        assert_eq!(lit.value, StringValue::Utf16(vec![0xD83D, 0xDE00]));

        let err = match_string_literal(&mut cursor("ident")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoMatch);
    }

    #[test]
    fn test_narrow_escape_out_of_range() {
        let err = match_string_literal(&mut cursor("\"\\x100\"")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedInput);
    }

    #[test]
    fn test_buffer_widens_midway() {
        let mut buffer = StringBuffer::new(StringEncoding::Multibyte);
        buffer.push(CharUnit::CodePoint('h')).unwrap();
        buffer.push(CharUnit::CodePoint('é')).unwrap();
        buffer.append(&StringValue::Wide(vec!['!' as u32])).unwrap();
        assert_eq!(buffer.finish(), StringValue::Wide(vec!['h' as u32, 'é' as u32, '!' as u32]));

        let mut wide = StringBuffer::new(StringEncoding::Utf16);
        let err = wide.append(&StringValue::Wide(vec![1])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedInput);
    }

    #[test]
    fn test_char_constants() {
        let (value, spelling) = match_char_constant(&mut cursor("'a'")).unwrap();
        assert_eq!(value, Constant::Character { value: 97, ty: CharType::Char });
        assert_eq!(spelling.as_str(), "'a'");

        let (value, _) = match_char_constant(&mut cursor("'\\377'")).unwrap();
        assert_eq!(value, Constant::Character { value: -1, ty: CharType::Char });

        let (value, _) = match_char_constant(&mut cursor("L'\\u00e9'")).unwrap();
        assert_eq!(value, Constant::Character { value: 0xe9, ty: CharType::WideChar });

        let err = match_char_constant(&mut cursor("''")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedInput);
    }
}
