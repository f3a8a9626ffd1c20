use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Range;

use super::value::Value;
use crate::error::DecodeError;

/// Maximum nesting of lists and dictionaries
pub const MAX_DEPTH: usize = 64;

type Result<T> = std::result::Result<T, DecodeError>;

/// Decode exactly one value spanning the whole buffer.
pub fn decode(data: &[u8]) -> Result<Value> {
    let (value, used) = decode_prefix(data)?;
    if used != data.len() {
        return Err(DecodeError::TrailingData(data.len() - used));
    }
    Ok(value)
}

/// Decode one value from the front of `data`.
///
/// Returns the value and the number of bytes it occupied.
pub fn decode_prefix(data: &[u8]) -> Result<(Value, usize)> {
    let mut decoder = Decoder { data, pos: 0 };
    let value = decoder.value(0)?;
    Ok((value, decoder.pos))
}

/// Validate `data` as one complete value and return the raw byte range of the
/// value reached by following the dictionary keys in `path`.
///
/// `Ok(None)` means a key is missing or an intermediate value is not a
/// dictionary. An empty path yields the range of the whole value.
///
/// ```
/// use piecework::bencode::locate;
///
/// let data = b"d4:infod6:pieces3:abcee";
/// let range = locate(data, &[b"info".as_slice(), b"pieces"]).unwrap().unwrap();
/// assert_eq!(&data[range], b"3:abc");
/// ```
pub fn locate(data: &[u8], path: &[&[u8]]) -> Result<Option<Range<usize>>> {
    let mut decoder = Decoder { data, pos: 0 };
    let found = decoder.locate(path, 0)?;
    if decoder.pos != data.len() {
        return Err(DecodeError::TrailingData(data.len() - decoder.pos));
    }
    Ok(found)
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof(self.pos))
    }

    fn unexpected(&self, byte: u8) -> DecodeError {
        if byte == b'-' {
            DecodeError::InvalidLength {
                at: self.pos,
                reason: "negative length",
            }
        } else {
            DecodeError::UnexpectedByte { byte, at: self.pos }
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep(MAX_DEPTH));
        }
        match self.peek()? {
            b'i' => self.integer().map(Value::Integer),
            b'0'..=b'9' => self.bytes().map(|b| Value::Bytes(b.to_vec())),
            b'l' => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(items))
            }
            b'd' => {
                let mut map = BTreeMap::new();
                self.entries(|dec, key| {
                    let value = dec.value(depth + 1)?;
                    map.insert(key.to_vec(), value);
                    Ok(())
                })?;
                Ok(Value::Dict(map))
            }
            byte => Err(self.unexpected(byte)),
        }
    }

    /// Validate the next value without building it
    fn skip(&mut self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep(MAX_DEPTH));
        }
        match self.peek()? {
            b'i' => self.integer().map(drop),
            b'0'..=b'9' => self.bytes().map(drop),
            b'l' => {
                self.pos += 1;
                while self.peek()? != b'e' {
                    self.skip(depth + 1)?;
                }
                self.pos += 1;
                Ok(())
            }
            b'd' => self.entries(|dec, _| dec.skip(depth + 1)),
            byte => Err(self.unexpected(byte)),
        }
    }

    fn locate(&mut self, path: &[&[u8]], depth: usize) -> Result<Option<Range<usize>>> {
        let Some((first, rest)) = path.split_first() else {
            let start = self.pos;
            self.skip(depth)?;
            return Ok(Some(start..self.pos));
        };
        if self.peek()? != b'd' {
            self.skip(depth)?;
            return Ok(None);
        }
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep(MAX_DEPTH));
        }
        let mut found = None;
        self.entries(|dec, key| {
            if key == *first {
                found = dec.locate(rest, depth + 1)?;
                Ok(())
            } else {
                dec.skip(depth + 1)
            }
        })?;
        Ok(found)
    }

    /// Walk the entries of the dictionary at the cursor, checking that keys are
    /// byte strings in strictly ascending order. `on_entry` must consume the value.
    fn entries<F>(&mut self, mut on_entry: F) -> Result<()>
    where
        F: FnMut(&mut Self, &'a [u8]) -> Result<()>,
    {
        self.pos += 1;
        let mut prev: Option<&'a [u8]> = None;
        loop {
            match self.peek()? {
                b'e' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'0'..=b'9' => {}
                _ => return Err(DecodeError::NonStringKey(self.pos)),
            }
            let at = self.pos;
            let key = self.bytes()?;
            if let Some(prev) = prev {
                match prev.cmp(key) {
                    Ordering::Less => {}
                    Ordering::Equal => return Err(DecodeError::DuplicateKey(at)),
                    Ordering::Greater => return Err(DecodeError::UnsortedKey(at)),
                }
            }
            prev = Some(key);
            on_entry(self, key)?;
        }
    }

    /// Parse an integer: i<number>e
    fn integer(&mut self) -> Result<i64> {
        let at = self.pos;
        let data = self.data;
        let start = at + 1;
        let end = data[start..]
            .iter()
            .position(|&b| b == b'e')
            .map(|i| start + i)
            .ok_or(DecodeError::UnexpectedEof(data.len()))?;
        let digits = &data[start..end];

        let body = match digits.split_first() {
            Some((b'-', rest)) => rest,
            _ => digits,
        };
        let invalid = |reason: &'static str| DecodeError::InvalidInteger { at, reason };
        if body.is_empty() {
            return Err(invalid("no digits"));
        }
        if !body.iter().all(u8::is_ascii_digit) {
            return Err(invalid("non-digit character"));
        }
        if body[0] == b'0' && body.len() > 1 {
            return Err(invalid("leading zero"));
        }
        if body == b"0" && digits.len() > 1 {
            return Err(invalid("negative zero"));
        }

        let value = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(invalid("out of range"))?;
        self.pos = end + 1;
        Ok(value)
    }

    /// Parse a byte string: <length>:<data>
    fn bytes(&mut self) -> Result<&'a [u8]> {
        let at = self.pos;
        let data = self.data;
        let colon = data[at..]
            .iter()
            .position(|&b| b == b':')
            .map(|i| at + i)
            .ok_or(DecodeError::UnexpectedEof(data.len()))?;
        let digits = &data[at..colon];

        let invalid = |reason: &'static str| DecodeError::InvalidLength { at, reason };
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid("non-digit character"));
        }
        if digits[0] == b'0' && digits.len() > 1 {
            return Err(invalid("leading zero"));
        }
        let len = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(invalid("length too large"))?;

        let start = colon + 1;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= data.len())
            .ok_or(invalid("length overruns input"))?;
        self.pos = end;
        Ok(&data[start..end])
    }
}
