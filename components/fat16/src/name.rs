//! 8.3 short names
//!
//! A short name is 11 bytes on disk: eight for the base, three for the
//! extension, both space padded and upper case. The dot between them is
//! implied.

use alloc::string::String;
use core::fmt;

use crate::error::{FatError, Result};

pub const BASE_LEN: usize = 8;
pub const EXT_LEN: usize = 3;
pub const NAME_LEN: usize = BASE_LEN + EXT_LEN;

/// Encoded 11-byte name
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortName(pub [u8; NAME_LEN]);

/// Bytes FAT accepts in a short name besides letters and digits
fn is_special(c: u8) -> bool {
    matches!(
        c,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'(' | b')' | b'-' | b'@' | b'^' | b'_' | b'`'
            | b'{' | b'}' | b'~'
    )
}

fn is_valid_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || is_special(c)
}

impl ShortName {
    /// The `.` record of a subdirectory
    pub const DOT: Self = Self(*b".          ");

    /// The `..` record of a subdirectory
    pub const DOT_DOT: Self = Self(*b"..         ");

    /// Encode `name`, folding to upper case
    ///
    /// # Errors
    /// `InvalidName` if the base is empty or longer than eight bytes, the
    /// extension is longer than three, or a byte is outside the 8.3 set.
    pub fn encode(name: &str) -> Result<Self> {
        match name {
            "." => return Ok(Self::DOT),
            ".." => return Ok(Self::DOT_DOT),
            _ => {}
        }

        let invalid = || FatError::InvalidName(String::from(name));
        let bytes = name.as_bytes();
        let (base, ext) = match bytes.iter().rposition(|&c| c == b'.') {
            Some(dot) => (&bytes[..dot], &bytes[dot + 1..]),
            None => (bytes, &[][..]),
        };

        if base.is_empty() || base.len() > BASE_LEN || ext.len() > EXT_LEN {
            return Err(invalid());
        }
        if !base.iter().chain(ext).all(|&c| is_valid_byte(c)) {
            return Err(invalid());
        }

        let mut out = [b' '; NAME_LEN];
        for (dst, &src) in out.iter_mut().zip(base) {
            *dst = src.to_ascii_uppercase();
        }
        for (dst, &src) in out[BASE_LEN..].iter_mut().zip(ext) {
            *dst = src.to_ascii_uppercase();
        }
        Ok(Self(out))
    }

    /// Decode to `BASE.EXT`, or `BASE` when there is no extension
    pub fn decode(&self) -> String {
        let base = trim_padding(&self.0[..BASE_LEN]);
        let ext = trim_padding(&self.0[BASE_LEN..]);

        let mut out = String::with_capacity(NAME_LEN + 1);
        out.extend(base.iter().map(|&c| c as char));
        if !ext.is_empty() {
            out.push('.');
            out.extend(ext.iter().map(|&c| c as char));
        }
        out
    }

    /// True for the `.` and `..` bookkeeping records
    pub fn is_dot(&self) -> bool {
        *self == Self::DOT || *self == Self::DOT_DOT
    }
}

fn trim_padding(field: &[u8]) -> &[u8] {
    let end = field
        .iter()
        .rposition(|&c| c != b' ')
        .map_or(0, |last| last + 1);
    &field[..end]
}

impl fmt::Debug for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortName({:?})", self.decode())
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decode())
    }
}
