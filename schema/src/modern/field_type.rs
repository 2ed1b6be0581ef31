//! Parsing of field type strings such as `CNetworkUtlVectorBase< CHandle< CBaseEntity > >`.

use std::fmt;

/// Named constants used as fixed array sizes.
const ITEM_COUNTS: [(&str, usize); 2] = [("MAX_ITEM_STOCKS", 8), ("MAX_ABILITY_DRAFT_ABILITIES", 48)];

/// Size assumed for an array bound that is neither a number nor a known constant.
pub const UNKNOWN_ARRAY_COUNT: usize = 1024;

/// A parsed field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub base: String,
    pub generic: Option<Box<FieldType>>,
    pub pointer: bool,
    /// Fixed element count, zero when not an array.
    pub count: usize,
}

fn array_count(bound: &str) -> usize {
    if let Some(&(_, n)) = ITEM_COUNTS.iter().find(|(name, _)| *name == bound) {
        return n;
    }
    match bound.parse::<i64>() {
        Ok(n) if n > 0 => usize::try_from(n).unwrap_or(UNKNOWN_ARRAY_COUNT),
        _ if !bound.is_empty() => UNKNOWN_ARRAY_COUNT,
        _ => 0,
    }
}

/// Splits `< inner >` off the front of `rest`, matching the last closing ` >`.
fn split_generic(rest: &str) -> Option<(&str, &str)> {
    let bytes = rest.as_bytes();
    if bytes.len() < 4 || bytes[0] != b'<' || !bytes[1].is_ascii_whitespace() {
        return None;
    }
    let close = (3..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'>' && bytes[i - 1].is_ascii_whitespace())?;
    Some((&rest[2..close - 1], &rest[close + 1..]))
}

impl FieldType {
    /// Parses a type string; returns `None` when it has no base type.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let end = name.find(['<', '[', '*']).unwrap_or(name.len());
        let base = &name[..end];
        if base.is_empty() {
            return None;
        }
        let mut rest = &name[end..];

        let mut generic = None;
        if let Some((inner, after)) = split_generic(rest) {
            if !inner.is_empty() {
                generic = Some(Box::new(Self::parse(inner)?));
            }
            rest = after;
        }

        let pointer = rest.starts_with('*');
        if pointer {
            rest = &rest[1..];
        }

        let mut count = 0;
        if let Some(body) = rest.strip_prefix('[') {
            if let Some(close) = body.rfind(']') {
                count = array_count(&body[..close]);
            }
        }

        Some(Self {
            base: base.to_owned(),
            generic,
            pointer,
            count,
        })
    }

    /// Base type of the generic argument, if any.
    #[must_use]
    pub fn generic_base(&self) -> Option<&str> {
        self.generic.as_deref().map(|g| g.base.as_str())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if let Some(generic) = &self.generic {
            write!(f, "<{generic}>")?;
        }
        if self.pointer {
            write!(f, "*")?;
        }
        if self.count > 0 {
            write!(f, "[{}]", self.count)?;
        }
        Ok(())
    }
}
