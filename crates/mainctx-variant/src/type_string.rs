//! Type string grammar
//!
//! ```text
//! type    = basic | "v" | "r" | "*" | "a" type | "m" type
//!         | "(" type* ")" | "{" key type "}"
//! basic   = "b" | "y" | "n" | "q" | "i" | "u" | "x" | "t" | "h"
//!         | "d" | "s" | "o" | "g" | "?"
//! key     = one of "bynqihuxtdsog?"
//! ```
//!
//! `r` (any tuple), `*` (any type) and `?` (any basic type) are valid but
//! indefinite: they match families of types and have no layout.
//!
//! Containers nest at most `MAX_DEPTH` levels. A basic type has depth 1,
//! a container one more than its deepest child.

use crate::error::VariantTypeError;

/// Deepest container nesting accepted
pub const MAX_DEPTH: usize = 128;

const DICT_KEY_CHARS: &[u8] = b"bynqihuxtdsog?";
const INDEFINITE_CHARS: &[u8] = b"r*?";

fn unexpected(s: &str, position: usize) -> VariantTypeError {
    let found = s[position..].chars().next().unwrap_or('\0');
    VariantTypeError::UnexpectedChar { position, found }
}

/// Scan one complete type starting at `pos`, returning its end and depth
fn scan_at(s: &str, pos: usize, limit: usize) -> Result<(usize, usize), VariantTypeError> {
    let bytes = s.as_bytes();
    let Some(&first) = bytes.get(pos) else {
        return Err(VariantTypeError::UnexpectedEnd);
    };
    let mut pos = pos + 1;

    let depth = match first {
        b'(' => {
            let mut deepest = 0;
            loop {
                match bytes.get(pos) {
                    Some(b')') => break,
                    Some(_) => {}
                    None => return Err(VariantTypeError::UnexpectedEnd),
                }
                if limit == 0 {
                    return Err(VariantTypeError::TooDeep);
                }
                let (end, child) = scan_at(s, pos, limit - 1)?;
                pos = end;
                deepest = deepest.max(child + 1);
            }
            pos += 1;
            // the unit tuple still counts as one level
            deepest.max(1)
        }
        b'{' => {
            if limit == 0 {
                return Err(VariantTypeError::TooDeep);
            }
            match bytes.get(pos) {
                Some(key) if DICT_KEY_CHARS.contains(key) => pos += 1,
                Some(_) => return Err(unexpected(s, pos)),
                None => return Err(VariantTypeError::UnexpectedEnd),
            }
            let (end, child) = scan_at(s, pos, limit - 1)?;
            pos = end;
            match bytes.get(pos) {
                Some(b'}') => pos += 1,
                Some(_) => return Err(unexpected(s, pos)),
                None => return Err(VariantTypeError::UnexpectedEnd),
            }
            child + 1
        }
        b'a' | b'm' => {
            if limit == 0 {
                return Err(VariantTypeError::TooDeep);
            }
            let (end, child) = scan_at(s, pos, limit - 1)?;
            pos = end;
            child + 1
        }
        b'b' | b'y' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'd' | b's' | b'o' | b'g'
        | b'v' | b'r' | b'*' | b'?' | b'h' => 1,
        _ => return Err(unexpected(s, pos - 1)),
    };

    Ok((pos, depth))
}

/// Length of the complete type at the start of `s`
pub fn scan(s: &str) -> Result<usize, VariantTypeError> {
    if s.is_empty() {
        return Err(VariantTypeError::Empty);
    }
    scan_at(s, 0, MAX_DEPTH).map(|(end, _)| end)
}

/// Check that `s` is exactly one type, returning its depth
pub fn validate(s: &str) -> Result<usize, VariantTypeError> {
    if s.is_empty() {
        return Err(VariantTypeError::Empty);
    }
    let (end, depth) = scan_at(s, 0, MAX_DEPTH)?;
    if end != s.len() {
        return Err(VariantTypeError::TrailingData { position: end });
    }
    Ok(depth)
}

#[inline]
pub fn is_valid(s: &str) -> bool {
    validate(s).is_ok()
}

/// Depth of `s`, or 0 if it is not a valid type string
pub fn depth(s: &str) -> usize {
    validate(s).unwrap_or(0)
}

/// Whether `s` is valid and names exactly one type
pub fn is_definite(s: &str) -> bool {
    is_valid(s) && !s.bytes().any(|c| INDEFINITE_CHARS.contains(&c))
}

/// Element type of an array or maybe type
pub fn element(s: &str) -> Result<&str, VariantTypeError> {
    validate(s)?;
    match s.as_bytes()[0] {
        b'a' | b'm' => Ok(&s[1..]),
        _ => Err(VariantTypeError::NotAContainer),
    }
}

/// Member types of a tuple or dict entry, in order
pub fn items(s: &str) -> Result<Items<'_>, VariantTypeError> {
    validate(s)?;
    match s.as_bytes()[0] {
        b'(' | b'{' => Ok(Items { s, pos: 1, end: s.len() - 1 }),
        _ => Err(VariantTypeError::NotAContainer),
    }
}

/// Number of members of a tuple or dict entry
pub fn n_items(s: &str) -> Result<usize, VariantTypeError> {
    items(s).map(Iterator::count)
}

/// Iterator over the member type strings of a validated tuple or dict entry
#[derive(Debug, Clone)]
pub struct Items<'a> {
    s: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> Iterator for Items<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.pos >= self.end {
            return None;
        }
        let start = self.pos;
        let (end, _) = scan_at(self.s, start, MAX_DEPTH).ok()?;
        self.pos = end;
        Some(&self.s[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_strings() {
        for s in ["i", "s", "v", "ay", "a{sv}", "(su(qx)ni)", "()", "m(ii)", "a{?*}", "r", "*", "{sa{sv}}"] {
            assert!(is_valid(s), "{}", s);
        }
    }

    #[test]
    fn test_invalid_strings() {
        assert_eq!(validate(""), Err(VariantTypeError::Empty));
        assert_eq!(validate("a"), Err(VariantTypeError::UnexpectedEnd));
        assert_eq!(validate("(ii"), Err(VariantTypeError::UnexpectedEnd));
        assert_eq!(validate("{vs}"), Err(VariantTypeError::UnexpectedChar { position: 1, found: 'v' }));
        assert_eq!(validate("{sss}"), Err(VariantTypeError::UnexpectedChar { position: 3, found: 's' }));
        assert_eq!(validate("z"), Err(VariantTypeError::UnexpectedChar { position: 0, found: 'z' }));
        assert_eq!(validate("(é)"), Err(VariantTypeError::UnexpectedChar { position: 1, found: 'é' }));
        assert_eq!(validate("ii"), Err(VariantTypeError::TrailingData { position: 1 }));
        assert_eq!(scan("iix"), Ok(1));
        assert_eq!(scan("a{sv}i"), Ok(5));
    }

    #[test]
    fn test_depth() {
        assert_eq!(depth("i"), 1);
        assert_eq!(depth("ai"), 2);
        assert_eq!(depth("()"), 1);
        assert_eq!(depth("(i)"), 2);
        assert_eq!(depth("a{sv}"), 3);
        assert_eq!(depth("(ia(ai))"), 5);
        assert_eq!(depth("(("), 0);
    }

    #[test]
    fn test_nesting_limit() {
        let deepest = format!("{}i", "a".repeat(MAX_DEPTH));
        assert_eq!(depth(&deepest), MAX_DEPTH + 1);

        let too_deep = format!("{}i", "a".repeat(MAX_DEPTH + 1));
        assert_eq!(validate(&too_deep), Err(VariantTypeError::TooDeep));

        // the innermost unit tuple has no child to descend into
        let tuples = format!("{}{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(depth(&tuples), MAX_DEPTH + 1);
        let tuples = format!("{}{}", "(".repeat(MAX_DEPTH + 2), ")".repeat(MAX_DEPTH + 2));
        assert_eq!(validate(&tuples), Err(VariantTypeError::TooDeep));
    }

    #[test]
    fn test_definite() {
        assert!(is_definite("a{sv}"));
        assert!(!is_definite("a{s*}"));
        assert!(!is_definite("r"));
        assert!(!is_definite("m?"));
        assert!(!is_definite("(ii"));
    }

    #[test]
    fn test_element_and_items() {
        assert_eq!(element("aai"), Ok("ai"));
        assert_eq!(element("m(ii)"), Ok("(ii)"));
        assert_eq!(element("(ii)"), Err(VariantTypeError::NotAContainer));

        let members: Vec<&str> = items("(su(qx)ni)").unwrap().collect();
        assert_eq!(members, vec!["s", "u", "(qx)", "n", "i"]);
        assert_eq!(items("{sa{sv}}").unwrap().collect::<Vec<_>>(), vec!["s", "a{sv}"]);
        assert_eq!(n_items("()"), Ok(0));
        assert_eq!(n_items("ai"), Err(VariantTypeError::NotAContainer));
    }
}
