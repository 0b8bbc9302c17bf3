//! Locale-independent name collation for directory listings.
//!
//! Names compare level by level:
//!
//! 1. primary: compatibility-decomposed letters with accents removed, case folded
//! 2. secondary: the accents attached to each letter
//! 3. tertiary: case, lowercase before uppercase
//! 4. the raw code points, so distinct names never compare equal

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Precomputed sort key for one name.
///
/// Field order is the comparison order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: String,
    secondary: Vec<Vec<char>>,
    tertiary: Vec<bool>,
    raw: String,
}

impl CollationKey {
    /// Build the key for `name`.
    pub fn new(name: &str) -> Self {
        let mut primary = String::with_capacity(name.len());
        let mut secondary: Vec<Vec<char>> = Vec::new();
        let mut tertiary = Vec::new();

        for c in name.nfkd() {
            if is_combining_mark(c) {
                match secondary.last_mut() {
                    Some(marks) => marks.push(c),
                    // leading mark with no base letter
                    None => secondary.push(vec![c]),
                }
                continue;
            }
            primary.extend(c.to_lowercase());
            secondary.push(Vec::new());
            tertiary.push(c.is_uppercase());
        }

        Self {
            primary,
            secondary,
            tertiary,
            raw: name.to_string(),
        }
    }
}

/// Compare two names under the listing collation.
pub fn compare(a: &str, b: &str) -> Ordering {
    CollationKey::new(a).cmp(&CollationKey::new(b))
}
