//! Key orderings.
//!
//! A table is only meaningful under the ordering it was written with, so every
//! comparator carries a [`ComparatorConfig`] that is persisted in the file and
//! checked again when the file is opened.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Persisted identity of a comparator: a stable name plus opaque parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComparatorConfig {
    pub name: String,
    pub params: Vec<u8>,
}

impl ComparatorConfig {
    pub fn new(name: impl Into<String>, params: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl fmt::Display for ComparatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{:?}", self.name, self.params)
        }
    }
}

/// A total order over byte strings.
///
/// Implementations must be transitive and antisymmetric, and two comparators
/// reporting the same [`config`](Comparator::config) must order keys identically.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    fn config(&self) -> ComparatorConfig;
}

/// Unsigned byte-wise lexicographic order. This is the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lexicographic;

impl Lexicographic {
    pub const NAME: &'static str = "lexicographic";
}

impl Comparator for Lexicographic {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn config(&self) -> ComparatorConfig {
        ComparatorConfig::new(Self::NAME, Vec::new())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little = 0,
    Big = 1,
}

/// Orders keys as fixed-width unsigned integers.
///
/// Keys whose length differs from `width` are still ordered totally: the first
/// `width` bytes (zero padded) decide, then shorter keys first, then raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedWidthUint {
    width: u8,
    endian: Endian,
}

impl FixedWidthUint {
    pub const NAME: &'static str = "fixed-width-uint";

    /// Returns `None` unless `width` is 1, 2, 4 or 8.
    pub fn new(width: u8, endian: Endian) -> Option<Self> {
        match width {
            1 | 2 | 4 | 8 => Some(Self { width, endian }),
            _ => None,
        }
    }

    pub fn u32_le() -> Self {
        Self {
            width: 4,
            endian: Endian::Little,
        }
    }

    pub fn u64_be() -> Self {
        Self {
            width: 8,
            endian: Endian::Big,
        }
    }

    fn decode(&self, key: &[u8]) -> u64 {
        let width = self.width as usize;
        let mut bytes = [0u8; 8];
        let take = key.len().min(width);
        match self.endian {
            Endian::Little => {
                bytes[..take].copy_from_slice(&key[..take]);
                u64::from_le_bytes(bytes)
            }
            Endian::Big => {
                // Right-align so a short key reads as if zero padded at the end.
                bytes[8 - width..8 - width + take].copy_from_slice(&key[..take]);
                u64::from_be_bytes(bytes)
            }
        }
    }

    fn from_params(params: &[u8]) -> Option<Self> {
        let [width, endian] = params else {
            return None;
        };
        let endian = match *endian {
            0 => Endian::Little,
            1 => Endian::Big,
            _ => return None,
        };
        Self::new(*width, endian)
    }
}

impl Comparator for FixedWidthUint {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.decode(a)
            .cmp(&self.decode(b))
            .then_with(|| a.len().cmp(&b.len()))
            .then_with(|| a.cmp(b))
    }

    fn config(&self) -> ComparatorConfig {
        ComparatorConfig::new(Self::NAME, vec![self.width, self.endian as u8])
    }
}

/// The comparator used when none is configured.
pub fn default_comparator() -> Arc<dyn Comparator> {
    Arc::new(Lexicographic)
}

/// Finds the built-in comparator matching a persisted config.
pub fn resolve(config: &ComparatorConfig) -> Option<Arc<dyn Comparator>> {
    match config.name.as_str() {
        Lexicographic::NAME if config.params.is_empty() => Some(Arc::new(Lexicographic)),
        FixedWidthUint::NAME => {
            FixedWidthUint::from_params(&config.params).map(|c| Arc::new(c) as Arc<dyn Comparator>)
        }
        _ => None,
    }
}
