#![forbid(unsafe_code)]

//! Key selectors accepted by every multi-key operation.

/// One key, an explicit list, or every current key (`"*"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keys {
    One(String),
    Many(Vec<String>),
    All,
}

/// Wildcard spelling of [`Keys::All`].
pub const WILDCARD: &str = "*";

impl Keys {
    /// Expand into concrete keys, calling `all` only for the wildcard.
    pub(crate) fn resolve(self, all: impl FnOnce() -> Vec<String>) -> Vec<String> {
        match self {
            Self::One(key) => vec![key],
            Self::Many(keys) => keys,
            Self::All => all(),
        }
    }
}

impl From<&str> for Keys {
    fn from(key: &str) -> Self {
        if key == WILDCARD {
            Self::All
        } else {
            Self::One(key.to_owned())
        }
    }
}

impl From<String> for Keys {
    fn from(key: String) -> Self {
        Self::from(key.as_str())
    }
}

impl From<&String> for Keys {
    fn from(key: &String) -> Self {
        Self::from(key.as_str())
    }
}

impl From<&[&str]> for Keys {
    fn from(keys: &[&str]) -> Self {
        Self::Many(keys.iter().map(|k| (*k).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Keys {
    fn from(keys: [&str; N]) -> Self {
        Self::Many(keys.iter().map(|k| (*k).to_owned()).collect())
    }
}

impl From<Vec<&str>> for Keys {
    fn from(keys: Vec<&str>) -> Self {
        Self::Many(keys.into_iter().map(str::to_owned).collect())
    }
}

impl From<Vec<String>> for Keys {
    fn from(keys: Vec<String>) -> Self {
        Self::Many(keys)
    }
}
