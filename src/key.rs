//! Cache key validation and key selection for `del`.

use crate::error::{Error, Result};

/// Longest key memcached accepts, in bytes.
pub const MAX_KEY_LENGTH: usize = 250;

/// Check that `key` is usable as a memcached key.
///
/// # Errors
/// `Error::InvalidKey` if the key is empty, longer than [`MAX_KEY_LENGTH`]
/// bytes, or contains whitespace or control characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(Error::InvalidKey(format!(
            "key is {} bytes long, the limit is {}",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    if let Some(c) = key.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidKey(format!(
            "key {:?} contains forbidden character {:?}",
            key, c
        )));
    }
    Ok(())
}

/// Keys to delete: a single key or a batch.
///
/// ```
/// use cache_refresh::DelKeys;
///
/// assert_eq!(DelKeys::from("a"), DelKeys::One("a".to_string()));
/// assert_eq!(
///     DelKeys::from(vec!["a", "b"]),
///     DelKeys::Many(vec!["a".to_string(), "b".to_string()])
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DelKeys {
    One(String),
    Many(Vec<String>),
}

impl DelKeys {
    pub fn len(&self) -> usize {
        match self {
            DelKeys::One(_) => 1,
            DelKeys::Many(keys) => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for DelKeys {
    fn from(key: &str) -> Self {
        DelKeys::One(key.to_string())
    }
}

impl From<String> for DelKeys {
    fn from(key: String) -> Self {
        DelKeys::One(key)
    }
}

impl From<&String> for DelKeys {
    fn from(key: &String) -> Self {
        DelKeys::One(key.clone())
    }
}

impl From<Vec<String>> for DelKeys {
    fn from(keys: Vec<String>) -> Self {
        DelKeys::Many(keys)
    }
}

impl From<Vec<&str>> for DelKeys {
    fn from(keys: Vec<&str>) -> Self {
        DelKeys::Many(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for DelKeys {
    fn from(keys: &[&str]) -> Self {
        DelKeys::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for DelKeys {
    fn from(keys: [&str; N]) -> Self {
        DelKeys::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_plain_keys() {
        assert!(validate_key("user:123:profile").is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_key_rejects_bad_keys() {
        assert!(matches!(validate_key(""), Err(Error::InvalidKey(_))));
        assert!(matches!(
            validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            validate_key("has space"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            validate_key("line\nbreak"),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_del_keys_conversions() {
        assert_eq!(DelKeys::from("a").len(), 1);
        assert_eq!(DelKeys::from(["a", "b", "c"]).len(), 3);
        assert!(DelKeys::from(Vec::<String>::new()).is_empty());

        let owned = "x".to_string();
        assert_eq!(DelKeys::from(&owned), DelKeys::One("x".to_string()));
    }
}
