//! Redacting wrapper for API keys and other credentials

use std::fmt;
use zeroize::Zeroize;

const REDACTED: &str = "[REDACTED]";

/// A credential that never prints its value.
///
/// Debug and Display both render `[REDACTED]`; the memory is zeroed on drop.
/// Call `expose` only at the point the value is sent to the remote service.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// `...` plus the last four characters, enough to tell keys apart in logs.
    /// Keys of four characters or fewer are fully masked.
    pub fn suffix(&self) -> String {
        let count = self.0.chars().count();
        if count <= 4 {
            return "****".to_string();
        }
        let tail: String = self.0.chars().skip(count - 4).collect();
        format!("...{tail}")
    }

    /// True when the key is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Secret<String> {
        Secret::new(String::from("AIzaSyExample1234"))
    }

    #[test]
    fn formatting_never_shows_the_key() {
        let secret = key();
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(format!("{:?}", vec![key(), key()]), "[[REDACTED], [REDACTED]]");
    }

    #[test]
    fn expose_returns_the_value() {
        assert_eq!(key().expose(), "AIzaSyExample1234");
        assert_eq!(key().clone().expose(), "AIzaSyExample1234");
    }

    #[test]
    fn suffix_shows_last_four() {
        assert_eq!(key().suffix(), "...1234");
        assert_eq!(Secret::new(String::from("abcde")).suffix(), "...bcde");
    }

    #[test]
    fn suffix_masks_short_keys() {
        assert_eq!(Secret::new(String::from("abcd")).suffix(), "****");
        assert_eq!(Secret::new(String::new()).suffix(), "****");
    }

    #[test]
    fn blank_detection() {
        assert!(Secret::new(String::new()).is_blank());
        assert!(Secret::new(String::from(" \t\n")).is_blank());
        assert!(!key().is_blank());
    }
}
