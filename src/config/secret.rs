//! String wrapper for webhook URLs and tokens.

use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// Value that formats as `[REDACTED]` in `Debug` and `Display`.
///
/// ```
/// use tailwatch::config::SecretString;
///
/// let url = SecretString::new("https://hooks.example.com/T0K3N".to_string());
/// assert_eq!(format!("{:?}", url), "[REDACTED]");
/// assert_eq!(url.expose(), "https://hooks.example.com/T0K3N");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// The raw value. Never log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_format_leaks_the_value() {
        let secret = SecretString::new("https://hooks.example.com/abc123xyz".to_string());
        let renderings = [
            format!("{:?}", secret),
            format!("{}", secret),
            format!("{:#?}", Some(&secret)),
            format!("{:?}", vec![secret.clone()]),
        ];
        for rendered in &renderings {
            assert!(!rendered.contains("abc123xyz"), "leaked in {}", rendered);
            assert!(rendered.contains(REDACTED));
        }
        assert_eq!(secret.expose(), "https://hooks.example.com/abc123xyz");
    }
}
