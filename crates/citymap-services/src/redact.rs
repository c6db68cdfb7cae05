//! API credentials that cannot leak into logs or error text.

use std::fmt;

const MASK: &str = "***";

/// An API key or token.
///
/// `Debug` and `Display` never print the value. Use [`Credential::expose`]
/// only when building a request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read a credential from an environment variable, ignoring blank values.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Self)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replace every occurrence of the secret in `text` with `***`,
    /// both raw and in URL-encoded form.
    pub fn mask(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_string();
        }

        let masked = text.replace(&self.0, MASK);
        let encoded: String = url::form_urlencoded::byte_serialize(self.0.as_bytes()).collect();
        if encoded != self.0 {
            masked.replace(&encoded, MASK)
        } else {
            masked
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", MASK)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

/// Mask `text` with an optional credential.
pub fn mask_with(text: &str, credential: Option<&Credential>) -> String {
    match credential {
        Some(c) => c.mask(text),
        None => text.to_string(),
    }
}
