use std::{
    fmt,
    fmt::{Debug, Display},
};

/// A wrapper that keeps sensitive values out of logs and debug output.
///
/// The server carries its gateway webhook secret and checkout credentials through configuration
/// structs that get logged on startup; wrapping them here means a stray `{:?}` prints `****`
/// instead of the secret.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    /// Hands back the wrapped value, e.g. to key the webhook HMAC. Call sites of `reveal` are
    /// the audit trail for where a secret actually leaves the wrapper.
    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formatting_never_leaks_the_value() {
        let secret = Secret::new("whsec_123".to_string());
        assert_eq!(format!("{secret}"), "****");
        assert_eq!(format!("{secret:?}"), "****");
        assert_eq!(secret.reveal(), "whsec_123");
    }
}
