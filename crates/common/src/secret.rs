//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for credentials such as the outbound
//! webhook bearer token. `SecretString` redacts itself in `Debug`, so any
//! config struct deriving `Debug` stays safe to log, and the value is zeroized
//! on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct WebhookCredentials {
//!     url: String,
//!     token: SecretString,
//! }
//!
//! let creds = WebhookCredentials {
//!     url: "https://bot.example/send".to_string(),
//!     token: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.token.expose_secret(), "s3cr3t");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("webhook-token");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("webhook-token"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("webhook-token");
        assert_eq!(secret.expose_secret(), "webhook-token");
    }
}
