//! The fully specified connection descriptor.

/// Everything needed to reach one permissions service endpoint.
///
/// The tri-state booleans distinguish *unset* from *false* so that merging
/// layers can tell "the user said no" apart from "the user said nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
    /// Context name within the config; empty for flag-only tokens.
    pub name: String,
    /// `host:port` of the permissions service.
    pub endpoint: String,
    /// Opaque bearer token.
    pub api_token: String,
    /// PEM bytes of a custom certificate authority.
    pub ca_cert: Option<Vec<u8>>,
    /// Dial without TLS.
    pub insecure: Option<bool>,
    /// Dial with TLS but skip certificate verification.
    pub no_verify_ca: Option<bool>,
}

impl Token {
    /// True iff at least one field besides `name` is set.
    #[must_use]
    pub fn any_value(&self) -> bool {
        !self.endpoint.is_empty()
            || !self.api_token.is_empty()
            || self.ca_cert.is_some()
            || self.insecure.is_some()
            || self.no_verify_ca.is_some()
    }

    /// Returns `self` with every set field of `overlay` replacing the
    /// corresponding field. The `name` is never overridden.
    #[must_use]
    pub fn with_override(mut self, overlay: &Token) -> Token {
        if !overlay.endpoint.is_empty() {
            self.endpoint = overlay.endpoint.clone();
        }
        if !overlay.api_token.is_empty() {
            self.api_token = overlay.api_token.clone();
        }
        if overlay.ca_cert.is_some() {
            self.ca_cert = overlay.ca_cert.clone();
        }
        if overlay.insecure.is_some() {
            self.insecure = overlay.insecure;
        }
        if overlay.no_verify_ca.is_some() {
            self.no_verify_ca = overlay.no_verify_ca;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Token {
        Token {
            name: "staging".to_owned(),
            endpoint: "grpc.staging.example.com:443".to_owned(),
            api_token: "tc_zed_staging".to_owned(),
            ca_cert: None,
            insecure: Some(false),
            no_verify_ca: None,
        }
    }

    #[test]
    fn empty_override_is_identity() {
        assert_eq!(base().with_override(&Token::default()), base());
    }

    #[test]
    fn override_of_empty_preserves_name() {
        let overlay = base();
        let merged = Token {
            name: "keep-me".to_owned(),
            ..Token::default()
        }
        .with_override(&overlay);
        assert_eq!(merged.name, "keep-me");
        assert_eq!(merged.endpoint, overlay.endpoint);
        assert_eq!(merged.api_token, overlay.api_token);
        assert_eq!(merged.insecure, overlay.insecure);
    }

    #[test]
    fn set_fields_win_field_by_field() {
        let overlay = Token {
            endpoint: "localhost:50051".to_owned(),
            insecure: Some(true),
            ..Token::default()
        };
        let merged = base().with_override(&overlay);
        assert_eq!(merged.endpoint, "localhost:50051");
        assert_eq!(merged.insecure, Some(true));
        // Unset overlay fields keep the base.
        assert_eq!(merged.api_token, "tc_zed_staging");
        assert_eq!(merged.no_verify_ca, None);
    }

    #[test]
    fn explicit_false_still_overrides() {
        let overlay = Token {
            insecure: Some(false),
            ..Token::default()
        };
        let merged = Token {
            insecure: Some(true),
            ..Token::default()
        }
        .with_override(&overlay);
        assert_eq!(merged.insecure, Some(false));
    }

    #[test]
    fn any_value_is_false_only_for_the_empty_token() {
        assert!(!Token::default().any_value());
        assert!(!Token {
            name: "named-but-empty".to_owned(),
            ..Token::default()
        }
        .any_value());
        assert!(Token {
            insecure: Some(false),
            ..Token::default()
        }
        .any_value());
        assert!(base().any_value());
    }
}
