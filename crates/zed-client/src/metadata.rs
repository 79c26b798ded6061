//! Outgoing per-call metadata: bearer credential, request id, extra headers.

use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use zed_config::Token;
use zed_core::{ZedError, ZedResult};

/// The metadata stamped onto every outgoing request.
#[derive(Debug, Clone, Default)]
pub struct CallMetadata {
    entries: Vec<(MetadataKey<Ascii>, MetadataValue<Ascii>)>,
}

impl CallMetadata {
    /// Builds the stamp from the resolved token and transport flags.
    ///
    /// An empty API token installs no credential. `extra_headers` entries
    /// are raw `key=value` strings from `--extra-header`.
    pub fn build(
        token: &Token,
        request_id: Option<&str>,
        extra_headers: &[String],
    ) -> ZedResult<Self> {
        let mut entries = Vec::new();

        if !token.api_token.is_empty() {
            let value = MetadataValue::try_from(format!("Bearer {}", token.api_token))
                .map_err(|_| {
                    ZedError::Validation("the API token contains non-ASCII bytes".to_owned())
                })?;
            entries.push((MetadataKey::from_static("authorization"), value));
        }

        if let Some(id) = request_id {
            let value = MetadataValue::try_from(id).map_err(|_| {
                ZedError::Validation(format!("invalid --request-id value \"{id}\""))
            })?;
            entries.push((MetadataKey::from_static("x-request-id"), value));
        }

        for raw in extra_headers {
            let (key, value) = raw.split_once('=').ok_or_else(|| {
                ZedError::Validation(format!(
                    "--extra-header must be key=value, got \"{raw}\""
                ))
            })?;
            let key = MetadataKey::from_bytes(key.as_bytes()).map_err(|_| {
                ZedError::Validation(format!("invalid header name \"{key}\""))
            })?;
            let value = MetadataValue::try_from(value).map_err(|_| {
                ZedError::Validation(format!("invalid header value in \"{raw}\""))
            })?;
            entries.push((key, value));
        }

        Ok(Self { entries })
    }

    /// Applies the stamp to one request's metadata.
    pub fn apply(&self, metadata: &mut MetadataMap) {
        for (key, value) in &self.entries {
            metadata.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_is_installed_only_when_a_token_exists() {
        let mut token = Token::default();
        let stamp = CallMetadata::build(&token, None, &[]).unwrap();
        let mut md = MetadataMap::new();
        stamp.apply(&mut md);
        assert!(md.get("authorization").is_none());

        token.api_token = "tc_zed_abc".to_owned();
        let stamp = CallMetadata::build(&token, None, &[]).unwrap();
        let mut md = MetadataMap::new();
        stamp.apply(&mut md);
        assert_eq!(md.get("authorization").unwrap(), "Bearer tc_zed_abc");
    }

    #[test]
    fn request_id_and_extra_headers_become_metadata() {
        let stamp = CallMetadata::build(
            &Token::default(),
            Some("req-7"),
            &["x-tenant=acme".to_owned()],
        )
        .unwrap();
        let mut md = MetadataMap::new();
        stamp.apply(&mut md);
        assert_eq!(md.get("x-request-id").unwrap(), "req-7");
        assert_eq!(md.get("x-tenant").unwrap(), "acme");
    }

    #[test]
    fn malformed_extra_headers_are_validation_errors() {
        let err = CallMetadata::build(&Token::default(), None, &["no-equals".to_owned()])
            .unwrap_err();
        assert!(matches!(err, ZedError::Validation(_)));
    }
}
