//! Request header construction for the three authentication modes.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use crate::{GlacierDbError, Result};

const CONTENT_TYPE_JSON: &str = "application/json";
const ACCEPT_VENDOR: &str = "application/glacierdb+json";
const ACCEPT_JSON: &str = "application/json";
const CLIENT_IDENTIFIER: &str = concat!("glacierdb-http/", env!("CARGO_PKG_VERSION"), " (rust)");

/// Media type requested from the service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AcceptType {
    /// Vendor-specific media type, the default for query traffic.
    Vendor,
    /// Plain `application/json`.
    Json,
}

impl AcceptType {
    fn value(self) -> HeaderValue {
        match self {
            Self::Vendor => HeaderValue::from_static(ACCEPT_VENDOR),
            Self::Json => HeaderValue::from_static(ACCEPT_JSON),
        }
    }
}

/// Headers for requests carrying no credential, e.g. the login call.
pub fn anonymous(accept: AcceptType) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    headers.insert(ACCEPT, accept.value());
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_IDENTIFIER));
    headers
}

/// Headers authenticated with a session or master token.
pub fn session_token(token: &str, accept: AcceptType) -> Result<HeaderMap> {
    authorized(format!("GlacierDB Token=\"{token}\""), accept)
}

/// Headers authenticated with a direct-query token.
pub fn direct_query_token(token: &str, accept: AcceptType) -> Result<HeaderMap> {
    authorized(format!("Bearer {token}"), accept)
}

fn authorized(value: String, accept: AcceptType) -> Result<HeaderMap> {
    let mut authorization = HeaderValue::from_str(&value).map_err(|_| {
        GlacierDbError::BadRequest(
            "token contains characters that are not valid in a header".to_owned(),
        )
    })?;
    authorization.set_sensitive(true);
    let mut headers = anonymous(accept);
    headers.insert(AUTHORIZATION, authorization);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

    use super::{anonymous, direct_query_token, session_token, AcceptType};

    #[test]
    fn anonymous_carries_three_headers() {
        let headers = anonymous(AcceptType::Vendor);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[ACCEPT], "application/glacierdb+json");
        assert!(headers[USER_AGENT]
            .to_str()
            .expect("ascii")
            .starts_with("glacierdb-http/"));
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn accept_type_toggles_to_plain_json() {
        let headers = anonymous(AcceptType::Json);
        assert_eq!(headers[ACCEPT], "application/json");
    }

    #[test]
    fn session_token_uses_vendor_scheme_and_is_sensitive() {
        let headers = session_token("tok-123", AcceptType::Vendor).expect("must build");
        assert_eq!(headers[AUTHORIZATION], "GlacierDB Token=\"tok-123\"");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn direct_query_token_uses_bearer_scheme() {
        let headers = direct_query_token("dq-456", AcceptType::Json).expect("must build");
        assert_eq!(headers[AUTHORIZATION], "Bearer dq-456");
    }

    #[test]
    fn control_characters_in_token_are_rejected() {
        let err = session_token("bad\ntoken", AcceptType::Vendor).expect_err("must fail");
        assert_eq!(err.code(), "BAD_REQUEST");
    }
}
