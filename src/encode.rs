//! Per-attempt URL construction.
//!
//! Every built URL carries exactly one `request_guid` idempotency parameter,
//! freshly generated on each call so retries of the same logical request are
//! distinguishable server-side.

use std::borrow::Cow;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

use crate::{options::ConnectParams, GlacierDbError, Result};

/// Domain appended to the account identifier when no host override is set.
pub const DEFAULT_BASE_DOMAIN: &str = "glacierdb.cloud";

const REQUEST_GUID_KEY: &str = "request_guid";

/// Everything except unreserved characters, matching what the service
/// expects for query parameter values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes a query parameter value. Empty input encodes to an empty
/// string, it is never dropped.
pub fn encode_value(value: &str) -> Cow<'_, str> {
    utf8_percent_encode(value, QUERY_VALUE).into()
}

/// One logical request destination. Encoding it produces a fully-qualified
/// URL with a fresh idempotency parameter.
#[derive(Clone, Debug)]
pub struct RequestTarget {
    pub protocol: String,
    pub account: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Target path, starting with `/`.
    pub path: String,
    /// Ordered query parameters; values are percent-encoded at build time.
    pub params: Vec<(String, String)>,
    /// Pre-encoded parameter blob appended verbatim.
    pub extra_raw: Option<String>,
}

impl RequestTarget {
    pub fn new(params: &ConnectParams, path: impl Into<String>) -> Self {
        Self {
            protocol: params.protocol.clone(),
            account: params.account.clone(),
            host: params.host.clone(),
            port: params.port,
            path: path.into(),
            params: Vec::new(),
            extra_raw: params.extra_url_params.clone(),
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    /// Builds the encoded URL. Each call appends a newly generated UUIDv4
    /// `request_guid`, so a retried attempt never reuses its predecessor's
    /// idempotency token.
    pub fn encode(&self) -> Result<String> {
        let host = self.host.as_deref().filter(|host| !host.is_empty());
        let base = match (host, self.port) {
            (Some(host), Some(port)) => {
                format!("{}://{}:{}{}", self.protocol, host, port, self.path)
            }
            (Some(host), None) => format!("{}://{}{}", self.protocol, host, self.path),
            (None, Some(port)) => format!(
                "{}://{}.{}:{}{}",
                self.protocol, self.account, DEFAULT_BASE_DOMAIN, port, self.path
            ),
            (None, None) => format!(
                "{}://{}.{}{}",
                self.protocol, self.account, DEFAULT_BASE_DOMAIN, self.path
            ),
        };

        let guid = Uuid::new_v4();
        let encoded: Vec<(&str, Cow<'_, str>)> = self
            .params
            .iter()
            .map(|(key, value)| (key.as_str(), encode_value(value)))
            .collect();

        let mut size = base.len() + 1 + REQUEST_GUID_KEY.len() + 1 + 36;
        for (key, value) in &encoded {
            size += key.len() + value.len() + 2;
        }
        if let Some(extra) = &self.extra_raw {
            size += extra.len() + 1;
        }

        let mut url = String::new();
        url.try_reserve(size).map_err(|_| {
            GlacierDbError::OutOfMemory("ran out of memory trying to create encoded url".to_owned())
        })?;

        url.push_str(&base);
        url.push('?');
        for (key, value) in &encoded {
            url.push_str(key);
            url.push('=');
            url.push_str(value);
            url.push('&');
        }
        url.push_str(REQUEST_GUID_KEY);
        url.push('=');
        let mut guid_buffer = Uuid::encode_buffer();
        url.push_str(guid.hyphenated().encode_lower(&mut guid_buffer));

        if let Some(extra) = self.extra_raw.as_deref().filter(|extra| !extra.is_empty()) {
            if !self.params.is_empty() {
                url.push('&');
            }
            url.push_str(extra);
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{encode_value, RequestTarget};
    use crate::options::ConnectParams;

    fn target(host: Option<&str>, port: Option<u16>) -> RequestTarget {
        let mut params = ConnectParams::for_account("xy12345");
        params.host = host.map(str::to_owned);
        params.port = port;
        RequestTarget::new(&params, "/session/token-request")
    }

    fn request_guid(url: &str) -> &str {
        let (_, tail) = url
            .split_once("request_guid=")
            .expect("url must carry request_guid");
        &tail[..36]
    }

    #[test]
    fn template_with_host_and_port() {
        let url = target(Some("10.0.0.7"), Some(8085)).encode().expect("must encode");
        assert!(url.starts_with("https://10.0.0.7:8085/session/token-request?"));
    }

    #[test]
    fn template_with_host_only() {
        let url = target(Some("gateway.internal"), None)
            .encode()
            .expect("must encode");
        assert!(url.starts_with("https://gateway.internal/session/token-request?"));
    }

    #[test]
    fn template_with_account_and_port() {
        let url = target(None, Some(443)).encode().expect("must encode");
        assert!(url.starts_with("https://xy12345.glacierdb.cloud:443/session/token-request?"));
    }

    #[test]
    fn template_with_account_default() {
        let url = target(None, None).encode().expect("must encode");
        assert!(url.starts_with("https://xy12345.glacierdb.cloud/session/token-request?"));
    }

    #[test]
    fn empty_valued_parameter_is_kept() {
        let url = target(None, None)
            .with_params(vec![
                ("warehouse".to_owned(), String::new()),
                ("request_id".to_owned(), "abc".to_owned()),
            ])
            .encode()
            .expect("must encode");
        assert!(url.contains("warehouse=&request_id=abc&request_guid="));
    }

    #[test]
    fn parameter_values_are_percent_encoded() {
        let url = target(None, None)
            .with_params(vec![("databaseName".to_owned(), "my db/prod".to_owned())])
            .encode()
            .expect("must encode");
        assert!(url.contains("databaseName=my%20db%2Fprod&"));
    }

    #[test]
    fn exactly_one_valid_request_guid_per_url() {
        let url = target(None, None).encode().expect("must encode");
        assert_eq!(url.matches("request_guid=").count(), 1);
        let guid = Uuid::parse_str(request_guid(&url)).expect("guid must be a valid uuid");
        assert_eq!(guid.get_version_num(), 4);
    }

    #[test]
    fn request_guid_differs_across_encodes_of_same_target() {
        let target = target(None, None);
        let first = target.encode().expect("must encode");
        let second = target.encode().expect("must encode");
        assert_ne!(request_guid(&first), request_guid(&second));
    }

    #[test]
    fn extra_params_joined_only_when_params_exist() {
        let mut with_params = target(None, None)
            .with_params(vec![("request_id".to_owned(), "abc".to_owned())]);
        with_params.extra_raw = Some("sig=deadbeef".to_owned());
        let url = with_params.encode().expect("must encode");
        assert!(url.contains("&sig=deadbeef"));
        assert!(!url.contains("&&sig"));

        let mut without_params = target(None, None);
        without_params.extra_raw = Some("sig=deadbeef".to_owned());
        let url = without_params.encode().expect("must encode");
        assert!(url.ends_with("sig=deadbeef"));
        assert!(!url.contains("&sig=deadbeef"));
    }

    #[test]
    fn empty_value_encodes_to_empty_string() {
        assert_eq!(encode_value(""), "");
        assert_eq!(encode_value("a b"), "a%20b");
        assert_eq!(encode_value("tilde~dot._-"), "tilde~dot._-");
    }
}
