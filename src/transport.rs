//! Single-attempt HTTP execution and the bounded retry loop around it.

use std::borrow::Cow;

use reqwest::{header::HeaderMap, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::{
    backoff::{entropy_u64, JitterBackoff},
    encode::RequestTarget,
    options::ClientOptions,
    GlacierDbError, Result,
};

/// Request methods this layer issues. POST carries a JSON body, GET carries
/// only query parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpMethod {
    Get,
    Post,
}

enum Outcome {
    Success(Value),
    Retryable(u16),
}

/// Where an attempt's URL comes from.
pub(crate) enum AttemptUrl<'a> {
    /// Re-encoded before every attempt so each carries a fresh idempotency
    /// token.
    Encoded(&'a RequestTarget),
    /// Server-supplied URL used verbatim, e.g. a bulk result chunk URL.
    Absolute(&'a str),
}

impl AttemptUrl<'_> {
    fn build(&self) -> Result<Cow<'_, str>> {
        match self {
            Self::Encoded(target) => target.encode().map(Cow::Owned),
            Self::Absolute(url) => Ok(Cow::Borrowed(url)),
        }
    }
}

/// Retryable statuses: all server errors plus the service's known
/// transient client-side statuses.
pub fn is_retryable_status(code: u16) -> bool {
    (500..=599).contains(&code) || matches!(code, 400 | 403 | 408)
}

/// Builds the HTTP client a connection will use for its lifetime. TLS is
/// pinned to 1.2 or newer; insecure mode disables peer verification and with
/// it revocation checking.
pub(crate) fn build_http_client(options: &ClientOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().min_tls_version(reqwest::tls::Version::TLS_1_2);
    if options.insecure_mode {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = &options.ca_bundle_path {
        let pem = std::fs::read(path).map_err(|err| {
            GlacierDbError::transport(format!(
                "unable to read ca bundle file {}: {err}",
                path.display()
            ))
        })?;
        let certificates = reqwest::Certificate::from_pem_bundle(&pem).map_err(|err| {
            GlacierDbError::transport(format!(
                "unable to load ca bundle file {}: {err}",
                path.display()
            ))
        })?;
        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    }
    builder.build().map_err(|source| GlacierDbError::Transport {
        message: "failed to build http client".to_owned(),
        source: Some(source),
    })
}

/// Executes one transport call, retrying retryable HTTP statuses with
/// decorrelated-jitter delays until success, a terminal outcome, or the
/// retry budget runs out. The URL is re-encoded before every attempt so each
/// one carries a fresh idempotency token.
pub(crate) async fn perform(
    http: &reqwest::Client,
    method: HttpMethod,
    target: AttemptUrl<'_>,
    headers: &HeaderMap,
    body: Option<&str>,
    options: &ClientOptions,
    chunked: bool,
) -> Result<Value> {
    let mut backoff = JitterBackoff::new(options.backoff_base_ms, options.backoff_cap_ms);
    let mut retries = 0usize;
    loop {
        let url = target.build()?;
        trace!("running http attempt");
        match attempt_once(http, method, &url, headers, body, options, chunked).await? {
            Outcome::Success(json) => return Ok(json),
            Outcome::Retryable(status) => {
                if retries >= options.max_retries {
                    return Err(GlacierDbError::Retry {
                        status: Some(status),
                        message: format!(
                            "retry budget exhausted after {} attempts, last http status {status}",
                            retries + 1
                        ),
                    });
                }
                retries += 1;
                let delay = backoff.next_delay_ms(entropy_u64());
                debug!(
                    "http status {status} is retryable, attempt {retries} sleeping {} ms",
                    delay.as_millis()
                );
                sleep(delay).await;
            }
        }
    }
}

/// One attempt: fresh response buffer, streamed body, outcome classification.
async fn attempt_once(
    http: &reqwest::Client,
    method: HttpMethod,
    url: &str,
    headers: &HeaderMap,
    body: Option<&str>,
    options: &ClientOptions,
    chunked: bool,
) -> Result<Outcome> {
    let mut request = match method {
        HttpMethod::Get => http.get(url),
        HttpMethod::Post => http
            .post(url)
            .body(body.unwrap_or_default().to_owned()),
    };
    request = request
        .headers(headers.clone())
        .timeout(options.network_timeout);

    let mut response = request
        .send()
        .await
        .map_err(|err| transport_error(err, options))?;

    let status = response.status();
    if status != StatusCode::OK {
        if is_retryable_status(status.as_u16()) {
            warn!("http status {} on attempt, will retry", status.as_u16());
            return Ok(Outcome::Retryable(status.as_u16()));
        }
        return Err(GlacierDbError::Retry {
            status: Some(status.as_u16()),
            message: format!("received unretryable http status {}", status.as_u16()),
        });
    }

    // Chunked mode concatenates raw chunk payloads into one JSON array.
    let mut buffer: Vec<u8> = Vec::new();
    if chunked {
        buffer.push(b'[');
    }
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| transport_error(err, options))?
    {
        buffer.try_reserve(chunk.len()).map_err(|_| {
            GlacierDbError::OutOfMemory("ran out of memory growing the response buffer".to_owned())
        })?;
        buffer.extend_from_slice(&chunk);
    }
    if chunked {
        buffer.push(b']');
    }
    trace!("response buffer size: {}", buffer.len());

    serde_json::from_slice(&buffer)
        .map(Outcome::Success)
        .map_err(|err| GlacierDbError::BadJson(format!("unable to parse json response: {err}")))
}

fn transport_error(source: reqwest::Error, options: &ClientOptions) -> GlacierDbError {
    let message = match &options.ca_bundle_path {
        Some(path) => format!("request failed: {source}, ca bundle file: {}", path.display()),
        None => format!("request failed: {source}"),
    };
    GlacierDbError::Transport {
        message,
        source: Some(source),
    }
}
