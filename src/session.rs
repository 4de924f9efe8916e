//! Connection context and the session protocol: status-code dispatch,
//! token renewal, and result polling.

use std::fmt;

use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    contract::{self, FieldError},
    encode::RequestTarget,
    headers::{self, AcceptType},
    options::{ClientOptions, ConnectParams, StatusCodes},
    transport::{self, AttemptUrl, HttpMethod},
    wire::{AuthRequest, QueryRequest, RenewRequest},
    GlacierDbError, Result,
};

/// Login endpoint; opens a session and returns the initial token pair.
pub const LOGIN_PATH: &str = "/session/v1/login-request";
/// Renewal endpoint; exchanges an expired session token for a fresh pair.
pub const RENEW_SESSION_PATH: &str = "/session/token-request";
/// Query submission endpoint.
pub const QUERY_PATH: &str = "/queries/v1/query-request";

/// Application status codes are six digits; longer values are truncated.
const QUERY_CODE_LEN: usize = 6;

/// One connection to the query service.
///
/// A connection is owned by exactly one logical caller; it carries no
/// internal locking, so operations on it must be serialized. Independent
/// connections share no mutable state and may run in parallel.
pub struct Connection {
    http: reqwest::Client,
    params: ConnectParams,
    options: ClientOptions,
    codes: StatusCodes,
    accept: AcceptType,
    session_token: String,
    master_token: String,
    direct_query_token: Option<String>,
    headers: HeaderMap,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("params", &self.params)
            .field("options", &self.options)
            .field("session_token", &"<redacted>")
            .field("master_token", &"<redacted>")
            .finish()
    }
}

impl Connection {
    /// Creates a connection, building an HTTP client from `options`.
    pub fn new(params: ConnectParams, options: ClientOptions, codes: StatusCodes) -> Result<Self> {
        let http = transport::build_http_client(&options)?;
        Self::with_http_client(http, params, options, codes)
    }

    /// Creates a connection over an injected HTTP client. Useful for tests
    /// and for sharing one client's connection pool across connections.
    pub fn with_http_client(
        http: reqwest::Client,
        params: ConnectParams,
        options: ClientOptions,
        codes: StatusCodes,
    ) -> Result<Self> {
        let mut connection = Self {
            http,
            params,
            options,
            codes,
            accept: AcceptType::Vendor,
            session_token: String::new(),
            master_token: String::new(),
            direct_query_token: None,
            headers: HeaderMap::new(),
        };
        connection.rebuild_headers()?;
        Ok(connection)
    }

    /// Switches the media type requested from the service.
    pub fn with_accept_type(mut self, accept: AcceptType) -> Result<Self> {
        self.accept = accept;
        self.rebuild_headers()?;
        Ok(self)
    }

    /// Resumes an existing session from a previously issued token pair.
    pub fn with_session_tokens(
        mut self,
        session_token: impl Into<String>,
        master_token: impl Into<String>,
    ) -> Result<Self> {
        self.session_token = session_token.into();
        self.master_token = master_token.into();
        self.rebuild_headers()?;
        Ok(self)
    }

    /// Authenticates with a direct-query token instead of a session. Session
    /// renewal is refused in this mode.
    pub fn with_direct_query_token(mut self, token: impl Into<String>) -> Result<Self> {
        self.direct_query_token = Some(token.into());
        self.rebuild_headers()?;
        Ok(self)
    }

    /// Current session token, empty before [`Connection::open_session`].
    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Current master token, empty before [`Connection::open_session`].
    pub fn master_token(&self) -> &str {
        &self.master_token
    }

    /// Opens a session: POSTs the auth payload anonymously and stores the
    /// returned token pair.
    pub async fn open_session(&mut self, auth: &AuthRequest) -> Result<Value> {
        let body = serialize_body(auth)?;
        let headers = headers::anonymous(self.accept);
        let target = RequestTarget::new(&self.params, LOGIN_PATH)
            .with_params(vec![("request_id".to_owned(), new_request_id())]);
        let json = transport::perform(
            &self.http,
            HttpMethod::Post,
            AttemptUrl::Encoded(&target),
            &headers,
            Some(&body),
            &self.options,
            false,
        )
        .await?;

        let success =
            contract::copy_bool(&json, "success").map_err(|err| err.into_error("login success"))?;
        if !success {
            return Err(GlacierDbError::BadResponse(
                "login request returned as being unsuccessful".to_owned(),
            ));
        }
        let data = token_data(&json, "login")?;
        let (session_token, master_token) = parse_tokens(data)?;
        self.store_tokens(session_token, master_token)?;
        debug!("session opened");
        Ok(json)
    }

    /// Submits a SQL statement and drives it to a terminal response,
    /// renewing the session and polling as needed.
    pub async fn submit_query(&mut self, sql_text: &str, sequence_id: i64) -> Result<Value> {
        let request_id = new_request_id();
        let body = serialize_body(
            &QueryRequest::new(sql_text, sequence_id).with_request_id(request_id.clone()),
        )?;
        self.request(
            HttpMethod::Post,
            QUERY_PATH,
            vec![("request_id".to_owned(), request_id)],
            Some(&body),
        )
        .await
    }

    /// Issues one logical request and dispatches on the response's
    /// application status code:
    ///
    /// - empty or absent code: terminal success, payload returned;
    /// - session-expired code: renew, then re-issue this request once;
    /// - in-progress code: follow the returned result URL until terminal;
    /// - any other code: payload returned to the caller unmodified.
    pub async fn request(
        &mut self,
        method: HttpMethod,
        path: &str,
        url_params: Vec<(String, String)>,
        body: Option<&str>,
    ) -> Result<Value> {
        let target = RequestTarget::new(&self.params, path).with_params(url_params);
        let mut json = self.perform(method, &target, body).await?;
        let mut renewed = false;
        loop {
            let code = response_code(&json)?;
            if code.is_empty() {
                return Ok(json);
            }
            if code == self.codes.session_expired {
                if renewed {
                    return Err(GlacierDbError::BadResponse(
                        "session expired again after renewal".to_owned(),
                    ));
                }
                renewed = true;
                self.renew_session().await?;
                json = self.perform(method, &target, body).await?;
                continue;
            }
            if self.codes.is_in_progress(&code) {
                return self.poll_result(json).await;
            }
            return Ok(json);
        }
    }

    /// Downloads one bulk result chunk from a server-supplied URL. The
    /// concatenated chunk payloads come back as a single JSON array.
    pub async fn download_chunk(&self, url: &str) -> Result<Value> {
        transport::perform(
            &self.http,
            HttpMethod::Get,
            AttemptUrl::Absolute(url),
            &self.headers,
            None,
            &self.options,
            true,
        )
        .await
    }

    async fn perform(
        &self,
        method: HttpMethod,
        target: &RequestTarget,
        body: Option<&str>,
    ) -> Result<Value> {
        transport::perform(
            &self.http,
            method,
            AttemptUrl::Encoded(target),
            &self.headers,
            body,
            &self.options,
            false,
        )
        .await
    }

    /// Follows the result URL of an in-progress response until the
    /// operation terminates or the follow-up budget runs out. A session
    /// expiry mid-poll triggers a renewal and the same follow-up is
    /// re-issued with the rebuilt header.
    async fn poll_result(&mut self, first: Value) -> Result<Value> {
        let mut result_url = extract_result_url(&first)?;
        let mut renewed = false;
        let mut follow_ups = 0usize;
        trace!("ping pong starting");
        loop {
            if follow_ups >= self.options.max_poll_iterations {
                return Err(GlacierDbError::Retry {
                    status: None,
                    message: format!(
                        "operation still in progress after {follow_ups} follow-up requests"
                    ),
                });
            }
            follow_ups += 1;

            let target = RequestTarget::new(&self.params, result_url.clone());
            let json = self.perform(HttpMethod::Get, &target, None).await?;
            let code = response_code(&json)?;
            if code.is_empty() {
                return Ok(json);
            }
            if code == self.codes.session_expired {
                if renewed {
                    return Err(GlacierDbError::BadResponse(
                        "session expired again after renewal".to_owned(),
                    ));
                }
                renewed = true;
                self.renew_session().await?;
                continue;
            }
            if self.codes.is_in_progress(&code) {
                result_url = extract_result_url(&json)?;
                continue;
            }
            return Ok(json);
        }
    }

    /// Exchanges the current session token for a fresh pair using the
    /// master token. Both tokens are parsed before either is stored, so a
    /// failed renewal leaves the connection's tokens untouched.
    async fn renew_session(&mut self) -> Result<()> {
        if self.direct_query_token.is_some() {
            return Err(GlacierDbError::BadRequest(
                "cannot renew a session while a direct query token is in use".to_owned(),
            ));
        }
        if self.master_token.is_empty() {
            return Err(GlacierDbError::BadRequest(
                "missing master token when trying to renew session; \
                 was the connection properly set up?"
                    .to_owned(),
            ));
        }
        debug!("renewing session, master token: ******");

        let headers = headers::session_token(&self.master_token, AcceptType::Vendor)?;
        let body = serialize_body(&RenewRequest::new(self.session_token.as_str()))?;
        let target = RequestTarget::new(&self.params, RENEW_SESSION_PATH)
            .with_params(vec![("request_id".to_owned(), new_request_id())]);
        let json = transport::perform(
            &self.http,
            HttpMethod::Post,
            AttemptUrl::Encoded(&target),
            &headers,
            Some(&body),
            &self.options,
            false,
        )
        .await?;

        let success = contract::copy_bool(&json, "success")
            .map_err(|err| err.into_error("renew session success"))?;
        if !success {
            return Err(GlacierDbError::BadResponse(
                "session renewal returned as being unsuccessful".to_owned(),
            ));
        }
        let data = token_data(&json, "renewal")?;
        let (session_token, master_token) = parse_tokens(data)?;
        self.store_tokens(session_token, master_token)?;
        debug!("finished updating session");
        Ok(())
    }

    fn store_tokens(&mut self, session_token: String, master_token: String) -> Result<()> {
        self.session_token = session_token;
        self.master_token = master_token;
        self.rebuild_headers()
    }

    fn rebuild_headers(&mut self) -> Result<()> {
        self.headers = if let Some(token) = &self.direct_query_token {
            headers::direct_query_token(token, self.accept)?
        } else if !self.session_token.is_empty() {
            headers::session_token(&self.session_token, self.accept)?
        } else {
            headers::anonymous(self.accept)
        };
        Ok(())
    }
}

/// Reads the bounded `code` field. Absent, null, and empty codes all mean
/// terminal success.
fn response_code(json: &Value) -> Result<String> {
    let mut code = String::new();
    match contract::copy_string_bounded(&mut code, json, "code", QUERY_CODE_LEN) {
        Ok(()) | Err(FieldError::Missing) | Err(FieldError::Null) => Ok(code),
        Err(err) => Err(err.into_error("query code")),
    }
}

fn extract_result_url(json: &Value) -> Result<String> {
    let data = json.get("data").unwrap_or(&Value::Null);
    let mut url = String::new();
    contract::copy_string(&mut url, data, "getResultUrl")
        .map_err(|err| err.into_error("result url"))?;
    Ok(url)
}

fn token_data<'a>(json: &'a Value, what: &str) -> Result<&'a Value> {
    json.get("data")
        .filter(|value| value.is_object())
        .ok_or_else(|| GlacierDbError::BadJson(format!("no data object in {what} response")))
}

fn parse_tokens(data: &Value) -> Result<(String, String)> {
    let mut session_token = String::new();
    contract::copy_string(&mut session_token, data, "sessionToken")
        .map_err(|err| err.into_error("session token"))?;
    let mut master_token = String::new();
    contract::copy_string(&mut master_token, data, "masterToken")
        .map_err(|err| err.into_error("master token"))?;
    Ok((session_token, master_token))
}

fn serialize_body<T: serde::Serialize>(body: &T) -> Result<String> {
    serde_json::to_string(body)
        .map_err(|err| GlacierDbError::BadRequest(format!("unable to serialize request body: {err}")))
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_result_url, response_code, Connection};
    use crate::options::{ClientOptions, ConnectParams, StatusCodes};

    fn codes() -> StatusCodes {
        StatusCodes::new("390112", "333333", "333334")
    }

    #[test]
    fn absent_null_and_empty_codes_mean_success() {
        assert_eq!(response_code(&json!({})).expect("must read"), "");
        assert_eq!(response_code(&json!({ "code": null })).expect("must read"), "");
        assert_eq!(response_code(&json!({ "code": "" })).expect("must read"), "");
    }

    #[test]
    fn code_is_read_bounded() {
        let code = response_code(&json!({ "code": "390112-and-more" })).expect("must read");
        assert_eq!(code, "390112");
    }

    #[test]
    fn non_string_code_is_bad_json() {
        let err = response_code(&json!({ "code": 390112 })).expect_err("must fail");
        assert_eq!(err.code(), "BAD_JSON");
    }

    #[test]
    fn result_url_requires_data_object() {
        let url = extract_result_url(&json!({ "data": { "getResultUrl": "/queries/7/result" } }))
            .expect("must extract");
        assert_eq!(url, "/queries/7/result");

        let err = extract_result_url(&json!({})).expect_err("must fail");
        assert_eq!(err.code(), "BAD_JSON");
    }

    #[test]
    fn debug_redacts_tokens() {
        let connection = Connection::new(
            ConnectParams::for_account("xy12345"),
            ClientOptions::default(),
            codes(),
        )
        .expect("must build")
        .with_session_tokens("session-secret", "master-secret")
        .expect("must set tokens");

        let debug = format!("{connection:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("session-secret"));
        assert!(!debug.contains("master-secret"));
    }

    #[test]
    fn resumed_session_exposes_tokens() {
        let connection = Connection::new(
            ConnectParams::for_account("xy12345"),
            ClientOptions::default(),
            codes(),
        )
        .expect("must build")
        .with_session_tokens("ses", "mas")
        .expect("must set tokens");
        assert_eq!(connection.session_token(), "ses");
        assert_eq!(connection.master_token(), "mas");
    }
}
