//! Request bodies sent to the query service.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

/// `requestType` value for a session renewal.
pub const REQUEST_TYPE_RENEW: &str = "RENEW";

/// Body of a session renewal POST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub old_session_token: String,
    pub request_type: String,
}

impl RenewRequest {
    pub fn new(old_session_token: impl Into<String>) -> Self {
        Self {
            old_session_token: old_session_token.into(),
            request_type: REQUEST_TYPE_RENEW.to_owned(),
        }
    }
}

/// Body of a login POST. The service expects the payload wrapped in a
/// `data` envelope.
#[derive(Debug, Serialize)]
pub struct AuthRequest {
    pub data: AuthData,
}

impl AuthRequest {
    pub fn new(account_name: impl Into<String>, login_name: impl Into<String>) -> Self {
        Self {
            data: AuthData {
                client_app_id: env!("CARGO_PKG_NAME").to_owned(),
                client_app_version: env!("CARGO_PKG_VERSION").to_owned(),
                account_name: account_name.into(),
                login_name: login_name.into(),
                password: None,
                client_environment: ClientEnvironment::current(),
                session_parameters: SessionParameters::default(),
            },
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.data.password = Some(password.into());
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AuthData {
    pub client_app_id: String,
    pub client_app_version: String,
    pub account_name: String,
    pub login_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub client_environment: ClientEnvironment,
    pub session_parameters: SessionParameters,
}

impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthData")
            .field("client_app_id", &self.client_app_id)
            .field("client_app_version", &self.client_app_version)
            .field("account_name", &self.account_name)
            .field("login_name", &self.login_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("client_environment", &self.client_environment)
            .field("session_parameters", &self.session_parameters)
            .finish()
    }
}

/// Client platform details reported at login.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientEnvironment {
    pub application: String,
    pub os: String,
    pub os_version: String,
}

impl ClientEnvironment {
    pub fn current() -> Self {
        Self {
            application: env!("CARGO_PKG_NAME").to_owned(),
            os: std::env::consts::OS.to_owned(),
            os_version: std::env::consts::ARCH.to_owned(),
        }
    }
}

/// Session defaults requested at login. The service expects booleans in
/// string form here.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SessionParameters {
    #[serde(serialize_with = "bool_as_string")]
    pub autocommit: bool,
    pub timezone: String,
}

impl Default for SessionParameters {
    fn default() -> Self {
        Self {
            autocommit: true,
            timezone: "UTC".to_owned(),
        }
    }
}

fn bool_as_string<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "true" } else { "false" })
}

/// Body of a query submission POST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub sql_text: String,
    pub async_exec: bool,
    pub sequence_id: i64,
    /// Submission time in unix milliseconds.
    pub query_submission_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl QueryRequest {
    pub fn new(sql_text: impl Into<String>, sequence_id: i64) -> Self {
        let submission_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self {
            sql_text: sql_text.into(),
            async_exec: false,
            sequence_id,
            query_submission_time: submission_time,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
