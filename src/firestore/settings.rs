//! Connection settings for the Firestore client

use std::time::Duration;

use crate::error::FirestoreError;

/// Database id used when none is configured
pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// Production Firestore host
pub const DEFAULT_HOST: &str = "firestore.googleapis.com";

/// Settings for connecting a [`Client`](super::Client)
#[derive(Debug, Clone)]
pub struct Settings {
    /// Google Cloud project id
    pub project_id: String,

    /// Database id within the project
    ///
    /// Default: "(default)"
    pub database_id: String,

    /// Host (and optional port) of the Firestore backend
    ///
    /// Default: "firestore.googleapis.com"
    pub host: String,

    /// Whether to use TLS for the gRPC channel
    ///
    /// Default: true
    pub ssl_enabled: bool,

    /// OAuth2 or Firebase ID token sent as a bearer token on every RPC
    pub access_token: Option<String>,

    /// Per-request timeout
    ///
    /// Default: 30 seconds
    pub timeout: Duration,

    /// Timeout for establishing the connection
    ///
    /// Default: 10 seconds
    pub connect_timeout: Duration,
}

impl Settings {
    /// Settings for a project on the production backend
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: DEFAULT_DATABASE_ID.to_string(),
            host: DEFAULT_HOST.to_string(),
            ssl_enabled: true,
            access_token: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Settings for the local Firestore emulator at `host` (e.g. "localhost:8080")
    ///
    /// The emulator accepts the special `owner` token, which bypasses
    /// security rules.
    pub fn emulator(project_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ssl_enabled: false,
            access_token: Some("owner".to_string()),
            ..Self::new(project_id)
        }
    }

    /// Read settings from the environment
    ///
    /// - `FIRESTORE_PROJECT_ID` (or `GOOGLE_CLOUD_PROJECT`): required
    /// - `FIRESTORE_DATABASE_ID`: optional
    /// - `FIRESTORE_ACCESS_TOKEN`: optional bearer token
    /// - `FIRESTORE_EMULATOR_HOST`: when set, connect to the emulator
    pub fn from_env() -> Result<Self, FirestoreError> {
        let project_id = std::env::var("FIRESTORE_PROJECT_ID")
            .or_else(|_| std::env::var("GOOGLE_CLOUD_PROJECT"))
            .map_err(|_| {
                FirestoreError::InvalidArgument(
                    "FIRESTORE_PROJECT_ID or GOOGLE_CLOUD_PROJECT must be set".to_string(),
                )
            })?;

        let mut settings = match std::env::var("FIRESTORE_EMULATOR_HOST") {
            Ok(host) if !host.is_empty() => Self::emulator(project_id, host),
            _ => Self::new(project_id),
        };
        if let Ok(database_id) = std::env::var("FIRESTORE_DATABASE_ID") {
            settings.database_id = database_id;
        }
        if let Ok(token) = std::env::var("FIRESTORE_ACCESS_TOKEN") {
            settings.access_token = Some(token);
        }
        Ok(settings)
    }

    /// Use a different database id
    pub fn with_database(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = database_id.into();
        self
    }

    /// Send `token` as the bearer token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// `projects/{project}/databases/{database}`
    pub fn database_path(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database_id)
    }

    pub(crate) fn endpoint_uri(&self) -> String {
        let scheme = if self.ssl_enabled { "https" } else { "http" };
        format!("{}://{}", scheme, self.host)
    }

    /// Host name without the port, used for TLS server name checks
    pub(crate) fn domain_name(&self) -> &str {
        self.host.split(':').next().unwrap_or(&self.host)
    }
}
