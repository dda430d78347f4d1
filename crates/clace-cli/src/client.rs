// crates/clace-cli/src/client.rs
// ============================================================================
// Module: Control API Client
// Description: Thin `reqwest` wrapper over `/_clace/*` (spec.md §6.1).
// Purpose: Give every subcommand the same auth/TLS handling and error
//          mapping instead of re-deriving it per command.
// Dependencies: reqwest, serde_json, thiserror
// ============================================================================

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Connection details shared by every control-API call.
pub struct ClientConfig {
    /// Base server URI, e.g. `https://localhost:25223`.
    pub server_uri: String,
    /// Admin Basic Auth username.
    pub admin_user: String,
    /// Admin Basic Auth password.
    pub admin_password: String,
    /// Skip TLS certificate verification (self-signed dev servers).
    pub skip_cert_check: bool,
}

/// Errors talking to the control API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP client itself failed (DNS, TLS, connection reset, ...).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server responded with a `{ code, message }` error body.
    #[error("server error ({code}): {message}")]
    Server {
        /// HTTP status code.
        code: u16,
        /// Error message from the response body.
        message: String,
    },
}

/// A minimal control-API HTTP client.
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: String,
}

impl Client {
    /// Builds a client from connection settings.
    ///
    /// # Errors
    /// Returns [`ClientError::Transport`] if the TLS backend fails to
    /// initialize.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.skip_cert_check)
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.server_uri.trim_end_matches('/'))
    }

    async fn handle<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let message = response
                .json::<ErrorBody>()
                .await
                .map_or_else(|_| status.to_string(), |body| body.message);
            Err(ClientError::Server {
                code: status.as_u16(),
                message,
            })
        }
    }

    /// Issues a `GET` request and decodes the JSON response body.
    ///
    /// # Errors
    /// Returns [`ClientError`] on a transport failure or a non-2xx
    /// response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .http
            .get(self.url(path))
            .basic_auth(&self.config.admin_user, Some(&self.config.admin_password))
            .send()
            .await?;
        Self::handle(response).await
    }

    /// Issues a `POST` request with a JSON body and decodes the JSON
    /// response body.
    ///
    /// # Errors
    /// Returns [`ClientError`] on a transport failure or a non-2xx
    /// response.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let response = self
            .http
            .post(self.url(path))
            .basic_auth(&self.config.admin_user, Some(&self.config.admin_password))
            .json(body)
            .send()
            .await?;
        Self::handle(response).await
    }

    /// Issues a `DELETE` request, discarding any response body.
    ///
    /// # Errors
    /// Returns [`ClientError`] on a transport failure or a non-2xx
    /// response.
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(path))
            .basic_auth(&self.config.admin_user, Some(&self.config.admin_password))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let message = response
                .json::<ErrorBody>()
                .await
                .map_or_else(|_| status.to_string(), |body| body.message);
            Err(ClientError::Server {
                code: status.as_u16(),
                message,
            })
        }
    }
}
