//! HTTP session for the switch web interface.
//!
//! Wraps a cookie-keeping `reqwest::Client` bound to one switch address so
//! drivers only deal with page paths. Transport failures are mapped to
//! [`SwitchError::Transport`] tagged with the primitive being executed.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, trace};

use prosafe_common::{SwitchError, SwitchResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of response bytes quoted in error messages.
const EXCERPT_LIMIT: usize = 1024;

/// Prepends `http://` unless the address already carries a scheme, and drops
/// a trailing slash.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Shortens a response body for inclusion in an error message.
pub fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_LIMIT {
        return text.to_string();
    }
    let mut end = EXCERPT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &text[..end], text.len())
}

/// Form fields in submission order; keys may repeat.
pub type FormFields = Vec<(String, String)>;

/// Cookie-keeping HTTP session bound to one switch.
#[derive(Debug, Clone)]
pub struct SwitchSession {
    base: String,
    client: Client,
}

impl SwitchSession {
    /// Create a session for `address` with the given request timeout.
    pub fn new(address: &str, timeout: Duration) -> SwitchResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| SwitchError::transport("connect", e.to_string()))?;
        Ok(Self {
            base: normalize_address(address),
            client,
        })
    }

    /// Base URL of the switch.
    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn checked(response: reqwest::Result<Response>, operation: &str) -> SwitchResult<Response> {
        let response = response.map_err(|e| SwitchError::transport(operation, e.to_string()))?;
        response
            .error_for_status()
            .map_err(|e| SwitchError::transport(operation, e.to_string()))
    }

    /// GET a page and return its body.
    pub async fn get_text(&self, path: &str, operation: &str) -> SwitchResult<String> {
        debug!(path = %path, operation = %operation, "GET");
        let response = Self::checked(self.client.get(self.url(path)).send().await, operation)?;
        let body = response
            .text()
            .await
            .map_err(|e| SwitchError::transport(operation, e.to_string()))?;
        trace!(path = %path, bytes = body.len(), "GET complete");
        Ok(body)
    }

    /// GET a binary resource.
    pub async fn get_bytes(&self, path: &str, operation: &str) -> SwitchResult<Vec<u8>> {
        debug!(path = %path, operation = %operation, "GET (binary)");
        let response = Self::checked(self.client.get(self.url(path)).send().await, operation)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SwitchError::transport(operation, e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// POST an urlencoded form and return the response body.
    pub async fn post_form(
        &self,
        path: &str,
        fields: &FormFields,
        operation: &str,
    ) -> SwitchResult<String> {
        debug!(path = %path, operation = %operation, fields = fields.len(), "POST");
        let response = Self::checked(
            self.client.post(self.url(path)).form(fields).send().await,
            operation,
        )?;
        response
            .text()
            .await
            .map_err(|e| SwitchError::transport(operation, e.to_string()))
    }

    /// POST a multipart form carrying one file.
    pub async fn post_file(
        &self,
        path: &str,
        fields: &FormFields,
        file_field: &str,
        content: Vec<u8>,
        operation: &str,
    ) -> SwitchResult<String> {
        debug!(path = %path, operation = %operation, bytes = content.len(), "POST (multipart)");
        let mut form = Form::new();
        for (key, value) in fields {
            form = form.text(key.clone(), value.clone());
        }
        form = form.part(
            file_field.to_string(),
            Part::bytes(content).file_name(file_field.to_string()),
        );
        let response = Self::checked(
            self.client.post(self.url(path)).multipart(form).send().await,
            operation,
        )?;
        response
            .text()
            .await
            .map_err(|e| SwitchError::transport(operation, e.to_string()))
    }
}

/// Builds a [`FormFields`] collection from key-value pairs.
#[macro_export]
macro_rules! form {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}
