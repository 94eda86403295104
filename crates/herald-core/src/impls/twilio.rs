//! TwilioSender - WhatsApp messages through the Twilio REST API.
//!
//! Credentials are read from `SharedCredentials` on every send, so the
//! operator can replace them while the dispatcher is running.

use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::errors::{CredentialError, SendError};
use crate::ports::{DeliveryId, MessageSender, OutboundMessage};

pub const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

const API_VERSION: &str = "2010-04-01";
const WHATSAPP_PREFIX: &str = "whatsapp:";
const MIN_AUTH_TOKEN_LEN: usize = 20;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static ACCOUNT_SID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^AC[0-9a-fA-F]{32}$").unwrap());

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender, `whatsapp:+<number>`.
    pub from: String,
}

impl TwilioCredentials {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into().trim().to_string(),
            auth_token: auth_token.into().trim().to_string(),
            from: from.into().trim().to_string(),
        }
    }

    /// Shape checks only; nothing is sent.
    pub fn validate(&self) -> Result<(), CredentialError> {
        let mut problems = Vec::new();
        if !ACCOUNT_SID.is_match(&self.account_sid) {
            problems.push(
                "invalid Twilio Account SID (must start with 'AC' + 32 hex chars)".to_string(),
            );
        }
        if self.auth_token.len() < MIN_AUTH_TOKEN_LEN {
            problems.push("Twilio Auth Token looks too short".to_string());
        }
        if !self.from.starts_with(WHATSAPP_PREFIX) {
            problems.push(
                "From WhatsApp number must start with 'whatsapp:' (e.g. whatsapp:+1415XXXXXXX)"
                    .to_string(),
            );
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(CredentialError(problems))
        }
    }
}

impl fmt::Debug for TwilioCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from", &self.from)
            .finish()
    }
}

/// Credentials set by the operator and read at send time.
#[derive(Debug, Default)]
pub struct SharedCredentials {
    inner: RwLock<Option<TwilioCredentials>>,
}

impl SharedCredentials {
    pub fn new(credentials: Option<TwilioCredentials>) -> Self {
        Self {
            inner: RwLock::new(credentials),
        }
    }

    /// Validate and store. Invalid credentials are rejected and the old ones kept.
    pub fn set(&self, credentials: TwilioCredentials) -> Result<(), CredentialError> {
        credentials.validate()?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(credentials);
        Ok(())
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<TwilioCredentials> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Prefix a canonical phone with the WhatsApp channel marker.
pub fn whatsapp_address(phone: &str) -> String {
    if phone.starts_with(WHATSAPP_PREFIX) {
        phone.to_string()
    } else {
        format!("{WHATSAPP_PREFIX}{phone}")
    }
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    code: Option<i64>,
}

pub struct TwilioSender {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Arc<SharedCredentials>,
}

impl TwilioSender {
    pub fn new(credentials: Arc<SharedCredentials>) -> Result<Self, SendError> {
        Self::with_base_url(credentials, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        credentials: Arc<SharedCredentials>,
        base_url: impl Into<String>,
    ) -> Result<Self, SendError> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| SendError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!(
            "{}/{API_VERSION}/Accounts/{account_sid}/Messages.json",
            self.base_url
        )
    }
}

#[async_trait]
impl MessageSender for TwilioSender {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryId, SendError> {
        let credentials = self
            .credentials
            .get()
            .ok_or_else(|| SendError::NotConfigured("no Twilio credentials set".to_string()))?;

        let to = whatsapp_address(&message.to);
        let mut params = vec![
            ("From", credentials.from.as_str()),
            ("To", to.as_str()),
            ("Body", message.body.as_str()),
        ];
        if let Some(media) = &message.media {
            params.push(("MediaUrl", media.as_str()));
        }

        debug!(to = %to, has_media = message.media.is_some(), "posting message to Twilio");

        let response = self
            .http_client
            .post(self.messages_url(&credentials.account_sid))
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorBody>(&error_text) {
                Ok(ApiErrorBody {
                    message: Some(message),
                    code: Some(code),
                }) => format!("{message} (code {code})"),
                Ok(ApiErrorBody {
                    message: Some(message),
                    ..
                }) => message,
                _ => error_text,
            };
            return Err(SendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let resource: MessageResource = response
            .json()
            .await
            .map_err(|e| SendError::Transport(format!("unreadable Twilio response: {e}")))?;

        info!(sid = %resource.sid, to = %to, "Twilio accepted message");
        Ok(resource.sid)
    }
}
