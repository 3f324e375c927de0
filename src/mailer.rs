//! Mailer: renders a [`Message`] and hands it to a [`Transfer`].

use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::email::Message;
use crate::errors::{MailError, Result};
use crate::logger::{LogLevel, Logger};
use crate::payload::Payload;
use crate::transport::{Endpoint, SmtpTransfer, Transfer, TransferRequest, TransferResponse};

/// Endpoint and login for an SMTP server.
///
/// The URL scheme picks plaintext (`smtp://`) or implicit TLS (`smtps://`);
/// `upgrade_tls` asks for STARTTLS on a plaintext connection.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Credentials {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub upgrade_tls: bool,
}

impl Credentials {
    pub fn new(url: impl Into<String>, username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            secret: secret.into(),
            upgrade_tls: false,
        }
    }

    pub fn with_upgrade_tls(mut self, upgrade_tls: bool) -> Self {
        self.upgrade_tls = upgrade_tls;
        self
    }

    /// Reads `<PREFIX>_URL`, `<PREFIX>_USERNAME`, `<PREFIX>_PASSWORD` and
    /// `<PREFIX>_STARTTLS` (`1`/`true`/`yes`). Only the URL is required.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let var = |name: &str| std::env::var(format!("{}_{}", prefix, name)).ok();
        let url = var("URL")
            .ok_or_else(|| MailError::InvalidProtocol(format!("{}_URL is not set", prefix)))?;
        let upgrade_tls = var("STARTTLS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Ok(Self {
            url,
            username: var("USERNAME").unwrap_or_default(),
            secret: var("PASSWORD").unwrap_or_default(),
            upgrade_tls,
        })
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.url, self.upgrade_tls)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("secret", &"***")
            .field("upgrade_tls", &self.upgrade_tls)
            .finish()
    }
}

pub type SentHook = dyn Fn(&str, &TransferResponse) + Send + Sync;
pub type ErrorHook = dyn Fn(&MailError) + Send + Sync;

/// Optional observers for send outcomes. Not serialized.
#[derive(Default, Clone)]
pub struct MailerHooks {
    /// Called with the Message-ID and the server's answer after a 2xx reply.
    pub on_sent: Option<Arc<SentHook>>,
    /// Called with every failure, validation included.
    pub on_error: Option<Arc<ErrorHook>>,
}

impl std::fmt::Debug for MailerHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MailerHooks")
    }
}

/// Options to create a [`Mailer`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MailerOptions {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(skip)]
    pub hooks: MailerHooks,
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

impl Default for MailerOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            log_level: LogLevel::Info,
            hooks: MailerHooks::default(),
        }
    }
}

/// A send that passed validation and rendering, ready for the transfer client.
struct Prepared {
    message_id: String,
    request: TransferRequest,
    payload: Payload,
}

/// Sends messages through a [`Transfer`]. Cheap to clone; safe to share.
#[derive(Clone)]
pub struct Mailer {
    transfer: Arc<dyn Transfer>,
    connect_timeout: Duration,
    log_level: LogLevel,
    hooks: MailerHooks,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("connect_timeout", &self.connect_timeout)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Default for Mailer {
    fn default() -> Self {
        Self::new(MailerOptions::default())
    }
}

impl Mailer {
    /// Mailer using lettre's SMTP transport.
    pub fn new(options: MailerOptions) -> Self {
        Self::with_transfer(options, SmtpTransfer)
    }

    pub fn with_transfer(options: MailerOptions, transfer: impl Transfer + 'static) -> Self {
        Self {
            transfer: Arc::new(transfer),
            connect_timeout: Duration::from_millis(options.connect_timeout_ms),
            log_level: options.log_level,
            hooks: options.hooks,
        }
    }

    /// Sends and waits. Any non-2xx reply is a [`MailError::Delivery`].
    pub fn send(&self, message: &Message<'_>) -> Result<TransferResponse> {
        let prepared = match self.prepare(message) {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.report_failure(e)),
        };
        execute(self.transfer.as_ref(), &self.hooks, prepared)?.into_result()
    }

    /// Sends on a worker thread and always calls `handler(code, header, body)`
    /// exactly once from that thread. Failures without a server reply are
    /// reported with code `0`.
    pub fn send_with<F>(&self, message: &Message<'_>, handler: F) -> JoinHandle<()>
    where
        F: FnOnce(u16, &str, &str) + Send + 'static,
    {
        let prepared = self.prepare(message).map_err(|e| self.report_failure(e));
        let transfer = Arc::clone(&self.transfer);
        let hooks = self.hooks.clone();
        std::thread::spawn(move || {
            let response = prepared
                .and_then(|p| execute(transfer.as_ref(), &hooks, p))
                .unwrap_or_else(|e| TransferResponse::from_error(&e));
            handler(response.code, &response.header, &response.body);
        })
    }

    /// Sends on tokio's blocking pool. The future resolves once with the
    /// server's `(code, header, body)`; failures without a reply have code `0`.
    ///
    /// # Panics
    ///
    /// Validation and rendering happen on the caller, but the returned future
    /// panics when polled outside a tokio runtime.
    pub fn send_async(
        &self,
        message: &Message<'_>,
    ) -> impl Future<Output = TransferResponse> + Send + 'static {
        let prepared = self.prepare(message).map_err(|e| self.report_failure(e));
        let transfer = Arc::clone(&self.transfer);
        let hooks = self.hooks.clone();
        async move {
            let prepared = match prepared {
                Ok(prepared) => prepared,
                Err(e) => return TransferResponse::from_error(&e),
            };
            let joined =
                tokio::task::spawn_blocking(move || execute(transfer.as_ref(), &hooks, prepared))
                    .await;
            match joined {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => TransferResponse::from_error(&e),
                Err(e) => TransferResponse::from_error(&MailError::Transport(format!(
                    "transfer task failed: {}",
                    e
                ))),
            }
        }
    }

    fn logger_for(&self, endpoint: &Endpoint, debug: bool) -> Logger {
        let logger = Logger::new(
            self.log_level,
            format!("[mailer:{}:{}] ", endpoint.host, endpoint.port),
        );
        if debug {
            logger.with_level(LogLevel::Debug)
        } else {
            logger
        }
    }

    /// Validates, resolves the endpoint and renders. Nothing touches the network.
    fn prepare(&self, message: &Message<'_>) -> Result<Prepared> {
        message.validate()?;
        let credentials = message.credentials;
        let endpoint = credentials.endpoint()?;
        let logger = self.logger_for(&endpoint, message.debug);

        let rendered = message.render(&logger)?;
        logger.debug(&format!(
            "prepared {} for {} recipient(s), tls={:?}",
            rendered.message_id,
            rendered.recipients.len(),
            endpoint.tls
        ));

        Ok(Prepared {
            message_id: rendered.message_id,
            request: TransferRequest {
                endpoint,
                username: credentials.username.clone(),
                secret: credentials.secret.clone(),
                mail_from: rendered.envelope_from,
                recipients: rendered.recipients,
                connect_timeout: self.connect_timeout,
                logger,
            },
            payload: Payload::new(rendered.bytes),
        })
    }

    fn report_failure(&self, error: MailError) -> MailError {
        Logger::new(self.log_level, "[mailer] ").warn(&format!("send rejected: {}", error));
        if let Some(ref f) = self.hooks.on_error {
            f(&error);
        }
        error
    }
}

/// Runs the transfer and notifies hooks. A completed round trip is `Ok`
/// whatever its code.
fn execute(
    transfer: &dyn Transfer,
    hooks: &MailerHooks,
    mut prepared: Prepared,
) -> Result<TransferResponse> {
    let logger = &prepared.request.logger;
    logger.debug(&format!("uploading {} bytes", prepared.payload.len()));

    match transfer.perform(&prepared.request, &mut prepared.payload) {
        Ok(response) if response.is_success() => {
            logger.info(&format!("sent {} ({})", prepared.message_id, response.code));
            if let Some(ref f) = hooks.on_sent {
                f(&prepared.message_id, &response);
            }
            Ok(response)
        }
        Ok(response) => {
            logger.error(&format!(
                "server rejected {} ({}): {}",
                prepared.message_id, response.code, response.body
            ));
            if let Some(ref f) = hooks.on_error {
                f(&MailError::Delivery {
                    code: response.code,
                    body: response.body.clone(),
                });
            }
            Ok(response)
        }
        Err(e) => {
            logger.error(&format!("transfer of {} failed: {}", prepared.message_id, e));
            if let Some(ref f) = hooks.on_error {
                f(&e);
            }
            Err(e)
        }
    }
}
