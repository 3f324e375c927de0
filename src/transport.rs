//! Transport adapter: hands a rendered message to an SMTP transfer client.
//!
//! The SMTP conversation itself (EHLO, AUTH, MAIL FROM, RCPT TO, DATA) is
//! owned by the transfer client. This module only describes what to send
//! and where, and turns the client's answer into a [`TransferResponse`].

use std::time::Duration;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{SmtpTransport, Transport};
use url::Url;

use crate::errors::{MailError, Result};
use crate::logger::Logger;
use crate::payload::Payload;

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plaintext for the whole session.
    None,
    /// Plaintext connect, then a mandatory STARTTLS upgrade.
    StartTls,
    /// TLS from the first byte (`smtps`).
    Implicit,
}

impl TlsMode {
    pub fn is_secure(self) -> bool {
        self != TlsMode::None
    }
}

/// Where to connect, resolved from an `smtp://` or `smtps://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
}

impl Endpoint {
    pub const SMTP_PORT: u16 = 25;
    pub const SMTPS_PORT: u16 = 465;

    /// Parses `url`; `starttls` requests an upgrade on a plaintext scheme.
    pub fn parse(url: &str, starttls: bool) -> Result<Self> {
        let parsed =
            Url::parse(url).map_err(|e| MailError::InvalidProtocol(format!("{}: {}", url, e)))?;
        let (default_port, tls) = match parsed.scheme() {
            "smtp" if starttls => (Self::SMTP_PORT, TlsMode::StartTls),
            "smtp" => (Self::SMTP_PORT, TlsMode::None),
            "smtps" => (Self::SMTPS_PORT, TlsMode::Implicit),
            other => return Err(MailError::InvalidProtocol(format!("scheme '{}'", other))),
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MailError::InvalidProtocol(format!("{}: missing host", url)))?
            .to_string();
        Ok(Self {
            host,
            port: parsed.port().unwrap_or(default_port),
            tls,
        })
    }
}

/// Everything the transfer client needs besides the body.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub endpoint: Endpoint,
    pub username: String,
    pub secret: String,
    pub mail_from: String,
    pub recipients: Vec<String>,
    pub connect_timeout: Duration,
    /// Logger of the send this request belongs to, at its effective level.
    pub logger: Logger,
}

/// Outcome of a completed round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferResponse {
    pub code: u16,
    pub header: String,
    pub body: String,
}

impl TransferResponse {
    pub fn new(code: u16, header: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            code,
            header: header.into(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Response standing in for a failure. Only [`MailError::Delivery`]
    /// keeps a server code; everything else reports code `0`.
    pub fn from_error(error: &MailError) -> Self {
        match error {
            MailError::Delivery { code, body } => Self::new(*code, code.to_string(), body.clone()),
            other => Self::new(0, other.code(), other.to_string()),
        }
    }

    /// `Ok(self)` for 2xx, otherwise a [`MailError::Delivery`] with the body as detail.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(MailError::Delivery {
                code: self.code,
                body: self.body,
            })
        }
    }
}

/// An SMTP-capable transfer client.
///
/// `Ok` means the server answered, whatever the code. `Err` means no answer
/// was obtained. Implementations may be called from any thread.
pub trait Transfer: Send + Sync {
    fn perform(&self, request: &TransferRequest, body: &mut Payload) -> Result<TransferResponse>;
}

/// Chunk size used when draining a payload into the SMTP client.
const UPLOAD_CHUNK: usize = 16 * 1024;

/// [`Transfer`] backed by lettre's blocking SMTP transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpTransfer;

impl SmtpTransfer {
    fn build_transport(request: &TransferRequest) -> Result<SmtpTransport> {
        let endpoint = &request.endpoint;
        let tls = match endpoint.tls {
            TlsMode::None => Tls::None,
            TlsMode::StartTls => Tls::Required(Self::tls_parameters(&endpoint.host)?),
            TlsMode::Implicit => Tls::Wrapper(Self::tls_parameters(&endpoint.host)?),
        };

        let mut builder = SmtpTransport::builder_dangerous(endpoint.host.as_str())
            .port(endpoint.port)
            .tls(tls)
            .timeout(Some(request.connect_timeout));
        if !request.username.is_empty() {
            builder = builder.credentials(SmtpCredentials::new(
                request.username.clone(),
                request.secret.clone(),
            ));
        }
        Ok(builder.build())
    }

    fn tls_parameters(host: &str) -> Result<TlsParameters> {
        TlsParameters::new(host.to_string())
            .map_err(|e| MailError::Transport(format!("TLS parameter error: {}", e)))
    }

    fn envelope(request: &TransferRequest) -> Result<Envelope> {
        let from = request
            .mail_from
            .parse()
            .map_err(|_| MailError::InvalidAddress(request.mail_from.clone()))?;
        let to = request
            .recipients
            .iter()
            .map(|r| r.parse().map_err(|_| MailError::InvalidAddress(r.clone())))
            .collect::<Result<Vec<_>>>()?;
        Envelope::new(Some(from), to).map_err(|e| MailError::InvalidAddress(e.to_string()))
    }
}

impl Transfer for SmtpTransfer {
    fn perform(&self, request: &TransferRequest, body: &mut Payload) -> Result<TransferResponse> {
        let envelope = Self::envelope(request)?;
        let transport = Self::build_transport(request)?;

        let logger = &request.logger;
        let mut raw = Vec::with_capacity(body.remaining());
        while let Some(chunk) = body.next_chunk(UPLOAD_CHUNK) {
            let pulled = chunk.len();
            raw.extend_from_slice(chunk);
            logger.debug(&format!("pulled {} bytes, {} remaining", pulled, body.remaining()));
        }

        match transport.send_raw(&envelope, &raw) {
            Ok(response) => {
                let lines: Vec<&str> = response.message().collect();
                Ok(TransferResponse::new(
                    parse_code(&response.code().to_string()),
                    format!("{} {}", response.code(), lines.first().copied().unwrap_or("")),
                    lines.join("\n"),
                ))
            }
            Err(e) => match e.status() {
                Some(code) => Ok(TransferResponse::new(
                    parse_code(&code.to_string()),
                    code.to_string(),
                    e.to_string(),
                )),
                None => Err(MailError::Transport(e.to_string())),
            },
        }
    }
}

fn parse_code(code: &str) -> u16 {
    code.trim().parse().unwrap_or(0)
}
