//! Error types for the mailer.

use std::path::PathBuf;

use thiserror::Error;

/// Every way composing or sending a message can fail.
///
/// Validation variants are raised before any network activity. `Delivery` is
/// raised only after the server answered; `Transport` means no answer arrived.
#[derive(Error, Debug)]
pub enum MailError {
    /// The subject is empty.
    #[error("Subject must not be empty")]
    InvalidSubject,

    /// The From address is empty.
    #[error("Sender address must not be empty")]
    InvalidSender,

    /// None of To, Cc or Bcc holds an address.
    #[error("At least one To, Cc or Bcc recipient is required")]
    InvalidRecipient,

    /// Both text and HTML bodies are empty.
    #[error("At least one of text or html must be provided")]
    InvalidContent,

    /// The endpoint URL is unparsable or its scheme is not smtp/smtps.
    #[error("Unsupported endpoint: {0}")]
    InvalidProtocol(String),

    /// A mailbox could not be used as an envelope address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// An attachment could not be read (strict attachment policy only).
    #[error("Failed to read attachment {}: {reason}", path.display())]
    InvalidBuffer { path: PathBuf, reason: String },

    /// The server answered outside the 2xx range.
    #[error("Delivery failed ({code}): {body}")]
    Delivery { code: u16, body: String },

    /// The transfer never completed a round trip.
    #[error("{0}")]
    Transport(String),
}

impl MailError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            MailError::InvalidSubject => "INVALID_SUBJECT",
            MailError::InvalidSender => "INVALID_SENDER",
            MailError::InvalidRecipient => "INVALID_RECIPIENT",
            MailError::InvalidContent => "INVALID_CONTENT",
            MailError::InvalidProtocol(_) => "INVALID_PROTOCOL",
            MailError::InvalidAddress(_) => "INVALID_ADDRESS",
            MailError::InvalidBuffer { .. } => "INVALID_BUFFER",
            MailError::Delivery { .. } => "DELIVERY_FAILED",
            MailError::Transport(_) => "CONNECTION_FAILED",
        }
    }

    /// `true` when the error was raised before any network activity.
    pub fn is_validation(&self) -> bool {
        !matches!(self, MailError::Delivery { .. } | MailError::Transport(_))
    }
}

pub type Result<T, E = MailError> = std::result::Result<T, E>;
