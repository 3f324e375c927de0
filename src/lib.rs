//! mime-mailer: compose MIME email messages and send them over SMTP.
//!
//! A [`Message`] is rendered into an RFC 5322 / MIME byte stream and handed,
//! through a pull-based [`Payload`], to a [`Transfer`] client that runs the
//! SMTP conversation. The default client is lettre's SMTP transport.

pub mod email;
pub mod errors;
pub mod logger;
pub mod mailer;
pub mod payload;
pub mod transport;
pub mod utils;

// Re-exports
pub use email::{Address, AttachmentPolicy, Message, RenderedMessage, DEFAULT_BOUNDARY};
pub use errors::{MailError, Result};
pub use logger::{LogLevel, Logger};
pub use mailer::{Credentials, ErrorHook, Mailer, MailerHooks, MailerOptions, SentHook};
pub use payload::Payload;
pub use transport::{Endpoint, SmtpTransfer, TlsMode, Transfer, TransferRequest, TransferResponse};
pub use utils::{encode_base64_lines, encode_header, encode_quoted_printable, format_date};
