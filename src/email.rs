//! Message model, validation and MIME rendering.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};

use crate::errors::{MailError, Result};
use crate::logger::Logger;
use crate::mailer::Credentials;
use crate::utils::{
    encode_base64_lines, encode_header, encode_quoted_printable, fold_header, format_date,
    mime_parameter, quote_display_name, strip_line_breaks, BASE64_LINE_WIDTH, HEADER_LINE_WIDTH,
    QP_LINE_WIDTH,
};

/// Boundary used unless the caller sets another one on the message.
pub const DEFAULT_BOUNDARY: &str = "=_mime-mailer_9c1f3b7e4d2a";

/// Mailbox with an optional display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Address {
    #[serde(default)]
    pub name: String,
    pub address: String,
}

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            address: address.into(),
        }
    }

    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Header form: `"Name" <addr>`, or the bare address when unnamed. A name
    /// that needs RFC 2047 encoding is written as unquoted encoded-words.
    pub fn to_header(&self) -> String {
        if self.name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", quote_display_name(&self.name), self.address)
        }
    }

    /// Everything from the `@` onwards, without the `@`.
    pub fn domain(&self) -> Option<&str> {
        self.address
            .split_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Address::new(address)
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Address::new(address)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_header())
    }
}

fn join_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(Address::to_header)
        .collect::<Vec<_>>()
        .join(", ")
}

/// What to do with an attachment that cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentPolicy {
    /// Leave the attachment out and log a warning.
    #[default]
    Skip,
    /// Fail the send with [`MailError::InvalidBuffer`].
    Strict,
}

/// An email waiting to be sent.
///
/// Built empty around a set of credentials and filled in field by field.
/// Sending reads the current fields; nothing is cached between sends.
#[derive(Debug, Clone)]
pub struct Message<'a> {
    pub credentials: &'a Credentials,
    pub from: Address,
    pub reply_to: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachments: Vec<PathBuf>,
    pub boundary: String,
    pub attachment_policy: AttachmentPolicy,
    pub debug: bool,
}

/// The rendered byte stream plus the envelope it travels in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub message_id: String,
    pub envelope_from: String,
    /// To, then Cc, then Bcc addresses.
    pub recipients: Vec<String>,
    pub bytes: Vec<u8>,
}

impl<'a> Message<'a> {
    pub fn new(credentials: &'a Credentials) -> Self {
        Self {
            credentials,
            from: Address::default(),
            reply_to: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            text: String::new(),
            html: String::new(),
            attachments: Vec::new(),
            boundary: DEFAULT_BOUNDARY.to_string(),
            attachment_policy: AttachmentPolicy::default(),
            debug: false,
        }
    }

    /// Checks the fields a send needs, in a fixed order.
    pub fn validate(&self) -> Result<()> {
        if self.from.address.is_empty() {
            return Err(MailError::InvalidSender);
        }
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(MailError::InvalidRecipient);
        }
        if self.subject.is_empty() {
            return Err(MailError::InvalidSubject);
        }
        if self.text.is_empty() && self.html.is_empty() {
            return Err(MailError::InvalidContent);
        }
        Ok(())
    }

    /// Envelope recipients: To, Cc and Bcc addresses in that order.
    pub fn envelope_recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(|a| a.address.clone())
            .collect()
    }

    /// Renders with the current time and a fresh message id.
    pub fn render(&self, logger: &Logger) -> Result<RenderedMessage> {
        let now = Utc::now().fixed_offset();
        let id = uuid::Uuid::new_v4().to_string();
        self.render_with(&now, &id, logger)
    }

    /// Renders with a given date and id. Output depends only on the inputs and
    /// the attachment files.
    pub fn render_with(
        &self,
        date: &DateTime<FixedOffset>,
        unique_id: &str,
        logger: &Logger,
    ) -> Result<RenderedMessage> {
        self.validate()?;

        let attachments = self.load_attachments(logger)?;
        let message_id = format!(
            "<{}@{}>",
            unique_id,
            self.from.domain().unwrap_or("localhost")
        );

        let mut out = String::new();
        write_header(&mut out, "Date", &format_date(date));
        if !self.to.is_empty() {
            write_header(&mut out, "To", &join_addresses(&self.to));
        }
        write_header(&mut out, "From", &self.from.to_header());
        if !self.cc.is_empty() {
            write_header(&mut out, "Cc", &join_addresses(&self.cc));
        }
        if let Some(ref reply_to) = self.reply_to {
            write_header(&mut out, "Reply-To", &reply_to.to_header());
        }
        write_header(&mut out, "Message-ID", &message_id);
        write_header(&mut out, "Subject", &encode_header(&self.subject));
        write_header(&mut out, "MIME-Version", "1.0");

        if attachments.is_empty() {
            write_header(
                &mut out,
                "Content-Type",
                &format!("multipart/alternative; boundary=\"{}\"", self.boundary),
            );
            out.push_str("\r\n");
            self.write_bodies(&mut out, &self.boundary);
        } else {
            let alternative_boundary = format!("{}_alt", self.boundary);
            write_header(
                &mut out,
                "Content-Type",
                &format!("multipart/mixed; boundary=\"{}\"", self.boundary),
            );
            out.push_str("\r\n");
            out.push_str(&format!("--{}\r\n", self.boundary));
            write_header(
                &mut out,
                "Content-Type",
                &format!("multipart/alternative; boundary=\"{}\"", alternative_boundary),
            );
            out.push_str("\r\n");
            self.write_bodies(&mut out, &alternative_boundary);

            for attachment in &attachments {
                out.push_str(&format!("--{}\r\n", self.boundary));
                attachment.write_part(&mut out);
            }
            out.push_str(&format!("--{}--\r\n", self.boundary));
        }

        logger.debug(&format!(
            "rendered {} ({} bytes, {} attachment(s))",
            message_id,
            out.len(),
            attachments.len()
        ));

        Ok(RenderedMessage {
            message_id,
            envelope_from: self.from.address.clone(),
            recipients: self.envelope_recipients(),
            bytes: out.into_bytes(),
        })
    }

    /// Writes the text and HTML parts and closes `boundary`.
    fn write_bodies(&self, out: &mut String, boundary: &str) {
        for (body, content_type) in [(&self.text, "text/plain"), (&self.html, "text/html")] {
            if body.is_empty() {
                continue;
            }
            out.push_str(&format!("--{}\r\n", boundary));
            write_header(out, "Content-Type", &format!("{}; charset=\"UTF-8\"", content_type));
            write_header(out, "Content-Transfer-Encoding", "quoted-printable");
            out.push_str("\r\n");
            out.push_str(&encode_quoted_printable(body, QP_LINE_WIDTH));
            out.push_str("\r\n");
        }
        out.push_str(&format!("--{}--\r\n", boundary));
    }

    fn load_attachments(&self, logger: &Logger) -> Result<Vec<LoadedAttachment>> {
        let mut loaded = Vec::with_capacity(self.attachments.len());
        for path in &self.attachments {
            match LoadedAttachment::read(path) {
                Ok(attachment) => loaded.push(attachment),
                Err(e) => match self.attachment_policy {
                    AttachmentPolicy::Skip => {
                        logger.warn(&format!("skipping attachment {}: {}", path.display(), e));
                    }
                    AttachmentPolicy::Strict => {
                        return Err(MailError::InvalidBuffer {
                            path: path.clone(),
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }
        Ok(loaded)
    }
}

struct LoadedAttachment {
    filename: String,
    mime_type: String,
    content: Vec<u8>,
}

impl LoadedAttachment {
    fn read(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self {
            filename,
            mime_type,
            content,
        })
    }

    fn write_part(&self, out: &mut String) {
        write_header(
            out,
            "Content-Type",
            &format!("{}; {}", self.mime_type, mime_parameter("name", &self.filename)),
        );
        write_header(out, "Content-Transfer-Encoding", "base64");
        write_header(
            out,
            "Content-Disposition",
            &format!("attachment; {}", mime_parameter("filename", &self.filename)),
        );
        out.push_str("\r\n");
        out.push_str(&encode_base64_lines(&self.content, BASE64_LINE_WIDTH));
    }
}

/// Every header goes through here: line breaks in caller data are flattened
/// and long values are folded.
fn write_header(out: &mut String, name: &str, value: &str) {
    out.push_str(&fold_header(name, &strip_line_breaks(value), HEADER_LINE_WIDTH));
}
