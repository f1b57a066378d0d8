//! Outbound pipeline: wrap an artifact into a two-part mail and submit it.

pub mod transport;

pub use transport::{MailTransport, SmtpSubmitter};

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use tracing::{error, info, warn};

use crate::artifact::{Artifact, Processed, Route};
use crate::config::{DEFAULT_FILENAME, OutboundConfig};
use crate::error::{Error, Result, SendError};
use crate::inbound::locator::OCTET_STREAM;

/// Everything needed to assemble one message.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Comma-separated recipient list.
    pub recipients: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub filename: String,
    pub content: Vec<u8>,
}

impl OutboundRequest {
    pub fn from_artifact(config: &OutboundConfig, artifact: &Artifact) -> Self {
        Self {
            recipients: config.recipients.clone(),
            from: config.from.clone(),
            subject: config.subject.clone(),
            body: config.text.clone(),
            filename: resolve_filename(config.force_filename.as_deref(), artifact.filename()),
            content: artifact.content.clone(),
        }
    }
}

/// What a send did with the recipient list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub delivered_to: Vec<String>,
    /// Entries that did not parse as an address and were left out.
    pub dropped: Vec<String>,
}

/// Forced override if non-blank, then the carried filename, then the default.
pub fn resolve_filename(forced: Option<&str>, carried: Option<&str>) -> String {
    forced
        .filter(|f| !f.trim().is_empty())
        .or(carried.filter(|f| !f.is_empty()))
        .unwrap_or(DEFAULT_FILENAME)
        .to_string()
}

/// Parse each comma-separated entry on its own. Unparseable entries are
/// returned separately instead of failing the whole list.
pub fn parse_recipients(raw: &str) -> (Vec<Mailbox>, Vec<String>) {
    let mut parsed = Vec::new();
    let mut dropped = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.parse::<Mailbox>() {
            Ok(mailbox) => parsed.push(mailbox),
            Err(e) => {
                warn!(recipient = %entry, error = %e, "Dropping unparseable recipient");
                dropped.push(entry.to_string());
            }
        }
    }
    (parsed, dropped)
}

/// Assemble the message: a plain-text part followed by the attachment.
pub fn build_message(request: &OutboundRequest) -> std::result::Result<(Message, SendReport), SendError> {
    let from: Mailbox = request
        .from
        .parse()
        .map_err(|e: lettre::address::AddressError| SendError::InvalidSender {
            address: request.from.clone(),
            reason: e.to_string(),
        })?;

    let (recipients, dropped) = parse_recipients(&request.recipients);
    if recipients.is_empty() {
        return Err(SendError::NoRecipients(request.recipients.clone()));
    }

    let content_type =
        ContentType::parse(OCTET_STREAM).map_err(|e| SendError::Build(e.to_string()))?;
    let attachment = Attachment::new(request.filename.clone()).body(request.content.clone(), content_type);
    let multipart = MultiPart::mixed()
        .singlepart(SinglePart::plain(request.body.clone()))
        .singlepart(attachment);

    let delivered_to = recipients.iter().map(|m| m.email.to_string()).collect();

    let mut builder = Message::builder()
        .from(from)
        .subject(request.subject.clone())
        .date_now();
    for recipient in recipients {
        builder = builder.to(recipient);
    }
    let message = builder
        .multipart(multipart)
        .map_err(|e| SendError::Build(e.to_string()))?;

    Ok((
        message,
        SendReport {
            delivered_to,
            dropped,
        },
    ))
}

/// Build and submit. Any failure is terminal; there is no per-recipient retry.
pub fn send<T>(request: &OutboundRequest, transport: &T) -> Result<SendReport>
where
    T: MailTransport + ?Sized,
{
    let (message, report) = build_message(request)?;
    transport.submit(&message)?;
    info!(
        to = ?report.delivered_to,
        dropped = report.dropped.len(),
        filename = %request.filename,
        size = request.content.len(),
        "Mail sent"
    );
    Ok(report)
}

/// Send `artifact` through `transport` and route it.
pub fn process<T>(config: &OutboundConfig, artifact: Artifact, transport: &T) -> Processed
where
    T: MailTransport + ?Sized,
{
    let request = OutboundRequest::from_artifact(config, &artifact);
    route(send(&request, transport), artifact)
}

/// Send `artifact` over SMTP using the configured server.
pub fn deliver(config: &OutboundConfig, artifact: Artifact) -> Processed {
    match SmtpSubmitter::new(&config.server) {
        Ok(transport) => process(config, artifact, &transport),
        Err(e) => route(Err(Error::from(e)), artifact),
    }
}

fn route(result: Result<SendReport>, artifact: Artifact) -> Processed {
    match result {
        Ok(_) => Processed {
            artifact,
            route: Route::Success,
        },
        Err(e) => {
            error!(error = %e, "Mail send failed");
            Processed {
                artifact: artifact.penalize(),
                route: Route::Failure,
            }
        }
    }
}
