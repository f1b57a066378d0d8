//! Picks the most recent matching message out of a mailbox.
//!
//! Every message is checked against the sender filter, the subject tag and
//! attachment presence. Of all matches only the most recent one yields its
//! attachment, but when deletion is requested *all* matches are marked, so
//! superseded mails are purged along with the one consumed.

use chrono::{DateTime, Utc};
use mail_parser::{Message, MessageParser};
use regex::Regex;
use tracing::{debug, info};

use super::locator::{self, Attachment, BodyPart};
use crate::config::DEFAULT_FILENAME;
use crate::error::Result;
use crate::mailbox::{Mailbox, MessageId};

/// What a message must look like to be considered.
#[derive(Debug, Clone)]
pub struct MailboxCriteria {
    /// Exact, case-sensitive match on the first `From` address.
    sender: Option<String>,
    tag: String,
    tag_pattern: Regex,
}

impl MailboxCriteria {
    pub fn new(sender: Option<String>, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        // The tag is literal text; escape it so `[`, `]` or `.` mean themselves.
        let tag_pattern = Regex::new(&regex::escape(&tag)).expect("escaped pattern is valid");
        Self {
            sender: sender.filter(|s| !s.trim().is_empty()),
            tag,
            tag_pattern,
        }
    }

    /// With no sender configured every message passes; otherwise the message
    /// needs a sender equal to the configured one.
    pub fn admits_sender(&self, sender: Option<&str>) -> bool {
        match &self.sender {
            None => true,
            Some(expected) => sender == Some(expected.as_str()),
        }
    }

    pub fn admits_subject(&self, subject: &str) -> bool {
        self.tag_pattern.is_match(subject)
    }
}

/// Per-invocation selection switches.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Mark every candidate deleted.
    pub delete_matches: bool,
    /// Filename used when the attachment declares none.
    pub force_filename: Option<String>,
}

/// Outcome of one selection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    NoMatch,
    Selected {
        content: Vec<u8>,
        filename: String,
        sent: Option<DateTime<Utc>>,
        /// Number of messages that matched; all of them were marked when
        /// deletion is on.
        matched: usize,
    },
}

/// A message that passed every filter.
#[derive(Debug, Clone)]
struct Candidate {
    id: MessageId,
    sent: Option<DateTime<Utc>>,
    attachment: Attachment,
}

/// Run one selection pass over an open mailbox.
///
/// A protocol or decoding failure aborts the pass. Deletion marks placed
/// before the failure stay in place.
pub fn select<M>(mailbox: &mut M, criteria: &MailboxCriteria, options: &SelectOptions) -> Result<Selection>
where
    M: Mailbox + ?Sized,
{
    let ids = mailbox.list()?;
    debug!(count = ids.len(), tag = %criteria.tag, "Scanning mailbox");

    let mut candidates = Vec::new();
    for id in ids {
        let raw = mailbox.fetch(id)?;
        let Some(message) = MessageParser::default().parse(&raw) else {
            debug!(id, size = raw.len(), "Skipping mail without headers");
            continue;
        };
        if let Some(candidate) = evaluate(id, &message, criteria)? {
            candidates.push(candidate);
        }
    }

    if candidates.is_empty() {
        info!(tag = %criteria.tag, "No matching mail");
        return Ok(Selection::NoMatch);
    }

    // Stable, most recent first. A missing date sorts after every present one.
    candidates.sort_by(|a, b| b.sent.cmp(&a.sent));

    let matched = candidates.len();
    let winner = &candidates[0];
    let filename = winner
        .attachment
        .filename
        .clone()
        .filter(|f| !f.is_empty())
        .or_else(|| options.force_filename.clone())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    info!(
        id = winner.id,
        matched,
        filename = %filename,
        size = winner.attachment.content.len(),
        "Selected most recent matching mail"
    );

    if options.delete_matches {
        for candidate in &candidates {
            mailbox.mark_deleted(candidate.id)?;
        }
        debug!(marked = matched, "Marked matching mail for deletion");
    }

    let winner = candidates.swap_remove(0);
    Ok(Selection::Selected {
        content: winner.attachment.content,
        filename,
        sent: winner.sent,
        matched,
    })
}

/// Apply sender, subject and attachment filters in that order.
fn evaluate(id: MessageId, message: &Message<'_>, criteria: &MailboxCriteria) -> Result<Option<Candidate>> {
    let sender = first_sender(message);
    if !criteria.admits_sender(sender) {
        debug!(id, sender = ?sender, "Skipping mail from other sender");
        return Ok(None);
    }

    if !criteria.admits_subject(message.subject().unwrap_or_default()) {
        debug!(id, "Skipping mail without tag");
        return Ok(None);
    }

    let tree = BodyPart::from_message(message);
    let Some(leaf) = locator::find_attachment(&tree)? else {
        debug!(id, "Skipping tagged mail without attachment");
        return Ok(None);
    };

    Ok(Some(Candidate {
        id,
        sent: sent_date(message),
        attachment: locator::extract(leaf)?,
    }))
}

/// Bare address of the first `From` entry.
pub fn first_sender<'a>(message: &'a Message<'_>) -> Option<&'a str> {
    message
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
}

/// `Date` header as UTC, if present and representable.
pub fn sent_date(message: &Message<'_>) -> Option<DateTime<Utc>> {
    message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, MimeError};
    use crate::mailbox::{AccessMode, MemoryMailbox};

    // ── Sender filter ───────────────────────────────────────────

    #[test]
    fn unset_sender_admits_everything() {
        let criteria = MailboxCriteria::new(None, "[T]");
        assert!(criteria.admits_sender(Some("anyone@example.com")));
        assert!(criteria.admits_sender(None));
    }

    #[test]
    fn blank_sender_counts_as_unset() {
        let criteria = MailboxCriteria::new(Some("  ".into()), "[T]");
        assert!(criteria.admits_sender(Some("anyone@example.com")));
    }

    #[test]
    fn sender_match_is_exact_and_case_sensitive() {
        let criteria = MailboxCriteria::new(Some("alice@example.com".into()), "[T]");
        assert!(criteria.admits_sender(Some("alice@example.com")));
        assert!(!criteria.admits_sender(Some("Alice@example.com")));
        assert!(!criteria.admits_sender(Some("alice@example.com.evil")));
        assert!(!criteria.admits_sender(None));
    }

    // ── Subject tag ─────────────────────────────────────────────

    #[test]
    fn tag_is_literal_substring() {
        let criteria = MailboxCriteria::new(None, "[DEMO]");
        assert!(criteria.admits_subject("Report [DEMO] 2024"));
        assert!(criteria.admits_subject("[DEMO]"));
        assert!(!criteria.admits_subject("Report DEMO"));
        assert!(!criteria.admits_subject("Report [D]"));
        assert!(!criteria.admits_subject("Report [demo]"));
    }

    #[test]
    fn tag_metacharacters_are_not_patterns() {
        let criteria = MailboxCriteria::new(None, "a.b*c?(d)");
        assert!(criteria.admits_subject("x a.b*c?(d) y"));
        assert!(!criteria.admits_subject("axbbbcd"));
        assert!(!criteria.admits_subject("aXb*c?(d)"));
    }

    // ── Header helpers ──────────────────────────────────────────

    #[test]
    fn first_sender_uses_bare_address() {
        let raw = b"From: Alice <alice@example.com>, bob@example.com\r\nSubject: x\r\n\r\n";
        let message = MessageParser::default().parse(&raw[..]).unwrap();
        assert_eq!(first_sender(&message), Some("alice@example.com"));
    }

    #[test]
    fn sent_date_converts_to_utc() {
        let raw = b"Date: Tue, 1 Jul 2003 10:52:37 +0200\r\nSubject: x\r\n\r\n";
        let message = MessageParser::default().parse(&raw[..]).unwrap();
        let sent = sent_date(&message).unwrap();
        assert_eq!(sent.to_rfc3339(), "2003-07-01T08:52:37+00:00");
    }

    // ── Whole pass ──────────────────────────────────────────────

    const TAGGED: &str = concat!(
        "From: a@example.com\r\n",
        "Subject: [DEMO] export\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "see attachment\r\n",
        "--b\r\n",
        "Content-Type: application/octet-stream\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "{body}\r\n",
        "--b--\r\n",
    );

    fn tagged(body: &str) -> Vec<u8> {
        TAGGED.replace("{body}", body).into_bytes()
    }

    fn run(mailbox: &mut MemoryMailbox) -> Result<Selection> {
        mailbox.open(AccessMode::ReadWrite).unwrap();
        let options = SelectOptions {
            delete_matches: true,
            ..Default::default()
        };
        select(mailbox, &MailboxCriteria::new(None, "[DEMO]"), &options)
    }

    #[test]
    fn empty_mail_is_skipped_not_fatal() {
        let mut mailbox = MemoryMailbox::new();
        let empty = mailbox.push(Vec::new());
        let blank = mailbox.push(b"  \r\n".to_vec());
        let valid = mailbox.push(tagged("PGE+MTwvYT4="));

        let selection = run(&mut mailbox).unwrap();

        assert!(matches!(
            selection,
            Selection::Selected { ref content, matched: 1, .. } if content == b"<a>1</a>"
        ));
        assert_eq!(mailbox.marked(), vec![valid]);
        assert!(!mailbox.marked().contains(&empty));
        assert!(!mailbox.marked().contains(&blank));
    }

    #[test]
    fn undecodable_attachment_fails_the_pass() {
        let mut mailbox = MemoryMailbox::new();
        mailbox.push(tagged("!!!! not base64 ????"));

        let err = run(&mut mailbox).unwrap_err();

        assert!(matches!(err, Error::Mime(MimeError::MalformedPart { .. })));
        assert!(mailbox.marked().is_empty());
    }

    #[test]
    fn missing_date_is_none() {
        let raw = b"Subject: x\r\n\r\nbody";
        let message = MessageParser::default().parse(&raw[..]).unwrap();
        assert!(sent_date(&message).is_none());
    }
}
