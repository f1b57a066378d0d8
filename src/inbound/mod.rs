//! Inbound pipeline: poll the mailbox once, emit at most one artifact.

pub mod locator;
pub mod selector;

pub use locator::{Attachment, BodyPart, find_attachment};
pub use selector::{MailboxCriteria, SelectOptions, Selection, select};

use tracing::{error, info};

use crate::artifact::{Artifact, Processed, Route};
use crate::config::InboundConfig;
use crate::error::{Error, Result};
use crate::mailbox::{AccessMode, Mailbox, Pop3Client, with_session};

/// Attribute carrying the selected mail's `Date` header (RFC 3339).
pub const SENT_ATTRIBUTE: &str = "mail.sent";

/// Connect to the configured POP3 server and run one cycle.
pub fn poll(config: &InboundConfig, incoming: Artifact) -> Processed {
    let result = Pop3Client::connect(&config.server)
        .map_err(Error::from)
        .and_then(|mut client| run_cycle(&mut client, config));
    route(result, incoming)
}

/// Run one selection cycle inside a session on an already-connected mailbox.
///
/// The folder is opened read-write only when deletion is enabled, and is
/// closed with expunge on every path in that case, including after a failure.
pub fn run_cycle<M>(mailbox: &mut M, config: &InboundConfig) -> Result<Selection>
where
    M: Mailbox + ?Sized,
{
    let criteria = MailboxCriteria::new(config.sender.clone(), config.tag.clone());
    let options = SelectOptions {
        delete_matches: config.delete_after_read,
        force_filename: config.force_filename.clone(),
    };
    let mode = AccessMode::for_deletion(config.delete_after_read);

    with_session(mailbox, mode, config.delete_after_read, |mb| {
        select(mb, &criteria, &options)
    })
}

/// Map a cycle's result onto the artifact boundary.
pub fn route(result: Result<Selection>, mut artifact: Artifact) -> Processed {
    match result {
        Ok(Selection::Selected {
            content,
            filename,
            sent,
            matched,
        }) => {
            info!(filename = %filename, matched, "Emitting mail attachment");
            artifact.content = content;
            artifact.set_filename(filename);
            if let Some(sent) = sent {
                artifact
                    .attributes
                    .insert(SENT_ATTRIBUTE.to_string(), sent.to_rfc3339());
            }
            Processed {
                artifact,
                route: Route::Success,
            }
        }
        Ok(Selection::NoMatch) => Processed {
            artifact,
            route: Route::NoNewData,
        },
        Err(e) => {
            error!(error = %e, "Mail poll failed");
            Processed {
                artifact: artifact.penalize(),
                route: Route::Failure,
            }
        }
    }
}
