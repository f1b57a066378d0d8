//! In-memory mailbox with POP3-like semantics, for tests and offline replays.

use std::collections::BTreeSet;

use super::{AccessMode, Mailbox, MessageId};
use crate::error::SessionError;

/// A folder held in memory.
///
/// Deletion marks are committed on `close(true)` and discarded on
/// `close(false)` or when the folder is abandoned by `disconnect`.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    messages: Vec<(MessageId, Vec<u8>)>,
    marked: BTreeSet<MessageId>,
    mode: Option<AccessMode>,
    next_id: MessageId,
    disconnected: bool,
    fail_fetch: BTreeSet<MessageId>,
    fail_close: bool,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw message and return its id.
    pub fn push(&mut self, raw: Vec<u8>) -> MessageId {
        self.next_id += 1;
        self.messages.push((self.next_id, raw));
        self.next_id
    }

    /// Make `fetch(id)` fail as if the server rejected it.
    pub fn fail_fetch(&mut self, id: MessageId) {
        self.fail_fetch.insert(id);
    }

    /// Make `close` fail after it has taken effect.
    pub fn fail_close(&mut self) {
        self.fail_close = true;
    }

    /// Ids of messages still stored.
    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|(id, _)| *id).collect()
    }

    /// Ids currently flagged for deletion.
    pub fn marked(&self) -> Vec<MessageId> {
        self.marked.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    fn require_open(&self) -> Result<AccessMode, SessionError> {
        if self.disconnected {
            return Err(SessionError::Closed);
        }
        self.mode.ok_or(SessionError::NotOpen)
    }
}

impl Mailbox for MemoryMailbox {
    fn open(&mut self, mode: AccessMode) -> Result<(), SessionError> {
        if self.disconnected {
            return Err(SessionError::Closed);
        }
        self.mode = Some(mode);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    fn list(&mut self) -> Result<Vec<MessageId>, SessionError> {
        self.require_open()?;
        Ok(self.ids())
    }

    fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>, SessionError> {
        self.require_open()?;
        if self.fail_fetch.contains(&id) {
            return Err(SessionError::Rejected {
                command: format!("RETR {id}"),
                reply: "-ERR injected failure".into(),
            });
        }
        self.messages
            .iter()
            .find(|(mid, _)| *mid == id)
            .map(|(_, raw)| raw.clone())
            .ok_or(SessionError::NoSuchMessage(id))
    }

    fn mark_deleted(&mut self, id: MessageId) -> Result<(), SessionError> {
        if self.require_open()? == AccessMode::ReadOnly {
            return Err(SessionError::ReadOnly(id));
        }
        if !self.messages.iter().any(|(mid, _)| *mid == id) {
            return Err(SessionError::NoSuchMessage(id));
        }
        self.marked.insert(id);
        Ok(())
    }

    fn close(&mut self, expunge: bool) -> Result<(), SessionError> {
        self.require_open()?;
        if expunge {
            let marked = std::mem::take(&mut self.marked);
            self.messages.retain(|(id, _)| !marked.contains(id));
        } else {
            self.marked.clear();
        }
        self.mode = None;

        if self.fail_close {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        self.marked.clear();
        self.mode = None;
        self.disconnected = true;
        Ok(())
    }
}
