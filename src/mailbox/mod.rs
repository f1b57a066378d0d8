//! Mailbox sessions: the per-invocation connection lifecycle on the
//! retrieval side.
//!
//! A session goes `Connected → FolderOpen → Closed` exactly once. Nothing is
//! reused across invocations; [`with_session`] guarantees the folder is closed
//! and the connection dropped on every exit path.

pub mod memory;
pub mod pop3;
pub mod tls;

pub use memory::MemoryMailbox;
pub use pop3::Pop3Client;

use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// Protocol-native message number, valid for one session only.
pub type MessageId = u32;

/// How the single folder is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    /// Read-write only when deletion is requested.
    pub fn for_deletion(delete: bool) -> Self {
        if delete { Self::ReadWrite } else { Self::ReadOnly }
    }
}

/// An authenticated connection to a single mutable folder.
pub trait Mailbox {
    /// Open the folder. Must be called once before any other folder operation.
    fn open(&mut self, mode: AccessMode) -> std::result::Result<(), SessionError>;

    fn is_open(&self) -> bool;

    /// All messages currently in the folder, in protocol order.
    fn list(&mut self) -> std::result::Result<Vec<MessageId>, SessionError>;

    /// Raw RFC 5322 bytes of one message.
    fn fetch(&mut self, id: MessageId) -> std::result::Result<Vec<u8>, SessionError>;

    /// Flag a message for deletion. Takes effect on `close(true)`.
    fn mark_deleted(&mut self, id: MessageId) -> std::result::Result<(), SessionError>;

    /// Close the folder, committing deletion marks only when `expunge` is set.
    fn close(&mut self, expunge: bool) -> std::result::Result<(), SessionError>;

    /// Drop the connection. A folder still open at this point is abandoned,
    /// so pending marks are discarded.
    fn disconnect(&mut self) -> std::result::Result<(), SessionError>;
}

/// Open the folder, run `op`, then close and disconnect no matter how `op`
/// ended. Close-time errors are logged and never replace the result of `op`.
pub fn with_session<M, T, F>(mailbox: &mut M, mode: AccessMode, expunge: bool, op: F) -> Result<T>
where
    M: Mailbox + ?Sized,
    F: FnOnce(&mut M) -> Result<T>,
{
    let result = match mailbox.open(mode) {
        Ok(()) => op(mailbox),
        Err(e) => Err(e.into()),
    };

    if mailbox.is_open()
        && let Err(e) = mailbox.close(expunge)
    {
        warn!(error = %e, expunge, "Failed to close mailbox folder");
    }
    if let Err(e) = mailbox.disconnect() {
        debug!(error = %e, "Failed to disconnect mailbox session");
    }

    result
}
