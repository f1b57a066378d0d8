//! mailgate: mail-based file transfer gateway.
//!
//! Inbound: poll a POP3 mailbox, pick the newest tagged mail carrying a binary
//! attachment, emit that attachment. Outbound: mail an artifact as a two-part
//! message over SMTP.

pub mod artifact;
pub mod config;
pub mod error;
pub mod inbound;
pub mod mailbox;
pub mod outbound;
