//! Blocking POP3 client over implicit TLS.
//!
//! POP3 has exactly one folder, so "opening" it is a `STAT` that confirms the
//! maildrop is locked. `DELE` marks are committed by `QUIT` and discarded by
//! `RSET` or by dropping the connection.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::{AccessMode, Mailbox, MessageId, tls};
use crate::config::{Credentials, ServerSettings};
use crate::error::SessionError;

/// TLS stream used for real sessions.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    Open(AccessMode),
    Closed,
}

/// One authenticated POP3 session.
pub struct Pop3Client<S: Read + Write> {
    stream: BufReader<S>,
    state: State,
}

impl Pop3Client<TlsStream> {
    /// Connect over TLS and authenticate with USER/PASS.
    pub fn connect(settings: &ServerSettings) -> Result<Self, SessionError> {
        let connect_failed = |reason: String| SessionError::ConnectFailed {
            host: settings.host.clone(),
            port: settings.port,
            reason,
        };

        let tcp = TcpStream::connect((settings.host.as_str(), settings.port))
            .map_err(|e| connect_failed(e.to_string()))?;
        tcp.set_read_timeout(settings.read_timeout)?;

        let config = tls::client_config(settings.accept_invalid_certs)?;
        let server_name = rustls::pki_types::ServerName::try_from(settings.host.clone())
            .map_err(|e| SessionError::Tls(format!("invalid server name '{}': {e}", settings.host)))?;
        let conn = rustls::ClientConnection::new(config, server_name)
            .map_err(|e| SessionError::Tls(e.to_string()))?;

        let client = Self::handshake(rustls::StreamOwned::new(conn, tcp), &settings.credentials)?;
        info!(
            host = %settings.host,
            port = settings.port,
            insecure = settings.accept_invalid_certs,
            "POP3 session established"
        );
        Ok(client)
    }
}

impl<S: Read + Write> Pop3Client<S> {
    /// Read the greeting and log in over an already-established stream.
    pub fn handshake(stream: S, credentials: &Credentials) -> Result<Self, SessionError> {
        let mut client = Self {
            stream: BufReader::new(stream),
            state: State::Connected,
        };

        let greeting = client.read_status("greeting")?;
        debug!(greeting = %greeting, "POP3 connected");

        let auth_failed = |e: SessionError| SessionError::AuthFailed {
            user: credentials.username.clone(),
            reason: e.to_string(),
        };
        client
            .command(&format!("USER {}", credentials.username), "USER")
            .map_err(auth_failed)?;
        client
            .command(
                &format!("PASS {}", credentials.password.expose_secret()),
                "PASS",
            )
            .map_err(auth_failed)?;

        Ok(client)
    }

    // ── Wire helpers ────────────────────────────────────────────────

    fn read_line(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut buf = Vec::new();
        if self.stream.read_until(b'\n', &mut buf)? == 0 {
            return Err(SessionError::Closed);
        }
        Ok(buf)
    }

    /// Read a single `+OK`/`-ERR` status line. `label` names the command in
    /// errors; it never contains arguments, so secrets stay out of logs.
    fn read_status(&mut self, label: &str) -> Result<String, SessionError> {
        let line = self.read_line()?;
        let line = String::from_utf8_lossy(&line).trim_end().to_string();
        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(rest.trim().to_string())
        } else if line.starts_with("-ERR") {
            Err(SessionError::Rejected {
                command: label.to_string(),
                reply: line,
            })
        } else {
            Err(SessionError::Protocol {
                command: label.to_string(),
                reply: line,
            })
        }
    }

    fn command(&mut self, cmd: &str, label: &str) -> Result<String, SessionError> {
        let stream = self.stream.get_mut();
        stream.write_all(cmd.as_bytes())?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
        self.read_status(label)
    }

    /// Read a dot-terminated multi-line body, undoing byte-stuffing.
    fn read_multiline(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut body = Vec::new();
        loop {
            let line = self.read_line()?;
            if line == b".\r\n" || line == b".\n" {
                return Ok(body);
            }
            match line.strip_prefix(b".") {
                Some(unstuffed) => body.extend_from_slice(unstuffed),
                None => body.extend_from_slice(&line),
            }
        }
    }

    fn require_open(&self) -> Result<AccessMode, SessionError> {
        match self.state {
            State::Open(mode) => Ok(mode),
            State::Connected => Err(SessionError::NotOpen),
            State::Closed => Err(SessionError::Closed),
        }
    }
}

impl<S: Read + Write> Mailbox for Pop3Client<S> {
    fn open(&mut self, mode: AccessMode) -> Result<(), SessionError> {
        match self.state {
            State::Connected => {}
            State::Open(_) => return Ok(()),
            State::Closed => return Err(SessionError::Closed),
        }
        let stat = self.command("STAT", "STAT")?;
        debug!(stat = %stat, ?mode, "POP3 maildrop opened");
        self.state = State::Open(mode);
        Ok(())
    }

    fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    fn list(&mut self) -> Result<Vec<MessageId>, SessionError> {
        self.require_open()?;
        self.command("LIST", "LIST")?;
        let listing = self.read_multiline()?;

        let mut ids = Vec::new();
        for line in String::from_utf8_lossy(&listing).lines() {
            let Some(first) = line.split_whitespace().next() else {
                continue;
            };
            let id = first.parse::<MessageId>().map_err(|_| SessionError::Protocol {
                command: "LIST".into(),
                reply: line.to_string(),
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>, SessionError> {
        self.require_open()?;
        self.command(&format!("RETR {id}"), "RETR")?;
        self.read_multiline()
    }

    fn mark_deleted(&mut self, id: MessageId) -> Result<(), SessionError> {
        if self.require_open()? == AccessMode::ReadOnly {
            return Err(SessionError::ReadOnly(id));
        }
        self.command(&format!("DELE {id}"), "DELE")?;
        Ok(())
    }

    fn close(&mut self, expunge: bool) -> Result<(), SessionError> {
        self.require_open()?;
        // Mark closed first: a failed QUIT must not be retried by disconnect.
        self.state = State::Closed;
        if !expunge {
            self.command("RSET", "RSET")?;
        }
        self.command("QUIT", "QUIT")?;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        let previous = std::mem::replace(&mut self.state, State::Closed);
        // An open maildrop is abandoned without QUIT so its DELE marks are
        // never committed.
        if previous == State::Connected {
            self.command("QUIT", "QUIT")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use secrecy::SecretString;

    use super::*;

    /// Scripted server: reads replies from `input`, records commands in `output`.
    struct Script {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Script {
        fn new(replies: &str) -> Self {
            Self {
                input: Cursor::new(replies.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Script {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "user".into(),
            password: SecretString::from("secret".to_string()),
        }
    }

    const LOGIN: &str = "+OK POP3 ready\r\n+OK\r\n+OK logged in\r\n";

    fn client(replies: &str) -> Pop3Client<Script> {
        Pop3Client::handshake(Script::new(&format!("{LOGIN}{replies}")), &credentials()).unwrap()
    }

    fn sent(client: &Pop3Client<Script>) -> String {
        String::from_utf8(client.stream.get_ref().output.clone()).unwrap()
    }

    #[test]
    fn handshake_sends_credentials() {
        let client = client("");
        assert_eq!(sent(&client), "USER user\r\nPASS secret\r\n");
    }

    #[test]
    fn rejected_password_is_auth_failure_without_secret() {
        let script = Script::new("+OK ready\r\n+OK\r\n-ERR invalid credentials\r\n");
        let err = Pop3Client::handshake(script, &credentials()).err().unwrap();
        assert!(matches!(err, SessionError::AuthFailed { ref user, .. } if user == "user"));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn bad_greeting_is_protocol_error() {
        let err = Pop3Client::handshake(Script::new("* OK IMAP\r\n"), &credentials())
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Protocol { .. }));
    }

    #[test]
    fn list_parses_scan_listing() {
        let mut client = client("+OK 2 messages\r\n+OK\r\n1 120\r\n2 4096\r\n.\r\n");
        client.open(AccessMode::ReadOnly).unwrap();
        assert_eq!(client.list().unwrap(), vec![1, 2]);
    }

    #[test]
    fn list_requires_open_folder() {
        let mut client = client("");
        assert!(matches!(client.list(), Err(SessionError::NotOpen)));
    }

    #[test]
    fn fetch_unstuffs_dot_lines() {
        let mut client = client("+OK 1 10\r\n+OK message follows\r\nSubject: x\r\n\r\n..hidden\r\nplain\r\n.\r\n");
        client.open(AccessMode::ReadOnly).unwrap();
        let raw = client.fetch(1).unwrap();
        assert_eq!(raw, b"Subject: x\r\n\r\n.hidden\r\nplain\r\n");
    }

    #[test]
    fn fetch_of_missing_message_is_rejected() {
        let mut client = client("+OK 0 0\r\n-ERR no such message\r\n");
        client.open(AccessMode::ReadOnly).unwrap();
        assert!(matches!(client.fetch(9), Err(SessionError::Rejected { .. })));
    }

    #[test]
    fn truncated_body_is_closed_error() {
        let mut client = client("+OK 1 10\r\n+OK\r\nSubject: x\r\n");
        client.open(AccessMode::ReadOnly).unwrap();
        assert!(matches!(client.fetch(1), Err(SessionError::Closed)));
    }

    #[test]
    fn read_only_session_never_sends_dele() {
        let mut client = client("+OK 1 10\r\n");
        client.open(AccessMode::ReadOnly).unwrap();
        assert!(matches!(client.mark_deleted(1), Err(SessionError::ReadOnly(1))));
        assert!(!sent(&client).contains("DELE"));
    }

    #[test]
    fn close_with_expunge_quits_directly() {
        let mut client = client("+OK 1 10\r\n+OK marked\r\n+OK bye\r\n");
        client.open(AccessMode::ReadWrite).unwrap();
        client.mark_deleted(1).unwrap();
        client.close(true).unwrap();
        client.disconnect().unwrap();
        assert!(sent(&client).ends_with("STAT\r\nDELE 1\r\nQUIT\r\n"));
    }

    #[test]
    fn close_without_expunge_resets_first() {
        let mut client = client("+OK 1 10\r\n+OK marked\r\n+OK reset\r\n+OK bye\r\n");
        client.open(AccessMode::ReadWrite).unwrap();
        client.mark_deleted(1).unwrap();
        client.close(false).unwrap();
        assert!(sent(&client).ends_with("DELE 1\r\nRSET\r\nQUIT\r\n"));
    }

    #[test]
    fn disconnect_abandons_open_folder_without_quit() {
        let mut client = client("+OK 1 10\r\n+OK marked\r\n");
        client.open(AccessMode::ReadWrite).unwrap();
        client.mark_deleted(1).unwrap();
        client.disconnect().unwrap();
        assert!(!sent(&client).contains("QUIT"));
        assert!(!client.is_open());
    }

    #[test]
    fn disconnect_before_open_quits_politely() {
        let mut client = client("+OK bye\r\n");
        client.disconnect().unwrap();
        assert!(sent(&client).ends_with("QUIT\r\n"));
    }
}
