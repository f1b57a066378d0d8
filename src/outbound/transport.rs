//! Mail submission over SMTP with implicit TLS.

use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::ServerSettings;
use crate::error::SendError;

/// Something that can submit a finished message.
pub trait MailTransport {
    fn submit(&self, message: &Message) -> Result<(), SendError>;
}

/// Authenticated SMTP session factory; each `submit` opens and closes its
/// own connection.
pub struct SmtpSubmitter {
    transport: SmtpTransport,
}

impl SmtpSubmitter {
    pub fn new(settings: &ServerSettings) -> Result<Self, SendError> {
        let tls = TlsParameters::builder(settings.host.clone())
            .dangerous_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| SendError::Transport(format!("TLS parameters: {e}")))?;

        let creds = Credentials::new(
            settings.credentials.username.clone(),
            settings.credentials.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&settings.host)
            .map_err(|e| SendError::Transport(format!("SMTP relay error: {e}")))?
            .port(settings.port)
            .tls(Tls::Wrapper(tls))
            .credentials(creds)
            .timeout(settings.read_timeout)
            .build();

        debug!(
            host = %settings.host,
            port = settings.port,
            insecure = settings.accept_invalid_certs,
            "SMTP transport configured"
        );
        Ok(Self { transport })
    }
}

impl MailTransport for SmtpSubmitter {
    fn submit(&self, message: &Message) -> Result<(), SendError> {
        self.transport
            .send(message)
            .map(|_| ())
            .map_err(|e| SendError::Submit(e.to_string()))
    }
}
