//! Configuration types.
//!
//! Both pipelines are configured from environment variables, validated once
//! before an invocation runs. Inbound settings live under `MAILGATE_RX_*`,
//! outbound settings under `MAILGATE_TX_*`.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Subject tag used when none is configured.
pub const DEFAULT_TAG: &str = "[MAILGATE]";

/// Body text used for outbound mail when none is configured.
pub const DEFAULT_TEXT: &str = "This is an automatically generated e-mail.";

/// Attachment filename used when neither the mail nor the config provides one.
pub const DEFAULT_FILENAME: &str = "data.bin";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_POP3_PORT: u16 = 10995;
const DEFAULT_SMTP_PORT: u16 = 10465;

// Accepts addresses that are not RFC 5322 conformant, e.g.
// `praxis.test@kim.telematik`.
static LOOSE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@(\S+\.)+\S+$").expect("static regex"));

/// Check that `value` looks like a mail address without enforcing RFC syntax.
pub fn is_loose_address(value: &str) -> bool {
    LOOSE_ADDRESS.is_match(value)
}

// ── Shared server settings ──────────────────────────────────────────

/// Username/password pair handed to a session at construction time.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Endpoint and trust settings for one mail server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    /// Accept any server certificate. Explicit opt-in only.
    pub accept_invalid_certs: bool,
    /// Socket read timeout. Unset by default, so calls block until the
    /// server answers.
    pub read_timeout: Option<Duration>,
}

impl ServerSettings {
    fn from_lookup<F>(prefix: &str, default_port: u16, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { prefix, lookup };

        let host = env.get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        if host.trim().is_empty() {
            return Err(env.invalid("HOST", "must not be empty"));
        }

        let port = match env.get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| env.invalid("PORT", "expected a port number between 1 and 65535"))?,
            None => default_port,
        };

        let username = env.require("USERNAME")?;
        let password = env.require("PASSWORD")?;

        let accept_invalid_certs = env.flag("ACCEPT_INVALID_CERTS", false)?;

        // Opt-in only; without it a stalled server blocks the invocation.
        let mut read_timeout = None;
        if let Some(raw) = env.get("READ_TIMEOUT_SECS").filter(|s| !s.trim().is_empty()) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| env.invalid("READ_TIMEOUT_SECS", "expected whole seconds"))?;
            read_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(Self {
            host: host.trim().to_string(),
            port,
            credentials: Credentials {
                username,
                password: SecretString::from(password),
            },
            accept_invalid_certs,
            read_timeout,
        })
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Settings for one inbound poll cycle.
#[derive(Debug, Clone)]
pub struct InboundConfig {
    pub server: ServerSettings,
    /// Only consider mail whose first sender equals this address.
    pub sender: Option<String>,
    /// Literal text that must appear in the subject line.
    pub tag: String,
    /// Delete every matching mail once the cycle completes.
    pub delete_after_read: bool,
    /// Filename used when the attachment does not declare one.
    pub force_filename: Option<String>,
}

impl InboundConfig {
    /// Build config from `MAILGATE_RX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = "MAILGATE_RX_";
        let server = ServerSettings::from_lookup(prefix, DEFAULT_POP3_PORT, &lookup)?;
        let env = Env {
            prefix,
            lookup: &lookup,
        };

        let sender = env
            .get("FROM")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(sender) = &sender
            && !is_loose_address(sender)
        {
            return Err(env.invalid("FROM", &format!("'{sender}' is not a mail address")));
        }

        let tag = env.get("TAG").unwrap_or_else(|| DEFAULT_TAG.to_string());
        if tag.trim().is_empty() {
            return Err(env.invalid("TAG", "must not be blank"));
        }

        let delete_after_read = env.flag("DELETE", true)?;

        let force_filename = env.get("FORCE_FILENAME").filter(|s| !s.is_empty());

        Ok(Self {
            server,
            sender,
            tag,
            delete_after_read,
            force_filename,
        })
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// Settings for one outbound send.
#[derive(Debug, Clone)]
pub struct OutboundConfig {
    pub server: ServerSettings,
    /// Comma-separated recipient list, kept raw; parsed per send.
    pub recipients: String,
    pub from: String,
    pub subject: String,
    pub text: String,
    /// Overrides the filename carried by the artifact.
    pub force_filename: Option<String>,
}

impl OutboundConfig {
    /// Build config from `MAILGATE_TX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = "MAILGATE_TX_";
        let server = ServerSettings::from_lookup(prefix, DEFAULT_SMTP_PORT, &lookup)?;
        let env = Env {
            prefix,
            lookup: &lookup,
        };

        let recipients = env.require("TO")?;
        for entry in recipients.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if !is_loose_address(entry) {
                return Err(env.invalid("TO", &format!("'{entry}' is not a mail address")));
            }
        }

        let from = env.require("FROM")?.trim().to_string();
        if !is_loose_address(&from) {
            return Err(env.invalid("FROM", &format!("'{from}' is not a mail address")));
        }

        let subject = env.get("SUBJECT").unwrap_or_else(|| DEFAULT_TAG.to_string());
        if subject.trim().is_empty() {
            return Err(env.invalid("SUBJECT", "must not be blank"));
        }

        let text = env
            .get("TEXT")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_TEXT.to_string());

        let force_filename = env
            .get("FORCE_FILENAME")
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            server,
            recipients,
            from,
            subject,
            text,
            force_filename,
        })
    }
}

// ── Lookup helper ───────────────────────────────────────────────────

struct Env<'a, F> {
    prefix: &'a str,
    lookup: &'a F,
}

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&self.key(name))
    }

    fn require(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(self.key(name)))
    }

    fn flag(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(self.invalid(name, "expected true or false")),
        }
    }

    fn invalid(&self, name: &str, message: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.key(name),
            message: message.to_string(),
        }
    }
}
