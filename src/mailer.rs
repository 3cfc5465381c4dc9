//! Mail delivery
//!
//! The orchestrator hands validated drafts to a [`Mailer`]; the default
//! implementation speaks SMTP over implicit TLS (port 465). Protocol line
//! builders are pure functions so the wire format is testable without a
//! server. Transport details never reach the end user beyond the short
//! diagnostic the orchestrator embeds in its failure message.

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use base64::Engine;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 465;
const SMTP_TIMEOUT_SECS: u64 = 30;

/// Hostname announced in EHLO.
const CLIENT_DOMAIN: &str = "taskagent.local";

/// Trait for mail delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message; the sender address belongs to the
    /// implementation's configuration.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SMTP line builders (pure functions, testable)
// ---------------------------------------------------------------------------

pub fn ehlo_line(domain: &str) -> String {
    format!("EHLO {domain}\r\n")
}

pub fn auth_login_line() -> String {
    "AUTH LOGIN\r\n".to_string()
}

/// Base64-encode a credential for AUTH LOGIN, newline-terminated.
pub fn credential_line(value: &str) -> String {
    format!(
        "{}\r\n",
        base64::engine::general_purpose::STANDARD.encode(value)
    )
}

pub fn mail_from_line(from: &str) -> String {
    format!("MAIL FROM:<{from}>\r\n")
}

pub fn rcpt_to_line(to: &str) -> String {
    format!("RCPT TO:<{to}>\r\n")
}

pub fn data_line() -> String {
    "DATA\r\n".to_string()
}

/// Full message payload for DATA, dot-terminated.
pub fn message_payload(from: &str, to: &str, subject: &str, body: &str) -> String {
    format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=UTF-8\r\n\
         \r\n\
         {body}\r\n\
         .\r\n"
    )
}

pub fn quit_line() -> String {
    "QUIT\r\n".to_string()
}

// ---------------------------------------------------------------------------
// TLS session plumbing
// ---------------------------------------------------------------------------

type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;
type SmtpReader = BufReader<tokio::io::ReadHalf<TlsStream>>;
type SmtpWriter = tokio::io::WriteHalf<TlsStream>;

fn tls_client_config() -> Arc<ClientConfig> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

async fn connect_tls(host: &str, port: u16) -> Result<TlsStream> {
    let connector = TlsConnector::from(tls_client_config());
    let server_name = rustls::pki_types::ServerName::try_from(host.to_owned())
        .map_err(|e| AgentError::MailError(format!("invalid server name '{host}': {e}")))?;

    let addr = format!("{host}:{port}");

    let tcp_stream = tokio::time::timeout(
        Duration::from_secs(SMTP_TIMEOUT_SECS),
        TcpStream::connect(&addr),
    )
    .await
    .map_err(|_| AgentError::MailError(format!("connection to {addr} timed out")))?
    .map_err(|e| AgentError::MailError(format!("connection to {addr} failed: {e}")))?;

    tokio::time::timeout(
        Duration::from_secs(SMTP_TIMEOUT_SECS),
        connector.connect(server_name, tcp_stream),
    )
    .await
    .map_err(|_| AgentError::MailError(format!("TLS handshake with {host} timed out")))?
    .map_err(|e| AgentError::MailError(format!("TLS handshake with {host} failed: {e}")))
}

/// Read one SMTP reply (continuation lines "NNN-" until the final
/// "NNN " line) and return the status code with the raw lines.
async fn read_reply(reader: &mut SmtpReader) -> Result<(u16, Vec<String>)> {
    let mut lines = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(SMTP_TIMEOUT_SECS);

    loop {
        let mut line = String::new();
        let read = tokio::time::timeout_at(deadline, reader.read_line(&mut line))
            .await
            .map_err(|_| AgentError::MailError("SMTP response timed out".to_string()))?
            .map_err(|e| AgentError::MailError(format!("SMTP read error: {e}")))?;

        if read == 0 {
            break;
        }

        let trimmed = line.trim().to_string();
        debug!(smtp_line = %trimmed, "SMTP response line");
        lines.push(trimmed.clone());

        match trimmed.as_bytes().get(3) {
            Some(b'-') => continue,
            _ => break,
        }
    }

    let status = lines
        .first()
        .and_then(|l| l.get(..3))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    Ok((status, lines))
}

/// Send one command and require the reply's status class (2xx/3xx).
async fn exchange(
    writer: &mut SmtpWriter,
    reader: &mut SmtpReader,
    command: &str,
    expected_class: u16,
) -> Result<()> {
    writer
        .write_all(command.as_bytes())
        .await
        .map_err(|e| AgentError::MailError(format!("SMTP write error: {e}")))?;

    let (status, lines) = read_reply(reader).await?;
    if status / 100 != expected_class {
        return Err(AgentError::MailError(format!(
            "SMTP error: expected {}xx, got {status}: {}",
            expected_class,
            lines.join("; ")
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// SMTP mailer
// ---------------------------------------------------------------------------

/// SMTP mailer over implicit TLS. Sender mailbox credentials come from the
/// environment; missing credentials fail at send time as a handled error.
pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl SmtpMailer {
    pub fn new(host: String, port: u16, username: String, password: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
        }
    }

    /// Mailer configured from `SMTP_HOST`/`SMTP_PORT`/`SENDER_EMAIL`/
    /// `SENDER_PASSWORD`.
    pub fn from_env() -> Self {
        let host = std::env::var("SMTP_HOST").unwrap_or_else(|_| DEFAULT_SMTP_HOST.to_string());
        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);
        let username = std::env::var("SENDER_EMAIL").unwrap_or_default();
        let password = std::env::var("SENDER_PASSWORD").unwrap_or_default();

        Self::new(host, port, username, password)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(AgentError::ConfigError(
                "sender mailbox credentials not configured (SENDER_EMAIL/SENDER_PASSWORD)"
                    .to_string(),
            ));
        }

        info!(host = %self.host, to = %to, subject = %subject, "sending email");

        let tls_stream = connect_tls(&self.host, self.port).await?;
        let (read_half, mut writer) = tokio::io::split(tls_stream);
        let mut reader = BufReader::new(read_half);

        let (greeting, _) = read_reply(&mut reader).await?;
        if greeting / 100 != 2 {
            return Err(AgentError::MailError(format!(
                "SMTP server rejected connection with status {greeting}"
            )));
        }

        exchange(&mut writer, &mut reader, &ehlo_line(CLIENT_DOMAIN), 2).await?;
        exchange(&mut writer, &mut reader, &auth_login_line(), 3).await?;
        exchange(&mut writer, &mut reader, &credential_line(&self.username), 3).await?;
        exchange(&mut writer, &mut reader, &credential_line(&self.password), 2).await?;
        exchange(&mut writer, &mut reader, &mail_from_line(&self.username), 2).await?;
        exchange(&mut writer, &mut reader, &rcpt_to_line(to), 2).await?;
        exchange(&mut writer, &mut reader, &data_line(), 3).await?;

        let payload = message_payload(&self.username, to, subject, body);
        exchange(&mut writer, &mut reader, &payload, 2).await?;

        let _ = writer.write_all(quit_line().as_bytes()).await;

        info!(to = %to, "email delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lines_are_crlf_terminated() {
        assert_eq!(ehlo_line("taskagent.local"), "EHLO taskagent.local\r\n");
        assert_eq!(auth_login_line(), "AUTH LOGIN\r\n");
        assert_eq!(mail_from_line("me@corp.test"), "MAIL FROM:<me@corp.test>\r\n");
        assert_eq!(rcpt_to_line("you@corp.test"), "RCPT TO:<you@corp.test>\r\n");
        assert_eq!(data_line(), "DATA\r\n");
        assert_eq!(quit_line(), "QUIT\r\n");
    }

    #[test]
    fn test_credential_line_is_base64() {
        // "user" -> dXNlcg==
        assert_eq!(credential_line("user"), "dXNlcg==\r\n");
    }

    #[test]
    fn test_message_payload_has_headers_and_dot_terminator() {
        let payload = message_payload("me@corp.test", "you@corp.test", "Hello", "Line one");
        assert!(payload.starts_with("From: me@corp.test\r\n"));
        assert!(payload.contains("To: you@corp.test\r\n"));
        assert!(payload.contains("Subject: Hello\r\n"));
        assert!(payload.contains("Content-Type: text/plain; charset=UTF-8\r\n"));
        assert!(payload.ends_with("\r\n.\r\n"));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_handled_error() {
        let mailer = SmtpMailer::new("smtp.example.test".into(), 465, String::new(), String::new());
        let result = mailer.send("you@corp.test", "Hello", "body").await;

        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("credentials"));
    }
}
