//! SMTP listener: the mail intake side of the service.
//!
//! Speaks HELO/EHLO, MAIL FROM, RCPT TO, DATA, RSET, NOOP, QUIT. There is
//! deliberately no AUTH: a disposable-inbox service is an open relay
//! *inbound only* (nothing ever leaves). Every RCPT is provisionally
//! accepted; which inbox a delivery lands in is decided after the payload
//! is parsed, from its To header.

use crate::{
    app::AppState,
    models::{email::db_email::DbEmail, email::new_email::NewEmail, notification::Notification},
    util::{extract_bodies, first_address, first_local_part},
};
use mailparse::{MailHeaderMap, parse_mail};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, info, warn};

pub const UNKNOWN: &str = "unknown";
pub const NO_SUBJECT: &str = "(No Subject)";

#[derive(Debug, Error)]
pub enum DeliverError {
    #[error("unparseable message payload: {0}")]
    Malformed(#[from] mailparse::MailParseError),
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

pub async fn serve(
    listener: TcpListener,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(state, stream).await {
                warn!("smtp connection error from {}: {}", peer, e);
            }
        });
    }
}

async fn handle_client(
    state: AppState,
    stream: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    writer.write_all(b"220 ephemail service ready\r\n").await?;
    writer.flush().await?;

    let mut mail_from: Option<String> = None;
    let mut rcpt_count = 0usize;
    let mut buf = String::new();

    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).await?;
        if n == 0 {
            break;
        }
        let line = buf.trim_end_matches(['\r', '\n']);
        debug!("smtp <= {}", line);
        let upper = line.to_uppercase();

        if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            writer.write_all(b"250-ephemail\r\n").await?;
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper.starts_with("MAIL FROM:") {
            mail_from = Some(line[10..].trim().trim_matches(['<', '>']).to_string());
            rcpt_count = 0;
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper.starts_with("RCPT TO:") {
            // Accept everyone: routing ignores the envelope entirely.
            rcpt_count += 1;
            writer.write_all(b"250 Accepted\r\n").await?;
        } else if upper == "DATA" {
            writer
                .write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")
                .await?;
            let data = read_data(&mut reader).await?;
            debug!(
                "smtp payload: {} bytes, envelope from={:?} rcpts={}",
                data.len(),
                mail_from,
                rcpt_count
            );
            match deliver(&state, &data).await {
                Ok(email) => {
                    writer
                        .write_all(format!("250 OK id={}\r\n", email.id).as_bytes())
                        .await?;
                }
                Err(DeliverError::Malformed(e)) => {
                    warn!("smtp rejecting unparseable payload: {e}");
                    writer
                        .write_all(b"550 Message rejected: unparseable payload\r\n")
                        .await?;
                }
                Err(DeliverError::Storage(e)) => {
                    error!("smtp store error: {e}");
                    writer
                        .write_all(b"451 Requested action aborted: local error\r\n")
                        .await?;
                }
            }
        } else if upper == "RSET" {
            mail_from = None;
            rcpt_count = 0;
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper == "NOOP" {
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper == "QUIT" {
            writer.write_all(b"221 Bye\r\n").await?;
            break;
        } else {
            writer.write_all(b"502 Command not implemented\r\n").await?;
        }
    }
    Ok(())
}

async fn read_data<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut data = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            break;
        }
        if line == b".\r\n" || line == b".\n" {
            break;
        }
        if line.starts_with(b"..") {
            // Transparency dot, strip it.
            data.extend_from_slice(&line[1..]);
        } else {
            data.extend_from_slice(&line);
        }
    }
    Ok(data)
}

/// Parse a complete payload, persist it, then publish the notification.
/// The insert commits before either, so a notified message is fetchable.
async fn deliver(state: &AppState, raw: &[u8]) -> Result<DbEmail, DeliverError> {
    let parsed = parse_mail(raw)?;

    let inbox_id = parsed
        .headers
        .get_first_value("To")
        .and_then(|v| first_local_part(&v))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let from_addr = parsed
        .headers
        .get_first_value("From")
        .and_then(|v| first_address(&v))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let subject = match parsed.headers.get_first_value("Subject") {
        Some(s) if !s.trim().is_empty() => s,
        _ => NO_SUBJECT.to_string(),
    };
    let (text_body, html_body) = extract_bodies(&parsed);

    let email = state
        .store
        .insert(NewEmail {
            to_addr: inbox_id.clone(),
            inbox_id,
            from_addr,
            subject,
            text_body,
            html_body,
        })
        .await?;

    info!(
        "received email for {} from {}",
        email.inbox_id, email.from_addr
    );
    state.bus.publish(&Notification::from(&email));
    Ok(email)
}
