/*
 * client.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Minimal line-oriented IMAP4rev1 client: connect, LOGIN/LOGOUT, SELECT, UID SEARCH,
//! UID FETCH (BODY[1]), APPEND, UID STORE. Just enough of the protocol to use a mailbox
//! as a blob store; no MIME parsing, no IDLE, no folder hierarchy beyond SELECT.

use crate::net::{connect_implicit_tls, TlsStreamWrapper};
use log::{debug, trace};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// IMAP client error (network, protocol, auth).
#[derive(Debug)]
pub struct ImapClientError {
    pub message: String,
}

impl ImapClientError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

impl std::fmt::Display for ImapClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ImapClientError {}

impl From<io::Error> for ImapClientError {
    fn from(e: io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// One line of IMAP response (untagged `*` or tagged `A001`).
#[derive(Debug, Clone)]
struct ImapLine {
    raw: String,
    tag: Option<String>,
    untagged: bool,
    status: Option<ImapStatus>,
}

#[derive(Debug, Clone, Copy)]
enum ImapStatus {
    Ok,
    No,
    Bad,
}

/// Parse "* OK ..." or "A001 OK ..." from a line. Does not handle continuation (literal).
fn parse_line(s: &str) -> ImapLine {
    let raw = s.to_string();
    let untagged = s.starts_with('*');
    let (tag, status) = if untagged {
        let rest = s.trim_start_matches('*').trim_start();
        (None, parse_status(rest))
    } else {
        let mut sp = s.splitn(2, ' ');
        let t = sp.next().unwrap_or("").to_string();
        let rest = sp.next().unwrap_or("");
        (Some(t), parse_status(rest))
    };
    ImapLine {
        raw,
        tag: tag.filter(|t| !t.is_empty()),
        untagged,
        status,
    }
}

fn parse_status(rest: &str) -> Option<ImapStatus> {
    if rest.starts_with("OK ") || rest == "OK" {
        Some(ImapStatus::Ok)
    } else if rest.starts_with("NO ") || rest == "NO" {
        Some(ImapStatus::No)
    } else if rest.starts_with("BAD ") || rest == "BAD" {
        Some(ImapStatus::Bad)
    } else {
        None
    }
}

/// Read one line from stream; if it ends with `{N}`, read `N` literal bytes and return
/// them alongside the line.
async fn read_imap_line<S>(stream: &mut S, buf: &mut Vec<u8>) -> io::Result<(String, Option<Vec<u8>>)>
where
    S: AsyncRead + Unpin,
{
    buf.clear();
    loop {
        let mut b = [0u8; 1];
        let n = stream.read(&mut b).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
        }
        buf.push(b[0]);
        if buf.len() >= 2 && buf[buf.len() - 2..] == *b"\r\n" {
            break;
        }
    }
    let line_end = buf.len() - 2;
    let line = String::from_utf8_lossy(&buf[..line_end]).trim_end().to_string();
    let literal_size = line.rfind('{').and_then(|open| {
        let rest = &line[open + 1..];
        rest.strip_suffix('}').and_then(|s| s.trim().parse::<u32>().ok())
    });
    if let Some(n) = literal_size {
        let mut lit = vec![0u8; n as usize];
        stream.read_exact(&mut lit).await?;
        return Ok((line, Some(lit)));
    }
    Ok((line, None))
}

/// Write a line (no CRLF) then CRLF, flushing.
async fn write_line<S>(stream: &mut S, line: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    trace!("imap >> {}", String::from_utf8_lossy(line));
    stream.write_all(line).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    Ok(())
}

fn quote_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Generate the next command tag (A0001, A0002, ...).
fn next_tag() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) % 99999 + 1;
    format!("A{:04}", n)
}

/// Send a command with a tag, read lines until the matching tagged response.
/// Returns the untagged lines (with any literal payload) plus the final tagged line.
async fn send_command<S>(
    stream: &mut S,
    read_buf: &mut Vec<u8>,
    tag: &str,
    command: &str,
) -> Result<(Vec<(String, Option<Vec<u8>>)>, ImapLine), ImapClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let full = format!("{} {}", tag, command);
    write_line(stream, full.as_bytes()).await?;

    let mut untagged = Vec::new();
    loop {
        let (line_str, literal) = read_imap_line(stream, read_buf).await?;
        trace!("imap << {}", line_str);
        let line = parse_line(&line_str);
        if !line.untagged && line.tag.as_deref() == Some(tag) {
            return Ok((untagged, line));
        }
        untagged.push((line_str, literal));
    }
}

fn check_ok(line: &ImapLine) -> Result<(), ImapClientError> {
    match line.status {
        Some(ImapStatus::Ok) => Ok(()),
        _ => Err(ImapClientError::new(line.raw.clone())),
    }
}

/// An authenticated, mailbox-selecting IMAP session over a single TLS connection.
pub struct ImapSession {
    stream: TlsStreamWrapper,
    read_buf: Vec<u8>,
}

/// Result of a successful SELECT.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectResult {
    pub exists: u32,
}

/// Result of a successful APPEND: the server's UID for the new message, when it
/// advertises one via the `APPENDUID` response code.
#[derive(Debug, Clone, Copy)]
pub struct AppendResult {
    pub appended_uid: Option<u32>,
}

impl ImapSession {
    /// Connect (implicit TLS) and LOGIN.
    pub async fn connect(host: &str, port: u16, user: &str, pass: &str) -> Result<Self, ImapClientError> {
        debug!("connecting to {}:{}", host, port);
        let stream = connect_implicit_tls(host, port)
            .await
            .map_err(|e| ImapClientError::new(format!("connect to {}:{} failed: {}", host, port, e)))?;
        let mut session = ImapSession {
            stream,
            read_buf: Vec::new(),
        };
        // Consume the server greeting before issuing LOGIN.
        let (greeting, _) = read_imap_line(&mut session.stream, &mut session.read_buf).await?;
        trace!("imap << {}", greeting);

        let tag = next_tag();
        let cmd = format!("LOGIN {} {}", quote_string(user), quote_string(pass));
        let (_untagged, final_line) = send_command(&mut session.stream, &mut session.read_buf, &tag, &cmd).await?;
        check_ok(&final_line)?;
        debug!("logged in as {}", user);
        Ok(session)
    }

    /// LOGOUT and let the connection drop.
    pub async fn logout(&mut self) -> Result<(), ImapClientError> {
        let tag = next_tag();
        let (_untagged, final_line) = send_command(&mut self.stream, &mut self.read_buf, &tag, "LOGOUT").await?;
        check_ok(&final_line)
    }

    /// SELECT a mailbox.
    pub async fn select(&mut self, mailbox: &str) -> Result<SelectResult, ImapClientError> {
        let tag = next_tag();
        let cmd = format!("SELECT {}", quote_string(mailbox));
        let (untagged, final_line) = send_command(&mut self.stream, &mut self.read_buf, &tag, &cmd).await?;
        check_ok(&final_line)?;
        let mut exists = 0;
        for (line, _) in &untagged {
            if let Some(rest) = line.strip_prefix("* ") {
                if let Some(n) = rest.strip_suffix(" EXISTS").and_then(|s| s.trim().parse().ok()) {
                    exists = n;
                }
            }
        }
        debug!("selected {} ({} messages)", mailbox, exists);
        Ok(SelectResult { exists })
    }

    /// UID SEARCH SUBJECT "<subject>". Returns UIDs in the order the server reports them
    /// (callers take the last one as "most recent").
    pub async fn uid_search_subject(&mut self, subject: &str) -> Result<Vec<u32>, ImapClientError> {
        let tag = next_tag();
        let cmd = format!("UID SEARCH SUBJECT {}", quote_string(subject));
        let (untagged, final_line) = send_command(&mut self.stream, &mut self.read_buf, &tag, &cmd).await?;
        check_ok(&final_line)?;
        for (line, _) in &untagged {
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                return Ok(rest
                    .split_whitespace()
                    .filter_map(|s| s.parse::<u32>().ok())
                    .collect());
            }
        }
        Ok(Vec::new())
    }

    /// UID FETCH <uid> (BODY[1]). Returns the literal body, or `None` if the server has
    /// no such message.
    pub async fn uid_fetch_body(&mut self, uid: u32) -> Result<Option<Vec<u8>>, ImapClientError> {
        let tag = next_tag();
        let cmd = format!("UID FETCH {} (BODY[1])", uid);
        let (untagged, final_line) = send_command(&mut self.stream, &mut self.read_buf, &tag, &cmd).await?;
        check_ok(&final_line)?;
        for (line, literal) in untagged {
            if line.contains(" FETCH (") {
                if let Some(data) = literal {
                    return Ok(Some(data));
                }
            }
        }
        Ok(None)
    }

    /// APPEND a message with flags `(\Seen \Draft)` and the given RFC-2822 text body.
    /// Parses an `APPENDUID` response code when the server provides one.
    pub async fn append(&mut self, mailbox: &str, internaldate: &str, data: &[u8]) -> Result<AppendResult, ImapClientError> {
        let tag = next_tag();
        let cmd = format!(
            "APPEND {} (\\Seen \\Draft) \"{}\" {{{}}}\r\n",
            quote_string(mailbox),
            internaldate,
            data.len()
        );
        self.stream.write_all(cmd.as_bytes()).await?;
        self.stream.write_all(data).await?;
        self.stream.flush().await?;

        let mut appended_uid = None;
        loop {
            let (line_str, _literal) = read_imap_line(&mut self.stream, &mut self.read_buf).await?;
            trace!("imap << {}", line_str);
            let line = parse_line(&line_str);
            if !line.untagged && line.tag.as_deref() == Some(tag.as_str()) {
                check_ok(&line)?;
                if let Some(idx) = line_str.find("[APPENDUID ") {
                    let rest = &line_str[idx + 11..];
                    let mut parts = rest.split_whitespace();
                    let _uidvalidity = parts.next();
                    if let Some(uid_str) = parts.next() {
                        appended_uid = uid_str.trim_end_matches(']').parse().ok();
                    }
                }
                break;
            }
        }
        Ok(AppendResult { appended_uid })
    }

    /// UID STORE <uid> +FLAGS \Deleted. No expunge.
    pub async fn uid_delete(&mut self, uid: u32) -> Result<(), ImapClientError> {
        let tag = next_tag();
        let cmd = format!("UID STORE {} +FLAGS (\\Deleted)", uid);
        let (_untagged, final_line) = send_command(&mut self.stream, &mut self.read_buf, &tag, &cmd).await?;
        check_ok(&final_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_no_bad_status() {
        assert!(matches!(parse_line("A0001 OK done").status, Some(ImapStatus::Ok)));
        assert!(matches!(parse_line("A0001 NO nope").status, Some(ImapStatus::No)));
        assert!(matches!(parse_line("A0001 BAD bad").status, Some(ImapStatus::Bad)));
        assert!(matches!(parse_line("* OK greeting").status, Some(ImapStatus::Ok)));
    }

    #[test]
    fn untagged_vs_tagged() {
        let u = parse_line("* 12 EXISTS");
        assert!(u.untagged);
        assert!(u.tag.is_none());
        let t = parse_line("A0002 OK SELECT completed");
        assert!(!t.untagged);
        assert_eq!(t.tag.as_deref(), Some("A0002"));
    }

    #[test]
    fn quote_string_escapes() {
        assert_eq!(quote_string("plain"), "\"plain\"");
        assert_eq!(quote_string("has\"quote"), "\"has\\\"quote\"");
        assert_eq!(quote_string("back\\slash"), "\"back\\\\slash\"");
    }

    #[test]
    fn tags_are_monotonically_distinct() {
        let a = next_tag();
        let b = next_tag();
        assert_ne!(a, b);
    }
}
