/*
 * message.rs
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

//! A single mail message treated as an in-memory, file-like byte buffer. This is the
//! unit the mail store actually persists: every directory body and every file block is
//! one `Message`, addressed by its subject (an [`Identifier`]'s canonical text).

use crate::envelope::EnvelopeCodec;
use crate::error::{FsError, FsResult};
use crate::identifier::Identifier;
use crate::protocol::imap::MailStoreClient;
use std::sync::Arc;

/// In-memory view of one mail message's body, with deferred writes.
pub struct Message {
    conn: Arc<MailStoreClient>,
    codec: Arc<EnvelopeCodec>,
    name: Identifier,
    data: Vec<u8>,
    dirty: bool,
    pos: usize,
}

impl Message {
    /// The message's subject / identifier.
    pub fn name(&self) -> Identifier {
        self.name
    }

    /// The mail store connection backing this message, shared with sibling messages
    /// (e.g. a file's blocks) so they reuse one session.
    pub fn conn(&self) -> Arc<MailStoreClient> {
        self.conn.clone()
    }

    /// The envelope codec backing this message, shared with sibling messages.
    pub fn codec(&self) -> Arc<EnvelopeCodec> {
        self.codec.clone()
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The first byte of the decoded body, without disturbing the seek position.
    /// Directory and file bodies both begin with a type tag (`d` or `f`).
    pub fn peek_type_byte(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Read up to `size` bytes from the current position, advancing it.
    pub fn read(&mut self, size: usize) -> Vec<u8> {
        let avail = self.data.len().saturating_sub(self.pos);
        let size = size.min(avail);
        let buf = self.data[self.pos..self.pos + size].to_vec();
        self.pos += size;
        buf
    }

    /// Resize the backing buffer. Growth is filled with `.` (0x2E), matching the
    /// original placeholder byte rather than a zero fill.
    pub fn truncate(&mut self, size: usize) {
        self.data.resize(size, b'.');
        if self.pos > size {
            self.pos = size;
        }
        self.dirty = true;
    }

    /// Write `buf` at the current position, growing the buffer (placeholder-filled) if
    /// needed.
    pub fn write(&mut self, buf: &[u8]) {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, b'.');
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        self.dirty = true;
    }

    /// Append-then-delete: put the new body under this subject, then delete whatever
    /// UID previously held it. A crash between the two leaves the new message as the
    /// sole (and correct) holder of the subject, never data loss.
    pub fn flush(&mut self) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let old_uid = self
            .conn
            .get_uid_by_subject(&self.name.to_string())
            .map_err(|e| FsError::Transport(e.to_string()))?;
        let encoded = self.codec.encrypt_message(&self.data);
        let rfc2822 = wrap_rfc2822(&self.name.to_string(), &encoded);
        self.conn
            .put_message(&self.name.to_string(), &rfc2822)
            .map_err(|e| FsError::Transport(e.to_string()))?;
        if let Some(uid) = old_uid {
            self.conn
                .delete_uid(uid)
                .map_err(|e| FsError::Transport(e.to_string()))?;
        }
        self.dirty = false;
        Ok(())
    }

    /// Flush pending writes. Consumes `self`: a closed message should not be reused.
    pub fn close(mut self) -> FsResult<()> {
        self.flush()
    }

    /// Create a brand-new, empty message with a fresh random identifier.
    pub fn create(conn: Arc<MailStoreClient>, codec: Arc<EnvelopeCodec>) -> Self {
        Message {
            conn,
            codec,
            name: Identifier::random(),
            data: Vec::new(),
            dirty: true,
            pos: 0,
        }
    }

    /// Create a message object for a specific identifier without touching the store.
    /// Used for the root, whose identifier is fixed rather than random.
    pub fn create_named(conn: Arc<MailStoreClient>, codec: Arc<EnvelopeCodec>, name: Identifier) -> Self {
        Message {
            conn,
            codec,
            name,
            data: Vec::new(),
            dirty: true,
            pos: 0,
        }
    }

    /// Open an existing message by identifier. Returns `FsError::NotFound` if no
    /// message carries that subject, and `FsError::WrongKey` if the body does not
    /// decrypt (wrong passphrase, or the subject was never one of ours).
    pub fn open(conn: Arc<MailStoreClient>, codec: Arc<EnvelopeCodec>, name: Identifier) -> FsResult<Self> {
        let subject = name.to_string();
        let raw = conn
            .get_message(&subject)
            .map_err(|e| FsError::Transport(e.to_string()))?
            .ok_or(FsError::NotFound)?;
        let encoded = extract_rfc2822_body(&raw);
        let data = codec.decrypt_message(&encoded).map_err(|_| FsError::WrongKey)?;
        Ok(Message {
            conn,
            codec,
            name,
            data,
            dirty: false,
            pos: 0,
        })
    }

    /// Delete the message carrying `name`'s subject, if any.
    pub fn unlink(conn: &MailStoreClient, name: Identifier) -> FsResult<()> {
        conn.delete_message(&name.to_string())
            .map_err(|e| FsError::Transport(e.to_string()))
    }
}

/// Wrap an encoded envelope as a minimal RFC 2822 message: `Subject:` header, blank
/// line, body. `Subject` carries the identifier verbatim since it is plain hex ASCII.
fn wrap_rfc2822(subject: &str, encoded_body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_body.len() + 64);
    out.extend_from_slice(format!("Subject: {}\r\n\r\n", subject).as_bytes());
    out.extend_from_slice(encoded_body.as_bytes());
    out
}

/// Strip RFC 2822 headers from a fetched message, returning the body text.
fn extract_rfc2822_body(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match text.find("\r\n\r\n") {
        Some(idx) => text[idx + 4..].to_string(),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_and_extract_roundtrip() {
        let wrapped = wrap_rfc2822("deadbeef", "c29tZS1ib2R5");
        let body = extract_rfc2822_body(&wrapped);
        assert_eq!(body, "c29tZS1ib2R5");
    }

    #[test]
    fn write_past_end_grows_buffer() {
        // Exercises the in-memory buffer logic directly without a live connection.
        let mut data = vec![0u8; 4];
        let pos = 2usize;
        let buf = [1u8, 2, 3];
        let end = pos + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[pos..end].copy_from_slice(&buf);
        assert_eq!(data, vec![0, 0, 1, 2, 3]);
    }
}
