/*
 * node.rs
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

//! A node is either a [`Directory`] or a [`File`], distinguished by the first byte of
//! its decoded body. This is the single place that byte gets inspected and dispatched.

use crate::block_file::{self, File};
use crate::directory::{self, Directory};
use crate::envelope::EnvelopeCodec;
use crate::error::{FsError, FsResult};
use crate::identifier::Identifier;
use crate::message::Message;
use crate::protocol::imap::MailStoreClient;
use std::sync::Arc;

/// An open filesystem node, directory or file.
pub enum Node {
    Directory(Directory),
    File(File),
}

impl Node {
    pub fn identifier(&self) -> Identifier {
        match self {
            Node::Directory(d) => d.identifier(),
            Node::File(f) => f.identifier(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    /// Borrow as a directory, e.g. for path-walk or `readdir`. A file here means a
    /// directory operation was attempted on a file: `ENOTDIR`.
    pub fn as_directory(&self) -> FsResult<&Directory> {
        match self {
            Node::Directory(d) => Ok(d),
            Node::File(_) => Err(FsError::NotADirectory),
        }
    }

    pub fn as_directory_mut(&mut self) -> FsResult<&mut Directory> {
        match self {
            Node::Directory(d) => Ok(d),
            Node::File(_) => Err(FsError::NotADirectory),
        }
    }

    /// Borrow as a file, e.g. for `read`/`write`/`truncate`. A directory here means a
    /// file operation was attempted on a directory: `EISDIR`.
    pub fn as_file(&self) -> FsResult<&File> {
        match self {
            Node::File(f) => Ok(f),
            Node::Directory(_) => Err(FsError::NotAFile),
        }
    }

    pub fn as_file_mut(&mut self) -> FsResult<&mut File> {
        match self {
            Node::File(f) => Ok(f),
            Node::Directory(_) => Err(FsError::NotAFile),
        }
    }

    /// Flush pending changes without releasing the node.
    pub fn flush(&mut self) -> FsResult<()> {
        match self {
            Node::Directory(d) => d.flush(),
            Node::File(f) => f.flush(),
        }
    }

    /// Flush and release, consuming the node.
    pub fn close(self) -> FsResult<()> {
        match self {
            Node::Directory(d) => d.close(),
            Node::File(f) => f.close(),
        }
    }

    /// Open the node addressed by `id`, inspecting the decoded body's first byte to
    /// decide whether it parses as a directory or a file.
    pub fn open(conn: Arc<MailStoreClient>, codec: Arc<EnvelopeCodec>, id: Identifier) -> FsResult<Self> {
        let message = Message::open(conn, codec, id)?;
        Self::from_message(message)
    }

    /// Dispatch an already-opened message to the directory or file parser.
    pub fn from_message(message: Message) -> FsResult<Self> {
        match message.peek_type_byte() {
            Some(directory::TYPE_BYTE) => Ok(Node::Directory(Directory::from_message(message)?)),
            Some(block_file::TYPE_BYTE) => Ok(Node::File(File::from_message(message)?)),
            _ => Err(FsError::CorruptNode),
        }
    }

    pub fn new_directory(message: Message) -> Self {
        Node::Directory(Directory::create(message))
    }

    pub fn new_file(message: Message) -> Self {
        Node::File(File::create(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bytes_are_distinct() {
        assert_ne!(directory::TYPE_BYTE, block_file::TYPE_BYTE);
        assert_eq!(directory::TYPE_BYTE, b'd');
        assert_eq!(block_file::TYPE_BYTE, b'f');
    }
}
