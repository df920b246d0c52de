/*
 * block_file.rs
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

//! A regular file: a block-addressed virtual byte stream layered over fixed-size
//! [`Message`]s. The file's own message holds only the directory-like index
//! (`f\r\n<ctime>\t<mtime>\t<size>\r\n` plus one `<block id>\t<identifier>\r\n` line per
//! block); the bytes themselves live in per-block messages opened on demand.

use crate::error::{FsError, FsResult};
use crate::identifier::Identifier;
use crate::message::Message;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// The leading byte of a file node's decoded body.
pub const TYPE_BYTE: u8 = b'f';

/// Fixed block size. Every block message holds exactly this many bytes except the
/// file's last block, which may be shorter (or, after a truncate that shrinks into it,
/// left oversized: the original never reclaims a partially-trimmed last block, and
/// neither do we).
pub const BLOCK_SIZE: u64 = 262_144;

pub struct File {
    message: Message,
    ctime: i64,
    mtime: i64,
    size: u64,
    blocks: HashMap<u64, Identifier>,
    open_blocks: HashMap<u64, Message>,
    dirty: bool,
    pos: u64,
}

impl File {
    pub fn identifier(&self) -> Identifier {
        self.message.name()
    }

    pub fn ctime(&self) -> i64 {
        self.ctime
    }

    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn set_mtime(&mut self, mtime: i64) {
        self.mtime = mtime;
        self.dirty = true;
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn block_id(&self, pos: u64) -> u64 {
        pos / BLOCK_SIZE
    }

    /// Open block `block_id`, creating it if this is the first touch.
    fn open_block(&mut self, block_id: u64) -> FsResult<&mut Message> {
        if !self.open_blocks.contains_key(&block_id) {
            let block = if let Some(&key) = self.blocks.get(&block_id) {
                Message::open(self.message.conn(), self.message.codec(), key)?
            } else {
                let block = Message::create(self.message.conn(), self.message.codec());
                self.blocks.insert(block_id, block.name());
                self.dirty = true;
                block
            };
            self.open_blocks.insert(block_id, block);
        }
        Ok(self.open_blocks.get_mut(&block_id).expect("just inserted"))
    }

    /// Flush and drop one open block, if open.
    fn close_block(&mut self, block_id: u64) -> FsResult<()> {
        if let Some(block) = self.open_blocks.remove(&block_id) {
            block.close()?;
        }
        Ok(())
    }

    /// Flush and drop a block's data entirely, removing it from the index.
    fn delete_block(&mut self, block_id: u64) -> FsResult<()> {
        if !self.blocks.contains_key(&block_id) {
            return Ok(());
        }
        self.close_block(block_id)?;
        let key = self.blocks.remove(&block_id).expect("checked above");
        Message::unlink(&self.message.conn(), key)?;
        self.dirty = true;
        Ok(())
    }

    /// Resize the file. Blocks entirely past the new end are deleted; the block that
    /// straddles the new boundary is left intact (matches the original behavior: a
    /// shrinking truncate never trims bytes out of the last surviving block).
    pub fn truncate(&mut self, size: u64) -> FsResult<()> {
        self.size = size;
        let end_block = self.block_id(size);
        let stale: Vec<u64> = self.blocks.keys().copied().filter(|&id| id > end_block).collect();
        for id in stale {
            self.delete_block(id)?;
        }
        self.dirty = true;
        Ok(())
    }

    /// Seek to an absolute position, closing the block being left so its writes are
    /// flushed and its memory freed.
    pub fn seek(&mut self, pos: u64) -> FsResult<()> {
        let old_block = self.block_id(self.pos);
        let new_block = self.block_id(pos);
        if old_block != new_block {
            self.close_block(old_block)?;
        }
        self.pos = pos;
        Ok(())
    }

    /// Read up to `size` bytes from the current position, advancing it.
    pub fn read(&mut self, size: u64) -> FsResult<Vec<u8>> {
        let size = size.min(self.size.saturating_sub(self.pos));
        let mut buf = Vec::with_capacity(size as usize);
        let mut remaining = size;
        while remaining > 0 {
            let block_id = self.block_id(self.pos);
            let block_offset = self.pos % BLOCK_SIZE;
            let read_size = remaining.min(BLOCK_SIZE - block_offset);
            let block = self.open_block(block_id)?;
            block.seek(block_offset as usize);
            buf.extend_from_slice(&block.read(read_size as usize));
            remaining -= read_size;
            self.seek(self.pos + read_size)?;
        }
        Ok(buf)
    }

    /// Write `buf` at the current position, growing the file if necessary.
    pub fn write(&mut self, buf: &[u8]) -> FsResult<()> {
        let size = buf.len() as u64;
        if self.pos + size > self.size {
            self.truncate(self.pos + size)?;
        }
        let mut write_offset = 0u64;
        while write_offset < size {
            let block_id = self.block_id(self.pos);
            let block_offset = self.pos % BLOCK_SIZE;
            let write_size = (size - write_offset).min(BLOCK_SIZE - block_offset);
            let block = self.open_block(block_id)?;
            block.seek(block_offset as usize);
            block.write(&buf[write_offset as usize..(write_offset + write_size) as usize]);
            write_offset += write_size;
            self.seek(self.pos + write_size)?;
        }
        Ok(())
    }

    /// Serialize the index and flush it, without touching open blocks (see `close`).
    pub fn flush(&mut self) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut body = format!("f\r\n{}\t{}\t{}\r\n", self.ctime, self.mtime, self.size);
        for (block_id, key) in &self.blocks {
            body.push_str(&format!("{}\t{}\r\n", block_id, key));
        }
        self.message.truncate(0);
        self.message.write(body.as_bytes());
        self.message.flush()?;
        self.dirty = false;
        Ok(())
    }

    /// Close all open blocks, flush the index, then close the index message itself.
    pub fn close(mut self) -> FsResult<()> {
        let open_ids: Vec<u64> = self.open_blocks.keys().copied().collect();
        for id in open_ids {
            self.close_block(id)?;
        }
        self.flush()?;
        self.message.close()
    }

    /// Delete the file entirely: every block, then the index message.
    pub fn delete(mut self) -> FsResult<()> {
        let block_keys: Vec<Identifier> = self.blocks.values().copied().collect();
        for key in block_keys {
            Message::unlink(&self.message.conn(), key)?;
        }
        let name = self.message.name();
        self.open_blocks.clear();
        Message::unlink(&self.message.conn(), name)
    }

    pub fn create(message: Message) -> Self {
        let now = now_secs();
        File {
            message,
            ctime: now,
            mtime: now,
            size: 0,
            blocks: HashMap::new(),
            open_blocks: HashMap::new(),
            dirty: true,
            pos: 0,
        }
    }

    /// Parse a file body out of an already-opened index message.
    pub fn from_message(mut message: Message) -> FsResult<Self> {
        message.seek(0);
        let raw = message.read(message.len());
        let text = String::from_utf8_lossy(&raw);
        let mut lines = text.split("\r\n");
        let type_line = lines.next().unwrap_or("");
        if type_line.as_bytes().first() != Some(&TYPE_BYTE) {
            return Err(FsError::CorruptNode);
        }
        let info_line = lines.next().ok_or(FsError::CorruptNode)?;
        let mut info = info_line.splitn(3, '\t');
        let ctime: i64 = info.next().and_then(|s| s.parse().ok()).ok_or(FsError::CorruptNode)?;
        let mtime: i64 = info.next().and_then(|s| s.parse().ok()).ok_or(FsError::CorruptNode)?;
        let size: u64 = info.next().and_then(|s| s.parse().ok()).ok_or(FsError::CorruptNode)?;

        let mut blocks = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let block_id: u64 = parts.next().and_then(|s| s.parse().ok()).ok_or(FsError::CorruptNode)?;
            let key: Identifier = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or(FsError::CorruptNode)?;
            blocks.insert(block_id, key);
        }

        Ok(File {
            message,
            ctime,
            mtime,
            size,
            blocks,
            open_blocks: HashMap::new(),
            dirty: false,
            pos: 0,
        })
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_matches_fixed_block_size() {
        assert_eq!(BLOCK_SIZE, 262_144);
        let pos = BLOCK_SIZE * 3 + 10;
        assert_eq!(pos / BLOCK_SIZE, 3);
    }

    #[test]
    fn truncate_shrinking_keeps_the_straddling_block() {
        let mut blocks = HashMap::new();
        blocks.insert(0u64, Identifier::random());
        blocks.insert(1u64, Identifier::random());
        blocks.insert(2u64, Identifier::random());
        let end_block = (BLOCK_SIZE + 10) / BLOCK_SIZE;
        let stale: Vec<u64> = blocks.keys().copied().filter(|&id| id > end_block).collect();
        assert_eq!(stale, vec![2]);
    }
}
