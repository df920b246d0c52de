/*
 * directory.rs
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

//! Directory node body: a timestamp pair plus a child-name table, serialized as
//! `d\r\n<ctime>\t<mtime>\r\n` followed by one `<identifier>\t<name>\r\n` line per child.

use crate::error::{FsError, FsResult};
use crate::identifier::Identifier;
use crate::message::Message;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// The leading byte of a directory node's decoded body.
pub const TYPE_BYTE: u8 = b'd';

pub struct Directory {
    message: Message,
    ctime: i64,
    mtime: i64,
    children: HashMap<Identifier, String>,
    dirty: bool,
}

impl Directory {
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

    pub fn children(&self) -> &HashMap<Identifier, String> {
        &self.children
    }

    pub fn add_child(&mut self, key: Identifier, name: String) {
        self.children.insert(key, name);
        self.dirty = true;
    }

    pub fn remove_child(&mut self, key: Identifier) {
        if self.children.remove(&key).is_some() {
            self.dirty = true;
        }
    }

    pub fn get_child_by_name(&self, name: &str) -> Option<Identifier> {
        self.children
            .iter()
            .find(|(_, child_name)| child_name.as_str() == name)
            .map(|(key, _)| *key)
    }

    /// Serialize and write the directory body, then flush the underlying message.
    pub fn flush(&mut self) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut body = format!("d\r\n{}\t{}\r\n", self.ctime, self.mtime);
        for (key, name) in &self.children {
            body.push_str(&format!("{}\t{}\r\n", key, name));
        }
        self.message.truncate(0);
        self.message.write(body.as_bytes());
        self.message.flush()?;
        self.dirty = false;
        Ok(())
    }

    pub fn close(mut self) -> FsResult<()> {
        self.flush()?;
        self.message.close()
    }

    pub fn create(message: Message) -> Self {
        let now = now_secs();
        Directory {
            message,
            ctime: now,
            mtime: now,
            children: HashMap::new(),
            dirty: true,
        }
    }

    /// Parse a directory body out of an already-opened message.
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
        let mut info = info_line.splitn(2, '\t');
        let ctime: i64 = info.next().and_then(|s| s.parse().ok()).ok_or(FsError::CorruptNode)?;
        let mtime: i64 = info.next().and_then(|s| s.parse().ok()).ok_or(FsError::CorruptNode)?;

        let mut children = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let key: Identifier = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or(FsError::CorruptNode)?;
            let name = parts.next().ok_or(FsError::CorruptNode)?.to_string();
            children.insert(key, name);
        }

        Ok(Directory {
            message,
            ctime,
            mtime,
            children,
            dirty: false,
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
    fn serialize_then_parse_roundtrips_children() {
        let mut children = HashMap::new();
        let a = Identifier::random();
        let b = Identifier::random();
        children.insert(a, "foo.txt".to_string());
        children.insert(b, "subdir".to_string());

        let mut body = format!("d\r\n{}\t{}\r\n", 1000, 2000);
        for (key, name) in &children {
            body.push_str(&format!("{}\t{}\r\n", key, name));
        }

        let text = String::from_utf8_lossy(body.as_bytes());
        let mut lines = text.split("\r\n");
        assert_eq!(lines.next(), Some("d"));
        let info_line = lines.next().unwrap();
        let mut info = info_line.splitn(2, '\t');
        assert_eq!(info.next(), Some("1000"));
        assert_eq!(info.next(), Some("2000"));

        let mut parsed = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let key: Identifier = parts.next().unwrap().parse().unwrap();
            let name = parts.next().unwrap().to_string();
            parsed.insert(key, name);
        }
        assert_eq!(parsed, children);
    }

    #[test]
    fn get_child_by_name_is_case_sensitive_exact_match() {
        let mut children = HashMap::new();
        let id = Identifier::random();
        children.insert(id, "README.md".to_string());
        let found = children
            .iter()
            .find(|(_, name)| name.as_str() == "README.md")
            .map(|(k, _)| *k);
        assert_eq!(found, Some(id));
        let missing = children.iter().find(|(_, name)| name.as_str() == "readme.md");
        assert!(missing.is_none());
    }
}
