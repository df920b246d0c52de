/*
 * filesystem.rs
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

//! Bridges the node/message model in `imapfs_core` to `fuser`'s ino-addressed
//! `Filesystem` trait. Path resolution, the open-node cache, and the inode table all
//! live here; everything below this layer only knows about [`Identifier`]s.

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use imapfs_core::block_file::{File, BLOCK_SIZE};
use imapfs_core::directory::Directory;
use imapfs_core::envelope::EnvelopeCodec;
use imapfs_core::error::FsError;
use imapfs_core::identifier::Identifier;
use imapfs_core::message::Message;
use imapfs_core::node::Node;
use imapfs_core::protocol::imap::MailStoreClient;
use log::warn;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TTL: Duration = Duration::from_secs(1);

/// Bidirectional inode <-> Identifier table. FUSE's root ino (1) always maps to the
/// all-zero root identifier; every other mapping is allocated on first lookup.
struct InoTable {
    by_ino: HashMap<u64, Identifier>,
    by_id: HashMap<Identifier, u64>,
    next: AtomicU64,
}

impl InoTable {
    fn new() -> Self {
        let mut by_ino = HashMap::new();
        let mut by_id = HashMap::new();
        by_ino.insert(fuser::FUSE_ROOT_ID, Identifier::ROOT);
        by_id.insert(Identifier::ROOT, fuser::FUSE_ROOT_ID);
        InoTable {
            by_ino,
            by_id,
            next: AtomicU64::new(fuser::FUSE_ROOT_ID + 1),
        }
    }

    fn ino_for(&mut self, id: Identifier) -> u64 {
        if let Some(&ino) = self.by_id.get(&id) {
            return ino;
        }
        let ino = self.next.fetch_add(1, Ordering::Relaxed);
        self.by_id.insert(id, ino);
        self.by_ino.insert(ino, id);
        ino
    }

    fn id_for(&self, ino: u64) -> Option<Identifier> {
        self.by_ino.get(&ino).copied()
    }
}

/// FUSE bridge. Holds the mail-store client, the envelope codec, the inode table, and
/// the open-node cache (unbounded: matches the original, which never evicts).
pub struct ImapFilesystem {
    conn: Arc<MailStoreClient>,
    codec: Arc<EnvelopeCodec>,
    inos: Mutex<InoTable>,
    open_nodes: Mutex<HashMap<Identifier, Node>>,
}

impl ImapFilesystem {
    pub fn new(conn: Arc<MailStoreClient>, codec: Arc<EnvelopeCodec>) -> Self {
        ImapFilesystem {
            conn,
            codec,
            inos: Mutex::new(InoTable::new()),
            open_nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` against the node for `ino`, opening it from the mail store on a cache
    /// miss. `f` may mutate the node; the result is left cached afterwards.
    fn with_node<T>(&self, ino: u64, f: impl FnOnce(&mut Node) -> Result<T, FsError>) -> Result<T, FsError> {
        let id = self.inos.lock().unwrap().id_for(ino).ok_or(FsError::NotFound)?;
        let mut cache = self.open_nodes.lock().unwrap();
        if !cache.contains_key(&id) {
            let node = Node::open(self.conn.clone(), self.codec.clone(), id)?;
            cache.insert(id, node);
        }
        let node = cache.get_mut(&id).expect("just inserted above");
        f(node)
    }

    /// Resolve a child's identifier by name under `parent_ino`'s directory.
    fn child_id(&self, parent_ino: u64, name: &str) -> Result<Identifier, FsError> {
        self.with_node(parent_ino, |node| {
            let dir = node.as_directory()?;
            dir.get_child_by_name(name).ok_or(FsError::NotFound)
        })
    }

    fn attr_for(&self, ino: u64, node: &Node) -> FileAttr {
        let now = SystemTime::now();
        match node {
            Node::Directory(dir) => directory_attr(ino, dir, now),
            Node::File(file) => file_attr(ino, file, now),
        }
    }

    /// Create a fresh child node (file or directory) under `parent_ino`, named `name`.
    /// Validates and updates the parent directory before the child is ever registered
    /// in the ino table or node cache, so a failing parent leaves nothing behind.
    fn create_child(&self, parent_ino: u64, name: &str, is_dir: bool) -> Result<(u64, FileAttr), FsError> {
        match self.child_id(parent_ino, name) {
            Ok(_) => return Err(FsError::Exists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let message = Message::create(self.conn.clone(), self.codec.clone());
        let child_id = message.name();
        let node = if is_dir {
            Node::new_directory(message)
        } else {
            Node::new_file(message)
        };

        self.with_node(parent_ino, |parent| {
            let dir = parent.as_directory_mut()?;
            dir.add_child(child_id, name.to_string());
            dir.flush()
        })?;

        let ino = self.inos.lock().unwrap().ino_for(child_id);
        let attr = self.attr_for(ino, &node);
        self.open_nodes.lock().unwrap().insert(child_id, node);
        Ok((ino, attr))
    }
}

fn directory_attr(ino: u64, dir: &Directory, now: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size: 4096,
        blocks: 1,
        atime: now,
        mtime: epoch_secs(dir.mtime()),
        ctime: epoch_secs(dir.ctime()),
        crtime: epoch_secs(dir.ctime()),
        kind: FileType::Directory,
        perm: 0o777,
        nlink: 2,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn file_attr(ino: u64, file: &File, now: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size: file.size(),
        blocks: file.size().div_ceil(BLOCK_SIZE),
        atime: now,
        mtime: epoch_secs(file.mtime()),
        ctime: epoch_secs(file.ctime()),
        crtime: epoch_secs(file.ctime()),
        kind: FileType::RegularFile,
        perm: 0o666,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn epoch_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH
    }
}

impl Filesystem for ImapFilesystem {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = match name.to_str() {
            Some(n) => n,
            None => return reply.error(libc::EINVAL),
        };
        match self.child_id(parent, name) {
            Ok(id) => {
                let ino = self.inos.lock().unwrap().ino_for(id);
                match self.with_node(ino, |node| Ok(self.attr_for(ino, node))) {
                    Ok(attr) => reply.entry(&TTL, &attr, 0),
                    Err(e) => reply.error(e.to_errno()),
                }
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.with_node(ino, |node| Ok(self.attr_for(ino, node))) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        // chmod/chown are accepted but not persisted: this filesystem reports fixed
        // modes for every node.
        let result = self.with_node(ino, |node| {
            if let Some(size) = size {
                node.as_file_mut()?.truncate(size)?;
            }
            if let Some(mtime) = mtime {
                let secs = match mtime {
                    TimeOrNow::SpecificTime(t) => t
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs() as i64)
                        .unwrap_or(0),
                    TimeOrNow::Now => SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs() as i64)
                        .unwrap_or(0),
                };
                match node {
                    Node::Directory(d) => d.set_mtime(secs),
                    Node::File(f) => f.set_mtime(secs),
                }
            }
            node.flush()?;
            Ok(self.attr_for(ino, node))
        });
        match result {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        // Collect children first so the outer `with_node` lock on this directory is
        // released before we look up each child's own node below (re-entering
        // `with_node` while its guard is still held would deadlock on `open_nodes`).
        let children = match self.with_node(ino, |node| {
            let dir = node.as_directory()?;
            Ok(dir.children().iter().map(|(id, name)| (*id, name.clone())).collect::<Vec<_>>())
        }) {
            Ok(children) => children,
            Err(e) => return reply.error(e.to_errno()),
        };

        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        for (child_id, name) in children {
            let child_ino = self.inos.lock().unwrap().ino_for(child_id);
            let kind = match self.with_node(child_ino, |node| Ok(node.is_directory())) {
                Ok(true) => FileType::Directory,
                Ok(false) => FileType::RegularFile,
                Err(e) => return reply.error(e.to_errno()),
            };
            entries.push((child_ino, kind, name));
        }

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        let name = match name.to_str() {
            Some(n) => n,
            None => return reply.error(libc::EINVAL),
        };
        match self.create_child(parent, name, true) {
            Ok((_ino, attr)) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let name = match name.to_str() {
            Some(n) => n,
            None => return reply.error(libc::EINVAL),
        };
        match self.create_child(parent, name, false) {
            Ok((_ino, attr)) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match name.to_str() {
            Some(n) => n,
            None => return reply.error(libc::EINVAL),
        };
        let result = (|| {
            let child_id = self.child_id(parent, name)?;
            let child_ino = self.inos.lock().unwrap().ino_for(child_id);
            let empty = self.with_node(child_ino, |node| Ok(node.as_directory()?.children().is_empty()))?;
            if !empty {
                return Err(FsError::NotEmpty);
            }
            self.with_node(parent, |node| {
                let dir = node.as_directory_mut()?;
                dir.remove_child(child_id);
                dir.flush()
            })?;
            if let Some(node) = self.open_nodes.lock().unwrap().remove(&child_id) {
                node.close()?;
            } else {
                Message::unlink(&self.conn, child_id)?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match name.to_str() {
            Some(n) => n,
            None => return reply.error(libc::EINVAL),
        };
        let result = (|| {
            let child_id = self.child_id(parent, name)?;
            let ino = self.inos.lock().unwrap().ino_for(child_id);
            self.with_node(ino, |node| node.as_file().map(|_| ()))?;
            self.with_node(parent, |node| {
                let dir = node.as_directory_mut()?;
                dir.remove_child(child_id);
                dir.flush()
            })?;
            let node = self
                .open_nodes
                .lock()
                .unwrap()
                .remove(&child_id)
                .expect("just confirmed open above");
            match node {
                Node::File(file) => file.delete(),
                Node::Directory(_) => unreachable!("checked as_file above"),
            }
        })();
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (name, newname) = match (name.to_str(), newname.to_str()) {
            (Some(a), Some(b)) => (a, b),
            _ => return reply.error(libc::EINVAL),
        };
        let result = (|| {
            let child_id = self.child_id(parent, name)?;
            if self.child_id(newparent, newname).is_ok() {
                return Err(FsError::Exists);
            }
            if parent == newparent {
                self.with_node(parent, |node| {
                    let dir = node.as_directory_mut()?;
                    dir.remove_child(child_id);
                    dir.add_child(child_id, newname.to_string());
                    dir.flush()
                })
            } else {
                self.with_node(parent, |node| {
                    let dir = node.as_directory_mut()?;
                    dir.remove_child(child_id);
                    dir.flush()
                })?;
                // Fixed: the new parent's entry uses the destination name, not the
                // source name.
                self.with_node(newparent, |node| {
                    let dir = node.as_directory_mut()?;
                    dir.add_child(child_id, newname.to_string());
                    dir.flush()
                })
            }
        })();
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let result = self.with_node(ino, |node| {
            let file = node.as_file_mut()?;
            file.seek(offset as u64)?;
            file.read(size as u64)
        });
        match result {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = self.with_node(ino, |node| {
            let file = node.as_file_mut()?;
            file.seek(offset as u64)?;
            file.write(data)
        });
        match result {
            Ok(()) => reply.written(data.len() as u32),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // A no-op: only release/releasedir actually flush to the mail store, matching
        // the original.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.with_node(ino, |node| node.flush()) {
            Ok(()) => reply.ok(),
            Err(e) => {
                warn!("release: flush failed for ino {}: {}", ino, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn releasedir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        match self.with_node(ino, |node| node.flush()) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(0, 0, 0, 0, 0, BLOCK_SIZE as u32, 255, BLOCK_SIZE as u32);
    }
}

/// Check the root node. `Ok(None)` = no filesystem yet (fresh mailbox); `Ok(Some(true))`
/// = a valid encrypted directory was found; `Ok(Some(false))` = present but does not
/// decrypt with the given key. A transport failure is fatal at startup and propagates.
pub fn check_filesystem(conn: &Arc<MailStoreClient>, codec: &Arc<EnvelopeCodec>) -> Result<Option<bool>, FsError> {
    match conn
        .get_message(&Identifier::ROOT.to_string())
        .map_err(|e| FsError::Transport(e.to_string()))?
    {
        None => Ok(None),
        Some(_) => match Node::open(conn.clone(), codec.clone(), Identifier::ROOT) {
            Ok(node) => Ok(Some(node.is_directory())),
            Err(FsError::WrongKey) | Err(FsError::CorruptNode) => Ok(Some(false)),
            Err(e) => Err(e),
        },
    }
}

/// Create the root directory descriptor.
pub fn init_filesystem(conn: Arc<MailStoreClient>, codec: Arc<EnvelopeCodec>) -> Result<(), FsError> {
    let message = Message::create_named(conn, codec, Identifier::ROOT);
    let dir = Directory::create(message);
    dir.close()
}
