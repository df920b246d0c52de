/*
 * error.rs
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

//! Filesystem and mail-store errors.

use std::fmt;

/// Errors surfaced by the mail-store client and the node/block-file layer.
#[derive(Debug)]
pub enum FsError {
    /// Root exists but does not decrypt to a well-formed directory.
    WrongKey,
    /// Connection, login, or select failure.
    Transport(String),
    /// Path resolution failed, or a referenced message disappeared.
    NotFound,
    /// Create/rename would overwrite an existing entry.
    Exists,
    /// A directory operation (e.g. `readdir`, path-walk through a parent) was
    /// attempted on a file.
    NotADirectory,
    /// A file operation (`read`/`write`/`truncate`) was attempted on a directory.
    NotAFile,
    /// `rmdir` on a non-empty directory.
    NotEmpty,
    /// Decoded node body's first byte is neither `'f'` nor `'d'`.
    CorruptNode,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::WrongKey => write!(f, "root directory did not decrypt with the given key"),
            FsError::Transport(m) => write!(f, "mail store transport error: {}", m),
            FsError::NotFound => write!(f, "node not found"),
            FsError::Exists => write!(f, "node already exists"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::NotAFile => write!(f, "is a directory"),
            FsError::NotEmpty => write!(f, "directory not empty"),
            FsError::CorruptNode => write!(f, "node body has an unrecognized type byte"),
        }
    }
}

impl std::error::Error for FsError {}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::Transport(e.to_string())
    }
}

/// Map an `FsError` to the negative errno a FUSE handler should reply with.
/// `CorruptNode` and `WrongKey` have no natural errno and surface as `EIO`; callers
/// that can detect `WrongKey` at startup should handle it before it reaches this path.
impl FsError {
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            FsError::WrongKey => libc::EIO,
            FsError::Transport(_) => libc::EIO,
            FsError::NotFound => libc::ENOENT,
            FsError::Exists => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::NotAFile => libc::EISDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::CorruptNode => libc::EIO,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(FsError::Exists.to_errno(), libc::EEXIST);
        assert_eq!(FsError::NotEmpty.to_errno(), libc::ENOTEMPTY);
        assert_eq!(FsError::NotAFile.to_errno(), libc::EISDIR);
        assert_eq!(FsError::NotADirectory.to_errno(), libc::ENOTDIR);
    }
}
