/*
 * lib.rs
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

//! Core of an encrypted filesystem that stores every file and directory as an
//! individually encrypted mail message in an IMAP mailbox. This crate has no FUSE
//! dependency: it owns the mail-store protocol, the envelope cipher, and the
//! directory/file node model. The `fs` binary wires it to the kernel.

pub mod block_file;
pub mod config;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod identifier;
pub mod message;
pub mod net;
pub mod node;
pub mod protocol;
