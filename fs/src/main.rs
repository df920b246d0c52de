/*
 * main.rs
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

//! Mount an IMAP mailbox as an encrypted filesystem: parse mount options, log in,
//! check (or create) the root directory, then hand control to the kernel via `fuser`.

mod filesystem;

use clap::Parser;
use filesystem::ImapFilesystem;
use imapfs_core::config::MountConfig;
use imapfs_core::envelope::EnvelopeCodec;
use imapfs_core::protocol::imap::MailStoreClient;
use log::info;
use std::process::ExitCode;
use std::sync::Arc;

/// Mount an IMAP mailbox as an encrypted filesystem.
#[derive(Parser, Debug)]
#[command(name = "imapfs", about = "Mount an IMAP mailbox as an encrypted filesystem")]
struct Cli {
    /// Local directory to mount on.
    mountpoint: String,

    /// IMAP server hostname.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// IMAP server port (implicit TLS).
    #[arg(long, default_value_t = 993)]
    port: u16,

    /// IMAP login user.
    #[arg(long)]
    user: String,

    /// IMAP login password.
    #[arg(long)]
    password: String,

    /// Encryption passphrase. Distinct from the IMAP password.
    #[arg(long)]
    key: String,

    /// PBKDF2 iteration count for key derivation.
    #[arg(long, default_value_t = 10_000)]
    rounds: u32,

    /// Mailbox to use as the backing store.
    #[arg(long, default_value = "INBOX")]
    mailbox: String,

    /// Run fuser in the foreground with debug output.
    #[arg(long)]
    foreground: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = MountConfig {
        host: cli.host,
        port: cli.port,
        user: cli.user,
        password: cli.password,
        key: cli.key,
        rounds: cli.rounds,
        mailbox: cli.mailbox,
    };

    let conn = match MailStoreClient::new(&config) {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            eprintln!("imapfs: failed to build mail store client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = conn.login() {
        eprintln!("imapfs: login failed: {}", e);
        return ExitCode::FAILURE;
    }

    let codec = Arc::new(EnvelopeCodec::new(&config.key, config.rounds));

    match filesystem::check_filesystem(&conn, &codec) {
        Ok(Some(true)) => info!("found existing filesystem"),
        Ok(Some(false)) => {
            eprintln!("imapfs: root directory did not decrypt with the given key");
            conn.logout();
            return ExitCode::FAILURE;
        }
        Ok(None) => {
            info!("no filesystem found, initializing");
            if let Err(e) = filesystem::init_filesystem(conn.clone(), codec.clone()) {
                eprintln!("imapfs: failed to initialize filesystem: {}", e);
                conn.logout();
                return ExitCode::FAILURE;
            }
        }
        Err(e) => {
            eprintln!("imapfs: failed to check filesystem: {}", e);
            conn.logout();
            return ExitCode::FAILURE;
        }
    }

    let fs = ImapFilesystem::new(conn.clone(), codec);
    let mut options = vec![fuser::MountOption::FSName("imapfs".to_string())];
    if !cli.foreground {
        options.push(fuser::MountOption::AutoUnmount);
    }

    let result = fuser::mount2(fs, &cli.mountpoint, &options);
    conn.logout();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("imapfs: mount failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
