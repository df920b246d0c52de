/*
 * config.rs
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

//! Mount-time configuration: host, port, credentials, key derivation rounds, mailbox.
//! The CLI front-end (in the `fs` binary) is the only thing that builds one of these;
//! this crate only defines the shape and its defaults.

/// Options read from the host bridge's mount-options surface (or a CLI front-end).
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub key: String,
    pub rounds: u32,
    pub mailbox: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            host: "localhost".to_string(),
            port: 993,
            user: String::new(),
            password: String::new(),
            key: String::new(),
            rounds: 10_000,
            mailbox: "INBOX".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_mount_option_table() {
        let cfg = MountConfig::default();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 993);
        assert_eq!(cfg.rounds, 10_000);
        assert_eq!(cfg.mailbox, "INBOX");
        assert!(cfg.user.is_empty());
        assert!(cfg.password.is_empty());
    }
}
