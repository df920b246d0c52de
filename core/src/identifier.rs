/*
 * identifier.rs
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

//! 128-bit opaque node identifier. Doubles as the mail message subject, so its textual
//! form must be stable, ASCII-only, and safe inside an IMAP quoted string.

use rand::RngCore;
use std::fmt;
use std::str::FromStr;

/// Opaque identifier for a filesystem node or file block. Root is all-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; 16]);

impl Identifier {
    /// The fixed root directory identifier.
    pub const ROOT: Identifier = Identifier([0u8; 16]);

    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Identifier(bytes)
    }

    pub fn is_root(&self) -> bool {
        self.0 == [0u8; 16]
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Error returned when a string does not parse as a canonical identifier.
#[derive(Debug)]
pub struct ParseIdentifierError;

impl fmt::Display for ParseIdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a valid 32-hex-digit identifier")
    }
}

impl std::error::Error for ParseIdentifierError {}

impl FromStr for Identifier {
    type Err = ParseIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseIdentifierError);
        }
        let mut out = [0u8; 16];
        for i in 0..16 {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| ParseIdentifierError)?;
        }
        Ok(Identifier(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_all_zero_and_recognized() {
        assert!(Identifier::ROOT.is_root());
        assert_eq!(Identifier::ROOT.to_string(), "0".repeat(32));
    }

    #[test]
    fn random_identifiers_are_distinct_and_not_root() {
        let a = Identifier::random();
        let b = Identifier::random();
        assert_ne!(a, b);
        assert!(!a.is_root());
    }

    #[test]
    fn display_parse_roundtrip() {
        let id = Identifier::random();
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        let parsed: Identifier = text.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_text() {
        assert!("not-hex".parse::<Identifier>().is_err());
        assert!("abc".parse::<Identifier>().is_err());
    }
}
