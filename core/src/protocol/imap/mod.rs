/*
 * mod.rs
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

//! A mailbox used as a blob store: subject-addressed messages, append-then-delete
//! mutation, a persistent single-threaded tokio runtime driving the async
//! [`client::ImapSession`] from synchronous callers.

mod client;

pub use client::{AppendResult, ImapClientError, ImapSession, SelectResult};

use crate::config::MountConfig;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::runtime::Runtime;

/// High-level, subject-addressed mail store client. Holds one IMAP connection and a
/// current-thread tokio runtime so synchronous callers (FUSE operation handlers) can
/// drive it without becoming async themselves.
pub struct MailStoreClient {
    runtime: Runtime,
    session: Mutex<Option<ImapSession>>,
    host: String,
    port: u16,
    user: String,
    password: String,
    mailbox: String,
    /// subject -> most recently observed UID. Invalidated on put/delete for that subject;
    /// a cache hit still needs a FETCH, it only saves the SEARCH round trip.
    uid_cache: Mutex<HashMap<String, u32>>,
}

impl MailStoreClient {
    /// Build a client from mount configuration. Does not connect; call `login` first.
    pub fn new(config: &MountConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(MailStoreClient {
            runtime,
            session: Mutex::new(None),
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            mailbox: config.mailbox.clone(),
            uid_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Connect, LOGIN, and SELECT the configured mailbox.
    pub fn login(&self) -> Result<SelectResult, ImapClientError> {
        let host = self.host.clone();
        let port = self.port;
        let user = self.user.clone();
        let password = self.password.clone();
        let mailbox = self.mailbox.clone();
        self.runtime.block_on(async {
            let mut session = ImapSession::connect(&host, port, &user, &password).await?;
            let result = session.select(&mailbox).await?;
            *self.session.lock().unwrap() = Some(session);
            Ok(result)
        })
    }

    /// LOGOUT and drop the connection. Safe to call even if never logged in.
    pub fn logout(&self) {
        let mut guard = self.session.lock().unwrap();
        if let Some(mut session) = guard.take() {
            let _ = self.runtime.block_on(async { session.logout().await });
        }
    }

    /// Run `f` against the live session, reconnecting once on transport failure.
    fn with_session<T>(
        &self,
        f: impl Fn(&mut ImapSession) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, ImapClientError>> + '_>>,
    ) -> Result<T, ImapClientError> {
        let mut guard = self.session.lock().unwrap();
        if guard.is_none() {
            drop(guard);
            self.login()?;
            guard = self.session.lock().unwrap();
        }
        let session = guard.as_mut().expect("session populated by login above");
        match self.runtime.block_on(f(session)) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!("mail store operation failed, reconnecting: {}", e);
                *guard = None;
                drop(guard);
                self.login()?;
                let mut guard = self.session.lock().unwrap();
                let session = guard.as_mut().expect("session populated by login above");
                self.runtime.block_on(f(session))
            }
        }
    }

    /// Resolve `subject` to a UID, preferring the cache, falling back to UID SEARCH.
    /// On a SEARCH, the cache is refreshed to the highest-numbered UID returned (last
    /// write wins when more than one message shares a subject, e.g. after a crash that
    /// left behind an un-deleted predecessor).
    pub fn get_uid_by_subject(&self, subject: &str) -> Result<Option<u32>, ImapClientError> {
        if let Some(uid) = self.uid_cache.lock().unwrap().get(subject).copied() {
            return Ok(Some(uid));
        }
        let subject = subject.to_string();
        let uids = self.with_session(|session| Box::pin(session.uid_search_subject(&subject)))?;
        let uid = uids.into_iter().max();
        if let Some(uid) = uid {
            self.uid_cache.lock().unwrap().insert(subject, uid);
        }
        Ok(uid)
    }

    /// Fetch the raw message body addressed by `subject`, or `None` if no such message.
    pub fn get_message(&self, subject: &str) -> Result<Option<Vec<u8>>, ImapClientError> {
        let uid = match self.get_uid_by_subject(subject)? {
            Some(uid) => uid,
            None => return Ok(None),
        };
        match self.with_session(|session| Box::pin(session.uid_fetch_body(uid)))? {
            Some(body) => Ok(Some(body)),
            None => {
                // Cache was stale (message expunged by another client); refresh and retry once.
                self.uid_cache.lock().unwrap().remove(subject);
                if let Some(uid) = self.get_uid_by_subject(subject)? {
                    self.with_session(|session| Box::pin(session.uid_fetch_body(uid)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// APPEND a new message with subject `subject` and body `rfc2822`, a fully formed
    /// message (headers + CRLF + body). Invalidates the subject's cache entry so the
    /// next read re-resolves to this UID rather than a stale one.
    pub fn put_message(&self, subject: &str, rfc2822: &[u8]) -> Result<(), ImapClientError> {
        let internaldate = current_internaldate();
        let mailbox = self.mailbox.clone();
        let data = rfc2822.to_vec();
        let result = self.with_session(|session| {
            let mailbox = mailbox.clone();
            let internaldate = internaldate.clone();
            let data = data.clone();
            Box::pin(async move { session.append(&mailbox, &internaldate, &data).await })
        })?;
        let mut cache = self.uid_cache.lock().unwrap();
        match result.appended_uid {
            Some(uid) => {
                cache.insert(subject.to_string(), uid);
            }
            None => {
                cache.remove(subject);
            }
        }
        debug!("put_message {} ({} bytes)", subject, rfc2822.len());
        Ok(())
    }

    /// Mark a specific UID as `\Deleted` directly, bypassing subject resolution. Used
    /// to retire a message's previous UID after a write has already appended its
    /// replacement under the same subject.
    pub fn delete_uid(&self, uid: u32) -> Result<(), ImapClientError> {
        self.with_session(|session| Box::pin(session.uid_delete(uid)))
    }

    /// Mark the message addressed by `subject` as `\Deleted`. No expunge: the server's
    /// own EXPUNGE/autoexpunge policy reclaims the slot. Always invalidates the cache
    /// entry for this subject, even if no message was found.
    pub fn delete_message(&self, subject: &str) -> Result<(), ImapClientError> {
        let uid = self.get_uid_by_subject(subject)?;
        self.uid_cache.lock().unwrap().remove(subject);
        if let Some(uid) = uid {
            self.with_session(|session| Box::pin(session.uid_delete(uid)))?;
            debug!("delete_message {} (uid {})", subject, uid);
        }
        Ok(())
    }
}

/// IMAP internaldate, e.g. `29-Jul-2026 00:00:00 +0000`. APPEND requires one; the exact
/// value is cosmetic since lookups are by subject, not by date.
fn current_internaldate() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let (h, m, s) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);
    // Civil-from-days (Howard Hinnant's algorithm), proleptic Gregorian.
    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m_num = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m_num <= 2 { y + 1 } else { y };
    format!(
        "{:02}-{}-{:04} {:02}:{:02}:{:02} +0000",
        d,
        MONTHS[(m_num - 1) as usize],
        y,
        h,
        m,
        s
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internaldate_has_the_expected_shape() {
        let s = current_internaldate();
        // "29-Jul-2026 00:00:00 +0000"
        assert_eq!(s.len(), 26);
        assert_eq!(s.as_bytes()[2], b'-');
        assert_eq!(s.as_bytes()[6], b'-');
        assert!(s.ends_with("+0000"));
    }

    #[test]
    fn client_builds_without_connecting() {
        let cfg = MountConfig::default();
        let client = MailStoreClient::new(&cfg).unwrap();
        assert!(client.session.lock().unwrap().is_none());
    }
}
