//! Per-account session state.
//!
//! A [`SessionContext`] is created once login has produced the session keys
//! and is then shared (behind an `Arc`) by every component that builds
//! requests. The keys are read-only; the only mutable piece is the outgoing
//! message sequence counter, which is advanced atomically.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// Key material obtained at login.
#[derive(Clone, Default)]
pub struct SessionKeys {
    /// Key used to sign outgoing frames.
    pub session_key: Vec<u8>,
    /// Web session key (`skey`).
    pub s_key: Vec<u8>,
    /// Per-domain web keys (`p_skey`), keyed by domain.
    pub ps_keys: HashMap<String, Vec<u8>>,
}

impl SessionKeys {
    /// Creates keys with a session key and a web session key.
    pub fn new(session_key: impl Into<Vec<u8>>, s_key: impl Into<Vec<u8>>) -> Self {
        Self {
            session_key: session_key.into(),
            s_key: s_key.into(),
            ps_keys: HashMap::new(),
        }
    }

    /// Builder: add a per-domain web key.
    pub fn with_ps_key(mut self, domain: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        self.ps_keys.insert(domain.into(), key.into());
        self
    }
}

// Key bytes never end up in logs.
impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("session_key", &format_args!("<{} bytes>", self.session_key.len()))
            .field("s_key", &format_args!("<{} bytes>", self.s_key.len()))
            .field("ps_keys", &self.ps_keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Session state for one logged-in account.
#[derive(Debug)]
pub struct SessionContext {
    account: u64,
    nick: String,
    keys: SessionKeys,
    message_sequence: AtomicI32,
}

impl SessionContext {
    /// Creates a session context for `account`.
    ///
    /// `initial_sequence` is the last sequence id handed out by the server at
    /// login; the first call to [`next_sequence_id`](Self::next_sequence_id)
    /// returns `initial_sequence + 1`.
    pub fn new(account: u64, nick: impl Into<String>, keys: SessionKeys, initial_sequence: i32) -> Self {
        Self {
            account,
            nick: nick.into(),
            keys,
            message_sequence: AtomicI32::new(initial_sequence),
        }
    }

    /// Returns the account identifier.
    pub fn account(&self) -> u64 {
        self.account
    }

    /// Returns the account nickname.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Returns the session keys.
    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Returns the web key for `domain`, if login produced one.
    pub fn ps_key(&self, domain: &str) -> Option<&[u8]> {
        self.keys.ps_keys.get(domain).map(Vec::as_slice)
    }

    /// Allocates the next outgoing message sequence id.
    ///
    /// Concurrent callers never observe the same value. The counter wraps on
    /// overflow.
    pub fn next_sequence_id(&self) -> i32 {
        self.message_sequence
            .fetch_add(1, Ordering::SeqCst)
            .wrapping_add(1)
    }

    /// Returns the last allocated sequence id without advancing the counter.
    pub fn current_sequence_id(&self) -> i32 {
        self.message_sequence.load(Ordering::SeqCst)
    }

    /// Returns the CSRF token (`bkn`) web endpoints expect alongside `skey`.
    pub fn csrf_token(&self) -> i32 {
        self.keys
            .s_key
            .iter()
            .fold(5381i32, |acc, &b| {
                acc.wrapping_add(acc.wrapping_shl(5))
                    .wrapping_add(b as i8 as i32)
            })
    }
}
