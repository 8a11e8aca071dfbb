//! Single-operator admin session gate.
//!
//! There is exactly one session slot: issuing a new token replaces whatever
//! token was valid before, and logout clears the slot. Adequate for a site
//! with one admin; a multi-admin deployment swaps in another [`SessionStore`]
//! backed by a per-user token table.

use std::time::{Duration, Instant};

use axum::http::{HeaderMap, header};
use parking_lot::Mutex;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "admin_session";

/// Sessions expire 24 hours after issue, tracked here as well as in the
/// cookie's Max-Age so a replayed cookie cannot outlive the slot.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub trait SessionStore: Send + Sync {
    /// Issues a fresh token, replacing any previously valid one.
    fn issue(&self) -> String;

    /// True only for the exact, unexpired, currently stored token.
    fn validate(&self, token: &str) -> bool;

    /// Clears the slot; every token is invalid afterwards.
    fn revoke(&self);
}

struct Slot {
    token: String,
    issued_at: Instant,
}

pub struct SingleSlotSessions {
    slot: Mutex<Option<Slot>>,
    ttl: Duration,
}

impl SingleSlotSessions {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }
}

impl Default for SingleSlotSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for SingleSlotSessions {
    fn issue(&self) -> String {
        let token = Uuid::new_v4().to_string();
        *self.slot.lock() = Some(Slot {
            token: token.clone(),
            issued_at: Instant::now(),
        });
        token
    }

    fn validate(&self, token: &str) -> bool {
        match &*self.slot.lock() {
            Some(slot) => slot.issued_at.elapsed() < self.ttl && slot.token == token,
            None => false,
        }
    }

    fn revoke(&self) {
        *self.slot.lock() = None;
    }
}

/// Extracts the admin session token from a request's `Cookie` header.
pub fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;

    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// `Set-Cookie` value carrying a freshly issued token.
pub fn session_cookie(token: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
        SESSION_TTL.as_secs()
    )
}

/// `Set-Cookie` value that expires the session cookie immediately.
pub fn clear_cookie(secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{secure}")
}
