//! Counters for credential events.
//!
//! One [`AuthCounters`] is created at startup and shared through an `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AuthCounters {
    logins: AtomicU64,
    failed_logins: AtomicU64,
    sessions_created: AtomicU64,
    refresh_tokens_issued: AtomicU64,
    rotations: AtomicU64,
    reuse_detected: AtomicU64,
    mass_revocations: AtomicU64,
    password_verifications: AtomicU64,
}

/// Point-in-time copy of [`AuthCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub logins: u64,
    pub failed_logins: u64,
    pub sessions_created: u64,
    pub refresh_tokens_issued: u64,
    pub rotations: u64,
    pub reuse_detected: u64,
    pub mass_revocations: u64,
    pub password_verifications: u64,
}

impl AuthCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed_login(&self) {
        self.failed_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_token_issued(&self) {
        self.refresh_tokens_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reuse(&self) {
        self.reuse_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mass_revocation(&self) {
        self.mass_revocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn password_verification(&self) {
        self.password_verifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            logins: self.logins.load(Ordering::Relaxed),
            failed_logins: self.failed_logins.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            refresh_tokens_issued: self.refresh_tokens_issued.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            reuse_detected: self.reuse_detected.load(Ordering::Relaxed),
            mass_revocations: self.mass_revocations.load(Ordering::Relaxed),
            password_verifications: self.password_verifications.load(Ordering::Relaxed),
        }
    }
}
