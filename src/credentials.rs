//! Credential pool with round-robin rotation.
//!
//! The pool is populated once, from a single comma-separated value, and is
//! never empty: construction fails with [`SanadError::Configuration`] instead.
//! The current index is shared by every in-flight call. Rotation only
//! advances it and only affects which credential the *next* attempt picks
//! up, so concurrent rotations need nothing stronger than an atomic.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::{Result, SanadError};

/// An opaque upstream secret and its position in the pool.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: Arc<str>,
    index: usize,
}

impl Credential {
    /// The raw secret, for placing in a request header.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Position of this credential in its pool.
    pub fn index(&self) -> usize {
        self.index
    }
}

// Never print the secret itself.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Ordered, non-empty list of credentials with a rotating cursor.
pub struct CredentialPool {
    credentials: Vec<Credential>,
    current: AtomicUsize,
    rotations: AtomicU64,
}

impl CredentialPool {
    /// Build a pool from individual secrets. Blank entries are skipped.
    pub fn new<I, S>(secrets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let credentials: Vec<Credential> = secrets
            .into_iter()
            .filter_map(|s| {
                let trimmed = s.as_ref().trim();
                (!trimmed.is_empty()).then(|| Arc::<str>::from(trimmed))
            })
            .enumerate()
            .map(|(index, secret)| Credential { secret, index })
            .collect();

        if credentials.is_empty() {
            return Err(SanadError::Configuration(
                "no upstream credentials configured".to_string(),
            ));
        }

        Ok(Self {
            credentials,
            current: AtomicUsize::new(0),
            rotations: AtomicU64::new(0),
        })
    }

    /// Parse a comma-separated configuration value (`"key-a,key-b"`).
    pub fn from_config_value(value: &str) -> Result<Self> {
        Self::new(value.split(','))
    }

    /// The credential the next attempt should use.
    pub fn current(&self) -> Credential {
        let index = self.current.load(Ordering::Relaxed) % self.credentials.len();
        self.credentials[index].clone()
    }

    /// Advance to the next credential, wrapping at the end.
    ///
    /// A pool of one stays on its only credential.
    pub fn rotate(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
        let len = self.credentials.len();
        if len == 1 {
            return;
        }
        // fetch_update never fails here: the closure always returns Some.
        let _ = self
            .current
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % len));
    }

    /// Number of credentials in the pool (always at least one).
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false; kept for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// How many times [`rotate`](Self::rotate) has been called.
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("len", &self.credentials.len())
            .field("current", &self.current.load(Ordering::Relaxed))
            .finish()
    }
}
