//! Nonce generation and reuse tracking.

use std::collections::{HashSet, VecDeque};

/// Freshness nonce carried in the server identity proof.
pub const FRESHNESS_NONCE_LEN: usize = 32;
/// AEAD nonce (96 bits) for channel messages.
pub const AEAD_NONCE_LEN: usize = 12;
/// Nonce material for key wrapping.
pub const WRAP_NONCE_LEN: usize = 24;

/// Error type for nonce operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NonceError {
    #[error("randomness source unavailable")]
    RngUnavailable,
    #[error("nonce already used in this session")]
    Reused,
    #[error("nonce registry is full")]
    Exhausted,
}

/// Fill a fresh `N`-byte nonce from the OS randomness source.
pub fn random_nonce<const N: usize>() -> Result<[u8; N], NonceError> {
    let mut nonce = [0u8; N];
    getrandom::getrandom(&mut nonce).map_err(|_| NonceError::RngUnavailable)?;
    Ok(nonce)
}

/// Nonces an outbound registry remembers before forgetting the oldest.
pub const DEFAULT_NONCE_WINDOW: usize = 1024;
/// Inbound envelopes one key may accept before it has to be replaced.
pub const MAX_MESSAGES_PER_KEY: usize = 4096;

/// What a full registry does with the next nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Forget the oldest recorded nonce.
    Evict,
    /// Refuse with [`NonceError::Exhausted`].
    Refuse,
}

/// Bounded set of nonces already used with one key.
///
/// The sending side keeps a sliding window of recent nonces (`Evict`); a
/// random 96-bit nonce colliding with one that has left the window is not
/// checked. The receiving side must never forget an accepted nonce, so it
/// uses `Refuse` and the key is replaced once the registry is full.
#[derive(Debug)]
pub struct NonceRegistry {
    seen: HashSet<[u8; AEAD_NONCE_LEN]>,
    order: VecDeque<[u8; AEAD_NONCE_LEN]>,
    capacity: usize,
    policy: WindowPolicy,
    total: u64,
}

impl Default for NonceRegistry {
    fn default() -> Self {
        Self::window(DEFAULT_NONCE_WINDOW)
    }
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sliding window over the last `capacity` nonces.
    pub fn window(capacity: usize) -> Self {
        Self::with_policy(capacity, WindowPolicy::Evict)
    }

    /// At most `capacity` nonces, none of them forgotten.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_policy(capacity, WindowPolicy::Refuse)
    }

    fn with_policy(capacity: usize, policy: WindowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity.min(DEFAULT_NONCE_WINDOW)),
            order: VecDeque::with_capacity(capacity.min(DEFAULT_NONCE_WINDOW)),
            capacity,
            policy,
            total: 0,
        }
    }

    /// Record `nonce`; fails if it is still remembered or the registry refuses.
    pub fn check_and_insert(&mut self, nonce: &[u8; AEAD_NONCE_LEN]) -> Result<(), NonceError> {
        if self.seen.contains(nonce) {
            return Err(NonceError::Reused);
        }
        if self.order.len() >= self.capacity {
            match self.policy {
                WindowPolicy::Evict => {
                    if let Some(oldest) = self.order.pop_front() {
                        self.seen.remove(&oldest);
                    }
                }
                WindowPolicy::Refuse => return Err(NonceError::Exhausted),
            }
        }
        self.seen.insert(*nonce);
        self.order.push_back(*nonce);
        self.total += 1;
        Ok(())
    }

    /// Draw a nonce that is not currently remembered, and record it.
    pub fn fresh(&mut self) -> Result<[u8; AEAD_NONCE_LEN], NonceError> {
        loop {
            let nonce = random_nonce::<AEAD_NONCE_LEN>()?;
            match self.check_and_insert(&nonce) {
                Ok(()) => return Ok(nonce),
                Err(NonceError::Reused) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn contains(&self, nonce: &[u8; AEAD_NONCE_LEN]) -> bool {
        self.seen.contains(nonce)
    }

    /// True when a `Refuse` registry cannot take another nonce.
    pub fn is_exhausted(&self) -> bool {
        self.policy == WindowPolicy::Refuse && self.order.len() >= self.capacity
    }

    /// Most recently recorded nonce.
    pub fn last(&self) -> Option<&[u8; AEAD_NONCE_LEN]> {
        self.order.back()
    }

    /// Nonces currently remembered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Nonces ever recorded, including forgotten ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
        self.total = 0;
    }
}
