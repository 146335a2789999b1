use sha2::{Digest as _, Sha256};
use std::fmt;

/// Content digest of one fetched snapshot. Byte-exact and order-sensitive:
/// any single-byte difference in the payload yields a different digest.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn of(payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Digest(hasher.finalize().into())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short hex prefix is enough to identify a snapshot in logs
        for b in self.0.iter().take(8) {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

/// Tracks the digest of the last snapshot that triggered a load.
///
/// Owned by the scheduling loop and passed by reference into the comparison
/// step; starts empty so the first successful fetch always loads.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last: Option<Digest>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `payload` differs from the last observed snapshot
    /// (or is the first one), advancing the retained digest. The digest
    /// advances at trigger time, not after the load completes.
    pub fn observe(&mut self, payload: &[u8]) -> bool {
        let digest = Digest::of(payload);
        if self.last == Some(digest) {
            return false;
        }
        self.last = Some(digest);
        true
    }

    pub fn last(&self) -> Option<&Digest> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_payload_always_triggers() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.observe(b"a,b,c\n1,2,3\n"));
    }

    #[test]
    fn identical_payload_suppresses_reload() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.observe(b"a,b,c\n1,2,3\n"));
        assert!(!tracker.observe(b"a,b,c\n1,2,3\n"));
        assert!(!tracker.observe(b"a,b,c\n1,2,3\n"));
    }

    #[test]
    fn single_byte_change_triggers() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.observe(b"a,b,c\n1,2,3\n"));
        assert!(tracker.observe(b"a,b,c\n1,2,4\n"));
    }

    #[test]
    fn digests_differ_for_different_payloads() {
        assert_ne!(Digest::of(b"x"), Digest::of(b"y"));
        assert_eq!(Digest::of(b"x"), Digest::of(b"x"));
    }
}
