//! Per-stream request epochs
//!
//! Every logical load takes a fresh token before issuing any request and
//! checks it again right before committing. Only the most recently issued
//! token of a stream is current, so results of superseded requests are
//! discarded no matter in which order the network returns them.

use crate::models::{EntityIdentity, EntityKind};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of an independently-versioned data stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Stream carrying the reconciled set of one entity kind
    pub fn for_kind(kind: EntityKind) -> Self {
        Self(kind.plural().to_string())
    }

    /// Stream owned by the poll session of one identity
    pub fn for_poll(identity: &EntityIdentity) -> Self {
        Self(format!("poll:{}", identity))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Epoch captured by one load operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochToken {
    stream: StreamId,
    value: u64,
}

impl EpochToken {
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Monotonic counter per stream.
///
/// Retired streams restart above every value retired so far, so a token
/// handed out before retirement can never become current again.
#[derive(Debug, Default)]
pub struct EpochGuard {
    counters: DashMap<StreamId, u64>,
    retired_floor: AtomicU64,
}

impl EpochGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the stream and return its new current token
    pub fn next_epoch(&self, stream: &StreamId) -> EpochToken {
        let mut counter = self
            .counters
            .entry(stream.clone())
            .or_insert_with(|| self.retired_floor.load(Ordering::SeqCst));
        *counter += 1;
        EpochToken {
            stream: stream.clone(),
            value: *counter,
        }
    }

    /// True iff no newer token has been issued for the token's stream
    pub fn is_current(&self, token: &EpochToken) -> bool {
        self.counters
            .get(&token.stream)
            .map(|current| *current == token.value)
            .unwrap_or(false)
    }

    /// Advance the stream only if `token` is still current.
    ///
    /// Returns true when the token was current and is now superseded.
    pub fn invalidate(&self, token: &EpochToken) -> bool {
        match self.counters.get_mut(&token.stream) {
            Some(mut current) if *current == token.value => {
                *current += 1;
                true
            }
            _ => false,
        }
    }

    /// Drop the stream's counter. Used for short-lived streams such as
    /// poll sessions; returns false if the stream had no counter.
    pub fn retire(&self, stream: &StreamId) -> bool {
        // the floor is raised under the shard lock `next_epoch` also takes
        self.counters
            .remove_if(stream, |_, current| {
                self.retired_floor.fetch_max(*current, Ordering::SeqCst);
                true
            })
            .is_some()
    }

    /// Current counter value for the stream (0 if never loaded)
    pub fn current(&self, stream: &StreamId) -> u64 {
        self.counters.get(stream).map(|v| *v).unwrap_or(0)
    }

    /// Number of streams holding a counter
    pub fn stream_count(&self) -> usize {
        self.counters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_token_is_current() {
        let guard = EpochGuard::new();
        let stream = StreamId::for_kind(EntityKind::Pod);

        let first = guard.next_epoch(&stream);
        let second = guard.next_epoch(&stream);
        let third = guard.next_epoch(&stream);

        assert!(!guard.is_current(&first));
        assert!(!guard.is_current(&second));
        assert!(guard.is_current(&third));
        assert_eq!(guard.current(&stream), 3);
    }

    #[test]
    fn test_streams_are_independent() {
        let guard = EpochGuard::new();
        let pods = guard.next_epoch(&StreamId::for_kind(EntityKind::Pod));
        let _nodes = guard.next_epoch(&StreamId::for_kind(EntityKind::Node));
        let _nodes = guard.next_epoch(&StreamId::for_kind(EntityKind::Node));

        assert!(guard.is_current(&pods));
    }

    #[test]
    fn test_tokens_are_never_reused() {
        let guard = EpochGuard::new();
        let stream = StreamId::new("deployments");
        let values: Vec<u64> = (0..50).map(|_| guard.next_epoch(&stream).value()).collect();

        for pair in values.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_invalidate_only_affects_current_token() {
        let guard = EpochGuard::new();
        let stream = StreamId::for_poll(&EntityIdentity::node("n1"));

        let old = guard.next_epoch(&stream);
        let new = guard.next_epoch(&stream);

        assert!(!guard.invalidate(&old));
        assert!(guard.is_current(&new));

        assert!(guard.invalidate(&new));
        assert!(!guard.is_current(&new));
    }

    #[test]
    fn test_retired_stream_restarts_above_old_tokens() {
        let guard = EpochGuard::new();
        let stream = StreamId::for_poll(&EntityIdentity::node("n1"));
        let other = guard.next_epoch(&StreamId::for_kind(EntityKind::Node));

        let _stale = guard.next_epoch(&stream);
        let finished = guard.next_epoch(&stream);

        assert!(guard.retire(&stream));
        assert!(!guard.retire(&stream));
        assert_eq!(guard.stream_count(), 1);
        assert!(!guard.is_current(&finished));

        let next = guard.next_epoch(&stream);
        assert!(next.value() > finished.value());
        assert!(!guard.is_current(&finished));
        assert!(!guard.invalidate(&finished));
        assert!(guard.is_current(&next));

        // streams that were never retired keep counting from their own value
        assert!(guard.is_current(&other));
        assert_eq!(guard.next_epoch(&StreamId::for_kind(EntityKind::Node)).value(), 2);
    }

    #[test]
    fn test_unknown_stream_is_never_current() {
        let guard = EpochGuard::new();
        let other = EpochGuard::new();
        let token = other.next_epoch(&StreamId::new("jobs"));

        assert!(!guard.is_current(&token));
        assert_eq!(guard.current(&StreamId::new("jobs")), 0);
    }

    #[test]
    fn test_poll_stream_names() {
        let identity = EntityIdentity::namespaced(EntityKind::Deployment, "default", "web");
        assert_eq!(StreamId::for_poll(&identity).as_str(), "poll:deployment/default/web");
        assert_eq!(StreamId::for_kind(EntityKind::CronJob).as_str(), "cronjobs");
    }
}
