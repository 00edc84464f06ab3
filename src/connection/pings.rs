//! Pending pings, in the order they were sent.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub(crate) struct PingRegistry {
    pending: VecDeque<(Vec<u8>, oneshot::Sender<()>)>,
}

impl PingRegistry {
    /// Register a waiter for `payload`.
    ///
    /// A payload whose previous waiter was dropped can be reused.
    pub(crate) fn register(&mut self, payload: Vec<u8>) -> Result<oneshot::Receiver<()>> {
        if let Some(pos) = self.position(&payload) {
            if !self.pending[pos].1.is_closed() {
                return Err(Error::PingInFlight(payload));
            }
            self.pending.remove(pos);
        }
        let (tx, rx) = oneshot::channel();
        self.pending.push_back((payload, tx));
        Ok(rx)
    }

    /// Forget the waiter for `payload` without waking it.
    pub(crate) fn remove(&mut self, payload: &[u8]) {
        if let Some(pos) = self.position(payload) {
            self.pending.remove(pos);
        }
    }

    /// Handle a pong. Every ping sent before the matching one is considered
    /// answered too. Returns the number of waiters woken; a pong that matches
    /// nothing wakes no one.
    pub(crate) fn resolve(&mut self, payload: &[u8]) -> usize {
        if self.position(payload).is_none() {
            return 0;
        }
        let mut woken = 0;
        while let Some((pending, waiter)) = self.pending.pop_front() {
            let _ = waiter.send(());
            woken += 1;
            if pending == payload {
                break;
            }
        }
        woken
    }

    /// Drop every waiter. Their receivers observe a closed channel.
    pub(crate) fn drain(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    fn position(&self, payload: &[u8]) -> Option<usize> {
        self.pending.iter().position(|(p, _)| p == payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot::error::TryRecvError;

    #[test]
    fn test_duplicate_payload_rejected() {
        let mut pings = PingRegistry::default();
        let _rx = pings.register(b"a".to_vec()).unwrap();
        assert!(matches!(
            pings.register(b"a".to_vec()),
            Err(Error::PingInFlight(p)) if p == b"a"
        ));
    }

    #[test]
    fn test_abandoned_payload_reusable() {
        let mut pings = PingRegistry::default();
        drop(pings.register(b"a".to_vec()).unwrap());
        assert!(pings.register(b"a".to_vec()).is_ok());
        assert_eq!(pings.len(), 1);
    }

    #[test]
    fn test_pong_skips_ahead() {
        let mut pings = PingRegistry::default();
        let mut p1 = pings.register(b"1".to_vec()).unwrap();
        let mut p2 = pings.register(b"2".to_vec()).unwrap();
        let mut p3 = pings.register(b"3".to_vec()).unwrap();

        assert_eq!(pings.resolve(b"2"), 2);
        assert_eq!(p1.try_recv(), Ok(()));
        assert_eq!(p2.try_recv(), Ok(()));
        assert_eq!(p3.try_recv(), Err(TryRecvError::Empty));

        assert_eq!(pings.resolve(b"3"), 1);
        assert_eq!(p3.try_recv(), Ok(()));
        assert_eq!(pings.len(), 0);
    }

    #[test]
    fn test_unmatched_pong_ignored() {
        let mut pings = PingRegistry::default();
        let mut p1 = pings.register(b"1".to_vec()).unwrap();
        assert_eq!(pings.resolve(b"nope"), 0);
        assert_eq!(p1.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(pings.len(), 1);
    }

    #[test]
    fn test_retired_payload_reusable() {
        let mut pings = PingRegistry::default();
        let _rx = pings.register(b"x".to_vec()).unwrap();
        pings.resolve(b"x");
        assert!(pings.register(b"x".to_vec()).is_ok());
    }

    #[test]
    fn test_drain_closes_waiters() {
        let mut pings = PingRegistry::default();
        let mut rx = pings.register(b"1".to_vec()).unwrap();
        pings.drain();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }
}
