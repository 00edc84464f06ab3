use tokio_util::sync::CancellationToken;

/// A one-shot event: once set, it stays set and wakes every waiter.
#[derive(Debug, Clone, Default)]
pub(crate) struct Latch(CancellationToken);

impl Latch {
    pub(crate) fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub(crate) fn set(&self) {
        self.0.cancel();
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.is_cancelled()
    }

    pub(crate) async fn wait(&self) {
        self.0.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_latch_wakes_waiters() {
        let latch = Latch::new();
        assert!(!latch.is_set());

        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        latch.set();
        waiter.await.unwrap();
        assert!(latch.is_set());

        // Already set: returns immediately.
        latch.wait().await;
    }
}
