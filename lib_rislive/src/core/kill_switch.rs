//! # Kill Switch
//!
//! A session ends exactly once. Whoever notices first (the deadline timer, the
//! read task after a failed reconnect, a signal handler) trips the switch; all
//! other tasks observe it at their next loop boundary, or immediately if they
//! are parked in [`KillSwitch::dead`].

use tokio_util::sync::CancellationToken;

/// Cloneable handle to the session's dead flag.
///
/// `killed()` is a single atomic load, safe to call from any task without
/// taking the connection lock.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    token: CancellationToken,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the session dead. Idempotent.
    pub fn kill(&self) {
        self.token.cancel();
    }

    pub fn killed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the switch has been tripped.
    pub async fn dead(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kill_is_idempotent_and_sticky() {
        let switch = KillSwitch::new();
        assert!(!switch.killed());
        switch.kill();
        switch.kill();
        assert!(switch.killed());
        assert!(switch.clone().killed());
    }

    #[tokio::test]
    async fn test_kill_is_seen_by_other_tasks() {
        let switch = KillSwitch::new();
        let observers: Vec<_> = (0..4)
            .map(|_| {
                let switch = switch.clone();
                tokio::spawn(async move {
                    switch.dead().await;
                    switch.killed()
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let killer = switch.clone();
        tokio::spawn(async move { killer.kill() }).await.unwrap();

        for observer in observers {
            assert!(observer.await.unwrap());
        }
        assert!(switch.killed());
    }
}
