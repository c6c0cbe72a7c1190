//! Cooperative cancellation for poll loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::traits::Sleeper;

/// A cloneable flag shared between the poll loop and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Sleeps on the current thread in short slices so a cancellation is seen
/// within one slice.
#[derive(Debug, Clone, Copy)]
pub struct ThreadSleeper {
    slice: Duration,
}

impl ThreadSleeper {
    pub fn new(slice: Duration) -> Self {
        Self { slice }
    }
}

impl Default for ThreadSleeper {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: Option<&CancellationToken>) -> bool {
        let until = Instant::now() + duration;
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            std::thread::sleep(self.slice.min(until - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn thread_sleeper_completes_short_waits() {
        let sleeper = ThreadSleeper::new(Duration::from_millis(1));
        assert!(sleeper.sleep(Duration::from_millis(5), None));
    }

    #[test]
    fn thread_sleeper_stops_when_cancelled() {
        let sleeper = ThreadSleeper::new(Duration::from_millis(1));
        let token = CancellationToken::new();
        token.cancel();

        let started = Instant::now();
        assert!(!sleeper.sleep(Duration::from_secs(30), Some(&token)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn thread_sleeper_observes_cancel_from_another_thread() {
        let sleeper = ThreadSleeper::new(Duration::from_millis(5));
        let token = CancellationToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        assert!(!sleeper.sleep(Duration::from_secs(30), Some(&token)));
        handle.join().unwrap();
    }
}
