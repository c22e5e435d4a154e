//! Scripted [`AccrualAuthority`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use gm_accrual::{AccrualAuthority, TransportError, Verdict};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Answers from per-order verdict sequences.
///
/// Each query pops the next verdict for that order; the last one repeats.
/// Orders without a script get the fallback (`Pending` unless changed).
pub struct ScriptedAuthority {
    scripts: Mutex<HashMap<String, VecDeque<Verdict>>>,
    fallback: Verdict,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    cancel_after: Option<(usize, CancellationToken)>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAuthority {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: Verdict::Pending,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            cancel_after: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(self, number: &str, verdicts: Vec<Verdict>) -> Self {
        self.lock_scripts()
            .insert(number.to_string(), verdicts.into());
        self
    }

    /// Verdict for every order without its own script.
    pub fn always(mut self, verdict: Verdict) -> Self {
        self.fallback = verdict;
        self
    }

    /// Simulated latency per query. Bounded by the caller's deadline.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Trip `token` when the `n`th query arrives (1-based).
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    /// Order numbers queried, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn calls_for(&self, number: &str) -> usize {
        self.calls().iter().filter(|n| *n == number).count()
    }

    /// Highest number of queries observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Verdict>>> {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_verdict(&self, number: &str) -> Verdict {
        let mut scripts = self.lock_scripts();
        match scripts.get_mut(number) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Verdict::Pending),
            Some(queue) => queue.front().cloned().unwrap_or(Verdict::Pending),
            None => self.fallback.clone(),
        }
    }
}

#[async_trait::async_trait]
impl AccrualAuthority for ScriptedAuthority {
    async fn fetch_verdict(&self, order_number: &str, deadline: Instant) -> Verdict {
        let seq = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            calls.push(order_number.to_string());
            calls.len()
        };
        if let Some((n, token)) = &self.cancel_after {
            if seq == *n {
                token.cancel();
            }
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let waited = tokio::time::timeout_at(deadline, tokio::time::sleep(self.delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match waited {
            Ok(()) => self.next_verdict(order_number),
            Err(_) => Verdict::TransportFailure(TransportError::DeadlineExceeded),
        }
    }
}
