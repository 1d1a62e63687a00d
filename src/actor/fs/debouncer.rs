use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use super::filter::Pattern;
use super::types::ChangeEvent;

type Callback = Box<dyn FnMut() -> BoxFuture<'static, ()> + Send>;

struct Subscription {
    pattern: Pattern,
    callback: Callback,
    /// Armed deadline; reset by every matching event.
    deadline: Option<Instant>,
}

/// Timer-reset debouncer.
///
/// Each subscription owns one timer. A matching event (re)arms it to
/// `now + delay`; the callback fires once the timer runs out without a
/// further match. Callbacks are awaited inside the loop, so a callback
/// never overlaps itself or any other subscription's callback.
pub struct Debouncer {
    delay: Duration,
    subscriptions: Vec<Subscription>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            subscriptions: Vec::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Register `callback` for events whose base name matches `pattern`.
    pub fn subscribe<F, Fut>(&mut self, pattern: Pattern, mut callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscriptions.push(Subscription {
            pattern,
            callback: Box::new(move || Box::pin(callback())),
            deadline: None,
        });
    }

    /// Arm every subscription the event matches.
    ///
    /// Returns whether any subscription was armed.
    pub fn observe(&mut self, event: &ChangeEvent) -> bool {
        let deadline = Instant::now() + self.delay;
        let mut armed = false;
        for sub in &mut self.subscriptions {
            if sub.pattern.matches(&event.path) {
                sub.deadline = Some(deadline);
                armed = true;
            }
        }
        armed
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.subscriptions.iter().filter_map(|s| s.deadline).min()
    }

    /// Run callbacks whose deadline has passed, in subscription order.
    ///
    /// Returns the number of callbacks run.
    pub async fn fire_due(&mut self) -> usize {
        let now = Instant::now();
        let mut fired = 0;
        for sub in &mut self.subscriptions {
            if sub.deadline.is_some_and(|d| d <= now) {
                sub.deadline = None;
                (sub.callback)().await;
                fired += 1;
            }
        }
        fired
    }

    /// Consume events until the channel closes.
    ///
    /// Pending timers are dropped on close; shutdown does not trigger a
    /// final rebuild.
    pub async fn run(mut self, mut events: mpsc::Receiver<ChangeEvent>) {
        loop {
            let deadline = self.next_deadline();
            // Due timers run before the next event is read, so a backlog
            // of events cannot hold them off.
            if deadline.is_some_and(|d| d <= Instant::now()) {
                self.fire_due().await;
                continue;
            }
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => {
                        if self.observe(&event) {
                            crate::debug!("watch"; "armed by {} {}", event.kind.label(), event.path.display());
                        }
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire_due().await;
                }
            }
        }
    }
}
