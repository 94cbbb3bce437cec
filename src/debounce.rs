/*!
 * Input debouncing for free-text lookups
 *
 * The debouncer is driven by explicit instants so it can be tested without
 * a clock; [`Debouncer::settle`] is the async convenience for real use.
 * Every settled burst of input is emitted, including a repeat of the
 * previous query; duplicate lookups are resolved by their tickets.
 */

use std::time::Duration;
use tokio::time::Instant;

/// Outcome of feeding or polling the debouncer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// Input is still changing
    Waiting,
    /// The query went blank; clear suggestions without a lookup
    Clear,
    /// The query has been stable for the quiet period
    Query(String),
}

#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    pending: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    /// Record new input text.
    ///
    /// Blank input settles to [`Settled::Clear`] immediately.
    pub fn input(&mut self, text: &str, now: Instant) -> Settled {
        if text.trim().is_empty() {
            self.pending = None;
            return Settled::Clear;
        }
        self.pending = Some((text.trim().to_string(), now + self.quiet));
        Settled::Waiting
    }

    /// Emit the pending text if its quiet period has elapsed
    pub fn poll(&mut self, now: Instant) -> Settled {
        if self.deadline().map_or(true, |due| now < due) {
            return Settled::Waiting;
        }
        match self.pending.take() {
            Some((text, _)) => Settled::Query(text),
            None => Settled::Waiting,
        }
    }

    /// When the pending text becomes due
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    /// Drop pending input without emitting it
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Sleep until the pending text is due and return it
    pub async fn settle(&mut self) -> Settled {
        match self.deadline() {
            Some(due) => {
                tokio::time::sleep_until(due).await;
                self.poll(Instant::now())
            }
            None => Settled::Waiting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_only_last_input_fires() {
        let start = Instant::now();
        let mut d = Debouncer::new(ms(300));
        assert_eq!(d.input("a", start), Settled::Waiting);
        assert_eq!(d.input("at", start + ms(100)), Settled::Waiting);
        assert_eq!(d.input("ator", start + ms(200)), Settled::Waiting);
        assert_eq!(d.poll(start + ms(400)), Settled::Waiting);
        assert_eq!(d.poll(start + ms(500)), Settled::Query("ator".to_string()));
        assert_eq!(d.poll(start + ms(900)), Settled::Waiting);
    }

    #[test]
    fn test_blank_clears_immediately() {
        let start = Instant::now();
        let mut d = Debouncer::new(ms(300));
        d.input("ator", start);
        assert_eq!(d.input("   ", start + ms(10)), Settled::Clear);
        assert_eq!(d.poll(start + ms(1000)), Settled::Waiting);
    }

    #[test]
    fn test_same_text_fires_again_on_new_input() {
        let start = Instant::now();
        let mut d = Debouncer::new(ms(300));
        d.input("ator", start);
        assert_eq!(d.poll(start + ms(300)), Settled::Query("ator".to_string()));
        assert_eq!(d.poll(start + ms(350)), Settled::Waiting);
        d.input("ator ", start + ms(400));
        assert_eq!(d.poll(start + ms(700)), Settled::Query("ator".to_string()));
    }

    #[test]
    fn test_reset_drops_pending_input() {
        let start = Instant::now();
        let mut d = Debouncer::new(ms(300));
        d.input("ator", start);
        d.reset();
        assert_eq!(d.deadline(), None);
        assert_eq!(d.poll(start + ms(1000)), Settled::Waiting);
    }

    #[tokio::test]
    async fn test_settle_waits_for_quiet_period() {
        let mut d = Debouncer::new(ms(20));
        d.input("lisinopril", Instant::now());
        assert_eq!(d.settle().await, Settled::Query("lisinopril".to_string()));
    }
}
