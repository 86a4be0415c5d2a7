use crate::client::{ClientError, MailClient};
use crate::materialize::MaterializeError;
use crate::models::{MessageQuery, MessageRecord};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(45);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(
        "expected message did not arrive: waited {}s of {}s for {query} ({attempts} attempts)",
        .elapsed.as_secs(),
        .budget.as_secs()
    )]
    Timeout {
        query: String,
        elapsed: Duration,
        budget: Duration,
        attempts: u32,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

/// Wall-clock budget for one acquisition. The interval stays constant by
/// design; verification-email waits are short-lived enough that backoff
/// would only delay the success path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub deadline: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(deadline: Duration, interval: Duration) -> Self {
        Self { deadline, interval }
    }

    pub fn from_secs(deadline: u64, interval: u64) -> Self {
        Self::new(Duration::from_secs(deadline), Duration::from_secs(interval))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DEADLINE, DEFAULT_POLL_INTERVAL)
    }
}

/// Time source for the retry loop. Production uses [`SystemClock`]; tests
/// inject a fake that advances instantly.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug)]
enum PollState {
    Polling { attempts: u32 },
    Succeeded { messages: Vec<MessageRecord>, attempts: u32 },
    TimedOut { attempts: u32, elapsed: Duration },
}

/// One poll attempt followed by the sleep-then-deadline check. The attempt
/// always runs before the deadline is consulted, so even a deadline shorter
/// than the interval gets one look at the mailbox.
fn step<M, C>(
    client: &M,
    clock: &C,
    policy: &PollPolicy,
    started: Instant,
    query: &MessageQuery,
    attempts: u32,
) -> Result<PollState, ClientError>
where
    M: MailClient + ?Sized,
    C: Clock + ?Sized,
{
    let attempts = attempts + 1;
    let messages = client.list(query)?;
    if !messages.is_empty() {
        return Ok(PollState::Succeeded { messages, attempts });
    }

    debug!(attempt = attempts, query = %query, "mailbox still empty");
    clock.sleep(policy.interval);

    let elapsed = clock.now().duration_since(started);
    if elapsed > policy.deadline {
        Ok(PollState::TimedOut { attempts, elapsed })
    } else {
        Ok(PollState::Polling { attempts })
    }
}

/// Polls the mailbox until the query matches or the deadline elapses.
/// Blocks the calling thread for the whole wait; an empty listing is never a
/// success and always triggers another attempt. Returns the full listing in
/// arrival order; callers wanting a single message take element 0.
pub fn acquire_blocking<M, C>(
    client: &M,
    query: &MessageQuery,
    policy: PollPolicy,
    clock: &C,
) -> Result<Vec<MessageRecord>, AcquireError>
where
    M: MailClient + ?Sized,
    C: Clock + ?Sized,
{
    info!(query = %query, deadline_secs = policy.deadline.as_secs(), "acquiring email");
    let started = clock.now();
    let mut attempts = 0;

    loop {
        match step(client, clock, &policy, started, query, attempts)? {
            PollState::Polling { attempts: done } => attempts = done,
            PollState::Succeeded { messages, attempts } => {
                let elapsed = clock.now().duration_since(started);
                info!(
                    count = messages.len(),
                    attempts,
                    elapsed_secs = elapsed.as_secs(),
                    "email(s) acquired"
                );
                return Ok(messages);
            }
            PollState::TimedOut { attempts, elapsed } => {
                warn!(
                    query = %query,
                    attempts,
                    elapsed_secs = elapsed.as_secs(),
                    "gave up waiting for message"
                );
                return Err(AcquireError::Timeout {
                    query: query.to_string(),
                    elapsed,
                    budget: policy.deadline,
                    attempts,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageField;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("mailwait=debug")
            .try_init();
    }

    struct FakeClock {
        start: Instant,
        offset: Cell<Duration>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Cell::new(Duration::ZERO),
            }
        }

        fn elapsed(&self) -> Duration {
            self.offset.get()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + self.offset.get()
        }

        fn sleep(&self, duration: Duration) {
            self.offset.set(self.offset.get() + duration);
        }
    }

    /// Scripted mailbox: each `list` call pops the next listing; once the
    /// script runs dry the mailbox stays empty.
    struct FakeMailClient {
        listings: RefCell<VecDeque<Vec<MessageRecord>>>,
        calls: Cell<u32>,
    }

    impl FakeMailClient {
        fn scripted(listings: Vec<Vec<MessageRecord>>) -> Self {
            Self {
                listings: RefCell::new(listings.into()),
                calls: Cell::new(0),
            }
        }

        fn empty() -> Self {
            Self::scripted(Vec::new())
        }

        fn calls(&self) -> u32 {
            self.calls.get()
        }
    }

    impl MailClient for FakeMailClient {
        fn list(&self, _query: &MessageQuery) -> Result<Vec<MessageRecord>, ClientError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.listings.borrow_mut().pop_front().unwrap_or_default())
        }

        fn purge(&self) -> Result<usize, ClientError> {
            let remaining: usize = self.listings.borrow().iter().map(Vec::len).sum();
            self.listings.borrow_mut().clear();
            Ok(remaining)
        }
    }

    fn reset_message() -> MessageRecord {
        MessageRecord::new()
            .with_field(MessageField::Subject, "Reset Password")
            .with_field(MessageField::Content, "<html>reset link</html>")
    }

    #[test]
    fn returns_message_arriving_on_a_later_attempt() {
        init_tracing();
        let client = FakeMailClient::scripted(vec![vec![], vec![], vec![reset_message()]]);
        let clock = FakeClock::new();
        let query = MessageQuery::matching(MessageField::Subject, "Reset Password");

        let messages =
            acquire_blocking(&client, &query, PollPolicy::from_secs(45, 3), &clock).unwrap();

        assert_eq!(messages[0].subject(), Some("Reset Password"));
        assert_eq!(client.calls(), 3);
        // Two empty polls cost one interval each before the third succeeds.
        assert_eq!(clock.elapsed(), Duration::from_secs(6));
    }

    #[test]
    fn times_out_when_nothing_ever_arrives() {
        let client = FakeMailClient::empty();
        let clock = FakeClock::new();
        let query = MessageQuery::matching(MessageField::Subject, "Reset Password");

        let err =
            acquire_blocking(&client, &query, PollPolicy::from_secs(45, 3), &clock).unwrap_err();

        match err {
            AcquireError::Timeout {
                elapsed,
                budget,
                attempts,
                ref query,
            } => {
                assert_eq!(budget, Duration::from_secs(45));
                // Overrun is bounded by a single interval.
                assert!(elapsed > budget);
                assert!(elapsed <= budget + Duration::from_secs(3));
                assert_eq!(attempts, 16);
                assert!(query.contains("Reset Password"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn timeout_message_names_the_wait() {
        let client = FakeMailClient::empty();
        let clock = FakeClock::new();
        let query = MessageQuery::matching(MessageField::Sender, "noreply@example.com");

        let err =
            acquire_blocking(&client, &query, PollPolicy::from_secs(45, 3), &clock).unwrap_err();
        let message = err.to_string();

        assert!(message.contains("expected message did not arrive"));
        assert!(message.contains("sender -> noreply@example.com"));
        assert!(message.contains("45s"));
    }

    #[test]
    fn attempts_once_even_when_deadline_is_shorter_than_interval() {
        let client = FakeMailClient::empty();
        let clock = FakeClock::new();

        let err = acquire_blocking(
            &client,
            &MessageQuery::any(),
            PollPolicy::from_secs(1, 3),
            &clock,
        )
        .unwrap_err();

        assert!(matches!(err, AcquireError::Timeout { attempts: 1, .. }));
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn immediate_match_skips_the_sleep_entirely() {
        let client = FakeMailClient::scripted(vec![vec![reset_message()]]);
        let clock = FakeClock::new();

        let messages = acquire_blocking(
            &client,
            &MessageQuery::any(),
            PollPolicy::default(),
            &clock,
        )
        .unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn purged_mailbox_yields_empty_listings_and_times_out() {
        let client = FakeMailClient::scripted(vec![
            vec![reset_message(), reset_message(), reset_message()],
        ]);
        assert_eq!(client.purge().unwrap(), 3);

        let clock = FakeClock::new();
        let err = acquire_blocking(
            &client,
            &MessageQuery::any(),
            PollPolicy::from_secs(9, 3),
            &clock,
        )
        .unwrap_err();

        // Empty is never success, even right after a purge.
        assert!(matches!(err, AcquireError::Timeout { .. }));
    }

    #[test]
    fn client_errors_surface_immediately() {
        struct FailingClient;
        impl MailClient for FailingClient {
            fn list(&self, _query: &MessageQuery) -> Result<Vec<MessageRecord>, ClientError> {
                Err(ClientError::Connection("refused".into()))
            }
            fn purge(&self) -> Result<usize, ClientError> {
                Err(ClientError::Connection("refused".into()))
            }
        }

        let clock = FakeClock::new();
        let err = acquire_blocking(
            &FailingClient,
            &MessageQuery::any(),
            PollPolicy::default(),
            &clock,
        )
        .unwrap_err();

        assert!(matches!(err, AcquireError::Client(ClientError::Connection(_))));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}
