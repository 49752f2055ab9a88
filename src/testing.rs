//! In-process relay for tests and offline experiments.
//!
//! `MemoryRelay` implements [`HttpClient`] by keeping every accepted post
//! in memory and answering polls the way the public relay does: frames for
//! the requested topic, newline separated, filtered by `since`.
//!
//! ```ignore
//! let memory = MemoryRelay::new();
//! let relay = Relay::new("https://relay.test", &memory);
//! relay.publish("topic", frame).await?;
//! let frames = relay.poll("topic", None).await?;
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use crate::networking::HttpClient;
use crate::{RelayboxError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPost {
    pub url: String,
    pub body: String,
    /// Relay clock value when the post was accepted.
    pub at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPoll {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl RecordedPoll {
    pub fn since(&self) -> Option<u64> {
        self.query
            .iter()
            .find(|(key, _)| key == "since")
            .and_then(|(_, value)| value.parse().ok())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRelay {
    posts: RefCell<Vec<RecordedPost>>,
    polls: RefCell<Vec<RecordedPoll>>,
    attempts: Cell<usize>,
    failing_posts: RefCell<HashSet<usize>>,
    polls_fail: Cell<bool>,
    clock: Cell<u64>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relay clock stamped on subsequent posts.
    pub fn set_time(&self, now: u64) {
        self.clock.set(now);
    }

    /// Reject the post with this zero-based attempt number.
    pub fn fail_post(&self, attempt: usize) {
        self.failing_posts.borrow_mut().insert(attempt);
    }

    pub fn fail_polls(&self, fail: bool) {
        self.polls_fail.set(fail);
    }

    /// Store a frame directly, as if another sender had published it.
    pub fn inject(&self, url: &str, body: &str) {
        self.posts.borrow_mut().push(RecordedPost {
            url: url.to_string(),
            body: body.to_string(),
            at: self.clock.get(),
        });
    }

    /// Accepted posts, in arrival order.
    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.borrow().clone()
    }

    pub fn polls(&self) -> Vec<RecordedPoll> {
        self.polls.borrow().clone()
    }

    /// Every post call, accepted or rejected.
    pub fn attempts(&self) -> usize {
        self.attempts.get()
    }
}

impl HttpClient for MemoryRelay {
    async fn post(&self, url: &str, body: String) -> Result<()> {
        let attempt = self.attempts.get();
        self.attempts.set(attempt + 1);
        if self.failing_posts.borrow().contains(&attempt) {
            return Err(RelayboxError::Relay(format!(
                "{}: 500 Internal Server Error",
                url
            )));
        }
        self.posts.borrow_mut().push(RecordedPost {
            url: url.to_string(),
            body,
            at: self.clock.get(),
        });
        Ok(())
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let poll = RecordedPoll {
            url: url.to_string(),
            query: query
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        };
        let since = poll.since();
        self.polls.borrow_mut().push(poll);
        if self.polls_fail.get() {
            return Err(RelayboxError::Relay(format!("{}: connection refused", url)));
        }

        let topic_url = url.strip_suffix("/raw").unwrap_or(url);
        let body = self
            .posts
            .borrow()
            .iter()
            .filter(|post| post.url == topic_url)
            .filter(|post| since.map_or(true, |since| post.at >= since))
            .map(|post| format!("{}\n", post.body))
            .collect();
        Ok(body)
    }
}
