use log::debug;

use crate::{RelayboxError, Result};

/// Minimal HTTP surface the relay protocol needs.
#[allow(async_fn_in_trait)]
pub trait HttpClient {
    /// POST `body` as text. Non-2xx responses are errors.
    async fn post(&self, url: &str, body: String) -> Result<()>;

    /// GET with query parameters, returning the response body.
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String>;
}

impl<T: HttpClient + ?Sized> HttpClient for &T {
    async fn post(&self, url: &str, body: String) -> Result<()> {
        (**self).post(url, body).await
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        (**self).get(url, query).await
    }
}

/// `HttpClient` backed by reqwest. No retries and no timeout beyond the
/// library defaults.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }
}

fn relay_error(e: reqwest::Error) -> RelayboxError {
    RelayboxError::Relay(e.to_string())
}

impl HttpClient for ReqwestClient {
    async fn post(&self, url: &str, body: String) -> Result<()> {
        self.client
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(relay_error)?
            .error_for_status()
            .map_err(relay_error)?;
        Ok(())
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        self.client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(relay_error)?
            .error_for_status()
            .map_err(relay_error)?
            .text()
            .await
            .map_err(relay_error)
    }
}

/// Frames from one poll, in relay delivery order. Blank lines are skipped.
#[derive(Debug, Default)]
pub struct Frames {
    lines: std::vec::IntoIter<String>,
}

impl Frames {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_body(body: &str) -> Self {
        let lines: Vec<String> = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Frames {
            lines: lines.into_iter(),
        }
    }
}

impl Iterator for Frames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.lines.next()
    }
}

/// A pub/sub relay addressed as `<base>/<topic>`.
#[derive(Debug, Clone)]
pub struct Relay<C> {
    base: String,
    client: C,
}

impl<C: HttpClient> Relay<C> {
    pub fn new(base: &str, client: C) -> Self {
        Relay {
            base: base.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn topic_url(&self, topic: &str) -> String {
        format!("{}/{}", self.base, topic)
    }

    /// One POST of one frame. No retry.
    pub async fn publish(&self, topic: &str, frame: String) -> Result<()> {
        let url = self.topic_url(topic);
        debug!("Publishing {} bytes to {}", frame.len(), url);
        self.client.post(&url, frame).await
    }

    /// One GET of `<base>/<topic>/raw?poll=1[&since=<unix-seconds>]`.
    pub async fn poll(&self, topic: &str, since: Option<u64>) -> Result<Frames> {
        let url = format!("{}/raw", self.topic_url(topic));
        let mut query = vec![("poll", "1".to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }
        debug!("Polling {} since {:?}", url, since);
        let body = self.client.get(&url, &query).await?;
        Ok(Frames::from_body(&body))
    }
}
