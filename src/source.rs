use crate::{Joke, JokeError};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/api/jokes";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Access to a joke API.
pub trait JokeSource {
    fn fetch_random(&self) -> impl Future<Output = Result<Joke, JokeError>> + Send;

    /// Jokes matching `term`, in the order the API returned them.
    fn search(&self, term: &str) -> impl Future<Output = Result<Vec<Joke>, JokeError>> + Send;
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: concat!("jokes-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`JokeSource`] backed by the `/random` and `/search` REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpJokeSource {
    client: Client,
    base_url: String,
}

impl HttpJokeSource {
    pub fn new(config: SourceConfig) -> Result<Self, JokeError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .default_headers(headers)
            .build()
            .map_err(|err| JokeError::Client(err.into()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn random_url(&self) -> String {
        format!("{}/random", self.base_url)
    }

    fn search_url(&self, term: &str) -> String {
        format!(
            "{}/search?term={}",
            self.base_url,
            utf8_percent_encode(term, NON_ALPHANUMERIC)
        )
    }
}

impl JokeSource for HttpJokeSource {
    async fn fetch_random(&self) -> Result<Joke, JokeError> {
        let url = self.random_url();
        debug!(%url, "requesting random joke");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| JokeError::Fetch(err.into()))?;
        response
            .json::<Joke>()
            .await
            .map_err(|err| JokeError::Fetch(err.into()))
    }

    async fn search(&self, term: &str) -> Result<Vec<Joke>, JokeError> {
        let url = self.search_url(term);
        debug!(%url, "searching jokes");
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| JokeError::Search(err.into()))?
            .bytes()
            .await
            .map_err(|err| JokeError::Search(err.into()))?;
        let payload = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&body).map_err(|err| JokeError::Search(err.into()))?
        };
        Ok(normalize_search_payload(payload))
    }
}

/// Reduces the shapes the search endpoint is known to answer with to a
/// plain list: a bare array, or an object carrying a `results` array.
/// Anything else yields no jokes.
pub fn normalize_search_payload(payload: Value) -> Vec<Joke> {
    match payload {
        Value::Array(items) => jokes_from_items(items),
        Value::Object(mut fields) => match fields.remove("results") {
            Some(Value::Array(items)) => jokes_from_items(items),
            _ => {
                debug!("search payload has no results list; treating as empty");
                Vec::new()
            }
        },
        other => {
            debug!(kind = value_kind(&other), "unexpected search payload; treating as empty");
            Vec::new()
        }
    }
}

fn jokes_from_items(items: Vec<Value>) -> Vec<Joke> {
    let total = items.len();
    let jokes: Vec<Joke> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if jokes.len() < total {
        debug!(
            skipped = total - jokes.len(),
            "dropped search results without id/joke fields"
        );
    }
    jokes
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
