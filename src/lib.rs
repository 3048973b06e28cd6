mod presenter;
mod source;
mod text;
#[cfg(feature = "web")]
pub mod web;

pub use presenter::{
    DisplayJoke, GroupedResults, LONG_MIN_WORDS, LengthBucket, MAX_RESULTS, MEDIUM_MIN_WORDS,
    RANDOM_FAILED_MESSAGE, SEARCH_FAILED_MESSAGE, SearchPresenter, SessionState, Ticket,
};
pub use source::{HttpJokeSource, JokeSource, SourceConfig, normalize_search_payload};
pub use text::{HighlightedHtml, Highlighter, Segment, escape_html, word_count};

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// A joke record as returned by the joke API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joke {
    pub id: String,
    pub joke: String,
}

impl Joke {
    pub fn new(id: impl Into<String>, joke: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            joke: joke.into(),
        }
    }
}

pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug)]
pub enum JokeError {
    /// The HTTP client could not be constructed.
    Client(BoxError),
    /// The random-joke request failed or returned an undecodable body.
    Fetch(BoxError),
    /// The search request failed at the transport level.
    Search(BoxError),
}

impl fmt::Display for JokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JokeError::Client(err) => write!(f, "failed to build http client: {err}"),
            JokeError::Fetch(err) => write!(f, "random joke request failed: {err}"),
            JokeError::Search(err) => write!(f, "joke search request failed: {err}"),
        }
    }
}

impl Error for JokeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JokeError::Client(err) | JokeError::Fetch(err) | JokeError::Search(err) => {
                Some(err.as_ref())
            }
        }
    }
}
