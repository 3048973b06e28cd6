use crate::source::JokeSource;
use crate::text::{HighlightedHtml, Highlighter, word_count};
use crate::{Joke, JokeError};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Search results beyond this many are dropped before grouping.
pub const MAX_RESULTS: usize = 30;
pub const MEDIUM_MIN_WORDS: usize = 10;
pub const LONG_MIN_WORDS: usize = 20;

pub const RANDOM_FAILED_MESSAGE: &str = "Failed to fetch random joke.";
pub const SEARCH_FAILED_MESSAGE: &str = "Failed to search jokes.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthBucket {
    Short,
    Medium,
    Long,
}

impl LengthBucket {
    pub const ALL: [LengthBucket; 3] = [
        LengthBucket::Short,
        LengthBucket::Medium,
        LengthBucket::Long,
    ];

    pub fn classify(words: usize) -> Self {
        if words < MEDIUM_MIN_WORDS {
            LengthBucket::Short
        } else if words < LONG_MIN_WORDS {
            LengthBucket::Medium
        } else {
            LengthBucket::Long
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LengthBucket::Short => "Short",
            LengthBucket::Medium => "Medium",
            LengthBucket::Long => "Long",
        }
    }
}

impl fmt::Display for LengthBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A search hit prepared for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayJoke {
    pub id: String,
    pub raw: String,
    pub highlighted: HighlightedHtml,
    pub word_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupedResults {
    pub short: Vec<DisplayJoke>,
    pub medium: Vec<DisplayJoke>,
    pub long: Vec<DisplayJoke>,
}

impl GroupedResults {
    /// Keeps the first [`MAX_RESULTS`] jokes and sorts them into buckets,
    /// preserving their order.
    pub fn from_jokes(jokes: Vec<Joke>, term: &str) -> Self {
        let highlighter = Highlighter::new(term);
        let mut grouped = Self::default();
        for joke in jokes.into_iter().take(MAX_RESULTS) {
            let words = word_count(&joke.joke);
            let display = DisplayJoke {
                highlighted: highlighter.highlight(&joke.joke),
                id: joke.id,
                raw: joke.joke,
                word_count: words,
            };
            grouped.bucket_mut(LengthBucket::classify(words)).push(display);
        }
        grouped
    }

    pub fn bucket(&self, bucket: LengthBucket) -> &[DisplayJoke] {
        match bucket {
            LengthBucket::Short => &self.short,
            LengthBucket::Medium => &self.medium,
            LengthBucket::Long => &self.long,
        }
    }

    fn bucket_mut(&mut self, bucket: LengthBucket) -> &mut Vec<DisplayJoke> {
        match bucket {
            LengthBucket::Short => &mut self.short,
            LengthBucket::Medium => &mut self.medium,
            LengthBucket::Long => &mut self.long,
        }
    }

    pub fn total(&self) -> usize {
        self.short.len() + self.medium.len() + self.long.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Random,
    Search,
}

/// Identifies one started operation. Completions carrying an outdated
/// ticket are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    flow: Flow,
    generation: u64,
}

/// Everything a view needs to render the joke screen.
///
/// Transitions never mutate in place; each returns the next state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub loading: bool,
    pub error: Option<String>,
    pub random_joke: Option<Joke>,
    pub search_term: String,
    pub grouped: GroupedResults,
    #[serde(skip)]
    random_generation: u64,
    #[serde(skip)]
    search_generation: u64,
}

impl SessionState {
    pub fn begin_random(&self) -> (Self, Ticket) {
        let mut next = self.clone();
        next.error = None;
        next.random_joke = None;
        next.random_generation += 1;
        let ticket = Ticket {
            flow: Flow::Random,
            generation: next.random_generation,
        };
        (next, ticket)
    }

    pub fn finish_random(&self, ticket: Ticket, outcome: Result<Joke, JokeError>) -> Self {
        if !self.is_current(ticket) {
            debug!(generation = ticket.generation, "discarding stale random joke response");
            return self.clone();
        }
        let mut next = self.clone();
        match outcome {
            Ok(joke) => next.random_joke = Some(joke),
            Err(err) => {
                warn!(error = %err, "random joke fetch failed");
                next.error = Some(RANDOM_FAILED_MESSAGE.to_string());
            }
        }
        next
    }

    /// Starts a search for the trimmed `term`. Returns `None`, leaving the
    /// state untouched, when the term is blank.
    pub fn begin_search(&self, term: &str) -> Option<(Self, Ticket)> {
        let term = term.trim();
        if term.is_empty() {
            return None;
        }
        let mut next = self.clone();
        next.search_term = term.to_string();
        next.error = None;
        next.loading = true;
        next.grouped = GroupedResults::default();
        next.search_generation += 1;
        let ticket = Ticket {
            flow: Flow::Search,
            generation: next.search_generation,
        };
        Some((next, ticket))
    }

    pub fn finish_search(&self, ticket: Ticket, outcome: Result<Vec<Joke>, JokeError>) -> Self {
        if !self.is_current(ticket) {
            debug!(generation = ticket.generation, "discarding stale search response");
            return self.clone();
        }
        let mut next = self.clone();
        match outcome {
            Ok(jokes) => {
                debug!(term = %next.search_term, received = jokes.len(), "search completed");
                next.grouped = GroupedResults::from_jokes(jokes, &next.search_term);
            }
            Err(err) => {
                warn!(term = %next.search_term, error = %err, "joke search failed");
                next.error = Some(SEARCH_FAILED_MESSAGE.to_string());
            }
        }
        next.loading = false;
        next
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        match ticket.flow {
            Flow::Random => ticket.generation == self.random_generation,
            Flow::Search => ticket.generation == self.search_generation,
        }
    }
}

/// Drives a [`JokeSource`] and owns the single copy of [`SessionState`].
pub struct SearchPresenter<S> {
    source: S,
    state: Mutex<SessionState>,
}

impl<S: JokeSource> SearchPresenter<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub async fn fetch_random(&self) -> SessionState {
        let ticket = {
            let mut state = self.state.lock();
            let (next, ticket) = state.begin_random();
            *state = next;
            ticket
        };
        let outcome = self.source.fetch_random().await;
        self.apply(|state| state.finish_random(ticket, outcome))
    }

    /// Runs a search. A blank term returns the current state without
    /// issuing a request.
    pub async fn search(&self, term: &str) -> SessionState {
        let ticket = {
            let mut state = self.state.lock();
            match state.begin_search(term) {
                Some((next, ticket)) => {
                    *state = next;
                    ticket
                }
                None => return state.clone(),
            }
        };
        let outcome = self.source.search(term.trim()).await;
        self.apply(|state| state.finish_search(ticket, outcome))
    }

    fn apply(&self, transition: impl FnOnce(&SessionState) -> SessionState) -> SessionState {
        let mut state = self.state.lock();
        let next = transition(&state);
        *state = next;
        state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn joke(id: &str, text: &str) -> Joke {
        Joke::new(id, text)
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    struct FakeSource {
        random: Option<Joke>,
        results: Option<Vec<Joke>>,
        searches: AtomicUsize,
    }

    impl FakeSource {
        fn new(random: Option<Joke>, results: Option<Vec<Joke>>) -> Self {
            Self {
                random,
                results,
                searches: AtomicUsize::new(0),
            }
        }
    }

    impl JokeSource for FakeSource {
        async fn fetch_random(&self) -> Result<Joke, JokeError> {
            self.random
                .clone()
                .ok_or_else(|| JokeError::Fetch("connection refused".into()))
        }

        async fn search(&self, _term: &str) -> Result<Vec<Joke>, JokeError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.results
                .clone()
                .ok_or_else(|| JokeError::Search("connection reset".into()))
        }
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(LengthBucket::classify(0), LengthBucket::Short);
        assert_eq!(LengthBucket::classify(9), LengthBucket::Short);
        assert_eq!(LengthBucket::classify(10), LengthBucket::Medium);
        assert_eq!(LengthBucket::classify(19), LengthBucket::Medium);
        assert_eq!(LengthBucket::classify(20), LengthBucket::Long);
    }

    #[test]
    fn grouping_truncates_to_thirty_in_order() {
        let jokes: Vec<Joke> = (0..35)
            .map(|i| joke(&i.to_string(), &words([3, 12, 25][i % 3])))
            .collect();
        let grouped = GroupedResults::from_jokes(jokes, "word");
        assert_eq!(grouped.total(), MAX_RESULTS);
        assert_eq!(grouped.short.len(), 10);
        assert_eq!(grouped.medium.len(), 10);
        assert_eq!(grouped.long.len(), 10);

        let mut ids: Vec<usize> = LengthBucket::ALL
            .iter()
            .flat_map(|bucket| grouped.bucket(*bucket))
            .map(|display| display.id.parse().unwrap())
            .collect();
        let short_ids: Vec<usize> = grouped.short.iter().map(|d| d.id.parse().unwrap()).collect();
        assert_eq!(short_ids, (0..30).step_by(3).collect::<Vec<_>>());
        ids.sort_unstable();
        assert_eq!(ids, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn exact_word_counts_land_in_expected_buckets() {
        let jokes = vec![
            joke("9", &words(9)),
            joke("10", &words(10)),
            joke("19", &words(19)),
            joke("20", &words(20)),
        ];
        let grouped = GroupedResults::from_jokes(jokes, "");
        assert_eq!(grouped.short.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), ["9"]);
        assert_eq!(
            grouped.medium.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            ["10", "19"]
        );
        assert_eq!(grouped.long.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), ["20"]);
    }

    #[test]
    fn blank_search_is_a_no_op() {
        let state = SessionState::default();
        assert!(state.begin_search("").is_none());
        assert!(state.begin_search("   \t").is_none());
    }

    #[test]
    fn begin_search_resets_previous_results() {
        let (state, ticket) = SessionState::default().begin_search("cat").unwrap();
        let state = state.finish_search(ticket, Ok(vec![joke("1", "A cat sat.")]));
        let failed = SessionState {
            error: Some("old".to_string()),
            ..state
        };
        let (next, _) = failed.begin_search("  dog ").unwrap();
        assert!(next.loading);
        assert!(next.error.is_none());
        assert!(next.grouped.is_empty());
        assert_eq!(next.search_term, "dog");
    }

    #[test]
    fn outdated_ticket_is_ignored() {
        let (state, first) = SessionState::default().begin_search("old").unwrap();
        let (state, second) = state.begin_search("new").unwrap();
        let after_stale = state.finish_search(first, Ok(vec![joke("1", "old joke")]));
        assert_eq!(after_stale, state);
        let done = after_stale.finish_search(second, Ok(vec![joke("2", "new joke")]));
        assert!(!done.loading);
        assert_eq!(done.grouped.short[0].id, "2");
    }

    #[test]
    fn ticket_from_other_flow_is_ignored() {
        let (state, random_ticket) = SessionState::default().begin_random();
        let (state, _) = state.begin_search("cat").unwrap();
        let after = state.finish_search(random_ticket, Ok(vec![joke("1", "cat")]));
        assert!(after.loading);
        assert!(after.grouped.is_empty());
    }

    #[tokio::test]
    async fn cat_scenario() {
        let presenter = SearchPresenter::new(FakeSource::new(
            None,
            Some(vec![joke("1", "A cat sat.")]),
        ));
        let state = presenter.search("cat").await;
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert_eq!(state.grouped.short.len(), 1);
        assert!(state.grouped.medium.is_empty());
        assert!(state.grouped.long.is_empty());
        let hit = &state.grouped.short[0];
        assert_eq!(hit.word_count, 3);
        assert_eq!(hit.raw, "A cat sat.");
        assert_eq!(hit.highlighted.as_str(), "A <mark>cat</mark> sat.");
    }

    #[tokio::test]
    async fn empty_results_clear_loading_without_error() {
        let presenter = SearchPresenter::new(FakeSource::new(None, Some(Vec::new())));
        let state = presenter.search("anything").await;
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert_eq!(state.grouped, GroupedResults::default());
    }

    #[tokio::test]
    async fn search_failure_sets_message() {
        let presenter = SearchPresenter::new(FakeSource::new(None, None));
        let state = presenter.search("cat").await;
        assert_eq!(state.error.as_deref(), Some(SEARCH_FAILED_MESSAGE));
        assert!(!state.loading);
        assert!(state.grouped.is_empty());
    }

    #[tokio::test]
    async fn blank_search_sends_no_request() {
        let presenter = SearchPresenter::new(FakeSource::new(None, Some(Vec::new())));
        let before = presenter.state();
        let after = presenter.search("   ").await;
        assert_eq!(before, after);
        assert_eq!(presenter.source.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn random_fetch_success_and_failure() {
        let presenter = SearchPresenter::new(FakeSource::new(Some(joke("7", "Knock knock.")), None));
        let state = presenter.fetch_random().await;
        assert_eq!(state.random_joke, Some(joke("7", "Knock knock.")));
        assert!(state.error.is_none());

        let presenter = SearchPresenter::new(FakeSource::new(None, None));
        let state = presenter.fetch_random().await;
        assert_eq!(state.error.as_deref(), Some(RANDOM_FAILED_MESSAGE));
        assert!(state.random_joke.is_none());
    }

    #[tokio::test]
    async fn new_operation_replaces_previous_error() {
        let presenter = SearchPresenter::new(FakeSource::new(Some(joke("1", "Hi.")), None));
        let state = presenter.search("cat").await;
        assert_eq!(state.error.as_deref(), Some(SEARCH_FAILED_MESSAGE));
        let state = presenter.fetch_random().await;
        assert!(state.error.is_none());
        assert_eq!(state.random_joke, Some(joke("1", "Hi.")));
    }

    struct GatedSource {
        gates: Mutex<HashMap<String, oneshot::Receiver<Vec<Joke>>>>,
    }

    impl JokeSource for GatedSource {
        async fn fetch_random(&self) -> Result<Joke, JokeError> {
            Err(JokeError::Fetch("not wired".into()))
        }

        async fn search(&self, term: &str) -> Result<Vec<Joke>, JokeError> {
            let gate = self.gates.lock().remove(term);
            match gate {
                Some(gate) => gate.await.map_err(|err| JokeError::Search(err.into())),
                None => Err(JokeError::Search("no gate".into())),
            }
        }
    }

    #[tokio::test]
    async fn late_response_from_older_search_is_discarded() {
        let (old_tx, old_rx) = oneshot::channel();
        let (new_tx, new_rx) = oneshot::channel();
        let gates = HashMap::from([("old".to_string(), old_rx), ("new".to_string(), new_rx)]);
        let presenter = SearchPresenter::new(GatedSource {
            gates: Mutex::new(gates),
        });

        let driver = async {
            tokio::task::yield_now().await;
            new_tx.send(vec![joke("2", "the new joke")]).unwrap();
            tokio::task::yield_now().await;
            old_tx.send(vec![joke("1", "the old joke")]).unwrap();
        };
        tokio::join!(presenter.search("old"), presenter.search("new"), driver);

        let state = presenter.state();
        assert_eq!(state.search_term, "new");
        assert!(!state.loading);
        assert_eq!(state.grouped.total(), 1);
        assert_eq!(state.grouped.short[0].raw, "the new joke");
    }
}
