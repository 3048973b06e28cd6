use std::error::Error;
use std::time::Duration;

use atty::Stream;
use clap::{Parser, Subcommand};
use jokes_rs::{
    Highlighter, HttpJokeSource, Joke, LengthBucket, SearchPresenter, SessionState, SourceConfig,
};
use termimad::MadSkin;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jokes-rs", about = "Fetch random jokes and search a joke API", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the joke API (serving `/random` and `/search`).
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true, default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Operations on jokes.
    #[command(subcommand)]
    Joke(JokeCommand),
    /// Serve the joke browser over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// CSS framework used by the pages.
        #[arg(long, value_enum, default_value_t = ThemeArg::Tailwind)]
        theme: ThemeArg,
    },
}

#[derive(Subcommand, Debug)]
enum JokeCommand {
    /// Fetch one random joke.
    Random,
    /// Search jokes and group the first matches by length.
    Search {
        /// Term to search for.
        term: String,
    },
}

#[cfg(feature = "web")]
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ThemeArg {
    Tailwind,
    Bootstrap,
}

#[cfg(feature = "web")]
impl From<ThemeArg> for jokes_rs::web::WebTheme {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::Tailwind => jokes_rs::web::WebTheme::Tailwind,
            ThemeArg::Bootstrap => jokes_rs::web::WebTheme::Bootstrap,
        }
    }
}

impl Cli {
    fn source_config(&self) -> SourceConfig {
        let defaults = SourceConfig::default();
        SourceConfig {
            base_url: self.api_base.clone().unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            user_agent: defaults.user_agent,
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = cli.source_config();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    match cli.command {
        Command::Joke(JokeCommand::Random) => {
            init_tracing("warn");
            runtime.block_on(handle_random(config, cli.json))
        }
        Command::Joke(JokeCommand::Search { term }) => {
            init_tracing("warn");
            runtime.block_on(handle_search(config, term, cli.json))
        }
        #[cfg(feature = "web")]
        Command::Serve { addr, theme } => {
            init_tracing("info");
            let web_config = jokes_rs::web::WebConfig {
                addr,
                theme: theme.into(),
                source: config,
            };
            runtime.block_on(jokes_rs::web::serve(web_config))?;
            Ok(())
        }
    }
}

fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn handle_random(config: SourceConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let presenter = SearchPresenter::new(HttpJokeSource::new(config)?);
    let state = presenter.fetch_random().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else if let Some(joke) = &state.random_joke {
        print_random(joke);
    }
    surface_error(&state)
}

async fn handle_search(
    config: SourceConfig,
    term: String,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let presenter = SearchPresenter::new(HttpJokeSource::new(config)?);
    let state = presenter.search(&term).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else if state.error.is_none() {
        let skin = stdout_is_tty().then(MadSkin::default);
        if let Some(report) = grouped_report(&state, skin.as_ref()) {
            print!("{report}");
        }
    }
    surface_error(&state)
}

fn surface_error(state: &SessionState) -> Result<(), Box<dyn Error>> {
    match &state.error {
        Some(message) => Err(message.clone().into()),
        None => Ok(()),
    }
}

fn print_random(joke: &Joke) {
    println!("{}", joke.joke.trim());
    println!("  (id {})", joke.id);
}

/// Text listing of the grouped results, or `None` when no search ran.
fn grouped_report(state: &SessionState, skin: Option<&MadSkin>) -> Option<String> {
    if state.search_term.is_empty() {
        return None;
    }
    let grouped = &state.grouped;
    if grouped.is_empty() {
        return Some(format!("No jokes matched \"{}\".\n", state.search_term));
    }
    let mut report = format!(
        "{} jokes matching \"{}\":\n",
        grouped.total(),
        state.search_term
    );
    let highlighter = Highlighter::new(&state.search_term);
    for bucket in LengthBucket::ALL {
        let jokes = grouped.bucket(bucket);
        if jokes.is_empty() {
            continue;
        }
        report.push_str(&format!("\n{} ({}):\n", bucket, jokes.len()));
        for joke in jokes {
            let text = match skin {
                Some(skin) => emphasise_matches(skin, &highlighter, &joke.raw),
                None => joke.raw.clone(),
            };
            report.push_str(&format!("- [{}] {}\n", joke.id, text));
        }
    }
    Some(report)
}

fn emphasise_matches(skin: &MadSkin, highlighter: &Highlighter, text: &str) -> String {
    highlighter
        .segments(text)
        .into_iter()
        .map(|segment| {
            if segment.matched {
                skin.bold.apply_to(segment.text.to_string()).to_string()
            } else {
                segment.text.to_string()
            }
        })
        .collect()
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}
