use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::clipboard::ClipboardProvider;
use crate::config::Config;
use crate::daemon::shutdown_signal;
use crate::history::HistoryDatabase;
use crate::watcher::Watcher;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TARGET"),
    ", ",
    env!("PROFILE"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

/// Upper bound for `-n/--limit`, matching the config file's range
const MAX_LIMIT: i64 = 1000;

#[derive(Parser, Debug)]
#[command(name = "clipstash")]
#[command(about = "Record clipboard history and bring old entries back")]
#[command(version, long_version = LONG_VERSION)]
pub struct Cli {
    /// Runs the watcher when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Watch the clipboard and record every new text snapshot")]
    Watch,

    #[command(about = "Show the most recent clipboard items")]
    List {
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..=MAX_LIMIT))]
        limit: Option<u32>,
    },

    #[command(about = "Copy a stored item back to the clipboard")]
    Get {
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,
    },

    #[command(about = "Find stored items containing a term")]
    Search {
        term: String,

        #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..=MAX_LIMIT))]
        limit: Option<u32>,
    },

    #[command(about = "Delete all stored items")]
    Clear,

    #[command(about = "Show database location and entry count")]
    Status,

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    #[command(about = "Show the effective configuration")]
    Show,

    #[command(about = "Write an example configuration file")]
    Init {
        #[arg(long)]
        force: bool,
    },
}

/// Cut `content` to `width` characters, marking the cut with `...`
pub fn preview(content: &str, width: usize) -> Cow<'_, str> {
    match content.char_indices().nth(width) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &content[..cut])),
        None => Cow::Borrowed(content),
    }
}

pub struct CliHandler {
    config: Config,
    history: Option<Arc<HistoryDatabase>>,
    clipboard: Option<Arc<dyn ClipboardProvider>>,
    out: Box<dyn Write + Send>,
}

impl CliHandler {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            history: None,
            clipboard: None,
            out: Box::new(std::io::stdout()),
        }
    }

    /// Use an already opened database instead of resolving one from config
    pub fn with_history(mut self, history: Arc<HistoryDatabase>) -> Self {
        self.history = Some(history);
        self
    }

    /// Use the given clipboard instead of the system one
    pub fn with_clipboard(mut self, clipboard: Arc<dyn ClipboardProvider>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    /// Send command output somewhere other than stdout
    pub fn with_output(mut self, out: impl Write + Send + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    /// Lazily open the history database when needed
    async fn ensure_history(&mut self) -> Result<Arc<HistoryDatabase>> {
        if let Some(history) = &self.history {
            return Ok(Arc::clone(history));
        }

        let history = Arc::new(
            crate::open_history(&self.config)
                .await
                .context("Failed to open history database")?,
        );
        self.history = Some(Arc::clone(&history));
        Ok(history)
    }

    /// Lazily initialize the clipboard provider when needed
    fn ensure_clipboard(&mut self) -> Result<Arc<dyn ClipboardProvider>> {
        if let Some(clipboard) = &self.clipboard {
            return Ok(Arc::clone(clipboard));
        }

        let clipboard: Arc<dyn ClipboardProvider> = Arc::from(
            crate::open_clipboard(&self.config).context("Failed to initialize clipboard")?,
        );
        self.clipboard = Some(Arc::clone(&clipboard));
        Ok(clipboard)
    }

    pub async fn handle_command(&mut self, command: Option<Commands>) -> Result<()> {
        match command.unwrap_or(Commands::Watch) {
            Commands::Watch => self.watch().await,
            Commands::List { limit } => self.list(limit.map(|n| n as usize)).await,
            Commands::Get { id } => self.get(id).await,
            Commands::Search { term, limit } => {
                self.search(&term, limit.map(|n| n as usize)).await
            }
            Commands::Clear => self.clear().await,
            Commands::Status => self.status().await,
            Commands::Config { action } => self.handle_config_action(action),
        }
    }

    async fn watch(&mut self) -> Result<()> {
        // Clipboard first: without it there is nothing to record
        let clipboard = self.ensure_clipboard()?;
        let history = self.ensure_history().await?;

        let events = clipboard
            .watch()
            .await
            .context("Failed to watch clipboard")?;
        let watcher = Watcher::new(history).await;

        info!("Watching {} clipboard", clipboard.name());
        let stats = watcher.run(events, shutdown_signal()).await;
        info!(
            "Watcher stopped: {} stored, {} skipped, {} failed",
            stats.stored, stats.skipped, stats.failed
        );

        Ok(())
    }

    async fn list(&mut self, limit: Option<usize>) -> Result<()> {
        let limit = limit.unwrap_or(self.config.display.list_limit);
        let history = self.ensure_history().await?;
        let items = history.list_recent(limit).await?;

        writeln!(self.out, "Last {} clipboard items:", limit)?;
        if items.is_empty() {
            writeln!(self.out, "No items found.")?;
            return Ok(());
        }

        for item in items {
            writeln!(
                self.out,
                "{}: {}",
                item.id,
                preview(&item.content, self.config.display.preview_width)
            )?;
        }

        Ok(())
    }

    async fn get(&mut self, id: i64) -> Result<()> {
        let history = self.ensure_history().await?;
        let Some(content) = history.get_by_id(id).await? else {
            bail!("No item found with ID: {}", id);
        };

        let clipboard = self.ensure_clipboard()?;
        clipboard
            .set_text(&content)
            .await
            .context("Failed to write to clipboard")?;

        writeln!(self.out, "Copied item #{} to clipboard.", id)?;
        Ok(())
    }

    async fn search(&mut self, term: &str, limit: Option<usize>) -> Result<()> {
        let limit = limit.unwrap_or(self.config.display.search_limit);
        let history = self.ensure_history().await?;
        let items = history.search(term, limit).await?;

        writeln!(self.out, "Search results for \"{}\":", term)?;
        if items.is_empty() {
            writeln!(self.out, "No items found.")?;
            return Ok(());
        }

        for item in items {
            writeln!(
                self.out,
                "{}: {}",
                item.id,
                preview(&item.content, self.config.display.preview_width)
            )?;
        }

        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        let history = self.ensure_history().await?;
        let deleted = history.clear().await?;

        writeln!(self.out, "Cleared {} items.", deleted)?;
        Ok(())
    }

    async fn status(&mut self) -> Result<()> {
        let history = self.ensure_history().await?;
        let count = history.count().await?;
        let last = history.list_recent(1).await?;

        writeln!(self.out, "ClipStash Status:")?;
        writeln!(self.out, "  Version: {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(self.out, "  Database: {}", history.path().display())?;
        writeln!(self.out, "  Entries: {}", count)?;
        if let Some(item) = last.first() {
            match history.get_entry(item.id).await {
                Ok(Some(entry)) => writeln!(
                    self.out,
                    "  Last capture: #{} at {}",
                    entry.id,
                    entry.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                )?,
                Ok(None) => {}
                Err(e) => warn!("Could not read last capture: {}", e),
            }
        }

        Ok(())
    }

    fn handle_config_action(&mut self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                writeln!(self.out, "Current Configuration:")?;
                write!(self.out, "{}", self.config.to_toml()?)?;
            }
            ConfigAction::Init { force } => {
                let path = Config::write_example(force)?;
                writeln!(self.out, "Example configuration written to {}", path.display())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MockClipboardProvider;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    async fn handler_with(
        entries: &[&str],
    ) -> (CliHandler, Arc<HistoryDatabase>, SharedBuf, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            HistoryDatabase::open(&temp_dir.path().join("cli.db"))
                .await
                .unwrap(),
        );
        for entry in entries {
            db.insert(entry, Utc::now()).await.unwrap();
        }

        let out = SharedBuf::default();
        let handler = CliHandler::new(Config::default())
            .with_history(Arc::clone(&db))
            .with_output(out.clone());
        (handler, db, out, temp_dir)
    }

    #[rstest]
    #[case("short", 80, "short")]
    #[case("abcdef", 3, "abc...")]
    #[case("abc", 3, "abc")]
    #[case("héllo wörld", 5, "héllo...")]
    #[case("", 80, "")]
    fn test_preview(#[case] input: &str, #[case] width: usize, #[case] expected: &str) {
        assert_eq!(preview(input, width), expected);
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["clipstash"]).unwrap();
        assert_eq!(cli.command, None);

        let cli = Cli::try_parse_from(["clipstash", "get", "42"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Get { id: 42 }));

        let cli = Cli::try_parse_from(["clipstash", "search", "needle", "-n", "5"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Search {
                term: "needle".to_string(),
                limit: Some(5)
            })
        );
    }

    #[rstest]
    #[case(&["clipstash", "get"])]
    #[case(&["clipstash", "get", "abc"])]
    #[case(&["clipstash", "get", "0"])]
    #[case(&["clipstash", "search"])]
    #[case(&["clipstash", "frobnicate"])]
    #[case(&["clipstash", "list", "-n", "0"])]
    #[case(&["clipstash", "list", "-n", "1001"])]
    #[case(&["clipstash", "search", "x", "--limit", "18446744073709551615"])]
    fn test_invalid_input_rejected(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[tokio::test]
    async fn test_list_truncates_and_orders() {
        let long = "x".repeat(100);
        let (mut handler, _db, out, _temp_dir) = handler_with(&["first", long.as_str()]).await;

        handler
            .handle_command(Some(Commands::List { limit: None }))
            .await
            .unwrap();

        let expected = format!(
            "Last 10 clipboard items:\n2: {}...\n1: first\n",
            "x".repeat(80)
        );
        assert_eq!(out.text(), expected);
    }

    #[tokio::test]
    async fn test_list_respects_explicit_limit() {
        let (mut handler, _db, out, _temp_dir) = handler_with(&["a", "b", "c"]).await;

        let cli = Cli::try_parse_from(["clipstash", "list", "-n", "2"]).unwrap();
        handler.handle_command(cli.command).await.unwrap();

        assert_eq!(out.text(), "Last 2 clipboard items:\n3: c\n2: b\n");
    }

    #[tokio::test]
    async fn test_empty_list_reports_no_items() {
        let (mut handler, _db, out, _temp_dir) = handler_with(&[]).await;

        handler
            .handle_command(Some(Commands::List { limit: None }))
            .await
            .unwrap();

        assert_eq!(out.text(), "Last 10 clipboard items:\nNo items found.\n");
    }

    #[tokio::test]
    async fn test_search_reports_no_items() {
        let (mut handler, _db, out, _temp_dir) = handler_with(&["alpha"]).await;

        handler
            .handle_command(Some(Commands::Search {
                term: "zeta".to_string(),
                limit: None,
            }))
            .await
            .unwrap();

        assert_eq!(out.text(), "Search results for \"zeta\":\nNo items found.\n");
    }

    #[tokio::test]
    async fn test_get_copies_to_clipboard() {
        let (handler, _db, out, _temp_dir) = handler_with(&["  exact text \n"]).await;

        let mut clipboard = MockClipboardProvider::new();
        clipboard
            .expect_set_text()
            .withf(|text: &str| text == "  exact text \n")
            .times(1)
            .returning(|_| Ok(()));

        let mut handler = handler.with_clipboard(Arc::new(clipboard));
        handler
            .handle_command(Some(Commands::Get { id: 1 }))
            .await
            .unwrap();

        assert_eq!(out.text(), "Copied item #1 to clipboard.\n");
    }

    #[tokio::test]
    async fn test_get_missing_id_fails_without_touching_clipboard() {
        let (handler, _db, _out, _temp_dir) = handler_with(&[]).await;

        let mut clipboard = MockClipboardProvider::new();
        clipboard.expect_set_text().times(0);

        let mut handler = handler.with_clipboard(Arc::new(clipboard));
        let err = handler
            .handle_command(Some(Commands::Get { id: 7 }))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "No item found with ID: 7");
    }

    #[tokio::test]
    async fn test_clear_reports_count() {
        let (mut handler, db, out, _temp_dir) = handler_with(&["a", "b", "c"]).await;

        handler.handle_command(Some(Commands::Clear)).await.unwrap();

        assert_eq!(out.text(), "Cleared 3 items.\n");
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_shows_count() {
        let (mut handler, _db, out, _temp_dir) = handler_with(&["a", "b"]).await;

        handler.handle_command(Some(Commands::Status)).await.unwrap();

        let text = out.text();
        assert!(text.contains("Entries: 2"));
        assert!(text.contains("Last capture: #2"));
    }

    #[tokio::test]
    async fn test_status_tolerates_foreign_timestamp() {
        let (mut handler, db, out, _temp_dir) = handler_with(&["a"]).await;

        let other = rusqlite::Connection::open(db.path()).unwrap();
        other
            .execute(
                "INSERT INTO history (content, created_at) VALUES ('b', 'yesterday')",
                [],
            )
            .unwrap();

        handler.handle_command(Some(Commands::Status)).await.unwrap();

        let text = out.text();
        assert!(text.contains("Entries: 2"));
        assert!(!text.contains("Last capture"));
    }
}
