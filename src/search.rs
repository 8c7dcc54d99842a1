//! `search` command: run a query and page through the matches.
//!
//! When both stdin and stdout are terminals the results are shown one page
//! at a time with a `Continue? y/n:` prompt between pages. Otherwise (or
//! with `--all` / `--json`) every match is printed in one go.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::config::Config;
use crate::cursor::Page;
use crate::ingest::update_index;
use crate::models::EntryRecord;
use crate::query::{search, MatchField, MatchMode, Query};
use crate::store::IndexStore;

/// Flags accepted by `locatex search`, already merged with `[search]` config.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: MatchMode,
    pub case_sensitive: bool,
    pub match_path: bool,
    pub page_size: i64,
    pub all: bool,
    pub json: bool,
    /// Reconcile against `scan.root` before querying.
    pub update: bool,
}

impl SearchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: MatchMode::Substring,
            case_sensitive: config.search.case_sensitive,
            match_path: config.search.match_path,
            page_size: config.search.page_size,
            all: false,
            json: false,
            update: false,
        }
    }

    fn query(&self, pattern: &str) -> Query {
        let field = if self.match_path {
            MatchField::Path
        } else {
            MatchField::Name
        };
        Query::new(pattern, self.mode, self.case_sensitive).on_field(field)
    }
}

pub async fn run_search(config: &Config, pattern: &str, opts: &SearchOptions) -> Result<()> {
    // Compile before touching storage so a bad regex never triggers a walk
    let query = opts.query(pattern);
    query.compile()?;

    if opts.update || !config.index.path.exists() {
        info!(root = %config.scan.root.display(), "building index before search");
        match update_index(config, None).await {
            Ok(_) => {}
            Err(e) if e.is_warning() => eprintln!("warning: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    let store = IndexStore::from_config(&config.index).await?;
    let interactive = !opts.all
        && !opts.json
        && atty::is(atty::Stream::Stdin)
        && atty::is(atty::Stream::Stdout);

    let outcome = page_through(&store, &query, opts, interactive).await;
    store.close().await;

    let shown = outcome?;
    if shown == 0 && !opts.json {
        println!("No results found.");
    }
    Ok(())
}

/// Prints pages until the matches run out or the user declines to continue.
/// Returns how many records were printed.
async fn page_through(
    store: &IndexStore,
    query: &Query,
    opts: &SearchOptions,
    interactive: bool,
) -> Result<u64> {
    let mut cursor = search(store, query)?.into_cursor();
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut shown = 0u64;

    loop {
        let page = cursor.next_page(opts.page_size).await?;
        shown += print_page(&page, opts.json)?;

        if !page.has_more {
            break;
        }
        if interactive && !confirm_continue(&mut stdin).await? {
            break;
        }
    }

    info!(shown, pages = cursor.pages_served(), "search finished");
    Ok(shown)
}

fn print_page(page: &Page, json: bool) -> Result<u64> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in &page.records {
        write_record(&mut out, record, json)?;
    }
    out.flush()?;
    Ok(page.records.len() as u64)
}

fn write_record(out: &mut impl Write, record: &EntryRecord, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", record)?;
    }
    Ok(())
}

async fn confirm_continue<R>(input: &mut R) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    print!("Continue? y/n: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(false);
    }
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_is_kind_and_path() {
        let mut buf = Vec::new();
        let record = EntryRecord::file("/home/a/notes.txt", 3, 0).unwrap();
        write_record(&mut buf, &record, false).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "file: /home/a/notes.txt\n");
    }

    #[test]
    fn json_output_is_one_object_per_line() {
        let mut buf = Vec::new();
        let record = EntryRecord::directory("/home/a", 0).unwrap();
        write_record(&mut buf, &record, true).unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["kind"], "directory");
        assert_eq!(value["name"], "a");
    }

    #[tokio::test]
    async fn prompt_accepts_yes_only() {
        let mut yes: &[u8] = b"y\n";
        assert!(confirm_continue(&mut yes).await.unwrap());

        let mut no: &[u8] = b"n\n";
        assert!(!confirm_continue(&mut no).await.unwrap());

        let mut eof: &[u8] = b"";
        assert!(!confirm_continue(&mut eof).await.unwrap());
    }

    #[test]
    fn path_flag_selects_path_field() {
        let mut opts = SearchOptions::from_config(&Config::default());
        assert_eq!(opts.query("x").field, MatchField::Name);
        opts.match_path = true;
        assert_eq!(opts.query("x").field, MatchField::Path);
    }
}
