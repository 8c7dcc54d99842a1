//! Query engine.
//!
//! Turns `(pattern, mode, case sensitivity)` into a compiled matcher plus the
//! storage prefilter that narrows rows before the matcher runs:
//!
//! | Mode | Field | Case | Prefilter |
//! |------|-------|------|-----------|
//! | substring | name | sensitive | `instr(name, ?)` |
//! | substring | name | insensitive | `instr(name_folded, ?)` |
//! | prefix | name | either | `GLOB 'p*'` range on the name index |
//! | substring / prefix | path | sensitive | `instr(path, ?)` / `GLOB` on the key |
//! | substring / prefix | path | insensitive | full scan |
//! | regex | any | either | full scan |
//!
//! The compiled matcher is always applied to each prefiltered row, so
//! results never depend on SQLite's own string rules. Case-insensitive
//! literal matching folds both sides with [`fold_case`].
//!
//! An empty pattern matches every record. Zero matches is an empty
//! sequence, not an error.

use futures::stream::Stream;
use futures::{StreamExt, TryStreamExt};
use regex::{Regex, RegexBuilder};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

use crate::cursor::PaginationCursor;
use crate::error::Result;
use crate::models::{fold_case, EntryRecord};
use crate::store::{EntryStream, IndexStore, Prefilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Pattern occurs anywhere in the field.
    #[default]
    Substring,
    /// Field starts with the pattern.
    Prefix,
    /// Unanchored regular expression.
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchField {
    #[default]
    Name,
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub pattern: String,
    pub mode: MatchMode,
    pub case_sensitive: bool,
    pub field: MatchField,
}

impl Query {
    pub fn new(pattern: impl Into<String>, mode: MatchMode, case_sensitive: bool) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
            case_sensitive,
            field: MatchField::Name,
        }
    }

    pub fn substring(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchMode::Substring, true)
    }

    pub fn prefix(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchMode::Prefix, true)
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchMode::Regex, true)
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn on_field(mut self, field: MatchField) -> Self {
        self.field = field;
        self
    }

    /// Compiles the query. Malformed regexes fail here, before any storage
    /// access.
    pub fn compile(&self) -> Result<CompiledQuery> {
        let field = self.field;
        let cs = self.case_sensitive;

        if self.pattern.is_empty() {
            return Ok(CompiledQuery {
                matcher: Matcher::All,
                field,
                prefilter: Prefilter::All,
            });
        }

        let (matcher, prefilter) = match self.mode {
            MatchMode::Substring => {
                let needle = if cs {
                    self.pattern.clone()
                } else {
                    fold_case(&self.pattern)
                };
                let prefilter = match (field, cs) {
                    (MatchField::Name, true) => Prefilter::NameContains(needle.clone()),
                    (MatchField::Name, false) => Prefilter::NameContainsFolded(needle.clone()),
                    (MatchField::Path, true) => Prefilter::PathContains(needle.clone()),
                    (MatchField::Path, false) => Prefilter::All,
                };
                (Matcher::Contains { needle, folded: !cs }, prefilter)
            }
            MatchMode::Prefix => {
                let needle = if cs {
                    self.pattern.clone()
                } else {
                    fold_case(&self.pattern)
                };
                let prefilter = match (field, cs) {
                    (MatchField::Name, true) => Prefilter::NamePrefix(needle.clone()),
                    (MatchField::Name, false) => Prefilter::NamePrefixFolded(needle.clone()),
                    (MatchField::Path, true) => Prefilter::PathPrefix(needle.clone()),
                    (MatchField::Path, false) => Prefilter::All,
                };
                (Matcher::StartsWith { needle, folded: !cs }, prefilter)
            }
            MatchMode::Regex => {
                let regex = RegexBuilder::new(&self.pattern)
                    .case_insensitive(!cs)
                    .build()?;
                (Matcher::Regex(regex), Prefilter::All)
            }
        };

        Ok(CompiledQuery {
            matcher,
            field,
            prefilter,
        })
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    All,
    Contains { needle: String, folded: bool },
    StartsWith { needle: String, folded: bool },
    Regex(Regex),
}

/// A query ready to run: the per-record matcher and its storage prefilter.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    matcher: Matcher,
    field: MatchField,
    prefilter: Prefilter,
}

impl CompiledQuery {
    pub fn prefilter(&self) -> &Prefilter {
        &self.prefilter
    }

    pub fn matches(&self, entry: &EntryRecord) -> bool {
        let value = match self.field {
            MatchField::Name => entry.name.as_str(),
            MatchField::Path => entry.path.as_str(),
        };
        match &self.matcher {
            Matcher::All => true,
            Matcher::Contains { needle, folded: false } => value.contains(needle.as_str()),
            Matcher::Contains { needle, folded: true } => fold_case(value).contains(needle.as_str()),
            Matcher::StartsWith { needle, folded: false } => value.starts_with(needle.as_str()),
            Matcher::StartsWith { needle, folded: true } => {
                fold_case(value).starts_with(needle.as_str())
            }
            Matcher::Regex(regex) => regex.is_match(value),
        }
    }
}

/// Runs `query` against `store`.
///
/// Compilation happens up front, so an invalid pattern returns an error
/// without touching the store. The returned sequence is lazy: rows are read
/// only as it is polled.
pub fn search<'a>(store: &'a IndexStore, query: &Query) -> Result<MatchSequence<'a>> {
    let compiled = query.compile()?;
    debug!(pattern = %query.pattern, mode = ?query.mode, prefilter = ?compiled.prefilter, "executing query");

    let prefilter = compiled.prefilter.clone();
    let inner = store.find_by_name_pattern(prefilter, move |entry| compiled.matches(entry));
    Ok(MatchSequence::from_stream(inner))
}

/// Lazy, forward-only sequence of query matches, in storage order.
///
/// Single pass: to start over, run the query again.
pub struct MatchSequence<'a> {
    inner: EntryStream<'a>,
    finished: bool,
}

impl<'a> MatchSequence<'a> {
    pub(crate) fn from_stream(inner: EntryStream<'a>) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    /// Next match, or `None` once the sequence is exhausted.
    pub async fn next_match(&mut self) -> Option<Result<EntryRecord>> {
        if self.finished {
            return None;
        }
        let item = self.inner.next().await;
        if item.is_none() {
            self.finished = true;
        }
        item
    }

    /// Drains the whole sequence into memory.
    pub async fn collect_all(self) -> Result<Vec<EntryRecord>> {
        self.try_collect().await
    }

    pub fn into_cursor(self) -> PaginationCursor<'a> {
        PaginationCursor::new(self)
    }
}

impl Stream for MatchSequence<'_> {
    type Item = Result<EntryRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let polled = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(None) = polled {
            self.finished = true;
        }
        polled
    }
}
