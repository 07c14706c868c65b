//! Full-document text search with wrap-around hit navigation

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};

use crate::document::DocumentHandle;
use crate::geometry::DocRect;

/// One occurrence of the search term
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchHit {
    pub page: usize,
    /// Document-space rectangle around the occurrence
    pub rect: DocRect,
}

/// What the status line shows about search
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchStatus {
    /// No search performed
    #[default]
    Inactive,
    /// A search ran and found nothing
    NoHits,
    /// `current` is 0-based
    Hit { current: usize, total: usize },
}

impl SearchStatus {
    /// Whether next/previous hit navigation makes sense
    #[must_use]
    pub fn navigation_enabled(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => Ok(()),
            Self::NoHits => write!(f, "no hits"),
            Self::Hit { current, total } => write!(f, "Hit {}/{}", current + 1, total),
        }
    }
}

/// Search state for one document session
#[derive(Debug, Default)]
pub struct SearchCoordinator {
    /// Page text, extracted on first use and kept for the session
    text_cache: HashMap<usize, String>,
    active: bool,
    term: String,
    hits: Vec<SearchHit>,
    current: Option<usize>,
}

impl SearchCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every occurrence of `term`, page order outer, engine order within a
    /// page. Pages whose text cannot be read or searched are skipped.
    pub fn find_all(&mut self, doc: &dyn DocumentHandle, term: &str) -> Vec<SearchHit> {
        let page_count = match doc.page_count() {
            Ok(count) => count,
            Err(err) => {
                warn!("Search aborted: {err}");
                return Vec::new();
            }
        };

        let mut hits = Vec::new();
        for page in 0..page_count {
            // A page without a text layer cannot match
            if self.page_text(doc, page).is_some_and(|text| text.trim().is_empty()) {
                continue;
            }
            match doc.find_text(page, term) {
                Ok(rects) => hits.extend(rects.into_iter().map(|rect| SearchHit { page, rect })),
                Err(err) => warn!("Skipping page {page} in search: {err}"),
            }
        }
        debug!("Search for {term:?} found {} hit(s)", hits.len());
        hits
    }

    /// Text of a page, extracting it on first request
    pub fn page_text(&mut self, doc: &dyn DocumentHandle, page: usize) -> Option<&str> {
        if !self.text_cache.contains_key(&page) {
            match doc.extract_text(page) {
                Ok(text) => {
                    self.text_cache.insert(page, text);
                }
                Err(err) => {
                    warn!("Could not extract text of page {page}: {err}");
                    return None;
                }
            }
        }
        self.text_cache.get(&page).map(String::as_str)
    }

    /// Submit a term from the search box.
    ///
    /// A blank term clears the search. Any other term goes to the engine as
    /// typed, surrounding spaces included. Re-submitting the active term moves
    /// to the next hit; a new term runs a fresh search and lands on its first
    /// hit. Returns the hit to show, if any.
    pub fn submit(&mut self, doc: &dyn DocumentHandle, term: &str) -> Option<SearchHit> {
        if term.trim().is_empty() {
            self.clear();
            return None;
        }

        if !(self.active && self.term == term) {
            self.hits = self.find_all(doc, term);
            self.term = term.to_string();
            self.current = None;
            self.active = true;
        }
        self.next_hit()
    }

    pub fn next_hit(&mut self) -> Option<SearchHit> {
        if self.hits.is_empty() {
            return None;
        }

        self.current = Some(match self.current {
            Some(idx) => (idx + 1) % self.hits.len(),
            None => 0,
        });
        self.current_hit()
    }

    pub fn prev_hit(&mut self) -> Option<SearchHit> {
        if self.hits.is_empty() {
            return None;
        }

        self.current = Some(match self.current {
            Some(0) | None => self.hits.len() - 1,
            Some(idx) => idx - 1,
        });
        self.current_hit()
    }

    #[must_use]
    pub fn current_hit(&self) -> Option<SearchHit> {
        self.current.and_then(|idx| self.hits.get(idx)).copied()
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    #[must_use]
    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    #[must_use]
    pub fn term(&self) -> &str {
        &self.term
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn status(&self) -> SearchStatus {
        match (self.active, self.current) {
            (false, _) => SearchStatus::Inactive,
            (true, Some(current)) if !self.hits.is_empty() => SearchStatus::Hit {
                current,
                total: self.hits.len(),
            },
            (true, _) => SearchStatus::NoHits,
        }
    }

    /// Forget the current search, keeping extracted text
    pub fn clear(&mut self) {
        self.active = false;
        self.term.clear();
        self.hits.clear();
        self.current = None;
    }

    /// Forget everything, for when the document goes away
    pub fn reset(&mut self) {
        self.clear();
        self.text_cache.clear();
    }
}
