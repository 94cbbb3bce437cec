/*!
 * Cursor pagination and suggestion de-duplication
 *
 * Pages are requested by an explicit cursor and accumulated in order. The
 * accumulator knows nothing about scrolling; hosts decide when to ask for
 * the next cursor.
 */

use std::collections::HashSet;

use crate::data_types::Named;

/// 1-based page cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cursor {
    pub page: u32,
}

impl Cursor {
    pub fn first() -> Self {
        Cursor { page: 1 }
    }

    pub fn next(self) -> Self {
        Cursor { page: self.page + 1 }
    }

    /// Number of records before this page
    pub fn offset(self, page_size: usize) -> usize {
        (self.page.saturating_sub(1) as usize) * page_size
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::first()
    }
}

/// One fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `Some` when the page came back full and another may follow
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn from_items(cursor: Cursor, page_size: usize, items: Vec<T>) -> Self {
        let next_cursor = (page_size > 0 && items.len() >= page_size).then(|| cursor.next());
        Page { items, next_cursor }
    }

    pub fn empty() -> Self {
        Page { items: Vec::new(), next_cursor: None }
    }
}

/// Slice one page out of an in-memory result set.
///
/// A page past the end yields an empty page rather than an error.
pub fn page_of<T: Clone>(all: &[T], cursor: Cursor, page_size: usize) -> Page<T> {
    let start = cursor.offset(page_size).min(all.len());
    let end = (start + page_size).min(all.len());
    Page::from_items(cursor, page_size, all[start..end].to_vec())
}

/// Ordered accumulation of pages for one query
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    items: Vec<T>,
    page_size: usize,
    pages_loaded: u32,
    next_cursor: Option<Cursor>,
}

impl<T> Paginated<T> {
    pub fn new(page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            page_size,
            pages_loaded: 0,
            next_cursor: Some(Cursor::first()),
        }
    }

    /// Append a page. Pages must arrive in cursor order; anything else is ignored.
    pub fn push(&mut self, cursor: Cursor, page: Page<T>) -> bool {
        if self.next_cursor != Some(cursor) {
            return false;
        }
        self.items.extend(page.items);
        self.pages_loaded = cursor.page;
        self.next_cursor = page.next_cursor;
        true
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pages_loaded(&self) -> u32 {
        self.pages_loaded
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Cursor of the next page, if more results are plausible
    pub fn next_cursor(&self) -> Option<Cursor> {
        self.next_cursor
    }

    /// More pages are plausible while `count >= pages_loaded * page_size`
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
            && self.items.len() >= (self.pages_loaded as usize) * self.page_size
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.pages_loaded = 0;
        self.next_cursor = Some(Cursor::first());
    }
}

/// Keep the first record of each display name, preserving order.
///
/// Names compare trimmed and case-insensitively; the first spelling wins.
pub fn dedup_by_name<T: Named + Clone>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(name_key(item.display_name())))
        .cloned()
        .collect()
}

pub(crate) fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Scroll position of a suggestion panel, for hosts that render one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl ScrollMetrics {
    /// Whether the viewport is within `threshold` pixels of the bottom
    pub fn near_bottom(&self, threshold: u32) -> bool {
        self.scroll_height - (self.scroll_top + self.client_height) <= threshold as f64
    }
}
