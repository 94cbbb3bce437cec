/*!
 * Paginated suggestion lookup with stale-response discard
 *
 * A [`SuggestionLookup`] owns the state of one searchable stage. It never
 * performs I/O: callers ask it for a [`LookupTicket`], run the request, and
 * hand the outcome back with [`SuggestionLookup::complete`]. Every ticket
 * carries the request token current when it was issued, and an outcome for
 * any other token is dropped, so the visible suggestions always belong to
 * the most recently issued query regardless of response arrival order.
 */

use tracing::{debug, warn};

use crate::api::LookupRequest;
use crate::data_types::{InsuranceScope, Named};
use crate::pagination::{dedup_by_name, Cursor, Page, Paginated};
use crate::{Result, RxError};

/// A request the lookup wants issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    pub token: u64,
    pub request: LookupRequest,
}

/// Load state of a lookup, as shown next to its input
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LookupStatus {
    #[default]
    Idle,
    Loading { cursor: Cursor },
    Loaded,
    /// Network or server failure; previous suggestions are kept
    Failed(String),
    /// 401/403 from a public endpoint
    AccessBlocked(String),
}

/// What [`SuggestionLookup::complete`] did with an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Stale,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SuggestionLookup<T> {
    label: &'static str,
    page_size: usize,
    query: Option<String>,
    limit_to_insurance: bool,
    scope: Option<InsuranceScope>,
    results: Paginated<T>,
    results_query: Option<String>,
    suggestions: Vec<T>,
    token: u64,
    in_flight: Option<Cursor>,
    status: LookupStatus,
}

impl<T: Named + Clone> SuggestionLookup<T> {
    /// `label` names the records in status messages, e.g. "drugs"
    pub fn new(label: &'static str, page_size: usize) -> Self {
        Self {
            label,
            page_size,
            query: None,
            limit_to_insurance: false,
            scope: None,
            results: Paginated::new(page_size),
            results_query: None,
            suggestions: Vec::new(),
            token: 0,
            in_flight: None,
            status: LookupStatus::Idle,
        }
    }

    /// Start a new query, superseding anything in flight.
    ///
    /// Blank text clears the suggestions and issues nothing. With limiting
    /// on and no scope available there is nothing valid to ask for either.
    pub fn begin_query(
        &mut self,
        text: &str,
        limit_to_insurance: bool,
        scope: Option<InsuranceScope>,
    ) -> Option<LookupTicket> {
        self.token += 1;
        self.in_flight = None;

        let text = text.trim();
        if text.is_empty() || (limit_to_insurance && scope.is_none()) {
            self.query = None;
            self.results.clear();
            self.results_query = None;
            self.suggestions.clear();
            self.status = LookupStatus::Idle;
            return None;
        }

        // The previous results stay visible until page 1 of this query lands.
        self.query = Some(text.to_string());
        self.limit_to_insurance = limit_to_insurance;
        self.scope = scope;
        Some(self.issue(Cursor::first()))
    }

    /// Ask for the next page of the current query.
    ///
    /// Returns `None` when no query is active, the last page was short, or
    /// a page is already in flight.
    pub fn begin_next_page(&mut self) -> Option<LookupTicket> {
        if self.query.is_none() || self.in_flight.is_some() || self.results_query != self.query {
            return None;
        }
        if !self.results.has_more() {
            return None;
        }
        let cursor = self.results.next_cursor()?;
        Some(self.issue(cursor))
    }

    fn issue(&mut self, cursor: Cursor) -> LookupTicket {
        self.in_flight = Some(cursor);
        self.status = LookupStatus::Loading { cursor };
        let query = self.query.clone().unwrap_or_default();
        debug!(lookup = self.label, token = self.token, page = cursor.page, query = %query, "issuing lookup");
        LookupTicket {
            token: self.token,
            request: LookupRequest {
                query,
                cursor,
                page_size: self.page_size,
                limit_to_insurance: self.limit_to_insurance,
                scope: self.scope,
            },
        }
    }

    /// Apply the outcome of a ticket's request
    pub fn complete(&mut self, ticket: &LookupTicket, outcome: Result<Vec<T>>) -> Completion {
        let cursor = ticket.request.cursor;
        if ticket.token != self.token || self.in_flight != Some(cursor) {
            debug!(lookup = self.label, token = ticket.token, current = self.token, "discarding stale response");
            return Completion::Stale;
        }
        self.in_flight = None;

        match outcome {
            Ok(items) => {
                if cursor == Cursor::first() {
                    self.results.clear();
                    self.results_query = self.query.clone();
                }
                let page = Page::from_items(cursor, self.page_size, items);
                self.results.push(cursor, page);
                self.suggestions = dedup_by_name(self.results.items());
                self.status = LookupStatus::Loaded;
                Completion::Applied
            }
            Err(e) => {
                warn!(lookup = self.label, error = %e, "lookup failed");
                self.status = failure_status(&e, self.label);
                Completion::Failed
            }
        }
    }

    /// Drop anything in flight without touching the current suggestions
    pub fn cancel(&mut self) {
        self.token += 1;
        self.in_flight = None;
        if matches!(self.status, LookupStatus::Loading { .. }) {
            self.status = LookupStatus::Idle;
        }
    }

    /// Back to the initial empty state
    pub fn clear(&mut self) {
        self.cancel();
        self.query = None;
        self.results.clear();
        self.results_query = None;
        self.suggestions.clear();
        self.status = LookupStatus::Idle;
    }

    /// De-duplicated suggestions, in arrival order
    pub fn suggestions(&self) -> &[T] {
        &self.suggestions
    }

    /// Every record received for the current query, duplicates included
    pub fn results(&self) -> &[T] {
        self.results.items()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn status(&self) -> &LookupStatus {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_more(&self) -> bool {
        self.results_query.is_some() && self.results_query == self.query && self.results.has_more()
    }
}

pub(crate) fn failure_status(error: &RxError, label: &str) -> LookupStatus {
    if error.is_access_blocked() {
        LookupStatus::AccessBlocked(error.stage_message(label))
    } else {
        LookupStatus::Failed(error.stage_message(label))
    }
}
