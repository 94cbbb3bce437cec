/*!
 * Derived net-price preview
 *
 * The preview is keyed on (NDC, insurance scope). Any change to the key
 * drops the previous quote before the new one is requested, so a price is
 * never shown under a selection it was not computed for.
 */

use tracing::{debug, warn};

use crate::data_types::{InsuranceScope, Ndc, PricingQuote};
use crate::{Result, RxError};

/// Why no price can be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The backend has no price for this pair
    NotPriced,
    /// 401/403 from the public pricing endpoint
    AccessBlocked,
    /// Transport or server failure
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QuoteState {
    /// NDC or insurance selection missing
    #[default]
    Inactive,
    Pending,
    Ready(PricingQuote),
    Unavailable(UnavailableReason),
}

impl QuoteState {
    /// The quote, only when one is ready
    pub fn quote(&self) -> Option<&PricingQuote> {
        match self {
            QuoteState::Ready(quote) => Some(quote),
            _ => None,
        }
    }

    /// Text for the price cell
    pub fn display(&self) -> String {
        match self {
            QuoteState::Inactive => String::new(),
            QuoteState::Pending => "Loading…".to_string(),
            QuoteState::Ready(quote) => match quote.net_price {
                Some(price) => format!("${:.2}", price),
                None => "Unavailable".to_string(),
            },
            QuoteState::Unavailable(UnavailableReason::AccessBlocked) => "Unavailable (public access blocked)".to_string(),
            QuoteState::Unavailable(_) => "Unavailable".to_string(),
        }
    }
}

/// A pricing request to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteTicket {
    pub token: u64,
    pub ndc: Ndc,
    pub scope: InsuranceScope,
}

impl QuoteTicket {
    pub fn insurance_id(&self) -> i64 {
        self.scope.id()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricingPreview {
    key: Option<(Ndc, InsuranceScope)>,
    token: u64,
    state: QuoteState,
}

impl PricingPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the key. Returns a ticket when a new quote must be fetched.
    ///
    /// Setting the same key again while a quote is pending or ready is a no-op.
    pub fn set_key(&mut self, ndc: Option<&Ndc>, scope: Option<InsuranceScope>) -> Option<QuoteTicket> {
        let key = match (ndc, scope) {
            (Some(ndc), Some(scope)) => Some((ndc.clone(), scope)),
            _ => None,
        };

        if key.is_some() && key == self.key && matches!(self.state, QuoteState::Pending | QuoteState::Ready(_)) {
            return None;
        }

        self.token += 1;
        self.key = key;
        match &self.key {
            None => {
                self.state = QuoteState::Inactive;
                None
            }
            Some((ndc, scope)) => {
                self.state = QuoteState::Pending;
                debug!(ndc = %ndc, scope = %scope, token = self.token, "requesting quote");
                Some(QuoteTicket { token: self.token, ndc: ndc.clone(), scope: *scope })
            }
        }
    }

    /// Clear the key and drop any pending request
    pub fn clear(&mut self) {
        self.token += 1;
        self.key = None;
        self.state = QuoteState::Inactive;
    }

    /// Apply a pricing response. Returns false for a superseded ticket.
    pub fn complete(&mut self, ticket: &QuoteTicket, outcome: Result<Option<PricingQuote>>) -> bool {
        if ticket.token != self.token {
            debug!(token = ticket.token, current = self.token, "discarding stale quote");
            return false;
        }
        self.state = match outcome {
            Ok(Some(quote)) if quote.net_price.is_some() => QuoteState::Ready(quote),
            Ok(_) => QuoteState::Unavailable(UnavailableReason::NotPriced),
            Err(e) => {
                warn!(ndc = %ticket.ndc, scope = %ticket.scope, error = %e, "quote lookup failed");
                QuoteState::Unavailable(unavailable_reason(&e))
            }
        };
        true
    }

    pub fn state(&self) -> &QuoteState {
        &self.state
    }

    pub fn key(&self) -> Option<&(Ndc, InsuranceScope)> {
        self.key.as_ref()
    }
}

fn unavailable_reason(error: &RxError) -> UnavailableReason {
    if error.is_access_blocked() {
        UnavailableReason::AccessBlocked
    } else {
        UnavailableReason::Failed(error.to_string())
    }
}
