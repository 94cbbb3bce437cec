/*!
 * # rxlookup: pharmacy drug-pricing lookup
 *
 * Search state and API clients for pricing a drug package under a
 * pharmacy insurance selection.
 *
 * ## Features
 *
 * - **Dependent selection chain**: BIN → PCN → RxGroup → drug class → drug → NDC,
 *   where every selection discards the stages after it
 * - **Ordered lookups**: debounced, paginated name searches that never let a
 *   slow response overwrite a newer query's suggestions
 * - **Pricing preview**: a net price that is always tied to the current NDC and
 *   insurance selection, or shown as unavailable
 * - **One "no insurance" value**: the backend's `0`, `""` and missing-field
 *   spellings all become [`Coverage::Uninsured`](data_types::Coverage)
 * - **Pluggable backend**: an HTTP client with bearer-token refresh and an
 *   in-memory catalog behind the same [`PricingApi`](api::PricingApi) trait
 *
 * ## Quick Start
 *
 * ```no_run
 * use rxlookup::prelude::*;
 *
 * # #[tokio::main]
 * # async fn main() -> Result<()> {
 * let config = RxConfig::load();
 * let api = HttpPricingApi::new(config.clone(), None)?;
 * let mut session = SearchSession::new(api, &config);
 *
 * session.search_bins("610591").await;
 * if let Some(bin) = session.chain().bin_search().suggestions().first().cloned() {
 *     session.select_bin(bin).await;
 * }
 * println!("{} PCNs", session.chain().pcns().items().len());
 * # Ok(())
 * # }
 * ```
 *
 * ## Driving the chain without I/O
 *
 * [`SelectionChain`](chain::SelectionChain) issues tickets and accepts
 * outcomes, so hosts with their own event loop can run requests however
 * they like:
 *
 * ```
 * use rxlookup::prelude::*;
 *
 * let mut chain = SelectionChain::new(20);
 * let first = chain.begin_drug_search("ator").unwrap();
 * let second = chain.begin_drug_search("lisi").unwrap();
 *
 * // The older query's response arrives last and is dropped
 * assert_eq!(chain.complete_drug_search(&second, Ok(vec![])), Completion::Applied);
 * assert_eq!(chain.complete_drug_search(&first, Ok(vec![])), Completion::Stale);
 * ```
 *
 * ## Configuration
 *
 * ```no_run
 * # use rxlookup::prelude::*;
 * let config = ConfigBuilder::new()
 *     .base_url("https://pricing.example.com")
 *     .page_size(50)
 *     .debounce_ms(250)
 *     .build();
 * ```
 */

// Re-export error types from root
pub use error::{AuthError, ExportFormat, Result, RxError};

// Public modules
pub mod alternatives;
pub mod api;
pub mod auth;
pub mod chain;
pub mod client;
pub mod config;
pub mod data_types;
pub mod debounce;
pub mod error;
pub mod export;
pub mod lookup;
pub mod mock;
pub mod pagination;
pub mod pricing;
pub mod schema;
pub mod session;

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```
/// use rxlookup::prelude::*;
/// ```
pub mod prelude {
    pub use crate::alternatives::{split_alternatives, AlternativesView, InsuranceComparison};
    pub use crate::api::{LookupRequest, PricingApi};
    pub use crate::auth::{MemoryTokenStore, TokenStore};
    pub use crate::chain::SelectionChain;
    pub use crate::client::HttpPricingApi;
    pub use crate::config::{ConfigBuilder, RxConfig};
    pub use crate::data_types::*;
    pub use crate::debounce::{Debouncer, Settled};
    pub use crate::error::{Result, RxError};
    pub use crate::export::{CsvExporter, JsonExporter, TableExporter};
    pub use crate::lookup::{Completion, LookupStatus};
    pub use crate::mock::{Catalog, MockPricingApi};
    pub use crate::pricing::{QuoteState, UnavailableReason};
    pub use crate::session::SearchSession;
    pub use crate::ExportFormat;
}

/// Lookup constants
pub mod constants {
    /// Records per page of a paginated lookup
    pub const PAGE_SIZE: usize = 20;

    /// Quiet period before typed text is looked up, in milliseconds
    pub const DEBOUNCE_MS: u64 = 300;

    /// Distance from the bottom of a suggestion list that loads the next page
    pub const SCROLL_THRESHOLD_PX: u32 = 20;

    /// Backend spelling of "no insurance" in id fields
    pub const NO_INSURANCE_ID: i64 = 0;

    /// Digits in a canonical NDC
    pub const NDC_DIGITS: usize = 11;

    /// Digits in a BIN
    pub const BIN_DIGITS: usize = 6;
}

/// Common recipes built on [`SearchSession`](session::SearchSession)
pub mod cookbook {
    use crate::pagination::name_key;
    use crate::prelude::*;

    /// Selections for an end-to-end walk, matched by display name
    #[derive(Debug, Clone)]
    pub struct Walk<'a> {
        pub bin: &'a str,
        pub pcn: &'a str,
        pub rx_group: &'a str,
        pub drug: &'a str,
    }

    fn pick<T: Named + Clone>(options: &[T], wanted: &str, stage: Stage) -> Result<T> {
        let key = name_key(wanted);
        options
            .iter()
            .find(|option| name_key(option.display_name()) == key)
            .cloned()
            .ok_or_else(|| RxError::Validation {
                message: format!("no {} named {:?}", stage, wanted),
                field: Some(stage.to_string()),
                value: Some(wanted.to_string()),
            })
    }

    /// Walk BIN → PCN → RxGroup → drug and return the price of the first NDC.
    ///
    /// A BIN matches on its code or its name.
    ///
    /// # Example
    /// ```
    /// # use rxlookup::prelude::*;
    /// # use rxlookup::cookbook::{walk_to_price, Walk};
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<()> {
    /// let mut session = SearchSession::new(MockPricingApi::sample(), &RxConfig::default());
    /// let walk = Walk { bin: "610591", pcn: "CMK", rx_group: "CMK-STD", drug: "Atorvastatin" };
    /// let quote = walk_to_price(&mut session, &walk).await?;
    /// assert!(quote.quote().is_some());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn walk_to_price<A: PricingApi>(session: &mut SearchSession<A>, walk: &Walk<'_>) -> Result<QuoteState> {
        session.search_bins(walk.bin).await;
        let bins = session.chain().bin_search().suggestions();
        let bin = bins
            .iter()
            .find(|b| b.code.as_str() == walk.bin.trim())
            .cloned()
            .map_or_else(|| pick(bins, walk.bin, Stage::Bin), Ok)?;
        session.select_bin(bin).await;

        let pcn = pick(session.chain().pcns().items(), walk.pcn, Stage::Pcn)?;
        session.select_pcn(pcn).await?;

        let group = pick(session.chain().rx_groups().items(), walk.rx_group, Stage::RxGroup)?;
        session.select_rx_group(group)?;

        session.search_drugs(walk.drug).await;
        let drug = pick(session.chain().drug_search().suggestions(), walk.drug, Stage::Drug)?;
        session.select_drug(drug).await
    }
}
