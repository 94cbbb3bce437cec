/*!
 * Async driver for a selection chain
 *
 * [`SearchSession`] pairs a [`SelectionChain`] with a [`PricingApi`]: each
 * method takes the ticket the chain issues, awaits the call and feeds the
 * outcome back. Staleness is still decided by the chain, so a host that
 * interleaves sessions' futures cannot overwrite newer results.
 */

use tracing::{debug, instrument};

use crate::alternatives::{split_alternatives, AlternativesView};
use crate::api::PricingApi;
use crate::chain::{PackageTicket, SelectionChain, StageTicket};
use crate::config::RxConfig;
use crate::data_types::*;
use crate::debounce::Settled;
use crate::lookup::{Completion, LookupTicket};
use crate::pagination::ScrollMetrics;
use crate::pricing::{QuoteState, QuoteTicket};
use crate::{Result, RxError};

pub struct SearchSession<A> {
    api: A,
    chain: SelectionChain,
    class_version: ClassVersion,
    scroll_threshold_px: u32,
}

impl<A: PricingApi> SearchSession<A> {
    pub fn new(api: A, config: &RxConfig) -> Self {
        Self {
            api,
            chain: SelectionChain::new(config.page_size),
            class_version: ClassVersion::default(),
            scroll_threshold_px: config.scroll_threshold_px,
        }
    }

    /// Use a class version other than the default for class searches
    pub fn with_class_version(mut self, version: ClassVersion) -> Self {
        self.class_version = version;
        self
    }

    pub fn chain(&self) -> &SelectionChain {
        &self.chain
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn reset(&mut self) {
        self.chain.reset();
    }

    pub fn set_limit_to_insurance(&mut self, on: bool) {
        self.chain.set_limit_to_insurance(on);
    }

    // -- Insurance ---------------------------------------------------------

    /// Search BINs by code or name. `None` when the text is blank.
    pub async fn search_bins(&mut self, text: &str) -> Option<Completion> {
        let ticket = self.chain.begin_bin_search(text)?;
        let outcome = self.api.search_bins(&ticket.request.query).await;
        Some(self.chain.complete_bin_search(&ticket, outcome))
    }

    /// Select a BIN and load its PCNs
    #[instrument(skip(self, bin), fields(bin = %bin.code))]
    pub async fn select_bin(&mut self, bin: Bin) -> Completion {
        let ticket = self.chain.select_bin(bin);
        let outcome = self.api.pcns_for_bin(ticket.parent_id).await;
        self.chain.complete_pcns(&ticket, outcome)
    }

    /// Select a PCN and load its RxGroups
    #[instrument(skip(self, pcn), fields(pcn = %pcn.code))]
    pub async fn select_pcn(&mut self, pcn: Pcn) -> Result<Completion> {
        let ticket = self.chain.select_pcn(pcn)?;
        let outcome = self.api.rx_groups_for_pcn(ticket.parent_id).await;
        Ok(self.chain.complete_rx_groups(&ticket, outcome))
    }

    pub fn select_rx_group(&mut self, group: RxGroup) -> Result<()> {
        self.chain.select_rx_group(group)
    }

    // -- Drug classes ------------------------------------------------------

    pub async fn search_drug_classes(&mut self, text: &str) -> Option<Completion> {
        let ticket = self.chain.begin_class_search(text)?;
        Some(self.run_class_search(ticket).await)
    }

    pub async fn load_more_classes(&mut self) -> Option<Completion> {
        let ticket = self.chain.begin_more_classes()?;
        Some(self.run_class_search(ticket).await)
    }

    async fn run_class_search(&mut self, ticket: LookupTicket) -> Completion {
        let outcome = self.api.search_drug_classes(&ticket.request, &self.class_version).await;
        self.chain.complete_class_search(&ticket, outcome)
    }

    /// Select a class and load the drugs in it
    pub async fn select_drug_class(&mut self, class: DrugClass) -> Result<Completion> {
        let ticket: StageTicket = self.chain.select_drug_class(class)?;
        let class_type = ticket.class_type.clone().unwrap_or_else(|| self.class_version.clone());
        let outcome = self.api.drugs_for_class(ticket.parent_id, &class_type).await;
        Ok(self.chain.complete_class_drugs(&ticket, outcome))
    }

    // -- Drugs -------------------------------------------------------------

    /// Run a drug-name search. `None` when nothing was issued.
    pub async fn search_drugs(&mut self, text: &str) -> Option<Completion> {
        let ticket = self.chain.begin_drug_search(text)?;
        Some(self.run_drug_search(ticket).await)
    }

    pub async fn load_more_drugs(&mut self) -> Option<Completion> {
        let ticket = self.chain.begin_more_drugs()?;
        Some(self.run_drug_search(ticket).await)
    }

    /// Load the next drug page when the suggestion list is scrolled near its end
    pub async fn on_drug_scroll(&mut self, metrics: ScrollMetrics) -> Option<Completion> {
        if !metrics.near_bottom(self.scroll_threshold_px) {
            return None;
        }
        self.load_more_drugs().await
    }

    /// Apply debounced input to the drug search
    pub async fn apply_drug_input(&mut self, settled: Settled) -> Option<Completion> {
        match settled {
            Settled::Waiting => None,
            Settled::Clear => self.search_drugs("").await,
            Settled::Query(text) => self.search_drugs(&text).await,
        }
    }

    async fn run_drug_search(&mut self, ticket: LookupTicket) -> Completion {
        let outcome = self.api.search_drugs(&ticket.request).await;
        let completion = self.chain.complete_drug_search(&ticket, outcome);
        debug!(page = ticket.request.cursor.page, ?completion, "drug search page");
        completion
    }

    /// Select a drug; prices its first NDC when an insurance selection
    /// exists and completes its NDC list when the search was partial
    pub async fn select_drug(&mut self, drug: Drug) -> Result<QuoteState> {
        let selection = self.chain.select_drug(drug)?;
        self.run_quote(selection.quote).await;
        if let Some(ticket) = selection.packages {
            self.load_packages(ticket).await;
        }
        Ok(self.chain.quote().clone())
    }

    /// Drain the name search for every package of the selected drug
    async fn load_packages(&mut self, ticket: PackageTicket) -> Completion {
        let mut request = ticket.request.clone();
        let mut drugs = Vec::new();
        loop {
            let page = match self.api.search_drugs(&request).await {
                Ok(page) => page,
                Err(e) => return self.chain.complete_packages(&ticket, Err(e)),
            };
            let full = !page.is_empty() && page.len() >= request.page_size;
            drugs.extend(page);
            if !full {
                break;
            }
            request.cursor = request.cursor.next();
        }
        debug!(drug = %ticket.drug_name, pages = request.cursor.page, "loaded drug packages");
        self.chain.complete_packages(&ticket, Ok(drugs))
    }

    pub async fn select_ndc(&mut self, ndc: Ndc) -> Result<QuoteState> {
        let ticket = self.chain.select_ndc(ndc)?;
        self.run_quote(ticket).await;
        Ok(self.chain.quote().clone())
    }

    async fn run_quote(&mut self, ticket: Option<QuoteTicket>) {
        if let Some(ticket) = ticket {
            let outcome = self.api.pricing_detail(&ticket.ndc, ticket.insurance_id()).await;
            self.chain.complete_quote(&ticket, outcome);
        }
    }

    /// Alternatives for the selected NDC, split by coverage
    pub async fn alternatives(&self) -> Result<AlternativesView> {
        let ndc = self.chain.ndc().ok_or(RxError::MissingUpstream {
            stage: Stage::Ndc,
            requires: Stage::Drug,
        })?;
        let rows = self.api.alternatives(ndc).await?;
        Ok(split_alternatives(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPricingApi;
    use crate::schema::endpoints;

    fn session() -> SearchSession<MockPricingApi> {
        SearchSession::new(MockPricingApi::sample(), &RxConfig::default())
    }

    #[tokio::test]
    async fn test_blank_inputs_issue_nothing() {
        let mut session = session();
        assert!(session.search_bins("   ").await.is_none());
        assert!(session.search_drugs("").await.is_none());
        assert_eq!(session.api().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_scroll_only_loads_near_bottom() {
        let config = RxConfig { page_size: 2, ..RxConfig::default() };
        let mut session = SearchSession::new(MockPricingApi::sample(), &config);
        session.search_drugs("statin").await;

        let far = ScrollMetrics { scroll_top: 0.0, client_height: 200.0, scroll_height: 1000.0 };
        assert!(session.on_drug_scroll(far).await.is_none());

        let near = ScrollMetrics { scroll_top: 790.0, client_height: 200.0, scroll_height: 1000.0 };
        assert_eq!(session.on_drug_scroll(near).await, Some(Completion::Applied));
        assert_eq!(session.chain().drug_search().results().len(), 4);
        assert_eq!(session.api().call_count(endpoints::DRUGS_BY_NAME), 2);
    }

    #[tokio::test]
    async fn test_alternatives_require_ndc() {
        let session = session();
        assert!(matches!(session.alternatives().await, Err(RxError::MissingUpstream { .. })));
    }
}
