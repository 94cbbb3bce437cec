/*!
 * Dependent selection chain
 *
 * BIN → PCN → RxGroup → (drug class) → drug → NDC. Each stage's options
 * depend on the selection immediately before it, and selecting at one stage
 * discards everything after it. Like [`SuggestionLookup`], the chain does no
 * I/O: selections return tickets for the lookups they enable, and responses
 * come back through the `complete_*` methods. A response whose ticket was
 * issued before the stage was last reset is ignored.
 */

use tracing::{debug, info, warn};

use crate::api::LookupRequest;
use crate::data_types::*;
use crate::lookup::{failure_status, Completion, LookupStatus, LookupTicket, SuggestionLookup};
use crate::pagination::name_key;
use crate::pricing::{PricingPreview, QuoteState, QuoteTicket};
use crate::{Result, RxError};

/// BIN search is a single unpaged call
const UNPAGED: usize = usize::MAX;

/// A dependent lookup enabled by a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTicket {
    /// Stage whose options this lookup fills
    pub stage: Stage,
    pub generation: u64,
    /// Id of the selection the lookup is scoped to
    pub parent_id: i64,
    /// Class version for class drug lists
    pub class_type: Option<ClassVersion>,
}

/// Lookup for every package of a selected drug name.
///
/// Issued when the drug's suggestion came from a search with unloaded
/// pages. The request is drained page by page and the whole outcome handed
/// back through [`SelectionChain::complete_packages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTicket {
    pub generation: u64,
    pub drug_name: String,
    /// First page of the name search; later pages follow its cursor
    pub request: LookupRequest,
}

/// Lookups enabled by selecting a drug
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrugSelection {
    pub quote: Option<QuoteTicket>,
    pub packages: Option<PackageTicket>,
}

/// Options of a stage filled by one dependent lookup
#[derive(Debug, Clone)]
pub struct StageOptions<T> {
    items: Vec<T>,
    status: LookupStatus,
    generation: u64,
}

impl<T> Default for StageOptions<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            status: LookupStatus::Idle,
            generation: 0,
        }
    }
}

impl<T> StageOptions<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn status(&self) -> &LookupStatus {
        &self.status
    }

    fn reset(&mut self, generation: u64) {
        self.items.clear();
        self.status = LookupStatus::Idle;
        self.generation = generation;
    }

    fn begin(&mut self, generation: u64) {
        self.reset(generation);
        self.status = LookupStatus::Loading { cursor: Default::default() };
    }

    fn complete(&mut self, ticket: &StageTicket, outcome: Result<Vec<T>>) -> Completion {
        if ticket.generation != self.generation || !matches!(self.status, LookupStatus::Loading { .. }) {
            debug!(stage = %ticket.stage, generation = ticket.generation, "discarding outdated stage response");
            return Completion::Stale;
        }
        match outcome {
            Ok(items) => {
                self.items = items;
                self.status = LookupStatus::Loaded;
                Completion::Applied
            }
            Err(e) => {
                warn!(stage = %ticket.stage, error = %e, "stage lookup failed");
                self.status = failure_status(&e, ticket.stage.plural());
                Completion::Failed
            }
        }
    }
}

/// Selection state of one search widget
#[derive(Debug, Clone)]
pub struct SelectionChain {
    limit_to_insurance: bool,
    generation: u64,
    page_size: usize,
    packages_generation: u64,

    bin_search: SuggestionLookup<Bin>,
    pcns: StageOptions<Pcn>,
    rx_groups: StageOptions<RxGroup>,
    class_search: SuggestionLookup<DrugClass>,
    class_drugs: StageOptions<Drug>,
    drug_search: SuggestionLookup<Drug>,
    ndc_options: Vec<Ndc>,

    bin: Option<Bin>,
    pcn: Option<Pcn>,
    rx_group: Option<RxGroup>,
    drug_class: Option<DrugClass>,
    drug: Option<Drug>,
    ndc: Option<Ndc>,

    pricing: PricingPreview,
}

impl SelectionChain {
    pub fn new(page_size: usize) -> Self {
        Self {
            limit_to_insurance: false,
            generation: 0,
            page_size,
            packages_generation: 0,
            bin_search: SuggestionLookup::new(Stage::Bin.plural(), UNPAGED),
            pcns: StageOptions::default(),
            rx_groups: StageOptions::default(),
            class_search: SuggestionLookup::new(Stage::DrugClass.plural(), page_size),
            class_drugs: StageOptions::default(),
            drug_search: SuggestionLookup::new(Stage::Drug.plural(), page_size),
            ndc_options: Vec::new(),
            bin: None,
            pcn: None,
            rx_group: None,
            drug_class: None,
            drug: None,
            ndc: None,
            pricing: PricingPreview::new(),
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Discard every stage after `stage`
    fn clear_after(&mut self, stage: Stage) {
        for downstream in stage.downstream() {
            let generation = self.next_generation();
            match downstream {
                Stage::Bin => {}
                Stage::Pcn => {
                    self.pcn = None;
                    self.pcns.reset(generation);
                }
                Stage::RxGroup => {
                    self.rx_group = None;
                    self.rx_groups.reset(generation);
                }
                Stage::DrugClass => {
                    self.drug_class = None;
                    self.class_search.clear();
                    self.class_drugs.reset(generation);
                }
                Stage::Drug => {
                    self.drug = None;
                    self.drug_search.clear();
                }
                Stage::Ndc => {
                    self.ndc = None;
                    self.ndc_options.clear();
                    self.packages_generation = generation;
                }
            }
        }
        self.pricing.clear();
    }

    /// Clear the entire chain back to its initial state
    pub fn reset(&mut self) {
        self.bin = None;
        self.bin_search.clear();
        self.clear_after(Stage::Bin);
        debug!("selection chain reset");
    }

    /// Flip "limit search to selected insurance".
    ///
    /// Any change resets the whole chain, since scoped and unscoped results
    /// mean different things.
    pub fn set_limit_to_insurance(&mut self, on: bool) {
        if self.limit_to_insurance != on {
            self.limit_to_insurance = on;
            self.reset();
            info!(limit_to_insurance = on, "search scope changed");
        }
    }

    pub fn limit_to_insurance(&self) -> bool {
        self.limit_to_insurance
    }

    /// Most specific insurance selection: RxGroup, then PCN, then BIN
    pub fn insurance_scope(&self) -> Option<InsuranceScope> {
        if let Some(group) = &self.rx_group {
            Some(InsuranceScope::RxGroup(group.id))
        } else if let Some(pcn) = &self.pcn {
            Some(InsuranceScope::Pcn(pcn.id))
        } else {
            self.bin.as_ref().map(|bin| InsuranceScope::Bin(bin.id))
        }
    }

    /// Whether a stage has the upstream selection it needs
    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Bin => true,
            Stage::Pcn => self.bin.is_some(),
            Stage::RxGroup => self.pcn.is_some(),
            Stage::DrugClass | Stage::Drug => {
                !self.limit_to_insurance || self.insurance_scope().is_some()
            }
            Stage::Ndc => self.drug.is_some(),
        }
    }

    // -- BIN ---------------------------------------------------------------

    pub fn begin_bin_search(&mut self, text: &str) -> Option<LookupTicket> {
        self.bin_search.begin_query(text, false, None)
    }

    pub fn complete_bin_search(&mut self, ticket: &LookupTicket, outcome: Result<Vec<Bin>>) -> Completion {
        self.bin_search.complete(ticket, outcome)
    }

    /// Select a BIN and clear everything below it
    pub fn select_bin(&mut self, bin: Bin) -> StageTicket {
        info!(bin = %bin.code, id = bin.id, "BIN selected");
        self.clear_after(Stage::Bin);
        let generation = self.next_generation();
        self.pcns.begin(generation);
        let ticket = StageTicket {
            stage: Stage::Pcn,
            generation,
            parent_id: bin.id,
            class_type: None,
        };
        self.bin = Some(bin);
        ticket
    }

    // -- PCN ---------------------------------------------------------------

    pub fn complete_pcns(&mut self, ticket: &StageTicket, outcome: Result<Vec<Pcn>>) -> Completion {
        self.pcns.complete(ticket, outcome)
    }

    /// Select a PCN under the current BIN
    pub fn select_pcn(&mut self, pcn: Pcn) -> Result<StageTicket> {
        let bin = self.bin.as_ref().ok_or(RxError::MissingUpstream {
            stage: Stage::Pcn,
            requires: Stage::Bin,
        })?;
        if pcn.bin_id != bin.id {
            return Err(RxError::ForeignSelection {
                stage: Stage::Pcn,
                id: pcn.code,
                parent: Stage::Bin,
            });
        }

        info!(pcn = %pcn.code, id = pcn.id, "PCN selected");
        self.clear_after(Stage::Pcn);
        let generation = self.next_generation();
        self.rx_groups.begin(generation);
        let ticket = StageTicket {
            stage: Stage::RxGroup,
            generation,
            parent_id: pcn.id,
            class_type: None,
        };
        self.pcn = Some(pcn);
        Ok(ticket)
    }

    // -- RxGroup -----------------------------------------------------------

    pub fn complete_rx_groups(&mut self, ticket: &StageTicket, outcome: Result<Vec<RxGroup>>) -> Completion {
        self.rx_groups.complete(ticket, outcome)
    }

    /// Select an RxGroup under the current PCN; enables scoped drug search
    pub fn select_rx_group(&mut self, group: RxGroup) -> Result<()> {
        let pcn = self.pcn.as_ref().ok_or(RxError::MissingUpstream {
            stage: Stage::RxGroup,
            requires: Stage::Pcn,
        })?;
        if group.pcn_id != pcn.id {
            return Err(RxError::ForeignSelection {
                stage: Stage::RxGroup,
                id: group.name,
                parent: Stage::Pcn,
            });
        }

        info!(rx_group = %group.name, id = group.id, "RxGroup selected");
        self.clear_after(Stage::RxGroup);
        self.rx_group = Some(group);
        Ok(())
    }

    // -- Drug class --------------------------------------------------------

    pub fn begin_class_search(&mut self, text: &str) -> Option<LookupTicket> {
        if !self.is_enabled(Stage::DrugClass) {
            return None;
        }
        let scope = self.insurance_scope();
        self.class_search.begin_query(text, self.limit_to_insurance, scope)
    }

    pub fn begin_more_classes(&mut self) -> Option<LookupTicket> {
        self.class_search.begin_next_page()
    }

    pub fn complete_class_search(&mut self, ticket: &LookupTicket, outcome: Result<Vec<DrugClass>>) -> Completion {
        self.class_search.complete(ticket, outcome)
    }

    /// Select a drug class; returns the lookup for the class's drugs
    pub fn select_drug_class(&mut self, class: DrugClass) -> Result<StageTicket> {
        if !self.is_enabled(Stage::DrugClass) {
            return Err(RxError::MissingUpstream {
                stage: Stage::DrugClass,
                requires: Stage::Bin,
            });
        }

        info!(class = %class.name, id = class.id, "drug class selected");
        self.clear_after(Stage::DrugClass);
        let generation = self.next_generation();
        self.class_drugs.begin(generation);
        let ticket = StageTicket {
            stage: Stage::Drug,
            generation,
            parent_id: class.id,
            class_type: Some(class.version_tag.clone()),
        };
        self.drug_class = Some(class);
        Ok(ticket)
    }

    pub fn complete_class_drugs(&mut self, ticket: &StageTicket, outcome: Result<Vec<Drug>>) -> Completion {
        self.class_drugs.complete(ticket, outcome)
    }

    // -- Drug --------------------------------------------------------------

    pub fn begin_drug_search(&mut self, text: &str) -> Option<LookupTicket> {
        if !self.is_enabled(Stage::Drug) {
            return None;
        }
        let scope = self.insurance_scope();
        self.drug_search.begin_query(text, self.limit_to_insurance, scope)
    }

    pub fn begin_more_drugs(&mut self) -> Option<LookupTicket> {
        self.drug_search.begin_next_page()
    }

    pub fn complete_drug_search(&mut self, ticket: &LookupTicket, outcome: Result<Vec<Drug>>) -> Completion {
        self.drug_search.complete(ticket, outcome)
    }

    /// Select a drug by name.
    ///
    /// The NDC options become every distinct NDC already loaded for that
    /// name, and the first one is selected. When the drug search still has
    /// unloaded pages the list is provisional and a [`PackageTicket`] asks
    /// for the rest. A quote request is returned if an insurance selection
    /// is present.
    pub fn select_drug(&mut self, drug: Drug) -> Result<DrugSelection> {
        if !self.is_enabled(Stage::Drug) {
            return Err(RxError::MissingUpstream {
                stage: Stage::Drug,
                requires: Stage::Bin,
            });
        }

        let key = name_key(&drug.name);
        let mut ndcs: Vec<Ndc> = Vec::new();
        let known = self
            .drug_search
            .results()
            .iter()
            .chain(self.class_drugs.items())
            .filter(|d| name_key(&d.name) == key);
        for candidate in known {
            if !ndcs.contains(&candidate.ndc) {
                ndcs.push(candidate.ndc.clone());
            }
        }
        if !ndcs.contains(&drug.ndc) {
            ndcs.insert(0, drug.ndc.clone());
        }
        let partial = self.drug_search.has_more()
            && self.drug_search.results().iter().any(|d| name_key(&d.name) == key);

        info!(drug = %drug.name, ndcs = ndcs.len(), partial, "drug selected");
        // Keep the search results: they back the suggestion list the drug came from.
        self.clear_after(Stage::Drug);
        self.ndc = ndcs.first().cloned();
        self.ndc_options = ndcs;

        let packages = partial.then(|| {
            let generation = self.next_generation();
            self.packages_generation = generation;
            let mut request = LookupRequest::new(drug.name.trim(), self.page_size);
            request.limit_to_insurance = self.limit_to_insurance;
            request.scope = self.insurance_scope();
            PackageTicket { generation, drug_name: drug.name.clone(), request }
        });
        self.drug = Some(drug);
        Ok(DrugSelection { quote: self.refresh_pricing(), packages })
    }

    /// Merge every package of the selected drug into the NDC options.
    ///
    /// The current selection and the provisional options keep their order;
    /// NDCs not yet listed are appended. On failure the provisional list stays.
    pub fn complete_packages(&mut self, ticket: &PackageTicket, outcome: Result<Vec<Drug>>) -> Completion {
        if ticket.generation != self.packages_generation || self.drug.is_none() {
            debug!(drug = %ticket.drug_name, generation = ticket.generation, "discarding outdated package list");
            return Completion::Stale;
        }
        match outcome {
            Ok(drugs) => {
                let key = name_key(&ticket.drug_name);
                for drug in drugs.into_iter().filter(|d| name_key(&d.name) == key) {
                    if !self.ndc_options.contains(&drug.ndc) {
                        self.ndc_options.push(drug.ndc);
                    }
                }
                debug!(drug = %ticket.drug_name, ndcs = self.ndc_options.len(), "package list complete");
                Completion::Applied
            }
            Err(e) => {
                warn!(drug = %ticket.drug_name, error = %e, "package lookup failed");
                Completion::Failed
            }
        }
    }

    // -- NDC ---------------------------------------------------------------

    /// Select one of the current drug's NDCs
    pub fn select_ndc(&mut self, ndc: Ndc) -> Result<Option<QuoteTicket>> {
        if self.drug.is_none() {
            return Err(RxError::MissingUpstream {
                stage: Stage::Ndc,
                requires: Stage::Drug,
            });
        }
        if !self.ndc_options.contains(&ndc) {
            return Err(RxError::Validation {
                message: format!("NDC {} is not a package of the selected drug", ndc),
                field: Some("ndc".to_string()),
                value: Some(ndc.to_string()),
            });
        }
        self.ndc = Some(ndc);
        Ok(self.refresh_pricing())
    }

    fn refresh_pricing(&mut self) -> Option<QuoteTicket> {
        let scope = self.insurance_scope();
        self.pricing.set_key(self.ndc.as_ref(), scope)
    }

    pub fn complete_quote(&mut self, ticket: &QuoteTicket, outcome: Result<Option<PricingQuote>>) -> bool {
        self.pricing.complete(ticket, outcome)
    }

    // -- Accessors ---------------------------------------------------------

    pub fn bin(&self) -> Option<&Bin> {
        self.bin.as_ref()
    }

    pub fn pcn(&self) -> Option<&Pcn> {
        self.pcn.as_ref()
    }

    pub fn rx_group(&self) -> Option<&RxGroup> {
        self.rx_group.as_ref()
    }

    pub fn drug_class(&self) -> Option<&DrugClass> {
        self.drug_class.as_ref()
    }

    pub fn drug(&self) -> Option<&Drug> {
        self.drug.as_ref()
    }

    pub fn ndc(&self) -> Option<&Ndc> {
        self.ndc.as_ref()
    }

    pub fn ndc_options(&self) -> &[Ndc] {
        &self.ndc_options
    }

    pub fn bin_search(&self) -> &SuggestionLookup<Bin> {
        &self.bin_search
    }

    pub fn pcns(&self) -> &StageOptions<Pcn> {
        &self.pcns
    }

    pub fn rx_groups(&self) -> &StageOptions<RxGroup> {
        &self.rx_groups
    }

    pub fn class_search(&self) -> &SuggestionLookup<DrugClass> {
        &self.class_search
    }

    pub fn class_drugs(&self) -> &StageOptions<Drug> {
        &self.class_drugs
    }

    pub fn drug_search(&self) -> &SuggestionLookup<Drug> {
        &self.drug_search
    }

    pub fn quote(&self) -> &QuoteState {
        self.pricing.state()
    }

    /// Whether any selection or option state exists at a stage
    pub fn has_state(&self, stage: Stage) -> bool {
        match stage {
            Stage::Bin => self.bin.is_some(),
            Stage::Pcn => self.pcn.is_some() || !self.pcns.items.is_empty(),
            Stage::RxGroup => self.rx_group.is_some() || !self.rx_groups.items.is_empty(),
            Stage::DrugClass => {
                self.drug_class.is_some()
                    || !self.class_search.suggestions().is_empty()
                    || !self.class_drugs.items.is_empty()
            }
            Stage::Drug => self.drug.is_some() || !self.drug_search.suggestions().is_empty(),
            Stage::Ndc => self.ndc.is_some() || !self.ndc_options.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::UnavailableReason;
    use rust_decimal::Decimal;

    fn bin(id: i64) -> Bin {
        Bin { id, name: Some("Caremark".to_string()), code: BinCode::new("610591").unwrap(), help_desk_number: None }
    }

    fn pcn(id: i64, bin_id: i64) -> Pcn {
        Pcn { id, code: "CMK".to_string(), bin_id }
    }

    fn group(id: i64, pcn_id: i64) -> RxGroup {
        RxGroup { id, name: "CMK-STD".to_string(), pcn_id }
    }

    fn drug(id: i64, name: &str, ndc: &str) -> Drug {
        Drug {
            id,
            name: name.to_string(),
            ndc: Ndc::new(ndc).unwrap(),
            form: "Tablet".to_string(),
            strength: "10 MG".to_string(),
            class_id: 1,
        }
    }

    /// Chain with BIN 1 → PCN 10 → RxGroup 100 and Atorvastatin selected
    fn deep_chain() -> SelectionChain {
        let mut chain = SelectionChain::new(20);
        let t = chain.select_bin(bin(1));
        chain.complete_pcns(&t, Ok(vec![pcn(10, 1)]));
        let t = chain.select_pcn(pcn(10, 1)).unwrap();
        chain.complete_rx_groups(&t, Ok(vec![group(100, 10)]));
        chain.select_rx_group(group(100, 10)).unwrap();
        let t = chain.begin_drug_search("ator").unwrap();
        chain.complete_drug_search(&t, Ok(vec![
            drug(1, "Atorvastatin", "00071015523"),
            drug(2, "Atorvastatin", "00071015623"),
            drug(3, "Atorvaliq", "00093505698"),
        ]));
        chain.select_drug(drug(1, "Atorvastatin", "00071015523")).unwrap();
        chain
    }

    #[test]
    fn test_selecting_at_each_stage_clears_downstream() {
        let mut chain = deep_chain();
        assert!(Stage::ALL.iter().filter(|s| **s != Stage::DrugClass).all(|s| chain.has_state(*s)));

        chain.select_rx_group(group(101, 10)).unwrap();
        assert!(chain.has_state(Stage::RxGroup));
        assert!(Stage::RxGroup.downstream().all(|s| !chain.has_state(s)));
        assert!(chain.pcn().is_some() && chain.bin().is_some());

        let mut chain = deep_chain();
        chain.select_pcn(pcn(10, 1)).unwrap();
        assert!(Stage::Pcn.downstream().all(|s| !chain.has_state(s)));
        assert!(chain.bin().is_some());

        let mut chain = deep_chain();
        chain.select_bin(bin(2));
        assert!(Stage::Bin.downstream().all(|s| !chain.has_state(s)));
        assert_eq!(chain.quote(), &QuoteState::Inactive);
    }

    #[test]
    fn test_upstream_required() {
        let mut chain = SelectionChain::new(20);
        assert!(matches!(chain.select_pcn(pcn(10, 1)), Err(RxError::MissingUpstream { .. })));
        assert!(matches!(chain.select_rx_group(group(100, 10)), Err(RxError::MissingUpstream { .. })));
        assert!(matches!(chain.select_ndc(Ndc::new("00071015523").unwrap()), Err(RxError::MissingUpstream { .. })));

        chain.select_bin(bin(1));
        assert!(matches!(chain.select_pcn(pcn(10, 2)), Err(RxError::ForeignSelection { .. })));
    }

    #[test]
    fn test_drug_selection_collects_all_ndcs_for_name() {
        let chain = deep_chain();
        let ndcs: Vec<&str> = chain.ndc_options().iter().map(|n| n.as_str()).collect();
        assert_eq!(ndcs, vec!["00071015523", "00071015623"]);
        assert_eq!(chain.ndc().map(|n| n.as_str()), Some("00071015523"));
        assert_eq!(chain.quote(), &QuoteState::Pending);
    }

    #[test]
    fn test_outdated_pcn_response_ignored() {
        let mut chain = SelectionChain::new(20);
        let old = chain.select_bin(bin(1));
        let new = chain.select_bin(bin(2));
        assert_eq!(chain.complete_pcns(&old, Ok(vec![pcn(10, 1)])), Completion::Stale);
        assert!(chain.pcns().items().is_empty());
        assert_eq!(chain.complete_pcns(&new, Ok(vec![pcn(20, 2)])), Completion::Applied);
        assert_eq!(chain.pcns().items()[0].id, 20);
    }

    #[test]
    fn test_rx_group_failure_keeps_pcn() {
        let mut chain = SelectionChain::new(20);
        chain.select_bin(bin(1));
        let t = chain.select_pcn(pcn(10, 1)).unwrap();
        let outcome = chain.complete_rx_groups(&t, Err(RxError::from_status("/drug/GetInsurancesRxByPcnId", 502)));
        assert_eq!(outcome, Completion::Failed);
        assert_eq!(chain.pcn().map(|p| p.id), Some(10));
        assert_eq!(chain.rx_groups().status(), &LookupStatus::Failed("Failed to load Rx groups".to_string()));
    }

    #[test]
    fn test_limit_toggle_resets_everything() {
        let mut chain = deep_chain();
        chain.set_limit_to_insurance(true);
        assert!(Stage::ALL.iter().all(|s| !chain.has_state(*s)));
        assert!(chain.limit_to_insurance());

        let mut chain = SelectionChain::new(20);
        chain.select_bin(bin(1));
        chain.set_limit_to_insurance(true);
        assert!(chain.bin().is_none());
    }

    #[test]
    fn test_scope_fallback() {
        let mut chain = SelectionChain::new(20);
        assert_eq!(chain.insurance_scope(), None);
        chain.select_bin(bin(1));
        assert_eq!(chain.insurance_scope(), Some(InsuranceScope::Bin(1)));
        chain.select_pcn(pcn(10, 1)).unwrap();
        assert_eq!(chain.insurance_scope(), Some(InsuranceScope::Pcn(10)));
        chain.select_rx_group(group(100, 10)).unwrap();
        assert_eq!(chain.insurance_scope(), Some(InsuranceScope::RxGroup(100)));
    }

    #[test]
    fn test_limited_search_disabled_without_scope() {
        let mut chain = SelectionChain::new(20);
        chain.set_limit_to_insurance(true);
        assert!(!chain.is_enabled(Stage::Drug));
        assert!(chain.begin_drug_search("ator").is_none());

        chain.set_limit_to_insurance(false);
        let ticket = chain.begin_drug_search("ator").unwrap();
        assert_eq!(ticket.request.effective_scope(), None);
    }

    #[test]
    fn test_quote_follows_ndc_changes() {
        let mut chain = deep_chain();
        let t1 = chain.select_ndc(Ndc::new("00071015523").unwrap()).unwrap();
        assert!(t1.is_none(), "same key is already pending");

        let t2 = chain.select_ndc(Ndc::new("00071015623").unwrap()).unwrap().unwrap();
        assert_eq!(t2.insurance_id(), 100);
        chain.complete_quote(&t2, Ok(Some(PricingQuote {
            ndc: t2.ndc.clone(),
            insurance_id: 100,
            net_price: Some(Decimal::new(1999, 2)),
        })));
        assert_eq!(chain.quote().display(), "$19.99");

        assert!(matches!(
            chain.select_ndc(Ndc::new("00093505698").unwrap()),
            Err(RxError::Validation { .. })
        ));
    }

    #[test]
    fn test_unscoped_drug_has_no_quote() {
        let mut chain = SelectionChain::new(20);
        let t = chain.begin_drug_search("ator").unwrap();
        chain.complete_drug_search(&t, Ok(vec![drug(1, "Atorvastatin", "00071015523")]));
        let selection = chain.select_drug(drug(1, "Atorvastatin", "00071015523")).unwrap();
        assert!(selection.quote.is_none());
        assert!(selection.packages.is_none(), "a short page is the whole result");
        assert_eq!(chain.quote(), &QuoteState::Inactive);
        assert_ne!(chain.quote(), &QuoteState::Unavailable(UnavailableReason::NotPriced));
    }

    #[test]
    fn test_partial_search_requests_remaining_packages() {
        let mut chain = SelectionChain::new(2);
        let t = chain.begin_drug_search("ator").unwrap();
        chain.complete_drug_search(&t, Ok(vec![
            drug(1, "Atorvastatin", "00071015523"),
            drug(2, "Atorvastatin", "00071015623"),
        ]));
        let selection = chain.select_drug(drug(1, "Atorvastatin", "00071015523")).unwrap();
        let packages = selection.packages.unwrap();
        assert_eq!(packages.request.query, "Atorvastatin");
        assert_eq!(packages.request.page_size, 2);
        assert_eq!(chain.ndc_options().len(), 2);

        let outcome = chain.complete_packages(&packages, Ok(vec![
            drug(2, "Atorvastatin", "00071015623"),
            drug(1, "Atorvastatin", "00071015523"),
            drug(3, "Atorvaliq", "00093505698"),
            drug(4, "atorvastatin ", "00071015723"),
        ]));
        assert_eq!(outcome, Completion::Applied);
        let ndcs: Vec<&str> = chain.ndc_options().iter().map(|n| n.as_str()).collect();
        assert_eq!(ndcs, vec!["00071015523", "00071015623", "00071015723"]);
        assert_eq!(chain.ndc().map(|n| n.as_str()), Some("00071015523"));
    }

    #[test]
    fn test_package_list_for_replaced_drug_is_stale() {
        let mut chain = SelectionChain::new(2);
        let t = chain.begin_drug_search("statin").unwrap();
        chain.complete_drug_search(&t, Ok(vec![
            drug(1, "Atorvastatin", "00071015523"),
            drug(5, "Simvastatin", "00006073531"),
        ]));
        let first = chain.select_drug(drug(1, "Atorvastatin", "00071015523")).unwrap().packages.unwrap();
        chain.select_drug(drug(5, "Simvastatin", "00006073531")).unwrap();

        let outcome = chain.complete_packages(&first, Ok(vec![drug(2, "Atorvastatin", "00071015623")]));
        assert_eq!(outcome, Completion::Stale);
        assert_eq!(chain.ndc_options().len(), 1);

        let failed = chain.select_drug(drug(1, "Atorvastatin", "00071015523")).unwrap().packages.unwrap();
        let err = RxError::from_status("/drug/GetDrugsByName", 503);
        assert_eq!(chain.complete_packages(&failed, Err(err)), Completion::Failed);
        assert_eq!(chain.ndc_options().len(), 1, "provisional list is kept");
    }

    #[test]
    fn test_class_drugs_feed_ndc_options() {
        let mut chain = SelectionChain::new(20);
        let class = DrugClass { id: 7, business_id: 7, name: "Statins".to_string(), version_tag: ClassVersion::default() };
        let t = chain.select_drug_class(class).unwrap();
        assert_eq!(t.class_type, Some(ClassVersion::default()));
        chain.complete_class_drugs(&t, Ok(vec![
            drug(1, "Simvastatin", "00006073531"),
            drug(2, "Simvastatin", "00006074031"),
        ]));
        chain.select_drug(drug(1, "Simvastatin", "00006073531")).unwrap();
        assert_eq!(chain.ndc_options().len(), 2);
        assert!(chain.drug_class().is_some());
    }
}
