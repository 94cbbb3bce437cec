/*!
 * In-memory pricing API
 *
 * [`Catalog`] holds a small formulary with lookup indexes, and
 * [`MockPricingApi`] serves it through the same [`PricingApi`] contract as
 * the HTTP client, including pagination and injectable failures.
 */

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{LookupRequest, PricingApi};
use crate::constants::NO_INSURANCE_ID;
use crate::data_types::*;
use crate::pagination::page_of;
use crate::schema::endpoints;
use crate::{Result, RxError};

/// Drug classes a BIN covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formulary {
    pub bin_id: i64,
    pub class_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
struct CatalogIndex {
    bins: HashMap<i64, usize>,
    pcns: HashMap<i64, usize>,
    rx_groups: HashMap<i64, usize>,
    pcns_by_bin: HashMap<i64, Vec<usize>>,
    groups_by_pcn: HashMap<i64, Vec<usize>>,
    drugs_by_class: HashMap<i64, Vec<usize>>,
    drugs_by_ndc: HashMap<Ndc, usize>,
    // Ordered so searches return names alphabetically
    drugs_by_name: BTreeMap<String, Vec<usize>>,
    classes_by_bin: HashMap<i64, Vec<i64>>,
}

/// Insurance hierarchy and drug formulary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub bins: Vec<Bin>,
    pub pcns: Vec<Pcn>,
    pub rx_groups: Vec<RxGroup>,
    pub classes: Vec<DrugClass>,
    pub drugs: Vec<Drug>,
    pub formularies: Vec<Formulary>,
    #[serde(skip)]
    index: CatalogIndex,
}

impl Catalog {
    pub fn new(
        bins: Vec<Bin>,
        pcns: Vec<Pcn>,
        rx_groups: Vec<RxGroup>,
        classes: Vec<DrugClass>,
        drugs: Vec<Drug>,
        formularies: Vec<Formulary>,
    ) -> Self {
        let mut catalog = Self { bins, pcns, rx_groups, classes, drugs, formularies, index: CatalogIndex::default() };
        catalog.build_indexes();
        catalog
    }

    /// Load a catalog fixture written as JSON
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut catalog: Catalog = serde_json::from_str(content).map_err(|e| RxError::Configuration {
            message: format!("catalog fixture is not valid: {}", e),
            suggestion: Some("Check the fixture against a catalog written by Catalog::to_json_file.".to_string()),
        })?;
        catalog.build_indexes();
        Ok(catalog)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    fn build_indexes(&mut self) {
        let mut index = CatalogIndex::default();

        for (idx, bin) in self.bins.iter().enumerate() {
            index.bins.insert(bin.id, idx);
        }
        for (idx, pcn) in self.pcns.iter().enumerate() {
            index.pcns.insert(pcn.id, idx);
            index.pcns_by_bin.entry(pcn.bin_id).or_default().push(idx);
        }
        for (idx, group) in self.rx_groups.iter().enumerate() {
            index.rx_groups.insert(group.id, idx);
            index.groups_by_pcn.entry(group.pcn_id).or_default().push(idx);
        }
        for (idx, drug) in self.drugs.iter().enumerate() {
            index.drugs_by_class.entry(drug.class_id).or_default().push(idx);
            index.drugs_by_ndc.insert(drug.ndc.clone(), idx);
            index.drugs_by_name.entry(drug.name.to_lowercase()).or_default().push(idx);
        }
        for formulary in &self.formularies {
            index
                .classes_by_bin
                .entry(formulary.bin_id)
                .or_default()
                .extend(formulary.class_ids.iter().copied());
        }

        self.index = index;
    }

    /// BINs whose code starts with, or whose name contains, `text`
    pub fn bins_matching(&self, text: &str) -> Vec<Bin> {
        let needle = text.trim().to_lowercase();
        self.bins
            .iter()
            .filter(|bin| {
                bin.code.as_str().starts_with(&needle)
                    || bin.name.as_ref().is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub fn pcns_for_bin(&self, bin_id: i64) -> Vec<Pcn> {
        self.index
            .pcns_by_bin
            .get(&bin_id)
            .map(|indices| indices.iter().filter_map(|&i| self.pcns.get(i)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn rx_groups_for_pcn(&self, pcn_id: i64) -> Vec<RxGroup> {
        self.index
            .groups_by_pcn
            .get(&pcn_id)
            .map(|indices| indices.iter().filter_map(|&i| self.rx_groups.get(i)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn drugs_in_class(&self, class_id: i64) -> Vec<Drug> {
        self.index
            .drugs_by_class
            .get(&class_id)
            .map(|indices| indices.iter().filter_map(|&i| self.drugs.get(i)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn drug_by_ndc(&self, ndc: &Ndc) -> Option<&Drug> {
        self.index.drugs_by_ndc.get(ndc).and_then(|&i| self.drugs.get(i))
    }

    /// BIN that an insurance scope belongs to
    pub fn bin_for_scope(&self, scope: InsuranceScope) -> Option<i64> {
        match scope {
            InsuranceScope::Bin(id) => self.index.bins.contains_key(&id).then_some(id),
            InsuranceScope::Pcn(id) => self.index.pcns.get(&id).and_then(|&i| self.pcns.get(i)).map(|p| p.bin_id),
            InsuranceScope::RxGroup(id) => {
                let group = self.index.rx_groups.get(&id).and_then(|&i| self.rx_groups.get(i))?;
                self.bin_for_scope(InsuranceScope::Pcn(group.pcn_id))
            }
        }
    }

    /// Resolve a bare insurance id. Ids are unique across BINs, PCNs and RxGroups.
    pub fn scope_for_id(&self, insurance_id: i64) -> Option<InsuranceScope> {
        if self.index.rx_groups.contains_key(&insurance_id) {
            Some(InsuranceScope::RxGroup(insurance_id))
        } else if self.index.pcns.contains_key(&insurance_id) {
            Some(InsuranceScope::Pcn(insurance_id))
        } else if self.index.bins.contains_key(&insurance_id) {
            Some(InsuranceScope::Bin(insurance_id))
        } else {
            None
        }
    }

    fn covers(&self, bin_id: i64, class_id: i64) -> bool {
        self.index
            .classes_by_bin
            .get(&bin_id)
            .is_some_and(|classes| classes.contains(&class_id))
    }

    fn in_scope(&self, scope: Option<InsuranceScope>, class_id: i64) -> bool {
        match scope {
            None => true,
            Some(scope) => self.bin_for_scope(scope).is_some_and(|bin| self.covers(bin, class_id)),
        }
    }

    /// Every drug package whose name contains `query`, alphabetically
    pub fn drugs_matching(&self, query: &str, scope: Option<InsuranceScope>) -> Vec<Drug> {
        let needle = query.trim().to_lowercase();
        self.index
            .drugs_by_name
            .iter()
            .filter(|(name, _)| name.contains(&needle))
            .flat_map(|(_, indices)| indices.iter().filter_map(|&i| self.drugs.get(i)))
            .filter(|drug| self.in_scope(scope, drug.class_id))
            .cloned()
            .collect()
    }

    pub fn classes_matching(&self, query: &str, version: &ClassVersion, scope: Option<InsuranceScope>) -> Vec<DrugClass> {
        let needle = query.trim().to_lowercase();
        self.classes
            .iter()
            .filter(|class| &class.version_tag == version)
            .filter(|class| class.name.to_lowercase().contains(&needle))
            .filter(|class| self.in_scope(scope, class.id))
            .cloned()
            .collect()
    }

    /// Net price of an NDC under an insurance id, `None` when not covered.
    /// The "no insurance" id prices at cash.
    pub fn net_price(&self, ndc: &Ndc, insurance_id: i64) -> Option<Decimal> {
        let drug = self.drug_by_ndc(ndc)?;
        if insurance_id == NO_INSURANCE_ID {
            return Some(self.cash_price(ndc));
        }
        let bin = self.bin_for_scope(self.scope_for_id(insurance_id)?)?;
        self.covers(bin, drug.class_id)
            .then(|| Decimal::new(price_cents(ndc, insurance_id), 2))
    }

    /// Cash price without insurance
    pub fn cash_price(&self, ndc: &Ndc) -> Decimal {
        Decimal::new(price_cents(ndc, 0) + 1500, 2)
    }

    /// Other packages in the same class: one row per covering BIN, plus an
    /// uninsured cash row for each
    pub fn alternatives_for(&self, ndc: &Ndc) -> Vec<DrugAlternative> {
        let Some(drug) = self.drug_by_ndc(ndc) else {
            return Vec::new();
        };

        let mut rows = Vec::new();
        for candidate in self.drugs_in_class(drug.class_id) {
            for bin in &self.bins {
                if !self.covers(bin.id, candidate.class_id) {
                    continue;
                }
                let Some(pcn) = self.pcns_for_bin(bin.id).into_iter().next() else {
                    continue;
                };
                rows.push(DrugAlternative {
                    ndc: candidate.ndc.clone(),
                    name: candidate.label(),
                    coverage: Coverage::Insured { bin_id: bin.id, pcn_id: pcn.id },
                    net_price: self.net_price(&candidate.ndc, pcn.id),
                });
            }
            rows.push(DrugAlternative {
                ndc: candidate.ndc.clone(),
                name: candidate.label(),
                coverage: Coverage::Uninsured,
                net_price: Some(self.cash_price(&candidate.ndc)),
            });
        }
        rows
    }

    /// A small formulary across three PBMs
    pub fn sample() -> Self {
        let bin = |id: i64, name: &str, code: &str, help: &str| Bin {
            id,
            name: Some(name.to_string()),
            code: BinCode::new(code).expect("sample BIN codes are six digits"),
            help_desk_number: Some(help.to_string()),
        };
        let pcn = |id: i64, code: &str, bin_id: i64| Pcn { id, code: code.to_string(), bin_id };
        let group = |id: i64, name: &str, pcn_id: i64| RxGroup { id, name: name.to_string(), pcn_id };
        let class = |id: i64, name: &str| DrugClass {
            id,
            business_id: 9000 + id,
            name: name.to_string(),
            version_tag: ClassVersion::default(),
        };
        let drug = |id: i64, name: &str, ndc: &str, strength: &str, class_id: i64| Drug {
            id,
            name: name.to_string(),
            ndc: Ndc::new(ndc).expect("sample NDCs are eleven digits"),
            form: "Tablet".to_string(),
            strength: strength.to_string(),
            class_id,
        };

        Catalog::new(
            vec![
                bin(1, "Caremark", "610591", "1-800-364-6331"),
                bin(2, "Express Scripts", "003858", "1-800-824-0898"),
                bin(3, "OptumRx", "610014", "1-800-788-4863"),
            ],
            vec![
                pcn(101, "CMK", 1),
                pcn(102, "ADV", 1),
                pcn(103, "A4", 2),
                pcn(104, "9999", 3),
            ],
            vec![
                group(1001, "CMK-STD", 101),
                group(1002, "CMK-PLUS", 101),
                group(1003, "ADV-01", 102),
                group(1004, "ESI-CORE", 103),
                group(1005, "OPTUM-RX", 104),
            ],
            vec![
                class(1, "HMG-CoA Reductase Inhibitors (Statins)"),
                class(2, "ACE Inhibitors"),
                class(3, "Biguanides"),
            ],
            vec![
                drug(1, "Atorvastatin", "00071015523", "10 MG", 1),
                drug(2, "Atorvastatin", "00071015623", "20 MG", 1),
                drug(3, "Atorvastatin", "00071015723", "40 MG", 1),
                drug(4, "Atorvastatin", "00378395077", "80 MG", 1),
                drug(5, "Simvastatin", "00006073531", "20 MG", 1),
                drug(6, "Simvastatin", "00006074031", "40 MG", 1),
                drug(7, "Rosuvastatin", "00310075190", "10 MG", 1),
                drug(8, "Lisinopril", "00093111101", "10 MG", 2),
                drug(9, "Lisinopril", "00093111201", "20 MG", 2),
                drug(10, "Enalapril", "00093002601", "5 MG", 2),
                drug(11, "Metformin", "00093104801", "500 MG", 3),
                drug(12, "Metformin", "00093104901", "850 MG", 3),
            ],
            vec![
                Formulary { bin_id: 1, class_ids: vec![1, 2, 3] },
                Formulary { bin_id: 2, class_ids: vec![1, 3] },
                Formulary { bin_id: 3, class_ids: vec![2] },
            ],
        )
    }
}

/// Deterministic price between $3.00 and $50.00
fn price_cents(ndc: &Ndc, insurance_id: i64) -> i64 {
    let seed = ndc
        .as_str()
        .bytes()
        .fold(7i64, |acc, b| (acc * 31 + i64::from(b - b'0')) % 1_000_003);
    300 + (seed + insurance_id.rem_euclid(10_000) * 37) % 4700
}

/// Failure to inject for an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Status(u16),
    Transport,
}

/// [`PricingApi`] over a [`Catalog`]
pub struct MockPricingApi {
    catalog: Catalog,
    failures: RwLock<HashMap<String, InjectedFailure>>,
    calls: RwLock<HashMap<String, usize>>,
}

impl MockPricingApi {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            failures: RwLock::new(HashMap::new()),
            calls: RwLock::new(HashMap::new()),
        }
    }

    pub fn sample() -> Self {
        Self::new(Catalog::sample())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Make every call to `endpoint` fail until cleared
    pub fn fail_endpoint(&self, endpoint: &str, failure: InjectedFailure) {
        self.failures.write().insert(endpoint.to_string(), failure);
    }

    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Number of calls made to `endpoint`
    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls.read().get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.read().values().sum()
    }

    fn enter(&self, endpoint: &str) -> Result<()> {
        *self.calls.write().entry(endpoint.to_string()).or_default() += 1;
        debug!(endpoint, "mock call");
        match self.failures.read().get(endpoint) {
            None => Ok(()),
            Some(InjectedFailure::Status(status)) => Err(RxError::from_status(endpoint, *status)),
            Some(InjectedFailure::Transport) => Err(RxError::Transport {
                endpoint: endpoint.to_string(),
                message: "connection reset by peer".to_string(),
            }),
        }
    }
}

#[async_trait]
impl PricingApi for MockPricingApi {
    async fn search_bins(&self, text: &str) -> Result<Vec<Bin>> {
        if text.trim().is_empty() {
            return Err(RxError::empty_query("bin"));
        }
        self.enter(endpoints::BINS_BY_NAME)?;
        Ok(self.catalog.bins_matching(text))
    }

    async fn pcns_for_bin(&self, bin_id: i64) -> Result<Vec<Pcn>> {
        self.enter(endpoints::PCNS_BY_BIN)?;
        Ok(self.catalog.pcns_for_bin(bin_id))
    }

    async fn rx_groups_for_pcn(&self, pcn_id: i64) -> Result<Vec<RxGroup>> {
        self.enter(endpoints::RX_GROUPS_BY_PCN)?;
        Ok(self.catalog.rx_groups_for_pcn(pcn_id))
    }

    async fn search_drug_classes(&self, request: &LookupRequest, version: &ClassVersion) -> Result<Vec<DrugClass>> {
        self.enter(request.class_endpoint())?;
        let all = self.catalog.classes_matching(&request.query, version, request.effective_scope());
        Ok(page_of(&all, request.cursor, request.page_size).items)
    }

    async fn search_drugs(&self, request: &LookupRequest) -> Result<Vec<Drug>> {
        self.enter(request.drug_endpoint())?;
        let all = self.catalog.drugs_matching(&request.query, request.effective_scope());
        Ok(page_of(&all, request.cursor, request.page_size).items)
    }

    async fn drugs_for_class(&self, class_id: i64, _class_type: &ClassVersion) -> Result<Vec<Drug>> {
        self.enter(endpoints::DRUGS_BY_CLASS)?;
        Ok(self.catalog.drugs_in_class(class_id))
    }

    async fn pricing_detail(&self, ndc: &Ndc, insurance_id: i64) -> Result<Option<PricingQuote>> {
        self.enter(endpoints::DETAILS)?;
        if self.catalog.drug_by_ndc(ndc).is_none() {
            return Ok(None);
        }
        Ok(Some(PricingQuote {
            ndc: ndc.clone(),
            insurance_id,
            net_price: self.catalog.net_price(ndc, insurance_id),
        }))
    }

    async fn alternatives(&self, ndc: &Ndc) -> Result<Vec<DrugAlternative>> {
        self.enter(endpoints::ALTERNATIVES)?;
        Ok(self.catalog.alternatives_for(ndc))
    }
}
