/*!
 * The pricing API contract
 *
 * [`PricingApi`] is the seam between search state and the backend. The HTTP
 * client and the in-memory mock both implement it, and everything above it
 * is written against the trait.
 */

use std::sync::Arc;

use async_trait::async_trait;

use crate::data_types::*;
use crate::pagination::Cursor;
use crate::schema::endpoints;
use crate::Result;

/// Parameters of a paginated, optionally insurance-scoped name search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub query: String,
    pub cursor: Cursor,
    pub page_size: usize,
    pub limit_to_insurance: bool,
    pub scope: Option<InsuranceScope>,
}

impl LookupRequest {
    pub fn new(query: impl Into<String>, page_size: usize) -> Self {
        Self {
            query: query.into(),
            cursor: Cursor::first(),
            page_size,
            limit_to_insurance: false,
            scope: None,
        }
    }

    pub fn page(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn scoped(mut self, scope: InsuranceScope) -> Self {
        self.limit_to_insurance = true;
        self.scope = Some(scope);
        self
    }

    /// The scope that actually applies: none unless limiting is on
    pub fn effective_scope(&self) -> Option<InsuranceScope> {
        if self.limit_to_insurance {
            self.scope
        } else {
            None
        }
    }

    /// Endpoint for a drug-class search with this request's scope
    pub fn class_endpoint(&self) -> &'static str {
        match self.effective_scope() {
            None => endpoints::CLASSES_BY_NAME,
            Some(InsuranceScope::RxGroup(_)) => endpoints::CLASSES_BY_INSURANCE,
            Some(InsuranceScope::Pcn(_)) => endpoints::CLASSES_BY_PCN,
            Some(InsuranceScope::Bin(_)) => endpoints::CLASSES_BY_BIN,
        }
    }

    /// Endpoint for a drug-name search with this request's scope
    pub fn drug_endpoint(&self) -> &'static str {
        match self.effective_scope() {
            None => endpoints::DRUGS_BY_NAME,
            Some(InsuranceScope::RxGroup(_)) => endpoints::DRUGS_BY_INSURANCE,
            Some(InsuranceScope::Pcn(_)) => endpoints::DRUGS_BY_PCN,
            Some(InsuranceScope::Bin(_)) => endpoints::DRUGS_BY_BIN,
        }
    }

    /// Query-string parameter carrying the scope id, if any
    pub fn scope_param(&self) -> Option<(&'static str, i64)> {
        self.effective_scope().map(|scope| match scope {
            InsuranceScope::RxGroup(id) => ("insuranceId", id),
            InsuranceScope::Pcn(id) => ("pcnId", id),
            InsuranceScope::Bin(id) => ("binId", id),
        })
    }
}

/// Backend operations used by the selection chain
#[async_trait]
pub trait PricingApi: Send + Sync {
    /// BINs whose code or name matches `text`
    async fn search_bins(&self, text: &str) -> Result<Vec<Bin>>;

    /// PCNs under a BIN
    async fn pcns_for_bin(&self, bin_id: i64) -> Result<Vec<Pcn>>;

    /// RxGroups under a PCN
    async fn rx_groups_for_pcn(&self, pcn_id: i64) -> Result<Vec<RxGroup>>;

    /// One page of drug classes matching the request
    async fn search_drug_classes(&self, request: &LookupRequest, version: &ClassVersion) -> Result<Vec<DrugClass>>;

    /// One page of drugs whose name matches the request
    async fn search_drugs(&self, request: &LookupRequest) -> Result<Vec<Drug>>;

    /// Every drug package in a class
    async fn drugs_for_class(&self, class_id: i64, class_type: &ClassVersion) -> Result<Vec<Drug>>;

    /// Net price of an NDC under an insurance id; `None` when not priced
    async fn pricing_detail(&self, ndc: &Ndc, insurance_id: i64) -> Result<Option<PricingQuote>>;

    /// Alternatives for an NDC, with and without matched insurance
    async fn alternatives(&self, ndc: &Ndc) -> Result<Vec<DrugAlternative>>;
}

// Lets one client be shared by a session and ad hoc lookups
#[async_trait]
impl<T: PricingApi + ?Sized> PricingApi for Arc<T> {
    async fn search_bins(&self, text: &str) -> Result<Vec<Bin>> {
        (**self).search_bins(text).await
    }

    async fn pcns_for_bin(&self, bin_id: i64) -> Result<Vec<Pcn>> {
        (**self).pcns_for_bin(bin_id).await
    }

    async fn rx_groups_for_pcn(&self, pcn_id: i64) -> Result<Vec<RxGroup>> {
        (**self).rx_groups_for_pcn(pcn_id).await
    }

    async fn search_drug_classes(&self, request: &LookupRequest, version: &ClassVersion) -> Result<Vec<DrugClass>> {
        (**self).search_drug_classes(request, version).await
    }

    async fn search_drugs(&self, request: &LookupRequest) -> Result<Vec<Drug>> {
        (**self).search_drugs(request).await
    }

    async fn drugs_for_class(&self, class_id: i64, class_type: &ClassVersion) -> Result<Vec<Drug>> {
        (**self).drugs_for_class(class_id, class_type).await
    }

    async fn pricing_detail(&self, ndc: &Ndc, insurance_id: i64) -> Result<Option<PricingQuote>> {
        (**self).pricing_detail(ndc, insurance_id).await
    }

    async fn alternatives(&self, ndc: &Ndc) -> Result<Vec<DrugAlternative>> {
        (**self).alternatives(ndc).await
    }
}
