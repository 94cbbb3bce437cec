/*!
 * Alternatives and cross-insurance price comparison
 *
 * Splits an NDC's alternatives into the insured and uninsured tables shown
 * on the detail page, and lines up one NDC's net price across several
 * insurance selections.
 */

use std::cmp::Ordering;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::PricingApi;
use crate::data_types::*;

/// Alternatives partitioned by coverage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativesView {
    pub insured: Vec<DrugAlternative>,
    pub uninsured: Vec<DrugAlternative>,
}

impl AlternativesView {
    pub fn len(&self) -> usize {
        self.insured.len() + self.uninsured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insured.is_empty() && self.uninsured.is_empty()
    }

    /// Cheapest priced insured row
    pub fn cheapest_insured(&self) -> Option<&DrugAlternative> {
        cheapest(&self.insured)
    }

    /// Cheapest priced uninsured row
    pub fn cheapest_uninsured(&self) -> Option<&DrugAlternative> {
        cheapest(&self.uninsured)
    }
}

fn cheapest(rows: &[DrugAlternative]) -> Option<&DrugAlternative> {
    rows.iter()
        .filter(|row| row.net_price.is_some())
        .min_by(|a, b| a.net_price.cmp(&b.net_price))
}

/// Partition alternatives. Uninsured rows never appear in the insured table.
pub fn split_alternatives(rows: Vec<DrugAlternative>) -> AlternativesView {
    let (insured, uninsured): (Vec<_>, Vec<_>) = rows.into_iter().partition(|row| row.coverage.is_insured());
    debug!(insured = insured.len(), uninsured = uninsured.len(), "split alternatives");
    AlternativesView { insured, uninsured }
}

/// One insurance selection's price for the compared NDC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub label: String,
    pub insurance_id: i64,
    pub net_price: Option<Decimal>,
}

/// Net price of one NDC across insurance selections, cheapest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsuranceComparison {
    pub ndc: Ndc,
    rows: Vec<ComparisonRow>,
}

impl InsuranceComparison {
    pub fn new(ndc: Ndc) -> Self {
        Self { ndc, rows: Vec::new() }
    }

    /// Add a row, keeping priced rows ascending and unpriced rows last
    pub fn push(&mut self, label: impl Into<String>, insurance_id: i64, net_price: Option<Decimal>) {
        self.rows.push(ComparisonRow { label: label.into(), insurance_id, net_price });
        self.rows.sort_by(compare_rows);
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn cheapest(&self) -> Option<&ComparisonRow> {
        self.rows.first().filter(|row| row.net_price.is_some())
    }

    /// Difference between the most and least expensive priced rows
    pub fn spread(&self) -> Option<Decimal> {
        let priced: Vec<Decimal> = self.rows.iter().filter_map(|row| row.net_price).collect();
        match (priced.first(), priced.last()) {
            (Some(low), Some(high)) => Some(*high - *low),
            _ => None,
        }
    }

    /// Price an NDC under each id concurrently.
    ///
    /// A failed lookup for one id becomes an unpriced row rather than
    /// failing the whole comparison.
    pub async fn collect<A: PricingApi + ?Sized>(api: &A, ndc: Ndc, insurance: &[(String, i64)]) -> Self {
        let target = &ndc;
        let lookups = insurance.iter().map(move |(_, id)| api.pricing_detail(target, *id));
        let outcomes = join_all(lookups).await;

        let mut comparison = Self::new(ndc);
        for ((label, id), outcome) in insurance.iter().zip(outcomes) {
            let price = match outcome {
                Ok(quote) => quote.and_then(|q| q.net_price),
                Err(e) => {
                    debug!(insurance_id = id, error = %e, "comparison lookup failed");
                    None
                }
            };
            comparison.push(label.clone(), *id, price);
        }
        comparison
    }
}

fn compare_rows(a: &ComparisonRow, b: &ComparisonRow) -> Ordering {
    match (a.net_price, b.net_price) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.insurance_id.cmp(&b.insurance_id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.insurance_id.cmp(&b.insurance_id),
    }
}
