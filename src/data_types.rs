/*!
 * Data type definitions for pricing lookups
 *
 * Type-safe representations of the insurance chain (BIN, PCN, RxGroup),
 * the drug catalog (classes, drugs, NDCs) and derived pricing values.
 */

use std::fmt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{BIN_DIGITS, NDC_DIGITS};
use crate::RxError;

/// NDC (National Drug Code) - 11 digit package identifier
///
/// Stored as the 11 canonical digits. Hyphenated 10-digit forms are padded
/// to the 5-4-2 layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ndc(String);

impl Ndc {
    /// Parse an NDC from plain or hyphen-grouped input
    pub fn new(input: &str) -> Result<Self, RxError> {
        let input = input.trim();
        if input.is_empty() || !input.chars().all(|c| c.is_ascii_digit() || c == '-') {
            return Err(RxError::invalid_ndc(input));
        }

        if !input.contains('-') {
            if input.len() != NDC_DIGITS {
                return Err(RxError::invalid_ndc(input));
            }
            return Ok(Ndc(input.to_string()));
        }

        let groups: Vec<&str> = input.split('-').collect();
        if groups.len() != 3 {
            return Err(RxError::invalid_ndc(input));
        }
        let (labeler, product, package) = (groups[0], groups[1], groups[2]);
        let digits = match (labeler.len(), product.len(), package.len()) {
            (5, 4, 2) => format!("{}{}{}", labeler, product, package),
            (4, 4, 2) => format!("0{}{}{}", labeler, product, package),
            (5, 3, 2) => format!("{}0{}{}", labeler, product, package),
            (5, 4, 1) => format!("{}{}0{}", labeler, product, package),
            _ => return Err(RxError::invalid_ndc(input)),
        };
        Ok(Ndc(digits))
    }

    /// The 11 canonical digits
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Labeler segment (first 5 digits)
    pub fn labeler(&self) -> &str {
        &self.0[..5]
    }
}

impl fmt::Display for Ndc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", &self.0[..5], &self.0[5..9], &self.0[9..])
    }
}

impl TryFrom<String> for Ndc {
    type Error = RxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ndc::new(&value)
    }
}

impl From<Ndc> for String {
    fn from(ndc: Ndc) -> Self {
        ndc.0
    }
}

/// BIN code - 6 digit payer/processor identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BinCode(String);

impl BinCode {
    pub fn new(code: &str) -> Result<Self, RxError> {
        let code = code.trim();
        if code.len() != BIN_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(RxError::invalid_bin(code));
        }
        Ok(BinCode(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BinCode {
    type Error = RxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BinCode::new(&value)
    }
}

impl From<BinCode> for String {
    fn from(code: BinCode) -> Self {
        code.0
    }
}

/// Bank Identification Number record, top of the selection chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    pub id: i64,
    pub name: Option<String>,
    pub code: BinCode,
    pub help_desk_number: Option<String>,
}

/// Processor Control Number under a BIN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pcn {
    pub id: i64,
    pub code: String,
    pub bin_id: i64,
}

/// Benefit-plan grouping under a PCN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxGroup {
    pub id: i64,
    pub name: String,
    pub pcn_id: i64,
}

/// Drug class version tag, e.g. `ClassV1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassVersion(pub String);

impl ClassVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClassVersion {
    fn default() -> Self {
        ClassVersion("ClassV1".to_string())
    }
}

impl fmt::Display for ClassVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Therapeutic drug class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugClass {
    pub id: i64,
    pub business_id: i64,
    pub name: String,
    pub version_tag: ClassVersion,
}

/// A single drug package; one name maps to many NDCs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drug {
    pub id: i64,
    pub name: String,
    pub ndc: Ndc,
    pub form: String,
    pub strength: String,
    pub class_id: i64,
}

impl Drug {
    /// Name with strength and form, e.g. `Atorvastatin 20 MG Tablet`
    pub fn label(&self) -> String {
        let mut parts = vec![self.name.as_str()];
        if !self.strength.is_empty() {
            parts.push(&self.strength);
        }
        if !self.form.is_empty() {
            parts.push(&self.form);
        }
        parts.join(" ")
    }
}

/// Net price for one NDC under one insurance selection. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingQuote {
    pub ndc: Ndc,
    pub insurance_id: i64,
    pub net_price: Option<Decimal>,
}

/// Most specific insurance selection, used to scope searches and pricing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsuranceScope {
    RxGroup(i64),
    Pcn(i64),
    Bin(i64),
}

impl InsuranceScope {
    /// The identifier sent as `insuranceId`
    pub fn id(&self) -> i64 {
        match self {
            InsuranceScope::RxGroup(id) | InsuranceScope::Pcn(id) | InsuranceScope::Bin(id) => *id,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            InsuranceScope::RxGroup(_) => Stage::RxGroup,
            InsuranceScope::Pcn(_) => Stage::Pcn,
            InsuranceScope::Bin(_) => Stage::Bin,
        }
    }
}

impl fmt::Display for InsuranceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.stage(), self.id())
    }
}

/// Insurance coverage of an alternative.
///
/// `Uninsured` is the one canonical "no insurance" value. The backend's
/// `0`, `""` and missing-field spellings are all folded into it by the
/// schema layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coverage {
    Insured { bin_id: i64, pcn_id: i64 },
    Uninsured,
}

impl Coverage {
    pub fn is_insured(&self) -> bool {
        matches!(self, Coverage::Insured { .. })
    }
}

/// Drug alternative row as listed on the detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugAlternative {
    pub ndc: Ndc,
    pub name: String,
    pub coverage: Coverage,
    pub net_price: Option<Decimal>,
}

/// Position in the dependent selection chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Bin,
    Pcn,
    RxGroup,
    DrugClass,
    Drug,
    Ndc,
}

impl Stage {
    /// All stages in chain order
    pub const ALL: [Stage; 6] = [
        Stage::Bin,
        Stage::Pcn,
        Stage::RxGroup,
        Stage::DrugClass,
        Stage::Drug,
        Stage::Ndc,
    ];

    /// Plural noun used in status messages
    pub fn plural(&self) -> &'static str {
        match self {
            Stage::Bin => "BINs",
            Stage::Pcn => "PCNs",
            Stage::RxGroup => "Rx groups",
            Stage::DrugClass => "drug classes",
            Stage::Drug => "drugs",
            Stage::Ndc => "NDCs",
        }
    }

    /// Stages strictly after this one
    pub fn downstream(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |s| *s > self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Bin => "BIN",
            Stage::Pcn => "PCN",
            Stage::RxGroup => "RxGroup",
            Stage::DrugClass => "drug class",
            Stage::Drug => "drug",
            Stage::Ndc => "NDC",
        };
        f.write_str(name)
    }
}

/// Records that render as a suggestion with a display name
pub trait Named {
    fn display_name(&self) -> &str;
}

impl Named for Bin {
    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.code.as_str())
    }
}

impl Named for Pcn {
    fn display_name(&self) -> &str {
        &self.code
    }
}

impl Named for RxGroup {
    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Named for DrugClass {
    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Named for Drug {
    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Named for DrugAlternative {
    fn display_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndc_layouts_normalize_to_eleven_digits() {
        assert_eq!(Ndc::new("00071-0155-23").unwrap().as_str(), "00071015523");
        assert_eq!(Ndc::new("0071-0155-23").unwrap().as_str(), "00071015523");
        assert_eq!(Ndc::new("00071-155-23").unwrap().as_str(), "00071015523");
        assert_eq!(Ndc::new("00071-0155-3").unwrap().as_str(), "00071015503");
        assert_eq!(Ndc::new("00071015523").unwrap().to_string(), "00071-0155-23");
    }

    #[test]
    fn test_ndc_rejects_malformed_input() {
        assert!(Ndc::new("").is_err());
        assert!(Ndc::new("0007101552").is_err());
        assert!(Ndc::new("00071-0155").is_err());
        assert!(Ndc::new("ABCDE-0155-23").is_err());
        assert!(Ndc::new("000710-155-23").is_err());
    }

    #[test]
    fn test_ndc_serde_uses_canonical_digits() {
        let ndc: Ndc = serde_json::from_str("\"0071-0155-23\"").unwrap();
        assert_eq!(serde_json::to_string(&ndc).unwrap(), "\"00071015523\"");
    }

    #[test]
    fn test_bin_code() {
        assert!(BinCode::new("610591").is_ok());
        assert!(BinCode::new("61059").is_err());
        assert!(BinCode::new("61059A").is_err());
    }

    #[test]
    fn test_stage_ordering() {
        let after_pcn: Vec<Stage> = Stage::Pcn.downstream().collect();
        assert_eq!(after_pcn, vec![Stage::RxGroup, Stage::DrugClass, Stage::Drug, Stage::Ndc]);
        assert_eq!(Stage::Ndc.downstream().count(), 0);
    }

    #[test]
    fn test_scope_id() {
        assert_eq!(InsuranceScope::RxGroup(7).id(), 7);
        assert_eq!(InsuranceScope::Bin(3).stage(), Stage::Bin);
    }
}
