/*!
 * Wire schema for the pricing API
 *
 * Endpoint paths, the JSON shapes the backend returns, and the validation
 * step that turns them into typed records. Nothing past this module sees
 * raw JSON.
 */

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::constants::NO_INSURANCE_ID;
use crate::data_types::*;
use crate::{Result, RxError};

/// Endpoint paths, relative to the configured base URL
pub mod endpoints {
    pub const BINS_BY_NAME: &str = "/drug/GetInsurancesBinsByName";
    pub const PCNS_BY_BIN: &str = "/drug/GetInsurancesPcnByBinId";
    pub const RX_GROUPS_BY_PCN: &str = "/drug/GetInsurancesRxByPcnId";

    pub const CLASSES_BY_NAME: &str = "/drug/GetClassesByName";
    pub const CLASSES_BY_INSURANCE: &str = "/drug/GetDrugClassesByInsurancePaginated";
    pub const CLASSES_BY_PCN: &str = "/drug/GetDrugClassesByPCNPaginated";
    pub const CLASSES_BY_BIN: &str = "/drug/GetDrugClassesByBINPaginated";

    pub const DRUGS_BY_NAME: &str = "/drug/GetDrugsByName";
    pub const DRUGS_BY_INSURANCE: &str = "/drug/GetDrugsByInsuranceNamePaginated";
    pub const DRUGS_BY_PCN: &str = "/drug/GetDrugsByPCNNamePaginated";
    pub const DRUGS_BY_BIN: &str = "/drug/GetDrugsByBINNamePaginated";

    pub const DRUGS_BY_CLASS: &str = "/drug/GetDrugsByClassId";
    pub const DETAILS: &str = "/drug/GetDetails";
    pub const ALTERNATIVES: &str = "/drug/GetAlternatives";
}

/// How list responses treat individual records that fail validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordPolicy {
    /// Any invalid record fails the whole response
    #[default]
    Strict,
    /// Invalid records are logged and dropped
    SkipInvalid,
}

/// A JSON record that validates into a typed value
pub trait WireRecord: DeserializeOwned {
    type Output;

    fn validate(self, endpoint: &str) -> Result<Self::Output>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinWire {
    pub id: i64,
    #[serde(default, alias = "insuranceName")]
    pub name: Option<String>,
    #[serde(alias = "code")]
    pub bin: String,
    #[serde(default, alias = "helpDesk")]
    pub help_desk_number: Option<String>,
}

impl WireRecord for BinWire {
    type Output = Bin;

    fn validate(self, endpoint: &str) -> Result<Bin> {
        let code = BinCode::new(&self.bin)
            .map_err(|_| RxError::schema(endpoint, format!("BIN {} has invalid code '{}'", self.id, self.bin)))?;
        Ok(Bin {
            id: self.id,
            name: non_blank(self.name),
            code,
            help_desk_number: non_blank(self.help_desk_number),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcnWire {
    pub id: i64,
    #[serde(alias = "code")]
    pub pcn: String,
    pub bin_id: i64,
}

impl WireRecord for PcnWire {
    type Output = Pcn;

    fn validate(self, endpoint: &str) -> Result<Pcn> {
        let code = required_text(endpoint, "pcn", self.pcn)?;
        Ok(Pcn { id: self.id, code, bin_id: self.bin_id })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RxGroupWire {
    pub id: i64,
    #[serde(alias = "name")]
    pub rx_group: String,
    pub pcn_id: i64,
}

impl WireRecord for RxGroupWire {
    type Output = RxGroup;

    fn validate(self, endpoint: &str) -> Result<RxGroup> {
        let name = required_text(endpoint, "rxGroup", self.rx_group)?;
        Ok(RxGroup { id: self.id, name, pcn_id: self.pcn_id })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrugClassWire {
    pub id: i64,
    #[serde(default)]
    pub business_id: Option<i64>,
    #[serde(alias = "className")]
    pub name: String,
    #[serde(default, alias = "classType", alias = "classVersion")]
    pub version_tag: Option<String>,
}

impl WireRecord for DrugClassWire {
    type Output = DrugClass;

    fn validate(self, endpoint: &str) -> Result<DrugClass> {
        let name = required_text(endpoint, "name", self.name)?;
        Ok(DrugClass {
            id: self.id,
            business_id: self.business_id.unwrap_or(self.id),
            name,
            version_tag: non_blank(self.version_tag)
                .map(ClassVersion)
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrugWire {
    pub id: i64,
    #[serde(alias = "drugName")]
    pub name: String,
    #[serde(alias = "ndcCode")]
    pub ndc: String,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub class_id: Option<i64>,
}

impl WireRecord for DrugWire {
    type Output = Drug;

    fn validate(self, endpoint: &str) -> Result<Drug> {
        let name = required_text(endpoint, "name", self.name)?;
        let ndc = Ndc::new(&self.ndc)
            .map_err(|_| RxError::schema(endpoint, format!("drug {} has invalid NDC '{}'", self.id, self.ndc)))?;
        Ok(Drug {
            id: self.id,
            name,
            ndc,
            form: self.form.unwrap_or_default().trim().to_string(),
            strength: self.strength.unwrap_or_default().trim().to_string(),
            class_id: self.class_id.unwrap_or(0),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingWire {
    #[serde(alias = "ndcCode")]
    pub ndc: String,
    #[serde(default)]
    pub insurance_id: Option<Value>,
    #[serde(default, alias = "net")]
    pub net_price: Option<Decimal>,
}

impl WireRecord for PricingWire {
    type Output = PricingQuote;

    fn validate(self, endpoint: &str) -> Result<PricingQuote> {
        let ndc = Ndc::new(&self.ndc)
            .map_err(|_| RxError::schema(endpoint, format!("quote has invalid NDC '{}'", self.ndc)))?;
        // A quote without insurance is priced for the uninsured sentinel
        let insurance_id = lenient_id(endpoint, "insuranceId", self.insurance_id.as_ref())?.unwrap_or(NO_INSURANCE_ID);
        let net_price = non_negative(endpoint, self.net_price)?;
        Ok(PricingQuote { ndc, insurance_id, net_price })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeWire {
    #[serde(alias = "ndcCode")]
    pub ndc: String,
    #[serde(alias = "drugName")]
    pub name: String,
    #[serde(default)]
    pub bin_id: Option<Value>,
    #[serde(default)]
    pub pcn_id: Option<Value>,
    #[serde(default, alias = "net")]
    pub net_price: Option<Decimal>,
}

impl WireRecord for AlternativeWire {
    type Output = DrugAlternative;

    fn validate(self, endpoint: &str) -> Result<DrugAlternative> {
        let ndc = Ndc::new(&self.ndc)
            .map_err(|_| RxError::schema(endpoint, format!("alternative has invalid NDC '{}'", self.ndc)))?;
        let name = required_text(endpoint, "name", self.name)?;
        let bin_id = lenient_id(endpoint, "binId", self.bin_id.as_ref())?;
        let pcn_id = lenient_id(endpoint, "pcnId", self.pcn_id.as_ref())?;
        Ok(DrugAlternative {
            ndc,
            name,
            coverage: coverage_from_ids(bin_id, pcn_id),
            net_price: non_negative(endpoint, self.net_price)?,
        })
    }
}

/// Fold the backend's "no insurance" spellings into [`Coverage`].
///
/// Both ids must be absent (or 0/""/null) for a row to count as uninsured;
/// a row with only one id is attached to that id with 0 for the other.
pub fn coverage_from_ids(bin_id: Option<i64>, pcn_id: Option<i64>) -> Coverage {
    match (bin_id, pcn_id) {
        (None, None) => Coverage::Uninsured,
        (bin_id, pcn_id) => Coverage::Insured {
            bin_id: bin_id.unwrap_or(NO_INSURANCE_ID),
            pcn_id: pcn_id.unwrap_or(NO_INSURANCE_ID),
        },
    }
}

/// Parse an id that may arrive as a number, a numeric string, `""`, `0`
/// or `null`. The sentinel spellings all yield `None`.
pub fn lenient_id(endpoint: &str, field: &str, value: Option<&Value>) -> Result<Option<i64>> {
    let id = match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_i64().ok_or_else(|| {
            RxError::schema(endpoint, format!("{} is not an integer: {}", field, n))
        })?),
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().parse::<i64>().map_err(|_| {
            RxError::schema(endpoint, format!("{} is not an integer: '{}'", field, s))
        })?),
        Some(other) => {
            return Err(RxError::schema(endpoint, format!("{} has unexpected type: {}", field, other)));
        }
    };
    Ok(id.filter(|id| *id != NO_INSURANCE_ID))
}

/// Decode a list response. A `null` body decodes as an empty list.
pub fn decode_list<W: WireRecord>(endpoint: &str, body: &str, policy: RecordPolicy) -> Result<Vec<W::Output>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Option<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| RxError::schema(endpoint, format!("expected a JSON array: {}", e)))?;

    let mut records = Vec::new();
    for (index, value) in raw.unwrap_or_default().into_iter().enumerate() {
        let parsed = serde_json::from_value::<W>(value)
            .map_err(|e| RxError::schema(endpoint, format!("record {}: {}", index, e)))
            .and_then(|wire| wire.validate(endpoint));
        match (parsed, policy) {
            (Ok(record), _) => records.push(record),
            (Err(e), RecordPolicy::SkipInvalid) => {
                warn!(endpoint, index, error = %e, "skipping invalid record");
            }
            (Err(e), RecordPolicy::Strict) => return Err(e),
        }
    }
    Ok(records)
}

/// Decode a single-record response. `null` or an empty body is `None`.
pub fn decode_optional<W: WireRecord>(endpoint: &str, body: &str) -> Result<Option<W::Output>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }
    let raw: Option<W> = serde_json::from_str(body)
        .map_err(|e| RxError::schema(endpoint, e.to_string()))?;
    raw.map(|wire| wire.validate(endpoint)).transpose()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required_text(endpoint: &str, field: &str, value: String) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RxError::schema(endpoint, format!("{} is empty", field)));
    }
    Ok(value.to_string())
}

fn non_negative(endpoint: &str, price: Option<Decimal>) -> Result<Option<Decimal>> {
    match price {
        Some(p) if p.is_sign_negative() && !p.is_zero() => {
            Err(RxError::schema(endpoint, format!("net price is negative: {}", p)))
        }
        other => Ok(other),
    }
}
