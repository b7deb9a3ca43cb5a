// src/models/equipment.rs
use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

// ==================== RECORDS ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub equipment_type: String,
    pub flowrate: f64,
    pub pressure: f64,
    pub temperature: f64,
}

// ==================== SUMMARY ====================

/// Server-computed aggregate for one dataset's current data version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_equipment: i64,
    pub average_flowrate: f64,
    pub average_pressure: f64,
    pub average_temperature: f64,
    #[serde(rename = "equipment_type_distribution", alias = "type_distribution", default)]
    pub type_distribution: BTreeMap<String, i64>,
}

impl SummaryStats {
    /// Share of each type in percent, as printed in the report's distribution table.
    pub fn type_percentages(&self) -> Vec<(String, f64)> {
        let total: i64 = self.type_distribution.values().sum();
        self.type_distribution
            .iter()
            .map(|(t, count)| {
                let pct = if total > 0 { *count as f64 * 100.0 / total as f64 } else { 0.0 };
                (t.clone(), pct)
            })
            .collect()
    }
}

// ==================== FILTER ====================

/// Record filter criteria. Every field is optional; `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_bounds", skip_on_field_errors = false))]
pub struct RecordFilter {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub equipment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_max: Option<f64>,
}

fn validate_bounds(filter: &RecordFilter) -> Result<(), ValidationError> {
    check_range("pressure", filter.pressure_min, filter.pressure_max)?;
    check_range("temperature", filter.temperature_min, filter.temperature_max)
}

fn check_range(field: &'static str, min: Option<f64>, max: Option<f64>) -> Result<(), ValidationError> {
    if min.into_iter().chain(max).any(|v| !v.is_finite()) {
        let mut err = ValidationError::new("not_finite");
        err.message = Some(format!("{} bounds must be finite numbers", field).into());
        return Err(err);
    }
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            let mut err = ValidationError::new("inverted_range");
            err.message = Some(format!("{} minimum must not exceed maximum", field).into());
            return Err(err);
        }
    }
    Ok(())
}

impl RecordFilter {
    pub fn is_unconstrained(&self) -> bool {
        self.normalized() == RecordFilter::default()
    }

    /// Blank text criteria are treated as absent.
    pub fn normalized(&self) -> RecordFilter {
        fn text(v: &Option<String>) -> Option<String> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
        }

        RecordFilter {
            equipment_type: text(&self.equipment_type),
            name: text(&self.name),
            ..self.clone()
        }
    }

    /// Query parameters for the records endpoint; only present fields are sent.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let f = self.normalized();
        let mut pairs = Vec::new();
        if let Some(t) = f.equipment_type {
            pairs.push(("type", t));
        }
        if let Some(n) = f.name {
            pairs.push(("name", n));
        }
        let numeric = [
            ("pressure_min", f.pressure_min),
            ("pressure_max", f.pressure_max),
            ("temperature_min", f.temperature_min),
            ("temperature_max", f.temperature_max),
        ];
        for (key, value) in numeric {
            if let Some(v) = value {
                pairs.push((key, v.to_string()));
            }
        }
        pairs
    }

    /// Client-side evaluation of the full set of present criteria.
    pub fn matches(&self, record: &EquipmentRecord) -> bool {
        let f = self.normalized();
        if let Some(t) = &f.equipment_type {
            if !record.equipment_type.eq_ignore_ascii_case(t) {
                return false;
            }
        }
        if let Some(n) = &f.name {
            let needle = n.to_lowercase();
            match &record.name {
                Some(name) if name.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        let within = |v: f64, lo: Option<f64>, hi: Option<f64>| {
            lo.map_or(true, |lo| v >= lo) && hi.map_or(true, |hi| v <= hi)
        };
        within(record.pressure, f.pressure_min, f.pressure_max)
            && within(record.temperature, f.temperature_min, f.temperature_max)
    }
}

// ==================== FACETS ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

/// Backend snapshot describing the current filter result. Replaced wholesale
/// on every response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterFacets {
    pub available_types: BTreeSet<String>,
    pub pressure_range: Option<NumericRange>,
    pub temperature_range: Option<NumericRange>,
    pub name_supported: bool,
    pub total: i64,
}

impl FilterFacets {
    pub fn result_label(&self) -> String {
        if self.total == 1 {
            "1 result".to_string()
        } else {
            format!("{} results", self.total)
        }
    }

    /// Column headers for the records table.
    pub fn record_columns(&self) -> Vec<&'static str> {
        let mut headers = Vec::with_capacity(5);
        if self.name_supported {
            headers.push("Equipment Name");
        }
        headers.extend(["Type", "Flowrate", "Pressure", "Temperature"]);
        headers
    }
}

/// Records endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsPage {
    #[serde(default)]
    pub records: Vec<EquipmentRecord>,
    #[serde(default)]
    pub available_types: Vec<String>,
    #[serde(default, deserialize_with = "de_range")]
    pub pressure_range: Option<NumericRange>,
    #[serde(default, deserialize_with = "de_range")]
    pub temperature_range: Option<NumericRange>,
    #[serde(default)]
    pub name_supported: bool,
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Deserialize)]
struct PartialRange {
    min: Option<f64>,
    max: Option<f64>,
}

// The backend sends `{}` or null when a column is absent.
fn de_range<'de, D>(deserializer: D) -> Result<Option<NumericRange>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<PartialRange> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|r| match (r.min, r.max) {
        (Some(min), Some(max)) => Some(NumericRange { min, max }),
        _ => None,
    }))
}

impl RecordsPage {
    pub fn into_parts(self) -> (Vec<EquipmentRecord>, FilterFacets) {
        let total = self.total.unwrap_or(self.records.len() as i64);
        let facets = FilterFacets {
            available_types: self.available_types.into_iter().collect(),
            pressure_range: self.pressure_range,
            temperature_range: self.temperature_range,
            name_supported: self.name_supported,
            total,
        };
        (self.records, facets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(t: &str, pressure: f64) -> EquipmentRecord {
        EquipmentRecord {
            name: Some(format!("{}-{}", t, pressure)),
            equipment_type: t.to_string(),
            flowrate: 100.0,
            pressure,
            temperature: 80.0,
        }
    }

    #[test]
    fn test_summary_wire_names() {
        let json = r#"{
            "total_equipment": 10,
            "average_flowrate": 12.5,
            "average_pressure": 3.1,
            "average_temperature": 88.0,
            "equipment_type_distribution": {"pump": 6, "valve": 4}
        }"#;
        let summary: SummaryStats = serde_json::from_str(json).unwrap();
        assert_eq!(summary.total_equipment, 10);
        assert_eq!(summary.type_distribution.get("pump"), Some(&6));
        let pct = summary.type_percentages();
        assert_eq!(pct[0].0, "pump");
        assert!((pct[0].1 - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_filter_query_pairs_skip_absent_and_blank() {
        let filter = RecordFilter {
            equipment_type: Some("pump".into()),
            name: Some("   ".into()),
            pressure_min: Some(2.0),
            ..Default::default()
        };
        let pairs = filter.query_pairs();
        assert_eq!(pairs, vec![("type", "pump".to_string()), ("pressure_min", "2".to_string())]);
        assert!(RecordFilter::default().query_pairs().is_empty());
    }

    #[test]
    fn test_filter_unconstrained() {
        assert!(RecordFilter::default().is_unconstrained());
        assert!(RecordFilter { name: Some("".into()), ..Default::default() }.is_unconstrained());
        assert!(!RecordFilter { temperature_max: Some(100.0), ..Default::default() }.is_unconstrained());
    }

    #[test]
    fn test_filter_bounds_validation() {
        let inverted = RecordFilter { pressure_min: Some(5.0), pressure_max: Some(1.0), ..Default::default() };
        assert!(inverted.validate().is_err());

        let nan = RecordFilter { temperature_min: Some(f64::NAN), ..Default::default() };
        assert!(nan.validate().is_err());

        let ok = RecordFilter { pressure_min: Some(1.0), pressure_max: Some(1.0), ..Default::default() };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_filter_matches_all_present_fields() {
        let filter = RecordFilter { equipment_type: Some("pump".into()), pressure_min: Some(2.0), ..Default::default() };
        assert!(filter.matches(&record("pump", 2.5)));
        assert!(!filter.matches(&record("pump", 1.5)));
        assert!(!filter.matches(&record("valve", 2.5)));
        assert!(RecordFilter::default().matches(&record("valve", 0.1)));
    }

    #[test]
    fn test_records_page_with_empty_ranges() {
        let json = r#"{
            "records": [{"type": "pump", "flowrate": 1.0, "pressure": 2.0, "temperature": 3.0}],
            "available_types": ["pump"],
            "pressure_range": {},
            "temperature_range": {"min": 3.0, "max": 3.0},
            "name_supported": false
        }"#;
        let page: RecordsPage = serde_json::from_str(json).unwrap();
        let (records, facets) = page.into_parts();
        assert_eq!(records.len(), 1);
        assert_eq!(facets.total, 1);
        assert_eq!(facets.pressure_range, None);
        assert_eq!(facets.temperature_range, Some(NumericRange { min: 3.0, max: 3.0 }));
        assert_eq!(facets.result_label(), "1 result");
        assert_eq!(facets.record_columns(), vec!["Type", "Flowrate", "Pressure", "Temperature"]);
    }
}
