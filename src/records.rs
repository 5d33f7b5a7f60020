use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the geocoded personnel sheet.
///
/// Column names follow the spreadsheet headers. Spreadsheet cells are loosely
/// typed, so every textual column is coerced to a string on the way in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    #[serde(rename = "TSA ID", default, deserialize_with = "lenient_string")]
    pub tsa_id: Option<String>,
    #[serde(rename = "Emp Name", default, deserialize_with = "lenient_string")]
    pub emp_name: Option<String>,
    #[serde(rename = "Emp Contact #", default, deserialize_with = "lenient_string")]
    pub emp_contact_number: Option<String>,
    #[serde(rename = "Role", default, deserialize_with = "lenient_string")]
    pub role: Option<String>,
    #[serde(rename = "Division", default, deserialize_with = "lenient_string")]
    pub division: Option<String>,
    #[serde(rename = "Department", default, deserialize_with = "lenient_string")]
    pub department: Option<String>,
    #[serde(rename = "State/Location", default, deserialize_with = "lenient_string")]
    pub state_location: Option<String>,
    #[serde(rename = "Manager Name", default, deserialize_with = "lenient_string")]
    pub manager_name: Option<String>,
    #[serde(
        rename = "Manager Contact #",
        default,
        deserialize_with = "lenient_string"
    )]
    pub manager_contact_number: Option<String>,
    #[serde(
        rename = "2nd Manager Name",
        default,
        deserialize_with = "lenient_string"
    )]
    pub secondary_manager_name: Option<String>,
    #[serde(
        rename = "2nd Manager Contact #",
        default,
        deserialize_with = "lenient_string"
    )]
    pub secondary_manager_contact_number: Option<String>,
    #[serde(
        rename = "Emergency Contact Name",
        default,
        deserialize_with = "lenient_string"
    )]
    pub emergency_contact_name: Option<String>,
    #[serde(
        rename = "Emergency Contact Relationship",
        default,
        deserialize_with = "lenient_string"
    )]
    pub emergency_contact_relationship: Option<String>,
    #[serde(
        rename = "Emergency Contact #",
        default,
        deserialize_with = "lenient_string"
    )]
    pub emergency_contact_number: Option<String>,
    #[serde(rename = "PersonalAddress", default, deserialize_with = "lenient_string")]
    pub personal_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub geocode_display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub geocode_success: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub geocode_error: Option<String>,
}

impl AgentRecord {
    /// `(longitude, latitude)` when the record can be placed on the map.
    ///
    /// Both coordinates must be finite and the pair must not be the `(0, 0)`
    /// "ungeocoded" sentinel. A row whose geocoder explicitly reported failure
    /// is never placed, even if it carries plausible coordinates.
    pub fn map_position(&self) -> Option<(f64, f64)> {
        if self.geocode_success == Some(false) {
            return None;
        }

        let lat = self.latitude?;
        let lon = self.longitude?;

        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }

        if lat == 0.0 && lon == 0.0 {
            return None;
        }

        Some((lon, lat))
    }

    pub fn is_mappable(&self) -> bool {
        self.map_position().is_some()
    }
}

/// Response body of the record endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RecordEnvelope {
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default, rename = "rowCount")]
    pub row_count: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Outcome of decoding an envelope into mappable rows.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecodeSummary {
    pub mappable: usize,
    pub unplaceable: usize,
    pub malformed: usize,
}

impl RecordEnvelope {
    /// Keeps only the rows that decode and can be placed on the map.
    pub fn into_mappable_records(self) -> (Vec<AgentRecord>, DecodeSummary) {
        let mut summary = DecodeSummary::default();
        let mut records = Vec::new();

        for row in self.data.unwrap_or_default() {
            match serde_json::from_value::<AgentRecord>(row) {
                Ok(record) if record.is_mappable() => {
                    summary.mappable += 1;
                    records.push(record);
                }
                Ok(_) => summary.unplaceable += 1,
                Err(_) => summary.malformed += 1,
            }
        }

        (records, summary)
    }
}

/// Loaded record set. Immutable between reloads.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<AgentRecord>,
    loaded: bool,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole record set. Rows that cannot be placed are dropped.
    pub fn load(&mut self, records: Vec<AgentRecord>) {
        self.records = records.into_iter().filter(|r| r.is_mappable()).collect();
        self.loaded = true;
    }

    /// Marks the store as loaded with nothing in it, used when the fetch fails.
    pub fn load_empty(&mut self) {
        self.records.clear();
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all(&self) -> &[AgentRecord] {
        &self.records
    }

    pub fn filtered<'a>(
        &'a self,
        criteria: &'a crate::filter::FilterCriteria,
    ) -> impl Iterator<Item = &'a AgentRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| crate::filter::matches(record, criteria))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            // unrecognised flags fall back to the coordinate check
            _ => Ok(None),
        },
        Some(Value::Number(n)) => Ok(n.as_f64().map(|x| x != 0.0)),
        Some(other) => Err(de::Error::custom(format!("not a boolean: {}", other))),
    }
}

#[cfg(test)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn test_record(
    id: &str,
    name: &str,
    location: &str,
    division: &str,
    department: &str,
    manager: &str,
    lon: f64,
    lat: f64,
) -> AgentRecord {
    AgentRecord {
        tsa_id: Some(id.to_string()),
        emp_name: Some(name.to_string()),
        role: Some("Field Agent".to_string()),
        division: Some(division.to_string()),
        department: Some(department.to_string()),
        state_location: Some(location.to_string()),
        manager_name: Some(manager.to_string()),
        personal_address: Some(format!("{} Example St", id)),
        latitude: Some(lat),
        longitude: Some(lon),
        geocode_success: Some(true),
        ..Default::default()
    }
}
