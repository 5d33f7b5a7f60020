use crate::records::AgentRecord;
use geo_types::Coord;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};

/// Property keys carried by every agent feature, in display order.
pub const PROPERTY_KEYS: [&str; 17] = [
    "empName",
    "tsaId",
    "empContactNumber",
    "role",
    "division",
    "department",
    "stateLocation",
    "managerName",
    "managerContactNumber",
    "secondaryManagerName",
    "secondaryManagerContactNumber",
    "emergencyContactName",
    "emergencyContactRelationship",
    "emergencyContactContactNumber",
    "personalAddress",
    "latitude",
    "longitude",
];

fn text(value: &Option<String>) -> JsonValue {
    match value {
        Some(s) => JsonValue::String(s.clone()),
        None => JsonValue::Null,
    }
}

// numeric ids stay numeric so style expressions can interpolate on them
fn id_value(value: &Option<String>) -> JsonValue {
    match value {
        Some(s) => match s.trim().parse::<i64>() {
            Ok(n) => JsonValue::from(n),
            Err(_) => JsonValue::String(s.clone()),
        },
        None => JsonValue::Null,
    }
}

fn coordinate(value: Option<f64>) -> JsonValue {
    value
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn properties(record: &AgentRecord) -> JsonObject {
    let values = [
        text(&record.emp_name),
        id_value(&record.tsa_id),
        text(&record.emp_contact_number),
        text(&record.role),
        text(&record.division),
        text(&record.department),
        text(&record.state_location),
        text(&record.manager_name),
        text(&record.manager_contact_number),
        text(&record.secondary_manager_name),
        text(&record.secondary_manager_contact_number),
        text(&record.emergency_contact_name),
        text(&record.emergency_contact_relationship),
        text(&record.emergency_contact_number),
        text(&record.personal_address),
        coordinate(record.latitude),
        coordinate(record.longitude),
    ];

    PROPERTY_KEYS
        .iter()
        .zip(values)
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// One point feature for one record. Coordinates are `[longitude, latitude]`.
///
/// Callers hand in records from the store, which are already placeable; a
/// missing coordinate falls back to the ungeocoded `(0, 0)` sentinel.
pub fn project_record(record: &AgentRecord) -> Feature {
    let lon = record.longitude.unwrap_or_default();
    let lat = record.latitude.unwrap_or_default();

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![lon, lat]))),
        id: record
            .tsa_id
            .as_ref()
            .map(|id| geojson::feature::Id::String(id.clone())),
        properties: Some(properties(record)),
        foreign_members: None,
    }
}

/// Projects already-filtered records. Zero records gives an empty collection.
pub fn project<'a, I>(records: I) -> FeatureCollection
where
    I: IntoIterator<Item = &'a AgentRecord>,
{
    FeatureCollection {
        bbox: None,
        features: records.into_iter().map(project_record).collect(),
        foreign_members: None,
    }
}

pub fn empty_collection() -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: vec![],
        foreign_members: None,
    }
}

/// Position of a point feature, if it has one.
pub fn feature_position(feature: &Feature) -> Option<Coord<f64>> {
    match feature.geometry.as_ref().map(|g| &g.value) {
        Some(Value::Point(position)) if position.len() >= 2 => Some(Coord {
            x: position[0],
            y: position[1],
        }),
        _ => None,
    }
}

pub fn property_str<'a>(feature: &'a Feature, key: &str) -> Option<&'a str> {
    feature
        .properties
        .as_ref()
        .and_then(|props| props.get(key))
        .and_then(|value| value.as_str())
}
