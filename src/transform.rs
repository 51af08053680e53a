use serde_json::{Map, Value};
use tracing::debug;

/// One activity projected onto single-level columns.
pub type Row = Map<String, Value>;

/// Side column collecting fields that are not part of the export schema.
pub const EXTRA_FIELDS_COLUMN: &str = "extra_fields";

/// Known Strava summary-activity columns, in export order.
pub const ACTIVITY_COLUMNS: &[&str] = &[
    "resource_state",
    "athlete.id",
    "athlete.resource_state",
    "name",
    "distance",
    "moving_time",
    "elapsed_time",
    "total_elevation_gain",
    "type",
    "sport_type",
    "workout_type",
    "id",
    "start_date",
    "start_date_local",
    "timezone",
    "utc_offset",
    "location_city",
    "location_state",
    "location_country",
    "achievement_count",
    "kudos_count",
    "comment_count",
    "athlete_count",
    "photo_count",
    "map.id",
    "map.summary_polyline",
    "map.resource_state",
    "trainer",
    "commute",
    "manual",
    "private",
    "visibility",
    "flagged",
    "gear_id",
    "start_latlng",
    "end_latlng",
    "average_speed",
    "max_speed",
    "average_cadence",
    "average_watts",
    "max_watts",
    "weighted_average_watts",
    "device_watts",
    "kilojoules",
    "has_heartrate",
    "average_heartrate",
    "max_heartrate",
    "heartrate_opt_out",
    "display_hide_heartrate_option",
    "elev_high",
    "elev_low",
    "upload_id",
    "upload_id_str",
    "external_id",
    "from_accepted_tag",
    "pr_count",
    "total_photo_count",
    "has_kudoed",
    "suffer_score",
];

/// Header written to a freshly created export.
pub fn default_headers() -> Vec<String> {
    ACTIVITY_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(std::iter::once(EXTRA_FIELDS_COLUMN.to_string()))
        .collect()
}

/// Expand nested objects one level into `outer.inner` columns and turn lists
/// into their string form. Anything that is not an object flattens to a
/// single `value` column.
pub fn flatten(record: &Value) -> Row {
    let Some(fields) = record.as_object() else {
        let mut row = Row::new();
        row.insert("value".to_string(), scalar(record));
        return row;
    };

    let mut row = Row::new();
    for (key, value) in fields {
        match value {
            Value::Object(inner) => {
                for (sub_key, sub_value) in inner {
                    row.insert(format!("{key}.{sub_key}"), scalar(sub_value));
                }
            }
            other => {
                row.insert(key.clone(), scalar(other));
            }
        }
    }
    debug!("Flattened record into {} columns", row.len());
    row
}

/// Lists and objects below the first level become strings; scalars pass through.
fn scalar(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::String(list_to_string(items)),
        Value::Object(_) => Value::String(value.to_string()),
        other => other.clone(),
    }
}

/// Canonical list form: `[1.0, 2.0]`, order preserved, strings quoted.
pub fn list_to_string(items: &[Value]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Array(inner) => list_to_string(inner),
            other => other.to_string(),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

/// Text written into a CSV cell.
pub fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        // Capitalized so appended rows match exports written by the older tool.
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Project a row onto `headers`. Missing columns become empty cells. Columns
/// the header does not know go into the `extra_fields` cell as a JSON object
/// when the header has one; otherwise they are returned as dropped.
pub fn align(row: &Row, headers: &[String]) -> (Vec<String>, Vec<String>) {
    let extras: Row = row
        .iter()
        .filter(|(k, _)| !headers.iter().any(|h| h == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let has_extra_column = headers.iter().any(|h| h == EXTRA_FIELDS_COLUMN);
    let cells = headers
        .iter()
        .map(|h| {
            if h == EXTRA_FIELDS_COLUMN && !row.contains_key(h) {
                if extras.is_empty() {
                    String::new()
                } else {
                    Value::Object(extras.clone()).to_string()
                }
            } else {
                cell(row.get(h))
            }
        })
        .collect();

    let dropped = if has_extra_column {
        Vec::new()
    } else {
        extras.keys().cloned().collect()
    };
    (cells, dropped)
}
