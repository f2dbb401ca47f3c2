//! Provider record model: the raw bronze line, the typed record carried through
//! the cleaning stages, and the enriched silver row.

use arrow::{
    array::{ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
};
use serde::{Deserialize, Deserializer, de};
use std::{fmt, sync::Arc};

/// `accepting_new_patients` arrives either as a JSON boolean or as a free-text
/// answer ("yes", "No", ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PatientIntake {
    Flag(bool),
    Text(String),
}

/// Truth table:
///
/// | input                                   | result |
/// |-----------------------------------------|--------|
/// | `true` / `false`                        | same   |
/// | `"yes"`, `"y"`, `"true"`, `"1"` (any case, trimmed) | `true` |
/// | any other string                        | `false` |
/// | null / missing                          | `false` |
pub fn parse_accepting_new_patients(value: Option<&PatientIntake>) -> bool {
    match value {
        Some(PatientIntake::Flag(flag)) => *flag,
        Some(PatientIntake::Text(text)) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "yes" | "y" | "true" | "1"
        ),
        None => false,
    }
}

struct ScalarText;

impl<'de> de::Visitor<'de> for ScalarText {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

/// Text columns take any JSON scalar as its literal text (`1234567890` becomes
/// `"1234567890"`). Objects and arrays are still rejected.
fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    deserializer.deserialize_any(ScalarText)
}

/// One line of the bronze feed. Every field is nullable; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawProvider {
    /// Position in the ingest order (file order, then line order).
    #[serde(skip)]
    pub ordinal: u64,
    pub accepting_new_patients: Option<PatientIntake>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub license_number: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub license_state: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub npi_number: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub organization: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub provider_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub specialty: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub state: Option<String>,
    pub years_of_experience: Option<i64>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub zip_code: Option<String>,
}

impl RawProvider {
    pub fn populated_field_count(&self) -> usize {
        [
            self.accepting_new_patients.is_some(),
            self.address.is_some(),
            self.city.is_some(),
            self.email.is_some(),
            self.license_number.is_some(),
            self.license_state.is_some(),
            self.name.is_some(),
            self.npi_number.is_some(),
            self.organization.is_some(),
            self.phone_number.is_some(),
            self.provider_id.is_some(),
            self.specialty.is_some(),
            self.state.is_some(),
            self.years_of_experience.is_some(),
            self.zip_code.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

/// A record that survived dedup and the completeness filter: the key fields and
/// `name` are guaranteed present.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRecord {
    pub ordinal: u64,
    pub accepting_new_patients: Option<PatientIntake>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub email: Option<String>,
    pub license_number: Option<String>,
    pub license_state: Option<String>,
    pub name: String,
    pub npi_number: String,
    pub organization: Option<String>,
    pub phone_number: Option<String>,
    pub provider_id: String,
    pub specialty: Option<String>,
    pub state: Option<String>,
    pub years_of_experience: Option<i64>,
    pub zip_code: Option<String>,
}

impl ProviderRecord {
    /// Returns `None` when `provider_id`, `npi_number` or `name` is null.
    pub fn from_raw(raw: RawProvider) -> Option<Self> {
        let RawProvider {
            ordinal,
            accepting_new_patients,
            address,
            city,
            email,
            license_number,
            license_state,
            name,
            npi_number,
            organization,
            phone_number,
            provider_id,
            specialty,
            state,
            years_of_experience,
            zip_code,
        } = raw;
        Some(Self {
            ordinal,
            accepting_new_patients,
            address,
            city,
            email,
            license_number,
            license_state,
            name: name?,
            npi_number: npi_number?,
            organization,
            phone_number,
            provider_id: provider_id?,
            specialty,
            state,
            years_of_experience,
            zip_code,
        })
    }

    pub fn accepts_new_patients(&self) -> bool {
        parse_accepting_new_patients(self.accepting_new_patients.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperienceLevel {
    Junior,
    Mid,
    Senior,
}

impl ExperienceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ExperienceLevel::Junior => "Junior",
            ExperienceLevel::Mid => "Mid",
            ExperienceLevel::Senior => "Senior",
        }
    }
}

/// A silver row: the normalized record plus derived columns.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedProvider {
    pub record: ProviderRecord,
    pub senior_providers: bool,
    pub is_cardiologist: i32,
    pub experience_level: ExperienceLevel,
    pub risk_score: f64,
    pub license_state_match: Option<bool>,
    pub masked_email: Option<String>,
}

pub const PROVIDER_COLUMNS: [&str; 15] = [
    "accepting_new_patients",
    "address",
    "city",
    "email",
    "license_number",
    "license_state",
    "name",
    "npi_number",
    "organization",
    "phone_number",
    "provider_id",
    "specialty",
    "state",
    "years_of_experience",
    "zip_code",
];

pub const DERIVED_COLUMNS: [&str; 6] = [
    "senior_providers",
    "is_cardiologist",
    "experience_level",
    "risk_score",
    "license_state_match",
    "masked_email",
];

fn provider_fields() -> Vec<Field> {
    PROVIDER_COLUMNS
        .iter()
        .map(|name| {
            let data_type = match *name {
                "accepting_new_patients" => DataType::Boolean,
                "years_of_experience" => DataType::Int64,
                _ => DataType::Utf8,
            };
            Field::new(*name, data_type, true)
        })
        .collect()
}

/// Schema of quarantined (normalized, not enriched) provider rows.
pub fn provider_schema() -> Arc<Schema> {
    Arc::new(Schema::new(provider_fields()))
}

/// Schema of the silver table: the 15 provider columns followed by the derived ones.
pub fn silver_schema() -> Arc<Schema> {
    let mut fields = provider_fields();
    fields.extend([
        Field::new("senior_providers", DataType::Boolean, false),
        Field::new("is_cardiologist", DataType::Int32, false),
        Field::new("experience_level", DataType::Utf8, false),
        Field::new("risk_score", DataType::Float64, false),
        Field::new("license_state_match", DataType::Boolean, true),
        Field::new("masked_email", DataType::Utf8, true),
    ]);
    Arc::new(Schema::new(fields))
}

fn string_column<'a>(
    rows: &[&'a ProviderRecord],
    get: impl Fn(&'a ProviderRecord) -> Option<&'a str>,
) -> ArrayRef {
    Arc::new(StringArray::from(
        rows.iter().map(|r| get(*r)).collect::<Vec<Option<&str>>>(),
    ))
}

/// Arrow columns for `rows`, in `PROVIDER_COLUMNS` order.
pub fn provider_columns(rows: &[&ProviderRecord]) -> Vec<ArrayRef> {
    vec![
        Arc::new(BooleanArray::from(
            rows.iter()
                .map(|r| Some(r.accepts_new_patients()))
                .collect::<Vec<Option<bool>>>(),
        )),
        string_column(rows, |r| r.address.as_deref()),
        string_column(rows, |r| r.city.as_deref()),
        string_column(rows, |r| r.email.as_deref()),
        string_column(rows, |r| r.license_number.as_deref()),
        string_column(rows, |r| r.license_state.as_deref()),
        string_column(rows, |r| Some(r.name.as_str())),
        string_column(rows, |r| Some(r.npi_number.as_str())),
        string_column(rows, |r| r.organization.as_deref()),
        string_column(rows, |r| r.phone_number.as_deref()),
        string_column(rows, |r| Some(r.provider_id.as_str())),
        string_column(rows, |r| r.specialty.as_deref()),
        string_column(rows, |r| r.state.as_deref()),
        Arc::new(Int64Array::from(
            rows.iter()
                .map(|r| r.years_of_experience)
                .collect::<Vec<Option<i64>>>(),
        )),
        string_column(rows, |r| r.zip_code.as_deref()),
    ]
}

/// Arrow columns for silver rows, in `silver_schema()` order.
pub fn silver_columns(rows: &[EnrichedProvider]) -> Vec<ArrayRef> {
    let records: Vec<&ProviderRecord> = rows.iter().map(|r| &r.record).collect();
    let mut columns = provider_columns(&records);
    columns.push(Arc::new(BooleanArray::from(
        rows.iter().map(|r| r.senior_providers).collect::<Vec<bool>>(),
    )));
    columns.push(Arc::new(Int32Array::from(
        rows.iter().map(|r| r.is_cardiologist).collect::<Vec<i32>>(),
    )));
    columns.push(Arc::new(StringArray::from(
        rows.iter()
            .map(|r| r.experience_level.as_str())
            .collect::<Vec<&str>>(),
    )));
    columns.push(Arc::new(Float64Array::from(
        rows.iter().map(|r| r.risk_score).collect::<Vec<f64>>(),
    )));
    columns.push(Arc::new(BooleanArray::from(
        rows.iter()
            .map(|r| r.license_state_match)
            .collect::<Vec<Option<bool>>>(),
    )));
    columns.push(Arc::new(StringArray::from(
        rows.iter()
            .map(|r| r.masked_email.as_deref())
            .collect::<Vec<Option<&str>>>(),
    )));
    columns
}
