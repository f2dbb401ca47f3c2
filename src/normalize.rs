use crate::constants::{DEFAULT_EMAIL, DEFAULT_PHONE};
use crate::schema::{PatientIntake, ProviderRecord};

/// Upper-cases the first letter of every space-delimited word and lower-cases
/// everything else. Only the ASCII space separates words; tabs and other
/// whitespace are ordinary characters.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c == ' ' {
            out.push(c);
            at_word_start = true;
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Strips leading and trailing ASCII spaces only.
fn trim_spaces(text: &str) -> &str {
    text.trim_matches(' ')
}

fn title_trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| title_case(trim_spaces(&v)))
}

fn upper_trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| trim_spaces(&v).to_uppercase())
}

fn or_default(value: Option<String>, default: &str) -> Option<String> {
    match value {
        Some(v) if !v.is_empty() => Some(v),
        _ => Some(default.to_string()),
    }
}

pub fn normalize_record(record: ProviderRecord) -> ProviderRecord {
    let accepting = record.accepts_new_patients();
    ProviderRecord {
        accepting_new_patients: Some(PatientIntake::Flag(accepting)),
        email: or_default(record.email, DEFAULT_EMAIL),
        phone_number: or_default(record.phone_number, DEFAULT_PHONE),
        name: title_case(trim_spaces(&record.name)),
        city: title_trimmed(record.city),
        specialty: record
            .specialty
            .map(|v| title_case(&trim_spaces(&v).to_lowercase())),
        organization: title_trimmed(record.organization),
        state: upper_trimmed(record.state),
        license_state: upper_trimmed(record.license_state),
        ..record
    }
}

pub fn normalize(records: Vec<ProviderRecord>) -> Vec<ProviderRecord> {
    records.into_iter().map(normalize_record).collect()
}
