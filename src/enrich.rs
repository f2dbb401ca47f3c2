use crate::constants::{HIGH_RISK_YEARS_THRESHOLD, MASKED_EMAIL_DOMAIN, SENIOR_YEARS_THRESHOLD};
use crate::schema::{EnrichedProvider, ExperienceLevel, ProviderRecord};

pub fn experience_level(years: Option<i64>) -> ExperienceLevel {
    match years {
        Some(y) if y < 5 => ExperienceLevel::Junior,
        Some(y) if y < 15 => ExperienceLevel::Mid,
        _ => ExperienceLevel::Senior,
    }
}

/// First matching branch wins: long tenure, then surgery, then the baseline.
pub fn risk_score(years: Option<i64>, specialty: Option<&str>) -> f64 {
    if years.is_some_and(|y| y > HIGH_RISK_YEARS_THRESHOLD) {
        0.9
    } else if specialty == Some("Surgery") {
        0.8
    } else {
        0.3
    }
}

/// Replaces `@` and everything after it with `@*****.com`.
pub fn mask_email(email: &str) -> String {
    match email.find('@') {
        Some(at) => format!("{}{MASKED_EMAIL_DOMAIN}", &email[..at]),
        None => email.to_string(),
    }
}

pub fn enrich_record(record: ProviderRecord) -> EnrichedProvider {
    let years = record.years_of_experience;
    let specialty = record.specialty.as_deref();

    let senior_providers = years.is_some_and(|y| y > SENIOR_YEARS_THRESHOLD);
    let is_cardiologist = i32::from(specialty.is_some_and(|s| s.contains("Cardiology")));
    let experience_level = experience_level(years);
    let risk_score = risk_score(years, specialty);
    let license_state_match = match (&record.license_state, &record.state) {
        (Some(license_state), Some(state)) => Some(license_state == state),
        _ => None,
    };
    let masked_email = record.email.as_deref().map(mask_email);

    EnrichedProvider {
        record,
        senior_providers,
        is_cardiologist,
        experience_level,
        risk_score,
        license_state_match,
        masked_email,
    }
}

pub fn enrich(records: Vec<ProviderRecord>) -> Vec<EnrichedProvider> {
    records.into_iter().map(enrich_record).collect()
}
