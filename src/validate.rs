use anyhow::{Context, Result};
use regex::Regex;

use crate::constants::{EMAIL_PATTERN, NPI_PATTERN, PHONE_PATTERN, ZIP_PATTERN};
use crate::schema::{EnrichedProvider, ProviderRecord};

pub struct FieldPatterns {
    pub email: Regex,
    pub phone: Regex,
    pub zip: Regex,
    pub npi: Regex,
}

impl FieldPatterns {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            email: Regex::new(EMAIL_PATTERN).context("Failed compiling email pattern")?,
            phone: Regex::new(PHONE_PATTERN).context("Failed compiling phone pattern")?,
            zip: Regex::new(ZIP_PATTERN).context("Failed compiling zip pattern")?,
            npi: Regex::new(NPI_PATTERN).context("Failed compiling NPI pattern")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Email,
    Phone,
    Zip,
}

impl Check {
    pub fn as_str(self) -> &'static str {
        match self {
            Check::Email => "email",
            Check::Phone => "phone_number",
            Check::Zip => "zip_code",
        }
    }

    pub fn value(self, record: &ProviderRecord) -> Option<&str> {
        match self {
            Check::Email => record.email.as_deref(),
            Check::Phone => record.phone_number.as_deref(),
            Check::Zip => record.zip_code.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Split {
    pub valid: Vec<ProviderRecord>,
    pub invalid: Vec<ProviderRecord>,
}

/// Partitions `records` on whether `check`'s field matches `pattern`. Nulls are invalid.
pub fn split_by(records: &[ProviderRecord], check: Check, pattern: &Regex) -> Split {
    let (valid, invalid): (Vec<ProviderRecord>, Vec<ProviderRecord>) = records
        .iter()
        .cloned()
        .partition(|r| check.value(r).is_some_and(|v| pattern.is_match(v)));
    Split { valid, invalid }
}

/// Chained diagnostic splits: phone is checked only on valid-email rows, zip only
/// on valid-phone rows. The main table is not filtered by these.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub email: Split,
    pub phone: Split,
    pub zip: Split,
}

impl ValidationReport {
    pub fn invalid(&self, check: Check) -> &[ProviderRecord] {
        match check {
            Check::Email => &self.email.invalid,
            Check::Phone => &self.phone.invalid,
            Check::Zip => &self.zip.invalid,
        }
    }

    /// Rows that passed every chained check.
    pub fn fully_valid(&self) -> &[ProviderRecord] {
        &self.zip.valid
    }
}

pub fn validate(records: &[ProviderRecord], patterns: &FieldPatterns) -> ValidationReport {
    let email = split_by(records, Check::Email, &patterns.email);
    let phone = split_by(&email.valid, Check::Phone, &patterns.phone);
    let zip = split_by(&phone.valid, Check::Zip, &patterns.zip);
    ValidationReport { email, phone, zip }
}

/// Keeps rows whose `npi_number` is exactly ten digits. Returns the kept rows and
/// the number dropped. The input is left intact for the grouped reports.
pub fn filter_valid_npi(
    rows: &[EnrichedProvider],
    patterns: &FieldPatterns,
) -> (Vec<EnrichedProvider>, usize) {
    let kept: Vec<EnrichedProvider> = rows
        .iter()
        .filter(|r| patterns.npi.is_match(&r.record.npi_number))
        .cloned()
        .collect();
    let dropped = rows.len() - kept.len();
    (kept, dropped)
}
