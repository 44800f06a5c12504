//! Human-facing invoice numbers: `INV-{year}-{sequence:03}`.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use rentease_core::{DomainError, DomainResult};

/// Per-year invoice number. Ordering is by year, then sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceNumber {
    year: i32,
    sequence: u32,
}

impl InvoiceNumber {
    pub fn new(year: i32, sequence: u32) -> DomainResult<Self> {
        if sequence == 0 {
            return Err(DomainError::invalid_id("invoice sequence starts at 1"));
        }
        if !(1..=9999).contains(&year) {
            return Err(DomainError::invalid_id(format!(
                "invoice year out of range: {year}"
            )));
        }
        Ok(Self { year, sequence })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "INV-{}-{:03}", self.year, self.sequence)
    }
}

impl FromStr for InvoiceNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DomainError::invalid_id(format!("malformed invoice number: {s:?}"));

        let rest = s.trim().strip_prefix("INV-").ok_or_else(malformed)?;
        let (year, sequence) = rest.split_once('-').ok_or_else(malformed)?;
        if year.len() != 4 || sequence.len() < 3 {
            return Err(malformed());
        }
        let year: i32 = year.parse().map_err(|_| malformed())?;
        let sequence: u32 = sequence.parse().map_err(|_| malformed())?;

        Self::new(year, sequence)
    }
}

impl TryFrom<String> for InvoiceNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InvoiceNumber> for String {
    fn from(value: InvoiceNumber) -> Self {
        value.to_string()
    }
}
