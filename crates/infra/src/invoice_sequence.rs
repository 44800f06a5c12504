//! Per-portfolio, per-year invoice number allocation.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use rentease_billing::InvoiceNumber;
use rentease_core::{DomainError, PortfolioId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("invoice sequence for {year} is exhausted")]
    Exhausted { year: i32 },

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("invoice sequence lock poisoned")]
    Poisoned,
}

/// Hands out `INV-{year}-{seq}` numbers.
///
/// Sequences are strictly increasing per `(portfolio, year)` and never reused, even
/// when the invoice that consumed a number is voided or never issued.
#[derive(Debug, Default)]
pub struct InvoiceSequence {
    last: Mutex<HashMap<(PortfolioId, i32), u32>>,
}

impl InvoiceSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, portfolio_id: PortfolioId, year: i32) -> Result<InvoiceNumber, SequenceError> {
        let mut last = self.last.lock().map_err(|_| SequenceError::Poisoned)?;
        let slot = last.entry((portfolio_id, year)).or_insert(0);
        let next = slot.checked_add(1).ok_or(SequenceError::Exhausted { year })?;
        let number = InvoiceNumber::new(year, next)?;
        *slot = next;
        Ok(number)
    }

    /// Moves the sequence past `number` if it is behind (after a rebuild, for example).
    pub fn observe(&self, portfolio_id: PortfolioId, number: InvoiceNumber) -> Result<(), SequenceError> {
        let mut last = self.last.lock().map_err(|_| SequenceError::Poisoned)?;
        let slot = last.entry((portfolio_id, number.year())).or_insert(0);
        *slot = (*slot).max(number.sequence());
        Ok(())
    }

    pub fn last_allocated(&self, portfolio_id: PortfolioId, year: i32) -> u32 {
        self.last
            .lock()
            .ok()
            .and_then(|l| l.get(&(portfolio_id, year)).copied())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_numbers_of_a_year() {
        let seq = InvoiceSequence::new();
        let p = PortfolioId::new();
        assert_eq!(seq.allocate(p, 2024).unwrap().to_string(), "INV-2024-001");
        assert_eq!(seq.allocate(p, 2024).unwrap().to_string(), "INV-2024-002");
    }

    #[test]
    fn each_year_starts_over() {
        let seq = InvoiceSequence::new();
        let p = PortfolioId::new();
        seq.allocate(p, 2023).unwrap();
        seq.allocate(p, 2023).unwrap();
        assert_eq!(seq.allocate(p, 2024).unwrap().to_string(), "INV-2024-001");
        assert_eq!(seq.allocate(p, 2023).unwrap().to_string(), "INV-2023-003");
    }

    #[test]
    fn portfolios_have_independent_sequences() {
        let seq = InvoiceSequence::new();
        let (a, b) = (PortfolioId::new(), PortfolioId::new());
        seq.allocate(a, 2024).unwrap();
        assert_eq!(seq.allocate(b, 2024).unwrap().sequence(), 1);
    }

    #[test]
    fn observe_never_moves_backwards() {
        let seq = InvoiceSequence::new();
        let p = PortfolioId::new();
        seq.observe(p, InvoiceNumber::new(2024, 7).unwrap()).unwrap();
        seq.observe(p, InvoiceNumber::new(2024, 3).unwrap()).unwrap();
        assert_eq!(seq.last_allocated(p, 2024), 7);
        assert_eq!(seq.allocate(p, 2024).unwrap().sequence(), 8);
    }

    proptest! {
        #[test]
        fn allocations_are_strictly_increasing_per_year(years in prop::collection::vec(2020i32..2026, 1..60)) {
            let seq = InvoiceSequence::new();
            let p = PortfolioId::new();
            let mut last: HashMap<i32, InvoiceNumber> = HashMap::new();

            for year in years {
                let n = seq.allocate(p, year).unwrap();
                prop_assert_eq!(n.year(), year);
                if let Some(prev) = last.get(&year) {
                    prop_assert!(n > *prev);
                    prop_assert_eq!(n.sequence(), prev.sequence() + 1);
                } else {
                    prop_assert_eq!(n.sequence(), 1);
                }
                last.insert(year, n);
            }
        }
    }
}
