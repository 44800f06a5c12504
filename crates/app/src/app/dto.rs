//! Inputs to the application operations.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rentease_billing::{
    BillingPeriod, ChargeComponent, ChargeVariables, ComponentId, FormulaFallback, InvoiceStatus,
    MeterReading, PaymentMethod,
};
use rentease_core::DomainResult;
use rentease_infra::projections::InvoiceView;
use rentease_leasing::{ContactInfo, PropertyId, PropertyKind, TenancyStatus, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProperty {
    pub name: String,
    pub address: String,
    pub kind: PropertyKind,
    pub total_units: u32,
}

/// `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChanges {
    pub name: Option<String>,
    pub address: Option<String>,
    pub kind: Option<PropertyKind>,
    pub total_units: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTenant {
    pub name: String,
    pub contact: ContactInfo,
    pub property_id: PropertyId,
    pub unit: String,
    pub rent_amount: Decimal,
    pub lease_start: NaiveDate,
    pub lease_end: NaiveDate,
    pub status: TenancyStatus,
}

/// One line of an invoice as entered on the invoice form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChargeInput {
    Fixed {
        name: String,
        amount: Decimal,
    },
    Variable {
        name: String,
        amount: Decimal,
    },
    /// Free-text formula, e.g. `(currentReading - previousReading) * unitRate`.
    Formula {
        name: String,
        expression: String,
        stored_amount: Option<Decimal>,
        /// Reading for this line only; otherwise the request's default reading applies.
        reading: Option<MeterReading>,
    },
}

impl ChargeInput {
    pub fn fixed(name: impl Into<String>, amount: Decimal) -> Self {
        Self::Fixed {
            name: name.into(),
            amount,
        }
    }

    pub fn variable(name: impl Into<String>, amount: Decimal) -> Self {
        Self::Variable {
            name: name.into(),
            amount,
        }
    }

    pub fn formula(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::Formula {
            name: name.into(),
            expression: expression.into(),
            stored_amount: None,
            reading: None,
        }
    }

    fn into_component(
        self,
        id: ComponentId,
        fallback: FormulaFallback,
        variables: &mut ChargeVariables,
    ) -> DomainResult<ChargeComponent> {
        match self {
            ChargeInput::Fixed { name, amount } => Ok(ChargeComponent::fixed(id, name, amount)),
            ChargeInput::Variable { name, amount } => {
                Ok(ChargeComponent::variable(id, name, amount))
            }
            ChargeInput::Formula {
                name,
                expression,
                stored_amount,
                reading,
            } => {
                if let Some(reading) = reading {
                    variables.bind(id, reading);
                }
                ChargeComponent::from_expression(id, name, &expression, stored_amount, fallback)
            }
        }
    }
}

/// Numbers the lines from `first_id` and collects the readings they resolve against.
pub(crate) fn components_from_inputs(
    inputs: Vec<ChargeInput>,
    first_id: u32,
    default_reading: Option<MeterReading>,
    fallback: FormulaFallback,
) -> DomainResult<(Vec<ChargeComponent>, ChargeVariables)> {
    let mut variables = default_reading
        .map(ChargeVariables::from_reading)
        .unwrap_or_default();
    let components = inputs
        .into_iter()
        .zip(first_id..)
        .map(|(input, id)| input.into_component(ComponentId(id), fallback, &mut variables))
        .collect::<DomainResult<Vec<_>>>()?;
    Ok((components, variables))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub period: BillingPeriod,
    /// Defaults to today.
    pub issue_date: Option<NaiveDate>,
    /// Defaults to the issue date plus the configured number of days.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Prepends a fixed "Base Rent" line with the tenant's rent amount.
    pub include_base_rent: bool,
    pub charges: Vec<ChargeInput>,
    /// Default reading for formula lines without their own.
    pub reading: Option<MeterReading>,
}

impl CreateInvoiceRequest {
    pub fn new(period: BillingPeriod) -> Self {
        Self {
            period,
            issue_date: None,
            due_date: None,
            include_base_rent: false,
            charges: Vec::new(),
            reading: None,
        }
    }

    pub fn issued_on(mut self, date: NaiveDate) -> Self {
        self.issue_date = Some(date);
        self
    }

    pub fn due_on(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn with_base_rent(mut self) -> Self {
        self.include_base_rent = true;
        self
    }

    pub fn with_charge(mut self, charge: ChargeInput) -> Self {
        self.charges.push(charge);
        self
    }

    pub fn with_reading(mut self, reading: MeterReading) -> Self {
        self.reading = Some(reading);
        self
    }
}

/// A payment as reported by the landlord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub amount: Decimal,
    pub paid_date: NaiveDate,
    pub method: PaymentMethod,
    /// Transaction id, when the method has one.
    #[serde(default)]
    pub reference: Option<String>,
}

impl RecordPayment {
    pub fn new(amount: Decimal, paid_date: NaiveDate, method: PaymentMethod) -> Self {
        Self {
            amount,
            paid_date,
            method,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Invoice list filters. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFilter {
    /// Compared with the status derived for today.
    pub status: Option<InvoiceStatus>,
    pub tenant_id: Option<TenantId>,
    /// Case-insensitive match on invoice number or tenant name.
    pub search: Option<String>,
}

impl InvoiceFilter {
    pub(crate) fn matches(
        &self,
        invoice: &InvoiceView,
        tenant_name: Option<&str>,
        today: NaiveDate,
    ) -> bool {
        let search_ok = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(q) => {
                let q = q.to_lowercase();
                invoice.number.to_string().to_lowercase().contains(&q)
                    || tenant_name.is_some_and(|n| n.to_lowercase().contains(&q))
            }
        };
        search_ok
            && self.tenant_id.is_none_or(|t| t == invoice.tenant_id)
            && self.status.is_none_or(|s| s == invoice.status_on(today))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMeterSheet {
    pub tenant_id: TenantId,
    pub period: BillingPeriod,
    pub reading_date: NaiveDate,
    pub electricity: MeterReading,
    pub water: Option<MeterReading>,
    pub internet: Option<Decimal>,
}

/// Edits to a draft sheet. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterSheetChanges {
    pub electricity: Option<MeterReading>,
    pub water: Option<MeterReading>,
    pub internet: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentease_billing::resolve;
    use rentease_core::DomainError;
    use rust_decimal_macros::dec;

    fn reading(prev: Decimal, cur: Decimal, rate: Decimal) -> MeterReading {
        MeterReading::new(prev, cur, rate).unwrap()
    }

    #[test]
    fn lines_are_numbered_and_bound_to_their_readings() {
        let inputs = vec![
            ChargeInput::fixed("Base Rent", dec!(1200)),
            ChargeInput::formula("Electricity", "(currentReading - previousReading) * unitRate"),
            ChargeInput::Formula {
                name: "Water".to_string(),
                expression: "unitRate * (currentReading - previousReading)".to_string(),
                stored_amount: None,
                reading: Some(reading(dec!(500), dec!(525), dec!(0.10))),
            },
        ];
        let (components, vars) = components_from_inputs(
            inputs,
            1,
            Some(reading(dec!(1000), dec!(1150), dec!(0.12))),
            FormulaFallback::Reject,
        )
        .unwrap();

        let ids: Vec<u32> = components.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(resolve(&components[1], &vars).unwrap(), dec!(18.00));
        assert_eq!(resolve(&components[2], &vars).unwrap(), dec!(2.50));
    }

    #[test]
    fn unsupported_formula_follows_fallback() {
        let line = || ChargeInput::Formula {
            name: "Gas".to_string(),
            expression: "currentReading * 2".to_string(),
            stored_amount: Some(dec!(40)),
            reading: None,
        };

        let err = components_from_inputs(vec![line()], 1, None, FormulaFallback::Reject).unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedFormula(_)));

        let (components, vars) =
            components_from_inputs(vec![line()], 1, None, FormulaFallback::StoredAmount).unwrap();
        assert_eq!(resolve(&components[0], &vars).unwrap(), dec!(40));
    }
}
