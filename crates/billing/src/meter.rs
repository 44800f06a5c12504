//! Utility meter readings and the monthly reading sheet they are recorded on.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rentease_core::{AggregateId, DomainError, DomainResult, ValueObject};
use rentease_leasing::TenantId;

use crate::charge::{ChargeComponent, ChargeVariables, ComponentId, FormulaKind};
use crate::number::InvoiceNumber;
use crate::period::BillingPeriod;

/// Previous/current meter values and the unit rate applied to the difference.
///
/// Invariant: `current >= previous`, no negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawReading")]
pub struct MeterReading {
    previous: Decimal,
    current: Decimal,
    rate: Decimal,
}

#[derive(Deserialize)]
struct RawReading {
    previous: Decimal,
    current: Decimal,
    rate: Decimal,
}

impl TryFrom<RawReading> for MeterReading {
    type Error = DomainError;

    fn try_from(raw: RawReading) -> Result<Self, Self::Error> {
        MeterReading::new(raw.previous, raw.current, raw.rate)
    }
}

impl ValueObject for MeterReading {}

impl MeterReading {
    pub fn new(previous: Decimal, current: Decimal, rate: Decimal) -> DomainResult<Self> {
        if previous < Decimal::ZERO {
            return Err(DomainError::validation("previous reading cannot be negative"));
        }
        if current < previous {
            return Err(DomainError::validation(format!(
                "current reading {current} is below previous reading {previous}"
            )));
        }
        if rate < Decimal::ZERO {
            return Err(DomainError::validation("unit rate cannot be negative"));
        }
        Ok(Self {
            previous,
            current,
            rate,
        })
    }

    pub fn previous(&self) -> Decimal {
        self.previous
    }

    pub fn current(&self) -> Decimal {
        self.current
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// `current - previous`. Cannot overflow since `0 <= previous <= current`.
    pub fn consumption(&self) -> Decimal {
        self.current - self.previous
    }

    /// Unrounded `consumption * rate`.
    pub fn amount(&self) -> DomainResult<Decimal> {
        self.consumption().checked_mul(self.rate).ok_or_else(|| {
            DomainError::validation(format!(
                "metered charge overflows: {} units x {}",
                self.consumption(),
                self.rate
            ))
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterSheetId(pub AggregateId);

impl MeterSheetId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetStatus {
    Draft,
    Processed,
    Invoiced,
}

/// One tenant's readings for one month.
///
/// Lifecycle: `Draft` (editable) -> `Processed` (locked, billable) -> `Invoiced`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterSheet {
    id: MeterSheetId,
    tenant_id: TenantId,
    period: BillingPeriod,
    reading_date: NaiveDate,
    electricity: MeterReading,
    water: Option<MeterReading>,
    internet: Option<Decimal>,
    status: SheetStatus,
    invoice_number: Option<InvoiceNumber>,
}

/// Charge components and the readings they resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterCharges {
    pub components: Vec<ChargeComponent>,
    pub variables: ChargeVariables,
}

impl MeterSheet {
    pub fn draft(
        id: MeterSheetId,
        tenant_id: TenantId,
        period: BillingPeriod,
        reading_date: NaiveDate,
        electricity: MeterReading,
    ) -> Self {
        Self {
            id,
            tenant_id,
            period,
            reading_date,
            electricity,
            water: None,
            internet: None,
            status: SheetStatus::Draft,
            invoice_number: None,
        }
    }

    pub fn id(&self) -> MeterSheetId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn period(&self) -> BillingPeriod {
        self.period
    }

    pub fn reading_date(&self) -> NaiveDate {
        self.reading_date
    }

    pub fn electricity(&self) -> &MeterReading {
        &self.electricity
    }

    pub fn water(&self) -> Option<&MeterReading> {
        self.water.as_ref()
    }

    pub fn internet(&self) -> Option<Decimal> {
        self.internet
    }

    pub fn status(&self) -> SheetStatus {
        self.status
    }

    pub fn invoice_number(&self) -> Option<InvoiceNumber> {
        self.invoice_number
    }

    fn ensure_draft(&self) -> DomainResult<()> {
        if self.status != SheetStatus::Draft {
            return Err(DomainError::invariant(format!(
                "reading sheet is {:?} and can no longer be edited",
                self.status
            )));
        }
        Ok(())
    }

    pub fn record_electricity(&mut self, reading: MeterReading) -> DomainResult<()> {
        self.ensure_draft()?;
        self.electricity = reading;
        Ok(())
    }

    pub fn record_water(&mut self, reading: Option<MeterReading>) -> DomainResult<()> {
        self.ensure_draft()?;
        self.water = reading;
        Ok(())
    }

    pub fn record_internet(&mut self, amount: Option<Decimal>) -> DomainResult<()> {
        self.ensure_draft()?;
        if amount.is_some_and(|a| a < Decimal::ZERO) {
            return Err(DomainError::validation("internet charge cannot be negative"));
        }
        self.internet = amount;
        Ok(())
    }

    pub fn process(&mut self) -> DomainResult<()> {
        self.ensure_draft()?;
        self.status = SheetStatus::Processed;
        Ok(())
    }

    pub fn mark_invoiced(&mut self, number: InvoiceNumber) -> DomainResult<()> {
        match self.status {
            SheetStatus::Processed => {
                self.status = SheetStatus::Invoiced;
                self.invoice_number = Some(number);
                Ok(())
            }
            SheetStatus::Draft => Err(DomainError::invariant(
                "reading sheet must be processed before invoicing",
            )),
            SheetStatus::Invoiced => Err(DomainError::conflict(format!(
                "reading sheet already billed on {}",
                self.invoice_number
                    .map(|n| n.to_string())
                    .unwrap_or_default()
            ))),
        }
    }

    /// Utility charges for this sheet, numbered from `first_id` upward.
    pub fn charges(&self, first_id: u32) -> DomainResult<MeterCharges> {
        if self.status == SheetStatus::Draft {
            return Err(DomainError::invariant(
                "reading sheet must be processed before billing",
            ));
        }

        let mut next = first_id;
        let mut alloc = || {
            let id = ComponentId(next);
            next += 1;
            id
        };

        let mut components = Vec::new();
        let mut variables = ChargeVariables::new();

        let electricity_id = alloc();
        components.push(
            ChargeComponent::calculated(electricity_id, "Electricity", FormulaKind::MeteredConsumption)
                .with_description(format!(
                    "{} units x ${}/unit",
                    self.electricity.consumption().normalize(),
                    self.electricity.rate().normalize()
                )),
        );
        variables.bind(electricity_id, self.electricity);

        if let Some(water) = self.water {
            let water_id = alloc();
            components.push(
                ChargeComponent::calculated(water_id, "Water", FormulaKind::MeteredConsumption)
                    .with_description(format!(
                        "{} units x ${}/unit",
                        water.consumption().normalize(),
                        water.rate().normalize()
                    )),
            );
            variables.bind(water_id, water);
        }

        if let Some(internet) = self.internet {
            components.push(
                ChargeComponent::fixed(alloc(), "Internet", internet)
                    .with_description("Monthly internet charges"),
            );
        }

        Ok(MeterCharges {
            components,
            variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::resolve;
    use rust_decimal_macros::dec;

    fn sheet() -> MeterSheet {
        MeterSheet::draft(
            MeterSheetId::new(AggregateId::new()),
            TenantId::new(AggregateId::new()),
            BillingPeriod::new(2024, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            MeterReading::new(dec!(1000), dec!(1150), dec!(0.12)).unwrap(),
        )
    }

    #[test]
    fn consumption_and_amount() {
        let reading = MeterReading::new(dec!(1000), dec!(1150), dec!(0.12)).unwrap();
        assert_eq!(reading.consumption(), dec!(150));
        assert_eq!(reading.amount().unwrap(), dec!(18.00));
    }

    #[test]
    fn rejects_meter_running_backwards() {
        let err = MeterReading::new(dec!(1150), dec!(1000), dec!(0.12)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn deserialization_enforces_reading_invariant() {
        let bad = r#"{"previous":"10","current":"5","rate":"1"}"#;
        assert!(serde_json::from_str::<MeterReading>(bad).is_err());
    }

    #[test]
    fn processed_sheet_cannot_be_edited() {
        let mut sheet = sheet();
        sheet.process().unwrap();
        let err = sheet
            .record_internet(Some(dec!(60)))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn draft_sheet_cannot_be_billed() {
        assert!(sheet().charges(1).is_err());
    }

    #[test]
    fn processed_sheet_yields_resolvable_charges() {
        let mut sheet = sheet();
        sheet
            .record_water(Some(MeterReading::new(dec!(500), dec!(525), dec!(0.10)).unwrap()))
            .unwrap();
        sheet.record_internet(Some(dec!(60))).unwrap();
        sheet.process().unwrap();

        let charges = sheet.charges(2).unwrap();
        let ids: Vec<u32> = charges.components.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![2, 3, 4]);

        let amounts: Vec<Decimal> = charges
            .components
            .iter()
            .map(|c| resolve(c, &charges.variables).unwrap())
            .collect();
        assert_eq!(amounts, vec![dec!(18.00), dec!(2.50), dec!(60)]);
    }

    #[test]
    fn invoicing_requires_processing_and_happens_once() {
        let mut sheet = sheet();
        let number = InvoiceNumber::new(2024, 1).unwrap();
        assert!(sheet.mark_invoiced(number).is_err());

        sheet.process().unwrap();
        sheet.mark_invoiced(number).unwrap();
        assert_eq!(sheet.status(), SheetStatus::Invoiced);
        assert_eq!(sheet.invoice_number(), Some(number));

        assert!(matches!(
            sheet.mark_invoiced(number),
            Err(DomainError::Conflict(_))
        ));
    }
}
