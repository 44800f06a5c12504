//! Charge components and the resolver that turns them into money.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use rentease_core::{DomainError, DomainResult};

use crate::meter::MeterReading;

/// Position of a component within one invoice draft.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u32);

impl core::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Supported calculated-charge formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    /// `(currentReading - previousReading) * unitRate`
    MeteredConsumption,
}

impl FormulaKind {
    pub fn expression(&self) -> &'static str {
        match self {
            FormulaKind::MeteredConsumption => "(currentReading - previousReading) * unitRate",
        }
    }

    /// Unrounded result for `reading`. Overflow is a validation error.
    pub fn evaluate(&self, reading: &MeterReading) -> DomainResult<Decimal> {
        match self {
            FormulaKind::MeteredConsumption => reading.amount(),
        }
    }
}

impl core::fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.expression())
    }
}

impl FromStr for FormulaKind {
    type Err = DomainError;

    /// Whitespace-insensitive; the product may be written in either order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "(currentReading-previousReading)*unitRate"
            | "unitRate*(currentReading-previousReading)" => Ok(FormulaKind::MeteredConsumption),
            _ => Err(DomainError::unsupported_formula(s.trim())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "formula")]
pub enum ChargeKind {
    Fixed,
    Variable,
    Calculated(FormulaKind),
}

/// What to do with a calculated component whose formula is not supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaFallback {
    /// Surface `UnsupportedFormula`.
    #[default]
    Reject,
    /// Bill the component's stored amount as a variable charge.
    StoredAmount,
}

/// A named invoice line item before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeComponent {
    pub id: ComponentId,
    pub name: String,
    pub kind: ChargeKind,
    pub amount: Option<Decimal>,
    pub description: String,
}

impl ChargeComponent {
    pub fn fixed(id: ComponentId, name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ChargeKind::Fixed,
            amount: Some(amount),
            description: String::new(),
        }
    }

    pub fn variable(id: ComponentId, name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ChargeKind::Variable,
            amount: Some(amount),
            description: String::new(),
        }
    }

    pub fn calculated(id: ComponentId, name: impl Into<String>, formula: FormulaKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ChargeKind::Calculated(formula),
            amount: None,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builds a calculated component from a free-text formula.
    ///
    /// Unsupported formulas follow `fallback`; with `StoredAmount` the component is
    /// billed as a variable charge of `stored_amount`.
    pub fn from_expression(
        id: ComponentId,
        name: impl Into<String>,
        expression: &str,
        stored_amount: Option<Decimal>,
        fallback: FormulaFallback,
    ) -> DomainResult<Self> {
        let name = name.into();
        match expression.parse::<FormulaKind>() {
            Ok(formula) => {
                let mut component = Self::calculated(id, name, formula);
                component.amount = stored_amount;
                Ok(component)
            }
            Err(err) => match (fallback, stored_amount) {
                (FormulaFallback::Reject, _) => Err(err),
                (FormulaFallback::StoredAmount, Some(amount)) => {
                    tracing::warn!(
                        component = %id,
                        name = %name,
                        formula = expression,
                        "unsupported formula, billing stored amount"
                    );
                    Ok(Self::variable(id, name, amount))
                }
                (FormulaFallback::StoredAmount, None) => Err(DomainError::validation(format!(
                    "component {name:?} has an unsupported formula and no stored amount"
                ))),
            },
        }
    }

    /// Structural checks that do not need meter readings.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "component {} has no name",
                self.id
            )));
        }
        match (self.kind, self.amount) {
            (ChargeKind::Fixed | ChargeKind::Variable, None) => Err(DomainError::validation(
                format!("component {:?} requires an amount", self.name),
            )),
            (_, Some(amount)) if amount < Decimal::ZERO => Err(DomainError::validation(format!(
                "component {:?} has a negative amount",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

/// The meter readings calculated components are evaluated against.
///
/// A reading bound to a component id wins over the default reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeVariables {
    default: Option<MeterReading>,
    bound: BTreeMap<ComponentId, MeterReading>,
}

impl ChargeVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single reading shared by every calculated component.
    pub fn from_reading(reading: MeterReading) -> Self {
        Self {
            default: Some(reading),
            bound: BTreeMap::new(),
        }
    }

    pub fn bind(&mut self, component: ComponentId, reading: MeterReading) -> &mut Self {
        self.bound.insert(component, reading);
        self
    }

    pub fn reading_for(&self, component: ComponentId) -> Option<&MeterReading> {
        self.bound.get(&component).or(self.default.as_ref())
    }
}

/// Rounds to whole cents, halves away from zero.
pub fn round_to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Resolves one component to its billed amount, rounded to cents.
pub fn resolve(component: &ChargeComponent, variables: &ChargeVariables) -> DomainResult<Decimal> {
    component.validate()?;

    let raw = match component.kind {
        ChargeKind::Fixed | ChargeKind::Variable => component
            .amount
            .ok_or_else(|| DomainError::validation("component amount missing"))?,
        ChargeKind::Calculated(formula) => {
            let reading = variables.reading_for(component.id).ok_or_else(|| {
                DomainError::validation(format!(
                    "no meter reading for calculated component {:?}",
                    component.name
                ))
            })?;
            formula.evaluate(reading)?
        }
    };

    let amount = round_to_cents(raw);
    tracing::debug!(component = %component.id, name = %component.name, %amount, "resolved charge");
    Ok(amount)
}
