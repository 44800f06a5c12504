//! Billing configuration read from the environment.
//!
//! | variable | values | default |
//! |---|---|---|
//! | `RENTEASE_DUE_IN_DAYS` | days between issue and due date | `15` |
//! | `RENTEASE_PAYMENT_POLICY` | `accept_any`, `require_exact`, `reject_overpayment` | `accept_any` |
//! | `RENTEASE_FORMULA_FALLBACK` | `reject`, `stored_amount` | `reject` |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rentease_billing::{FormulaFallback, PaymentPolicy};

pub const DUE_IN_DAYS_VAR: &str = "RENTEASE_DUE_IN_DAYS";
pub const PAYMENT_POLICY_VAR: &str = "RENTEASE_PAYMENT_POLICY";
pub const FORMULA_FALLBACK_VAR: &str = "RENTEASE_FORMULA_FALLBACK";

const MAX_DUE_IN_DAYS: u32 = 365;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?} (expected {expected})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingConfig {
    pub due_in_days: u32,
    pub payment_policy: PaymentPolicy,
    pub formula_fallback: FormulaFallback,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            due_in_days: 15,
            payment_policy: PaymentPolicy::AcceptAny,
            formula_fallback: FormulaFallback::Reject,
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`BillingConfig::from_env`] with an arbitrary variable source.
    /// Unset or blank variables keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get(DUE_IN_DAYS_VAR) {
            config.due_in_days = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|d| *d <= MAX_DUE_IN_DAYS)
                .ok_or_else(|| ConfigError::Invalid {
                    var: DUE_IN_DAYS_VAR,
                    value: raw.clone(),
                    expected: "a whole number of days between 0 and 365",
                })?;
        }

        if let Some(raw) = get(PAYMENT_POLICY_VAR) {
            config.payment_policy = match raw.trim().to_ascii_lowercase().as_str() {
                "accept_any" => PaymentPolicy::AcceptAny,
                "require_exact" => PaymentPolicy::RequireExact,
                "reject_overpayment" => PaymentPolicy::RejectOverpayment,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: PAYMENT_POLICY_VAR,
                        value: raw,
                        expected: "accept_any, require_exact or reject_overpayment",
                    });
                }
            };
        }

        if let Some(raw) = get(FORMULA_FALLBACK_VAR) {
            config.formula_fallback = match raw.trim().to_ascii_lowercase().as_str() {
                "reject" => FormulaFallback::Reject,
                "stored_amount" => FormulaFallback::StoredAmount,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: FORMULA_FALLBACK_VAR,
                        value: raw,
                        expected: "reject or stored_amount",
                    });
                }
            };
        }

        Ok(config)
    }
}
