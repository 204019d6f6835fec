//! Currency conversion between USD, BRL and Guarani, pivoting through USD.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::{FreightError, FreightResult};

/// Currencies a quote can be denominated in
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
    TS,
)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Currency {
    Usd,
    Brl,
    /// Paraguayan Guarani
    Gs,
}

impl Currency {
    /// Parse a currency code, reporting unknown codes as a conversion error.
    pub fn parse_code(code: &str) -> FreightResult<Self> {
        Currency::from_str(code.trim())
            .map_err(|_| FreightError::CurrencyConversion(format!("unsupported currency '{code}'")))
    }
}

/// USD→BRL and USD→Guarani scalars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRates {
    pub usd_to_brl: f64,
    pub usd_to_gs: f64,
}

impl ExchangeRates {
    /// Used when no rate was ever fetched or stored
    pub const DEFAULT: ExchangeRates = ExchangeRates {
        usd_to_brl: 5.40,
        usd_to_gs: 7500.0,
    };

    /// Build a rate pair, rejecting zero, negative and non-finite scalars.
    pub fn new(usd_to_brl: f64, usd_to_gs: f64) -> FreightResult<Self> {
        let rates = Self {
            usd_to_brl,
            usd_to_gs,
        };
        if rates.is_valid() {
            Ok(rates)
        } else {
            Err(FreightError::Validation(format!(
                "exchange rates must be positive numbers (USD→BRL {usd_to_brl}, USD→GS {usd_to_gs})"
            )))
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.usd_to_brl, self.usd_to_gs]
            .iter()
            .all(|rate| rate.is_finite() && *rate > 0.0)
    }

    /// Units of `currency` per one USD
    pub fn per_usd(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Usd => 1.0,
            Currency::Brl => self.usd_to_brl,
            Currency::Gs => self.usd_to_gs,
        }
    }
}

impl Default for ExchangeRates {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Convert `amount` from one currency to another. No rounding is applied.
pub fn convert(
    amount: f64,
    from: Currency,
    to: Currency,
    rates: &ExchangeRates,
) -> FreightResult<f64> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(FreightError::CurrencyConversion(format!(
            "amount must be a non-negative finite number, got {amount}"
        )));
    }
    if from == to {
        return Ok(amount);
    }
    if !rates.is_valid() {
        return Err(FreightError::CurrencyConversion(format!(
            "invalid exchange rates {rates:?}"
        )));
    }

    let usd = amount / rates.per_usd(from);
    Ok(usd * rates.per_usd(to))
}

/// [`convert`] with currency codes given as text (e.g. "BRL", "gs").
pub fn convert_codes(amount: f64, from: &str, to: &str, rates: &ExchangeRates) -> FreightResult<f64> {
    convert(amount, Currency::parse_code(from)?, Currency::parse_code(to)?, rates)
}

/// Shorthand for converting a fee into the settlement currency.
pub fn to_usd(amount: f64, from: Currency, rates: &ExchangeRates) -> FreightResult<f64> {
    convert(amount, from, Currency::Usd, rates)
}
