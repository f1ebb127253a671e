//! Exact base-unit / human-unit conversion.
//!
//! All value paths use `rust_decimal::Decimal`; binary floating point never
//! touches a balance or amount.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{Error, Result};

pub const BTC_DECIMALS: u32 = 8;
pub const ETH_DECIMALS: u32 = 18;
pub const BNB_DECIMALS: u32 = 18;

// Decimal mantissa is 96 bits; 10^28 is the largest representable power.
const MAX_SCALE: u32 = 28;

fn pow10(decimals: u32) -> Result<Decimal> {
    if decimals > MAX_SCALE {
        return Err(Error::InvalidNumeric(format!(
            "unsupported decimal scale: {decimals}"
        )));
    }
    Ok(Decimal::from_i128_with_scale(10i128.pow(decimals), 0))
}

/// Converts a base-unit amount (satoshi, wei, ...) into whole coins:
/// `value / 10^decimals`.
pub fn from_base_units(value: Decimal, decimals: u32) -> Result<Decimal> {
    Ok(value / pow10(decimals)?)
}

/// Converts a whole-coin amount into base units: `value * 10^decimals`.
pub fn to_base_units(value: Decimal, decimals: u32) -> Result<Decimal> {
    Ok(value * pow10(decimals)?)
}

/// Parses a provider-native numeric string and applies the decimal point.
/// Explorer APIs encode token amounts as base-unit integer strings.
pub fn from_base_str(raw: &str, decimals: u32) -> Result<Decimal> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|_| Error::InvalidNumeric(raw.to_string()))?;
    from_base_units(value, decimals)
}

pub fn satoshi_to_btc(satoshi: Decimal) -> Result<Decimal> {
    from_base_units(satoshi, BTC_DECIMALS)
}

pub fn btc_to_satoshi(btc: Decimal) -> Result<Decimal> {
    to_base_units(btc, BTC_DECIMALS)
}

pub fn wei_to_eth(wei: Decimal) -> Result<Decimal> {
    from_base_units(wei, ETH_DECIMALS)
}

pub fn eth_to_wei(eth: Decimal) -> Result<Decimal> {
    to_base_units(eth, ETH_DECIMALS)
}

pub fn bsc_base_to_bnb(base: Decimal) -> Result<Decimal> {
    from_base_units(base, BNB_DECIMALS)
}

pub fn bnb_to_bsc_base(bnb: Decimal) -> Result<Decimal> {
    to_base_units(bnb, BNB_DECIMALS)
}
