//! Coin and decimal-coin parsing, and gas-price fee computation.

use std::fmt;

use crate::error::{SdkError, SdkResult};

/// Fractional digits carried by `DecCoin` amounts.
pub const DEC_PRECISION: u32 = 18;

const DEC_SCALE: u128 = 10u128.pow(DEC_PRECISION);

/// An integer amount of a denomination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn to_proto(&self) -> cosmrs::proto::cosmos::base::v1beta1::Coin {
        cosmrs::proto::cosmos::base::v1beta1::Coin {
            denom: self.denom.clone(),
            amount: self.amount.to_string(),
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// A decimal amount of a denomination, stored as a fixed-point integer
/// with 18 fractional digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecCoin {
    pub denom: String,
    /// Amount × 10^18.
    pub scaled: u128,
}

impl fmt::Display for DecCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.scaled / DEC_SCALE;
        let frac = self.scaled % DEC_SCALE;
        if frac == 0 {
            return write!(f, "{}{}", int, self.denom);
        }
        let digits = format!("{:018}", frac);
        write!(f, "{}.{}{}", int, digits.trim_end_matches('0'), self.denom)
    }
}

/// Parse `"100uatom,5stake"`. An empty string is an empty list.
pub fn parse_coins(s: &str) -> SdkResult<Vec<Coin>> {
    split_list(s)
        .map(|item| {
            let (amount, denom) = split_amount(item)?;
            if amount.contains('.') {
                return Err(SdkError::InvalidFee(format!("'{}': coin amount must be an integer", item)));
            }
            let amount = amount
                .parse::<u128>()
                .map_err(|e| SdkError::InvalidFee(format!("'{}': {}", item, e)))?;
            Ok(Coin::new(amount, denom))
        })
        .collect()
}

/// Parse `"0.025uatom"` (up to 18 fractional digits).
pub fn parse_dec_coins(s: &str) -> SdkResult<Vec<DecCoin>> {
    split_list(s)
        .map(|item| {
            let (amount, denom) = split_amount(item)?;
            Ok(DecCoin {
                denom: denom.to_string(),
                scaled: parse_decimal(amount).map_err(|msg| SdkError::InvalidFee(format!("'{}': {}", item, msg)))?,
            })
        })
        .collect()
}

/// Fee for `gas` units at `prices`: `ceil(price × gas)` per denomination.
pub fn fee_from_gas_prices(prices: &[DecCoin], gas: u64) -> SdkResult<Vec<Coin>> {
    prices
        .iter()
        .map(|price| {
            let product = price
                .scaled
                .checked_mul(gas as u128)
                .ok_or_else(|| SdkError::InvalidFee(format!("fee overflow for {}", price)))?;
            let amount = product / DEC_SCALE + u128::from(product % DEC_SCALE != 0);
            Ok(Coin::new(amount, price.denom.clone()))
        })
        .collect()
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn split_amount(item: &str) -> SdkResult<(&str, &str)> {
    let idx = item
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| SdkError::InvalidFee(format!("'{}': missing denomination", item)))?;
    let (amount, denom) = item.split_at(idx);
    if amount.is_empty() {
        return Err(SdkError::InvalidFee(format!("'{}': missing amount", item)));
    }
    validate_denom(denom).map_err(|msg| SdkError::InvalidFee(format!("'{}': {}", item, msg)))?;
    Ok((amount, denom))
}

fn validate_denom(denom: &str) -> Result<(), String> {
    let mut chars = denom.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(format!("invalid denomination '{}'", denom)),
    }
    if denom.len() < 3 || denom.len() > 128 {
        return Err(format!("denomination '{}' must be 3-128 characters", denom));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-')) {
        return Err(format!("invalid denomination '{}'", denom));
    }
    Ok(())
}

fn parse_decimal(s: &str) -> Result<u128, String> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err("empty amount".into());
    }
    if frac_part.len() > DEC_PRECISION as usize {
        return Err(format!("more than {} decimal places", DEC_PRECISION));
    }
    if frac_part.contains('.') {
        return Err("multiple decimal points".into());
    }

    let int: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|e| format!("{}", e))?
    };
    let frac: u128 = if frac_part.is_empty() {
        0
    } else {
        let padded = format!("{:0<18}", frac_part);
        padded.parse().map_err(|e| format!("{}", e))?
    };

    int.checked_mul(DEC_SCALE)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| "amount overflow".to_string())
}
