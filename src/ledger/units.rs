//! Decimal <-> base-unit conversion for the ledger contract
//!
//! The contract stores amounts as `uint256` with 18 implied decimals.
//! Conversion goes through the decimal mantissa, never through floats.

use ethers::types::U256;
use rust_decimal::Decimal;

use super::LedgerError;

pub const LEDGER_DECIMALS: u32 = 18;

/// `1.5` -> `1_500_000_000_000_000_000`
pub fn to_base_units(amount: Decimal) -> Result<U256, LedgerError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::Conversion(format!("negative amount {}", amount)));
    }

    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > LEDGER_DECIMALS {
        return Err(LedgerError::Conversion(format!(
            "{} has more than {} decimal places",
            amount, LEDGER_DECIMALS
        )));
    }

    let mantissa = amount.mantissa().unsigned_abs();
    Ok(U256::from(mantissa) * U256::exp10((LEDGER_DECIMALS - scale) as usize))
}

/// Inverse of `to_base_units`. Trailing zeros are folded into the scale
/// first, so large whole amounts still fit a `Decimal` mantissa.
pub fn from_base_units(units: U256) -> Result<Decimal, LedgerError> {
    let out_of_range = || LedgerError::Conversion(format!("{} base units out of range", units));

    let ten = U256::from(10u8);
    let mut mantissa = units;
    let mut scale = LEDGER_DECIMALS;
    while scale > 0 && !mantissa.is_zero() && (mantissa % ten).is_zero() {
        mantissa /= ten;
        scale -= 1;
    }

    if mantissa > U256::from(i128::MAX as u128) {
        return Err(out_of_range());
    }
    let raw = mantissa.as_u128() as i128;

    Decimal::try_from_i128_with_scale(raw, scale)
        .map(|d| d.normalize())
        .map_err(|_| out_of_range())
}
