//! Display conversion for wei amounts.
//!
//! Presentation only. Nothing here feeds back into a payment computation.

use alloy::primitives::utils::format_units;
use alloy::primitives::U256;

const ETHER_DECIMALS: u8 = 18;

/// Render `wei` in ether with exact decimal scaling and no trailing zeros
///
/// ```
/// use aetherloot::units::format_ether;
/// use alloy::primitives::U256;
///
/// assert_eq!(format_ether(U256::from(1_500_000_000_000_000u64)), "0.0015");
/// ```
#[must_use]
pub fn format_ether(wei: U256) -> String {
    let Ok(formatted) = format_units(wei, ETHER_DECIMALS) else {
        return format!("{wei} wei");
    };

    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        },
        None => formatted,
    }
}
