/// ABI calldata decoding for DeFi entry points
///
/// Pool entry points take `(address asset, uint256 amount, ...)`. Gateway
/// entry points take `(address pool, uint256 amount, ...)` and move the
/// wrapped native token, except `depositETH` whose amount is the call value.
/// The wrapped native token's own `deposit()` and `withdraw(uint256)` share
/// names with the pool and are told apart by argument length. Token-in
/// router swaps take `(uint256, uint256, address[] path, ...)` and spend
/// `path[0]`.

use alloy_primitives::U256;

use super::{address_at, decode_hex, word, word_address, ParseError};
use crate::core::constants::DECODABLE_DEFI_FUNCTIONS;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    pub asset: String,
    pub amount: U256,
}

pub fn is_decodable(function_name: &str) -> bool {
    DECODABLE_DEFI_FUNCTIONS.contains(&function_name)
}

/// Recover `(asset, amount)` from a lending call.
///
/// `input` is the full calldata including the 4-byte selector; `value` is
/// the transaction value in wei; `wrapped_native` is the token the gateway
/// functions operate on.
pub fn decode_defi_call(
    function_name: &str,
    input: &str,
    value: U256,
    wrapped_native: &str,
) -> Result<DecodedCall, ParseError> {
    if !is_decodable(function_name) {
        return Err(ParseError::UnsupportedFunction(function_name.to_string()));
    }

    let calldata = decode_hex("input", input)?;
    if calldata.len() < 4 {
        return Err(ParseError::ShortData {
            expected: 4,
            found: calldata.len(),
        });
    }
    let args = &calldata[4..];

    match function_name {
        "swapExactTokensForTokens" | "swapExactTokensForETH" => return swap_input(args, 0),
        "swapTokensForExactTokens" | "swapTokensForExactETH" => return swap_input(args, 1),
        // wrap: deposit() carries its amount as the call value
        "deposit" if args.is_empty() => {
            return Ok(DecodedCall {
                asset: wrapped_native.to_ascii_lowercase(),
                amount: value,
            })
        }
        // unwrap: withdraw(uint256)
        "withdraw" if args.len() == 32 => {
            return Ok(DecodedCall {
                asset: wrapped_native.to_ascii_lowercase(),
                amount: word(args, 0)?,
            })
        }
        _ => {}
    }

    if function_name.ends_with("ETH") {
        let amount = if function_name == "depositETH" {
            value
        } else {
            word(args, 1)?
        };
        return Ok(DecodedCall {
            asset: wrapped_native.to_ascii_lowercase(),
            amount,
        });
    }

    Ok(DecodedCall {
        asset: address_at(args, 0)?,
        amount: word(args, 1)?,
    })
}

/// Input token and amount of a V2 router swap; `amount_index` is 0 for
/// exact-input swaps and 1 (`amountInMax`) for exact-output swaps
fn swap_input(args: &[u8], amount_index: usize) -> Result<DecodedCall, ParseError> {
    let amount = word(args, amount_index)?;
    let offset = usize::try_from(word(args, 2)?).unwrap_or(usize::MAX);
    // path length word, then path[0]
    let start = offset.saturating_add(32);
    let end = start.saturating_add(32);
    if args.len() < end {
        return Err(ParseError::ShortData {
            expected: end,
            found: args.len(),
        });
    }
    Ok(DecodedCall {
        asset: word_address(&args[start..end]),
        amount,
    })
}
