//! Fixed-length base58 encoding of counter values.

use crate::error::CoreError;

/// The Bitcoin base58 alphabet, which is also the default alphabet of `bs58`.
///
/// It omits the visually ambiguous `0`, `O`, `I` and `l`. Its symbols are in
/// ASCII order, so codes of the same length sort the same way as their ids.
pub const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// The alphabet's zero digit, used for left padding.
pub const ZERO: char = '1';

/// Length of generated short codes unless configured otherwise.
pub const DEFAULT_CODE_LENGTH: usize = 7;

/// Encodes `id` as exactly `length` base58 symbols, most significant first.
///
/// Shorter encodings are left-padded with [`ZERO`], so `generate(0, 7)` is
/// `"1111111"`. The mapping is injective for every `id < 58^length`. Larger
/// ids lose their higher-order digits; callers pick a `length` that covers
/// the ids they expect to issue.
///
/// # Examples
///
/// ```
/// use burrow_core::base58::generate;
///
/// assert_eq!(generate(0, 7), "1111111");
/// assert_eq!(generate(57, 7), "111111z");
/// assert_eq!(generate(58, 7), "1111121");
/// ```
pub fn generate(id: u64, length: usize) -> String {
    // bs58 turns every leading zero byte into a ZERO symbol, so stripping them
    // leaves the plain positional digits of `id`.
    let encoded = bs58::encode(id.to_be_bytes()).into_string();
    let digits = encoded.trim_start_matches(ZERO);

    if digits.len() >= length {
        return digits[digits.len() - length..].to_string();
    }

    let mut code = ZERO.to_string().repeat(length - digits.len());
    code.push_str(digits);
    code
}

/// Recovers the id a code was generated from.
///
/// Padding symbols decode to zero digits, so `decode(&generate(id, n)) == id`
/// whenever `id < 58^n`.
pub fn decode(code: &str) -> Result<u64, CoreError> {
    let bytes = bs58::decode(code).into_vec().map_err(|e| {
        CoreError::InvalidShortCode(format!("'{}' is not a base58 code: {e}", code))
    })?;

    bytes
        .iter()
        .try_fold(0_u64, |acc, &byte| {
            acc.checked_mul(256)?.checked_add(u64::from(byte))
        })
        .ok_or_else(|| CoreError::InvalidShortCode(format!("'{}' exceeds 64 bits", code)))
}
