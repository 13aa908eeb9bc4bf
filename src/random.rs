/// Cryptographically secure random number generation
///
/// Used for the `version` message nonce (peer self-connect detection) and
/// the `ping` keep-alive nonce. Both only need unpredictability, not
/// secrecy, but there is no reason to reach for anything weaker than the
/// OS CSPRNG for either.
use crate::error::BitlabError;

/// Fill `buffer` with random bytes from the OS entropy source.
pub fn fill_random(buffer: &mut [u8]) -> Result<(), BitlabError> {
    getrandom::getrandom(buffer).map_err(|_| BitlabError::Random)
}

/// Generate a random `u64`, suitable for a `version` or `ping` nonce.
pub fn random_u64() -> Result<u64, BitlabError> {
    let mut bytes = [0u8; 8];
    fill_random(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}
