//! Secret values in transit.
//!
//! Nothing here persists a secret. A rotated password only exists between the
//! UAA password change and the CircleCI environment variable write.

pub mod types;

pub use types::SecretString;

use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes in a generated password (160 bits).
pub const PASSWORD_BYTES: usize = 20;

/// Generate a new CI user password.
///
/// Draws [`PASSWORD_BYTES`] from the operating system CSPRNG and renders them
/// as lowercase hex, so the result is always `2 * PASSWORD_BYTES` characters.
pub fn generate_password() -> SecretString {
    let mut buf = [0u8; PASSWORD_BYTES];
    OsRng.fill_bytes(&mut buf);
    let encoded = hex::encode(buf);
    zeroize::Zeroize::zeroize(&mut buf);
    SecretString::new(encoded)
}
