//! Randomness for key generation, fresh epoch secrets and reuse guards.
//!
//! A failing entropy source surfaces as [`Error::EntropyUnavailable`].

use rand_core::{CryptoRng, OsRng, RngCore};

use crate::mls::crypto::Secret;
use crate::mls::utilities::error::{Error, Result};

#[inline]
pub(crate) fn get_rng() -> impl RngCore + CryptoRng {
    OsRng
}

fn fill_from(rng: &mut impl RngCore, dest: &mut [u8]) -> Result<()> {
    rng.try_fill_bytes(dest).map_err(Error::from)
}

/// Reuse guard of a [`PrivateMessage`](crate::mls::framing::PrivateMessage)
#[inline]
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut array = [0u8; N];
    fill_from(&mut get_rng(), &mut array)?;

    Ok(array)
}

/// `size` bytes straight from the OS, used for init and leaf secrets
#[inline]
pub(crate) fn random_secret(size: usize) -> Result<Secret> {
    let mut secret = vec![0u8; size];
    fill_from(&mut get_rng(), &mut secret)?;

    Ok(Secret::new(secret))
}
