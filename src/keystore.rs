//! Keystore unlock (spec §6).
//!
//! Decrypts the standard encrypted-JSON wallet the bot signs with,
//! prompting for the password on a masked stdin read (`rpassword`) when
//! none is supplied via environment. `ethers`'s `LocalWallet` already
//! implements the scrypt/pbkdf2 decrypt the keystore format needs, so
//! no extra crate is pulled in for the crypto itself.

use std::path::Path;

use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};

const PASSWORD_ENV_VAR: &str = "KEEPER_KEYSTORE_PASSWORD";

/// Unlocks the keystore at `path`, taking the password from
/// `KEEPER_KEYSTORE_PASSWORD` when set (useful for non-interactive
/// deployments) and otherwise prompting on the controlling terminal.
pub fn unlock(path: impl AsRef<Path>, chain_id: u64) -> Result<LocalWallet> {
    let path = path.as_ref();
    let password = match std::env::var(PASSWORD_ENV_VAR) {
        Ok(value) => value,
        Err(_) => rpassword::prompt_password("Keystore password: ")
            .context("failed to read keystore password from terminal")?,
    };

    let wallet = LocalWallet::decrypt_keystore(path, password)
        .with_context(|| format!("failed to decrypt keystore at {}", path.display()))?;
    Ok(wallet.with_chain_id(chain_id))
}
