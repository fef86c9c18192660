/// Device identity generation
///
/// Produces Ed25519 key pairs from the operating system's CSPRNG and exports
/// both halves as base64 text. The manager is a generator only: nothing is
/// retained once the pair has been returned to the caller.
use crate::error::{Result, ServiceError};
use crate::models::KeyPair;
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;

/// Identity manager for key pair generation
pub struct IdentityManager;

impl IdentityManager {
    /// Generate a fresh key pair using the OS random source
    ///
    /// # Errors
    /// * `CryptoFailure` when the random source cannot produce a seed
    pub fn generate_key_pair() -> Result<KeyPair> {
        Self::generate_key_pair_with(&mut OsRng)
    }

    /// Generate a key pair from the given random source.
    ///
    /// The seed is drawn in one call, so either a complete pair is produced
    /// or an error is returned and no key material escapes.
    pub fn generate_key_pair_with<R: RngCore>(rng: &mut R) -> Result<KeyPair> {
        let mut seed = [0u8; 32];
        rng.try_fill_bytes(&mut seed)
            .map_err(|e| ServiceError::CryptoFailure(format!("random source failed: {}", e)))?;

        let signing_key = SigningKey::from_bytes(&seed);
        seed.fill(0);

        let public_key = general_purpose::STANDARD.encode(signing_key.verifying_key().to_bytes());
        let private_key = general_purpose::STANDARD.encode(signing_key.to_bytes());

        log::debug!("Generated key pair with public key {}", public_key);

        Ok(KeyPair {
            public_key,
            private_key,
        })
    }
}
