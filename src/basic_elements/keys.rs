use alloy_primitives::{Address, B256, Signature, U256, hex};
use anyhow::{Context, Result, bail};
use k256::ecdsa::SigningKey;
use std::{env, fmt};

use crate::constants::EnvVar;

pub const SIGNATURE_LENGTH: usize = 65;

/// Party able to sign multisig payload hashes. The key may live in another
/// process; only the resulting signature travels.
pub trait PayloadSigner: Send + Sync {
    fn address(&self) -> Address;
    fn sign(&self, payload_hash: &B256) -> Result<Signature>;
}

/// secp256k1 key held in memory.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(bytes).context("Invalid secp256k1 private key")?;
        let address = Address::from_public_key(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Parses a hex private key, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).context("Private key is not valid hex")?;
        Self::from_bytes(&bytes)
    }

    pub fn from_env(var_name: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let private_key = env::var(var_name)
            .with_context(|| format!("Environment variable {} not set", var_name))?;
        Self::from_hex(&private_key)
    }

    /// Loads the key from `SIGNER_PRIVATE_KEY`.
    pub fn from_default_env() -> Result<Self> {
        Self::from_env(EnvVar::SignerPrivateKey.name())
    }

    pub fn random() -> Self {
        loop {
            // Out-of-range scalars are rejected by from_slice, draw again.
            let random_bytes = rand::random::<[u8; 32]>();
            if let Ok(signer) = Self::from_bytes(&random_bytes) {
                return signer;
            }
        }
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl PayloadSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, payload_hash: &B256) -> Result<Signature> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(payload_hash.as_slice())
            .context("Failed to sign payload hash")?;

        let bytes = signature.to_bytes();
        Ok(Signature::new(
            U256::from_be_slice(&bytes[..32]),
            U256::from_be_slice(&bytes[32..]),
            recovery_id.is_y_odd(),
        ))
    }
}

/// Address whose key produced `signature` over `payload_hash`.
pub fn recover_signer(payload_hash: &B256, signature: &Signature) -> Result<Address> {
    signature
        .recover_address_from_prehash(payload_hash)
        .context("Signature does not recover to a public key")
}

/// r || s || v, with v as 27/28.
pub fn signature_to_bytes(signature: &Signature) -> [u8; SIGNATURE_LENGTH] {
    let mut bytes = [0u8; SIGNATURE_LENGTH];
    bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
    bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
    bytes[64] = if signature.v() { 28 } else { 27 };
    bytes
}

pub fn signature_from_bytes(bytes: &[u8]) -> Result<Signature> {
    if bytes.len() != SIGNATURE_LENGTH {
        bail!(
            "Signature must be {} bytes, got {}",
            SIGNATURE_LENGTH,
            bytes.len()
        );
    }

    let y_parity = match bytes[64] {
        0 | 27 => false,
        1 | 28 => true,
        v => bail!("Invalid signature recovery byte: {}", v),
    };

    Ok(Signature::new(
        U256::from_be_slice(&bytes[..32]),
        U256::from_be_slice(&bytes[32..64]),
        y_parity,
    ))
}
