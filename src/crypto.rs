use crate::utils::transaction_hash;
use ed25519_dalek::{Signer as _, SigningKey};
use stellar_xdr::curr::{
    DecoratedSignature, Signature, SignatureHint, TransactionEnvelope, TransactionV1Envelope,
};

type Result<T> = std::result::Result<T, Error>;

/// Length of an ed25519 seed or public key.
pub const KEY_LENGTH: usize = 32;
/// Length of an ed25519 signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Signing capability used by the transaction lifecycle.
///
/// One implementation covers both signature kinds the platform requires, so
/// a caller can't accidentally configure envelope signing without
/// authorization-entry signing when a workflow needs both. [`LocalSigner`]
/// is the in-process keypair implementation; wallets or remote signers can
/// provide their own.
pub trait Signer: Send + Sync {
    /// The `G...` account this signer produces signatures for.
    fn public_key(&self) -> stellar_strkey::ed25519::PublicKey;

    /// Sign a transaction envelope, returning a copy carrying the new
    /// decorated signature. The passphrase identifies the target network
    /// and is mixed into the signature preimage.
    fn sign_transaction(
        &self,
        envelope: &TransactionEnvelope,
        network_passphrase: &str,
    ) -> Result<TransactionEnvelope>;

    /// Sign the 32-byte hash of an authorization-entry preimage.
    fn sign_auth_entry(&self, payload: &[u8; KEY_LENGTH]) -> Result<[u8; SIGNATURE_LENGTH]>;
}

/// Keypair-backed [`Signer`]
pub struct LocalSigner {
    key: SigningKey,
}

impl LocalSigner {
    /// Creates a [`LocalSigner`] from a `S...` seed string
    pub fn from_secret_str(secret_key: &str) -> Result<Self> {
        let seed = stellar_strkey::ed25519::PrivateKey::from_string(secret_key)
            .map_err(|err| Error::InvalidSecretKey(err.to_string()))?;
        Ok(Self::from_seed(&seed.0))
    }

    /// Creates a [`LocalSigner`] from raw seed bytes
    pub fn from_seed(seed: &[u8; KEY_LENGTH]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// Returns the `G...` form of the signing account
    pub fn account_id(&self) -> String {
        self.public_key().to_string()
    }
}

impl Signer for LocalSigner {
    fn public_key(&self) -> stellar_strkey::ed25519::PublicKey {
        stellar_strkey::ed25519::PublicKey(self.key.verifying_key().to_bytes())
    }

    fn sign_transaction(
        &self,
        envelope: &TransactionEnvelope,
        network_passphrase: &str,
    ) -> Result<TransactionEnvelope> {
        let TransactionEnvelope::Tx(v1) = envelope else {
            return Err(Error::UnsupportedEnvelopeType);
        };

        let hash = transaction_hash(&v1.tx, network_passphrase)?;
        let signature = self.key.sign(&hash);

        let public = self.key.verifying_key().to_bytes();
        let hint = SignatureHint([public[28], public[29], public[30], public[31]]);
        let decorated = DecoratedSignature {
            hint,
            signature: Signature(signature.to_bytes().to_vec().try_into()?),
        };

        let mut signatures = v1.signatures.to_vec();
        signatures.push(decorated);
        Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
            tx: v1.tx.clone(),
            signatures: signatures.try_into()?,
        }))
    }

    fn sign_auth_entry(&self, payload: &[u8; KEY_LENGTH]) -> Result<[u8; SIGNATURE_LENGTH]> {
        Ok(self.key.sign(payload).to_bytes())
    }
}

/// Describes signing failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Couldn't decode a secret seed, cause: [\"{0}\"]")]
    InvalidSecretKey(String),
    #[error("Only v1 transaction envelopes can be signed")]
    UnsupportedEnvelopeType,
    #[error("Envelope encoding failed, cause: [\"{0}\"]")]
    Xdr(#[from] stellar_xdr::curr::Error),
    #[error("Signing failed, cause: [\"{0}\"]")]
    Custom(String),
}
