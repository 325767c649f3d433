use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::{future::Future, time::Duration};
use stellar_xdr::curr::{
    self as xdr, AccountId, Hash, Limits, MuxedAccount, PublicKey, ScAddress, Transaction,
    TransactionSignaturePayload, TransactionSignaturePayloadTaggedTransaction, Uint256, WriteXdr,
};

/// SHA-256 of the network passphrase. Every signature preimage on the
/// network is bound to this id.
pub(crate) fn network_id(network_passphrase: &str) -> Hash {
    Hash(Sha256::digest(network_passphrase.as_bytes()).into())
}

/// Computes the signature-payload hash of a transaction for the given
/// network.
pub fn transaction_hash(
    tx: &Transaction,
    network_passphrase: &str,
) -> std::result::Result<[u8; 32], xdr::Error> {
    let signature_payload = TransactionSignaturePayload {
        network_id: network_id(network_passphrase),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    Ok(Sha256::digest(signature_payload.to_xdr(Limits::none())?).into())
}

/// Parses a `G...` strkey into an XDR account id.
pub(crate) fn account_id(public_key: &str) -> Result<AccountId> {
    let key = stellar_strkey::ed25519::PublicKey::from_string(public_key)
        .map_err(|_| Error::InvalidAddress(public_key.to_owned()))?;
    Ok(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key.0))))
}

/// Parses a `G...` strkey into a transaction source account.
pub(crate) fn muxed_account(public_key: &str) -> Result<MuxedAccount> {
    let key = stellar_strkey::ed25519::PublicKey::from_string(public_key)
        .map_err(|_| Error::InvalidAddress(public_key.to_owned()))?;
    Ok(MuxedAccount::Ed25519(Uint256(key.0)))
}

/// Parses a `C...` strkey into a contract address.
pub(crate) fn contract_address(contract_id: &str) -> Result<ScAddress> {
    let contract = stellar_strkey::Contract::from_string(contract_id)
        .map_err(|_| Error::InvalidAddress(contract_id.to_owned()))?;
    Ok(ScAddress::Contract(Hash(contract.0)))
}

/// Parses a `G...` or `C...` strkey into an XDR address.
pub(crate) fn contract_or_account_address(address: &str) -> Result<ScAddress> {
    match stellar_strkey::Strkey::from_string(address) {
        Ok(stellar_strkey::Strkey::PublicKeyEd25519(key)) => Ok(ScAddress::Account(AccountId(
            PublicKey::PublicKeyTypeEd25519(Uint256(key.0)),
        ))),
        Ok(stellar_strkey::Strkey::Contract(contract)) => Ok(ScAddress::Contract(Hash(contract.0))),
        _ => Err(Error::InvalidAddress(address.to_owned())),
    }
}

/// Renders an XDR address in its strkey form.
pub(crate) fn address_to_string(address: &ScAddress) -> String {
    match address {
        ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key)))) => {
            stellar_strkey::ed25519::PublicKey(*key).to_string()
        }
        ScAddress::Contract(Hash(hash)) => {
            stellar_strkey::Contract(*hash).to_string()
        }
    }
}

/// Extracts the numeric code out of a host-error message of the shape
/// `Error(Contract, #N)`.
pub(crate) fn contract_error_code(message: &str) -> Option<u32> {
    let (_, rest) = message.split_once("Error(Contract, #")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// One recorded polling attempt.
#[derive(Debug, Clone)]
pub struct Polled<T> {
    /// Wall-clock time the response was observed.
    pub at: DateTime<Utc>,
    /// The response itself.
    pub value: T,
}

/// Repeats `attempt` until `keep_waiting` turns false or the wall-clock
/// budget is spent. The first attempt runs immediately; after attempt *i*
/// the loop sleeps `min(2^i, remaining)` seconds, so the last attempt lands
/// exactly on the deadline. Every response is recorded in order.
pub(crate) async fn with_exponential_backoff<T, F, Fut, P>(
    mut attempt: F,
    keep_waiting: P,
    timeout: Duration,
) -> Result<Vec<Polled<T>>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut attempts = Vec::new();

    for exponent in 0u32.. {
        let value = attempt().await?;
        let done = !keep_waiting(&value);
        attempts.push(Polled {
            at: Utc::now(),
            value,
        });
        if done {
            break;
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }
        let wait = Duration::from_secs(1 << exponent.min(16)).min(deadline - now);
        tracing::debug!(attempt = exponent, ?wait, "response not final, waiting");
        tokio::time::sleep(wait).await;
    }

    Ok(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn contract_error_codes() {
        assert_eq!(
            contract_error_code("HostError: Error(Contract, #3)\nfailed"),
            Some(3)
        );
        assert_eq!(contract_error_code("Error(Contract, #1021)"), Some(1021));
        assert_eq!(contract_error_code("Error(WasmVm, InvalidAction)"), None);
        assert_eq!(contract_error_code("plain failure"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_attempts_are_geometric_and_clamped() {
        let counter = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let attempts = with_exponential_backoff(
            || {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Ok("pending") }
            },
            |_| true,
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        // Attempts at t = 0, 1, 3, 7, 15 and a final one clamped to t = 30.
        assert_eq!(attempts.len(), 6);
        assert_eq!(counter.load(Ordering::Relaxed), 6);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_stops_on_terminal_response() {
        let counter = AtomicU32::new(0);

        let attempts = with_exponential_backoff(
            || {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                async move { Ok(n) }
            },
            |n| *n < 2,
            Duration::from_secs(600),
        )
        .await
        .unwrap();

        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts.last().unwrap().value, 2);
    }
}
