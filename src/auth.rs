use crate::{crypto::Signer, utils, Error, Result};
use itertools::Itertools;
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    HashIdPreimage, HashIdPreimageSorobanAuthorization, Limits, OperationBody, ScMap, ScSymbol,
    ScVal, SorobanAuthorizationEntry, SorobanCredentials, Transaction, WriteXdr,
};

/// Authorization entries of the transaction's invocation.
///
/// The transaction must contain exactly one invoke-host-function operation;
/// anything else is outside this client's shape.
pub(crate) fn invocation_auth(tx: &Transaction) -> Result<&[SorobanAuthorizationEntry]> {
    if tx.operations.len() != 1 {
        return Err(Error::UnexpectedOperationCount {
            count: tx.operations.len(),
        });
    }
    match &tx.operations[0].body {
        OperationBody::InvokeHostFunction(body) => Ok(&body.auth),
        _ => Err(Error::NotInvokeHostFunction),
    }
}

/// The strkey address an entry's credentials bind, for entries that carry
/// address credentials. Source-credentialed entries are satisfied by the
/// envelope signature and have no separate signer.
pub(crate) fn entry_signer(entry: &SorobanAuthorizationEntry) -> Option<String> {
    match &entry.credentials {
        SorobanCredentials::Address(credentials) => {
            Some(utils::address_to_string(&credentials.address))
        }
        _ => None,
    }
}

/// Accounts whose signature is still missing from the invocation's
/// authorization entries, deduplicated in first-occurrence order.
pub(crate) fn needed_signers(
    tx: &Transaction,
    include_already_signed: bool,
) -> Result<Vec<String>> {
    Ok(invocation_auth(tx)?
        .iter()
        .filter(|entry| {
            include_already_signed
                || matches!(
                    &entry.credentials,
                    SorobanCredentials::Address(credentials)
                        if credentials.signature == ScVal::Void
                )
        })
        .filter_map(entry_signer)
        .unique()
        .collect())
}

/// Produces a signed copy of one authorization entry: the entry preimage is
/// XDR-encoded and hashed, the signer's signature and public key are
/// spliced into the credentials, and the expiration ledger is stamped.
///
/// Entries without address credentials need no special signing and come
/// back unchanged.
pub fn authorize_entry(
    raw: &SorobanAuthorizationEntry,
    signer: &dyn Signer,
    signature_expiration_ledger: u32,
    network_passphrase: &str,
) -> Result<SorobanAuthorizationEntry> {
    let mut entry = raw.clone();
    let SorobanAuthorizationEntry {
        credentials: SorobanCredentials::Address(ref mut credentials),
        ..
    } = entry
    else {
        return Ok(entry);
    };

    let preimage = HashIdPreimage::SorobanAuthorization(HashIdPreimageSorobanAuthorization {
        network_id: utils::network_id(network_passphrase),
        nonce: credentials.nonce,
        signature_expiration_ledger,
        invocation: raw.root_invocation.clone(),
    })
    .to_xdr(Limits::none())?;
    let payload: [u8; 32] = Sha256::digest(preimage).into();

    let signature = signer.sign_auth_entry(&payload)?;
    let public_key = signer.public_key();

    let map = ScMap::sorted_from(vec![
        (
            ScVal::Symbol(ScSymbol("public_key".try_into()?)),
            ScVal::Bytes(public_key.0.to_vec().try_into()?),
        ),
        (
            ScVal::Symbol(ScSymbol("signature".try_into()?)),
            ScVal::Bytes(signature.to_vec().try_into()?),
        ),
    ])?;
    credentials.signature = ScVal::Vec(Some(vec![ScVal::Map(Some(map))].try_into()?));
    credentials.signature_expiration_ledger = signature_expiration_ledger;
    Ok(entry)
}
