#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// The contract invocation lifecycle: build → simulate → sign → send.
pub mod assembled;
/// Authorization-entry signing protocol.
pub mod auth;
/// The typed contract façade.
pub mod client;
#[doc(hidden)]
pub mod components;
/// Signing capability and the in-process keypair signer.
pub mod crypto;
pub(crate) mod rpc;
/// Submission and polling of signed transactions.
pub mod sent;
/// Contract interface introspection and value marshalling.
pub mod spec;
#[doc(hidden)]
pub mod utils;

pub use rpc::{Error as RpcError, JsonRpcError};

type Result<T> = std::result::Result<T, Error>;

/// Client prelude.
/// All the frequently used API
pub mod prelude {
    pub use super::assembled::{
        AssembledTransaction, SignAuthEntriesOptions, SimulationData, SimulationResult,
    };
    pub use super::auth::authorize_entry;
    pub use super::client::ContractClient;
    pub use super::components::*;
    pub use super::crypto::{LocalSigner, Signer};
    pub use super::sent::SentTransaction;
    pub use super::spec::{ContractSpec, ErrorCase};
    pub use super::utils::{transaction_hash, Polled};
    pub use super::Error;
}

/// Describes errors that could be thrown during execution.
/// Each error is self-described
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[doc(hidden)]
    #[error("Client creation failed, cause: [\"{0}\"]")]
    CreateClient(rpc::Error),
    #[doc(hidden)]
    #[error("Couldn't parse the rpc url \"{0}\", cause: [\"{1}\"]")]
    InvalidRpcUrl(String, url::ParseError),
    #[doc(hidden)]
    #[error("The rpc url \"{0}\" is not https; set `allow_http` to permit it")]
    HttpSchemeNotAllowed(String),
    #[doc(hidden)]
    #[error("Couldn't parse \"{0}\" as an address")]
    InvalidAddress(String),
    #[doc(hidden)]
    #[error("The transaction carries no builder; it was rehydrated from its interchange form and can only be signed and sent")]
    NotYetAssembled,
    #[doc(hidden)]
    #[error("The transaction has not yet been simulated")]
    NotYetSimulated,
    #[doc(hidden)]
    #[error("The transaction envelope has not been signed; call `sign` first")]
    NotYetSigned,
    #[doc(hidden)]
    #[error("Ledger state is expired and must be restored before this call can succeed: {0}")]
    ExpiredState(String),
    #[doc(hidden)]
    #[error("Signatures from {0:?} are still required before the envelope can be signed")]
    NeedsMoreSignatures(Vec<String>),
    #[doc(hidden)]
    #[error("No signature needed: {0}")]
    NoSignatureNeeded(String),
    #[doc(hidden)]
    #[error("No unsigned non-invoker authorization entries are left to sign")]
    NoUnsignedNonInvokerAuthEntries,
    #[doc(hidden)]
    #[error("A signer is required for this operation; provide one in the client options or the call")]
    NoSigner,
    #[doc(hidden)]
    #[error("A public key is required for this operation; provide one in the client options or the call")]
    NoPublicKey,
    #[doc(hidden)]
    #[error("Simulation ran as the placeholder account and was rejected; set `public_key` in the client options, cause: [\"{0}\"]")]
    FakeAccount(String),
    #[doc(hidden)]
    #[error("Simulation failed, cause: [\"{0}\"]")]
    SimulationFailed(String),
    #[doc(hidden)]
    #[error("The contract returned error #{code}: {message}")]
    ContractError {
        /// The contract's numeric error code.
        code: u32,
        /// The message registered for the code in the contract spec.
        message: String,
    },
    #[doc(hidden)]
    #[error("sendTransaction returned \"{}\"", .response.status)]
    SendFailed {
        /// The full submission acknowledgement, for diagnosis.
        response: Box<components::SendTransactionResponse>,
        /// Its error result, when one was attached and decodable.
        decoded: Option<Box<stellar_xdr::curr::TransactionResult>>,
    },
    #[doc(hidden)]
    #[error("The transaction was submitted but its confirmation was not awaited")]
    SendResultOnly,
    #[doc(hidden)]
    #[error("The transaction is still pending; resume polling with its network hash")]
    TransactionStillPending(Box<sent::SentTransaction>),
    #[doc(hidden)]
    #[error("The transaction failed: {0}")]
    TransactionFailed(String),
    #[doc(hidden)]
    #[error("Expected exactly one operation in the transaction, found {count}")]
    UnexpectedOperationCount { count: usize },
    #[doc(hidden)]
    #[error("Expected exactly one simulation result, found {length}")]
    UnexpectedSimulationResultSize { length: usize },
    #[doc(hidden)]
    #[error("The transaction's operation is not an invoke-host-function operation")]
    NotInvokeHostFunction,
    #[doc(hidden)]
    #[error("The fee of {0} stroops does not fit the fee field")]
    LargeFee(u64),
    #[doc(hidden)]
    #[error("No {what} ledger entry found for \"{key}\" (404)")]
    NotFound {
        /// What kind of entry the lookup expected.
        what: &'static str,
        /// The key the lookup ran with.
        key: String,
    },
    #[doc(hidden)]
    #[error("The ledger returned an entry of an unexpected kind: [\"{0}\"]")]
    UnexpectedLedgerEntry(String),
    #[doc(hidden)]
    #[error("Contract \"{0}\" is backed by a built-in executable and carries no spec")]
    UnexpectedContractExecutable(String),
    #[doc(hidden)]
    #[error("Couldn't serialize the transaction to its interchange form, cause: [\"{0}\"]")]
    SerializeTransaction(serde_json::Error),
    #[doc(hidden)]
    #[error("Couldn't deserialize a transaction from its interchange form, cause: [\"{0}\"]")]
    DeserializeTransaction(serde_json::Error),
    #[doc(hidden)]
    #[error("Failed to execute an rpc call, cause: [\"{0}\"]")]
    Rpc(#[from] rpc::Error),
    #[doc(hidden)]
    #[error("Spec introspection failed, cause: [\"{0}\"]")]
    Spec(#[from] spec::Error),
    #[doc(hidden)]
    #[error("Signing failed, cause: [\"{0}\"]")]
    Crypto(#[from] crypto::Error),
    #[doc(hidden)]
    #[error("XDR encoding failed, cause: [\"{0}\"]")]
    Xdr(#[from] stellar_xdr::curr::Error),
}
