use crate::{crypto::Signer, rpc::client::RpcClient, spec::ContractSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr};
use std::{collections::BTreeMap, fmt, sync::Arc};
use stellar_xdr::curr::{Limits, ReadXdr, ScError, ScVal};

/// Placeholder source account used to simulate read calls when no real
/// account is configured. It is the all-zero ed25519 key in strkey form and
/// is paired with sequence number `0`.
pub const NULL_ACCOUNT: &str = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";

/// The network minimum (inclusion) fee in stroops.
pub const BASE_FEE: u32 = 100;

/// Default budget, in seconds, for both the transaction validity window and
/// the submission-poll loop.
pub const DEFAULT_TIMEOUT_IN_SECONDS: u64 = 30;

/// Configuration for one [`ContractClient`](crate::client::ContractClient)
/// instance.
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Endpoint of the JSON-RPC service.
    pub rpc_url: String,
    /// The `C...` identifier of the target contract.
    pub contract_id: String,
    /// Network-identification string mixed into every signature preimage.
    pub network_passphrase: String,
    /// Permit non-TLS endpoints. Off by default.
    pub allow_http: bool,
    /// Default source/invoker `G...` account for simulations and envelope
    /// signing. Without it, simulations run as [`NULL_ACCOUNT`] and only
    /// read calls can complete.
    pub public_key: Option<String>,
    /// Capability used for envelope and authorization-entry signatures.
    pub signer: Option<Arc<dyn Signer>>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("rpc_url", &self.rpc_url)
            .field("contract_id", &self.contract_id)
            .field("network_passphrase", &self.network_passphrase)
            .field("allow_http", &self.allow_http)
            .field("public_key", &self.public_key)
            .field("signer", &self.signer.as_ref().map(|_| "<signer>"))
            .finish()
    }
}

/// Per-invocation overrides.
#[derive(Debug, Clone, Copy)]
pub struct MethodOptions {
    /// Fee in stroops; [`BASE_FEE`] when unset. Simulation may raise it.
    pub fee: Option<u32>,
    /// Validity window and submission-poll budget.
    pub timeout_in_seconds: u64,
    /// Whether to run an initial simulation as part of building.
    pub simulate: bool,
}

impl Default for MethodOptions {
    fn default() -> Self {
        Self {
            fee: None,
            timeout_in_seconds: DEFAULT_TIMEOUT_IN_SECONDS,
            simulate: true,
        }
    }
}

/// The frozen combination of client options, method options, method name and
/// marshalled arguments that one invocation carries through its lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct InvokeInfo {
    pub rpc: RpcClient,
    pub spec: Arc<ContractSpec>,
    pub options: Arc<ClientOptions>,
    pub error_types: Arc<BTreeMap<u32, String>>,
    pub method: String,
    pub args: Vec<ScVal>,
    pub method_options: MethodOptions,
}

impl InvokeInfo {
    /// Parses a simulated or executed return value into its native form,
    /// translating numbered contract errors through the error-type table.
    pub(crate) fn parse_retval(&self, retval: &ScVal) -> crate::Result<Value> {
        if let ScVal::Error(ScError::Contract(code)) = retval {
            if let Some(message) = self.error_types.get(code) {
                return Err(crate::Error::ContractError {
                    code: *code,
                    message: message.clone(),
                });
            }
        }
        Ok(self.spec.func_res_to_native(&self.method, retval)?)
    }
}

/// Response of the `simulateTransaction` RPC method.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulateTransactionResponse {
    /// Minimum resource fee, in stroops, the network will charge.
    #[serde_as(as = "DisplayFromStr")]
    pub min_resource_fee: u64,
    /// Base64 `SorobanTransactionData` sized by the simulation.
    pub transaction_data: String,
    /// One result per host function; in practice always zero or one.
    pub results: Vec<SimulateHostFunctionResult>,
    /// Base64 diagnostic events emitted during the simulation.
    pub events: Vec<String>,
    /// Present when ledger state must be restored before the call can
    /// succeed.
    pub restore_preamble: Option<RestorePreamble>,
    /// Present when the simulation itself failed.
    pub error: Option<String>,
    pub latest_ledger: u32,
}

/// Return value and unsigned authorization entries of one simulated host
/// function invocation, base64-encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulateHostFunctionResult {
    pub auth: Vec<String>,
    pub xdr: String,
}

/// Everything needed to build a transaction restoring the expired ledger
/// entries that block the simulated call.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestorePreamble {
    #[serde_as(as = "DisplayFromStr")]
    pub min_resource_fee: u64,
    pub transaction_data: String,
}

/// Response of the `sendTransaction` RPC method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResponse {
    pub status: SendTransactionStatus,
    /// Network-assigned transaction hash, hex-encoded.
    pub hash: String,
    /// Base64 `TransactionResult`, present on immediate rejection.
    #[serde(default)]
    pub error_result_xdr: Option<String>,
    #[serde(default)]
    pub latest_ledger: u32,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SendTransactionStatus {
    Pending,
    Duplicate,
    TryAgainLater,
    Error,
}

/// Response of the `getTransaction` RPC method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTransactionResponse {
    pub status: GetTransactionStatus,
    /// Base64 return value of the host function, present on success.
    #[serde(default)]
    pub return_value: Option<String>,
    #[serde(default)]
    pub latest_ledger: u32,
}

impl GetTransactionResponse {
    /// Decodes the base64 return value, if any.
    pub fn return_value(&self) -> crate::Result<Option<ScVal>> {
        self.return_value
            .as_deref()
            .map(|b64| ScVal::from_xdr_base64(b64, Limits::none()))
            .transpose()
            .map_err(Into::into)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GetTransactionStatus {
    NotFound,
    Success,
    Failed,
}

/// Response of the `getLedgerEntries` RPC method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetLedgerEntriesResponse {
    pub entries: Vec<LedgerEntryResult>,
    pub latest_ledger: u32,
}

/// A single raw ledger entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerEntryResult {
    /// Base64 `LedgerKey`.
    pub key: String,
    /// Base64 `LedgerEntryData`.
    pub xdr: String,
    pub last_modified_ledger_seq: Option<u32>,
    /// Ledger sequence until which the entry lives, for entries with a TTL.
    pub live_until_ledger_seq: Option<u32>,
}
