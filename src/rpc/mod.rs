pub(crate) mod client;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Couldn't create a RpcClient: [\"{0}\"]")]
    RpcClientCreate(reqwest::Error),
    #[error("Rpc request failed with: [\"{0}\"]")]
    RpcRequest(reqwest::Error),
    #[error("Failed to serialize an RPC request: [\"{0}\"]")]
    SerializeRpcRequest(serde_json::Error),
    #[error("Failed to deserialize an RPC response: [\"{0}\"]")]
    DeserializeRpcResponse(reqwest::Error),
    #[error("Failed to deserialize an RPC result payload: [\"{0}\"]")]
    DeserializeResult(serde_json::Error),
    #[error("JSON-RPC error: [\"{0}\"]")]
    JsonRpc(JsonRpcError),
}

impl From<JsonRpcError> for Error {
    fn from(err: JsonRpcError) -> Self {
        Self::JsonRpc(err)
    }
}

/// The error object of a JSON-RPC 2.0 response, surfaced to the caller
/// verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Code: {}, Message: {:?}, Data: {:?}",
            self.code, self.message, self.data
        )
    }
}
