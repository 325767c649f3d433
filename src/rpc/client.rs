use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, ClientBuilder, Response as Resp,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stellar_xdr::curr::{
    AccountEntry, LedgerEntryData, LedgerKey, LedgerKeyAccount, Limits, ReadXdr, Transaction,
    TransactionEnvelope, TransactionV1Envelope, VecM, WriteXdr,
};

use super::{Error, JsonRpcError};
use crate::{
    components::{
        GetLedgerEntriesResponse, GetTransactionResponse, SendTransactionResponse,
        SimulateTransactionResponse,
    },
    utils::account_id,
};
use std::sync::atomic::{AtomicI64, Ordering};
use url::Url;

type Result<T> = std::result::Result<T, Error>;

static REQUEST_ID: AtomicI64 = AtomicI64::new(0);

#[derive(Debug, Clone)]
pub(crate) struct RpcClient {
    client: Client,
    url: Url,
}

impl RpcClient {
    /// Creates a [`reqwest`] client with headers:
    /// [`CONTENT_TYPE`]: "application/json"
    ///
    /// Arguments
    ///
    /// - url - It's an RPC endpoint [`Url`]
    pub(crate) fn new(url: Url) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = ClientBuilder::new()
            .default_headers(headers)
            .build()
            .map_err(Error::RpcClientCreate)?;

        Ok(Self { client, url })
    }

    /// RPC call to the Soroban RPC server
    ///
    /// Arguments
    ///
    /// - method - RPC method
    /// - params - method arguments encoded as a single JSON object
    ///
    /// Response example:
    /// ```json
    /// {
    ///   "id": 1,
    ///   "jsonrpc": "2.0",
    ///   "result": "...",
    /// }
    ///
    /// ```
    pub(crate) async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let resp = self
            .client
            .post(self.url.clone())
            .json(
                &serde_json::to_value(Request::new(method, params))
                    .map_err(Error::SerializeRpcRequest)?,
            )
            .send()
            .await
            .and_then(Resp::error_for_status)
            .map_err(Error::RpcRequest)?;

        match resp
            .json::<Response>()
            .await
            .map_err(Error::DeserializeRpcResponse)?
        {
            Response {
                result: RpcResult::Ok(data),
                ..
            } => Ok(data),
            Response {
                result: RpcResult::Err(err),
                ..
            } => Err(err.into()),
        }
    }

    /// Fetches the live account record for the given `G...` address via its
    /// ledger key. Used for the transaction sequence number.
    pub(crate) async fn get_account(&self, public_key: &str) -> crate::Result<AccountEntry> {
        let key = LedgerKey::Account(LedgerKeyAccount {
            account_id: account_id(public_key)?,
        });
        let resp = self.get_ledger_entries(&[key]).await?;
        let entry = resp
            .entries
            .first()
            .ok_or_else(|| crate::Error::NotFound {
                what: "account",
                key: public_key.to_owned(),
            })?;

        match LedgerEntryData::from_xdr_base64(&entry.xdr, Limits::none())? {
            LedgerEntryData::Account(account) => Ok(account),
            data => Err(crate::Error::UnexpectedLedgerEntry(format!("{data:?}"))),
        }
    }

    /// Non-committing evaluation of a transaction by the node. The
    /// transaction is wrapped into an unsigned envelope for transport.
    pub(crate) async fn simulate_transaction(
        &self,
        tx: &Transaction,
    ) -> crate::Result<SimulateTransactionResponse> {
        let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
            tx: tx.clone(),
            signatures: VecM::default(),
        });
        let resp = self
            .request(
                "simulateTransaction",
                Some(json!({ "transaction": envelope.to_xdr_base64(Limits::none())? })),
            )
            .await?;
        Ok(serde_json::from_value(resp).map_err(Error::DeserializeResult)?)
    }

    /// Submits a signed envelope to the network.
    pub(crate) async fn send_transaction(
        &self,
        envelope: &TransactionEnvelope,
    ) -> crate::Result<SendTransactionResponse> {
        let resp = self
            .request(
                "sendTransaction",
                Some(json!({ "transaction": envelope.to_xdr_base64(Limits::none())? })),
            )
            .await?;
        Ok(serde_json::from_value(resp).map_err(Error::DeserializeResult)?)
    }

    /// Queries the status of a previously submitted transaction by its
    /// network-assigned hash.
    pub(crate) async fn get_transaction(&self, hash: &str) -> crate::Result<GetTransactionResponse> {
        let resp = self
            .request("getTransaction", Some(json!({ "hash": hash })))
            .await?;
        Ok(serde_json::from_value(resp).map_err(Error::DeserializeResult)?)
    }

    /// Reads raw ledger entries for the given keys.
    pub(crate) async fn get_ledger_entries(
        &self,
        keys: &[LedgerKey],
    ) -> crate::Result<GetLedgerEntriesResponse> {
        let keys = keys
            .iter()
            .map(|key| key.to_xdr_base64(Limits::none()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let resp = self
            .request("getLedgerEntries", Some(json!({ "keys": keys })))
            .await?;
        Ok(serde_json::from_value(resp).map_err(Error::DeserializeResult)?)
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    /// JSON-RPC version.
    pub jsonrpc: &'static str,
    /// Request ID
    pub id: i64,
    /// Name of the method to be invoked.
    pub method: &'a str,
    /// Parameter values of the request, always a single object.
    pub params: Option<Value>,
}

impl<'a> Request<'a> {
    fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Result.
    #[serde(flatten)]
    pub result: RpcResult,
    /// Request ID
    pub id: i64,
}

/// JSON-RPC 2.0 result format
#[derive(Debug, Serialize, Deserialize)]
enum RpcResult {
    #[serde(rename = "result")]
    Ok(Value),
    #[serde(rename = "error")]
    Err(JsonRpcError),
}
