use crate::{
    components::{
        GetTransactionResponse, GetTransactionStatus, InvokeInfo, SendTransactionResponse,
        SendTransactionStatus,
    },
    utils::{with_exponential_backoff, Polled},
    Error, Result,
};
use serde_json::Value;
use std::time::Duration;
use stellar_xdr::curr::{Limits, ReadXdr, TransactionEnvelope, TransactionResult};

/// A transaction after submission: the network's first acknowledgement plus
/// every polling attempt made while waiting for a terminal status.
///
/// Created by [`AssembledTransaction::send`](crate::assembled::AssembledTransaction::send);
/// submission and polling happen during construction.
#[derive(Debug)]
pub struct SentTransaction {
    info: InvokeInfo,
    /// The envelope that was submitted.
    pub signed: TransactionEnvelope,
    /// First network acknowledgement.
    pub send_transaction_response: SendTransactionResponse,
    attempts: Vec<Polled<GetTransactionResponse>>,
}

impl SentTransaction {
    /// Submits the signed envelope, then polls `getTransaction` with
    /// exponential backoff until the status leaves `NOT_FOUND` or the
    /// method's timeout budget is spent.
    pub(crate) async fn init(info: InvokeInfo, signed: TransactionEnvelope) -> Result<Self> {
        let send_response = info.rpc.send_transaction(&signed).await?;
        if send_response.status != SendTransactionStatus::Pending {
            let decoded = decode_error_result(&send_response);
            return Err(Error::SendFailed {
                response: Box::new(send_response),
                decoded,
            });
        }

        let hash = send_response.hash.clone();
        let timeout = Duration::from_secs(info.method_options.timeout_in_seconds);
        let rpc = info.rpc.clone();
        let attempts = with_exponential_backoff(
            || rpc.get_transaction(&hash),
            |response: &GetTransactionResponse| response.status == GetTransactionStatus::NotFound,
            timeout,
        )
        .await?;

        let sent = Self {
            info,
            signed,
            send_transaction_response: send_response,
            attempts,
        };
        if sent
            .get_transaction_response()
            .map(|response| response.status)
            == Some(GetTransactionStatus::NotFound)
        {
            return Err(Error::TransactionStillPending(Box::new(sent)));
        }
        Ok(sent)
    }

    /// The network-assigned transaction hash.
    pub fn hash(&self) -> &str {
        &self.send_transaction_response.hash
    }

    /// Every polling attempt, in order, with its timestamp.
    pub fn attempts(&self) -> &[Polled<GetTransactionResponse>] {
        &self.attempts
    }

    /// Every polled response, in order.
    pub fn get_transaction_response_all(&self) -> Vec<&GetTransactionResponse> {
        self.attempts.iter().map(|polled| &polled.value).collect()
    }

    /// The last polled response.
    pub fn get_transaction_response(&self) -> Option<&GetTransactionResponse> {
        self.attempts.last().map(|polled| &polled.value)
    }

    /// The parsed native return value of the executed invocation.
    pub fn result(&self) -> Result<Value> {
        if let Some(response) = self.get_transaction_response() {
            return match response.return_value()? {
                Some(retval) => self.info.parse_retval(&retval),
                None => Err(Error::TransactionFailed(format!(
                    "no return value; the final status was \"{}\"",
                    response.status
                ))),
            };
        }

        // No poll response at all: fall back to what the submission ack
        // carries.
        if let Some(decoded) = decode_error_result(&self.send_transaction_response) {
            return Err(Error::SendFailed {
                response: Box::new(self.send_transaction_response.clone()),
                decoded: Some(decoded),
            });
        }
        Err(Error::SendResultOnly)
    }
}

fn decode_error_result(response: &SendTransactionResponse) -> Option<Box<TransactionResult>> {
    response
        .error_result_xdr
        .as_deref()
        .and_then(|b64| TransactionResult::from_xdr_base64(b64, Limits::none()).ok())
        .map(Box::new)
}
