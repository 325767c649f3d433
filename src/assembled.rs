use crate::{
    auth,
    components::{InvokeInfo, SimulateTransactionResponse, BASE_FEE, NULL_ACCOUNT},
    crypto::Signer,
    sent::SentTransaction,
    utils::{contract_address, contract_error_code, muxed_account},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stellar_xdr::curr::{
    ContractDataDurability, HostFunction, InvokeContractArgs, InvokeHostFunctionOp, LedgerKey,
    LedgerKeyContractData, Limits, Memo, Operation, OperationBody, Preconditions, ReadXdr,
    ScSymbol, ScVal, SequenceNumber, SorobanAuthorizationEntry, SorobanCredentials,
    SorobanTransactionData, TimeBounds, TimePoint, Transaction, TransactionEnvelope, TransactionExt,
    TransactionV1Envelope, VecM, WriteXdr,
};

/// The two serialisable extracts of a simulation response.
#[derive(Debug, Clone)]
pub struct SimulationData {
    /// Return value and authorization entries of the simulated invocation.
    pub result: SimulationResult,
    /// Resource footprint and fees sized by the simulation.
    pub transaction_data: SorobanTransactionData,
}

/// Decoded per-invocation part of a simulation response.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Unsigned authorization entries required by the invocation.
    pub auth: Vec<SorobanAuthorizationEntry>,
    /// The invocation's return value.
    pub retval: ScVal,
}

/// Options for [`AssembledTransaction::sign_auth_entries`]. Every field
/// falls back to its client-level counterpart when unset.
#[derive(Default)]
pub struct SignAuthEntriesOptions<'a> {
    /// Ledger sequence until which the produced signatures stay valid.
    /// Defaults to the live-until ledger of the contract's persistent
    /// instance entry, fetched from the network.
    pub expiration_ledger: Option<u32>,
    /// Capability producing the entry signatures.
    pub signer: Option<&'a dyn Signer>,
    /// The co-signing `G...` account to sign for.
    pub public_key: Option<String>,
}

/// A contract invocation moving through its lifecycle:
/// build → simulate → sign (envelope and/or auth entries) → send.
///
/// Constructed by [`ContractClient::invoke`](crate::client::ContractClient::invoke).
/// Read calls are complete after simulation: [`result`](Self::result) holds
/// the parsed return. Write calls continue through
/// [`sign_and_send`](Self::sign_and_send), or through the
/// [`to_json`](Self::to_json) interchange form when other parties must
/// [`sign_auth_entries`](Self::sign_auth_entries) first.
#[derive(Debug)]
pub struct AssembledTransaction {
    pub(crate) info: InvokeInfo,
    /// The in-progress transaction, mutable until simulation.
    raw: Option<Transaction>,
    /// The canonical transaction after at least one simulation.
    built: Option<Transaction>,
    /// Raw simulation response. Not serialisable; see the cache fields.
    simulation: Option<SimulateTransactionResponse>,
    simulation_result: Option<SimulationResult>,
    simulation_transaction_data: Option<SorobanTransactionData>,
    /// Envelope-signed transaction ready for submission.
    signed: Option<TransactionEnvelope>,
}

impl AssembledTransaction {
    /// Builds the transaction for one method invocation and, unless
    /// disabled by the method options, runs the initial simulation.
    pub(crate) async fn build(info: InvokeInfo) -> Result<Self> {
        let (source, sequence) = match &info.options.public_key {
            Some(public_key) => {
                let account = info.rpc.get_account(public_key).await?;
                (muxed_account(public_key)?, account.seq_num.0)
            }
            // Read calls can be simulated without a real account.
            None => (muxed_account(NULL_ACCOUNT)?, 0),
        };

        let operation = Operation {
            source_account: None,
            body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
                host_function: HostFunction::InvokeContract(InvokeContractArgs {
                    contract_address: contract_address(&info.options.contract_id)?,
                    function_name: ScSymbol(info.method.as_str().try_into()?),
                    args: info.args.clone().try_into()?,
                }),
                auth: VecM::default(),
            }),
        };

        let tx = Transaction {
            source_account: source,
            fee: info.method_options.fee.unwrap_or(BASE_FEE),
            seq_num: SequenceNumber(sequence + 1),
            cond: timebounds_from_now(info.method_options.timeout_in_seconds),
            memo: Memo::None,
            operations: vec![operation].try_into()?,
            ext: TransactionExt::V0,
        };

        let mut assembled = Self {
            info,
            raw: Some(tx),
            built: None,
            simulation: None,
            simulation_result: None,
            simulation_transaction_data: None,
            signed: None,
        };
        if assembled.info.method_options.simulate {
            assembled.simulate().await?;
        }
        Ok(assembled)
    }

    /// Simulates the raw transaction and, on success, replaces the built
    /// transaction with the assembled one: simulated authorization entries
    /// spliced in, fee raised to cover resources, footprint installed.
    ///
    /// Simulation-internal failures are not raised here; they surface
    /// lazily from [`simulation_data`](Self::simulation_data).
    pub async fn simulate(&mut self) -> Result<()> {
        let raw = self.raw.clone().ok_or(Error::NotYetAssembled)?;

        self.built = Some(raw.clone());
        self.simulation_result = None;
        self.simulation_transaction_data = None;
        self.signed = None;

        let response = self.info.rpc.simulate_transaction(&raw).await?;
        tracing::trace!(?response, "simulation response");
        if response.error.is_none() && !response.transaction_data.is_empty() {
            self.built = Some(assemble(&raw, &response)?);
        }
        self.simulation = Some(response);
        Ok(())
    }

    /// The simulation extracts needed by every later step.
    ///
    /// Fails with [`Error::NotYetSimulated`] before the first simulation,
    /// [`Error::ExpiredState`] when the simulator demands a storage
    /// restore, [`Error::FakeAccount`] when the placeholder source was
    /// rejected, and [`Error::SimulationFailed`] otherwise. The first
    /// successful access writes through to the serialisable cache.
    pub fn simulation_data(&mut self) -> Result<SimulationData> {
        if let (Some(result), Some(transaction_data)) = (
            &self.simulation_result,
            &self.simulation_transaction_data,
        ) {
            return Ok(SimulationData {
                result: result.clone(),
                transaction_data: transaction_data.clone(),
            });
        }

        let simulation = self.simulation.as_ref().ok_or(Error::NotYetSimulated)?;
        if let Some(restore) = &simulation.restore_preamble {
            let payload = serde_json::to_string(restore).unwrap_or_default();
            return Err(Error::ExpiredState(payload));
        }
        if let Some(error) = &simulation.error {
            return Err(if self.info.options.public_key.is_none() {
                Error::FakeAccount(error.clone())
            } else {
                Error::SimulationFailed(error.clone())
            });
        }

        let first = simulation
            .results
            .first()
            .ok_or_else(|| Error::SimulationFailed("response carries no results".to_owned()))?;
        let result = SimulationResult {
            auth: first
                .auth
                .iter()
                .map(|entry| SorobanAuthorizationEntry::from_xdr_base64(entry, Limits::none()))
                .collect::<std::result::Result<Vec<_>, _>>()?,
            retval: ScVal::from_xdr_base64(&first.xdr, Limits::none())?,
        };
        let transaction_data =
            SorobanTransactionData::from_xdr_base64(&simulation.transaction_data, Limits::none())?;

        self.simulation_result = Some(result.clone());
        self.simulation_transaction_data = Some(transaction_data.clone());
        Ok(SimulationData {
            result,
            transaction_data,
        })
    }

    /// The parsed native return value of the simulated invocation.
    ///
    /// A numbered error raised by the contract itself is translated through
    /// the spec's error table into [`Error::ContractError`], so callers can
    /// pattern-match the code and registered message.
    pub fn result(&mut self) -> Result<Value> {
        match self.simulation_data() {
            Ok(data) => self.info.parse_retval(&data.result.retval),
            Err(err) => {
                if let Some(code) = contract_error_code(&err.to_string()) {
                    if let Some(message) = self.info.error_types.get(&code) {
                        return Err(Error::ContractError {
                            code,
                            message: message.clone(),
                        });
                    }
                }
                Err(err)
            }
        }
    }

    /// True when the invocation needs no authorization and writes nothing,
    /// i.e. simulation alone already produced the result.
    pub fn is_read_call(&mut self) -> Result<bool> {
        let data = self.simulation_data()?;
        Ok(data.result.auth.is_empty()
            && data
                .transaction_data
                .resources
                .footprint
                .read_write
                .is_empty())
    }

    /// The restore preamble of the last simulation, when the simulator
    /// reported expired ledger state.
    pub fn restore_preamble(&self) -> Option<&crate::components::RestorePreamble> {
        self.simulation
            .as_ref()
            .and_then(|simulation| simulation.restore_preamble.as_ref())
    }

    /// Accounts that still have to sign authorization entries before the
    /// envelope can be signed: address-credentialed entries whose signature
    /// slot is unset, in first-occurrence order without duplicates. With
    /// `include_already_signed`, signed entries count too.
    pub fn needs_non_invoker_signing_by(
        &self,
        include_already_signed: bool,
    ) -> Result<Vec<String>> {
        let built = self.built.as_ref().ok_or(Error::NotYetSimulated)?;
        auth::needed_signers(built, include_already_signed)
    }

    /// Signs the built transaction envelope with the client-level signer.
    ///
    /// Fails with [`Error::NoSignatureNeeded`] for read calls unless
    /// `force` is set, and with [`Error::NeedsMoreSignatures`] while other
    /// parties still have unsigned authorization entries.
    pub fn sign(&mut self, force: bool) -> Result<()> {
        self.sign_inner(None, force)
    }

    /// Same as [`sign`](Self::sign) with an explicit signer.
    pub fn sign_with(&mut self, signer: &dyn Signer, force: bool) -> Result<()> {
        self.sign_inner(Some(signer), force)
    }

    fn sign_inner(&mut self, signer: Option<&dyn Signer>, force: bool) -> Result<()> {
        let built = self.built.clone().ok_or(Error::NotYetSimulated)?;
        if !force && self.is_read_call()? {
            return Err(Error::NoSignatureNeeded(
                "read calls are complete after simulation; pass force to sign anyway".to_owned(),
            ));
        }

        let fallback;
        let signer = match signer {
            Some(signer) => signer,
            None => {
                fallback = self.info.options.signer.clone().ok_or(Error::NoSigner)?;
                fallback.as_ref()
            }
        };

        let needed = self.needs_non_invoker_signing_by(false)?;
        if !needed.is_empty() {
            return Err(Error::NeedsMoreSignatures(needed));
        }

        // Refresh the validity window: prior steps (shipping the
        // transaction between signers, waiting on a wallet) may have
        // outlived the window set at build time.
        let mut tx = built;
        tx.cond = timebounds_from_now(self.info.method_options.timeout_in_seconds);
        self.built = Some(tx.clone());

        let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
            tx,
            signatures: VecM::default(),
        });
        self.signed =
            Some(signer.sign_transaction(&envelope, &self.info.options.network_passphrase)?);
        Ok(())
    }

    /// Signs this transaction's authorization entries on behalf of one
    /// co-signing account, splicing the signed entries back in place.
    ///
    /// The transaction is intentionally not re-simulated afterwards: the
    /// simulator already sized fees for entries of the signed shape, and a
    /// re-simulation would discard the signatures just collected.
    pub async fn sign_auth_entries(&mut self, options: SignAuthEntriesOptions<'_>) -> Result<()> {
        let fallback;
        let signer = match options.signer {
            Some(signer) => signer,
            None => {
                fallback = self.info.options.signer.clone().ok_or(Error::NoSigner)?;
                fallback.as_ref()
            }
        };
        let public_key = options
            .public_key
            .or_else(|| self.info.options.public_key.clone())
            .ok_or(Error::NoPublicKey)?;

        let required = self.needs_non_invoker_signing_by(true)?;
        if !required.contains(&public_key) {
            return Err(Error::NoSignatureNeeded(format!(
                "{public_key} is not a required co-signer of this transaction"
            )));
        }
        if self.needs_non_invoker_signing_by(false)?.is_empty() {
            return Err(Error::NoUnsignedNonInvokerAuthEntries);
        }

        let expiration_ledger = match options.expiration_ledger {
            Some(ledger) => ledger,
            None => self.get_storage_expiration().await?,
        };

        let mut tx = self.built.clone().ok_or(Error::NotYetSimulated)?;
        let mut operation = tx.operations[0].clone();
        let OperationBody::InvokeHostFunction(ref mut body) = operation.body else {
            return Err(Error::NotInvokeHostFunction);
        };

        let entries = body
            .auth
            .iter()
            .map(|entry| {
                let for_this_key = matches!(
                    &entry.credentials,
                    SorobanCredentials::Address(credentials)
                        if credentials.signature == ScVal::Void
                            && auth::entry_signer(entry).as_deref() == Some(public_key.as_str())
                );
                if for_this_key {
                    auth::authorize_entry(
                        entry,
                        signer,
                        expiration_ledger,
                        &self.info.options.network_passphrase,
                    )
                } else {
                    Ok(entry.clone())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        body.auth = entries.try_into()?;
        tx.operations = vec![operation].try_into()?;
        self.built = Some(tx);
        // A prior envelope signature, if any, no longer covers the spliced
        // entries.
        self.signed = None;
        Ok(())
    }

    /// Creates a [`SentTransaction`], submitting the signed envelope and
    /// polling until it reaches a terminal status.
    pub async fn send(&self) -> Result<SentTransaction> {
        let signed = self.signed.clone().ok_or(Error::NotYetSigned)?;
        SentTransaction::init(self.info.clone(), signed).await
    }

    /// [`sign`](Self::sign) (unless already signed) followed by
    /// [`send`](Self::send).
    pub async fn sign_and_send(&mut self, force: bool) -> Result<SentTransaction> {
        if self.signed.is_none() {
            self.sign(force)?;
        }
        self.send().await
    }

    /// The built transaction, present once at least one simulation has
    /// completed.
    pub fn built(&self) -> Option<&Transaction> {
        self.built.as_ref()
    }

    /// The envelope-signed transaction, present after signing.
    pub fn signed(&self) -> Option<&TransactionEnvelope> {
        self.signed.as_ref()
    }

    /// Serialises the transaction and its simulation extracts into the
    /// interchange form used to ship it to co-signers on other machines.
    pub fn to_json(&mut self) -> Result<String> {
        let data = self.simulation_data()?;
        let built = self.built.as_ref().ok_or(Error::NotYetSimulated)?;
        let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
            tx: built.clone(),
            signatures: VecM::default(),
        });

        let json = AssembledJson {
            method: self.info.method.clone(),
            tx: envelope.to_xdr_base64(Limits::none())?,
            simulation_result: Some(SimulationResultJson {
                auth: data
                    .result
                    .auth
                    .iter()
                    .map(|entry| entry.to_xdr_base64(Limits::none()))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                retval: data.result.retval.to_xdr_base64(Limits::none())?,
            }),
            simulation_transaction_data: Some(data.transaction_data.to_xdr_base64(Limits::none())?),
        };
        serde_json::to_string(&json).map_err(Error::SerializeTransaction)
    }

    /// Rehydrates a transaction from its interchange form. The result can
    /// be signed and sent but not re-simulated: the simulation happened on
    /// the machine that produced the JSON.
    pub(crate) fn from_json(mut info: InvokeInfo, json: &str) -> Result<Self> {
        let json: AssembledJson =
            serde_json::from_str(json).map_err(Error::DeserializeTransaction)?;
        info.method = json.method;

        let envelope = TransactionEnvelope::from_xdr_base64(&json.tx, Limits::none())?;
        let TransactionEnvelope::Tx(TransactionV1Envelope { tx, .. }) = envelope else {
            return Err(Error::Crypto(crate::crypto::Error::UnsupportedEnvelopeType));
        };

        let simulation_result = json
            .simulation_result
            .map(|result| {
                Ok::<_, Error>(SimulationResult {
                    auth: result
                        .auth
                        .iter()
                        .map(|entry| {
                            SorobanAuthorizationEntry::from_xdr_base64(entry, Limits::none())
                        })
                        .collect::<std::result::Result<Vec<_>, _>>()?,
                    retval: ScVal::from_xdr_base64(&result.retval, Limits::none())?,
                })
            })
            .transpose()?;
        let simulation_transaction_data = json
            .simulation_transaction_data
            .as_deref()
            .map(|data| SorobanTransactionData::from_xdr_base64(data, Limits::none()))
            .transpose()?;

        Ok(Self {
            info,
            raw: None,
            built: Some(tx),
            simulation: None,
            simulation_result,
            simulation_transaction_data,
            signed: None,
        })
    }

    /// Live-until ledger of the contract's persistent instance entry, the
    /// default signature expiration for auth-entry signing.
    async fn get_storage_expiration(&self) -> Result<u32> {
        let key = LedgerKey::ContractData(LedgerKeyContractData {
            contract: contract_address(&self.info.options.contract_id)?,
            key: ScVal::LedgerKeyContractInstance,
            durability: ContractDataDurability::Persistent,
        });
        let response = self.info.rpc.get_ledger_entries(&[key]).await?;
        response
            .entries
            .first()
            .and_then(|entry| entry.live_until_ledger_seq)
            .ok_or_else(|| Error::NotFound {
                what: "contract instance",
                key: self.info.options.contract_id.clone(),
            })
    }
}

/// The interchange form for multi-party signing flows.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssembledJson {
    method: String,
    /// Base64 envelope of the built transaction.
    tx: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    simulation_result: Option<SimulationResultJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    simulation_transaction_data: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulationResultJson {
    auth: Vec<String>,
    retval: String,
}

fn timebounds_from_now(timeout_in_seconds: u64) -> Preconditions {
    let now = chrono::Utc::now().timestamp() as u64;
    Preconditions::Time(TimeBounds {
        min_time: TimePoint(0),
        max_time: TimePoint(now + timeout_in_seconds),
    })
}

/// Applies a simulation response onto the raw transaction, producing the
/// assembled transaction ready for signing: authorization entries spliced
/// into the single invoke-host-function operation, fee raised to cover the
/// simulated resources, soroban transaction data installed.
fn assemble(raw: &Transaction, simulation: &SimulateTransactionResponse) -> Result<Transaction> {
    let mut tx = raw.clone();

    // Simulation results are one-per-function and presume a single
    // operation in the transaction.
    if tx.operations.len() != 1 {
        return Err(Error::UnexpectedOperationCount {
            count: tx.operations.len(),
        });
    }

    let transaction_data =
        SorobanTransactionData::from_xdr_base64(&simulation.transaction_data, Limits::none())?;

    let mut op = tx.operations[0].clone();
    if let OperationBody::InvokeHostFunction(ref mut body) = op.body {
        if body.auth.is_empty() {
            if simulation.results.len() != 1 {
                return Err(Error::UnexpectedSimulationResultSize {
                    length: simulation.results.len(),
                });
            }

            let auth = simulation.results[0]
                .auth
                .iter()
                .map(|entry| SorobanAuthorizationEntry::from_xdr_base64(entry, Limits::none()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            body.auth = auth.try_into()?;
        }
    }

    // Choose the larger of the requested fee or inclusion + resource fee.
    let inclusion_fee = u64::from(BASE_FEE);
    tx.fee = tx.fee.max(
        u32::try_from(inclusion_fee + simulation.min_resource_fee)
            .map_err(|_| Error::LargeFee(inclusion_fee + simulation.min_resource_fee))?,
    );

    tx.operations = vec![op].try_into()?;
    tx.ext = TransactionExt::V1(transaction_data);
    Ok(tx)
}
