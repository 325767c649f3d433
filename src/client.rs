use crate::{
    assembled::AssembledTransaction,
    components::{ClientOptions, InvokeInfo, MethodOptions},
    rpc::client::RpcClient,
    spec::ContractSpec,
    utils::contract_address,
    Error, Result,
};
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use stellar_xdr::curr::{
    ContractDataDurability, ContractExecutable, LedgerEntryData, LedgerKey, LedgerKeyContractCode,
    LedgerKeyContractData, Limits, ReadXdr, ScVal,
};
use url::Url;

/// Typed façade over one deployed contract.
///
/// Every function the contract's spec declares is callable through
/// [`invoke`](Self::invoke), which marshals the named arguments, builds and
/// simulates the transaction, and hands back the resulting
/// [`AssembledTransaction`] for reading, signing or shipping to co-signers.
#[derive(Debug, Clone)]
pub struct ContractClient {
    spec: Arc<ContractSpec>,
    options: Arc<ClientOptions>,
    error_types: Arc<BTreeMap<u32, String>>,
    rpc: RpcClient,
}

impl ContractClient {
    /// Creates a client for the given spec and options.
    ///
    /// The RPC endpoint must be `https` unless `allow_http` is set, and the
    /// contract id has to be a valid `C...` address.
    pub fn new(spec: ContractSpec, options: ClientOptions) -> Result<Self> {
        contract_address(&options.contract_id)?;
        let url = parse_rpc_url(&options)?;
        let rpc = RpcClient::new(url).map_err(Error::CreateClient)?;

        let error_types = spec
            .error_cases()
            .into_iter()
            .map(|case| (case.value, case.doc))
            .collect::<BTreeMap<_, _>>();

        Ok(Self {
            spec: Arc::new(spec),
            options: Arc::new(options),
            error_types: Arc::new(error_types),
            rpc,
        })
    }

    /// Creates a client by extracting the spec from a compiled contract
    /// module.
    pub fn from_wasm(wasm: &[u8], options: ClientOptions) -> Result<Self> {
        Self::new(ContractSpec::from_wasm(wasm)?, options)
    }

    /// Creates a client by fetching the deployed contract's wasm from the
    /// chain and extracting the spec out of it: the contract-data ledger
    /// entry names the wasm hash, the contract-code entry carries the
    /// module bytes.
    pub async fn from_network(options: ClientOptions) -> Result<Self> {
        let contract = contract_address(&options.contract_id)?;
        let rpc = RpcClient::new(parse_rpc_url(&options)?).map_err(Error::CreateClient)?;

        let instance_key = LedgerKey::ContractData(LedgerKeyContractData {
            contract,
            key: ScVal::LedgerKeyContractInstance,
            durability: ContractDataDurability::Persistent,
        });
        let response = rpc.get_ledger_entries(&[instance_key]).await?;
        let entry = response.entries.first().ok_or_else(|| Error::NotFound {
            what: "contract instance",
            key: options.contract_id.clone(),
        })?;
        let LedgerEntryData::ContractData(data) =
            LedgerEntryData::from_xdr_base64(&entry.xdr, Limits::none())?
        else {
            return Err(Error::UnexpectedLedgerEntry(entry.xdr.clone()));
        };
        let ScVal::ContractInstance(instance) = data.val else {
            return Err(Error::UnexpectedLedgerEntry(entry.xdr.clone()));
        };
        let wasm_hash = match instance.executable {
            ContractExecutable::Wasm(hash) => hash,
            // Built-in asset contracts have no wasm and therefore no
            // embedded spec.
            ContractExecutable::StellarAsset => {
                return Err(Error::UnexpectedContractExecutable(
                    options.contract_id.clone(),
                ))
            }
        };

        let code_key = LedgerKey::ContractCode(LedgerKeyContractCode { hash: wasm_hash });
        let response = rpc.get_ledger_entries(&[code_key]).await?;
        let entry = response.entries.first().ok_or_else(|| Error::NotFound {
            what: "contract code",
            key: options.contract_id.clone(),
        })?;
        let LedgerEntryData::ContractCode(code) =
            LedgerEntryData::from_xdr_base64(&entry.xdr, Limits::none())?
        else {
            return Err(Error::UnexpectedLedgerEntry(entry.xdr.clone()));
        };

        Self::from_wasm(code.code.as_slice(), options)
    }

    /// The interface description this client was built from.
    pub fn spec(&self) -> &ContractSpec {
        &self.spec
    }

    /// The options this client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Invokes a contract method by name, returning the assembled (and, by
    /// default, simulated) transaction.
    ///
    /// Arguments
    ///
    /// - method - Function that is declared in the contract spec
    /// - args - Function arguments as a JSON object, [`None`] for
    ///   zero-input functions
    /// - options - Per-invocation overrides
    pub async fn invoke(
        &self,
        method: &str,
        args: Option<&Value>,
        options: MethodOptions,
    ) -> Result<AssembledTransaction> {
        let args = self.spec.func_args_to_scvals(method, args)?;
        AssembledTransaction::build(self.invoke_info(method, args, options)).await
    }

    /// Rehydrates an [`AssembledTransaction`] from the interchange form
    /// produced by [`AssembledTransaction::to_json`], bound to this
    /// client's spec and options.
    pub fn tx_from_json(&self, json: &str) -> Result<AssembledTransaction> {
        AssembledTransaction::from_json(
            self.invoke_info("", Vec::new(), MethodOptions::default()),
            json,
        )
    }

    fn invoke_info(&self, method: &str, args: Vec<ScVal>, options: MethodOptions) -> InvokeInfo {
        InvokeInfo {
            rpc: self.rpc.clone(),
            spec: self.spec.clone(),
            options: self.options.clone(),
            error_types: self.error_types.clone(),
            method: method.to_owned(),
            args,
            method_options: options,
        }
    }
}

fn parse_rpc_url(options: &ClientOptions) -> Result<Url> {
    let url = Url::parse(&options.rpc_url)
        .map_err(|err| Error::InvalidRpcUrl(options.rpc_url.clone(), err))?;
    if url.scheme() != "https" && !options.allow_http {
        return Err(Error::HttpSchemeNotAllowed(options.rpc_url.clone()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellar_xdr::curr::{
        ScSpecEntry, ScSpecFunctionV0, ScSpecUdtErrorEnumCaseV0, ScSpecUdtErrorEnumV0, ScSymbol,
        StringM, VecM,
    };

    const CONTRACT: &str = "CA3D5KRYM6CB7OWQ6TWYRR3Z4T7GNZLKERYNZGGA5SOAOPIFY6YQGAXE";

    fn spec() -> ContractSpec {
        ContractSpec::new(vec![
            ScSpecEntry::FunctionV0(ScSpecFunctionV0 {
                doc: StringM::default(),
                name: ScSymbol("inc".try_into().unwrap()),
                inputs: VecM::default(),
                outputs: VecM::default(),
            }),
            ScSpecEntry::UdtErrorEnumV0(ScSpecUdtErrorEnumV0 {
                doc: StringM::default(),
                lib: StringM::default(),
                name: "Error".try_into().unwrap(),
                cases: vec![ScSpecUdtErrorEnumCaseV0 {
                    doc: "insufficient".try_into().unwrap(),
                    name: "Insufficient".try_into().unwrap(),
                    value: 3,
                }]
                .try_into()
                .unwrap(),
            }),
        ])
    }

    #[test]
    fn http_needs_opt_in() {
        let err = ContractClient::new(
            spec(),
            ClientOptions {
                rpc_url: "http://localhost:8000".to_owned(),
                contract_id: CONTRACT.to_owned(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::HttpSchemeNotAllowed(_)));

        ContractClient::new(
            spec(),
            ClientOptions {
                rpc_url: "http://localhost:8000".to_owned(),
                contract_id: CONTRACT.to_owned(),
                allow_http: true,
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn bogus_contract_id_is_rejected() {
        let err = ContractClient::new(
            spec(),
            ClientOptions {
                rpc_url: "https://localhost:8000".to_owned(),
                contract_id: "not-a-contract".to_owned(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn error_cases_fold_into_the_error_table() {
        let client = ContractClient::new(
            spec(),
            ClientOptions {
                rpc_url: "https://localhost:8000".to_owned(),
                contract_id: CONTRACT.to_owned(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            client.error_types.get(&3).map(String::as_str),
            Some("insufficient")
        );
    }
}
