mod value;

use serde_json::Value;
use std::io::Cursor;
use stellar_xdr::curr::{
    Limited, Limits, ReadXdr, ScSpecEntry, ScSpecFunctionV0, ScSpecTypeDef, ScVal,
};
use wasmparser::{Parser, Payload};

type Result<T> = std::result::Result<T, Error>;

/// Name of the wasm custom section carrying the interface description.
const SPEC_SECTION: &str = "contractspecv0";

/// Immutable, machine-readable description of a contract's interface:
/// its functions, user-defined types and error cases.
///
/// The native value form on this side of the wire is [`serde_json::Value`];
/// the spec drives the conversion to and from the host's tagged `ScVal`
/// representation.
#[derive(Debug, Clone)]
pub struct ContractSpec {
    entries: Vec<ScSpecEntry>,
}

impl ContractSpec {
    /// Wraps an already-decoded sequence of spec entries
    pub fn new(entries: Vec<ScSpecEntry>) -> Self {
        Self { entries }
    }

    /// Extracts and stream-decodes the spec from the `contractspecv0`
    /// custom section of a compiled contract module.
    pub fn from_wasm(wasm: &[u8]) -> Result<Self> {
        let mut section = None;
        for payload in Parser::new(0).parse_all(wasm) {
            if let Payload::CustomSection(reader) = payload? {
                if reader.name() == SPEC_SECTION {
                    section = Some(reader.data().to_vec());
                    break;
                }
            }
        }
        let section = section.ok_or(Error::MissingSpecSection)?;

        let mut cursor = Limited::new(Cursor::new(&section), Limits::none());
        let mut entries = Vec::new();
        for entry in ScSpecEntry::read_xdr_iter(&mut cursor) {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    // One record per iteration; anything the decoder can't
                    // consume is unexpected trailing data.
                    tracing::warn!(%err, "spec section has undecodable residue");
                    break;
                }
            }
        }
        Ok(Self::new(entries))
    }

    /// All raw spec entries, in declaration order
    pub fn entries(&self) -> &[ScSpecEntry] {
        &self.entries
    }

    /// Ordered function descriptors
    pub fn funcs(&self) -> Vec<&ScSpecFunctionV0> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ScSpecEntry::FunctionV0(func) => Some(func),
                _ => None,
            })
            .collect()
    }

    /// Looks a function up by name
    pub fn get_func(&self, name: &str) -> Result<&ScSpecFunctionV0> {
        self.funcs()
            .into_iter()
            .find(|func| func.name.0.to_utf8_string_lossy() == name)
            .ok_or_else(|| Error::FunctionNotFound(name.to_owned()))
    }

    /// Marshals a mapping from argument name to native value into the
    /// ordered sequence of wire values the function declares.
    ///
    /// Arguments
    ///
    /// - name - Function that is declared in the contract spec
    /// - args - Function arguments as a JSON object, could be empty
    pub fn func_args_to_scvals(&self, name: &str, args: Option<&Value>) -> Result<Vec<ScVal>> {
        let func = self.get_func(name)?;
        let empty = serde_json::Map::new();
        let object = match args {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(object)) => object,
            Some(other) => return Err(Error::InvalidArguments(other.to_string())),
        };

        let vals = func
            .inputs
            .iter()
            .map(|input| {
                let arg = input.name.to_utf8_string_lossy();
                match object.get(&arg) {
                    Some(it) => value::to_scval(self, &input.type_, it),
                    // An omitted optional argument marshals to the empty
                    // value; anything else has to be present.
                    None if matches!(input.type_, ScSpecTypeDef::Option(_)) => Ok(ScVal::Void),
                    None => Err(Error::MissingArgument {
                        func: name.to_owned(),
                        arg,
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(unknown) = object
            .keys()
            .find(|key| !func.inputs.iter().any(|input| &input.name.to_utf8_string_lossy() == *key))
        {
            return Err(Error::UnexpectedArgument {
                func: name.to_owned(),
                arg: unknown.clone(),
            });
        }
        Ok(vals)
    }

    /// Parses a function's wire return value back into its native form
    pub fn func_res_to_native(&self, name: &str, val: &ScVal) -> Result<Value> {
        let func = self.get_func(name)?;
        match func.outputs.first() {
            None => match val {
                ScVal::Void => Ok(Value::Null),
                other => Err(Error::unexpected_name("Void", other)),
            },
            Some(ty) => value::from_scval(self, ty, val),
        }
    }

    /// Error cases declared by the contract, as `(code, doc)` pairs in
    /// declaration order
    pub fn error_cases(&self) -> Vec<ErrorCase> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ScSpecEntry::UdtErrorEnumV0(error_enum) => Some(error_enum),
                _ => None,
            })
            .flat_map(|error_enum| {
                error_enum.cases.iter().map(|case| {
                    let doc = case.doc.to_utf8_string_lossy();
                    ErrorCase {
                        value: case.value,
                        doc: if doc.is_empty() {
                            case.name.to_utf8_string_lossy()
                        } else {
                            doc
                        },
                    }
                })
            })
            .collect()
    }

    pub(crate) fn find_entry(&self, name: &str) -> Option<&ScSpecEntry> {
        self.entries.iter().find(|entry| {
            let entry_name = match entry {
                ScSpecEntry::FunctionV0(it) => it.name.0.to_utf8_string_lossy(),
                ScSpecEntry::UdtStructV0(it) => it.name.to_utf8_string_lossy(),
                ScSpecEntry::UdtUnionV0(it) => it.name.to_utf8_string_lossy(),
                ScSpecEntry::UdtEnumV0(it) => it.name.to_utf8_string_lossy(),
                ScSpecEntry::UdtErrorEnumV0(it) => it.name.to_utf8_string_lossy(),
            };
            entry_name == name
        })
    }
}

/// One error case of the contract, keyed by its numeric code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCase {
    /// Contract-chosen small non-negative code
    pub value: u32,
    /// Human-readable description from the spec
    pub doc: String,
}

/// Describes spec introspection and marshalling failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Function \"{0}\" is not declared in the contract spec")]
    FunctionNotFound(String),
    #[error("Type \"{0}\" is not declared in the contract spec")]
    TypeNotFound(String),
    #[error("Missing a non-optional argument \"{arg}\" of \"{func}\"")]
    MissingArgument { func: String, arg: String },
    #[error("Argument \"{arg}\" is not declared by \"{func}\"")]
    UnexpectedArgument { func: String, arg: String },
    #[error("Arguments must be passed as a JSON object, got: [\"{0}\"]")]
    InvalidArguments(String),
    #[error("Value [\"{value}\"] doesn't fit the declared type \"{ty}\"")]
    InvalidValue { ty: String, value: String },
    #[error("Wire value [\"{value}\"] doesn't match the declared type \"{ty}\"")]
    UnexpectedValue { ty: String, value: String },
    #[error("Field \"{field}\" of \"{udt}\" is missing")]
    MissingField { udt: String, field: String },
    #[error("\"{case}\" is not a case of the union \"{udt}\"")]
    UnknownUnionCase { udt: String, case: String },
    #[error("Couldn't parse \"{0}\" as an address")]
    InvalidAddress(String),
    #[error("No conversion for type \"{0}\"")]
    UnsupportedType(String),
    #[error("The module carries no \"contractspecv0\" custom section")]
    MissingSpecSection,
    #[error("Couldn't parse the wasm module, cause: [\"{0}\"]")]
    Wasm(#[from] wasmparser::BinaryReaderError),
    #[error("Spec entry encoding failed, cause: [\"{0}\"]")]
    Xdr(#[from] stellar_xdr::curr::Error),
}

impl Error {
    fn mismatch(ty: &ScSpecTypeDef, value: &Value) -> Self {
        Self::InvalidValue {
            ty: format!("{ty:?}"),
            value: value.to_string(),
        }
    }

    fn mismatch_name(ty: &str, value: &Value) -> Self {
        Self::InvalidValue {
            ty: ty.to_owned(),
            value: value.to_string(),
        }
    }

    fn unexpected(ty: &ScSpecTypeDef, val: &ScVal) -> Self {
        Self::UnexpectedValue {
            ty: format!("{ty:?}"),
            value: format!("{val:?}"),
        }
    }

    fn unexpected_name(ty: &str, val: &ScVal) -> Self {
        Self::UnexpectedValue {
            ty: ty.to_owned(),
            value: format!("{val:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stellar_xdr::curr::{
        ScSpecFunctionInputV0, ScSpecTypeOption, ScSpecTypeVec, ScSpecUdtErrorEnumCaseV0,
        ScSpecUdtErrorEnumV0, ScSpecUdtStructFieldV0, ScSpecUdtStructV0, ScSpecUdtUnionCaseTupleV0,
        ScSpecUdtUnionCaseV0, ScSpecUdtUnionCaseVoidV0, ScSpecUdtUnionV0, ScString, ScSymbol,
        ScVec, StringM, WriteXdr,
    };

    fn function(
        name: &str,
        inputs: Vec<(&str, ScSpecTypeDef)>,
        output: Option<ScSpecTypeDef>,
    ) -> ScSpecEntry {
        ScSpecEntry::FunctionV0(ScSpecFunctionV0 {
            doc: StringM::default(),
            name: ScSymbol(name.try_into().unwrap()),
            inputs: inputs
                .into_iter()
                .map(|(input, type_)| ScSpecFunctionInputV0 {
                    doc: StringM::default(),
                    name: input.try_into().unwrap(),
                    type_,
                })
                .collect::<Vec<_>>()
                .try_into()
                .unwrap(),
            outputs: output.into_iter().collect::<Vec<_>>().try_into().unwrap(),
        })
    }

    fn token_spec() -> ContractSpec {
        ContractSpec::new(vec![
            function(
                "transfer",
                vec![
                    ("from", ScSpecTypeDef::Address),
                    ("to", ScSpecTypeDef::Address),
                    ("amount", ScSpecTypeDef::I128),
                    (
                        "memo",
                        ScSpecTypeDef::Option(Box::new(ScSpecTypeOption {
                            value_type: Box::new(ScSpecTypeDef::String),
                        })),
                    ),
                ],
                None,
            ),
            function(
                "hello",
                vec![("to", ScSpecTypeDef::String)],
                Some(ScSpecTypeDef::Vec(Box::new(ScSpecTypeVec {
                    element_type: Box::new(ScSpecTypeDef::String),
                }))),
            ),
            ScSpecEntry::UdtErrorEnumV0(ScSpecUdtErrorEnumV0 {
                doc: StringM::default(),
                lib: StringM::default(),
                name: "Error".try_into().unwrap(),
                cases: vec![
                    ScSpecUdtErrorEnumCaseV0 {
                        doc: "balance is not sufficient".try_into().unwrap(),
                        name: "InsufficientBalance".try_into().unwrap(),
                        value: 3,
                    },
                    ScSpecUdtErrorEnumCaseV0 {
                        doc: StringM::default(),
                        name: "NotAuthorized".try_into().unwrap(),
                        value: 4,
                    },
                ]
                .try_into()
                .unwrap(),
            }),
        ])
    }

    const ALICE: &str = "GBZXN7PIRZGNMHGA7MUUUF4GWPY5AYPV6LY4UV2GL6VJGIQRXFDNMADI";

    #[test]
    fn funcs_are_ordered() {
        let spec = token_spec();
        let names = spec
            .funcs()
            .iter()
            .map(|func| func.name.0.to_utf8_string_lossy())
            .collect::<Vec<_>>();
        assert_eq!(names, ["transfer", "hello"]);
    }

    #[test]
    fn args_marshal_in_declared_order() {
        let spec = token_spec();
        let vals = spec
            .func_args_to_scvals(
                "transfer",
                Some(&json!({
                    "amount": "100000",
                    "to": ALICE,
                    "from": ALICE,
                })),
            )
            .unwrap();

        assert_eq!(vals.len(), 4);
        assert!(matches!(vals[0], ScVal::Address(_)));
        assert!(matches!(vals[1], ScVal::Address(_)));
        assert!(matches!(&vals[2], ScVal::I128(parts) if parts.lo == 100000));
        // omitted optional memo
        assert_eq!(vals[3], ScVal::Void);
    }

    #[test]
    fn missing_argument_is_rejected() {
        let spec = token_spec();
        let err = spec
            .func_args_to_scvals("transfer", Some(&json!({ "from": ALICE, "to": ALICE })))
            .unwrap_err();
        assert!(matches!(err, Error::MissingArgument { arg, .. } if arg == "amount"));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let spec = token_spec();
        let err = spec
            .func_args_to_scvals("hello", Some(&json!({ "to": "world", "loud": true })))
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedArgument { arg, .. } if arg == "loud"));
    }

    #[test]
    fn result_parses_into_native() {
        let spec = token_spec();
        let retval = ScVal::Vec(Some(ScVec(
            vec![
                ScVal::String(ScString("Hello".try_into().unwrap())),
                ScVal::String(ScString("world".try_into().unwrap())),
            ]
            .try_into()
            .unwrap(),
        )));

        let native = spec.func_res_to_native("hello", &retval).unwrap();
        assert_eq!(native, json!(["Hello", "world"]));
    }

    #[test]
    fn void_result_is_null() {
        let spec = token_spec();
        assert_eq!(
            spec.func_res_to_native("transfer", &ScVal::Void).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn error_cases_fall_back_to_case_names() {
        let cases = token_spec().error_cases();
        assert_eq!(
            cases,
            vec![
                ErrorCase {
                    value: 3,
                    doc: "balance is not sufficient".to_owned()
                },
                ErrorCase {
                    value: 4,
                    doc: "NotAuthorized".to_owned()
                },
            ]
        );
    }

    #[test]
    fn structs_and_unions_round_trip() {
        let spec = ContractSpec::new(vec![
            ScSpecEntry::UdtStructV0(ScSpecUdtStructV0 {
                doc: StringM::default(),
                lib: StringM::default(),
                name: "Pair".try_into().unwrap(),
                fields: vec![
                    ScSpecUdtStructFieldV0 {
                        doc: StringM::default(),
                        name: "a".try_into().unwrap(),
                        type_: ScSpecTypeDef::U32,
                    },
                    ScSpecUdtStructFieldV0 {
                        doc: StringM::default(),
                        name: "b".try_into().unwrap(),
                        type_: ScSpecTypeDef::Symbol,
                    },
                ]
                .try_into()
                .unwrap(),
            }),
            ScSpecEntry::UdtUnionV0(ScSpecUdtUnionV0 {
                doc: StringM::default(),
                lib: StringM::default(),
                name: "Shape".try_into().unwrap(),
                cases: vec![
                    ScSpecUdtUnionCaseV0::VoidV0(ScSpecUdtUnionCaseVoidV0 {
                        doc: StringM::default(),
                        name: "Empty".try_into().unwrap(),
                    }),
                    ScSpecUdtUnionCaseV0::TupleV0(ScSpecUdtUnionCaseTupleV0 {
                        doc: StringM::default(),
                        name: "Square".try_into().unwrap(),
                        type_: vec![ScSpecTypeDef::U32].try_into().unwrap(),
                    }),
                ]
                .try_into()
                .unwrap(),
            }),
            function(
                "draw",
                vec![
                    (
                        "pair",
                        ScSpecTypeDef::Udt(stellar_xdr::curr::ScSpecTypeUdt {
                            name: "Pair".try_into().unwrap(),
                        }),
                    ),
                    (
                        "shape",
                        ScSpecTypeDef::Udt(stellar_xdr::curr::ScSpecTypeUdt {
                            name: "Shape".try_into().unwrap(),
                        }),
                    ),
                ],
                None,
            ),
        ]);

        let vals = spec
            .func_args_to_scvals(
                "draw",
                Some(&json!({
                    "pair": { "a": 7, "b": "seven" },
                    "shape": { "tag": "Square", "values": [4] },
                })),
            )
            .unwrap();

        assert!(matches!(&vals[0], ScVal::Map(Some(map)) if map.len() == 2));
        assert!(
            matches!(&vals[1], ScVal::Vec(Some(vec)) if vec.len() == 2
                && matches!(&vec[0], ScVal::Symbol(tag) if tag.0.to_utf8_string_lossy() == "Square"))
        );
    }

    #[test]
    fn spec_streams_out_of_wasm_custom_section() {
        let spec = token_spec();
        let mut section = Vec::new();
        for entry in spec.entries() {
            section.extend(entry.to_xdr(Limits::none()).unwrap());
        }

        let wasm = wasm_with_custom_section(SPEC_SECTION, &section);
        let parsed = ContractSpec::from_wasm(&wasm).unwrap();
        assert_eq!(parsed.entries(), spec.entries());
        assert_eq!(parsed.funcs().len(), 2);
    }

    #[test]
    fn missing_section_is_an_error() {
        let wasm = wasm_with_custom_section("name", b"whatever");
        assert!(matches!(
            ContractSpec::from_wasm(&wasm),
            Err(Error::MissingSpecSection)
        ));
    }

    /// Minimal wasm module: magic, version and a single custom section.
    pub(crate) fn wasm_with_custom_section(name: &str, data: &[u8]) -> Vec<u8> {
        fn leb128(mut value: usize, out: &mut Vec<u8>) {
            loop {
                let mut byte = (value & 0x7f) as u8;
                value >>= 7;
                if value != 0 {
                    byte |= 0x80;
                }
                out.push(byte);
                if value == 0 {
                    break;
                }
            }
        }

        let mut payload = Vec::new();
        leb128(name.len(), &mut payload);
        payload.extend(name.as_bytes());
        payload.extend(data);

        let mut wasm = b"\0asm\x01\0\0\0".to_vec();
        wasm.push(0); // custom section id
        leb128(payload.len(), &mut wasm);
        wasm.extend(payload);
        wasm
    }
}
