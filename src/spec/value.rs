use super::{ContractSpec, Error};
use base64::prelude::*;
use serde_json::{json, Map, Value};
use stellar_xdr::curr::{
    self as xdr, Int128Parts, ScBytes, ScError, ScMap, ScMapEntry, ScSpecEntry, ScSpecTypeDef,
    ScSpecUdtStructV0, ScSpecUdtUnionCaseV0, ScSpecUdtUnionV0, ScString, ScSymbol, ScVal, ScVec,
    TimePoint, UInt128Parts,
};

type Result<T> = std::result::Result<T, Error>;

/// Converts a native JSON value into the wire value declared by `ty`.
pub(crate) fn to_scval(spec: &ContractSpec, ty: &ScSpecTypeDef, value: &Value) -> Result<ScVal> {
    match ty {
        ScSpecTypeDef::Val => guess_scval(value),
        ScSpecTypeDef::Bool => value
            .as_bool()
            .map(ScVal::Bool)
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::Void => match value {
            Value::Null => Ok(ScVal::Void),
            _ => Err(Error::mismatch(ty, value)),
        },
        ScSpecTypeDef::Error => u32_from(value)
            .map(|code| ScVal::Error(ScError::Contract(code)))
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::U32 => u32_from(value)
            .map(ScVal::U32)
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::I32 => value
            .as_i64()
            .and_then(|it| i32::try_from(it).ok())
            .map(ScVal::I32)
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::U64 => value
            .as_u64()
            .map(ScVal::U64)
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::I64 => value
            .as_i64()
            .map(ScVal::I64)
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::Timepoint => value
            .as_u64()
            .map(|it| ScVal::Timepoint(TimePoint(it)))
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::Duration => value
            .as_u64()
            .map(|it| ScVal::Duration(xdr::Duration(it)))
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::U128 => u128_from(value)
            .map(|it| {
                ScVal::U128(UInt128Parts {
                    hi: (it >> 64) as u64,
                    lo: it as u64,
                })
            })
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::I128 => i128_from(value)
            .map(|it| {
                ScVal::I128(Int128Parts {
                    hi: (it >> 64) as i64,
                    lo: it as u64,
                })
            })
            .ok_or_else(|| Error::mismatch(ty, value)),
        ScSpecTypeDef::Bytes => {
            let bytes = bytes_from(value).ok_or_else(|| Error::mismatch(ty, value))?;
            Ok(ScVal::Bytes(ScBytes(bytes.try_into()?)))
        }
        ScSpecTypeDef::BytesN(spec_ty) => {
            let bytes = bytes_from(value).ok_or_else(|| Error::mismatch(ty, value))?;
            if bytes.len() != spec_ty.n as usize {
                return Err(Error::mismatch(ty, value));
            }
            Ok(ScVal::Bytes(ScBytes(bytes.try_into()?)))
        }
        ScSpecTypeDef::String => {
            let it = value.as_str().ok_or_else(|| Error::mismatch(ty, value))?;
            Ok(ScVal::String(ScString(it.try_into()?)))
        }
        ScSpecTypeDef::Symbol => {
            let it = value.as_str().ok_or_else(|| Error::mismatch(ty, value))?;
            Ok(ScVal::Symbol(ScSymbol(it.try_into()?)))
        }
        ScSpecTypeDef::Address => value
            .as_str()
            .map(address_from)
            .ok_or_else(|| Error::mismatch(ty, value))?,
        ScSpecTypeDef::Option(opt) => match value {
            Value::Null => Ok(ScVal::Void),
            some => to_scval(spec, &opt.value_type, some),
        },
        ScSpecTypeDef::Result(result) => to_scval(spec, &result.ok_type, value),
        ScSpecTypeDef::Vec(vec_ty) => value
            .as_array()
            .map(|items| {
                let vals = items
                    .iter()
                    .map(|it| to_scval(spec, &vec_ty.element_type, it))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ScVal::Vec(Some(ScVec(vals.try_into()?))))
            })
            .ok_or_else(|| Error::mismatch(ty, value))?,
        ScSpecTypeDef::Map(map_ty) => value
            .as_object()
            .map(|entries| {
                let pairs = entries
                    .iter()
                    .map(|(key, val)| {
                        let key = to_scval(spec, &map_ty.key_type, &Value::String(key.clone()))
                            .or_else(|_| to_scval(spec, &map_ty.key_type, &key_value(key)))?;
                        let val = to_scval(spec, &map_ty.value_type, val)?;
                        Ok((key, val))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ScVal::Map(Some(ScMap::sorted_from(pairs)?)))
            })
            .ok_or_else(|| Error::mismatch(ty, value))?,
        ScSpecTypeDef::Tuple(tuple_ty) => {
            let items = value.as_array().ok_or_else(|| Error::mismatch(ty, value))?;
            if items.len() != tuple_ty.value_types.len() {
                return Err(Error::mismatch(ty, value));
            }
            let vals = items
                .iter()
                .zip(tuple_ty.value_types.iter())
                .map(|(it, item_ty)| to_scval(spec, item_ty, it))
                .collect::<Result<Vec<_>>>()?;
            Ok(ScVal::Vec(Some(ScVec(vals.try_into()?))))
        }
        ScSpecTypeDef::Udt(udt) => {
            let name = udt.name.to_utf8_string_lossy();
            match spec.find_entry(&name) {
                Some(ScSpecEntry::UdtStructV0(entry)) => struct_to_scval(spec, entry, value),
                Some(ScSpecEntry::UdtUnionV0(entry)) => union_to_scval(spec, entry, value),
                Some(ScSpecEntry::UdtEnumV0(_)) => u32_from(value)
                    .map(ScVal::U32)
                    .ok_or_else(|| Error::mismatch(ty, value)),
                Some(ScSpecEntry::UdtErrorEnumV0(_)) => u32_from(value)
                    .map(|code| ScVal::Error(ScError::Contract(code)))
                    .ok_or_else(|| Error::mismatch(ty, value)),
                _ => Err(Error::TypeNotFound(name)),
            }
        }
        other => Err(Error::UnsupportedType(format!("{other:?}"))),
    }
}

/// Converts a wire value back into its native JSON form, guided by the
/// declared type.
pub(crate) fn from_scval(spec: &ContractSpec, ty: &ScSpecTypeDef, val: &ScVal) -> Result<Value> {
    match (ty, val) {
        (ScSpecTypeDef::Val, val) => guess_native(val),
        (ScSpecTypeDef::Bool, ScVal::Bool(it)) => Ok(json!(it)),
        (ScSpecTypeDef::Void, ScVal::Void) => Ok(Value::Null),
        (ScSpecTypeDef::U32, ScVal::U32(it)) => Ok(json!(it)),
        (ScSpecTypeDef::I32, ScVal::I32(it)) => Ok(json!(it)),
        (ScSpecTypeDef::U64, ScVal::U64(it)) => Ok(json!(it)),
        (ScSpecTypeDef::I64, ScVal::I64(it)) => Ok(json!(it)),
        (ScSpecTypeDef::Timepoint, ScVal::Timepoint(TimePoint(it))) => Ok(json!(it)),
        (ScSpecTypeDef::Duration, ScVal::Duration(xdr::Duration(it))) => Ok(json!(it)),
        (ScSpecTypeDef::U128, ScVal::U128(parts)) => {
            Ok(json!(((parts.hi as u128) << 64 | parts.lo as u128).to_string()))
        }
        (ScSpecTypeDef::I128, ScVal::I128(parts)) => {
            Ok(json!((((parts.hi as i128) << 64) | parts.lo as i128).to_string()))
        }
        (ScSpecTypeDef::Bytes | ScSpecTypeDef::BytesN(_), ScVal::Bytes(bytes)) => {
            Ok(json!(BASE64_STANDARD.encode(bytes.as_slice())))
        }
        (ScSpecTypeDef::String, ScVal::String(it)) => Ok(json!(it.0.to_utf8_string_lossy())),
        (ScSpecTypeDef::Symbol, ScVal::Symbol(it)) => Ok(json!(it.0.to_utf8_string_lossy())),
        (ScSpecTypeDef::Address, ScVal::Address(address)) => {
            Ok(json!(crate::utils::address_to_string(address)))
        }
        (ScSpecTypeDef::Option(_), ScVal::Void) => Ok(Value::Null),
        (ScSpecTypeDef::Option(opt), some) => from_scval(spec, &opt.value_type, some),
        (ScSpecTypeDef::Result(result), val) => from_scval(spec, &result.ok_type, val),
        (ScSpecTypeDef::Vec(vec_ty), ScVal::Vec(Some(items))) => Ok(Value::Array(
            items
                .iter()
                .map(|it| from_scval(spec, &vec_ty.element_type, it))
                .collect::<Result<Vec<_>>>()?,
        )),
        (ScSpecTypeDef::Map(map_ty), ScVal::Map(Some(entries))) => {
            let mut object = Map::new();
            for ScMapEntry { key, val } in entries.iter() {
                let key = match from_scval(spec, &map_ty.key_type, key)? {
                    Value::String(it) => it,
                    other => other.to_string(),
                };
                object.insert(key, from_scval(spec, &map_ty.value_type, val)?);
            }
            Ok(Value::Object(object))
        }
        (ScSpecTypeDef::Tuple(tuple_ty), ScVal::Vec(Some(items))) => {
            if items.len() != tuple_ty.value_types.len() {
                return Err(Error::mismatch(ty, &json!(items.len())));
            }
            Ok(Value::Array(
                items
                    .iter()
                    .zip(tuple_ty.value_types.iter())
                    .map(|(it, item_ty)| from_scval(spec, item_ty, it))
                    .collect::<Result<Vec<_>>>()?,
            ))
        }
        (ScSpecTypeDef::Udt(udt), val) => {
            let name = udt.name.to_utf8_string_lossy();
            match spec.find_entry(&name) {
                Some(ScSpecEntry::UdtStructV0(entry)) => struct_from_scval(spec, entry, val),
                Some(ScSpecEntry::UdtUnionV0(entry)) => union_from_scval(spec, entry, val),
                Some(ScSpecEntry::UdtEnumV0(_)) => match val {
                    ScVal::U32(it) => Ok(json!(it)),
                    _ => Err(Error::unexpected(ty, val)),
                },
                Some(ScSpecEntry::UdtErrorEnumV0(_)) => match val {
                    ScVal::Error(ScError::Contract(code)) => Ok(json!(code)),
                    _ => Err(Error::unexpected(ty, val)),
                },
                _ => Err(Error::TypeNotFound(name)),
            }
        }
        (ty, val) => Err(Error::unexpected(ty, val)),
    }
}

fn struct_to_scval(spec: &ContractSpec, entry: &ScSpecUdtStructV0, value: &Value) -> Result<ScVal> {
    if is_tuple_struct(entry) {
        let items = value
            .as_array()
            .filter(|items| items.len() == entry.fields.len())
            .ok_or_else(|| Error::mismatch_name(&entry.name.to_utf8_string_lossy(), value))?;
        let vals = items
            .iter()
            .zip(entry.fields.iter())
            .map(|(it, field)| to_scval(spec, &field.type_, it))
            .collect::<Result<Vec<_>>>()?;
        return Ok(ScVal::Vec(Some(ScVec(vals.try_into()?))));
    }

    let object = value
        .as_object()
        .ok_or_else(|| Error::mismatch_name(&entry.name.to_utf8_string_lossy(), value))?;
    let pairs = entry
        .fields
        .iter()
        .map(|field| {
            let name = field.name.to_utf8_string_lossy();
            let field_value = object.get(&name).ok_or_else(|| Error::MissingField {
                udt: entry.name.to_utf8_string_lossy(),
                field: name.clone(),
            })?;
            Ok((
                ScVal::Symbol(ScSymbol(name.as_str().try_into()?)),
                to_scval(spec, &field.type_, field_value)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ScVal::Map(Some(ScMap::sorted_from(pairs)?)))
}

fn struct_from_scval(spec: &ContractSpec, entry: &ScSpecUdtStructV0, val: &ScVal) -> Result<Value> {
    if is_tuple_struct(entry) {
        let ScVal::Vec(Some(items)) = val else {
            return Err(Error::unexpected_name(&entry.name.to_utf8_string_lossy(), val));
        };
        return Ok(Value::Array(
            items
                .iter()
                .zip(entry.fields.iter())
                .map(|(it, field)| from_scval(spec, &field.type_, it))
                .collect::<Result<Vec<_>>>()?,
        ));
    }

    let ScVal::Map(Some(entries)) = val else {
        return Err(Error::unexpected_name(&entry.name.to_utf8_string_lossy(), val));
    };
    let mut object = Map::new();
    for field in entry.fields.iter() {
        let name = field.name.to_utf8_string_lossy();
        let entry_val = entries
            .iter()
            .find(|it| matches!(&it.key, ScVal::Symbol(sym) if sym.0.to_utf8_string_lossy() == name))
            .ok_or_else(|| Error::MissingField {
                udt: entry.name.to_utf8_string_lossy(),
                field: name.clone(),
            })?;
        object.insert(name, from_scval(spec, &field.type_, &entry_val.val)?);
    }
    Ok(Value::Object(object))
}

fn union_to_scval(spec: &ContractSpec, entry: &ScSpecUdtUnionV0, value: &Value) -> Result<ScVal> {
    let (tag, values) = match value {
        Value::String(tag) => (tag.as_str(), None),
        Value::Object(object) => (
            object
                .get("tag")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::mismatch_name(&entry.name.to_utf8_string_lossy(), value))?,
            object.get("values").and_then(Value::as_array),
        ),
        _ => return Err(Error::mismatch_name(&entry.name.to_utf8_string_lossy(), value)),
    };

    let case = entry
        .cases
        .iter()
        .find(|case| case_name(case) == tag)
        .ok_or_else(|| Error::UnknownUnionCase {
            udt: entry.name.to_utf8_string_lossy(),
            case: tag.to_owned(),
        })?;

    let mut vals = vec![ScVal::Symbol(ScSymbol(tag.try_into()?))];
    match case {
        ScSpecUdtUnionCaseV0::VoidV0(_) => {}
        ScSpecUdtUnionCaseV0::TupleV0(tuple) => {
            let values = values
                .filter(|it| it.len() == tuple.type_.len())
                .ok_or_else(|| Error::mismatch_name(&entry.name.to_utf8_string_lossy(), value))?;
            for (item, item_ty) in values.iter().zip(tuple.type_.iter()) {
                vals.push(to_scval(spec, item_ty, item)?);
            }
        }
    }
    Ok(ScVal::Vec(Some(ScVec(vals.try_into()?))))
}

fn union_from_scval(spec: &ContractSpec, entry: &ScSpecUdtUnionV0, val: &ScVal) -> Result<Value> {
    let ScVal::Vec(Some(items)) = val else {
        return Err(Error::unexpected_name(&entry.name.to_utf8_string_lossy(), val));
    };
    let Some(ScVal::Symbol(tag)) = items.first() else {
        return Err(Error::unexpected_name(&entry.name.to_utf8_string_lossy(), val));
    };
    let tag = tag.0.to_utf8_string_lossy();

    let case = entry
        .cases
        .iter()
        .find(|case| case_name(case) == tag)
        .ok_or_else(|| Error::UnknownUnionCase {
            udt: entry.name.to_utf8_string_lossy(),
            case: tag.clone(),
        })?;

    match case {
        ScSpecUdtUnionCaseV0::VoidV0(_) => Ok(json!({ "tag": tag })),
        ScSpecUdtUnionCaseV0::TupleV0(tuple) => {
            let values = items
                .iter()
                .skip(1)
                .zip(tuple.type_.iter())
                .map(|(item, item_ty)| from_scval(spec, item_ty, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(json!({ "tag": tag, "values": values }))
        }
    }
}

fn case_name(case: &ScSpecUdtUnionCaseV0) -> String {
    match case {
        ScSpecUdtUnionCaseV0::VoidV0(it) => it.name.to_utf8_string_lossy(),
        ScSpecUdtUnionCaseV0::TupleV0(it) => it.name.to_utf8_string_lossy(),
    }
}

fn is_tuple_struct(entry: &ScSpecUdtStructV0) -> bool {
    !entry.fields.is_empty()
        && entry
            .fields
            .iter()
            .all(|field| field.name.to_utf8_string_lossy().parse::<usize>().is_ok())
}

/// Best-effort conversion for `Val`-typed slots, where the spec declares no
/// concrete type.
fn guess_scval(value: &Value) -> Result<ScVal> {
    match value {
        Value::Null => Ok(ScVal::Void),
        Value::Bool(it) => Ok(ScVal::Bool(*it)),
        Value::Number(n) => n
            .as_u64()
            .map(ScVal::U64)
            .or_else(|| n.as_i64().map(ScVal::I64))
            .ok_or_else(|| Error::mismatch_name("Val", value)),
        Value::String(it) => Ok(ScVal::String(ScString(it.as_str().try_into()?))),
        Value::Array(items) => {
            let vals = items.iter().map(guess_scval).collect::<Result<Vec<_>>>()?;
            Ok(ScVal::Vec(Some(ScVec(vals.try_into()?))))
        }
        Value::Object(entries) => {
            let pairs = entries
                .iter()
                .map(|(key, val)| {
                    Ok((
                        ScVal::Symbol(ScSymbol(key.as_str().try_into()?)),
                        guess_scval(val)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ScVal::Map(Some(ScMap::sorted_from(pairs)?)))
        }
    }
}

fn guess_native(val: &ScVal) -> Result<Value> {
    match val {
        ScVal::Void => Ok(Value::Null),
        ScVal::Bool(it) => Ok(json!(it)),
        ScVal::U32(it) => Ok(json!(it)),
        ScVal::I32(it) => Ok(json!(it)),
        ScVal::U64(it) => Ok(json!(it)),
        ScVal::I64(it) => Ok(json!(it)),
        ScVal::String(it) => Ok(json!(it.0.to_utf8_string_lossy())),
        ScVal::Symbol(it) => Ok(json!(it.0.to_utf8_string_lossy())),
        ScVal::Bytes(it) => Ok(json!(BASE64_STANDARD.encode(it.as_slice()))),
        ScVal::Address(it) => Ok(json!(crate::utils::address_to_string(it))),
        ScVal::Vec(Some(items)) => Ok(Value::Array(
            items.iter().map(guess_native).collect::<Result<Vec<_>>>()?,
        )),
        ScVal::Map(Some(entries)) => {
            let mut object = Map::new();
            for entry in entries.iter() {
                let key = match guess_native(&entry.key)? {
                    Value::String(it) => it,
                    other => other.to_string(),
                };
                object.insert(key, guess_native(&entry.val)?);
            }
            Ok(Value::Object(object))
        }
        other => Err(Error::UnsupportedType(format!("{other:?}"))),
    }
}

fn u32_from(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|it| u32::try_from(it).ok())
}

fn u128_from(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn i128_from(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n.as_i64().map(i128::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn bytes_from(value: &Value) -> Option<Vec<u8>> {
    value.as_str().and_then(|it| BASE64_STANDARD.decode(it).ok())
}

fn address_from(address: &str) -> Result<ScVal> {
    crate::utils::contract_or_account_address(address)
        .map(ScVal::Address)
        .map_err(|_| Error::InvalidAddress(address.to_owned()))
}

/// Map keys arrive as JSON object keys, i.e. strings. Non-string key types
/// are recovered by re-parsing the key text.
fn key_value(key: &str) -> Value {
    serde_json::from_str(key).unwrap_or_else(|_| Value::String(key.to_owned()))
}
