//! ABI descriptor merging.
//!
//! Each object file may contribute an ABI JSON blob; the driver folds
//! them into one document for the `.abi` companion output. The fold is
//! seeded with the last blob, then every blob merges in link order, so a
//! single-input link reproduces its ABI unchanged.

use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("invalid abi json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("abi is not a json object")]
    NotAnObject,
}

/// Key field used to deduplicate entries of a known ABI array.
fn entry_key(field: &str) -> &'static str {
    match field {
        "types" => "new_type_name",
        "ricardian_clauses" => "id",
        _ => "name",
    }
}

/// Merge `incoming` into `base`. Arrays union by entry key with the
/// existing entry winning; scalar fields take the incoming value when it
/// is non-empty.
fn merge(base: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (field, value) in incoming {
        match (base.get_mut(&field), value) {
            (Some(Value::Array(existing)), Value::Array(entries)) => {
                let key = entry_key(&field);
                for entry in entries {
                    let duplicate = entry.get(key).is_some_and(|k| {
                        existing.iter().any(|have| have.get(key) == Some(k))
                    });
                    if !duplicate && !existing.contains(&entry) {
                        existing.push(entry);
                    }
                }
            }
            (Some(slot), value) => {
                let empty = match &value {
                    Value::String(s) => s.is_empty(),
                    Value::Null => true,
                    _ => false,
                };
                if !empty {
                    *slot = value;
                }
            }
            (None, value) => {
                base.insert(field, value);
            }
        }
    }
}

/// Fold a list of ABI blobs into one pretty-printed document. The fold
/// is seeded with the last blob, then applies every blob in input order.
pub fn merge_abis(abis: &[String]) -> Result<String, AbiError> {
    let last = abis.last().ok_or(AbiError::NotAnObject)?;
    let mut merged = match serde_json::from_str(last)? {
        Value::Object(map) => map,
        _ => return Err(AbiError::NotAnObject),
    };
    for blob in abis {
        let incoming = match serde_json::from_str(blob)? {
            Value::Object(map) => map,
            _ => return Err(AbiError::NotAnObject),
        };
        merge(&mut merged, incoming);
    }
    Ok(serde_json::to_string_pretty(&Value::Object(merged))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn abi(actions: &[&str]) -> String {
        json!({
            "version": "eosio::abi/1.2",
            "actions": actions
                .iter()
                .map(|name| json!({"name": name, "type": name, "ricardian_contract": ""}))
                .collect::<Vec<_>>(),
        })
        .to_string()
    }

    #[test]
    fn single_abi_round_trips() {
        let merged = merge_abis(&[abi(&["transfer"])]).unwrap();
        let value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["actions"].as_array().unwrap().len(), 1);
        assert_eq!(value["version"], "eosio::abi/1.2");
    }

    #[test]
    fn merge_unions_actions_by_name() {
        let merged = merge_abis(&[abi(&["transfer"]), abi(&["issue"]), abi(&["transfer"])])
            .unwrap();
        let value: Value = serde_json::from_str(&merged).unwrap();
        let names: Vec<&str> = value["actions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap())
            .collect();
        // seeded with the last blob, so its entries come first
        assert_eq!(names, ["transfer", "issue"]);
    }

    #[test]
    fn fold_order_matches_seed_then_inputs() {
        // merge(merge(merge(C, A), B), C)
        let a = abi(&["alpha"]);
        let b = abi(&["beta"]);
        let c = abi(&["gamma"]);

        let folded = merge_abis(&[a.clone(), b.clone(), c.clone()]).unwrap();

        let mut expect = match serde_json::from_str(&c).unwrap() {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        for blob in [&a, &b, &c] {
            let incoming = match serde_json::from_str(blob).unwrap() {
                Value::Object(map) => map,
                _ => unreachable!(),
            };
            merge(&mut expect, incoming);
        }
        assert_eq!(
            folded,
            serde_json::to_string_pretty(&Value::Object(expect)).unwrap()
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = merge_abis(&["not json".to_string()]).unwrap_err();
        assert!(matches!(err, AbiError::Json(_)));
    }

    #[test]
    fn types_dedupe_on_new_type_name() {
        let a = json!({"types": [{"new_type_name": "account", "type": "name"}]}).to_string();
        let b = json!({"types": [{"new_type_name": "account", "type": "name"}]}).to_string();
        let merged = merge_abis(&[a, b]).unwrap();
        let value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["types"].as_array().unwrap().len(), 1);
    }
}
