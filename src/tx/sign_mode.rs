//! Sign modes and sign-byte generation.
//!
//! # Responsibilities
//! - `SIGN_MODE_DIRECT`: protobuf `SignDoc{body_bytes, auth_info_bytes, chain_id, account_number}`
//! - `SIGN_MODE_LEGACY_AMINO_JSON`: canonical (sorted-key, compact) `StdSignDoc` JSON
//!
//! # Design Decisions
//! - Handlers are a trait so chains with extra modes can plug their own in
//! - Amino numbers are rendered as strings, matching the node's encoder
//! - Strings escape `<`, `>`, `&`, U+2028 and U+2029 the way the node's JSON
//!   encoder does, or the signature would not verify

use cosmrs::proto::cosmos::tx::signing::v1beta1::SignMode as ProtoSignMode;
use cosmrs::proto::cosmos::tx::v1beta1::SignDoc;
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::SdkResult;
use crate::tx::unsigned::UnsignedTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    Direct,
    LegacyAminoJson,
}

impl SignMode {
    pub fn to_proto(&self) -> i32 {
        match self {
            SignMode::Direct => ProtoSignMode::Direct as i32,
            SignMode::LegacyAminoJson => ProtoSignMode::LegacyAminoJson as i32,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignMode::Direct => "SIGN_MODE_DIRECT",
            SignMode::LegacyAminoJson => "SIGN_MODE_LEGACY_AMINO_JSON",
        }
    }
}

/// Chain and account data covered by the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerData {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
}

/// Produces the bytes a signer signs for a given mode.
pub trait SignModeHandler: Send + Sync {
    fn default_mode(&self) -> SignMode;

    fn modes(&self) -> &[SignMode];

    fn get_sign_bytes(&self, mode: SignMode, data: &SignerData, tx: &UnsignedTx) -> SdkResult<Vec<u8>>;
}

/// Direct + legacy amino JSON, defaulting to direct.
#[derive(Debug, Clone, Default)]
pub struct DefaultSignModeHandler;

const DEFAULT_MODES: [SignMode; 2] = [SignMode::Direct, SignMode::LegacyAminoJson];

impl SignModeHandler for DefaultSignModeHandler {
    fn default_mode(&self) -> SignMode {
        SignMode::Direct
    }

    fn modes(&self) -> &[SignMode] {
        &DEFAULT_MODES
    }

    fn get_sign_bytes(&self, mode: SignMode, data: &SignerData, tx: &UnsignedTx) -> SdkResult<Vec<u8>> {
        match mode {
            SignMode::Direct => direct_sign_bytes(data, tx),
            SignMode::LegacyAminoJson => amino_json_sign_bytes(data, tx),
        }
    }
}

fn direct_sign_bytes(data: &SignerData, tx: &UnsignedTx) -> SdkResult<Vec<u8>> {
    let doc = SignDoc {
        body_bytes: tx.body_bytes()?,
        auth_info_bytes: tx.auth_info_bytes(),
        chain_id: data.chain_id.clone(),
        account_number: data.account_number,
    };
    Ok(doc.encode_to_vec())
}

/// Legacy `StdSignDoc`.
pub fn std_sign_doc(data: &SignerData, tx: &UnsignedTx) -> SdkResult<serde_json::Value> {
    let msgs = tx
        .msgs
        .iter()
        .map(|m| m.amino_json())
        .collect::<SdkResult<Vec<_>>>()?;

    let mut fee = serde_json::json!({
        "amount": tx.fee.iter().map(|c| serde_json::json!({
            "amount": c.amount.to_string(),
            "denom": c.denom,
        })).collect::<Vec<_>>(),
        "gas": tx.gas_limit.to_string(),
    });
    if !tx.fee_payer.is_empty() {
        fee["payer"] = tx.fee_payer.clone().into();
    }
    if !tx.fee_granter.is_empty() {
        fee["granter"] = tx.fee_granter.clone().into();
    }

    let mut doc = serde_json::json!({
        "account_number": data.account_number.to_string(),
        "chain_id": data.chain_id,
        "fee": fee,
        "memo": tx.memo,
        "msgs": msgs,
        "sequence": data.sequence.to_string(),
    });
    if tx.timeout_height > 0 {
        doc["timeout_height"] = tx.timeout_height.to_string().into();
    }
    Ok(doc)
}

fn amino_json_sign_bytes(data: &SignerData, tx: &UnsignedTx) -> SdkResult<Vec<u8>> {
    let doc = std_sign_doc(data, tx)?;
    Ok(canonical_json(&doc)?.into_bytes())
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &serde_json::Value) -> SdkResult<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &serde_json::Value, out: &mut String) -> SdkResult<()> {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_escaped(&serde_json::to_string(key)?, out);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        leaf => push_escaped(&serde_json::to_string(leaf)?, out),
    }
    Ok(())
}

/// Append an already-encoded JSON token with HTML-sensitive characters escaped.
fn push_escaped(encoded: &str, out: &mut String) {
    for c in encoded.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::coins::Coin;
    use crate::tx::types::{AminoMsg, MsgRef};
    use std::sync::Arc;

    fn signer_data() -> SignerData {
        SignerData {
            chain_id: "test-1".into(),
            account_number: 12,
            sequence: 4,
        }
    }

    fn amino_msg() -> MsgRef {
        Arc::new(AminoMsg {
            any: cosmrs::Any {
                type_url: "/cosmos.bank.v1beta1.MsgSend".into(),
                value: vec![1, 2, 3],
            },
            amino_type: "cosmos-sdk/MsgSend".into(),
            value: serde_json::json!({ "to_address": "b", "from_address": "a" }),
        })
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = serde_json::json!({ "b": 1, "a": { "z": [ { "y": true, "x": null } ], "c": "s" } });
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"c":"s","z":[{"x":null,"y":true}]},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_html_characters() {
        let value = serde_json::json!({ "memo": "a&b<c>", "k<": "line\u{2028}sep\u{2029}" });
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"k\u003c":"line\u2028sep\u2029","memo":"a\u0026b\u003cc\u003e"}"#
        );
    }

    #[test]
    fn test_amino_sign_bytes_escape_memo() {
        let mut tx = UnsignedTx::new(vec![amino_msg()]);
        tx.memo = "<tag> & more".into();

        let bytes = DefaultSignModeHandler
            .get_sign_bytes(SignMode::LegacyAminoJson, &signer_data(), &tx)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""memo":"\u003ctag\u003e \u0026 more""#), "{}", text);
        assert!(!text.contains('<') && !text.contains('&'));
    }

    #[test]
    fn test_direct_sign_bytes_decode_to_sign_doc() {
        let mut tx = UnsignedTx::new(vec![amino_msg()]);
        tx.set_signer(None, 4, SignMode::Direct);
        let bytes = DefaultSignModeHandler
            .get_sign_bytes(SignMode::Direct, &signer_data(), &tx)
            .unwrap();

        let doc = SignDoc::decode(bytes.as_slice()).unwrap();
        assert_eq!(doc.chain_id, "test-1");
        assert_eq!(doc.account_number, 12);
        assert_eq!(doc.body_bytes, tx.body_bytes().unwrap());
    }

    #[test]
    fn test_amino_sign_doc_layout() {
        let mut tx = UnsignedTx::new(vec![amino_msg()]);
        tx.fee = vec![Coin::new(500, "uatom")];
        tx.gas_limit = 200_000;
        tx.memo = "m".into();

        let bytes = DefaultSignModeHandler
            .get_sign_bytes(SignMode::LegacyAminoJson, &signer_data(), &tx)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            concat!(
                r#"{"account_number":"12","chain_id":"test-1","#,
                r#""fee":{"amount":[{"amount":"500","denom":"uatom"}],"gas":"200000"},"#,
                r#""memo":"m","msgs":[{"type":"cosmos-sdk/MsgSend","value":{"from_address":"a","to_address":"b"}}],"#,
                r#""sequence":"4"}"#
            )
        );
    }

    #[test]
    fn test_amino_sign_doc_optional_fields() {
        let mut tx = UnsignedTx::new(vec![amino_msg()]);
        tx.timeout_height = 99;
        tx.fee_granter = "granter".into();
        let doc = std_sign_doc(&signer_data(), &tx).unwrap();
        assert_eq!(doc["timeout_height"], "99");
        assert_eq!(doc["fee"]["granter"], "granter");
        assert!(doc["fee"].get("payer").is_none());
    }

    #[test]
    fn test_amino_requires_amino_messages() {
        let msg: MsgRef = Arc::new(cosmrs::Any {
            type_url: "/x.MsgY".into(),
            value: vec![],
        });
        let tx = UnsignedTx::new(vec![msg]);
        assert!(DefaultSignModeHandler
            .get_sign_bytes(SignMode::LegacyAminoJson, &signer_data(), &tx)
            .is_err());
    }
}
