//! JSON envelope handling.
//!
//! Every endpoint answers `{"code": .., "msg": "..", "data": ..}`. `code`
//! arrives as a number or a numeric string depending on the endpoint.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use vault_core::RawStatus;

use crate::api::{Page, PageRequest};
use crate::error::{SourceError, SourceResult};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: RawStatus,
    #[serde(default, alias = "message")]
    msg: String,
    #[serde(default = "Option::default")]
    data: Option<T>,
}

/// List payload inside `data`.
#[derive(Debug, Deserialize)]
pub(crate) struct ListData<T> {
    #[serde(default = "Vec::new", alias = "rows", alias = "data")]
    pub list: Vec<T>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total: Option<u64>,
    #[serde(default)]
    pub has_more: Option<RawStatus>,
    /// Consignment coupon balance (holding list only).
    #[serde(
        default,
        alias = "coupon_num",
        alias = "consign_coupon",
        deserialize_with = "lenient_count"
    )]
    pub coupon_count: Option<u32>,
}

/// Non-negative count sent as a number or a numeric string. Anything else
/// is logged and read as absent.
fn lenient_count<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match &value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    let count = parsed.and_then(|n| T::try_from(n).ok());
    if count.is_none() {
        warn!(value = ?value, "Ignoring unreadable count in list response");
    }
    Ok(count)
}

impl<T> ListData<T> {
    /// Explicit `has_more` wins; otherwise infer from `total`, then from
    /// whether the page came back full.
    pub fn into_page(self, request: PageRequest) -> (Page<T>, Option<u32>) {
        let has_more = match (&self.has_more, self.total) {
            (Some(flag), _) => !flag.is_empty(),
            (None, Some(total)) => ((request.offset() + self.list.len()) as u64) < total,
            (None, None) => self.list.len() as u32 >= request.limit,
        };
        (
            Page {
                records: self.list,
                total: self.total,
                has_more,
            },
            self.coupon_count,
        )
    }
}

fn code_matches(code: &RawStatus, expected: i64) -> bool {
    match code {
        RawStatus::Number(n) => *n == expected,
        RawStatus::Text(s) => s.trim().parse::<i64>().ok() == Some(expected),
        RawStatus::Flag(b) => *b && expected == 1,
    }
}

/// Decode an envelope; non-success codes become `SourceError::Rejected`
/// carrying the server message verbatim.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    body: &str,
    success_code: i64,
) -> SourceResult<(Option<T>, String)> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| SourceError::Decode(format!("invalid envelope: {e}")))?;

    if !code_matches(&envelope.code, success_code) {
        return Err(SourceError::Rejected {
            code: envelope.code.to_string(),
            message: envelope.msg,
        });
    }
    Ok((envelope.data, envelope.msg))
}

/// Decode a list endpoint body.
pub(crate) fn decode_list<T: DeserializeOwned>(
    body: &str,
    success_code: i64,
    request: PageRequest,
) -> SourceResult<(Page<T>, Option<u32>)> {
    let (data, _) = decode_envelope::<ListData<T>>(body, success_code)?;
    let data = data.ok_or_else(|| SourceError::Decode("list response without data".into()))?;
    Ok(data.into_page(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::{PurchaseRecord, RawId};

    #[test]
    fn test_decode_list_with_coupons() {
        let body = r#"{
            "code": 1,
            "msg": "ok",
            "data": {
                "list": [{"id": 1, "name": "A"}, {"id": "2", "name": "B"}],
                "total": 5,
                "coupon_num": 3
            }
        }"#;
        let (page, coupons) =
            decode_list::<PurchaseRecord>(body, 1, PageRequest::first(2)).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].id, Some(RawId::Text("2".into())));
        assert!(page.has_more);
        assert_eq!(page.total, Some(5));
        assert_eq!(coupons, Some(3));
    }

    #[test]
    fn test_counts_accept_numeric_strings() {
        let body = r#"{
            "code": "1",
            "data": {"list": [{"id": 1}], "total": "4", "coupon_num": "3"}
        }"#;
        let (page, coupons) =
            decode_list::<PurchaseRecord>(body, 1, PageRequest::first(1)).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total, Some(4));
        assert!(page.has_more);
        assert_eq!(coupons, Some(3));
    }

    #[test]
    fn test_unreadable_counts_keep_the_page() {
        let body = r#"{
            "code": 1,
            "data": {"list": [{"id": 1}], "total": "many", "coupon_num": -2}
        }"#;
        let (page, coupons) =
            decode_list::<PurchaseRecord>(body, 1, PageRequest::first(20)).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total, None);
        assert!(!page.has_more);
        assert_eq!(coupons, None);
    }

    #[test]
    fn test_has_more_flag_wins() {
        let body = r#"{"code": "1", "data": {"list": [], "has_more": 0, "total": 100}}"#;
        let (page, _) = decode_list::<PurchaseRecord>(body, 1, PageRequest::first(20)).unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn test_has_more_inferred_from_full_page() {
        let body = r#"{"code": 1, "data": {"rows": [{"id": 1}, {"id": 2}]}}"#;
        let (page, _) = decode_list::<PurchaseRecord>(body, 1, PageRequest::first(2)).unwrap();
        assert!(page.has_more);
    }

    #[test]
    fn test_rejection_keeps_server_message() {
        let body = r#"{"code": 0, "msg": "收货地址不存在", "data": null}"#;
        let err = decode_envelope::<serde_json::Value>(body, 1).unwrap_err();
        match err {
            SourceError::Rejected { code, message } => {
                assert_eq!(code, "0");
                assert_eq!(message, "收货地址不存在");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_body() {
        let err = decode_envelope::<serde_json::Value>("<html>", 1).unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
