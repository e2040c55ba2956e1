// Wire Envelope
//
// The policy service wraps every payload as
// `{ "value": ..., "isError": bool, "message": ... }`.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::catalog::CatalogError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    value: Option<T>,

    #[serde(default)]
    is_error: bool,

    message: Option<String>,
}

/// Turn a raw response into its payload.
///
/// Non-2xx statuses and `isError` envelopes become `CatalogError::Remote`
/// carrying the service's message verbatim.
pub fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, CatalogError> {
    if !(200..300).contains(&status) {
        return Err(CatalogError::Remote {
            status,
            body: body.to_string(),
        });
    }

    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| CatalogError::Decode(e.to_string()))?;

    if envelope.is_error {
        return Err(CatalogError::Remote {
            status,
            body: envelope.message.unwrap_or_else(|| body.to_string()),
        });
    }

    envelope
        .value
        .ok_or_else(|| CatalogError::Decode("response has no `value`".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AccountId, Policy, PolicyId, PolicyType};

    #[test]
    fn decodes_policy_list() {
        let body = r#"{
            "value": [
                {"id": 1, "policyType": "WAF_RULES", "name": "Baseline", "defaultPolicyConfig": []},
                {"id": "2", "policyType": "WHITELIST", "defaultPolicyConfig": [
                    {"accountId": "7", "assetType": "WEBSITE", "policyId": "2"}
                ]}
            ],
            "isError": false
        }"#;

        let policies: Vec<Policy> = decode_envelope(200, body).unwrap();

        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].policy_type, PolicyType::WafRules);
        assert!(policies[1].is_default_for(AccountId(7)));
        assert_eq!(policies[1].default_policy_config[0].policy_id, PolicyId(2));
    }

    #[test]
    fn non_success_status_keeps_body_verbatim() {
        let err = decode_envelope::<Policy>(403, "{\"message\":\"forbidden\"}").unwrap_err();
        assert_eq!(
            err,
            CatalogError::Remote {
                status: 403,
                body: "{\"message\":\"forbidden\"}".into()
            }
        );
    }

    #[test]
    fn error_envelope_is_a_remote_failure() {
        let body = r#"{"value": null, "isError": true, "message": "Policy 9 not found"}"#;
        let err = decode_envelope::<Policy>(200, body).unwrap_err();
        assert_eq!(
            err,
            CatalogError::Remote {
                status: 200,
                body: "Policy 9 not found".into()
            }
        );
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_envelope::<Vec<Policy>>(200, "<html>").unwrap_err();
        assert!(matches!(err, CatalogError::Decode(_)));

        let err = decode_envelope::<Vec<Policy>>(200, r#"{"isError": false}"#).unwrap_err();
        assert!(matches!(err, CatalogError::Decode(_)));
    }
}
