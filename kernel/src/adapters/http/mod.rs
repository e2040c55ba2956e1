// HTTP Policy Catalog
//
// Blocking client for the remote policy service. One request per call;
// retries and cancellation are left to the caller.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::catalog::{AccountId, CatalogError, Policy, PolicyCatalog, PolicyId};
use crate::config::ProviderConfig;

pub mod wire;

/// [`PolicyCatalog`] backed by the policy service's REST API.
#[derive(Debug, Clone)]
pub struct HttpPolicyCatalog {
    client: Client,
    base_url: String,
}

impl HttpPolicyCatalog {
    pub fn new(config: &ProviderConfig) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                CatalogError::Transport(format!("invalid header name `{name}`: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                CatalogError::Transport(format!("invalid value for `{name}`: {e}"))
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn list_url(&self, account: AccountId) -> String {
        format!(
            "{}/policies/v2/policies?caid={account}&extended=true",
            self.base_url
        )
    }

    fn policy_url(&self, policy: PolicyId, account: AccountId, extended: bool) -> String {
        let mut url = format!("{}/policies/v2/policies/{policy}?caid={account}", self.base_url);
        if extended {
            url.push_str("&extended=true");
        }
        url
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CatalogError> {
        let response = request
            .send()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        debug!(status, bytes = body.len(), "policy service responded");
        wire::decode_envelope(status, &body)
    }
}

impl PolicyCatalog for HttpPolicyCatalog {
    fn fetch_all_for_account(&self, account: AccountId) -> Result<Vec<Policy>, CatalogError> {
        self.send(self.client.get(self.list_url(account)))
    }

    fn fetch(&self, policy: PolicyId, account: AccountId) -> Result<Policy, CatalogError> {
        self.send(self.client.get(self.policy_url(policy, account, true)))
    }

    fn replace(&self, policy: &Policy, account: AccountId) -> Result<Policy, CatalogError> {
        let request = self
            .client
            .put(self.policy_url(policy.id, account, false))
            .json(policy);
        self.send(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DefaultPolicyEntry, PolicyType};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Mock server on its own runtime; the blocking client is driven from
    /// the test thread.
    fn mock_server() -> (Runtime, MockServer) {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        (runtime, server)
    }

    fn config(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            base_url: base_url.into(),
            ..ProviderConfig::default_config()
        }
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let catalog = HttpPolicyCatalog::new(&config("https://policies.example.com/")).unwrap();

        assert_eq!(
            catalog.list_url(AccountId(7)),
            "https://policies.example.com/policies/v2/policies?caid=7&extended=true"
        );
        assert_eq!(
            catalog.policy_url(PolicyId(12), AccountId(7), false),
            "https://policies.example.com/policies/v2/policies/12?caid=7"
        );
    }

    #[test]
    fn invalid_header_is_rejected() {
        let mut cfg = config("https://policies.example.com");
        cfg.headers = BTreeMap::from([("bad header".to_string(), "x".to_string())]);

        let err = HttpPolicyCatalog::new(&cfg).unwrap_err();
        assert!(matches!(err, CatalogError::Transport(msg) if msg.contains("bad header")));
    }

    #[test]
    fn list_fetch_decodes_policies() {
        let (runtime, server) = mock_server();
        runtime.block_on(
            Mock::given(method("GET"))
                .and(path("/policies/v2/policies"))
                .and(query_param("caid", "7"))
                .and(query_param("extended", "true"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "value": [
                        {"id": 1, "policyType": "WAF_RULES", "defaultPolicyConfig": []},
                        {"id": "2", "policyType": "ACL", "defaultPolicyConfig": [
                            {"accountId": 7, "assetType": "WEBSITE", "policyId": 2}
                        ]}
                    ],
                    "isError": false
                })))
                .mount(&server),
        );

        let catalog = HttpPolicyCatalog::new(&config(&server.uri())).unwrap();
        let policies = catalog.fetch_all_for_account(AccountId(7)).unwrap();

        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].policy_type, PolicyType::WafRules);
        assert!(policies[1].is_default_for(AccountId(7)));
    }

    #[test]
    fn single_fetch_asks_for_extended_record() {
        let (runtime, server) = mock_server();
        runtime.block_on(
            Mock::given(method("GET"))
                .and(path("/policies/v2/policies/12"))
                .and(query_param("caid", "7"))
                .and(query_param("extended", "true"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "value": {"id": 12, "policyType": "WHITELIST", "defaultPolicyConfig": []}
                })))
                .mount(&server),
        );

        let catalog = HttpPolicyCatalog::new(&config(&server.uri())).unwrap();
        let policy = catalog.fetch(PolicyId(12), AccountId(7)).unwrap();

        assert_eq!(policy.id, PolicyId(12));
        assert_eq!(policy.policy_type, PolicyType::Whitelist);
    }

    #[test]
    fn client_error_body_is_returned_verbatim() {
        let (runtime, server) = mock_server();
        runtime.block_on(
            Mock::given(method("GET"))
                .and(path("/policies/v2/policies"))
                .respond_with(
                    ResponseTemplate::new(403).set_body_string("account 7 is not authorized"),
                )
                .mount(&server),
        );

        let catalog = HttpPolicyCatalog::new(&config(&server.uri())).unwrap();
        let err = catalog.fetch_all_for_account(AccountId(7)).unwrap_err();

        assert_eq!(
            err,
            CatalogError::Remote {
                status: 403,
                body: "account 7 is not authorized".into()
            }
        );
    }

    #[test]
    fn replace_sends_the_whole_policy() {
        let mut policy = Policy::new(PolicyId(2), PolicyType::Whitelist);
        policy
            .default_policy_config
            .push(DefaultPolicyEntry::website(AccountId(8), PolicyId(2)));
        policy.attach_default(AccountId(7));
        policy.extra.insert("name".into(), json!("Office IPs"));

        let (runtime, server) = mock_server();
        runtime.block_on(
            Mock::given(method("PUT"))
                .and(path("/policies/v2/policies/2"))
                .and(query_param("caid", "7"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "value": serde_json::to_value(&policy).unwrap(),
                    "isError": false
                })))
                .mount(&server),
        );

        let catalog = HttpPolicyCatalog::new(&config(&server.uri())).unwrap();
        let stored = catalog.replace(&policy, AccountId(7)).unwrap();
        assert_eq!(stored, policy);

        let requests = runtime.block_on(server.received_requests()).unwrap();
        assert_eq!(requests.len(), 1);

        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["name"], "Office IPs");
        assert_eq!(body["defaultPolicyConfig"].as_array().unwrap().len(), 2);
        assert_eq!(body["defaultPolicyConfig"][0]["accountId"], 8);
        assert_eq!(body["defaultPolicyConfig"][1]["accountId"], 7);
    }
}
