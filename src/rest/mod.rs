//! REST endpoint services for the wallet API.
//!
//! Services build a [`Request`] and hand it to an [`ApiCaller`], which owns
//! transport, authentication and signing. [`Client`] is the reqwest-backed
//! caller; tests and alternative transports can supply their own.
//!
//! - [`withdraw`] - Withdrawal submission and history
//! - [`deposit`] - Travel-rule deposit history and questionnaires

mod client;
pub mod deposit;
pub mod withdraw;

use std::collections::BTreeMap;
use std::future::Future;

pub use client::Client;
pub use deposit::{ListDepositsLocalEntityService, SubmitDepositQuestionnaireService};
pub use reqwest::Method;
pub use withdraw::{CreateWithdrawService, ListWithdrawsService};

use crate::Result;

/// Authentication level an endpoint requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecType {
    /// Public endpoint.
    None,
    /// Needs the API key header.
    ApiKey,
    /// Needs the API key header and a request signature.
    Signed,
}

/// A REST call described independently of its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    pub sec_type: SecType,
    params: BTreeMap<String, String>,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, endpoint: &str, sec_type: SecType) -> Self {
        Self {
            method,
            endpoint: endpoint.to_string(),
            sec_type,
            params: BTreeMap::new(),
        }
    }

    /// Sets a query parameter, replacing any previous value for `key`.
    pub fn set_param(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Returns the value of a parameter, if set.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Form-urlencodes the parameters, sorted by key.
    #[must_use]
    pub fn query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.params)
            .finish()
    }
}

/// Executes requests against the exchange and returns the raw response body.
pub trait ApiCaller: Send + Sync {
    /// Sends `request`, authenticating it according to its [`SecType`].
    fn call_api(&self, request: Request) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Produces the signature for a signed request.
///
/// The payload is the urlencoded query string including the timestamp.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, payload: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_encode_sorted_and_escaped() {
        let mut request = Request::new(Method::GET, "/sapi/v1/test", SecType::Signed);
        request
            .set_param("network", "BSC")
            .set_param("coin", "USDT")
            .set_param("questionnaire", "{\"a\":1}");

        assert_eq!(
            request.query_string(),
            "coin=USDT&network=BSC&questionnaire=%7B%22a%22%3A1%7D"
        );
    }

    #[test]
    fn set_param_replaces_existing_value() {
        let mut request = Request::new(Method::GET, "/x", SecType::None);
        request.set_param("limit", 10).set_param("limit", 50);
        assert_eq!(request.param("limit"), Some("50"));
        assert_eq!(request.query_string(), "limit=50");
    }
}
