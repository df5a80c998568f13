//! reqwest-backed [`ApiCaller`].

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{
    ApiCaller, CreateWithdrawService, ListDepositsLocalEntityService, ListWithdrawsService,
    Request, RequestSigner, SecType, SubmitDepositQuestionnaireService,
};
use crate::config::RestConfig;
use crate::{CambistError, Result, tls};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body returned by the API alongside a 4xx/5xx status.
#[derive(Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// REST client for the wallet endpoints.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<Zeroizing<String>>,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

impl Client {
    /// Creates a client for `base_url` with default timeouts and no credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CambistError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_http_client(http, base_url))
    }

    /// Creates a client from loaded configuration, pinning the CA file if set.
    ///
    /// # Errors
    ///
    /// Returns [`CambistError::Tls`] if the CA file cannot be loaded, or
    /// [`CambistError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &RestConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(ca_file) = &config.ca_file {
            builder = builder.use_preconfigured_tls(tls::build_tls_config(ca_file)?);
        }

        let mut client = Self::with_http_client(builder.build()?, &config.base_url);
        client.api_key = config.api_key.clone();
        Ok(client)
    }

    /// Wraps an existing reqwest client.
    #[must_use]
    pub fn with_http_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            signer: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(Zeroizing::new(api_key.to_string()));
        self
    }

    /// Installs the signer used for [`SecType::Signed`] endpoints.
    #[must_use]
    pub fn with_signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Starts a withdrawal request.
    #[must_use]
    pub fn create_withdraw(
        &self,
        coin: &str,
        address: &str,
        amount: Decimal,
    ) -> CreateWithdrawService<'_, Self> {
        CreateWithdrawService::new(self, coin, address, amount)
    }

    /// Starts a withdrawal history query.
    #[must_use]
    pub fn list_withdraws(&self) -> ListWithdrawsService<'_, Self> {
        ListWithdrawsService::new(self)
    }

    /// Starts a travel-rule deposit history query.
    #[must_use]
    pub fn list_deposits_local_entity(&self) -> ListDepositsLocalEntityService<'_, Self> {
        ListDepositsLocalEntityService::new(self)
    }

    /// Starts a deposit questionnaire submission.
    #[must_use]
    pub fn submit_deposit_questionnaire(
        &self,
        tran_id: i64,
        questionnaire: &str,
    ) -> SubmitDepositQuestionnaireService<'_, Self> {
        SubmitDepositQuestionnaireService::new(self, tran_id, questionnaire)
    }

    /// Adds the timestamp and signature to a signed request's query string.
    fn signed_query(&self, request: &mut Request) -> Result<String> {
        let signer = self.signer.as_ref().ok_or(CambistError::MissingSigner)?;
        request.set_param("timestamp", timestamp_ms());
        let payload = request.query_string();
        let signature = signer.sign(&payload)?;

        Ok(url::form_urlencoded::Serializer::for_suffix(payload, 0)
            .append_pair("signature", &signature)
            .finish())
    }
}

impl ApiCaller for Client {
    async fn call_api(&self, mut request: Request) -> Result<Vec<u8>> {
        let api_key = match (request.sec_type, &self.api_key) {
            (SecType::None, _) => None,
            (_, Some(api_key)) => Some(api_key.as_str()),
            (_, None) => return Err(CambistError::MissingApiKey),
        };

        let query = match request.sec_type {
            SecType::Signed => self.signed_query(&mut request)?,
            SecType::None | SecType::ApiKey => request.query_string(),
        };

        let mut url = url::Url::parse(&format!("{}{}", self.base_url, request.endpoint))?;
        if !query.is_empty() {
            url.set_query(Some(&query));
        }

        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(api_key) = api_key {
            builder = builder.header(API_KEY_HEADER, api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(
            method = %request.method,
            endpoint = %request.endpoint,
            status = status.as_u16(),
            "REST call completed"
        );

        if status.is_client_error() || status.is_server_error() {
            let (code, message) = match serde_json::from_slice::<ApiErrorBody>(&body) {
                Ok(err) => (err.code, err.msg),
                Err(_) => (0, String::from_utf8_lossy(&body).into_owned()),
            };
            warn!(
                endpoint = %request.endpoint,
                status = status.as_u16(),
                code,
                error_message = %message,
                "API returned an error"
            );
            return Err(CambistError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        Ok(body.to_vec())
    }
}

/// Milliseconds since the Unix epoch.
fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
