//! Travel-rule deposit history and questionnaire services.

use tracing::info;

use super::{ApiCaller, Method, Request, SecType};
use crate::Result;
use crate::models::{DepositLocalEntity, SubmitDepositQuestionnaireResponse};

const LOCAL_ENTITY_DEPOSIT_HISTORY: &str = "/sapi/v1/localentity/deposit/history";
const LOCAL_ENTITY_DEPOSIT_PROVIDE_INFO: &str = "/sapi/v1/localentity/deposit/provide-info";

/// Fetches travel-rule deposit history.
#[derive(Debug)]
pub struct ListDepositsLocalEntityService<'a, C> {
    c: &'a C,
    tr_id: Option<String>,
    tx_id: Option<String>,
    tran_id: Option<String>,
    network: Option<String>,
    coin: Option<String>,
    travel_rule_status: Option<i32>,
    pending_questionnaire: Option<bool>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    offset: Option<u32>,
    limit: Option<u32>,
}

impl<'a, C: ApiCaller> ListDepositsLocalEntityService<'a, C> {
    #[must_use]
    pub fn new(c: &'a C) -> Self {
        Self {
            c,
            tr_id: None,
            tx_id: None,
            tran_id: None,
            network: None,
            coin: None,
            travel_rule_status: None,
            pending_questionnaire: None,
            start_time: None,
            end_time: None,
            offset: None,
            limit: None,
        }
    }

    /// Comma-separated travel-rule record ids.
    #[must_use]
    pub fn with_tr_id(mut self, tr_id: &str) -> Self {
        self.tr_id = Some(tr_id.to_string());
        self
    }

    /// Comma-separated on-chain transaction ids.
    #[must_use]
    pub fn with_tx_id(mut self, tx_id: &str) -> Self {
        self.tx_id = Some(tx_id.to_string());
        self
    }

    /// Comma-separated deposit ids.
    #[must_use]
    pub fn with_tran_id(mut self, tran_id: &str) -> Self {
        self.tran_id = Some(tran_id.to_string());
        self
    }

    #[must_use]
    pub fn with_network(mut self, network: &str) -> Self {
        self.network = Some(network.to_string());
        self
    }

    #[must_use]
    pub fn with_coin(mut self, coin: &str) -> Self {
        self.coin = Some(coin.to_string());
        self
    }

    /// 0: completed, 1: pending, 2: failed.
    #[must_use]
    pub fn with_travel_rule_status(mut self, status: i32) -> Self {
        self.travel_rule_status = Some(status);
        self
    }

    /// `true` returns only deposits still waiting for a questionnaire.
    #[must_use]
    pub fn with_pending_questionnaire(mut self, pending: bool) -> Self {
        self.pending_questionnaire = Some(pending);
        self
    }

    /// Window start in milliseconds. The exchange requires an end time as
    /// well, at most 90 days later.
    #[must_use]
    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    #[must_use]
    pub fn with_end_time(mut self, end_time: i64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn request(&self) -> Request {
        let mut request = Request::new(Method::GET, LOCAL_ENTITY_DEPOSIT_HISTORY, SecType::Signed);
        let text_params = [
            ("trId", &self.tr_id),
            ("txId", &self.tx_id),
            ("tranId", &self.tran_id),
            ("network", &self.network),
            ("coin", &self.coin),
        ];
        for (key, value) in text_params {
            if let Some(v) = value {
                request.set_param(key, v);
            }
        }
        if let Some(v) = self.travel_rule_status {
            request.set_param("travelRuleStatus", v);
        }
        if let Some(v) = self.pending_questionnaire {
            request.set_param("pendingQuestionnaire", v);
        }
        if let Some(v) = self.start_time {
            request.set_param("startTime", v);
        }
        if let Some(v) = self.end_time {
            request.set_param("endTime", v);
        }
        if let Some(v) = self.offset {
            request.set_param("offset", v);
        }
        if let Some(v) = self.limit {
            request.set_param("limit", v);
        }
        request
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns the caller's transport or API error, or a JSON decode error.
    pub async fn send(&self) -> Result<Vec<DepositLocalEntity>> {
        let data = self.c.call_api(self.request()).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Answers the travel-rule questionnaire for a held deposit.
#[derive(Debug)]
pub struct SubmitDepositQuestionnaireService<'a, C> {
    c: &'a C,
    tran_id: i64,
    questionnaire: String,
}

impl<'a, C: ApiCaller> SubmitDepositQuestionnaireService<'a, C> {
    /// `questionnaire` is the URL-encoded JSON answer set.
    #[must_use]
    pub fn new(c: &'a C, tran_id: i64, questionnaire: &str) -> Self {
        Self {
            c,
            tran_id,
            questionnaire: questionnaire.to_string(),
        }
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns the caller's transport or API error, or a JSON decode error.
    pub async fn send(&self) -> Result<SubmitDepositQuestionnaireResponse> {
        let mut request = Request::new(
            Method::GET,
            LOCAL_ENTITY_DEPOSIT_PROVIDE_INFO,
            SecType::Signed,
        );
        request
            .set_param("tranId", self.tran_id)
            .set_param("questionnaire", &self.questionnaire);

        let data = self.c.call_api(request).await?;
        let response: SubmitDepositQuestionnaireResponse = serde_json::from_slice(&data)?;
        info!(
            tran_id = self.tran_id,
            accepted = response.accepted,
            "Deposit questionnaire submitted"
        );

        Ok(response)
    }
}
