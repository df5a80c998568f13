//! Withdrawal submission and history services.

use rust_decimal::Decimal;
use tracing::info;

use super::{ApiCaller, Method, Request, SecType};
use crate::Result;
use crate::models::{
    CreateLocalEntityWithdrawResponse, CreateWithdrawResponse, Withdraw, WithdrawLocalEntity,
};

const WITHDRAW_APPLY: &str = "/sapi/v1/capital/withdraw/apply";
const LOCAL_ENTITY_WITHDRAW_APPLY: &str = "/sapi/v1/localentity/withdraw/apply";
const WITHDRAW_HISTORY: &str = "/sapi/v1/capital/withdraw/history";
const LOCAL_ENTITY_WITHDRAW_HISTORY: &str = "/sapi/v1/localentity/withdraw/history";

/// Submits a withdrawal.
///
/// Attaching a travel-rule questionnaire routes the request to the
/// local-entity endpoint; the returned id is then the travel-rule record id.
#[derive(Debug)]
pub struct CreateWithdrawService<'a, C> {
    c: &'a C,
    coin: String,
    address: String,
    amount: Decimal,
    withdraw_order_id: Option<String>,
    network: Option<String>,
    address_tag: Option<String>,
    transaction_fee_flag: Option<bool>,
    name: Option<String>,
    questionnaire: Option<String>,
}

impl<'a, C: ApiCaller> CreateWithdrawService<'a, C> {
    /// Creates a withdrawal of `amount` `coin` to `address`.
    #[must_use]
    pub fn new(c: &'a C, coin: &str, address: &str, amount: Decimal) -> Self {
        Self {
            c,
            coin: coin.to_string(),
            address: address.to_string(),
            amount,
            withdraw_order_id: None,
            network: None,
            address_tag: None,
            transaction_fee_flag: None,
            name: None,
            questionnaire: None,
        }
    }

    /// Client-side id for the withdrawal.
    #[must_use]
    pub fn with_withdraw_order_id(mut self, id: &str) -> Self {
        self.withdraw_order_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn with_network(mut self, network: &str) -> Self {
        self.network = Some(network.to_string());
        self
    }

    /// Secondary address identifier (memo / tag) for coins that need one.
    #[must_use]
    pub fn with_address_tag(mut self, tag: &str) -> Self {
        self.address_tag = Some(tag.to_string());
        self
    }

    /// When `true`, the fee is charged to the destination (internal transfers).
    #[must_use]
    pub fn with_transaction_fee_flag(mut self, flag: bool) -> Self {
        self.transaction_fee_flag = Some(flag);
        self
    }

    /// Address book label.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// URL-encoded JSON travel-rule questionnaire.
    #[must_use]
    pub fn with_questionnaire(mut self, questionnaire: &str) -> Self {
        self.questionnaire = Some(questionnaire.to_string());
        self
    }

    fn request(&self) -> Request {
        let endpoint = if self.questionnaire.is_some() {
            LOCAL_ENTITY_WITHDRAW_APPLY
        } else {
            WITHDRAW_APPLY
        };
        let mut request = Request::new(Method::POST, endpoint, SecType::Signed);
        request
            .set_param("coin", &self.coin)
            .set_param("address", &self.address)
            .set_param("amount", self.amount);
        if let Some(v) = &self.withdraw_order_id {
            request.set_param("withdrawOrderId", v);
        }
        if let Some(v) = &self.network {
            request.set_param("network", v);
        }
        if let Some(v) = &self.address_tag {
            request.set_param("addressTag", v);
        }
        if let Some(v) = self.transaction_fee_flag {
            request.set_param("transactionFeeFlag", v);
        }
        if let Some(v) = &self.name {
            request.set_param("name", v);
        }
        if let Some(v) = &self.questionnaire {
            request.set_param("questionnaire", v);
        }
        request
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns the caller's transport or API error, or
    /// [`CambistError::Json`](crate::CambistError::Json) if the response
    /// cannot be decoded.
    pub async fn send(&self) -> Result<CreateWithdrawResponse> {
        let data = self.c.call_api(self.request()).await?;

        let response = if self.questionnaire.is_some() {
            let res: CreateLocalEntityWithdrawResponse = serde_json::from_slice(&data)?;
            CreateWithdrawResponse {
                id: res.id.to_string(),
            }
        } else {
            serde_json::from_slice(&data)?
        };
        info!(coin = %self.coin, id = %response.id, "Withdrawal submitted");

        Ok(response)
    }
}

/// Fetches withdrawal history.
#[derive(Debug)]
pub struct ListWithdrawsService<'a, C> {
    c: &'a C,
    coin: Option<String>,
    status: Option<i32>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    offset: Option<u32>,
    limit: Option<u32>,
}

impl<'a, C: ApiCaller> ListWithdrawsService<'a, C> {
    #[must_use]
    pub fn new(c: &'a C) -> Self {
        Self {
            c,
            coin: None,
            status: None,
            start_time: None,
            end_time: None,
            offset: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_coin(mut self, coin: &str) -> Self {
        self.coin = Some(coin.to_string());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    /// Window start in milliseconds. The exchange requires an end time as
    /// well, at most 90 days later.
    #[must_use]
    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Window end in milliseconds.
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

    fn request(&self, endpoint: &str) -> Request {
        let mut request = Request::new(Method::GET, endpoint, SecType::Signed);
        if let Some(v) = &self.coin {
            request.set_param("coin", v);
        }
        if let Some(v) = self.status {
            request.set_param("status", v);
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

    /// Fetches standard withdrawal history.
    ///
    /// # Errors
    ///
    /// Returns the caller's transport or API error, or a JSON decode error.
    pub async fn send(&self) -> Result<Vec<Withdraw>> {
        let data = self.c.call_api(self.request(WITHDRAW_HISTORY)).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Fetches travel-rule withdrawal history with the same filters.
    ///
    /// # Errors
    ///
    /// Returns the caller's transport or API error, or a JSON decode error.
    pub async fn send_local_entity(&self) -> Result<Vec<WithdrawLocalEntity>> {
        let data = self
            .c
            .call_api(self.request(LOCAL_ENTITY_WITHDRAW_HISTORY))
            .await?;
        Ok(serde_json::from_slice(&data)?)
    }
}
