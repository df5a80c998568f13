//! Travel-rule deposit models.

use rust_decimal::Decimal;
use serde::Deserialize;

/// A single travel-rule deposit history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DepositLocalEntity {
    #[serde(rename = "trId")]
    pub tr_id: i64,
    pub tran_id: String,
    pub amount: Decimal,
    pub coin: String,
    pub network: String,
    pub status: i32,
    /// 0: completed, 1: pending, 2: failed.
    pub travel_rule_status: i32,
    pub deposit_status: i32,
    pub address: String,
    pub address_tag: String,
    pub tx_id: String,
    pub insert_time: i64,
    pub transfer_type: i64,
    /// Confirmation progress, e.g. `"12/12"`.
    pub confirm_times: String,
    pub require_questionnaire: bool,
    pub questionnaire: Option<String>,
}

/// Response to a deposit questionnaire submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmitDepositQuestionnaireResponse {
    #[serde(rename = "trId")]
    pub tr_id: i64,
    pub accepted: bool,
    pub info: String,
}
