//! Withdrawal submission and history models.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Response to a standard withdrawal submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateWithdrawResponse {
    pub id: String,
}

/// Response to a withdrawal submitted with a travel-rule questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreateLocalEntityWithdrawResponse {
    #[serde(rename = "trId")]
    pub id: i64,
    pub accepted: bool,
    pub info: String,
}

/// A single withdrawal history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Withdraw {
    pub address: String,
    pub amount: Decimal,
    pub apply_time: String,
    pub coin: String,
    pub id: String,
    #[serde(rename = "withdrawOrderId", alias = "withdrawOrderID")]
    pub withdraw_order_id: String,
    pub network: String,
    pub transfer_type: i32,
    pub status: i32,
    pub transaction_fee: Decimal,
    pub tx_id: String,
}

/// Travel-rule questionnaire attached to a local-entity withdrawal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WithdrawQuestionnaire {
    pub is_address_owner: i32,
    pub bnf_type: i32,
    pub bnf_name: String,
    pub country: String,
    pub send_to: i32,
}

/// A single travel-rule withdrawal history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WithdrawLocalEntity {
    pub address: String,
    pub amount: Decimal,
    pub apply_time: i64,
    pub coin: String,
    pub complete_time: i64,
    pub confirm_no: i32,
    pub withdrawal_status: i32,
    pub id: String,
    pub info: String,
    pub network: String,
    pub questionnaire: WithdrawQuestionnaire,
    #[serde(rename = "trId")]
    pub travel_id: i64,
    pub transfer_type: i32,
    pub travel_rule_status: i32,
    pub transaction_fee: Decimal,
    /// On-chain transaction hash (wire name: `"txKey"`).
    #[serde(rename = "txKey")]
    pub tx_id: String,
}
