//! Response models for the wallet REST endpoints.
//!
//! Amounts and fees are [`rust_decimal::Decimal`], parsed from the string
//! form the API uses. Fields the API omits fall back to their defaults.

pub mod deposit;
pub mod withdraw;

pub use deposit::{DepositLocalEntity, SubmitDepositQuestionnaireResponse};
pub use withdraw::{
    CreateLocalEntityWithdrawResponse, CreateWithdrawResponse, Withdraw, WithdrawLocalEntity,
    WithdrawQuestionnaire,
};
