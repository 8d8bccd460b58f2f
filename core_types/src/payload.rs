//! Inner request/response payload types carried encrypted inside events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PAY_INVOICE_METHOD: &str = "pay_invoice";
pub const PAY_KEYSEND_METHOD: &str = "pay_keysend";
pub const MULTI_PAY_INVOICE_METHOD: &str = "multi_pay_invoice";
pub const MULTI_PAY_KEYSEND_METHOD: &str = "multi_pay_keysend";
pub const MAKE_INVOICE_METHOD: &str = "make_invoice";
pub const LOOKUP_INVOICE_METHOD: &str = "lookup_invoice";
pub const LIST_TRANSACTIONS_METHOD: &str = "list_transactions";
pub const GET_BALANCE_METHOD: &str = "get_balance";
pub const GET_INFO_METHOD: &str = "get_info";

/// Every method the service can dispatch, in capability-advertisement order.
pub const METHODS: [&str; 9] = [
    PAY_INVOICE_METHOD,
    PAY_KEYSEND_METHOD,
    MULTI_PAY_INVOICE_METHOD,
    MULTI_PAY_KEYSEND_METHOD,
    MAKE_INVOICE_METHOD,
    LOOKUP_INVOICE_METHOD,
    LIST_TRANSACTIONS_METHOD,
    GET_BALANCE_METHOD,
    GET_INFO_METHOD,
];

/// Wire error codes, uppercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    Expired,
    Restricted,
    QuotaExceeded,
    RateLimited,
    NotImplemented,
    InsufficientBalance,
    PaymentFailed,
    Internal,
    Other,
}

/// Decrypted request plaintext: `{"method": ..., "params": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReply {
    pub code: ErrorCode,
    pub message: String,
}

/// Decrypted response plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub result_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Response {
    pub fn result<T: Serialize>(result_type: &str, result: &T) -> Self {
        Self {
            result_type: result_type.to_string(),
            error: None,
            result: serde_json::to_value(result).ok(),
        }
    }

    pub fn error(result_type: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            result_type: result_type.to_string(),
            error: Some(ErrorReply {
                code,
                message: message.into(),
            }),
            result: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlvRecord {
    #[serde(rename = "type")]
    pub tlv_type: u64,
    /// Hex-encoded record value.
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayInvoiceParams {
    pub invoice: String,
    /// Amount in millisatoshis; overrides or supplies the invoice amount.
    #[serde(default)]
    pub amount: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeysendParams {
    /// Amount in millisatoshis.
    pub amount: u64,
    pub pubkey: String,
    #[serde(default)]
    pub preimage: Option<String>,
    #[serde(default)]
    pub tlv_records: Vec<TlvRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiPayInvoiceElement {
    #[serde(default)]
    pub id: Option<String>,
    pub invoice: String,
    #[serde(default)]
    pub amount: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiPayInvoiceParams {
    pub invoices: Vec<MultiPayInvoiceElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiPayKeysendElement {
    #[serde(default)]
    pub id: Option<String>,
    pub amount: u64,
    pub pubkey: String,
    #[serde(default)]
    pub preimage: Option<String>,
    #[serde(default)]
    pub tlv_records: Vec<TlvRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiPayKeysendParams {
    pub keysends: Vec<MultiPayKeysendElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MakeInvoiceParams {
    /// Amount in millisatoshis.
    pub amount: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_hash: String,
    #[serde(default)]
    pub expiry: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupInvoiceParams {
    #[serde(default)]
    pub payment_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListTransactionsParams {
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub until: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub unpaid: Option<bool>,
    #[serde(rename = "type", default)]
    pub transaction_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayResponse {
    pub preimage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceResponse {
    /// Balance in millisatoshis.
    pub balance: u64,
}

/// A settled-or-pending Lightning transaction as reported to clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub invoice: String,
    pub description: String,
    pub description_hash: String,
    pub preimage: String,
    pub payment_hash: String,
    /// Amount in millisatoshis.
    pub amount: i64,
    /// Fees paid in millisatoshis.
    pub fees_paid: i64,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListTransactionsResponse {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub pubkey: String,
    pub alias: String,
    pub color: String,
    pub network: String,
    pub block_height: u32,
    pub block_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetInfoResponse {
    pub alias: String,
    pub color: String,
    pub pubkey: String,
    pub network: String,
    pub block_height: u32,
    pub block_hash: String,
    /// Methods granted to the requesting app.
    pub methods: Vec<String>,
}
