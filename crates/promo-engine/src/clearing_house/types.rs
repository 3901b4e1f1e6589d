//! 清算所协议的请求与响应结构
//!
//! 字段名与协议保持一致（snake_case）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 存入模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositMode {
    /// 传入基础优惠码，由清算所生成序列号
    #[default]
    BaseGs1,
    /// 传入已序列化的编码
    Serialized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub gs1s: Vec<String>,
    #[serde(default)]
    pub mode: DepositMode,
    pub client_txn_id: String,
}

/// 存入结果
///
/// 预期内的失败通过 `success = false` 和 `error` 表达，不返回 Err
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositResponse {
    pub success: bool,
    pub gs1s: Vec<String>,
    pub client_txn_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DepositResponse {
    pub fn failed(client_txn_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            gs1s: Vec::new(),
            client_txn_id: client_txn_id.into(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchCodeRequest {
    pub gs1: String,
    pub validity_in_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchCodeResponse {
    /// 16 位数字
    pub fetch_code: String,
    pub expires_at: DateTime<Utc>,
}

/// 主优惠文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterOfferFile {
    pub mof_id: String,
    pub funder_id: String,
    pub gtin: String,
    pub discount_type: String,
    pub discount_value: f64,
    pub start_date: String,
    pub end_date: String,
}
