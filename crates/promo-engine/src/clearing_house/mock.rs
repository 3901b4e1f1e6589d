//! 清算所 Mock 客户端
//!
//! 生成格式真实的序列化编码和取码码，并模拟网络延迟。
//! 序列号 = base36(毫秒时间戳) + 4 位随机 base36 字符，转大写后补齐/截断为 12 位。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, info, warn};

use super::ClearingHouseClient;
use super::types::*;
use crate::error::{PromoError, Result};

const SERIAL_LEN: usize = 12;
const FETCH_CODE_LEN: usize = 16;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

/// 生成 12 位序列号
pub fn generate_serial() -> String {
    let mut rng = rand::rng();
    let timestamp = to_base36(Utc::now().timestamp_millis().max(0) as u64);
    let random: String = (0..4)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    let raw = format!("{timestamp}{random}").to_uppercase();
    let padded = format!("{raw:0>width$}", width = SERIAL_LEN);
    padded[padded.len() - SERIAL_LEN..].to_string()
}

/// Mock 清算所
///
/// 记录本实例已发放的全部编码，生成重复时重新生成
#[derive(Debug)]
pub struct MockClearingHouse {
    latency: Duration,
    issued: DashMap<String, String>,
    failing: AtomicBool,
}

impl MockClearingHouse {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            issued: DashMap::new(),
            failing: AtomicBool::new(false),
        }
    }

    /// 切换故障模式，故障模式下存入请求返回 `success = false`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    fn serialize_code(&self, base: &str, client_txn_id: &str) -> String {
        loop {
            let code = format!("{base}{}", generate_serial());
            if self
                .issued
                .insert(code.clone(), client_txn_id.to_string())
                .is_none()
            {
                return code;
            }
            debug!(code = %code, "序列号重复，重新生成");
        }
    }
}

impl Default for MockClearingHouse {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl ClearingHouseClient for MockClearingHouse {
    async fn deposit(&self, request: &DepositRequest) -> DepositResponse {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            warn!(client_txn_id = %request.client_txn_id, "清算所处于故障模式，拒绝存入");
            return DepositResponse::failed(&request.client_txn_id, "清算所暂时不可用");
        }

        if request.gs1s.is_empty() {
            return DepositResponse::failed(&request.client_txn_id, "gs1s 不能为空");
        }

        let gs1s: Vec<String> = match request.mode {
            DepositMode::BaseGs1 => request
                .gs1s
                .iter()
                .map(|base| self.serialize_code(base, &request.client_txn_id))
                .collect(),
            DepositMode::Serialized => request.gs1s.clone(),
        };

        info!(
            client_txn_id = %request.client_txn_id,
            count = gs1s.len(),
            "清算所存入完成"
        );

        DepositResponse {
            success: true,
            gs1s,
            client_txn_id: request.client_txn_id.clone(),
            error: None,
        }
    }

    async fn create_fetch_code(&self, request: &FetchCodeRequest) -> Result<FetchCodeResponse> {
        if request.validity_in_seconds <= 0 {
            return Err(PromoError::Validation(format!(
                "取码有效期必须大于 0: {}",
                request.validity_in_seconds
            )));
        }

        let fetch_code: String = {
            let mut rng = rand::rng();
            (0..FETCH_CODE_LEN)
                .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
                .collect()
        };

        Ok(FetchCodeResponse {
            fetch_code,
            expires_at: Utc::now() + chrono::Duration::seconds(request.validity_in_seconds),
        })
    }

    async fn get_master_offer_files(&self) -> Result<Vec<MasterOfferFile>> {
        Ok(Vec::new())
    }
}
