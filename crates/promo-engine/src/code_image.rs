//! 条码图片生成
//!
//! 核心层把图片引用当作不透明字符串处理（路径或 data URL）。

use async_trait::async_trait;

use crate::error::{PromoError, Result};

/// 条码图片生成接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeImageGenerator: Send + Sync {
    async fn generate(&self, payload: &str) -> Result<String>;
}

/// 按前缀拼接路径的默认实现
#[derive(Debug, Clone)]
pub struct PathCodeImageGenerator {
    prefix: String,
}

impl PathCodeImageGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CodeImageGenerator for PathCodeImageGenerator {
    async fn generate(&self, payload: &str) -> Result<String> {
        if payload.is_empty() {
            return Err(PromoError::CodeImage("编码内容为空".to_string()));
        }
        Ok(format!("{}/{}.png", self.prefix, payload))
    }
}
