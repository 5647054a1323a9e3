//! 统一交易状态定义
//! 各链服务返回的状态字符串在这里映射为内部封闭枚举

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::chain_config::ChainAlias;

/// 链服务原始状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTxStatus {
    pub status: String,
    /// 拒绝/丢弃原因
    pub reason: Option<String>,
}

impl WireTxStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: None,
        }
    }

    pub fn with_reason(status: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: Some(reason.into()),
        }
    }
}

/// 内部交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// 未知或处理中，继续轮询
    Pending,
    /// X/C Accepted，P Committed
    Confirmed,
    /// X Rejected，P Dropped/Aborted，C Dropped
    Failed,
}

// (chain, wire status, internal status)
const STATUS_TABLE: &[(ChainAlias, &str, TransactionStatus)] = &[
    (ChainAlias::X, "Unknown", TransactionStatus::Pending),
    (ChainAlias::X, "Processing", TransactionStatus::Pending),
    (ChainAlias::X, "Accepted", TransactionStatus::Confirmed),
    (ChainAlias::X, "Rejected", TransactionStatus::Failed),
    (ChainAlias::P, "Unknown", TransactionStatus::Pending),
    (ChainAlias::P, "Processing", TransactionStatus::Pending),
    (ChainAlias::P, "Committed", TransactionStatus::Confirmed),
    (ChainAlias::P, "Dropped", TransactionStatus::Failed),
    (ChainAlias::P, "Aborted", TransactionStatus::Failed),
    (ChainAlias::C, "Unknown", TransactionStatus::Pending),
    (ChainAlias::C, "Processing", TransactionStatus::Pending),
    (ChainAlias::C, "Accepted", TransactionStatus::Confirmed),
    (ChainAlias::C, "Dropped", TransactionStatus::Failed),
];

impl TransactionStatus {
    /// 按链解析；未登记的状态视为仍在处理
    pub fn from_wire(chain: ChainAlias, status: &str) -> Self {
        STATUS_TABLE
            .iter()
            .find(|(c, s, _)| *c == chain && s.eq_ignore_ascii_case(status))
            .map(|(_, _, internal)| *internal)
            .unwrap_or(Self::Pending)
    }

    /// 是否为最终状态
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
