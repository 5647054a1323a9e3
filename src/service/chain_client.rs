//! 外部服务契约
//!
//! 链节点、索引服务、硬件签名设备都视为不透明的异步服务，
//! 这里只定义钱包引擎需要的接口与数据结构

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        chain_config::ChainAlias,
        derivation::KeyHash,
        transaction::{TxSignature, UnsignedTx},
        transaction_status::WireTxStatus,
        utxo::{AssetDescription, Utxo, UtxoSet},
    },
    error::{TransportError, WalletResult},
};

/// 单页 UTXO 查询结果
#[derive(Debug, Clone, Default)]
pub struct UtxoPage {
    pub utxos: Vec<Utxo>,
    /// 下一页游标，为空表示已取完
    pub next_page: Option<String>,
    /// 本页条数
    pub count: usize,
}

/// 同链转账
#[derive(Debug, Clone)]
pub struct BaseTxRequest {
    pub utxos: UtxoSet,
    pub asset_id: String,
    pub amount: U256,
    pub to: KeyHash,
    pub from: Vec<KeyHash>,
    pub change: KeyHash,
    pub fee: U256,
}

/// 导出：在源链锁定 `amount`（已含目标链导入费）
///
/// `amount` 与 `fee` 为原子金额 (10^-9)；`debit` 是源链按自身原生单位扣除的总额
#[derive(Debug, Clone)]
pub struct ExportTxRequest {
    pub utxos: UtxoSet,
    pub destination: ChainAlias,
    pub amount: U256,
    pub to: KeyHash,
    pub from: Vec<KeyHash>,
    pub change: KeyHash,
    pub fee: U256,
    pub debit: U256,
}

/// 导入：领取来源链导出的原子 UTXO
///
/// `credit` 是目标链按自身原生单位入账的金额（原子总额减导入费后换算）
#[derive(Debug, Clone)]
pub struct ImportTxRequest {
    pub atomic_utxos: UtxoSet,
    pub source: ChainAlias,
    pub to: KeyHash,
    pub fee: U256,
    pub credit: U256,
}

/// 单链节点服务
#[async_trait]
pub trait ChainService: Send + Sync {
    fn chain(&self) -> ChainAlias;

    /// 分页获取地址集合的 UTXO，`limit` 不超过 1024
    async fn get_utxos(
        &self,
        addresses: &[String],
        page: Option<String>,
        limit: usize,
    ) -> WalletResult<UtxoPage>;

    /// 来源链导出到本链、尚未导入的原子 UTXO
    async fn get_atomic_utxos(
        &self,
        addresses: &[String],
        source: ChainAlias,
    ) -> WalletResult<Vec<Utxo>>;

    async fn submit_transaction(&self, signed_tx: &[u8]) -> WalletResult<String>;

    async fn get_transaction_status(&self, tx_id: &str) -> WalletResult<WireTxStatus>;

    async fn get_asset_description(&self, asset_id: &str) -> WalletResult<AssetDescription>;

    /// 余额不足时返回 `InsufficientFunds`
    async fn build_base_tx(&self, request: BaseTxRequest) -> WalletResult<UnsignedTx>;

    async fn build_export_tx(&self, request: ExportTxRequest) -> WalletResult<UnsignedTx>;

    async fn build_import_tx(&self, request: ImportTxRequest) -> WalletResult<UnsignedTx>;

    /// 网络时间（秒），用于锁定分类
    async fn current_time(&self) -> WalletResult<u64> {
        Ok(chrono::Utc::now().timestamp().max(0) as u64)
    }
}

/// 历史交易记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub chain: ChainAlias,
    pub timestamp: u64,
    pub tx_type: String,
    pub value: U256,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub transactions: Vec<TransactionRecord>,
    pub next_cursor: Option<String>,
}

/// 索引/浏览器服务（可选）
#[async_trait]
pub trait IndexService: Send + Sync {
    /// 地址 → 出现过的链
    async fn get_address_chain_membership(
        &self,
        addresses: &[String],
    ) -> WalletResult<HashMap<String, HashSet<ChainAlias>>>;

    async fn get_transaction_history(
        &self,
        addresses: &[String],
        limit: usize,
        chain: ChainAlias,
        cursor: Option<String>,
    ) -> WalletResult<HistoryPage>;
}

/// 设备应用版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl AppVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    /// SEC1 压缩或未压缩公钥
    pub public_key: Vec<u8>,
    pub chain_code: [u8; 32],
}

/// 设备签名结果：设备实际签名的摘要 + 按路径后缀的签名
#[derive(Debug, Clone)]
pub struct DeviceSignResponse {
    pub hash: [u8; 32],
    pub signatures: BTreeMap<String, TxSignature>,
}

/// 硬件签名设备传输层（USB/蓝牙分帧不在此处）
#[async_trait]
pub trait HardwareTransport: Send + Sync {
    /// 旧固件返回 `UnsupportedInstruction`
    async fn app_configuration(&self) -> Result<AppVersion, TransportError>;

    async fn get_extended_public_key(
        &self,
        path: &str,
    ) -> Result<ExtendedPublicKey, TransportError>;

    /// 设备解析并展示交易，每个路径返回一个签名
    async fn sign_structured(
        &self,
        account_path: &str,
        path_suffixes: &[String],
        tx_bytes: &[u8],
        change_path: Option<&str>,
    ) -> Result<DeviceSignResponse, TransportError>;

    /// 只签摘要，设备回显实际签名的摘要
    async fn sign_hash(
        &self,
        account_path: &str,
        path_suffixes: &[String],
        digest: &[u8; 32],
    ) -> Result<DeviceSignResponse, TransportError>;

    /// 对 EVM 交易 RLP 签名
    async fn sign_evm_transaction(
        &self,
        path: &str,
        rlp: &[u8],
    ) -> Result<ethers::types::Signature, TransportError>;
}

/// 推送通道事件，只用于触发刷新，不携带余额
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushEvent {
    NewBlock { chain: ChainAlias },
    AddressActivity { address: String },
}
