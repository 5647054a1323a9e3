//! 多链配置模块
//!
//! 定义 X / P / C 三条链的地址格式、精度与派生路径，以及各链交易类型
//! 与链服务线上类型编号之间的映射表

use std::{collections::HashMap, fmt, str::FromStr};

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// 链标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChainAlias {
    /// 资产交换链
    X,
    /// 平台/质押链
    P,
    /// EVM 合约链
    C,
}

impl ChainAlias {
    pub const ALL: [ChainAlias; 3] = [ChainAlias::X, ChainAlias::P, ChainAlias::C];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X => "X",
            Self::P => "P",
            Self::C => "C",
        }
    }
}

impl fmt::Display for ChainAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainAlias {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" | "x" => Ok(Self::X),
            "P" | "p" => Ok(Self::P),
            "C" | "c" => Ok(Self::C),
            other => Err(WalletError::unsupported(format!("unknown chain alias {}", other))),
        }
    }
}

/// 地址编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    /// `X-avax1...`
    Bech32,
    /// `0x...`
    Hex,
}

/// 地址分支
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Branch {
    External = 0,
    Internal = 1,
}

impl Branch {
    pub fn index(&self) -> u32 {
        *self as u32
    }
}

/// 链配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub alias: ChainAlias,
    pub name: String,
    pub address_format: AddressFormat,
    /// 原生资产精度
    pub denomination: u8,
    /// BIP44 coin type
    pub coin_type: u32,
    /// 账户级路径
    pub account_path: String,
}

impl ChainConfig {
    /// 生成完整派生路径
    pub fn derivation_path(&self, change: u32, index: u32) -> String {
        format!("{}/{}/{}", self.account_path, change, index)
    }
}

/// 链配置注册表
pub struct ChainRegistry {
    configs: HashMap<ChainAlias, ChainConfig>,
}

/// 原子交易与 X / P 链共用的金额精度
pub const ATOMIC_DENOMINATION: u8 = 9;

pub const AVAX_ACCOUNT_PATH: &str = "m/44'/9000'/0'";
pub const EVM_ACCOUNT_PATH: &str = "m/44'/60'/0'";

impl ChainRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            configs: HashMap::new(),
        };
        registry.register_default_chains();
        registry
    }

    fn register_default_chains(&mut self) {
        self.register(ChainConfig {
            alias: ChainAlias::X,
            name: "Exchange Chain".to_string(),
            address_format: AddressFormat::Bech32,
            denomination: 9,
            coin_type: 9000,
            account_path: AVAX_ACCOUNT_PATH.to_string(),
        });

        // P 与 X 共享外部分支派生路径，仅地址前缀不同
        self.register(ChainConfig {
            alias: ChainAlias::P,
            name: "Platform Chain".to_string(),
            address_format: AddressFormat::Bech32,
            denomination: 9,
            coin_type: 9000,
            account_path: AVAX_ACCOUNT_PATH.to_string(),
        });

        self.register(ChainConfig {
            alias: ChainAlias::C,
            name: "Contract Chain".to_string(),
            address_format: AddressFormat::Hex,
            denomination: 18,
            coin_type: 60,
            account_path: EVM_ACCOUNT_PATH.to_string(),
        });
    }

    pub fn register(&mut self, config: ChainConfig) {
        self.configs.insert(config.alias, config);
    }

    pub fn get(&self, alias: ChainAlias) -> Option<&ChainConfig> {
        self.configs.get(&alias)
    }

    /// 原生资产展示精度
    pub fn denomination(&self, alias: ChainAlias) -> u8 {
        self.get(alias).map(|c| c.denomination).unwrap_or(ATOMIC_DENOMINATION)
    }

    /// 原子金额 (10^-9) 换算为该链原生单位；C-Chain 放大 10^9
    pub fn to_chain_units(&self, alias: ChainAlias, atomic: U256) -> Result<U256, WalletError> {
        atomic
            .checked_mul(self.unit_scale(alias))
            .ok_or_else(|| WalletError::InvalidAmount(format!("{} overflows {} units", atomic, alias)))
    }

    /// 链原生单位换算回原子金额，不足一个原子单位的尾数舍去
    pub fn to_atomic_units(&self, alias: ChainAlias, amount: U256) -> U256 {
        amount / self.unit_scale(alias)
    }

    fn unit_scale(&self, alias: ChainAlias) -> U256 {
        let extra = self.denomination(alias).saturating_sub(ATOMIC_DENOMINATION);
        U256::exp10(extra as usize)
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 交易类型（内部封闭枚举，与链服务常量解耦）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Base,
    CreateAsset,
    Operation,
    Import,
    Export,
    AddValidator,
    AddDelegator,
    CreateSubnet,
}

// (chain, kind, wire type id)
const TX_KIND_TABLE: &[(ChainAlias, TxKind, u32)] = &[
    (ChainAlias::X, TxKind::Base, 0),
    (ChainAlias::X, TxKind::CreateAsset, 1),
    (ChainAlias::X, TxKind::Operation, 2),
    (ChainAlias::X, TxKind::Import, 3),
    (ChainAlias::X, TxKind::Export, 4),
    (ChainAlias::P, TxKind::AddValidator, 12),
    (ChainAlias::P, TxKind::AddDelegator, 14),
    (ChainAlias::P, TxKind::CreateSubnet, 16),
    (ChainAlias::P, TxKind::Import, 17),
    (ChainAlias::P, TxKind::Export, 18),
    (ChainAlias::P, TxKind::Base, 34),
    (ChainAlias::C, TxKind::Import, 0),
    (ChainAlias::C, TxKind::Export, 1),
];

impl TxKind {
    /// 转换为链服务线上类型编号
    pub fn wire_type_id(&self, chain: ChainAlias) -> Option<u32> {
        TX_KIND_TABLE
            .iter()
            .find(|(c, k, _)| *c == chain && k == self)
            .map(|(_, _, id)| *id)
    }

    /// 从链服务线上类型编号解析
    pub fn from_wire(chain: ChainAlias, type_id: u32) -> Option<Self> {
        TX_KIND_TABLE
            .iter()
            .find(|(c, _, id)| *c == chain && *id == type_id)
            .map(|(_, k, _)| *k)
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Self::Import | Self::Export)
    }

    pub fn is_staking(&self) -> bool {
        matches!(self, Self::AddValidator | Self::AddDelegator)
    }

    /// 是否可以向硬件设备提示找零路径
    ///
    /// 导出/导入/质押交易中"找零"索引会与目标索引重合，不提示
    pub fn supports_change_hint(&self) -> bool {
        matches!(self, Self::Base)
    }
}
