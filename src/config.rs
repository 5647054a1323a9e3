//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 钱包引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    /// bech32 human readable part (avax / fuji / local)
    pub hrp: String,
    pub network_id: u32,
    /// 原生资产 ID (cb58)
    pub avax_asset_id: String,
    /// C-Chain EIP-155 chain id
    pub evm_chain_id: u64,
}

/// 索引服务单次成员查询的地址上限
pub const MAX_INDEX_WINDOW: u32 = 512;

/// HD 地址扫描配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub gap_limit: u32,
    /// 索引服务单次查询的地址窗口
    pub index_window: u32,
    /// 直连节点扫描的地址窗口
    pub direct_window: u32,
    /// UTXO 查询每批地址数上限
    pub utxo_page_size: usize,
}

/// 交易确认轮询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

/// 各链交易费（最小单位）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    pub x_tx_fee: u64,
    pub p_tx_fee: u64,
    pub c_atomic_fee: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

impl NetworkConfig {
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".into(),
            hrp: "avax".into(),
            network_id: 1,
            avax_asset_id: "FvwEAhmxKfeiG8SnEvq42hc6whRyY3EFYAvebMqDNDGCgxN5Z".into(),
            evm_chain_id: 43114,
        }
    }

    pub fn fuji() -> Self {
        Self {
            name: "fuji".into(),
            hrp: "fuji".into(),
            network_id: 5,
            avax_asset_id: "U8iRqJoiJm8xZHAacmvYyZVwqQx6uDNtQeP3CQ6fcgQk3JqnK".into(),
            evm_chain_id: 43113,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        match std::env::var("WALLET_NETWORK").as_deref() {
            Ok("fuji") | Ok("testnet") => Self::fuji(),
            _ => Self::mainnet(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            gap_limit: std::env::var("SCAN_GAP_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            index_window: std::env::var("SCAN_INDEX_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(512),
            direct_window: std::env::var("SCAN_DIRECT_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(70),
            utxo_page_size: std::env::var("UTXO_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: std::env::var("CONFIRM_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            max_attempts: std::env::var("CONFIRM_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            x_tx_fee: 1_000_000,
            p_tx_fee: 1_000_000,
            c_atomic_fee: 1_000_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self::default())
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 读取 .env 后加载；配置文件存在时优先
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config = match path {
            Some(p) if p.as_ref().exists() => Self::from_file(p)?,
            _ => Self::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.scan.gap_limit == 0 {
            anyhow::bail!("gap_limit must be positive");
        }
        // 窗口必须大于 gap，否则滑动步长为 0
        if self.scan.index_window <= self.scan.gap_limit
            || self.scan.direct_window <= self.scan.gap_limit
        {
            anyhow::bail!("scan windows must be larger than gap_limit");
        }
        if self.scan.index_window > MAX_INDEX_WINDOW {
            anyhow::bail!("index_window must not exceed {}", MAX_INDEX_WINDOW);
        }
        if self.scan.utxo_page_size == 0 || self.scan.utxo_page_size > 1024 {
            anyhow::bail!("utxo_page_size must be within 1..=1024");
        }
        if self.confirmation.max_attempts == 0 {
            anyhow::bail!("max_attempts must be positive");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}
