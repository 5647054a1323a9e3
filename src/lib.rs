//! avacore - Avalanche X/P/C 多链非托管钱包引擎
//!
//! 私钥只存在于本地内存或硬件设备中；链服务、索引服务、硬件设备都通过异步 trait 注入

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{WalletError, WalletResult};

pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{AssetBalance, ChainAddress, ChainAlias, KeyHash, SignedTx, UnsignedTx, Utxo},
        error::{WalletError, WalletResult},
        infrastructure::event_bus::{EventBus, WalletEvent},
        service::{
            CancelToken, ChainService, HardwareTransport, IndexService, PushEvent, SignerBackend,
            TransferOrchestrator, TransferState, WalletCore, WalletIdentity, WalletRegistry,
            WalletServices,
        },
    };
}
