//! Domain 模块
//!
//! 纯领域模型：链配置、密钥派生、UTXO 与交易

pub mod chain_config;
pub mod derivation;
pub mod transaction;
pub mod transaction_status;
pub mod utxo;

// 重新导出常用类型
pub use chain_config::{AddressFormat, Branch, ChainAlias, ChainConfig, ChainRegistry, TxKind};
pub use derivation::{AccountXpub, ChainAddress, DerivedKey, HdPath, KeyHash, KeySource};
pub use transaction::{Credential, SignedTx, TxInput, TxOutput, TxSignature, UnsignedTx};
pub use transaction_status::{TransactionStatus, WireTxStatus};
pub use utxo::{AssetBalance, AssetDescription, LockClass, NftGroup, NftPayload, OutputKind, Utxo, UtxoSet};
