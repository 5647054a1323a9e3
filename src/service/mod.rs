//! Service 模块
//!
//! 外部服务接口、地址扫描、UTXO 与余额、签名、确认监控、跨链编排、keystore

pub mod address_scanner;
pub mod balance_service;
pub mod chain_client;
pub mod keystore;
pub mod signer;
pub mod transaction_monitor;
pub mod transfer_orchestrator;
pub mod utxo_store;
pub mod wallet_core;
pub mod wallet_registry;

pub use chain_client::{ChainService, HardwareTransport, IndexService, PushEvent};
pub use signer::SignerBackend;
pub use transaction_monitor::{CancelToken, TransactionMonitor};
pub use transfer_orchestrator::{TransferOrchestrator, TransferState};
pub use wallet_core::{WalletCore, WalletIdentity, WalletServices};
pub use wallet_registry::{RegistrationGuard, WalletRegistry};
