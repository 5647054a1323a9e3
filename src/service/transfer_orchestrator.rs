//! 跨链转账编排
//!
//! 导出（源链）+ 导入（目标链）两笔交易，严格按状态表推进，每次转换发事件。
//! 导出成功而导入失败时，错误里带上导出交易 ID，可用 `retry_import` 幂等补做导入。

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    domain::{chain_config::ChainAlias, transaction::UnsignedTx},
    error::{WalletError, WalletResult},
    infrastructure::event_bus::WalletEvent,
    service::{transaction_monitor::CancelToken, wallet_core::WalletCore},
};

/// 跨链转账状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferState {
    Idle,
    BuildExport,
    SignExport,
    SubmitExport,
    AwaitExportConfirm,
    BuildImport,
    SignImport,
    SubmitImport,
    AwaitImportConfirm,
    Success,
    Failed,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BuildExport => "build_export",
            Self::SignExport => "sign_export",
            Self::SubmitExport => "submit_export",
            Self::AwaitExportConfirm => "await_export_confirm",
            Self::BuildImport => "build_import",
            Self::SignImport => "sign_import",
            Self::SubmitImport => "submit_import",
            Self::AwaitImportConfirm => "await_import_confirm",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "idle" => Self::Idle,
            "build_export" => Self::BuildExport,
            "sign_export" => Self::SignExport,
            "submit_export" => Self::SubmitExport,
            "await_export_confirm" => Self::AwaitExportConfirm,
            "build_import" => Self::BuildImport,
            "sign_import" => Self::SignImport,
            "submit_import" => Self::SubmitImport,
            "await_import_confirm" => Self::AwaitImportConfirm,
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// 验证状态转换是否合法
    pub fn can_transition(from: TransferState, to: TransferState) -> bool {
        use TransferState::*;

        matches!(
            (from, to),
            // 正常流程
            (Idle, BuildExport)
            | (BuildExport, SignExport)
            | (SignExport, SubmitExport)
            | (SubmitExport, AwaitExportConfirm)
            | (AwaitExportConfirm, BuildImport)
            | (BuildImport, SignImport)
            | (SignImport, SubmitImport)
            | (SubmitImport, AwaitImportConfirm)
            | (AwaitImportConfirm, Success)

            // 失败分支
            | (BuildExport, Failed)
            | (SignExport, Failed)
            | (SubmitExport, Failed)
            | (AwaitExportConfirm, Failed)
            | (BuildImport, Failed)
            | (SignImport, Failed)
            | (SubmitImport, Failed)
            | (AwaitImportConfirm, Failed)

            // 导出已确认后重试导入
            | (Failed, BuildImport)
        )
    }

    /// 进度（百分比）
    pub fn progress(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::BuildExport => 5,
            Self::SignExport => 10,
            Self::SubmitExport => 20,
            Self::AwaitExportConfirm => 30,
            Self::BuildImport => 55,
            Self::SignImport => 60,
            Self::SubmitImport => 70,
            Self::AwaitImportConfirm => 80,
            Self::Success => 100,
            Self::Failed => 0,
        }
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFees {
    /// 源链导出交易费
    pub export_fee: U256,
    /// 目标链导入交易费，随导出金额一起锁定
    pub import_fee: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub source: ChainAlias,
    pub destination: ChainAlias,
    pub amount: U256,
    /// 为空时使用配置中的各链默认费用
    pub fees: Option<TransferFees>,
}

impl TransferIntent {
    pub fn new(source: ChainAlias, destination: ChainAlias, amount: U256) -> Self {
        Self {
            source,
            destination,
            amount,
            fees: None,
        }
    }

    pub fn with_fees(mut self, fees: TransferFees) -> Self {
        self.fees = Some(fees);
        self
    }

    /// 本地校验，不发起任何网络请求
    pub fn validate(&self) -> WalletResult<()> {
        if self.source == self.destination {
            return Err(WalletError::unsupported(format!(
                "cannot transfer from {}-chain to itself",
                self.source
            )));
        }
        if self.amount.is_zero() {
            return Err(WalletError::InvalidAmount(
                "transfer amount must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// 重试导入所需的导出信息，可由调用方持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub transfer_id: Option<Uuid>,
    pub source: ChainAlias,
    pub destination: ChainAlias,
    pub export_tx_id: String,
    pub import_fee: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub intent: TransferIntent,
    pub fees: TransferFees,
    pub state: TransferState,
    pub export_tx_id: Option<String>,
    pub import_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    fn new(intent: TransferIntent, fees: TransferFees) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            intent,
            fees,
            state: TransferState::Idle,
            export_tx_id: None,
            import_tx_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 源链实际扣除：amount + 导入费 + 导出费
    pub fn export_amount(&self) -> U256 {
        self.exported_value() + self.fees.export_fee
    }

    /// 导出到共享内存的原子金额：amount + 导入费
    pub fn exported_value(&self) -> U256 {
        self.intent.amount + self.fees.import_fee
    }

    pub fn export_record(&self) -> Option<ExportRecord> {
        Some(ExportRecord {
            transfer_id: Some(self.id),
            source: self.intent.source,
            destination: self.intent.destination,
            export_tx_id: self.export_tx_id.clone()?,
            import_fee: self.fees.import_fee,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportOutcome {
    Imported { tx_id: String },
    /// 目标链已没有待导入的原子 UTXO
    AlreadyImported,
}

pub struct TransferOrchestrator {
    wallet: Arc<WalletCore>,
    records: Mutex<HashMap<Uuid, TransferRecord>>,
}

impl TransferOrchestrator {
    pub fn new(wallet: Arc<WalletCore>) -> Self {
        Self {
            wallet,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn wallet(&self) -> &Arc<WalletCore> {
        &self.wallet
    }

    pub fn default_fees(&self, source: ChainAlias, destination: ChainAlias) -> TransferFees {
        TransferFees {
            export_fee: self.wallet.default_fee(source),
            import_fee: self.wallet.default_fee(destination),
        }
    }

    /// 已知转账记录（含失败的）
    pub async fn record(&self, transfer_id: Uuid) -> Option<TransferRecord> {
        self.records.lock().await.get(&transfer_id).cloned()
    }

    /// 执行一次完整的跨链转账
    pub async fn transfer(
        &self,
        intent: TransferIntent,
        cancel: Option<&CancelToken>,
    ) -> WalletResult<TransferRecord> {
        intent.validate()?;

        let fees = intent
            .fees
            .unwrap_or_else(|| self.default_fees(intent.source, intent.destination));
        let mut record = TransferRecord::new(intent, fees);

        tracing::info!(
            transfer_id = %record.id,
            source = %record.intent.source,
            destination = %record.intent.destination,
            amount = %record.intent.amount,
            export_amount = %record.export_amount(),
            "cross-chain transfer started"
        );

        let result = self.run(&mut record, cancel).await;
        self.finish(record, result).await
    }

    /// 幂等补做导入：没有待导入的原子 UTXO 时返回 `AlreadyImported`
    pub async fn retry_import(
        &self,
        export: &ExportRecord,
        cancel: Option<&CancelToken>,
    ) -> WalletResult<ImportOutcome> {
        let known = match export.transfer_id {
            Some(id) => self.record(id).await,
            None => None,
        };

        let Some(unsigned) = self
            .wallet
            .build_import_tx(export.destination, export.source, export.import_fee)
            .await?
        else {
            tracing::info!(export_tx_id = %export.export_tx_id, "nothing left to import");
            return Ok(ImportOutcome::AlreadyImported);
        };

        let mut record = known.unwrap_or_else(|| {
            let intent = TransferIntent::new(export.source, export.destination, U256::zero());
            let fees = TransferFees {
                export_fee: U256::zero(),
                import_fee: export.import_fee,
            };
            let mut record = TransferRecord::new(intent, fees);
            record.state = TransferState::Failed;
            record.export_tx_id = Some(export.export_tx_id.clone());
            record
        });

        let result = match self.advance(&mut record, TransferState::BuildImport) {
            Ok(()) => self.import_leg(&mut record, unsigned, cancel).await,
            Err(e) => Err(e),
        };

        let record = self.finish(record, result).await?;
        Ok(ImportOutcome::Imported {
            tx_id: record.import_tx_id.unwrap_or_default(),
        })
    }

    async fn run(
        &self,
        record: &mut TransferRecord,
        cancel: Option<&CancelToken>,
    ) -> WalletResult<()> {
        let source = record.intent.source;
        let destination = record.intent.destination;
        let wallet = &self.wallet;

        self.advance(record, TransferState::BuildExport)?;
        let export = wallet
            .build_export_tx(
                source,
                destination,
                record.exported_value(),
                record.fees.export_fee,
            )
            .await?;

        self.advance(record, TransferState::SignExport)?;
        let signed = wallet.sign_transaction(&export).await?;

        self.advance(record, TransferState::SubmitExport)?;
        let export_tx_id = wallet.submit_transaction(&signed).await?;
        record.export_tx_id = Some(export_tx_id.clone());

        self.advance(record, TransferState::AwaitExportConfirm)?;
        wallet
            .await_confirmation(source, &export_tx_id, cancel)
            .await?;
        wallet.refresh(source).await?;

        self.advance(record, TransferState::BuildImport)?;
        let import = wallet
            .build_import_tx(destination, source, record.fees.import_fee)
            .await?
            .ok_or_else(|| {
                WalletError::network(
                    "atomic",
                    format!("exported outputs not yet visible on {}-chain", destination),
                )
            })?;

        self.import_leg(record, import, cancel).await
    }

    /// BuildImport 之后的导入阶段
    async fn import_leg(
        &self,
        record: &mut TransferRecord,
        import: UnsignedTx,
        cancel: Option<&CancelToken>,
    ) -> WalletResult<()> {
        let destination = record.intent.destination;
        let wallet = &self.wallet;

        self.advance(record, TransferState::SignImport)?;
        let signed = wallet.sign_transaction(&import).await?;

        self.advance(record, TransferState::SubmitImport)?;
        let import_tx_id = wallet.submit_transaction(&signed).await?;
        record.import_tx_id = Some(import_tx_id.clone());

        self.advance(record, TransferState::AwaitImportConfirm)?;
        wallet
            .await_confirmation(destination, &import_tx_id, cancel)
            .await?;
        wallet.refresh(destination).await?;

        self.advance(record, TransferState::Success)
    }

    fn advance(&self, record: &mut TransferRecord, to: TransferState) -> WalletResult<()> {
        if !TransferState::can_transition(record.state, to) {
            return Err(WalletError::unsupported(format!(
                "invalid transfer transition: {} -> {}",
                record.state, to
            )));
        }

        tracing::debug!(
            transfer_id = %record.id,
            from = %record.state,
            to = %to,
            progress = to.progress(),
            "transfer state transition"
        );

        record.state = to;
        record.updated_at = Utc::now();
        self.wallet.events().publish(WalletEvent::TransferStateChanged {
            transfer_id: record.id,
            state: to.as_str().to_string(),
            export_tx_id: record.export_tx_id.clone(),
            import_tx_id: record.import_tx_id.clone(),
        });
        Ok(())
    }

    /// 保存记录；失败时转入 Failed 并包装为 `TransferFailed`
    async fn finish(
        &self,
        mut record: TransferRecord,
        result: WalletResult<()>,
    ) -> WalletResult<TransferRecord> {
        let outcome = match result {
            Ok(()) => {
                tracing::info!(
                    transfer_id = %record.id,
                    export_tx_id = ?record.export_tx_id,
                    import_tx_id = ?record.import_tx_id,
                    "cross-chain transfer completed"
                );
                Ok(record.clone())
            }
            Err(source) => {
                let failed_at = record.state;
                if TransferState::can_transition(failed_at, TransferState::Failed) {
                    // 失败转换本身不会出错
                    let _ = self.advance(&mut record, TransferState::Failed);
                }

                tracing::warn!(
                    transfer_id = %record.id,
                    state = %failed_at,
                    export_tx_id = ?record.export_tx_id,
                    error = %source,
                    "cross-chain transfer failed"
                );

                Err(WalletError::TransferFailed {
                    transfer_id: record.id.to_string(),
                    state: failed_at.as_str().to_string(),
                    export_tx_id: record.export_tx_id.clone(),
                    source: Box::new(source),
                })
            }
        };

        self.records.lock().await.insert(record.id, record);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(TransferState::can_transition(
            TransferState::Idle,
            TransferState::BuildExport
        ));
        assert!(TransferState::can_transition(
            TransferState::AwaitExportConfirm,
            TransferState::BuildImport
        ));
        assert!(TransferState::can_transition(
            TransferState::AwaitImportConfirm,
            TransferState::Success
        ));
        assert!(TransferState::can_transition(
            TransferState::Failed,
            TransferState::BuildImport
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!TransferState::can_transition(
            TransferState::Idle,
            TransferState::Success
        ));
        assert!(!TransferState::can_transition(
            TransferState::Success,
            TransferState::BuildExport
        ));
        assert!(!TransferState::can_transition(
            TransferState::Idle,
            TransferState::Failed
        ));
        assert!(!TransferState::can_transition(
            TransferState::Failed,
            TransferState::BuildExport
        ));
    }

    #[test]
    fn test_state_names_round_trip() {
        use TransferState::*;
        for state in [
            Idle,
            BuildExport,
            SignExport,
            SubmitExport,
            AwaitExportConfirm,
            BuildImport,
            SignImport,
            SubmitImport,
            AwaitImportConfirm,
            Success,
            Failed,
        ] {
            assert_eq!(TransferState::parse(state.as_str()), Some(state));
        }
        assert_eq!(TransferState::parse("refunded"), None);
    }

    #[test]
    fn test_progress_is_monotonic_on_happy_path() {
        use TransferState::*;
        let path = [
            Idle,
            BuildExport,
            SignExport,
            SubmitExport,
            AwaitExportConfirm,
            BuildImport,
            SignImport,
            SubmitImport,
            AwaitImportConfirm,
            Success,
        ];
        for pair in path.windows(2) {
            assert!(TransferState::can_transition(pair[0], pair[1]));
            assert!(pair[0].progress() < pair[1].progress());
        }
    }

    #[test]
    fn test_intent_validation() {
        let same = TransferIntent::new(ChainAlias::X, ChainAlias::X, U256::from(1));
        assert_eq!(same.validate().unwrap_err().code(), "unsupported");

        let zero = TransferIntent::new(ChainAlias::X, ChainAlias::P, U256::zero());
        assert_eq!(zero.validate().unwrap_err().code(), "invalid_amount");

        assert!(TransferIntent::new(ChainAlias::C, ChainAlias::P, U256::from(1))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_export_amount_includes_both_fees() {
        let intent = TransferIntent::new(ChainAlias::X, ChainAlias::P, U256::from(500_000_000u64));
        let record = TransferRecord::new(
            intent,
            TransferFees {
                export_fee: U256::from(1_000_000u64),
                import_fee: U256::from(1_000_000u64),
            },
        );
        assert_eq!(record.exported_value(), U256::from(501_000_000u64));
        assert_eq!(record.export_amount(), U256::from(502_000_000u64));
        assert!(record.export_record().is_none());
    }
}
