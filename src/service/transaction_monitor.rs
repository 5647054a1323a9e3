// 交易确认监控
// 固定间隔轮询链服务状态，有次数上限，可由调用方取消
// 取消只停止本地轮询，不回滚已提交的链上状态

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::{
    config::ConfirmationConfig,
    domain::transaction_status::TransactionStatus,
    error::{WalletError, WalletResult},
    service::chain_client::ChainService,
};

/// 取消令牌，可克隆后交给 UI 层
#[derive(Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// 直到被取消才返回
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // 发送端随令牌存活，不会走到这里
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TransactionMonitor {
    poll_interval: Duration,
    max_attempts: u32,
}

impl TransactionMonitor {
    pub fn new(config: &ConfirmationConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 等待交易确认
    ///
    /// - 确认：Ok
    /// - 链上拒绝/丢弃：`Rejected`，携带链服务给出的原因
    /// - 次数用尽：`ConfirmationTimeout`
    /// - 被取消：`Cancelled`
    ///
    /// 查询失败计入次数，不额外重试
    pub async fn await_confirmation(
        &self,
        service: &dyn ChainService,
        tx_id: &str,
        cancel: Option<&CancelToken>,
    ) -> WalletResult<()> {
        let chain = service.chain();

        for attempt in 1..=self.max_attempts {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return Err(WalletError::Cancelled {
                    tx_id: tx_id.to_string(),
                });
            }

            match service.get_transaction_status(tx_id).await {
                Ok(wire) => match TransactionStatus::from_wire(chain, &wire.status) {
                    TransactionStatus::Confirmed => {
                        tracing::info!(%chain, tx_id, attempt, status = %wire.status, "transaction confirmed");
                        return Ok(());
                    }
                    TransactionStatus::Failed => {
                        let reason = wire.reason.unwrap_or_else(|| wire.status.clone());
                        tracing::warn!(%chain, tx_id, status = %wire.status, %reason, "transaction rejected");
                        return Err(WalletError::Rejected {
                            chain,
                            tx_id: tx_id.to_string(),
                            reason,
                        });
                    }
                    TransactionStatus::Pending => {
                        tracing::debug!(%chain, tx_id, attempt, status = %wire.status, "transaction pending");
                    }
                },
                Err(e) => {
                    tracing::warn!(%chain, tx_id, attempt, error = %e, "status query failed");
                }
            }

            if attempt == self.max_attempts {
                break;
            }

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = token.cancelled() => {
                            return Err(WalletError::Cancelled { tx_id: tx_id.to_string() });
                        }
                    }
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }

        Err(WalletError::ConfirmationTimeout {
            chain,
            tx_id: tx_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}
