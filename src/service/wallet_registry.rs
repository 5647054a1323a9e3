//! 钱包注册表
//!
//! 只持有弱引用：注册表不延长钱包生命周期。推送事件到达时，
//! 注册表调用每个存活钱包自己的刷新，从不直接修改钱包状态。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use uuid::Uuid;

use crate::service::{chain_client::PushEvent, wallet_core::WalletCore};

#[derive(Default)]
pub struct WalletRegistry {
    members: Mutex<HashMap<Uuid, Weak<WalletCore>>>,
}

/// 注册凭证，析构时自动注销
#[must_use = "dropping the guard deregisters the wallet"]
pub struct RegistrationGuard {
    registry: Weak<WalletRegistry>,
    wallet_id: Uuid,
}

impl RegistrationGuard {
    pub fn wallet_id(&self) -> Uuid {
        self.wallet_id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.wallet_id);
        }
    }
}

impl WalletRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 持锁的线程 panic 后目录本身仍然完整，恢复后继续使用
    fn members(&self) -> MutexGuard<'_, HashMap<Uuid, Weak<WalletCore>>> {
        self.members.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("wallet registry lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    pub fn register(self: &Arc<Self>, wallet: &Arc<WalletCore>) -> RegistrationGuard {
        let wallet_id = wallet.id();
        self.members().insert(wallet_id, Arc::downgrade(wallet));
        tracing::debug!(%wallet_id, "wallet registered");

        RegistrationGuard {
            registry: Arc::downgrade(self),
            wallet_id,
        }
    }

    fn deregister(&self, wallet_id: Uuid) {
        self.members().remove(&wallet_id);
        tracing::debug!(%wallet_id, "wallet deregistered");
    }

    /// 存活的钱包数量（顺带清理已释放的条目）
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self) -> Vec<Arc<WalletCore>> {
        let mut members = self.members();
        members.retain(|_, w| w.strong_count() > 0);
        members.values().filter_map(Weak::upgrade).collect()
    }

    /// 广播推送事件，返回实际刷新的钱包数
    ///
    /// 单个钱包刷新失败只记录日志，不影响其它钱包
    pub async fn notify(&self, event: PushEvent) -> usize {
        // 先取出强引用再释放锁，刷新期间不持有注册表锁
        let wallets = self.live();

        let refreshes = wallets.iter().map(|wallet| wallet.handle_push(&event));
        let outcomes = futures::future::join_all(refreshes).await;

        let mut refreshed = 0;
        for (wallet, outcome) in wallets.iter().zip(outcomes) {
            match outcome {
                Ok(true) => refreshed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(wallet_id = %wallet.id(), event = ?event, error = %e, "push refresh failed");
                }
            }
        }
        refreshed
    }
}
