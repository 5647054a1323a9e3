// Event Bus
// 钱包状态变更通知：每个订阅者按发布顺序收到每一条事件，订阅者之间不保证顺序

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
    domain::chain_config::{Branch, ChainAlias},
    error::WalletResult,
};

// ============ 事件类型定义 ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    BalanceChanged {
        wallet_id: Uuid,
        chain: ChainAlias,
    },
    AddressChanged {
        wallet_id: Uuid,
        chain: ChainAlias,
        branch: Branch,
        index: u32,
        address: String,
    },
    TransferStateChanged {
        transfer_id: Uuid,
        state: String,
        export_tx_id: Option<String>,
        import_tx_id: Option<String>,
    },
}

impl WalletEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BalanceChanged { .. } => "BalanceChanged",
            Self::AddressChanged { .. } => "AddressChanged",
            Self::TransferStateChanged { .. } => "TransferStateChanged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event: WalletEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

// ============ Event Handler Trait ============

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &WalletEvent) -> WalletResult<()>;
    fn event_types(&self) -> Vec<&'static str>;
}

// ============ 订阅者列表 Event Bus ============

/// 每个订阅者一条无界通道：慢订阅者只会积压，不会丢事件
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<EventEnvelope>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<EventEnvelope>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 发布事件；已关闭的订阅者在此时移除
    pub fn publish(&self, event: WalletEvent) {
        let envelope = EventEnvelope {
            event_id: Uuid::new_v4(),
            event,
            published_at: chrono::Utc::now(),
        };

        tracing::debug!(
            event_type = envelope.event.event_type(),
            event_id = %envelope.event_id,
            "publishing wallet event"
        );

        let mut subscribers = self.subscribers();
        subscribers.retain(|sender| sender.send(envelope.clone()).is_ok());
        if subscribers.is_empty() {
            tracing::trace!("no subscribers for wallet event");
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers().push(sender);
        receiver
    }

    /// 仍在监听的订阅者数量
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }

    /// 挂载处理器：后台任务按类型过滤后调用，总线全部释放后退出
    pub fn attach(&self, handler: Arc<dyn EventHandler>) -> JoinHandle<()> {
        let mut receiver = self.subscribe();

        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                if !handler.event_types().contains(&envelope.event.event_type()) {
                    continue;
                }
                if let Err(e) = handler.handle(&envelope.event).await {
                    tracing::error!(
                        error = %e,
                        event_id = %envelope.event_id,
                        "event handler failed"
                    );
                }
            }
        })
    }
}
