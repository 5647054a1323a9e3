//! 单链 UTXO 存储
//!
//! 刷新时按地址分批（每批 ≤1024）逐页拉取，合并后整体替换旧集合

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    domain::{chain_config::ChainAlias, utxo::UtxoSet},
    error::WalletResult,
    service::chain_client::{ChainService, UtxoPage},
};

/// 链服务单次查询的地址上限
pub const MAX_PAGE_SIZE: usize = 1024;

/// 拉取地址集合的全部 UTXO
///
/// 地址按 `chunk_size` 分批，每批用显式循环消费所有分页
pub async fn fetch_all_utxos(
    service: &dyn ChainService,
    addresses: &[String],
    chunk_size: usize,
) -> WalletResult<UtxoSet> {
    let chunk_size = chunk_size.clamp(1, MAX_PAGE_SIZE);
    let mut set = UtxoSet::new();

    for chunk in addresses.chunks(chunk_size) {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let UtxoPage {
                utxos,
                next_page,
                count,
            } = service.get_utxos(chunk, cursor.clone(), chunk_size).await?;
            pages += 1;

            for utxo in utxos {
                set.insert(utxo);
            }

            match next_page {
                // 空页或游标不前进时结束
                Some(next) if count > 0 && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }

        tracing::trace!(
            chain = %service.chain(),
            addresses = chunk.len(),
            pages,
            "utxo chunk fetched"
        );
    }

    Ok(set)
}

pub struct UtxoStore {
    chain: ChainAlias,
    service: Arc<dyn ChainService>,
    page_size: usize,
    utxos: UtxoSet,
    last_refreshed: Option<DateTime<Utc>>,
}

impl UtxoStore {
    pub fn new(service: Arc<dyn ChainService>, page_size: usize) -> Self {
        Self {
            chain: service.chain(),
            service,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            utxos: UtxoSet::new(),
            last_refreshed: None,
        }
    }

    pub fn chain(&self) -> ChainAlias {
        self.chain
    }

    pub fn service(&self) -> &Arc<dyn ChainService> {
        &self.service
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    /// 拉取并整体替换；失败时保留旧集合
    pub async fn refresh(&mut self, addresses: &[String]) -> WalletResult<&UtxoSet> {
        let fresh = fetch_all_utxos(self.service.as_ref(), addresses, self.page_size).await?;

        tracing::debug!(
            chain = %self.chain,
            addresses = addresses.len(),
            previous = self.utxos.len(),
            current = fresh.len(),
            "utxo set refreshed"
        );

        self.utxos = fresh;
        self.last_refreshed = Some(Utc::now());
        Ok(&self.utxos)
    }
}
