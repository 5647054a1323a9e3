//! HD 地址扫描器
//!
//! 每个 (链, 分支) 一个实例，维护当前活跃索引（单调不减）。
//! `reset_index` 按 gap limit 规则从头扫描，开销大，只在显式重扫时调用。

use std::{
    collections::{btree_map::Entry, BTreeMap, HashSet},
    sync::Arc,
};

use crate::{
    domain::{
        chain_config::{Branch, ChainAlias},
        derivation::{ChainAddress, DerivedKey, HdPath, KeyHash, KeySource},
    },
    error::WalletResult,
    service::{
        chain_client::{ChainService, IndexService},
        utxo_store::fetch_all_utxos,
    },
};

/// 扫描策略
pub enum ScanStrategy<'a> {
    /// 索引服务批量查询地址出现过的链
    IndexService {
        service: &'a dyn IndexService,
        window: u32,
    },
    /// 直连节点，同时查询 X 与 P 的 UTXO
    DirectNode {
        x: &'a dyn ChainService,
        p: &'a dyn ChainService,
        window: u32,
        page_size: usize,
    },
}

impl ScanStrategy<'_> {
    fn window(&self) -> u32 {
        match self {
            Self::IndexService { window, .. } | Self::DirectNode { window, .. } => *window,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::IndexService { .. } => "index_service",
            Self::DirectNode { .. } => "direct_node",
        }
    }
}

struct CachedKey {
    key: DerivedKey,
    address: ChainAddress,
}

pub struct AddressScanner {
    chain: ChainAlias,
    branch: Branch,
    hrp: String,
    source: Arc<KeySource>,
    gap_limit: u32,
    index: u32,
    // 按索引缓存，永不失效
    cache: BTreeMap<u32, CachedKey>,
}

impl AddressScanner {
    pub fn new(
        chain: ChainAlias,
        branch: Branch,
        hrp: impl Into<String>,
        source: Arc<KeySource>,
        gap_limit: u32,
    ) -> Self {
        Self {
            chain,
            branch,
            hrp: hrp.into(),
            source,
            gap_limit,
            index: 0,
            cache: BTreeMap::new(),
        }
    }

    pub fn chain(&self) -> ChainAlias {
        self.chain
    }

    pub fn branch(&self) -> Branch {
        self.branch
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    fn entry(&mut self, index: u32) -> WalletResult<&CachedKey> {
        // 单密钥身份只有一个地址
        let index = if self.source.is_hd() { index } else { 0 };

        match self.cache.entry(index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let key = self.source.derive(HdPath::new(self.branch, index))?;
                let address = key.address(self.chain, &self.hrp)?;
                Ok(slot.insert(CachedKey { key, address }))
            }
        }
    }

    pub fn key_at(&mut self, index: u32) -> WalletResult<DerivedKey> {
        Ok(self.entry(index)?.key.clone())
    }

    pub fn address_at(&mut self, index: u32) -> WalletResult<ChainAddress> {
        Ok(self.entry(index)?.address.clone())
    }

    pub fn active_address(&mut self) -> WalletResult<ChainAddress> {
        self.address_at(self.index)
    }

    pub fn active_key(&mut self) -> WalletResult<DerivedKey> {
        self.key_at(self.index)
    }

    /// 0..=index 的全部地址
    pub fn addresses(&mut self) -> WalletResult<Vec<ChainAddress>> {
        (0..=self.index).map(|i| self.address_at(i)).collect()
    }

    /// 0..=index 的全部密钥
    pub fn keys(&mut self) -> WalletResult<Vec<DerivedKey>> {
        if !self.source.is_hd() {
            return Ok(vec![self.key_at(0)?]);
        }
        (0..=self.index).map(|i| self.key_at(i)).collect()
    }

    /// 在已派生范围内按地址哈希查找路径
    pub fn find_path(&mut self, hash: &KeyHash) -> WalletResult<Option<HdPath>> {
        for i in 0..=self.index {
            let entry = self.entry(i)?;
            if &entry.key.hash == hash {
                return Ok(Some(entry.key.path));
            }
        }
        Ok(None)
    }

    /// 活跃地址收到资金后前进一位
    pub fn increment(&mut self) -> u32 {
        if self.source.is_hd() {
            self.index += 1;
            tracing::debug!(
                chain = %self.chain,
                branch = ?self.branch,
                index = self.index,
                "address index incremented"
            );
        }
        self.index
    }

    /// 从 `start` 开始寻找第一段连续 gap_limit 个未使用地址，返回其起点
    ///
    /// 拉取失败直接返回错误，不重试
    pub async fn reset_index(
        &mut self,
        start: u32,
        strategy: &ScanStrategy<'_>,
    ) -> WalletResult<u32> {
        if !self.source.is_hd() {
            return Ok(self.index);
        }

        let window = strategy.window().max(self.gap_limit + 1);
        let mut window_start = start;

        let found = loop {
            let addresses: Vec<ChainAddress> = (window_start..window_start + window)
                .map(|i| self.address_at(i))
                .collect::<WalletResult<_>>()?;

            let used = self.probe_usage(&addresses, strategy).await?;

            let mut gap = 0u32;
            let mut hit = None;
            for (offset, address) in addresses.iter().enumerate() {
                if used.contains(&address.hash) {
                    gap = 0;
                } else {
                    gap += 1;
                }
                if gap == self.gap_limit {
                    hit = Some(window_start + offset as u32 + 1 - self.gap_limit);
                    break;
                }
            }

            match hit {
                Some(index) => break index,
                None => window_start += window - self.gap_limit,
            }
        };

        tracing::info!(
            chain = %self.chain,
            branch = ?self.branch,
            strategy = strategy.name(),
            previous = self.index,
            index = found,
            "address index reset"
        );

        self.index = found;
        Ok(found)
    }

    async fn probe_usage(
        &self,
        addresses: &[ChainAddress],
        strategy: &ScanStrategy<'_>,
    ) -> WalletResult<HashSet<KeyHash>> {
        match strategy {
            ScanStrategy::IndexService { service, .. } => {
                let encoded: Vec<String> = addresses.iter().map(|a| a.encoded.clone()).collect();
                let membership = service.get_address_chain_membership(&encoded).await?;

                Ok(addresses
                    .iter()
                    .filter(|a| membership.get(&a.encoded).is_some_and(|chains| !chains.is_empty()))
                    .map(|a| a.hash)
                    .collect())
            }
            ScanStrategy::DirectNode {
                x, p, page_size, ..
            } => {
                let mut used = HashSet::new();
                for service in [*x, *p] {
                    let encoded: Vec<String> = addresses
                        .iter()
                        .map(|a| a.on_chain(service.chain(), &self.hrp).map(|a| a.encoded))
                        .collect::<WalletResult<_>>()?;
                    let utxos = fetch_all_utxos(service, &encoded, *page_size).await?;
                    used.extend(utxos.owners());
                }
                Ok(used)
            }
        }
    }
}
