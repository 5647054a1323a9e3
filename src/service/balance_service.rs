//! 余额聚合服务
//!
//! 从当前 UTXO 集合实时计算各资产余额；未知资产的元数据按需查询并缓存（不淘汰）

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::{
    domain::{
        chain_config::{ChainAlias, ChainRegistry},
        derivation::KeyHash,
        utxo::{AssetBalance, AssetDescription, NftGroup, UtxoSet},
    },
    error::WalletResult,
    service::chain_client::ChainService,
};

pub struct BalanceService {
    native_asset_id: String,
    chains: ChainRegistry,
    assets: RwLock<HashMap<String, AssetDescription>>,
}

impl BalanceService {
    pub fn new(native_asset_id: impl Into<String>) -> Self {
        Self {
            native_asset_id: native_asset_id.into(),
            chains: ChainRegistry::new(),
            assets: RwLock::new(HashMap::new()),
        }
    }

    pub fn native_asset_id(&self) -> &str {
        &self.native_asset_id
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    /// 原生资产按链使用固定精度
    pub fn native_description(&self, chain: ChainAlias) -> AssetDescription {
        AssetDescription {
            id: self.native_asset_id.clone(),
            name: "Avalanche".to_string(),
            symbol: "AVAX".to_string(),
            denomination: self.chains.denomination(chain),
        }
    }

    /// 资产元数据（缓存命中不访问网络）
    pub async fn describe(
        &self,
        service: &dyn ChainService,
        asset_id: &str,
    ) -> WalletResult<AssetDescription> {
        if asset_id == self.native_asset_id {
            return Ok(self.native_description(service.chain()));
        }

        if let Some(found) = self.assets.read().await.get(asset_id) {
            return Ok(found.clone());
        }

        let description = service.get_asset_description(asset_id).await?;
        tracing::debug!(
            asset_id,
            symbol = %description.symbol,
            denomination = description.denomination,
            "asset description cached"
        );

        self.assets
            .write()
            .await
            .insert(asset_id.to_string(), description.clone());
        Ok(description)
    }

    pub async fn cached_assets(&self) -> usize {
        self.assets.read().await.len()
    }

    /// 按资产聚合：unlocked / locked，P-Chain 额外给出 stakeable_locked
    pub async fn balances(
        &self,
        service: &dyn ChainService,
        utxos: &UtxoSet,
        owners: &HashSet<KeyHash>,
        now: u64,
    ) -> WalletResult<Vec<AssetBalance>> {
        let chain = service.chain();
        let mut result = Vec::new();

        for (asset_id, amount) in utxos.classified_totals(owners, now) {
            let asset = self.describe(service, &asset_id).await?;
            result.push(AssetBalance {
                asset,
                unlocked: amount.unlocked,
                locked: amount.locked,
                stakeable_locked: (chain == ChainAlias::P).then_some(amount.stakeable_locked),
            });
        }

        Ok(result)
    }

    pub fn nft_groups(&self, utxos: &UtxoSet, owners: &HashSet<KeyHash>) -> Vec<NftGroup> {
        utxos.nft_groups(owners)
    }
}
