//! UTXO 领域模型
//!
//! 每条链一个 UTXO 集合，刷新时整体替换；余额由集合实时计算，不落盘

use std::collections::{BTreeMap, HashSet};

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::domain::{chain_config::ChainAlias, derivation::KeyHash};

/// 输出类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    /// 普通可转账输出
    Transferable,
    /// P-Chain 可质押锁定输出
    StakeableLock { stakeable_locktime: u64 },
    /// NFT 转移输出
    NftTransfer { group_id: u32, payload: Vec<u8> },
}

/// 锁定分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockClass {
    Unlocked,
    Locked,
    /// 已投入验证/委托的资金
    StakeableLocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub id: String,
    pub chain: ChainAlias,
    pub asset_id: String,
    pub amount: U256,
    pub owners: Vec<KeyHash>,
    pub threshold: u32,
    pub locktime: u64,
    pub kind: OutputKind,
}

impl Utxo {
    /// 按网络时间分类
    pub fn classify(&self, now: u64) -> LockClass {
        if let OutputKind::StakeableLock { stakeable_locktime } = self.kind {
            if self.chain == ChainAlias::P && stakeable_locktime > now {
                return LockClass::StakeableLocked;
            }
        }
        if self.locktime <= now {
            LockClass::Unlocked
        } else {
            LockClass::Locked
        }
    }

    pub fn is_owned_by(&self, owners: &HashSet<KeyHash>) -> bool {
        self.owners.iter().any(|o| owners.contains(o))
    }

    pub fn is_nft(&self) -> bool {
        matches!(self.kind, OutputKind::NftTransfer { .. })
    }
}

/// 资产元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescription {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub denomination: u8,
}

/// 单个资产的余额
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: AssetDescription,
    pub unlocked: U256,
    pub locked: U256,
    /// 仅 P-Chain 有值
    pub stakeable_locked: Option<U256>,
}

impl AssetBalance {
    pub fn total(&self) -> U256 {
        self.unlocked + self.locked + self.stakeable_locked.unwrap_or_default()
    }
}

/// 按分类累加的原始金额
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifiedAmount {
    pub unlocked: U256,
    pub locked: U256,
    pub stakeable_locked: U256,
}

impl ClassifiedAmount {
    fn add(&mut self, class: LockClass, amount: U256) {
        match class {
            LockClass::Unlocked => self.unlocked += amount,
            LockClass::Locked => self.locked += amount,
            LockClass::StakeableLocked => self.stakeable_locked += amount,
        }
    }

    pub fn total(&self) -> U256 {
        self.unlocked + self.locked + self.stakeable_locked
    }
}

/// NFT 附带载荷（首字节为类型标记）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NftPayload {
    Binary(Vec<u8>),
    Utf8(String),
    Json(String),
    Url(String),
    Raw(Vec<u8>),
}

impl NftPayload {
    const TAG_BINARY: u8 = 0;
    const TAG_UTF8: u8 = 1;
    const TAG_JSON: u8 = 30;
    const TAG_URL: u8 = 33;

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (tag, body) = bytes.split_first()?;
        let text = || String::from_utf8(body.to_vec()).ok();

        let payload = match *tag {
            Self::TAG_BINARY => Self::Binary(body.to_vec()),
            Self::TAG_UTF8 => text().map(Self::Utf8).unwrap_or_else(|| Self::Raw(bytes.to_vec())),
            Self::TAG_JSON => text()
                .filter(|s| serde_json::from_str::<serde_json::Value>(s).is_ok())
                .map(Self::Json)
                .unwrap_or_else(|| Self::Raw(bytes.to_vec())),
            Self::TAG_URL => text().map(Self::Url).unwrap_or_else(|| Self::Raw(bytes.to_vec())),
            _ => Self::Raw(bytes.to_vec()),
        };
        Some(payload)
    }
}

/// 同一 NFT 组的聚合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftGroup {
    pub asset_id: String,
    pub group_id: u32,
    pub count: usize,
    pub payload: Option<NftPayload>,
}

/// 单链 UTXO 集合，按 id 去重
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    utxos: BTreeMap<String, Utxo>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.id.clone(), utxo);
    }

    /// 并集（同 id 以后到者为准）
    pub fn merge(&mut self, other: UtxoSet) {
        self.utxos.extend(other.utxos);
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Utxo> {
        self.utxos.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.values()
    }

    pub fn contains_owner(&self, owner: &KeyHash) -> bool {
        self.iter().any(|u| u.owners.contains(owner))
    }

    pub fn owners(&self) -> HashSet<KeyHash> {
        self.iter().flat_map(|u| u.owners.iter().copied()).collect()
    }

    /// 按资产累加非 NFT 输出
    pub fn classified_totals(
        &self,
        owners: &HashSet<KeyHash>,
        now: u64,
    ) -> BTreeMap<String, ClassifiedAmount> {
        let mut totals: BTreeMap<String, ClassifiedAmount> = BTreeMap::new();
        for utxo in self.iter().filter(|u| !u.is_nft() && u.is_owned_by(owners)) {
            totals
                .entry(utxo.asset_id.clone())
                .or_default()
                .add(utxo.classify(now), utxo.amount);
        }
        totals
    }

    /// 某资产全部匹配输出的金额之和
    pub fn total_for(&self, asset_id: &str, owners: &HashSet<KeyHash>) -> U256 {
        self.iter()
            .filter(|u| !u.is_nft() && u.asset_id == asset_id && u.is_owned_by(owners))
            .fold(U256::zero(), |acc, u| acc + u.amount)
    }

    pub fn nft_groups(&self, owners: &HashSet<KeyHash>) -> Vec<NftGroup> {
        let mut groups: BTreeMap<(String, u32), NftGroup> = BTreeMap::new();
        for utxo in self.iter().filter(|u| u.is_owned_by(owners)) {
            if let OutputKind::NftTransfer { group_id, payload } = &utxo.kind {
                let group = groups
                    .entry((utxo.asset_id.clone(), *group_id))
                    .or_insert_with(|| NftGroup {
                        asset_id: utxo.asset_id.clone(),
                        group_id: *group_id,
                        count: 0,
                        payload: None,
                    });
                group.count += 1;
                if group.payload.is_none() {
                    group.payload = NftPayload::decode(payload);
                }
            }
        }
        groups.into_values().collect()
    }
}

impl FromIterator<Utxo> for UtxoSet {
    fn from_iter<I: IntoIterator<Item = Utxo>>(iter: I) -> Self {
        let mut set = Self::new();
        for utxo in iter {
            set.insert(utxo);
        }
        set
    }
}
