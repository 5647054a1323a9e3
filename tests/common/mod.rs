//! 测试辅助模块
//! 内存账本 + 模拟链服务 / 索引服务 / 硬件设备

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use avacore::{
    config::{
        Config, ConfirmationConfig, FeeConfig, LoggingConfig, NetworkConfig, ScanConfig,
    },
    domain::{
        chain_config::{Branch, ChainAlias, TxKind, AVAX_ACCOUNT_PATH, EVM_ACCOUNT_PATH},
        derivation::{
            decode_address, mnemonic_seed, AccountXpub, HdAccount, HdPath, KeyHash,
        },
        transaction::{SignedTx, TxInput, TxOutput, TxSignature, UnsignedTx},
        transaction_status::WireTxStatus,
        utxo::{AssetDescription, OutputKind, Utxo, UtxoSet},
    },
    error::{TransportError, WalletError, WalletResult},
    infrastructure::event_bus::EventBus,
    service::{
        chain_client::{
            AppVersion, BaseTxRequest, ChainService, DeviceSignResponse, ExportTxRequest,
            ExtendedPublicKey, HardwareTransport, HistoryPage, ImportTxRequest, IndexService,
            TransactionRecord, UtxoPage,
        },
        wallet_core::{WalletCore, WalletIdentity, WalletServices},
    },
};
use ethers::types::U256;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const FEE: u64 = 1_000_000;

/// 测试配置：不读环境变量，轮询间隔缩短
pub fn test_config() -> Config {
    Config {
        network: NetworkConfig::fuji(),
        scan: ScanConfig {
            gap_limit: 20,
            index_window: 64,
            direct_window: 30,
            utxo_page_size: 1024,
        },
        confirmation: ConfirmationConfig {
            poll_interval_ms: 5,
            max_attempts: 5,
        },
        fees: FeeConfig {
            x_tx_fee: FEE,
            p_tx_fee: FEE,
            c_atomic_fee: FEE,
        },
        logging: LoggingConfig {
            level: "debug".into(),
            format: "text".into(),
        },
    }
}

pub fn native_asset() -> String {
    NetworkConfig::fuji().avax_asset_id
}

pub fn hrp() -> String {
    NetworkConfig::fuji().hrp
}

/// 助记词在某分支/索引上的地址哈希
pub fn mnemonic_hash(branch: Branch, index: u32) -> KeyHash {
    let seed = mnemonic_seed(PHRASE).unwrap();
    HdAccount::from_seed(seed.as_ref(), AVAX_ACCOUNT_PATH)
        .unwrap()
        .derive(HdPath::new(branch, index))
        .unwrap()
        .hash
}

pub fn evm_hash() -> KeyHash {
    let seed = mnemonic_seed(PHRASE).unwrap();
    HdAccount::from_seed(seed.as_ref(), EVM_ACCOUNT_PATH)
        .unwrap()
        .derive(HdPath::new(Branch::External, 0))
        .unwrap()
        .hash
}

pub fn avax(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000u64)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 内存账本
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default)]
struct Effect {
    consumed: Vec<String>,
    atomic_consumed: Vec<String>,
    created: Vec<Utxo>,
    atomic_created: Vec<(ChainAlias, Utxo)>,
}

#[derive(Debug, Clone)]
struct AtomicEntry {
    source: ChainAlias,
    destination: ChainAlias,
    utxo: Utxo,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub chain: ChainAlias,
    pub kind: TxKind,
    pub tx_id: String,
    pub tx: UnsignedTx,
}

#[derive(Default)]
struct Ledger {
    utxos: HashMap<ChainAlias, Vec<Utxo>>,
    atomic: Vec<AtomicEntry>,
    pending: HashMap<Vec<u8>, (UnsignedTx, Effect)>,
    statuses: HashMap<String, VecDeque<WireTxStatus>>,
    scripts: HashMap<(ChainAlias, TxKind), Vec<WireTxStatus>>,
    submitted: Vec<Submission>,
    utxo_requests: Vec<(ChainAlias, usize, Option<String>)>,
    assets: HashMap<String, AssetDescription>,
    page_limit: Option<usize>,
    fail_submit: HashSet<(ChainAlias, TxKind)>,
    nonce: u64,
    now: u64,
}

/// 三条链共享的模拟网络
#[derive(Clone, Default)]
pub struct MockNetwork {
    ledger: Arc<Mutex<Ledger>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        let network = Self::default();
        network.ledger.lock().unwrap().now = 1_700_000_000;
        network
    }

    pub fn now(&self) -> u64 {
        self.ledger.lock().unwrap().now
    }

    pub fn add_utxo(&self, utxo: Utxo) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.utxos.entry(utxo.chain).or_default().push(utxo);
    }

    /// 给某地址哈希一笔原生资产
    pub fn fund(&self, chain: ChainAlias, owner: KeyHash, amount: U256) -> String {
        let id = {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.nonce += 1;
            format!("{}-fund-{:04}", chain, ledger.nonce)
        };
        self.add_utxo(Utxo {
            id: id.clone(),
            chain,
            asset_id: native_asset(),
            amount,
            owners: vec![owner],
            threshold: 1,
            locktime: 0,
            kind: OutputKind::Transferable,
        });
        id
    }

    pub fn add_asset(&self, description: AssetDescription) {
        self.ledger
            .lock()
            .unwrap()
            .assets
            .insert(description.id.clone(), description);
    }

    /// 每页最多返回多少条，用于测试分页
    pub fn set_page_limit(&self, limit: usize) {
        self.ledger.lock().unwrap().page_limit = Some(limit);
    }

    /// 指定某类交易提交后的状态序列
    pub fn script(&self, chain: ChainAlias, kind: TxKind, statuses: &[WireTxStatus]) {
        self.ledger
            .lock()
            .unwrap()
            .scripts
            .insert((chain, kind), statuses.to_vec());
    }

    pub fn clear_script(&self, chain: ChainAlias, kind: TxKind) {
        self.ledger.lock().unwrap().scripts.remove(&(chain, kind));
    }

    pub fn fail_submit(&self, chain: ChainAlias, kind: TxKind) {
        self.ledger.lock().unwrap().fail_submit.insert((chain, kind));
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.ledger.lock().unwrap().submitted.clone()
    }

    pub fn utxo_requests(&self, chain: ChainAlias) -> usize {
        self.ledger
            .lock()
            .unwrap()
            .utxo_requests
            .iter()
            .filter(|(c, _, _)| *c == chain)
            .count()
    }

    /// 某链上属于给定哈希的原生资产总额
    pub fn balance_of(&self, chain: ChainAlias, owners: &[KeyHash]) -> U256 {
        let native = native_asset();
        self.ledger
            .lock()
            .unwrap()
            .utxos
            .get(&chain)
            .map(|utxos| {
                utxos
                    .iter()
                    .filter(|u| u.asset_id == native && u.owners.iter().any(|o| owners.contains(o)))
                    .fold(U256::zero(), |acc, u| acc + u.amount)
            })
            .unwrap_or_default()
    }

    /// 目标链上尚未导入的原子金额
    pub fn pending_atomic(&self, destination: ChainAlias) -> U256 {
        self.ledger
            .lock()
            .unwrap()
            .atomic
            .iter()
            .filter(|e| e.destination == destination)
            .fold(U256::zero(), |acc, e| acc + e.utxo.amount)
    }

    pub fn chain(&self, chain: ChainAlias) -> Arc<MockChain> {
        Arc::new(MockChain {
            chain,
            network: self.clone(),
        })
    }

    pub fn services(&self, index: Option<Arc<MockIndex>>) -> WalletServices {
        WalletServices {
            x: self.chain(ChainAlias::X),
            p: self.chain(ChainAlias::P),
            c: self.chain(ChainAlias::C),
            index: index.map(|i| i as Arc<dyn IndexService>),
        }
    }
}

pub fn accepted(chain: ChainAlias) -> WireTxStatus {
    match chain {
        ChainAlias::P => WireTxStatus::new("Committed"),
        _ => WireTxStatus::new("Accepted"),
    }
}

fn is_success(chain: ChainAlias, status: &WireTxStatus) -> bool {
    status.status == accepted(chain).status
}

pub struct MockChain {
    chain: ChainAlias,
    network: MockNetwork,
}

impl MockChain {
    fn hashes(addresses: &[String]) -> HashSet<KeyHash> {
        addresses
            .iter()
            .filter_map(|a| decode_address(a).ok())
            .map(|(_, _, hash)| hash)
            .collect()
    }

    /// 选取足够的无锁原生资产输入
    fn select(
        &self,
        utxos: &UtxoSet,
        from: &[KeyHash],
        required: U256,
        now: u64,
    ) -> WalletResult<(Vec<TxInput>, U256)> {
        let native = native_asset();
        let mut inputs = Vec::new();
        let mut total = U256::zero();

        for utxo in utxos.iter() {
            if total >= required {
                break;
            }
            let spendable = utxo.asset_id == native
                && utxo.locktime <= now
                && matches!(utxo.kind, OutputKind::Transferable)
                && utxo.owners.iter().any(|o| from.contains(o));
            if spendable {
                total += utxo.amount;
                inputs.push(TxInput {
                    utxo_id: utxo.id.clone(),
                    asset_id: utxo.asset_id.clone(),
                    amount: utxo.amount,
                    owners: utxo.owners.clone(),
                });
            }
        }

        if total < required {
            return Err(WalletError::InsufficientFunds {
                asset: native,
                required: required.to_string(),
                available: total.to_string(),
            });
        }
        Ok((inputs, total))
    }

    fn output_utxo(&self, chain: ChainAlias, id: String, output: &TxOutput) -> Utxo {
        Utxo {
            id,
            chain,
            asset_id: output.asset_id.clone(),
            amount: output.amount,
            owners: output.owners.clone(),
            threshold: 1,
            locktime: output.locktime,
            kind: OutputKind::Transferable,
        }
    }

    fn register(
        &self,
        kind: TxKind,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        change_owner: Option<KeyHash>,
        counterparty_chain: Option<ChainAlias>,
        effect: Effect,
    ) -> UnsignedTx {
        let mut ledger = self.network.ledger.lock().unwrap();
        ledger.nonce += 1;

        let ids: Vec<&str> = inputs.iter().map(|i| i.utxo_id.as_str()).collect();
        let bytes = serde_json::to_vec(&(self.chain, kind, ledger.nonce, ids, &outputs)).unwrap();

        let tx = UnsignedTx {
            chain: self.chain,
            kind,
            bytes: bytes.clone(),
            inputs,
            outputs,
            change_owner,
            counterparty_chain,
        };
        ledger.pending.insert(bytes, (tx.clone(), effect));
        tx
    }

    fn next_output_id(&self, tag: &str, i: usize) -> String {
        let nonce = self.network.ledger.lock().unwrap().nonce + 1;
        format!("{}-{}-{:04}-{}", self.chain, tag, nonce, i)
    }
}

#[async_trait]
impl ChainService for MockChain {
    fn chain(&self) -> ChainAlias {
        self.chain
    }

    async fn get_utxos(
        &self,
        addresses: &[String],
        page: Option<String>,
        limit: usize,
    ) -> WalletResult<UtxoPage> {
        let owners = Self::hashes(addresses);
        let mut ledger = self.network.ledger.lock().unwrap();
        ledger
            .utxo_requests
            .push((self.chain, addresses.len(), page.clone()));

        let mut matching: Vec<Utxo> = ledger
            .utxos
            .get(&self.chain)
            .map(|utxos| {
                utxos
                    .iter()
                    .filter(|u| u.owners.iter().any(|o| owners.contains(o)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by(|a, b| a.id.cmp(&b.id));

        let limit = ledger.page_limit.map_or(limit, |l| l.min(limit));
        let offset: usize = page.as_deref().and_then(|p| p.parse().ok()).unwrap_or(0);
        let utxos: Vec<Utxo> = matching.iter().skip(offset).take(limit).cloned().collect();
        let end = offset + utxos.len();

        Ok(UtxoPage {
            count: utxos.len(),
            next_page: (end < matching.len()).then(|| end.to_string()),
            utxos,
        })
    }

    async fn get_atomic_utxos(
        &self,
        addresses: &[String],
        source: ChainAlias,
    ) -> WalletResult<Vec<Utxo>> {
        let owners = Self::hashes(addresses);
        let ledger = self.network.ledger.lock().unwrap();
        Ok(ledger
            .atomic
            .iter()
            .filter(|e| e.destination == self.chain && e.source == source)
            .filter(|e| e.utxo.owners.iter().any(|o| owners.contains(o)))
            .map(|e| e.utxo.clone())
            .collect())
    }

    async fn submit_transaction(&self, signed_tx: &[u8]) -> WalletResult<String> {
        let decoded = SignedTx::from_bytes(signed_tx)?;
        let mut ledger = self.network.ledger.lock().unwrap();

        let (tx, effect) = ledger
            .pending
            .get(&decoded.unsigned_bytes)
            .cloned()
            .ok_or_else(|| WalletError::network("mock", "unknown transaction"))?;

        if ledger.fail_submit.contains(&(self.chain, tx.kind)) {
            return Err(WalletError::network("mock", "node unavailable"));
        }

        // 每个输入至少一个签名，且每个签名都恢复到该输入的所有者
        if decoded.credentials.len() != tx.inputs.len() {
            return Err(WalletError::network("mock", "credential count mismatch"));
        }
        let digest = tx.digest();
        for (input, credential) in tx.inputs.iter().zip(&decoded.credentials) {
            if credential.signatures.is_empty() {
                return Err(WalletError::network("mock", "missing signature"));
            }
            for signature in &credential.signatures {
                let signer = KeyHash::from_public_key(&signature.recover(&digest)?);
                if !input.owners.contains(&signer) {
                    return Err(WalletError::network("mock", "signature from non-owner"));
                }
            }
        }
        ledger.pending.remove(&decoded.unsigned_bytes);

        ledger.nonce += 1;
        let tx_id = format!("{}-tx-{:04}", self.chain, ledger.nonce);
        let script = ledger
            .scripts
            .get(&(self.chain, tx.kind))
            .cloned()
            .unwrap_or_else(|| vec![accepted(self.chain)]);

        if script.last().is_some_and(|s| is_success(self.chain, s)) {
            let chain = self.chain;
            if let Some(utxos) = ledger.utxos.get_mut(&chain) {
                utxos.retain(|u| !effect.consumed.contains(&u.id));
            }
            ledger
                .atomic
                .retain(|e| !effect.atomic_consumed.contains(&e.utxo.id));
            for utxo in effect.created {
                ledger.utxos.entry(chain).or_default().push(utxo);
            }
            for (destination, utxo) in effect.atomic_created {
                ledger.atomic.push(AtomicEntry {
                    source: chain,
                    destination,
                    utxo,
                });
            }
        }

        ledger.statuses.insert(tx_id.clone(), script.into());
        ledger.submitted.push(Submission {
            chain: self.chain,
            kind: tx.kind,
            tx_id: tx_id.clone(),
            tx,
        });
        Ok(tx_id)
    }

    async fn get_transaction_status(&self, tx_id: &str) -> WalletResult<WireTxStatus> {
        let mut ledger = self.network.ledger.lock().unwrap();
        let queue = ledger
            .statuses
            .get_mut(tx_id)
            .ok_or_else(|| WalletError::network("mock", format!("unknown tx {}", tx_id)))?;
        if queue.len() > 1 {
            queue
                .pop_front()
                .ok_or_else(|| WalletError::network("mock", "empty status script"))
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| WalletError::network("mock", "empty status script"))
        }
    }

    async fn get_asset_description(&self, asset_id: &str) -> WalletResult<AssetDescription> {
        self.network
            .ledger
            .lock()
            .unwrap()
            .assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| WalletError::network("mock", format!("unknown asset {}", asset_id)))
    }

    async fn build_base_tx(&self, request: BaseTxRequest) -> WalletResult<UnsignedTx> {
        if request.asset_id != native_asset() {
            return Err(WalletError::unsupported("mock only moves the native asset"));
        }
        let now = self.network.now();
        let (inputs, total) =
            self.select(&request.utxos, &request.from, request.amount + request.fee, now)?;

        let mut outputs = vec![TxOutput {
            asset_id: request.asset_id.clone(),
            amount: request.amount,
            owners: vec![request.to],
            locktime: 0,
        }];
        let change = total - request.amount - request.fee;
        if !change.is_zero() {
            outputs.push(TxOutput {
                asset_id: request.asset_id.clone(),
                amount: change,
                owners: vec![request.change],
                locktime: 0,
            });
        }

        let effect = Effect {
            consumed: inputs.iter().map(|i| i.utxo_id.clone()).collect(),
            created: outputs
                .iter()
                .enumerate()
                .map(|(i, o)| self.output_utxo(self.chain, self.next_output_id("base", i), o))
                .collect(),
            ..Default::default()
        };

        Ok(self.register(TxKind::Base, inputs, outputs, Some(request.change), None, effect))
    }

    async fn build_export_tx(&self, request: ExportTxRequest) -> WalletResult<UnsignedTx> {
        let now = self.network.now();
        let (inputs, total) = self.select(&request.utxos, &request.from, request.debit, now)?;

        let exported = TxOutput {
            asset_id: native_asset(),
            amount: request.amount,
            owners: vec![request.to],
            locktime: 0,
        };
        let mut outputs = vec![exported.clone()];
        let mut created = Vec::new();

        let change = total - request.debit;
        if !change.is_zero() {
            let output = TxOutput {
                asset_id: native_asset(),
                amount: change,
                owners: vec![request.change],
                locktime: 0,
            };
            created.push(self.output_utxo(self.chain, self.next_output_id("change", 0), &output));
            outputs.push(output);
        }

        let atomic = self.output_utxo(
            request.destination,
            self.next_output_id("atomic", 0),
            &exported,
        );
        let effect = Effect {
            consumed: inputs.iter().map(|i| i.utxo_id.clone()).collect(),
            created,
            atomic_created: vec![(request.destination, atomic)],
            ..Default::default()
        };

        Ok(self.register(
            TxKind::Export,
            inputs,
            outputs,
            Some(request.change),
            Some(request.destination),
            effect,
        ))
    }

    async fn build_import_tx(&self, request: ImportTxRequest) -> WalletResult<UnsignedTx> {
        let inputs: Vec<TxInput> = request
            .atomic_utxos
            .iter()
            .map(|u| TxInput {
                utxo_id: u.id.clone(),
                asset_id: u.asset_id.clone(),
                amount: u.amount,
                owners: u.owners.clone(),
            })
            .collect();
        let output = TxOutput {
            asset_id: native_asset(),
            amount: request.credit,
            owners: vec![request.to],
            locktime: 0,
        };
        let effect = Effect {
            atomic_consumed: inputs.iter().map(|i| i.utxo_id.clone()).collect(),
            created: vec![self.output_utxo(self.chain, self.next_output_id("import", 0), &output)],
            ..Default::default()
        };

        Ok(self.register(
            TxKind::Import,
            inputs,
            vec![output],
            None,
            Some(request.source),
            effect,
        ))
    }

    async fn current_time(&self) -> WalletResult<u64> {
        Ok(self.network.now())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 索引服务
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MockIndex {
    used: Mutex<HashMap<KeyHash, HashSet<ChainAlias>>>,
    history: Mutex<Vec<TransactionRecord>>,
    page_size: usize,
    calls: Mutex<usize>,
}

impl MockIndex {
    pub fn new(page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            page_size: page_size.max(1),
            ..Default::default()
        })
    }

    pub fn mark_used(&self, hash: KeyHash, chain: ChainAlias) {
        self.used
            .lock()
            .unwrap()
            .entry(hash)
            .or_default()
            .insert(chain);
    }

    pub fn push_history(&self, record: TransactionRecord) {
        self.history.lock().unwrap().push(record);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl IndexService for MockIndex {
    async fn get_address_chain_membership(
        &self,
        addresses: &[String],
    ) -> WalletResult<HashMap<String, HashSet<ChainAlias>>> {
        *self.calls.lock().unwrap() += 1;
        let used = self.used.lock().unwrap();
        Ok(addresses
            .iter()
            .filter_map(|a| {
                let (_, _, hash) = decode_address(a).ok()?;
                used.get(&hash).map(|chains| (a.clone(), chains.clone()))
            })
            .collect())
    }

    async fn get_transaction_history(
        &self,
        _addresses: &[String],
        limit: usize,
        chain: ChainAlias,
        cursor: Option<String>,
    ) -> WalletResult<HistoryPage> {
        let history = self.history.lock().unwrap();
        let matching: Vec<&TransactionRecord> =
            history.iter().filter(|r| r.chain == chain).collect();

        let offset: usize = cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
        let take = limit.min(self.page_size);
        let transactions: Vec<TransactionRecord> = matching
            .iter()
            .skip(offset)
            .take(take)
            .map(|r| (*r).clone())
            .collect();
        let end = offset + transactions.len();

        Ok(HistoryPage {
            next_cursor: (end < matching.len()).then(|| end.to_string()),
            transactions,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 硬件设备
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Structured {
        suffixes: Vec<String>,
        change_path: Option<String>,
    },
    Hash {
        suffixes: Vec<String>,
    },
}

pub struct MockDevice {
    avax: HdAccount,
    evm: HdAccount,
    avax_xpub: AccountXpub,
    evm_xpub: AccountXpub,
    version: Option<AppVersion>,
    /// 签一个不同的摘要
    tamper: bool,
    calls: Mutex<Vec<DeviceCall>>,
}

impl MockDevice {
    /// `version` 为 None 时模拟不认识版本查询的旧固件
    pub fn new(version: Option<AppVersion>) -> Arc<Self> {
        Self::build(version, false)
    }

    pub fn tampering(version: Option<AppVersion>) -> Arc<Self> {
        Self::build(version, true)
    }

    fn build(version: Option<AppVersion>, tamper: bool) -> Arc<Self> {
        let seed = mnemonic_seed(PHRASE).unwrap();
        Arc::new(Self {
            avax: HdAccount::from_seed(seed.as_ref(), AVAX_ACCOUNT_PATH).unwrap(),
            evm: HdAccount::from_seed(seed.as_ref(), EVM_ACCOUNT_PATH).unwrap(),
            avax_xpub: AccountXpub::from_seed(seed.as_ref(), AVAX_ACCOUNT_PATH).unwrap(),
            evm_xpub: AccountXpub::from_seed(seed.as_ref(), EVM_ACCOUNT_PATH).unwrap(),
            version,
            tamper,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn account(&self, account_path: &str) -> Result<&HdAccount, TransportError> {
        match account_path {
            AVAX_ACCOUNT_PATH => Ok(&self.avax),
            EVM_ACCOUNT_PATH => Ok(&self.evm),
            other => Err(TransportError::Rejected(format!("unknown path {}", other))),
        }
    }

    fn sign_paths(
        &self,
        account_path: &str,
        suffixes: &[String],
        digest: [u8; 32],
    ) -> Result<DeviceSignResponse, TransportError> {
        let mut hash = digest;
        if self.tamper {
            hash[0] ^= 0xff;
        }

        let account = self.account(account_path)?;
        let mut signatures = BTreeMap::new();
        for suffix in suffixes {
            let (branch, index) = suffix
                .split_once('/')
                .ok_or_else(|| TransportError::Rejected(format!("bad suffix {}", suffix)))?;
            let branch = match branch {
                "0" => Branch::External,
                "1" => Branch::Internal,
                other => return Err(TransportError::Rejected(format!("bad branch {}", other))),
            };
            let index: u32 = index
                .parse()
                .map_err(|_| TransportError::Rejected(format!("bad index {}", index)))?;

            let key = account
                .derive(HdPath::new(branch, index))
                .map_err(|e| TransportError::Device(e.to_string()))?;
            let signing_key = key
                .signing_key()
                .ok_or_else(|| TransportError::Device("no private key".into()))?;
            let signature = TxSignature::sign(signing_key, &hash)
                .map_err(|e| TransportError::Device(e.to_string()))?;
            signatures.insert(suffix.clone(), signature);
        }

        Ok(DeviceSignResponse { hash, signatures })
    }
}

#[async_trait]
impl HardwareTransport for MockDevice {
    async fn app_configuration(&self) -> Result<AppVersion, TransportError> {
        self.version.ok_or(TransportError::UnsupportedInstruction)
    }

    async fn get_extended_public_key(
        &self,
        path: &str,
    ) -> Result<ExtendedPublicKey, TransportError> {
        let xpub = match path {
            AVAX_ACCOUNT_PATH => &self.avax_xpub,
            EVM_ACCOUNT_PATH => &self.evm_xpub,
            other => return Err(TransportError::Rejected(format!("unknown path {}", other))),
        };
        Ok(ExtendedPublicKey {
            public_key: xpub.public_key().to_sec1_bytes().to_vec(),
            chain_code: xpub.chain_code(),
        })
    }

    async fn sign_structured(
        &self,
        account_path: &str,
        path_suffixes: &[String],
        tx_bytes: &[u8],
        change_path: Option<&str>,
    ) -> Result<DeviceSignResponse, TransportError> {
        self.calls.lock().unwrap().push(DeviceCall::Structured {
            suffixes: path_suffixes.to_vec(),
            change_path: change_path.map(str::to_string),
        });
        self.sign_paths(account_path, path_suffixes, Sha256::digest(tx_bytes).into())
    }

    async fn sign_hash(
        &self,
        account_path: &str,
        path_suffixes: &[String],
        digest: &[u8; 32],
    ) -> Result<DeviceSignResponse, TransportError> {
        self.calls.lock().unwrap().push(DeviceCall::Hash {
            suffixes: path_suffixes.to_vec(),
        });
        self.sign_paths(account_path, path_suffixes, *digest)
    }

    async fn sign_evm_transaction(
        &self,
        _path: &str,
        rlp: &[u8],
    ) -> Result<ethers::types::Signature, TransportError> {
        let key = self
            .evm
            .derive(HdPath::new(Branch::External, 0))
            .map_err(|e| TransportError::Device(e.to_string()))?;
        let signing_key = key
            .signing_key()
            .ok_or_else(|| TransportError::Device("no private key".into()))?;
        let wallet = ethers::signers::LocalWallet::from(signing_key.clone());
        wallet
            .sign_hash(ethers::utils::keccak256(rlp).into())
            .map_err(|e| TransportError::Device(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 钱包构造
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn mnemonic_wallet(network: &MockNetwork, index: Option<Arc<MockIndex>>) -> Arc<WalletCore> {
    wallet_with(
        WalletIdentity::Mnemonic(Zeroizing::new(PHRASE.to_string())),
        network,
        index,
    )
    .await
}

pub async fn wallet_with(
    identity: WalletIdentity,
    network: &MockNetwork,
    index: Option<Arc<MockIndex>>,
) -> Arc<WalletCore> {
    Arc::new(
        WalletCore::new(identity, network.services(index), test_config(), EventBus::new())
            .await
            .unwrap(),
    )
}
