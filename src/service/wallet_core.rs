//! 钱包核心
//!
//! 一个钱包身份 + 三个地址扫描器（X 外部、X 内部、P 平台）+ 三个 UTXO 存储（X/P/C）。
//! 所有可变状态在同一把异步锁后面：刷新持锁完成并应用索引更新之后，
//! 构建交易才能读取新的 UTXO 集合。

use std::{collections::HashSet, sync::Arc};

use ethers::types::{transaction::eip2718::TypedTransaction, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    config::Config,
    domain::{
        chain_config::{Branch, ChainAlias},
        derivation::{decode_address, evm_address, ChainAddress, KeyHash},
        transaction::{SignedTx, UnsignedTx},
        utxo::{AssetBalance, NftGroup},
    },
    error::{WalletError, WalletResult},
    infrastructure::event_bus::{EventBus, EventEnvelope, WalletEvent},
    service::{
        address_scanner::{AddressScanner, ScanStrategy},
        balance_service::BalanceService,
        chain_client::{
            BaseTxRequest, ChainService, ExportTxRequest, HardwareTransport, ImportTxRequest,
            IndexService, PushEvent, TransactionRecord,
        },
        signer::{HardwareSigner, KeyContext, MnemonicSigner, SignerBackend, SingletonSigner},
        transaction_monitor::{CancelToken, TransactionMonitor},
        utxo_store::UtxoStore,
    },
};

/// 钱包身份，每个钱包恰好一个
pub enum WalletIdentity {
    Mnemonic(Zeroizing<String>),
    Singleton(Zeroizing<Vec<u8>>),
    Hardware(Arc<dyn HardwareTransport>),
}

impl WalletIdentity {
    pub async fn into_signer(self, evm_chain_id: u64) -> WalletResult<SignerBackend> {
        Ok(match self {
            Self::Mnemonic(phrase) => {
                SignerBackend::Mnemonic(MnemonicSigner::new(&phrase, evm_chain_id)?)
            }
            Self::Singleton(key) => {
                SignerBackend::Singleton(SingletonSigner::new(&key, evm_chain_id)?)
            }
            Self::Hardware(transport) => {
                SignerBackend::Hardware(HardwareSigner::connect(transport, evm_chain_id).await?)
            }
        })
    }
}

/// 外部服务集合
#[derive(Clone)]
pub struct WalletServices {
    pub x: Arc<dyn ChainService>,
    pub p: Arc<dyn ChainService>,
    pub c: Arc<dyn ChainService>,
    /// 未配置时地址扫描回退到直连节点
    pub index: Option<Arc<dyn IndexService>>,
}

impl WalletServices {
    pub fn chain(&self, chain: ChainAlias) -> &Arc<dyn ChainService> {
        match chain {
            ChainAlias::X => &self.x,
            ChainAlias::P => &self.p,
            ChainAlias::C => &self.c,
        }
    }
}

/// 重扫后的各分支索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub external: u32,
    pub internal: u32,
    pub platform: u32,
}

struct WalletState {
    x_external: AddressScanner,
    x_internal: AddressScanner,
    platform: AddressScanner,
    x_store: UtxoStore,
    p_store: UtxoStore,
    c_store: UtxoStore,
}

impl WalletState {
    fn store(&self, chain: ChainAlias) -> &UtxoStore {
        match chain {
            ChainAlias::X => &self.x_store,
            ChainAlias::P => &self.p_store,
            ChainAlias::C => &self.c_store,
        }
    }

    fn store_mut(&mut self, chain: ChainAlias) -> &mut UtxoStore {
        match chain {
            ChainAlias::X => &mut self.x_store,
            ChainAlias::P => &mut self.p_store,
            ChainAlias::C => &mut self.c_store,
        }
    }

    fn scanners_mut(&mut self, chain: ChainAlias) -> Vec<&mut AddressScanner> {
        match chain {
            ChainAlias::X => vec![&mut self.x_external, &mut self.x_internal],
            ChainAlias::P => vec![&mut self.platform],
            ChainAlias::C => Vec::new(),
        }
    }

    fn key_context(&mut self) -> WalletResult<KeyContext> {
        Ok(KeyContext {
            external: self.x_external.keys()?,
            internal: self.x_internal.keys()?,
            platform: self.platform.keys()?,
        })
    }
}

pub struct WalletCore {
    id: Uuid,
    config: Config,
    signer: SignerBackend,
    services: WalletServices,
    balances: BalanceService,
    monitor: TransactionMonitor,
    events: EventBus,
    /// C-Chain 原子交易地址 (C-avax1...)
    c_address: ChainAddress,
    evm_address: String,
    state: Mutex<WalletState>,
}

impl WalletCore {
    pub async fn new(
        identity: WalletIdentity,
        services: WalletServices,
        config: Config,
        events: EventBus,
    ) -> WalletResult<Self> {
        let signer = identity.into_signer(config.network.evm_chain_id).await?;
        Self::with_signer(signer, services, config, events)
    }

    pub fn with_signer(
        signer: SignerBackend,
        services: WalletServices,
        config: Config,
        events: EventBus,
    ) -> WalletResult<Self> {
        let hrp = config.network.hrp.clone();
        let gap_limit = config.scan.gap_limit;
        let page_size = config.scan.utxo_page_size;
        let source = Arc::new(signer.key_source());

        let state = WalletState {
            x_external: AddressScanner::new(
                ChainAlias::X,
                Branch::External,
                &hrp,
                source.clone(),
                gap_limit,
            ),
            x_internal: AddressScanner::new(
                ChainAlias::X,
                Branch::Internal,
                &hrp,
                source.clone(),
                gap_limit,
            ),
            // P 与 X 外部分支同路径，仅前缀不同
            platform: AddressScanner::new(ChainAlias::P, Branch::External, &hrp, source, gap_limit),
            x_store: UtxoStore::new(services.x.clone(), page_size),
            p_store: UtxoStore::new(services.p.clone(), page_size),
            c_store: UtxoStore::new(services.c.clone(), page_size),
        };

        let evm_key = signer.evm_key();
        let c_address = evm_key.address(ChainAlias::C, &hrp)?;
        let evm_address = evm_address(&evm_key.public_key);

        let id = Uuid::new_v4();
        tracing::info!(
            wallet_id = %id,
            signer = signer.kind(),
            network = %config.network.name,
            "wallet created"
        );

        Ok(Self {
            id,
            balances: BalanceService::new(config.network.avax_asset_id.clone()),
            monitor: TransactionMonitor::new(&config.confirmation),
            config,
            signer,
            services,
            events,
            c_address,
            evm_address,
            state: Mutex::new(state),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn signer(&self) -> &SignerBackend {
        &self.signer
    }

    pub fn services(&self) -> &WalletServices {
        &self.services
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn native_asset_id(&self) -> &str {
        self.balances.native_asset_id()
    }

    pub fn evm_address(&self) -> &str {
        &self.evm_address
    }

    /// 各链默认交易费
    pub fn default_fee(&self, chain: ChainAlias) -> U256 {
        let fees = &self.config.fees;
        U256::from(match chain {
            ChainAlias::X => fees.x_tx_fee,
            ChainAlias::P => fees.p_tx_fee,
            ChainAlias::C => fees.c_atomic_fee,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 地址
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 当前收款地址；C-Chain 返回 EVM 地址
    pub async fn current_address(&self, chain: ChainAlias) -> WalletResult<String> {
        let mut state = self.state.lock().await;
        Ok(match chain {
            ChainAlias::X => state.x_external.active_address()?.encoded,
            ChainAlias::P => state.platform.active_address()?.encoded,
            ChainAlias::C => self.evm_address.clone(),
        })
    }

    /// X-Chain 当前找零地址
    pub async fn change_address(&self) -> WalletResult<String> {
        let mut state = self.state.lock().await;
        Ok(state.x_internal.active_address()?.encoded)
    }

    /// C-Chain 原子交易使用的 bech32 地址
    pub fn atomic_c_address(&self) -> &ChainAddress {
        &self.c_address
    }

    pub async fn scan_indices(&self) -> ScanSummary {
        let state = self.state.lock().await;
        ScanSummary {
            external: state.x_external.index(),
            internal: state.x_internal.index(),
            platform: state.platform.index(),
        }
    }

    /// 某条链上属于本钱包的全部地址
    pub async fn addresses(&self, chain: ChainAlias) -> WalletResult<Vec<ChainAddress>> {
        let mut state = self.state.lock().await;
        self.chain_addresses(&mut state, chain)
    }

    fn chain_addresses(
        &self,
        state: &mut WalletState,
        chain: ChainAlias,
    ) -> WalletResult<Vec<ChainAddress>> {
        match chain {
            ChainAlias::X => {
                let mut all = state.x_external.addresses()?;
                all.extend(state.x_internal.addresses()?);
                Ok(all)
            }
            ChainAlias::P => state.platform.addresses(),
            ChainAlias::C => Ok(vec![self.c_address.clone()]),
        }
    }

    fn owner_hashes(
        &self,
        state: &mut WalletState,
        chain: ChainAlias,
    ) -> WalletResult<HashSet<KeyHash>> {
        Ok(self
            .chain_addresses(state, chain)?
            .into_iter()
            .map(|a| a.hash)
            .collect())
    }

    /// 收款（导入目标）地址哈希
    fn receive_hash(&self, state: &mut WalletState, chain: ChainAlias) -> WalletResult<KeyHash> {
        Ok(match chain {
            ChainAlias::X => state.x_external.active_address()?.hash,
            ChainAlias::P => state.platform.active_address()?.hash,
            ChainAlias::C => self.c_address.hash,
        })
    }

    fn change_hash(&self, state: &mut WalletState, chain: ChainAlias) -> WalletResult<KeyHash> {
        Ok(match chain {
            ChainAlias::X => state.x_internal.active_address()?.hash,
            ChainAlias::P => state.platform.active_address()?.hash,
            ChainAlias::C => self.c_address.hash,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 刷新
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 刷新单链 UTXO，并推进活跃地址已收到资金的分支
    pub async fn refresh(&self, chain: ChainAlias) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state, chain).await
    }

    pub async fn refresh_all(&self) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        for chain in ChainAlias::ALL {
            self.refresh_locked(&mut state, chain).await?;
        }
        Ok(())
    }

    async fn refresh_locked(
        &self,
        state: &mut WalletState,
        chain: ChainAlias,
    ) -> WalletResult<()> {
        let addresses: Vec<String> = self
            .chain_addresses(state, chain)?
            .into_iter()
            .map(|a| a.encoded)
            .collect();

        let owners = state.store_mut(chain).refresh(&addresses).await?.owners();

        for scanner in state.scanners_mut(chain) {
            let previous = scanner.index();
            let active = scanner.active_address()?;
            // 单密钥身份的索引不会前进
            if owners.contains(&active.hash) && scanner.increment() != previous {
                let index = scanner.index();
                let next = scanner.active_address()?;
                self.events.publish(WalletEvent::AddressChanged {
                    wallet_id: self.id,
                    chain,
                    branch: scanner.branch(),
                    index,
                    address: next.encoded,
                });
            }
        }

        self.events.publish(WalletEvent::BalanceChanged {
            wallet_id: self.id,
            chain,
        });
        Ok(())
    }

    /// 推送事件入口：只刷新自身
    pub async fn handle_push(&self, event: &PushEvent) -> WalletResult<bool> {
        match event {
            PushEvent::NewBlock { chain } => {
                self.refresh(*chain).await?;
                Ok(true)
            }
            PushEvent::AddressActivity { address } => {
                let Ok((chain, _, hash)) = decode_address(address) else {
                    return Ok(false);
                };
                let mine = {
                    let mut state = self.state.lock().await;
                    self.owner_hashes(&mut state, chain)?.contains(&hash)
                };
                if mine {
                    self.refresh(chain).await?;
                }
                Ok(mine)
            }
        }
    }

    /// 重新扫描全部分支索引（开销大，只在显式请求时调用）
    pub async fn reset_index(&self, start: u32) -> WalletResult<ScanSummary> {
        let scan = &self.config.scan;
        let strategy = match &self.services.index {
            Some(index) => ScanStrategy::IndexService {
                service: index.as_ref(),
                window: scan.index_window,
            },
            None => ScanStrategy::DirectNode {
                x: self.services.x.as_ref(),
                p: self.services.p.as_ref(),
                window: scan.direct_window,
                page_size: scan.utxo_page_size,
            },
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let summary = ScanSummary {
            external: state.x_external.reset_index(start, &strategy).await?,
            internal: state.x_internal.reset_index(start, &strategy).await?,
            platform: state.platform.reset_index(start, &strategy).await?,
        };

        for scanner in [
            &mut state.x_external,
            &mut state.x_internal,
            &mut state.platform,
        ] {
            let address = scanner.active_address()?;
            self.events.publish(WalletEvent::AddressChanged {
                wallet_id: self.id,
                chain: scanner.chain(),
                branch: scanner.branch(),
                index: scanner.index(),
                address: address.encoded,
            });
        }

        Ok(summary)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 余额
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn balances(&self, chain: ChainAlias) -> WalletResult<Vec<AssetBalance>> {
        let service = self.services.chain(chain).clone();
        let now = service.current_time().await?;

        let mut state = self.state.lock().await;
        let owners = self.owner_hashes(&mut state, chain)?;
        self.balances
            .balances(service.as_ref(), state.store(chain).utxos(), &owners, now)
            .await
    }

    /// 原生资产余额（没有输出时为零）
    pub async fn native_balance(&self, chain: ChainAlias) -> WalletResult<AssetBalance> {
        let native = self.native_asset_id().to_string();
        let found = self
            .balances(chain)
            .await?
            .into_iter()
            .find(|b| b.asset.id == native);

        Ok(found.unwrap_or_else(|| AssetBalance {
            asset: self.balances.native_description(chain),
            unlocked: U256::zero(),
            locked: U256::zero(),
            stakeable_locked: (chain == ChainAlias::P).then(U256::zero),
        }))
    }

    pub async fn nft_groups(&self, chain: ChainAlias) -> WalletResult<Vec<NftGroup>> {
        let mut state = self.state.lock().await;
        let owners = self.owner_hashes(&mut state, chain)?;
        Ok(self
            .balances
            .nft_groups(state.store(chain).utxos(), &owners))
    }

    async fn ensure_unlocked(
        &self,
        state: &mut WalletState,
        chain: ChainAlias,
        asset_id: &str,
        required: U256,
    ) -> WalletResult<HashSet<KeyHash>> {
        let now = self.services.chain(chain).current_time().await?;
        let owners = self.owner_hashes(state, chain)?;
        let available = state
            .store(chain)
            .utxos()
            .classified_totals(&owners, now)
            .get(asset_id)
            .map(|a| a.unlocked)
            .unwrap_or_default();

        if available < required {
            return Err(WalletError::InsufficientFunds {
                asset: asset_id.to_string(),
                required: required.to_string(),
                available: available.to_string(),
            });
        }
        Ok(owners)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 交易
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 同链转账：构建 → 签名 → 提交 → 等待确认 → 刷新
    pub async fn send(
        &self,
        chain: ChainAlias,
        asset_id: Option<&str>,
        amount: U256,
        to: &str,
        cancel: Option<&CancelToken>,
    ) -> WalletResult<String> {
        if chain == ChainAlias::C {
            return Err(WalletError::unsupported(
                "C-Chain transfers go through send_evm_transaction",
            ));
        }
        if amount.is_zero() {
            return Err(WalletError::InvalidAmount("amount must be positive".into()));
        }

        let (to_chain, _, to_hash) = decode_address(to)?;
        if to_chain != chain {
            return Err(WalletError::InvalidAddress(format!(
                "{} is not a {}-chain address",
                to, chain
            )));
        }

        let native = self.native_asset_id().to_string();
        let asset_id = asset_id.unwrap_or(&native).to_string();
        let fee = self.default_fee(chain);

        let signed = {
            let mut state = self.state.lock().await;

            let mut required = amount;
            if asset_id == native {
                required += fee;
            } else {
                self.ensure_unlocked(&mut state, chain, &native, fee).await?;
            }
            let from = self
                .ensure_unlocked(&mut state, chain, &asset_id, required)
                .await?;

            let request = BaseTxRequest {
                utxos: state.store(chain).utxos().clone(),
                asset_id: asset_id.clone(),
                amount,
                to: to_hash,
                from: from.into_iter().collect(),
                change: self.change_hash(&mut state, chain)?,
                fee,
            };
            let unsigned = self.services.chain(chain).build_base_tx(request).await?;
            let ctx = state.key_context()?;
            self.signer.sign(&unsigned, &ctx).await?
        };

        let tx_id = self.submit_transaction(&signed).await?;
        self.await_confirmation(chain, &tx_id, cancel).await?;
        self.refresh(chain).await?;

        tracing::info!(wallet_id = %self.id, %chain, %tx_id, %amount, "transfer completed");
        Ok(tx_id)
    }

    /// C-Chain EVM 原生交易
    pub async fn send_evm_transaction(&self, tx: &TypedTransaction) -> WalletResult<String> {
        let raw = self.signer.sign_evm_native(tx).await?;
        let tx_id = self.services.c.submit_transaction(raw.as_ref()).await?;
        tracing::info!(wallet_id = %self.id, %tx_id, "evm transaction submitted");
        Ok(tx_id)
    }

    /// 构建导出交易；`amount` 为导出到目标链的原子金额（已含导入费），源链为 C 时按 18 位精度扣款
    pub async fn build_export_tx(
        &self,
        source: ChainAlias,
        destination: ChainAlias,
        amount: U256,
        fee: U256,
    ) -> WalletResult<UnsignedTx> {
        let native = self.native_asset_id().to_string();
        let debit = self.balances.chains().to_chain_units(source, amount + fee)?;
        let mut state = self.state.lock().await;

        let from = self
            .ensure_unlocked(&mut state, source, &native, debit)
            .await?;

        let request = ExportTxRequest {
            utxos: state.store(source).utxos().clone(),
            destination,
            amount,
            to: self.receive_hash(&mut state, destination)?,
            from: from.into_iter().collect(),
            change: self.change_hash(&mut state, source)?,
            fee,
            debit,
        };

        self.services.chain(source).build_export_tx(request).await
    }

    /// 构建导入交易；没有待导入的原子 UTXO 时返回 None
    pub async fn build_import_tx(
        &self,
        destination: ChainAlias,
        source: ChainAlias,
        fee: U256,
    ) -> WalletResult<Option<UnsignedTx>> {
        let mut state = self.state.lock().await;
        let addresses: Vec<String> = self
            .chain_addresses(&mut state, destination)?
            .into_iter()
            .map(|a| a.encoded)
            .collect();

        let service = self.services.chain(destination);
        let atomic = service.get_atomic_utxos(&addresses, source).await?;
        if atomic.is_empty() {
            return Ok(None);
        }

        let native = self.native_asset_id();
        let total = atomic
            .iter()
            .filter(|u| u.asset_id == native)
            .fold(U256::zero(), |acc, u| acc + u.amount);
        if total <= fee {
            return Err(WalletError::InsufficientFunds {
                asset: native.to_string(),
                required: fee.to_string(),
                available: total.to_string(),
            });
        }
        let credit = self
            .balances
            .chains()
            .to_chain_units(destination, total - fee)?;

        let request = ImportTxRequest {
            atomic_utxos: atomic.into_iter().collect(),
            source,
            to: self.receive_hash(&mut state, destination)?,
            fee,
            credit,
        };
        service.build_import_tx(request).await.map(Some)
    }

    pub async fn sign_transaction(&self, tx: &UnsignedTx) -> WalletResult<SignedTx> {
        let ctx = self.state.lock().await.key_context()?;
        self.signer.sign(tx, &ctx).await
    }

    pub async fn submit_transaction(&self, signed: &SignedTx) -> WalletResult<String> {
        let chain = signed.unsigned.chain;
        let tx_id = self
            .services
            .chain(chain)
            .submit_transaction(&signed.to_bytes())
            .await?;
        tracing::debug!(wallet_id = %self.id, %chain, %tx_id, kind = ?signed.unsigned.kind, "transaction submitted");
        Ok(tx_id)
    }

    pub async fn await_confirmation(
        &self,
        chain: ChainAlias,
        tx_id: &str,
        cancel: Option<&CancelToken>,
    ) -> WalletResult<()> {
        self.monitor
            .await_confirmation(self.services.chain(chain).as_ref(), tx_id, cancel)
            .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 历史
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 交易历史，按游标逐页拉取直到 `limit` 或无更多数据
    pub async fn transaction_history(
        &self,
        chain: ChainAlias,
        limit: usize,
    ) -> WalletResult<Vec<TransactionRecord>> {
        let index = self
            .services
            .index
            .as_ref()
            .ok_or_else(|| WalletError::unsupported("transaction history needs an index service"))?;

        let addresses: Vec<String> = {
            let mut state = self.state.lock().await;
            self.chain_addresses(&mut state, chain)?
                .into_iter()
                .map(|a| a.encoded)
                .collect()
        };

        let mut records = Vec::new();
        let mut cursor = None;
        while records.len() < limit {
            let page = index
                .get_transaction_history(&addresses, limit - records.len(), chain, cursor.take())
                .await?;
            if page.transactions.is_empty() {
                break;
            }
            records.extend(page.transactions);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        records.truncate(limit);
        Ok(records)
    }
}
