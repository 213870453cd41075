use std::collections::BTreeMap;

use crate::gas::{self, Gas, SharedGasMeter};
use crate::storage::multi::CacheMultiStore;
use crate::storage::{SharedStore, StoreKey};
use crate::types::BlockHeader;

/// Which pipeline a transaction is running through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Check,
    Deliver,
    Simulate,
}

/// The immutable bundle handed to ante and message handlers.
///
/// Contexts are updated functionally: every `with_*` returns a new value
/// with one field replaced, and mutating the returned context never affects
/// prior holders. The embedded multi-store and gas meters are shared by
/// handle rather than deep-copied, so a derived context still charges the
/// same meters and observes the same buffered writes.
#[derive(Clone)]
pub struct Context {
    ms: CacheMultiStore,
    header: BlockHeader,
    chain_id: String,
    mode: Mode,
    tx_bytes: Vec<u8>,
    gas_meter: SharedGasMeter,
    block_gas_meter: SharedGasMeter,
    min_gas_prices: BTreeMap<String, u64>,
}

impl Context {
    pub fn new(ms: CacheMultiStore, header: BlockHeader, mode: Mode) -> Self {
        let chain_id = header.chain_id.clone();
        Self {
            ms,
            header,
            chain_id,
            mode,
            tx_bytes: Vec::new(),
            gas_meter: gas::infinite_meter(),
            block_gas_meter: gas::infinite_meter(),
            min_gas_prices: BTreeMap::new(),
        }
    }

    /// Store access rooted at this context's cache multi-store.
    pub fn store(&self, key: &StoreKey) -> SharedStore {
        self.ms.store(key)
    }

    pub fn multi_store(&self) -> &CacheMultiStore {
        &self.ms
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn tx_bytes(&self) -> &[u8] {
        &self.tx_bytes
    }

    pub fn gas_meter(&self) -> &SharedGasMeter {
        &self.gas_meter
    }

    pub fn block_gas_meter(&self) -> &SharedGasMeter {
        &self.block_gas_meter
    }

    pub fn min_gas_prices(&self) -> &BTreeMap<String, u64> {
        &self.min_gas_prices
    }

    /// Charges the per-tx meter, aborting the transaction via unwind on
    /// exhaustion.
    pub fn charge_gas(&self, amount: Gas, descriptor: &str) {
        gas::charge(&self.gas_meter, amount, descriptor);
    }

    pub fn with_multi_store(&self, ms: CacheMultiStore) -> Self {
        let mut ctx = self.clone();
        ctx.ms = ms;
        ctx
    }

    pub fn with_header(&self, header: BlockHeader) -> Self {
        let mut ctx = self.clone();
        ctx.header = header;
        ctx
    }

    pub fn with_chain_id(&self, chain_id: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.chain_id = chain_id.into();
        ctx
    }

    pub fn with_mode(&self, mode: Mode) -> Self {
        let mut ctx = self.clone();
        ctx.mode = mode;
        ctx
    }

    pub fn with_tx_bytes(&self, tx_bytes: Vec<u8>) -> Self {
        let mut ctx = self.clone();
        ctx.tx_bytes = tx_bytes;
        ctx
    }

    pub fn with_gas_meter(&self, meter: SharedGasMeter) -> Self {
        let mut ctx = self.clone();
        ctx.gas_meter = meter;
        ctx
    }

    pub fn with_block_gas_meter(&self, meter: SharedGasMeter) -> Self {
        let mut ctx = self.clone();
        ctx.block_gas_meter = meter;
        ctx
    }

    pub fn with_min_gas_prices(&self, prices: BTreeMap<String, u64>) -> Self {
        let mut ctx = self.clone();
        ctx.min_gas_prices = prices;
        ctx
    }
}
