//! The application core: the lifecycle state machine and the transaction
//! execution pipeline.
//!
//! STATE LAYERING
//! ==============
//! The commit multi-store holds the authoritative state at the last
//! committed version. Three execution sandboxes are layered over it with
//! cache multi-stores:
//!
//! * `check_state` backs CheckTx (and, wrapped once more, Simulate). It is
//!   reset over the freshly committed view on every Commit.
//! * `deliver_state` backs DeliverTx. It is created by InitChain or by the
//!   first BeginBlock after a Commit, and cleared by Commit — the lazy reset
//!   keeps genesis writes alive until the first block commits them.
//! * Every transaction gets one more cache layer over its mode state, so
//!   ante-handler and message-handler writes are flushed into the mode
//!   state only when the whole transaction succeeds, and are discarded
//!   together when any part of it fails. Simulate always discards.
//!
//! TRANSACTION PIPELINE
//! ====================
//! decode -> validate_basic + route existence -> per-tx sandbox -> ante
//! handler (installs the per-tx gas meter) -> message handlers in order ->
//! flush-on-success -> block gas accounting (deliver only).
//!
//! Gas exhaustion unwinds from wherever a handler was and is caught right
//! here at the pipeline boundary, never above it. Once the block gas meter
//! is past its limit, every later deliver in the block fails out-of-gas.
//!
//! CONFIGURATION
//! =============
//! All options live on [`AppBuilder`]. Loading a version consumes the
//! builder and returns the sealed [`App`], so configuration after sealing is
//! unrepresentable rather than a runtime error. Structural misuse (mounting
//! twice, duplicate routes, malformed block gas, deliver outside a block)
//! panics: the process cannot be allowed to keep driving consensus state.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::codec;
use crate::error::{CResult, Error};
use crate::gas::{self, OutOfGasAbort, SharedGasMeter};
use crate::router::{Handler, Router};
use crate::storage::engine::CommitEngine;
use crate::storage::memory::{MemDb, Memory};
use crate::storage::multi::{CacheMultiStore, CommitMultiStore};
use crate::storage::{CommitId, Pruning, StoreKey};
use crate::types::context::{Context, Mode};
use crate::types::tx::{Tx, TxDecoder, TxResult};
use crate::types::{
    BlockHeader, BlockParams, RequestBeginBlock, RequestEndBlock, RequestInitChain, RequestQuery,
    RequestSetOption, ResponseCommit, ResponseEndBlock, ResponseInfo, ResponseQuery,
    ResponseSetOption,
};

/// Runs once per transaction before any message handler. Verifies whatever
/// the application wants verified (signatures, fees, nonces), installs the
/// per-tx gas meter through a functional context update, and may abort the
/// transaction by returning an error.
pub type AnteHandler = Box<dyn Fn(&Context, &dyn Tx, bool) -> (Context, CResult<()>) + Send>;

pub type InitChainer = Box<dyn Fn(&Context, &RequestInitChain) -> CResult<()> + Send>;
pub type BeginBlocker = Box<dyn Fn(&Context, &RequestBeginBlock) -> CResult<()> + Send>;
pub type EndBlocker = Box<dyn Fn(&Context, &RequestEndBlock) -> CResult<ResponseEndBlock> + Send>;

/// One execution sandbox: a cache multi-store over the committed view plus
/// the context rooted at it. The context's multi-store shares the children,
/// so flushing `ms` flushes what handlers wrote.
struct ExecState {
    ms: CacheMultiStore,
    ctx: Context,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Loaded,
    Initialized,
    InBlock,
    BetweenBlocks,
    Committed,
}

/// Collects configuration for an [`App`] and is consumed by loading.
pub struct AppBuilder {
    name: String,
    app_version: String,
    db: MemDb,
    pruning: Pruning,
    min_gas_prices: BTreeMap<String, u64>,
    router: Router,
    tx_decoder: Option<TxDecoder>,
    ante_handler: Option<AnteHandler>,
    init_chainer: Option<InitChainer>,
    begin_blocker: Option<BeginBlocker>,
    end_blocker: Option<EndBlocker>,
    cms: CommitMultiStore,
}

impl AppBuilder {
    pub fn new(name: impl Into<String>, db: MemDb) -> Self {
        let name = name.into();
        if name.is_empty() {
            panic!("application name must not be empty");
        }
        Self {
            name,
            app_version: String::new(),
            cms: CommitMultiStore::new(db.clone()),
            db,
            pruning: Pruning::Nothing,
            min_gas_prices: BTreeMap::new(),
            router: Router::new(),
            tx_decoder: None,
            ante_handler: None,
            init_chainer: None,
            begin_blocker: None,
            end_blocker: None,
        }
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    pub fn with_pruning(mut self, pruning: Pruning) -> Self {
        self.pruning = pruning;
        self
    }

    /// Admission floor for CheckTx, threaded to every context.
    pub fn with_min_gas_prices(mut self, prices: BTreeMap<String, u64>) -> Self {
        self.min_gas_prices = prices;
        self
    }

    pub fn with_tx_decoder(mut self, decoder: TxDecoder) -> Self {
        self.tx_decoder = Some(decoder);
        self
    }

    pub fn with_ante_handler(mut self, ante: AnteHandler) -> Self {
        self.ante_handler = Some(ante);
        self
    }

    pub fn with_init_chainer(mut self, init_chainer: InitChainer) -> Self {
        self.init_chainer = Some(init_chainer);
        self
    }

    pub fn with_begin_blocker(mut self, begin_blocker: BeginBlocker) -> Self {
        self.begin_blocker = Some(begin_blocker);
        self
    }

    pub fn with_end_blocker(mut self, end_blocker: EndBlocker) -> Self {
        self.end_blocker = Some(end_blocker);
        self
    }

    pub fn add_route(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.router.add_route(name, handler);
        self
    }

    /// Mounts an in-memory engine from the builder's database under `key`.
    pub fn mount_store(mut self, key: &StoreKey) -> Self {
        let engine = Memory::open(&self.db, key.name());
        self.cms.mount(key, engine);
        self
    }

    /// Mounts a caller-supplied backing engine under `key`.
    pub fn mount_engine(mut self, key: &StoreKey, engine: impl CommitEngine + 'static) -> Self {
        self.cms.mount(key, engine);
        self
    }

    /// Seals the configuration and loads every mounted store at its latest
    /// committed version.
    pub fn load_latest_version(self) -> CResult<App> {
        self.seal(None)
    }

    /// Seals the configuration and loads every mounted store at `version`.
    pub fn load_version(self, version: i64) -> CResult<App> {
        self.seal(Some(version))
    }

    fn seal(mut self, version: Option<i64>) -> CResult<App> {
        let tx_decoder = self
            .tx_decoder
            .take()
            .ok_or_else(|| Error::internal("tx decoder not configured"))?;

        self.cms.set_pruning(self.pruning);
        match version {
            Some(v) => self.cms.load_version(v)?,
            None => self.cms.load_latest_version()?,
        }

        let ms = self.cms.cache_multi_store();
        let ctx = Context::new(ms.clone(), BlockHeader::default(), Mode::Check)
            .with_min_gas_prices(self.min_gas_prices.clone());
        let check_state = ExecState { ms, ctx };

        log::info!(
            "loaded application {} at version {}",
            self.name,
            self.cms.latest_version()
        );

        Ok(App {
            name: self.name,
            app_version: self.app_version,
            cms: self.cms,
            router: self.router,
            tx_decoder,
            ante_handler: self.ante_handler,
            init_chainer: self.init_chainer,
            begin_blocker: self.begin_blocker,
            end_blocker: self.end_blocker,
            min_gas_prices: self.min_gas_prices,
            consensus_params: None,
            chain_id: String::new(),
            check_state,
            deliver_state: None,
            phase: Phase::Loaded,
            initialized: false,
        })
    }
}

/// The sealed application core. Consensus drives it one lifecycle call at a
/// time; configuration is fixed at construction.
pub struct App {
    name: String,
    app_version: String,
    cms: CommitMultiStore,
    router: Router,
    tx_decoder: TxDecoder,
    ante_handler: Option<AnteHandler>,
    init_chainer: Option<InitChainer>,
    begin_blocker: Option<BeginBlocker>,
    end_blocker: Option<EndBlocker>,
    min_gas_prices: BTreeMap<String, u64>,
    consensus_params: Option<BlockParams>,
    chain_id: String,
    check_state: ExecState,
    deliver_state: Option<ExecState>,
    phase: Phase,
    initialized: bool,
}

impl App {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    pub fn last_commit_id(&self) -> CommitId {
        self.cms.last_commit_id()
    }

    pub fn info(&self) -> ResponseInfo {
        let commit = self.cms.last_commit_id();
        ResponseInfo {
            name: self.name.clone(),
            version: self.app_version.clone(),
            last_block_height: commit.version,
            last_block_app_hash: commit.hash,
        }
    }

    /// Runtime options are not supported; configuration is sealed into the
    /// builder. Present for consensus interface completeness.
    pub fn set_option(&mut self, req: RequestSetOption) -> ResponseSetOption {
        ResponseSetOption {
            code: Error::unknown_request("").code(),
            log: format!("unsupported option key {:?}", req.key),
        }
    }

    /// Initializes the chain exactly once: captures consensus parameters,
    /// sets the chain id on both execution states and runs the init chainer
    /// against the deliver state. Genesis writes stay in the deliver state
    /// until the first commit.
    pub fn init_chain(&mut self, req: RequestInitChain) -> CResult<()> {
        if self.initialized {
            panic!("chain is already initialized");
        }

        let params = req.consensus_params.unwrap_or_default();
        if params.max_gas < -1 {
            panic!("invalid consensus max block gas {}", params.max_gas);
        }
        self.consensus_params = Some(params);
        self.chain_id = req.chain_id.clone();

        log::info!("initializing chain {}", self.chain_id);

        let header = BlockHeader { chain_id: req.chain_id.clone(), height: 0, time: 0 };
        self.deliver_state = Some(self.make_state(Mode::Deliver, header.clone()));
        self.check_state = self.make_state(Mode::Check, header);

        if let Some(init_chainer) = &self.init_chainer {
            let state = self.deliver_state.as_ref().expect("deliver state just created");
            init_chainer(&state.ctx, &req)?;
        }

        self.initialized = true;
        self.phase = Phase::Initialized;
        Ok(())
    }

    /// Opens a block: installs the header and a fresh block gas meter on the
    /// deliver state, creating the state first unless InitChain left genesis
    /// writes in it.
    pub fn begin_block(&mut self, req: RequestBeginBlock) -> CResult<()> {
        if matches!(self.phase, Phase::InBlock | Phase::BetweenBlocks) {
            panic!("begin_block while a block is still open");
        }

        log::debug!("beginning block {}", req.header.height);

        // InitChain leaves genesis writes in the deliver state; only build a
        // fresh one when the previous commit cleared it.
        if self.deliver_state.is_none() {
            self.deliver_state = Some(self.make_state(Mode::Deliver, req.header.clone()));
        }

        let block_meter = self.new_block_gas_meter();
        {
            let state = self.deliver_state.as_mut().expect("deliver state just ensured");
            state.ctx = state
                .ctx
                .with_header(req.header.clone())
                .with_block_gas_meter(block_meter);
        }

        if let Some(begin_blocker) = &self.begin_blocker {
            let state = self.deliver_state.as_ref().expect("deliver state just set");
            begin_blocker(&state.ctx, &req)?;
        }

        self.phase = Phase::InBlock;
        Ok(())
    }

    pub fn check_tx(&mut self, tx_bytes: &[u8]) -> TxResult {
        self.run_tx(Mode::Check, tx_bytes)
    }

    pub fn deliver_tx(&mut self, tx_bytes: &[u8]) -> TxResult {
        if self.phase != Phase::InBlock {
            panic!("deliver_tx outside a block");
        }
        self.run_tx(Mode::Deliver, tx_bytes)
    }

    /// Runs the full pipeline against a throwaway wrap of the check
    /// snapshot. Never mutates persisted state, and twice in a row returns
    /// the same result.
    pub fn simulate(&mut self, tx_bytes: &[u8]) -> TxResult {
        self.run_tx(Mode::Simulate, tx_bytes)
    }

    /// Closes the block by running the end blocker against the deliver
    /// state.
    pub fn end_block(&mut self, req: RequestEndBlock) -> CResult<ResponseEndBlock> {
        if self.phase != Phase::InBlock {
            panic!("end_block outside a block");
        }

        let response = match &self.end_blocker {
            Some(end_blocker) => {
                let state = self.deliver_state.as_ref().expect("deliver state open");
                end_blocker(&state.ctx, &req)?
            }
            None => ResponseEndBlock::default(),
        };

        self.phase = Phase::BetweenBlocks;
        Ok(response)
    }

    /// Flushes the deliver state through the commit multi-store, advances
    /// the committed version, and resets the check state over the new view.
    pub fn commit(&mut self) -> ResponseCommit {
        if !matches!(self.phase, Phase::InBlock | Phase::BetweenBlocks) {
            panic!("commit without an open block");
        }

        if let Some(state) = &self.deliver_state {
            state.ms.write();
        }
        let commit_id = self.cms.commit();

        let header = self
            .deliver_state
            .as_ref()
            .map(|s| s.ctx.header().clone())
            .unwrap_or_else(|| self.check_state.ctx.header().clone());
        self.check_state = self.make_state(Mode::Check, header);
        self.deliver_state = None;
        self.phase = Phase::Committed;

        log::info!("committed version {}", commit_id.version);
        ResponseCommit { data: commit_id.hash }
    }

    /// Answers `/app/...` and `/store/...` queries against the last
    /// committed version only; in-flight check or deliver writes are never
    /// visible here.
    pub fn query(&mut self, req: RequestQuery) -> ResponseQuery {
        let height = self.cms.latest_version();
        let segments: Vec<&str> =
            req.path.split('/').filter(|segment| !segment.is_empty()).collect();

        match segments.as_slice() {
            ["app", "simulate"] => {
                let result = self.simulate(&req.data);
                match codec::encode(&result) {
                    Ok(value) => ResponseQuery::ok(value, height),
                    Err(err) => ResponseQuery::err(err, height),
                }
            }
            ["app", "version"] => ResponseQuery::ok(self.app_version.clone().into_bytes(), height),
            ["store", name, "key"] => match self.cms.query_store(name, &req.data, req.height) {
                Ok(value) => ResponseQuery::ok(value.unwrap_or_default(), height),
                Err(err) => ResponseQuery::err(err, height),
            },
            _ => ResponseQuery::err(
                Error::unknown_request(format!("unknown query path {:?}", req.path)),
                height,
            ),
        }
    }

    fn make_state(&self, mode: Mode, header: BlockHeader) -> ExecState {
        let ms = self.cms.cache_multi_store();
        let mut ctx = Context::new(ms.clone(), header, mode)
            .with_min_gas_prices(self.min_gas_prices.clone());
        if !self.chain_id.is_empty() {
            ctx = ctx.with_chain_id(self.chain_id.clone());
        }
        ExecState { ms, ctx }
    }

    fn new_block_gas_meter(&self) -> SharedGasMeter {
        match self.consensus_params.as_ref().map(|p| p.max_gas) {
            Some(max_gas) if max_gas > 0 => gas::finite_meter(max_gas as u64),
            // -1 and 0 both denote an unlimited block gas budget.
            _ => gas::infinite_meter(),
        }
    }

    /// The shared check/deliver/simulate pipeline.
    fn run_tx(&mut self, mode: Mode, tx_bytes: &[u8]) -> TxResult {
        let tx = match (self.tx_decoder)(tx_bytes) {
            Ok(tx) => tx,
            Err(err) => return TxResult::from_error(err, 0, 0),
        };
        let gas_wanted = tx.fee().gas_wanted;

        if let Err(err) = self.validate_tx_msgs(tx.as_ref()) {
            return TxResult::from_error(err, gas_wanted, 0);
        }

        let base_ctx = match mode {
            Mode::Deliver => {
                self.deliver_state.as_ref().expect("deliver state missing in block").ctx.clone()
            }
            Mode::Check | Mode::Simulate => self.check_state.ctx.clone(),
        };

        // A block meter that already overflowed poisons the rest of the
        // block: fail before doing any work.
        if mode == Mode::Deliver {
            let past_limit = base_ctx
                .block_gas_meter()
                .lock()
                .expect("block gas meter mutex poisoned")
                .is_past_limit();
            if past_limit {
                return TxResult::from_error(
                    Error::OutOfGas("block gas meter".to_string()),
                    gas_wanted,
                    0,
                );
            }
        }

        // Per-tx sandbox over the mode state: ante and handler writes are
        // kept or discarded as one unit.
        let tx_ms = base_ctx.multi_store().cache_wrap();
        let ctx = base_ctx
            .with_multi_store(tx_ms.clone())
            .with_mode(mode)
            .with_tx_bytes(tx_bytes.to_vec())
            .with_gas_meter(gas::infinite_meter());

        // The ante handler swaps in the real per-tx meter; remember
        // whichever meter ends up installed so gas can be reported even
        // when execution unwinds.
        let meter_slot: Arc<Mutex<SharedGasMeter>> =
            Arc::new(Mutex::new(ctx.gas_meter().clone()));

        let simulate = mode == Mode::Simulate;
        let execution = catch_unwind(AssertUnwindSafe(|| {
            let ctx = match &self.ante_handler {
                Some(ante) => {
                    let (ante_ctx, ante_result) = ante(&ctx, tx.as_ref(), simulate);
                    *meter_slot.lock().expect("meter slot mutex poisoned") =
                        ante_ctx.gas_meter().clone();
                    if let Err(err) = ante_result {
                        return TxResult::from_error(err, 0, 0);
                    }
                    ante_ctx
                }
                None => ctx.clone(),
            };
            self.run_msgs(&ctx, tx.as_ref())
        }));

        let tx_meter = meter_slot.lock().expect("meter slot mutex poisoned").clone();
        let (gas_used, gas_to_block) = {
            let meter = tx_meter.lock().expect("gas meter mutex poisoned");
            (meter.gas_consumed(), meter.gas_consumed_to_limit())
        };

        let mut result = match execution {
            Ok(result) => result,
            Err(payload) => {
                if let Some(abort) = payload.downcast_ref::<OutOfGasAbort>() {
                    TxResult::from_error(Error::OutOfGas(abort.descriptor.clone()), 0, 0)
                } else {
                    TxResult::from_error(
                        Error::internal(format!("recovered: {}", panic_message(&payload))),
                        0,
                        0,
                    )
                }
            }
        };
        result.gas_wanted = gas_wanted;
        result.gas_used = gas_used;

        // Flush the sandbox into the mode state only when everything
        // succeeded; a simulation is always discarded.
        if result.is_ok() && mode != Mode::Simulate {
            tx_ms.write();
        }

        // Charge the block meter with what this tx actually burned. An
        // overflow here fails the tx and, because the overflow is recorded,
        // poisons the remainder of the block.
        if mode == Mode::Deliver {
            let charge = base_ctx
                .block_gas_meter()
                .lock()
                .expect("block gas meter mutex poisoned")
                .try_consume(gas_to_block, "block gas meter");
            if let Err(err) = charge {
                if result.is_ok() {
                    result = TxResult::from_error(err, gas_wanted, gas_used);
                }
            }
        }

        result
    }

    /// Syntactic validation: a non-empty message list, each message basically
    /// valid and each route registered.
    fn validate_tx_msgs(&self, tx: &dyn Tx) -> CResult<()> {
        let msgs = tx.msgs();
        if msgs.is_empty() {
            return Err(Error::unknown_request("transaction contains no messages"));
        }
        for msg in &msgs {
            msg.validate_basic()?;
            let route = msg.route();
            if !self.router.has_route(&route) {
                return Err(Error::unknown_request(format!("no handler for route {:?}", route)));
            }
        }
        Ok(())
    }

    /// Runs every message in order with the per-tx context. The first error
    /// aborts; earlier messages' writes die with the sandbox.
    fn run_msgs(&self, ctx: &Context, tx: &dyn Tx) -> TxResult {
        let mut data = Vec::new();
        let mut logs = Vec::new();

        for (index, msg) in tx.msgs().into_iter().enumerate() {
            let handler =
                self.router.route(&msg.route()).expect("route existence checked before execution");
            match handler(ctx, msg) {
                Ok(msg_result) => {
                    data.extend(msg_result.data);
                    logs.push(format!("msg {}: {}", index, msg_result.log));
                }
                Err(err) => {
                    log::debug!("msg {} aborted tx: {}", index, err);
                    return TxResult::from_error(err, 0, 0);
                }
            }
        }

        TxResult { error: None, data, log: logs.join("; "), gas_wanted: 0, gas_used: 0 }
    }

    #[cfg(test)]
    pub(crate) fn check_state_context(&self) -> &Context {
        &self.check_state.ctx
    }

    #[cfg(test)]
    pub(crate) fn deliver_state_context(&self) -> Option<&Context> {
        self.deliver_state.as_ref().map(|state| &state.ctx)
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
