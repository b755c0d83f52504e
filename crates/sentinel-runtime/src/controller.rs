//! System controller
//!
//! Builds and runs the platform: event pump, update loop, and consensus
//! monitor. Cancellation flows through one watch channel; on shutdown
//! every task gets a two-second drain window before it is aborted, and
//! components shut down in reverse registration order afterwards.

use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sentinel_bus::{EventBus, EventPump, SubscriberHandle};
use sentinel_core::{
    Clock, CommandEnvelope, ErrorFabric, Event, EventPayload, EventSink, MonotonicClock,
    Priority, RbacTable, RecoveryDirective, Role, SensorKind, SentinelError, SystemConfig,
    SystemMode,
};
use sentinel_fusion::{EnvironmentContext, FusionPipeline, SignatureLibrary};
use sentinel_gateway::{GatewayConfig, GatewayRejection, SecureGateway};
use sentinel_hil::{HilInterface, SampleStream, StreamDriver, DEFAULT_STREAM_DEPTH};
use sentinel_ledger::{
    select_candidate, CommandLedger, CommandSigner, KeyRegistry, LedgerError, LedgerStore,
    PeerNetwork, StaticPeerSet, Transaction, MINING_BUDGET,
};
use sentinel_registry::{Component, ComponentId, ComponentRegistry, RegistryError};

use crate::audit::AuditTrail;
use crate::backoff::BackoffPolicy;
use crate::dispatch::CommandDispatcher;
use crate::workers::WorkerPool;

/// Consensus monitor cadence.
pub const CONSENSUS_INTERVAL: Duration = Duration::from_secs(5);
/// Per-round peer query budget.
pub const PEER_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Drain window granted to tasks on shutdown.
pub const DRAIN_WINDOW: Duration = Duration::from_secs(2);

/// Caller-facing command rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandRejection {
    #[error("unauthorized")]
    Unauthorized,
    #[error("throttled")]
    Throttled,
    #[error("anomalous")]
    Anomalous,
    #[error("ledger full")]
    LedgerFull,
    #[error("signature invalid")]
    SignatureInvalid,
}

impl From<GatewayRejection> for CommandRejection {
    fn from(rejection: GatewayRejection) -> Self {
        match rejection {
            GatewayRejection::Unauthorized => CommandRejection::Unauthorized,
            GatewayRejection::Throttled => CommandRejection::Throttled,
            GatewayRejection::Anomalous => CommandRejection::Anomalous,
        }
    }
}

impl From<LedgerError> for CommandRejection {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::PoolFull => CommandRejection::LedgerFull,
            LedgerError::SignatureInvalid | LedgerError::Duplicate => {
                CommandRejection::SignatureInvalid
            }
        }
    }
}

pub struct RuntimeBuilder {
    config: SystemConfig,
    clock: Arc<dyn Clock>,
    peers: Arc<dyn PeerNetwork>,
    library: SignatureLibrary,
    store: Option<LedgerStore>,
    signer_seed: u64,
}

impl RuntimeBuilder {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            clock: Arc::new(MonotonicClock::new()),
            peers: Arc::new(StaticPeerSet::new()),
            library: SignatureLibrary::default(),
            store: None,
            signer_seed: 0x53_45_4e_54,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn peers(mut self, peers: Arc<dyn PeerNetwork>) -> Self {
        self.peers = peers;
        self
    }

    pub fn signature_library(mut self, library: SignatureLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn ledger_store(mut self, store: LedgerStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn signer_seed(mut self, seed: u64) -> Self {
        self.signer_seed = seed;
        self
    }

    pub fn build(self) -> Result<Arc<Runtime>, sentinel_core::config::ConfigError> {
        self.config.validate()?;

        let bus = EventBus::new(self.clock.clone());
        let pump = EventPump::new(bus.clone());
        let subscriber = pump.handle();

        let sink: Arc<dyn EventSink> = Arc::new(bus.clone());
        let fabric = Arc::new(ErrorFabric::with_defaults(self.clock.clone()));
        fabric.attach_sink(sink.clone());

        let signer = CommandSigner::from_seed("sentinel-node", self.signer_seed);
        let mut keys = KeyRegistry::new();
        keys.enroll_signer(&signer);

        let mut ledger = CommandLedger::new(
            self.config.difficulty_bits,
            keys,
            self.clock.clone(),
            sink.clone(),
        );
        if let Some(store) = &self.store {
            if store.path().exists() {
                // Reload validates the whole chain before serving.
                match sentinel_ledger::load_chain(
                    store.path(),
                    self.config.difficulty_bits,
                    ledger.keys(),
                ) {
                    Ok(chain) => ledger = ledger.with_chain(chain),
                    Err(err) => warn!(%err, "persisted ledger refused; starting fresh"),
                }
            } else if let Err(err) = store.rewrite(ledger.chain()) {
                warn!(%err, "could not seed the ledger store");
            }
        }

        let audit = Arc::new(StdMutex::new(AuditTrail::new()));
        {
            let audit = audit.clone();
            subscriber.subscribe_pattern(
                |event| event.priority <= Priority::High,
                move |event| {
                    audit.lock().expect("audit trail poisoned").log_event(&event);
                },
            );
        }

        let runtime = Runtime {
            bus,
            subscriber,
            pump: StdMutex::new(Some(pump)),
            registry: AsyncMutex::new(ComponentRegistry::new(
                self.clock.clone(),
                sink.clone(),
            )),
            gateway: AsyncMutex::new(SecureGateway::new(
                GatewayConfig::default(),
                RbacTable::default(),
                self.clock.clone(),
                sink.clone(),
            )),
            ledger: AsyncMutex::new(ledger),
            fusion: AsyncMutex::new(FusionPipeline::new(self.library, sink.clone())),
            dispatcher: AsyncMutex::new(CommandDispatcher::new()),
            audit,
            fabric,
            workers: WorkerPool::new(self.config.max_concurrent_operations),
            peers: self.peers,
            signer,
            mode: StdRwLock::new(SystemMode::Standby),
            environment: StdRwLock::new(EnvironmentContext::default()),
            store: self.store,
            shutdown_tx: watch::channel(false).0,
            clock: self.clock,
            config: self.config,
            sink,
        };
        Ok(Arc::new(runtime))
    }
}

pub struct Runtime {
    config: SystemConfig,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    sink: Arc<dyn EventSink>,
    subscriber: SubscriberHandle,
    pump: StdMutex<Option<EventPump>>,
    registry: AsyncMutex<ComponentRegistry>,
    gateway: AsyncMutex<SecureGateway>,
    ledger: AsyncMutex<CommandLedger>,
    fusion: AsyncMutex<FusionPipeline>,
    dispatcher: AsyncMutex<CommandDispatcher>,
    audit: Arc<StdMutex<AuditTrail>>,
    fabric: Arc<ErrorFabric>,
    workers: WorkerPool,
    peers: Arc<dyn PeerNetwork>,
    signer: CommandSigner,
    mode: StdRwLock<SystemMode>,
    environment: StdRwLock<EnvironmentContext>,
    store: Option<LedgerStore>,
    shutdown_tx: watch::Sender<bool>,
}

impl Runtime {
    pub fn builder(config: SystemConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Handle for event subscriptions.
    pub fn events(&self) -> &SubscriberHandle {
        &self.subscriber
    }

    pub fn mode(&self) -> SystemMode {
        *self.mode.read().expect("mode lock poisoned")
    }

    pub fn set_mode(&self, mode: SystemMode) {
        *self.mode.write().expect("mode lock poisoned") = mode;
    }

    pub fn set_environment(&self, environment: EnvironmentContext) {
        *self.environment.write().expect("environment lock poisoned") = environment;
    }

    pub fn error_fabric(&self) -> &Arc<ErrorFabric> {
        &self.fabric
    }

    // ------------------------------------------------------------------
    // Task supervision
    // ------------------------------------------------------------------

    /// Spawn the pump, update loop, and consensus monitor.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let pump = self
            .pump
            .lock()
            .expect("pump slot poisoned")
            .take()
            .expect("runtime already started");
        let shutdown = self.shutdown_tx.subscribe();
        let pump_task = tokio::spawn(pump.run(shutdown));

        let update_task = tokio::spawn(Self::update_loop(
            self.clone(),
            self.shutdown_tx.subscribe(),
        ));
        let consensus_task = tokio::spawn(Self::consensus_monitor(
            self.clone(),
            self.shutdown_tx.subscribe(),
        ));

        info!(
            rate_hz = self.config.ai_processing_rate,
            workers = self.workers.size(),
            blockchain = self.config.enable_blockchain,
            "runtime started"
        );
        vec![pump_task, update_task, consensus_task]
    }

    /// Graceful stop: signal, grant the drain window, abort stragglers,
    /// then shut components down in reverse registration order.
    pub async fn shutdown(self: &Arc<Self>, tasks: Vec<JoinHandle<()>>) {
        let _ = self.shutdown_tx.send(true);
        for task in tasks {
            if tokio::time::timeout(DRAIN_WINDOW, task).await.is_err() {
                warn!("task exceeded drain window; aborted");
            }
        }
        self.registry.lock().await.shutdown_all().await;
        info!("runtime stopped");
    }

    async fn update_loop(runtime: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = runtime.config.tick_period();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let faults = runtime.registry.lock().await.update_all(period).await;
            for fault in faults {
                let directive = runtime.fabric.handle(&fault);
                runtime.apply_directive(&fault, directive).await;
            }

            let env = runtime
                .environment
                .read()
                .expect("environment lock poisoned")
                .clone();
            let now = runtime.clock.now_ns();
            let due = {
                let mut fusion = runtime.fusion.lock().await;
                fusion.run_cycle(&env, now);
                fusion.take_recalibration_due()
            };
            for kind in due {
                debug!(?kind, "sensor due for recalibration");
            }
        }
        debug!("update loop stopped");
    }

    async fn consensus_monitor(runtime: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(CONSENSUS_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if !runtime.config.enable_blockchain {
                continue;
            }

            let intact = runtime.ledger.lock().await.validate_self().is_ok();
            if intact {
                continue;
            }

            warn!("local chain failed validation");
            let chain_length = runtime.ledger.lock().await.chain().len();
            runtime.emit(
                Priority::Critical,
                EventPayload::ConsensusFailure { chain_length },
            );
            runtime.recover_consensus().await;
        }
        debug!("consensus monitor stopped");
    }

    /// One consensus recovery round: collect candidate chains, pick the
    /// best-supported longest one, and swap. Failure engages the
    /// emergency protocol.
    pub async fn recover_consensus(self: &Arc<Self>) -> bool {
        // Peer collection runs under the Network retry policy; an empty
        // round counts as a transient failure.
        let peers = self.peers.clone();
        let chains = BackoffPolicy::default()
            .run(|| {
                let peers = peers.clone();
                async move {
                    let chains =
                        tokio::time::timeout(PEER_QUERY_TIMEOUT, peers.collect_chains())
                            .await
                            .unwrap_or_default();
                    if chains.is_empty() {
                        Err("no candidate chains offered")
                    } else {
                        Ok(chains)
                    }
                }
            })
            .await
            .unwrap_or_default();
        let candidate = select_candidate(chains, self.config.consensus_threshold);

        let swapped = match candidate {
            Some(blocks) => self.ledger.lock().await.consensus_swap(blocks),
            None => false,
        };

        let chain_length = self.ledger.lock().await.chain().len();
        if swapped {
            if let Some(store) = &self.store {
                if let Err(err) = store.rewrite(self.ledger.lock().await.chain()) {
                    warn!(%err, "ledger rewrite after swap failed");
                }
            }
            self.dispatcher.lock().await.set_paused(false);
            self.emit(
                Priority::Critical,
                EventPayload::ConsensusRecovery {
                    recovered: true,
                    chain_length,
                },
            );
            return true;
        }

        // Emergency protocol: pause actuators, light the beacon.
        self.set_mode(SystemMode::Emergency);
        self.dispatcher.lock().await.set_paused(true);
        self.gateway.lock().await.engage_emergency_posture();
        self.emit(
            Priority::Critical,
            EventPayload::EmergencyProtocol {
                reason: "no valid chain available from peers".into(),
            },
        );
        self.emit(
            Priority::Critical,
            EventPayload::ConsensusRecovery {
                recovered: false,
                chain_length,
            },
        );
        false
    }

    // ------------------------------------------------------------------
    // Command path
    // ------------------------------------------------------------------

    /// Front-door command submission: gateway screening, ledger
    /// admission, and batch sealing.
    pub async fn submit_command(
        self: &Arc<Self>,
        envelope: CommandEnvelope,
    ) -> Result<(), CommandRejection> {
        self.gateway.lock().await.screen(&envelope)?;

        if !self.config.enable_blockchain {
            // Ledger disabled: screened commands dispatch directly.
            self.dispatcher.lock().await.dispatch(&envelope.payload);
            return Ok(());
        }

        let tx = Transaction::signed(
            envelope.payload.clone(),
            &self.signer,
            self.clock.now_ns(),
        );
        let outcome = self.ledger.lock().await.submit(tx)?;
        if outcome.batch_ready {
            self.seal_pending().await;
        }
        Ok(())
    }

    /// Seal the pending pool on the worker pool and dispatch the block's
    /// commands.
    pub async fn seal_pending(self: &Arc<Self>) {
        let (candidate, difficulty) = {
            let mut ledger = self.ledger.lock().await;
            (ledger.prepare_candidate(), ledger.difficulty_bits())
        };
        let Some(candidate) = candidate else {
            return;
        };

        let deadline = Instant::now() + MINING_BUDGET;
        let sealed = self
            .workers
            .offload(move || candidate.seal(difficulty, deadline))
            .await
            .ok()
            .flatten();

        let Some(block) = sealed else {
            self.ledger.lock().await.report_budget_exhausted();
            return;
        };

        let committed = self.ledger.lock().await.commit_sealed(block);
        match committed {
            Ok(block) => {
                if let Some(store) = &self.store {
                    if let Err(err) = store.append(&block) {
                        warn!(%err, "ledger persistence append failed");
                    }
                }
                self.peers.broadcast_block(&block).await;
                let mut dispatcher = self.dispatcher.lock().await;
                for tx in &block.transactions {
                    dispatcher.dispatch(&tx.command);
                }
            }
            Err(err) => warn!(%err, "sealed block failed commit"),
        }
    }

    /// Out-of-band Admin action clearing a command lockdown.
    pub async fn clear_lockdown(&self, role: Role) -> Result<(), CommandRejection> {
        self.gateway
            .lock()
            .await
            .clear_lockdown(role)
            .map_err(CommandRejection::from)
    }

    pub async fn active_countermeasures(&self) -> Vec<sentinel_core::Countermeasure> {
        self.gateway.lock().await.active_countermeasures()
    }

    pub async fn command_history_len(&self) -> usize {
        self.ledger.lock().await.history().count()
    }

    pub async fn chain_length(&self) -> usize {
        self.ledger.lock().await.chain().len()
    }

    /// Hex digest of the current tip block.
    pub async fn tip_hash(&self) -> String {
        self.ledger.lock().await.chain().tip().hash.to_hex()
    }

    pub async fn register_dispatch_handler(
        &self,
        kind: sentinel_core::CommandKind,
        handler: impl Fn(&sentinel_core::CommandPayload) + Send + Sync + 'static,
    ) {
        self.dispatcher.lock().await.register(kind, handler);
    }

    pub async fn dispatch_paused(&self) -> bool {
        self.dispatcher.lock().await.is_paused()
    }

    // ------------------------------------------------------------------
    // Components & sensing
    // ------------------------------------------------------------------

    pub async fn register_component(
        &self,
        component: Box<dyn Component>,
    ) -> Result<ComponentId, RegistryError> {
        self.registry.lock().await.register(component).await
    }

    pub async fn unregister_component(&self, id: ComponentId) -> Result<(), RegistryError> {
        self.registry.lock().await.unregister(id).await
    }

    pub async fn component_info(&self, id: ComponentId) -> Option<sentinel_registry::ComponentInfo> {
        self.registry.lock().await.get(id)
    }

    /// Connect an HIL interface and pipe its stream into the fusion
    /// pipeline. Returns the consumer-side stream handle and the
    /// forwarder task.
    pub async fn attach_interface(
        self: &Arc<Self>,
        mut interface: Box<dyn HilInterface + Send>,
    ) -> Result<(StreamDriver, JoinHandle<()>), SentinelError> {
        let interface_id = interface.interface_id().to_string();
        let connected = tokio::time::timeout(
            sentinel_hil::CONNECT_TIMEOUT,
            interface.connect(),
        )
        .await;
        match connected {
            Ok(Ok(true)) => {}
            _ => {
                let err = SentinelError::new(
                    format!("hil connect timeout on {interface_id}"),
                    sentinel_core::ErrorCategory::Hardware,
                    sentinel_core::ErrorSeverity::Error,
                )
                .with_origin(interface_id.clone());
                self.fabric.handle(&err);
                return Err(err);
            }
        }
        self.emit(
            Priority::Normal,
            EventPayload::HilConnected {
                interface_id: interface_id.clone(),
            },
        );

        let (driver, stream) = StreamDriver::spawn(
            interface,
            self.clock.clone(),
            self.sink.clone(),
            DEFAULT_STREAM_DEPTH,
        );

        let runtime = self.clone();
        let forwarder = tokio::spawn(async move {
            Self::forward_samples(runtime, stream, interface_id).await;
        });
        Ok((driver, forwarder))
    }

    async fn forward_samples(runtime: Arc<Self>, stream: SampleStream, interface_id: String) {
        while let Some(sample) = stream.next_sample().await {
            runtime.fusion.lock().await.ingest(sample);
        }
        runtime.emit(
            Priority::Normal,
            EventPayload::HilDisconnected { interface_id },
        );
    }

    pub async fn ingest_sample(&self, sample: sentinel_fusion::SensorSample) {
        self.fusion.lock().await.ingest(sample);
    }

    /// Run one fusion cycle immediately (tests and tooling; the update
    /// loop does this continuously).
    pub async fn fusion_cycle(&self) -> Option<sentinel_core::FusedState> {
        let env = self
            .environment
            .read()
            .expect("environment lock poisoned")
            .clone();
        let now = self.clock.now_ns();
        self.fusion.lock().await.run_cycle(&env, now)
    }

    /// One-call health snapshot for operators and the SDK front door.
    pub async fn diagnostics(&self) -> RuntimeDiagnostics {
        let bus = self.bus.stats();
        let (chain_length, pending_transactions) = {
            let ledger = self.ledger.lock().await;
            (ledger.chain().len(), ledger.pending_len())
        };
        let components = self
            .registry
            .lock()
            .await
            .iter_info()
            .map(|info| (info.descriptor.name.clone(), info.state))
            .collect();
        RuntimeDiagnostics {
            mode: self.mode(),
            events_published: bus.published,
            events_delivered: bus.delivered,
            queue_depth: bus.depth,
            chain_length,
            pending_transactions,
            active_countermeasures: self.gateway.lock().await.active_countermeasures(),
            dispatch_paused: self.dispatcher.lock().await.is_paused(),
            components,
            workers_available: self.workers.available(),
            audit_records: self.audit_len(),
        }
    }

    // ------------------------------------------------------------------
    // Integrity
    // ------------------------------------------------------------------

    /// Audit-trail and chain verification.
    pub async fn verify_system_integrity(&self) -> bool {
        let trail_ok = self.audit.lock().expect("audit trail poisoned").verify();
        let chain_ok = self.ledger.lock().await.validate_self().is_ok();
        trail_ok && chain_ok
    }

    pub fn audit_len(&self) -> usize {
        self.audit.lock().expect("audit trail poisoned").len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn apply_directive(self: &Arc<Self>, err: &SentinelError, directive: RecoveryDirective) {
        match directive {
            RecoveryDirective::DegradeSensor {
                weight_factor,
                recalibrate_after,
            } => {
                if let Some(kind) = sensor_kind_from(err) {
                    let until = self.clock.now_ns() + recalibrate_after.as_nanos() as u64;
                    self.fusion
                        .lock()
                        .await
                        .penalize_sensor(kind, weight_factor, until);
                }
            }
            RecoveryDirective::ConsensusRecovery => {
                self.recover_consensus().await;
            }
            RecoveryDirective::DegradeComponent { error_after_ticks } => {
                // Hardware faults get the longer leash before the
                // registry parks the component.
                if let Some(origin) = &err.origin_component {
                    let mut registry = self.registry.lock().await;
                    let target = registry
                        .iter_info()
                        .find(|info| &info.descriptor.name == origin)
                        .map(|info| info.id);
                    if let Some(id) = target {
                        let _ = registry.set_fault_tolerance(id, error_after_ticks);
                    }
                }
            }
            RecoveryDirective::RetryWithBackoff { .. }
            | RecoveryDirective::EscalateCountermeasures
            | RecoveryDirective::RejectConfiguration
            | RecoveryDirective::None => {
                debug!(category = ?err.category, "directive handled at origin");
            }
        }
    }

    fn emit(&self, priority: Priority, payload: EventPayload) {
        self.sink.emit(Event::new(
            "system-controller",
            self.clock.now_ns(),
            priority,
            payload,
        ));
    }
}

/// Point-in-time operator view of the whole runtime.
#[derive(Debug, Clone)]
pub struct RuntimeDiagnostics {
    pub mode: SystemMode,
    pub events_published: u64,
    pub events_delivered: u64,
    pub queue_depth: usize,
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub active_countermeasures: Vec<sentinel_core::Countermeasure>,
    pub dispatch_paused: bool,
    pub components: Vec<(String, sentinel_registry::LifecycleState)>,
    pub workers_available: usize,
    pub audit_records: usize,
}

/// Sensor kind attribution carried in the error details as
/// `{"sensor_kind": "<label>"}`.
fn sensor_kind_from(err: &SentinelError) -> Option<SensorKind> {
    let label = err.details.get("sensor_kind")?.as_str()?;
    match label {
        "lidar" => Some(SensorKind::Lidar),
        "magnetic" => Some(SensorKind::Magnetic),
        "spectral" => Some(SensorKind::Spectral),
        "imu" => Some(SensorKind::Imu),
        "rangefinder" => Some(SensorKind::Rangefinder),
        "video" => Some(SensorKind::Video),
        _ => None,
    }
}
