//! Real-time orchestration of an [`AudioEngine`] on a hardware device.
//!
//! Three threads cooperate:
//!
//! - the control thread owns the [`LiveEngine`], edits the topology and
//!   drives the state machine;
//! - a worker thread renders blocks ahead of real time and is the only place
//!   the engine runs while the device streams;
//! - the driver's real-time thread invokes the callback thunk, which moves
//!   samples between the device buffers and two block channels.
//!
//! ```text
//!            capture channel                 playback channel
//! driver in ────────────────► worker ──► engine.process ──────────────► driver out
//! ```
//!
//! The worker keeps up to `blocks_ahead` rendered blocks queued. Edits made
//! while running are validated against a control-side mirror of the topology
//! and applied by the worker between blocks, so blocks rendered before an edit
//! play unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use spatia_core::{
    AudioEngine, Configuration, Connection, ConnectionTable, GraphError, NodeId, NodeKind,
    SampleLayout,
};

use crate::backend::AudioBackend;
use crate::spsc::{Block, BlockReceiver, BlockSender, block_channel};
use crate::{Error, Result};

const MIN_PARK: Duration = Duration::from_millis(1);

/// Life-cycle state of a [`LiveEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No worker, device idle. The engine can be edited directly.
    Stopped,
    /// Device opening, worker spawning.
    Starting,
    /// Worker rendering, device streaming.
    Running,
    /// Pause requested; the worker has not acknowledged it yet.
    Pausing,
    /// Worker idle, device playing silence.
    Paused,
    /// Worker joining, device stopping.
    Stopping,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Tuning for a [`LiveEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSettings {
    /// Rendered blocks the worker keeps queued ahead of the device.
    pub blocks_ahead: usize,
    /// Sample layout of the blocks the engine reads and writes.
    pub layout: SampleLayout,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            blocks_ahead: 3,
            layout: SampleLayout::Interleaved,
        }
    }
}

/// Counters collected since the last [`LiveEngine::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveStats {
    /// Device callbacks serviced.
    pub callbacks: u64,
    /// Callbacks that found no rendered block and played silence.
    pub underruns: u64,
    /// Callbacks whose captured input was dropped for lack of a free block.
    pub overruns: u64,
    /// Blocks rendered and queued by the worker.
    pub blocks_rendered: u64,
    /// Blocks taken off the queue by the device callback.
    pub blocks_played: u64,
    /// Blocks the engine failed to render and the worker skipped.
    pub failed_blocks: u64,
}

#[derive(Default)]
struct Shared {
    shutdown: AtomicBool,
    paused: AtomicBool,
    pause_acked: AtomicBool,
    callbacks: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
    blocks_rendered: AtomicU64,
    blocks_played: AtomicU64,
    failed_blocks: AtomicU64,
}

impl Shared {
    fn stats(&self) -> LiveStats {
        // played first: a later rendered count never under-reports the queue
        let blocks_played = self.blocks_played.load(Ordering::Acquire);
        LiveStats {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            blocks_rendered: self.blocks_rendered.load(Ordering::Acquire),
            blocks_played,
            failed_blocks: self.failed_blocks.load(Ordering::Relaxed),
        }
    }
}

/// Topology edit delivered to the worker.
enum Command {
    AddNode {
        id: NodeId,
        parent: Option<NodeId>,
        name: String,
        kind: NodeKind,
    },
    RemoveNode(NodeId),
    SetParent {
        id: NodeId,
        parent: Option<NodeId>,
    },
    Connect(Connection),
    Disconnect(Connection),
}

/// Control-side copy of the topology, used to validate edits while the
/// engine lives on the worker thread.
struct Mirror {
    parents: BTreeMap<NodeId, Option<NodeId>>,
    connections: ConnectionTable,
    next_id: NodeId,
}

impl Mirror {
    fn of(engine: &AudioEngine) -> Self {
        let parents = engine
            .tree()
            .iter()
            .map(|node| (node.id(), node.parent()))
            .collect();
        Self {
            parents,
            connections: engine.connections().clone(),
            next_id: engine.tree().next_id(),
        }
    }

    fn contains(&self, id: NodeId) -> bool {
        self.parents.contains_key(&id)
    }

    fn require(&self, id: NodeId) -> std::result::Result<(), GraphError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(GraphError::NodeNotFound(id))
        }
    }

    /// Returns `true` if `ancestor` is `id` or lies on its parent chain.
    fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parents.get(&node).copied().flatten();
        }
        false
    }

    fn add(&mut self, parent: Option<NodeId>) -> std::result::Result<NodeId, GraphError> {
        if let Some(parent) = parent {
            self.require(parent)?;
        }
        let id = self.next_id;
        self.next_id = NodeId::from_raw(id.index() + 1);
        self.parents.insert(id, parent);
        Ok(id)
    }

    fn remove(&mut self, id: NodeId) -> std::result::Result<Vec<NodeId>, GraphError> {
        self.require(id)?;
        let removed: Vec<NodeId> = self
            .parents
            .keys()
            .copied()
            .filter(|&node| self.is_within(node, id))
            .collect();
        for node in &removed {
            self.parents.remove(node);
            self.connections.remove_node(*node);
        }
        Ok(removed)
    }

    fn set_parent(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
    ) -> std::result::Result<(), GraphError> {
        self.require(id)?;
        if let Some(parent) = parent {
            self.require(parent)?;
            if self.is_within(parent, id) {
                return Err(GraphError::InvalidParent { node: id, parent });
            }
        }
        self.parents.insert(id, parent);
        Ok(())
    }
}

struct Worker {
    handle: JoinHandle<Option<AudioEngine>>,
    thread: Thread,
    commands: Sender<Command>,
}

/// An [`AudioEngine`] streaming to an [`AudioBackend`].
///
/// While stopped the engine is owned here and can be edited freely. While
/// running it lives on the worker thread; edits go through the same methods
/// and take effect at the worker's next block boundary.
///
/// ```rust
/// use spatia_core::{AudioEngine, Configuration, Connection, NodeKind, nodes::Constant};
/// use spatia_io::{LiveEngine, LiveSettings, ManualBackend};
///
/// let (backend, _driver) = ManualBackend::new();
/// let engine = AudioEngine::new(Configuration::new(48000, 64, 0, 1));
/// let mut live = LiveEngine::new(backend, engine, LiveSettings::default());
///
/// let dc = live.add_node(None, "dc", NodeKind::Processor(Box::new(Constant::new(0.5)))).unwrap();
/// let out = live.add_node(None, "out", NodeKind::SystemOutput).unwrap();
/// live.connect(Connection::new(dc, 0, out, 0)).unwrap();
///
/// live.start().unwrap();
/// live.stop().unwrap();
/// ```
pub struct LiveEngine<B: AudioBackend> {
    backend: B,
    settings: LiveSettings,
    state: EngineState,
    engine: Option<AudioEngine>,
    worker: Option<Worker>,
    mirror: Option<Mirror>,
    shared: Arc<Shared>,
}

impl<B: AudioBackend> LiveEngine<B> {
    /// Wraps `engine` for streaming through `backend`. Nothing is opened
    /// until [`start`](Self::start).
    pub fn new(backend: B, engine: AudioEngine, settings: LiveSettings) -> Self {
        let settings = LiveSettings {
            blocks_ahead: settings.blocks_ahead.max(1),
            ..settings
        };
        Self {
            backend,
            settings,
            state: EngineState::Stopped,
            engine: Some(engine),
            worker: None,
            mirror: None,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Current state. Reports [`Paused`](EngineState::Paused) once the worker
    /// has acknowledged a pause.
    pub fn state(&self) -> EngineState {
        if self.state == EngineState::Pausing && self.shared.pause_acked.load(Ordering::Acquire) {
            EngineState::Paused
        } else {
            self.state
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> LiveSettings {
        self.settings
    }

    /// The device backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The device backend, mutably. Reconfiguring a running backend behind
    /// the engine's back is not supported.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The engine, while stopped.
    pub fn engine(&self) -> Option<&AudioEngine> {
        self.engine.as_ref()
    }

    /// Counters since the last start.
    pub fn stats(&self) -> LiveStats {
        self.shared.stats()
    }

    /// Rendered blocks waiting for the device.
    pub fn queued_output_blocks(&self) -> usize {
        let stats = self.shared.stats();
        stats.blocks_rendered.saturating_sub(stats.blocks_played) as usize
    }

    /// Opens the device, spawns the worker and starts streaming.
    ///
    /// # Errors
    ///
    /// Device failures are returned as-is; the engine stays
    /// [`Stopped`](EngineState::Stopped) and keeps its topology.
    pub fn start(&mut self) -> Result<()> {
        if self.state != EngineState::Stopped {
            return Err(Error::InvalidState(format!("cannot start while {}", self.state)));
        }
        let config = self.stopped_engine()?.config();
        config.validate()?;

        self.state = EngineState::Starting;
        match self.launch(config) {
            Ok(()) => {
                self.state = EngineState::Running;
                tracing::info!(
                    backend = self.backend.name(),
                    sample_rate = config.sample_rate(),
                    block_size = config.block_size(),
                    blocks_ahead = self.settings.blocks_ahead,
                    "live engine started"
                );
                Ok(())
            }
            Err(e) => {
                self.state = EngineState::Stopped;
                tracing::warn!(error = %e, "live engine failed to start");
                Err(e)
            }
        }
    }

    fn launch(&mut self, config: Configuration) -> Result<()> {
        self.backend.open(&config)?;

        let shared = Arc::new(Shared::default());
        let num_blocks = self.settings.blocks_ahead + 2;
        let (playback_tx, playback_rx) = block_channel(num_blocks, config.output_samples());
        let (capture_tx, capture_rx) = block_channel(num_blocks, config.input_samples());
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (engine_tx, engine_rx) = crossbeam_channel::bounded::<AudioEngine>(1);

        let worker_loop = WorkerLoop {
            shared: Arc::clone(&shared),
            commands: command_rx,
            playback: playback_tx,
            capture: capture_rx,
            blocks_ahead: self.settings.blocks_ahead,
            silence: vec![0.0; config.input_samples()],
            park: config.block_duration().max(MIN_PARK),
            reported: (0, 0),
        };
        let handle = thread::Builder::new()
            .name("spatia-worker".into())
            .spawn(move || {
                let engine = engine_rx.recv().ok()?;
                Some(worker_loop.run(engine))
            })?;
        let thread = handle.thread().clone();

        let mut engine = self.stopped_engine_owned()?;
        engine.set_layout(self.settings.layout);
        self.mirror = Some(Mirror::of(&engine));
        if let Err(back) = engine_tx.send(engine) {
            self.engine = Some(back.into_inner());
            self.mirror = None;
            return Err(Error::InvalidState("worker thread exited during start".into()));
        }

        self.shared = Arc::clone(&shared);
        self.worker = Some(Worker {
            handle,
            thread: thread.clone(),
            commands: command_tx,
        });

        let mut thunk = Thunk {
            shared,
            worker: thread,
            layout: self.settings.layout,
            frames_per_block: config.block_size(),
            in_channels: config.input_channels(),
            out_channels: config.output_channels(),
            capture: capture_tx,
            capture_block: None,
            capture_frame: 0,
            playback: playback_rx,
            playback_block: None,
            playback_frame: 0,
        };
        let started = self
            .backend
            .set_callback(Box::new(move |input, output| thunk.process(input, output)))
            .and_then(|()| self.backend.start());
        if let Err(e) = started {
            if let Err(join) = self.shutdown_worker() {
                tracing::error!(error = %join, "worker shutdown after failed start");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stops rendering; the device keeps running and plays silence. Device
    /// input arriving while paused is discarded.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != EngineState::Running {
            return Err(Error::InvalidState(format!("cannot pause while {}", self.state)));
        }
        self.shared.pause_acked.store(false, Ordering::Release);
        self.shared.paused.store(true, Ordering::Release);
        self.wake_worker();
        self.state = EngineState::Pausing;
        Ok(())
    }

    /// Resumes rendering after [`pause`](Self::pause).
    pub fn resume(&mut self) -> Result<()> {
        if !matches!(self.state, EngineState::Pausing | EngineState::Paused) {
            return Err(Error::InvalidState(format!("cannot resume while {}", self.state)));
        }
        self.shared.paused.store(false, Ordering::Release);
        self.shared.pause_acked.store(false, Ordering::Release);
        self.wake_worker();
        self.state = EngineState::Running;
        Ok(())
    }

    /// Joins the worker, then stops the device. Queued blocks are discarded.
    /// The device stays open.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == EngineState::Stopped {
            return Ok(());
        }
        self.state = EngineState::Stopping;
        let joined = self.shutdown_worker();
        let stopped = self.backend.stop();
        self.state = EngineState::Stopped;

        let stats = self.stats();
        tracing::info!(
            callbacks = stats.callbacks,
            blocks = stats.blocks_rendered,
            underruns = stats.underruns,
            overruns = stats.overruns,
            failed = stats.failed_blocks,
            "live engine stopped"
        );
        joined.and(stopped)
    }

    /// Stops and releases the device.
    pub fn close(&mut self) -> Result<()> {
        let stopped = self.stop();
        self.backend.close();
        stopped
    }

    fn shutdown_worker(&mut self) -> Result<()> {
        self.mirror = None;
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.shared.shutdown.store(true, Ordering::Release);
        worker.thread.unpark();
        drop(worker.commands);
        match worker.handle.join() {
            Ok(Some(engine)) => {
                self.engine = Some(engine);
                Ok(())
            }
            Ok(None) => Err(Error::InvalidState(
                "worker exited without receiving the engine".into(),
            )),
            Err(_) => Err(Error::InvalidState("worker thread panicked".into())),
        }
    }

    fn wake_worker(&self) {
        if let Some(worker) = &self.worker {
            worker.thread.unpark();
        }
    }

    fn stopped_engine(&mut self) -> Result<&mut AudioEngine> {
        self.engine
            .as_mut()
            .ok_or_else(|| Error::InvalidState("engine is owned by the worker".into()))
    }

    fn stopped_engine_owned(&mut self) -> Result<AudioEngine> {
        self.engine
            .take()
            .ok_or_else(|| Error::InvalidState("engine is owned by the worker".into()))
    }

    fn live_parts(&mut self) -> Result<(&mut Mirror, &Worker)> {
        match (self.mirror.as_mut(), self.worker.as_ref()) {
            (Some(mirror), Some(worker)) => Ok((mirror, worker)),
            _ => Err(Error::InvalidState("live engine has neither engine nor worker".into())),
        }
    }

    fn send(worker: &Worker, command: Command) -> Result<()> {
        worker
            .commands
            .send(command)
            .map_err(|_| Error::InvalidState("worker thread is gone".into()))?;
        worker.thread.unpark();
        Ok(())
    }

    /// Runs `f` on the engine. Only available while stopped.
    pub fn with_engine<R>(&mut self, f: impl FnOnce(&mut AudioEngine) -> R) -> Result<R> {
        Ok(f(self.stopped_engine()?))
    }

    /// Adds a node and returns its id.
    pub fn add_node(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        kind: NodeKind,
    ) -> Result<NodeId> {
        if let Some(engine) = self.engine.as_mut() {
            return Ok(engine.add_node(parent, name, kind)?);
        }
        let (mirror, worker) = self.live_parts()?;
        let id = mirror.add(parent)?;
        Self::send(
            worker,
            Command::AddNode {
                id,
                parent,
                name: name.to_owned(),
                kind,
            },
        )?;
        Ok(id)
    }

    /// Removes a node with its subtree and every connection touching them.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        if let Some(engine) = self.engine.as_mut() {
            return Ok(engine.remove_node(id)?);
        }
        let (mirror, worker) = self.live_parts()?;
        let removed = mirror.remove(id)?;
        Self::send(worker, Command::RemoveNode(id))?;
        Ok(removed)
    }

    /// Moves a node under `parent`, or to the root level.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<()> {
        if let Some(engine) = self.engine.as_mut() {
            return Ok(engine.tree_mut().set_parent(id, parent)?);
        }
        let (mirror, worker) = self.live_parts()?;
        mirror.set_parent(id, parent)?;
        Self::send(worker, Command::SetParent { id, parent })
    }

    /// Adds a connection. Returns `Ok(false)` if it already existed.
    ///
    /// # Errors
    ///
    /// [`GraphError::CycleDetected`] (wrapped) if the edge would close a
    /// loop; the topology is left unchanged.
    pub fn connect(&mut self, connection: Connection) -> Result<bool> {
        if let Some(engine) = self.engine.as_mut() {
            if engine.connections().contains(&connection) {
                return Ok(false);
            }
            return Ok(engine.connections_mut().connect(connection)?);
        }
        let (mirror, worker) = self.live_parts()?;
        let added = mirror.connections.connect(connection)?;
        if added {
            Self::send(worker, Command::Connect(connection))?;
        }
        Ok(added)
    }

    /// Removes a connection. Returns `false` if it did not exist.
    pub fn disconnect(&mut self, connection: &Connection) -> bool {
        if let Some(engine) = self.engine.as_mut() {
            return engine.connections().contains(connection)
                && engine.connections_mut().disconnect(connection);
        }
        let Ok((mirror, worker)) = self.live_parts() else {
            return false;
        };
        if !mirror.connections.disconnect(connection) {
            return false;
        }
        if let Err(e) = Self::send(worker, Command::Disconnect(*connection)) {
            tracing::warn!(error = %e, "disconnect not delivered");
        }
        true
    }

    /// Changes the device configuration. A running engine is stopped,
    /// reconfigured and restarted, since block sizes and the device format
    /// depend on it.
    pub fn set_config(&mut self, config: Configuration) -> Result<()> {
        config.validate()?;
        let previous = self.state();
        if previous == EngineState::Stopped {
            self.stopped_engine()?.set_config(config);
            return Ok(());
        }

        self.stop()?;
        self.stopped_engine()?.set_config(config);
        self.start()?;
        if matches!(previous, EngineState::Pausing | EngineState::Paused) {
            self.pause()?;
        }
        Ok(())
    }
}

impl<B: AudioBackend> Drop for LiveEngine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "live engine shutdown");
        }
    }
}

struct WorkerLoop {
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    playback: BlockSender,
    capture: BlockReceiver,
    blocks_ahead: usize,
    silence: Vec<f32>,
    park: Duration,
    reported: (u64, u64),
}

impl WorkerLoop {
    fn run(mut self, mut engine: AudioEngine) -> AudioEngine {
        tracing::debug!(blocks_ahead = self.blocks_ahead, "worker started");
        while !self.shared.shutdown.load(Ordering::Acquire) {
            self.apply_commands(&mut engine);

            if self.shared.paused.load(Ordering::Acquire) {
                self.shared.pause_acked.store(true, Ordering::Release);
                thread::park_timeout(self.park);
                continue;
            }
            if self.playback.queued() < self.blocks_ahead && self.render(&mut engine) {
                continue;
            }
            self.report_xruns();
            thread::park_timeout(self.park);
        }
        self.apply_commands(&mut engine);
        tracing::debug!(position = engine.sample_position(), "worker stopped");
        engine
    }

    fn apply_commands(&mut self, engine: &mut AudioEngine) {
        for command in self.commands.try_iter() {
            let applied = match command {
                Command::AddNode {
                    id,
                    parent,
                    name,
                    kind,
                } => engine.tree_mut().insert(id, parent, name, kind),
                Command::RemoveNode(id) => engine.remove_node(id).map(|_| ()),
                Command::SetParent { id, parent } => engine.tree_mut().set_parent(id, parent),
                Command::Connect(connection) => {
                    engine.connections_mut().connect(connection).map(|_| ())
                }
                Command::Disconnect(connection) => {
                    engine.connections_mut().disconnect(&connection);
                    Ok(())
                }
            };
            if let Err(e) = applied {
                tracing::warn!(error = %e, "live edit rejected by the worker");
            }
        }
    }

    /// Renders one block. Returns `false` if no block was queued.
    fn render(&mut self, engine: &mut AudioEngine) -> bool {
        let Some(mut block) = self.playback.acquire() else {
            return false;
        };
        let captured = self.capture.receive();
        let input: &[f32] = captured.as_deref().unwrap_or(&self.silence);
        let result = engine.process(input, &mut block);
        if let Some(captured) = captured {
            let _ = self.capture.release(captured);
        }

        if let Err(e) = result {
            self.shared.failed_blocks.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, position = engine.sample_position(), "block skipped");
            self.playback.give_back(block);
            return false;
        }
        match self.playback.send(block) {
            Ok(()) => {
                self.shared.blocks_rendered.fetch_add(1, Ordering::Release);
                true
            }
            Err(block) => {
                self.playback.give_back(block);
                false
            }
        }
    }

    fn report_xruns(&mut self) {
        let underruns = self.shared.underruns.load(Ordering::Relaxed);
        let overruns = self.shared.overruns.load(Ordering::Relaxed);
        let (seen_under, seen_over) = self.reported;
        if underruns != seen_under {
            tracing::warn!(new = underruns - seen_under, total = underruns, "output underrun");
        }
        if overruns != seen_over {
            tracing::warn!(new = overruns - seen_over, total = overruns, "input overrun");
        }
        self.reported = (underruns, overruns);
    }
}

/// Device-side half of the live engine. Runs on the driver's real-time
/// thread: no locks, no allocation, no logging.
struct Thunk {
    shared: Arc<Shared>,
    worker: Thread,
    layout: SampleLayout,
    frames_per_block: usize,
    in_channels: usize,
    out_channels: usize,
    capture: BlockSender,
    capture_block: Option<Block>,
    capture_frame: usize,
    playback: BlockReceiver,
    playback_block: Option<Block>,
    playback_frame: usize,
}

impl Thunk {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        self.shared.callbacks.fetch_add(1, Ordering::Relaxed);
        // input arriving during a pause is discarded
        if self.shared.paused.load(Ordering::Acquire) {
            output.fill(0.0);
        } else {
            if self.in_channels > 0 {
                self.capture(input);
            }
            self.play(output);
        }
        self.worker.unpark();
    }

    fn capture(&mut self, input: &[f32]) {
        let channels = self.in_channels;
        let frames = input.len() / channels;
        let mut frame = 0;
        while frame < frames {
            if self.capture_block.is_none() {
                match self.capture.acquire() {
                    Some(block) => {
                        self.capture_block = Some(block);
                        self.capture_frame = 0;
                    }
                    None => {
                        self.shared.overruns.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            }
            let Some(block) = self.capture_block.as_mut() else {
                return;
            };

            let n = (frames - frame).min(self.frames_per_block - self.capture_frame);
            write_frames(
                block,
                self.layout,
                channels,
                self.frames_per_block,
                self.capture_frame,
                &input[frame * channels..(frame + n) * channels],
            );
            frame += n;
            self.capture_frame += n;

            if self.capture_frame == self.frames_per_block
                && let Some(block) = self.capture_block.take()
                && let Err(block) = self.capture.send(block)
            {
                self.shared.overruns.fetch_add(1, Ordering::Relaxed);
                self.capture.give_back(block);
            }
        }
    }

    fn play(&mut self, output: &mut [f32]) {
        let channels = self.out_channels;
        if channels == 0 {
            while let Some(block) = self.playback.receive() {
                let _ = self.playback.release(block);
                self.shared.blocks_played.fetch_add(1, Ordering::Release);
            }
            return;
        }

        let frames = output.len() / channels;
        let mut frame = 0;
        while frame < frames {
            if self.playback_block.is_none() {
                match self.playback.receive() {
                    Some(block) => {
                        self.playback_block = Some(block);
                        self.playback_frame = 0;
                        self.shared.blocks_played.fetch_add(1, Ordering::Release);
                    }
                    None => {
                        output[frame * channels..].fill(0.0);
                        self.shared.underruns.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            }
            let Some(block) = self.playback_block.as_ref() else {
                return;
            };

            let n = (frames - frame).min(self.frames_per_block - self.playback_frame);
            read_frames(
                block,
                self.layout,
                channels,
                self.frames_per_block,
                self.playback_frame,
                &mut output[frame * channels..(frame + n) * channels],
            );
            frame += n;
            self.playback_frame += n;

            if self.playback_frame == self.frames_per_block
                && let Some(block) = self.playback_block.take()
            {
                let _ = self.playback.release(block);
            }
        }
        output[frames * channels..].fill(0.0);
    }
}

/// Copies interleaved `frames` into `block` starting at frame `at`.
fn write_frames(
    block: &mut [f32],
    layout: SampleLayout,
    channels: usize,
    block_frames: usize,
    at: usize,
    frames: &[f32],
) {
    match layout {
        SampleLayout::Interleaved => {
            let start = at * channels;
            block[start..start + frames.len()].copy_from_slice(frames);
        }
        SampleLayout::Planar => {
            for (i, frame) in frames.chunks_exact(channels).enumerate() {
                for (ch, &sample) in frame.iter().enumerate() {
                    block[ch * block_frames + at + i] = sample;
                }
            }
        }
    }
}

/// Copies frames from `block`, starting at frame `at`, into interleaved
/// `frames`.
fn read_frames(
    block: &[f32],
    layout: SampleLayout,
    channels: usize,
    block_frames: usize,
    at: usize,
    frames: &mut [f32],
) {
    match layout {
        SampleLayout::Interleaved => {
            let start = at * channels;
            frames.copy_from_slice(&block[start..start + frames.len()]);
        }
        SampleLayout::Planar => {
            for (i, frame) in frames.chunks_exact_mut(channels).enumerate() {
                for (ch, sample) in frame.iter_mut().enumerate() {
                    *sample = block[ch * block_frames + at + i];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thunk(frames_per_block: usize, channels: usize, layout: SampleLayout) -> (Thunk, BlockSender) {
        let (playback_tx, playback_rx) = block_channel(4, frames_per_block * channels);
        let (capture_tx, _capture_rx) = block_channel(4, frames_per_block * channels);
        let thunk = Thunk {
            shared: Arc::new(Shared::default()),
            worker: thread::current(),
            layout,
            frames_per_block,
            in_channels: 0,
            out_channels: channels,
            capture: capture_tx,
            capture_block: None,
            capture_frame: 0,
            playback: playback_rx,
            playback_block: None,
            playback_frame: 0,
        };
        (thunk, playback_tx)
    }

    fn queue_block(tx: &mut BlockSender, samples: &[f32]) {
        let mut block = tx.acquire().unwrap();
        block.copy_from_slice(samples);
        tx.send(block).unwrap();
    }

    #[test]
    fn test_empty_queue_plays_silence() {
        let (mut thunk, _tx) = thunk(4, 1, SampleLayout::Interleaved);
        let mut out = [1.0; 4];
        thunk.process(&[], &mut out);
        assert_eq!(out, [0.0; 4]);
        let stats = thunk.shared.stats();
        assert_eq!(stats.underruns, 1);
        assert_eq!(stats.callbacks, 1);
    }

    #[test]
    fn test_callback_smaller_than_block() {
        let (mut thunk, mut tx) = thunk(4, 1, SampleLayout::Interleaved);
        queue_block(&mut tx, &[1.0, 2.0, 3.0, 4.0]);
        queue_block(&mut tx, &[5.0, 6.0, 7.0, 8.0]);

        let mut out = [0.0; 3];
        thunk.process(&[], &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        thunk.process(&[], &mut out);
        assert_eq!(out, [4.0, 5.0, 6.0]);
        assert_eq!(thunk.shared.stats().blocks_played, 2);

        // two frames left, then the queue runs dry
        thunk.process(&[], &mut out);
        assert_eq!(out, [7.0, 8.0, 0.0]);
        assert_eq!(thunk.shared.stats().underruns, 1);
    }

    #[test]
    fn test_planar_blocks_are_interleaved_for_the_device() {
        let (mut thunk, mut tx) = thunk(2, 2, SampleLayout::Planar);
        // left [1, 2], right [10, 20]
        queue_block(&mut tx, &[1.0, 2.0, 10.0, 20.0]);
        let mut out = [0.0; 4];
        thunk.process(&[], &mut out);
        assert_eq!(out, [1.0, 10.0, 2.0, 20.0]);
    }

    #[test]
    fn test_paused_thunk_outputs_silence_without_consuming() {
        let (mut thunk, mut tx) = thunk(2, 1, SampleLayout::Interleaved);
        queue_block(&mut tx, &[0.5, 0.5]);
        thunk.shared.paused.store(true, Ordering::Release);
        let mut out = [1.0; 2];
        thunk.process(&[], &mut out);
        assert_eq!(out, [0.0; 2]);
        assert_eq!(tx.queued(), 1);
        assert_eq!(thunk.shared.stats().underruns, 0);
    }

    #[test]
    fn test_capture_assembles_blocks() {
        let (capture_tx, mut capture_rx) = block_channel(2, 4);
        let (_playback_tx, playback_rx) = block_channel(2, 0);
        let mut thunk = Thunk {
            shared: Arc::new(Shared::default()),
            worker: thread::current(),
            layout: SampleLayout::Planar,
            frames_per_block: 2,
            in_channels: 2,
            out_channels: 0,
            capture: capture_tx,
            capture_block: None,
            capture_frame: 0,
            playback: playback_rx,
            playback_block: None,
            playback_frame: 0,
        };
        // one frame per callback: [L, R]
        thunk.process(&[1.0, 10.0], &mut []);
        assert!(capture_rx.receive().is_none());
        thunk.process(&[2.0, 20.0], &mut []);
        let block = capture_rx.receive().unwrap();
        assert_eq!(&block[..], &[1.0, 2.0, 10.0, 20.0]);
    }

    #[test]
    fn test_capture_overrun_when_worker_falls_behind() {
        let (capture_tx, _capture_rx) = block_channel(1, 1);
        let (_playback_tx, playback_rx) = block_channel(1, 0);
        let mut thunk = Thunk {
            shared: Arc::new(Shared::default()),
            worker: thread::current(),
            layout: SampleLayout::Interleaved,
            frames_per_block: 1,
            in_channels: 1,
            out_channels: 0,
            capture: capture_tx,
            capture_block: None,
            capture_frame: 0,
            playback: playback_rx,
            playback_block: None,
            playback_frame: 0,
        };
        thunk.process(&[0.1], &mut []);
        thunk.process(&[0.2], &mut []);
        assert_eq!(thunk.shared.stats().overruns, 1);
    }

    #[test]
    fn test_paused_thunk_discards_capture() {
        let (capture_tx, capture_rx) = block_channel(1, 1);
        let (_playback_tx, playback_rx) = block_channel(1, 0);
        let mut thunk = Thunk {
            shared: Arc::new(Shared::default()),
            worker: thread::current(),
            layout: SampleLayout::Interleaved,
            frames_per_block: 1,
            in_channels: 1,
            out_channels: 0,
            capture: capture_tx,
            capture_block: None,
            capture_frame: 0,
            playback: playback_rx,
            playback_block: None,
            playback_frame: 0,
        };
        thunk.shared.paused.store(true, Ordering::Release);
        for _ in 0..10 {
            thunk.process(&[0.3], &mut []);
        }
        let stats = thunk.shared.stats();
        assert_eq!(stats.callbacks, 10);
        assert_eq!(stats.overruns, 0);
        assert_eq!(capture_rx.queued(), 0);

        thunk.shared.paused.store(false, Ordering::Release);
        thunk.process(&[0.4], &mut []);
        assert_eq!(capture_rx.queued(), 1);
        assert_eq!(thunk.shared.stats().overruns, 0);
    }

    #[test]
    fn test_mirror_rejects_reparenting_under_descendant() {
        let mut engine = AudioEngine::new(Configuration::new(48000, 4, 0, 1));
        let a = engine.add_node(None, "a", NodeKind::SystemOutput).unwrap();
        let b = engine.add_node(Some(a), "b", NodeKind::SystemOutput).unwrap();
        let mut mirror = Mirror::of(&engine);

        assert!(matches!(
            mirror.set_parent(a, Some(b)),
            Err(GraphError::InvalidParent { .. })
        ));
        let c = mirror.add(Some(b)).unwrap();
        assert_eq!(c, engine.tree().next_id());
        assert_eq!(mirror.remove(a).unwrap().len(), 3);
        assert!(!mirror.contains(c));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EngineState::Paused.to_string(), "paused");
    }
}
