//! Application orchestrator.
//!
//! The [`Application`] owns the runtime context and the registry of live
//! containers. It processes the command line, starts every sequential
//! group master on its own thread and shuts everything down again:
//!
//! 1. `finish()` on every block
//! 2. wait for every block thread, deregistering each
//!
//! The passes stay separate: a block blocked in a hand-off can only see its
//! finish request if nobody is joining it yet.

pub mod snapshot;

pub use snapshot::{ContainerSnapshot, PropertySnapshot, TopologySnapshot};

use crate::block::unit::ThreadExit;
use crate::block::{Block, BlockHandle, BlockStatus, ExecutionUnit};
use crate::config::RuntimeConfig;
use crate::context::{ArgumentSet, RuntimeContext};
use crate::error::{BlockError, BlockFlowError, Result, ResultExt};
use crate::property::id::ContainerId;
use crate::property::{PropertyContainer, Role};
use crate::sync::{lock, wait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// Exit status of a run without failures
pub const EXIT_OK: u8 = 0;
/// Exit status when a block failed
pub const EXIT_BLOCK_FAILED: u8 = 1;
/// Exit status when startup was aborted
pub const EXIT_STARTUP_FAILED: u8 = 2;

/// Pre-start setup of a non-block container (display surfaces, cameras).
#[cfg_attr(test, mockall::automock)]
pub trait Initializer: Send {
    /// Called by `start_items` before any thread is spawned
    fn initialize(&mut self, container: &PropertyContainer) -> Result<()>;

    /// Called by `quit_items` after every block thread returned
    fn shutdown(&mut self, container: &PropertyContainer);
}

/// Outcome of command line processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arguments {
    Run,
    /// `--help` was given; carries the usage text
    Help(String),
}

struct InitializerSlot {
    container: PropertyContainer,
    role: Role,
    initializer: Box<dyn Initializer>,
    initialized: bool,
}

#[derive(Default)]
struct Registry {
    containers: Vec<PropertyContainer>,
    initializers: Vec<InitializerSlot>,
}

#[derive(Default)]
struct RunState {
    active_blocks: usize,
    quit_requested: bool,
    failures: Vec<(ContainerId, BlockError)>,
}

struct Shared {
    state: Mutex<RunState>,
    cond: Condvar,
    terminate_on_last_block: AtomicBool,
}

impl Shared {
    fn request_quit(&self) {
        lock(&self.state).quit_requested = true;
        self.cond.notify_all();
    }

    fn block_finished(&self, exit: ThreadExit) {
        let mut state = lock(&self.state);
        state.active_blocks = state.active_blocks.saturating_sub(1);
        state.failures.extend(exit.failures);
        tracing::debug!(
            "Block thread of {} returned, {} still active",
            exit.master,
            state.active_blocks
        );
        if state.active_blocks == 0 && self.terminate_on_last_block.load(Ordering::Acquire) {
            tracing::info!("Last block finished, requesting shutdown");
            state.quit_requested = true;
        }
        drop(state);
        self.cond.notify_all();
    }
}

/// Cloneable handle that can end [`Application::exec`] from any thread
#[derive(Clone)]
pub struct QuitHandle {
    shared: Arc<Shared>,
}

impl QuitHandle {
    pub fn request_quit(&self) {
        self.shared.request_quit();
    }
}

/// Registry and lifecycle driver of one block program
pub struct Application {
    ctx: Arc<RuntimeContext>,
    info: String,
    registry: Mutex<Registry>,
    shared: Arc<Shared>,
}

impl Application {
    /// Create an application with default tuning.
    ///
    /// `args` excludes the program name. `info` heads the `--help` output.
    pub fn new<I, S>(args: I, info: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(args, info, RuntimeConfig::default())
    }

    pub fn with_config<I, S>(args: I, info: impl Into<String>, config: RuntimeConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terminate = config.terminate_on_last_block;
        Self {
            ctx: RuntimeContext::new(ArgumentSet::new(args), config),
            info: info.into(),
            registry: Mutex::new(Registry::default()),
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::default()),
                cond: Condvar::new(),
                terminate_on_last_block: AtomicBool::new(terminate),
            }),
        }
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.ctx.config()
    }

    // ── Registry ──

    /// Create and register a plain container
    pub fn create_container(&self, name: impl Into<String>) -> PropertyContainer {
        let container = PropertyContainer::new(&self.ctx, name);
        self.register_container(&container);
        container
    }

    /// Create a container, attach `block` to it and register it
    pub fn create_block(&self, name: impl Into<String>, block: impl Block) -> Result<BlockHandle> {
        let name = name.into();
        let container = PropertyContainer::new(&self.ctx, name.clone());
        let handle = BlockHandle::attach(container, block)
            .with_context(|| format!("Failed to create block '{}'", name))?;
        self.register_container(&handle);
        Ok(handle)
    }

    /// Register a container. Returns `false` when it was already registered.
    pub fn register_container(&self, container: &PropertyContainer) -> bool {
        let mut registry = lock(&self.registry);
        if registry.containers.iter().any(|c| c.id() == container.id()) {
            return false;
        }
        registry.containers.push(container.clone());
        true
    }

    /// Deregister a container. Returns `false` when it was not registered.
    pub fn deregister_container(&self, container: &PropertyContainer) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.containers.len();
        registry.containers.retain(|c| c.id() != container.id());
        registry.containers.len() != before
    }

    pub fn is_registered(&self, container: &PropertyContainer) -> bool {
        lock(&self.registry)
            .containers
            .iter()
            .any(|c| c.id() == container.id())
    }

    /// Registered containers in registration order
    pub fn containers(&self) -> Vec<PropertyContainer> {
        lock(&self.registry).containers.clone()
    }

    fn units(&self) -> Vec<(PropertyContainer, Arc<ExecutionUnit>)> {
        self.containers()
            .into_iter()
            .filter_map(|c| c.execution_unit().map(|u| (c, u)))
            .collect()
    }

    /// Register `container` with a pre-start initializer for `role`
    pub fn register_initializer(
        &self,
        container: &PropertyContainer,
        role: Role,
        initializer: Box<dyn Initializer>,
    ) {
        container.add_role(role);
        self.register_container(container);
        lock(&self.registry).initializers.push(InitializerSlot {
            container: container.clone(),
            role,
            initializer,
            initialized: false,
        });
    }

    // ── Startup ──

    /// Check the command line against the registered containers.
    ///
    /// Unknown arguments are reported before container initialization
    /// errors.
    pub fn process_arguments(&self) -> Result<Arguments> {
        let containers = self.containers();
        if self.ctx.help_requested() {
            let mut text = self.info.clone();
            for container in &containers {
                let help = container.help_text();
                if help.is_empty() {
                    continue;
                }
                text.push_str(&format!(
                    "\nInput parameters for {}:\n{}",
                    container.name(),
                    help
                ));
            }
            return Ok(Arguments::Help(text));
        }

        let unused = self.ctx.unused_arguments();
        if !unused.is_empty() {
            return Err(BlockFlowError::UnknownArguments(unused));
        }

        for container in &containers {
            if let Some(error) = container.init_error() {
                return Err(BlockFlowError::Startup(format!(
                    "container '{}': {}",
                    container.name(),
                    error
                )));
            }
        }
        Ok(Arguments::Run)
    }

    /// Run initializers, then start every sequential group master.
    ///
    /// An initializer failure aborts before any thread is spawned.
    pub fn start_items(&self) -> Result<()> {
        {
            let mut registry = lock(&self.registry);
            for slot in registry.initializers.iter_mut().filter(|s| !s.initialized) {
                slot.initializer
                    .initialize(&slot.container)
                    .with_context(|| {
                        format!(
                            "Failed to initialize {:?} '{}'",
                            slot.role,
                            slot.container.name()
                        )
                    })?;
                slot.initialized = true;
            }
        }

        let masters: Vec<(PropertyContainer, Arc<ExecutionUnit>)> = self
            .units()
            .into_iter()
            .filter(|(_, unit)| unit.status() == BlockStatus::Stopped && unit.is_sequential_group_master())
            .collect();

        // Every master counts before the first thread runs, so an early exit
        // cannot bring the count to zero while later masters are pending.
        lock(&self.shared.state).active_blocks += masters.len();
        for (index, (container, unit)) in masters.iter().enumerate() {
            let shared = Arc::clone(&self.shared);
            unit.set_exit_hook(Box::new(move |exit| shared.block_finished(exit)));
            if let Err(e) = unit.start() {
                let never_started = masters.len() - index;
                let mut state = lock(&self.shared.state);
                state.active_blocks = state.active_blocks.saturating_sub(never_started);
                return Err(e.with_context(format!("Failed to start block '{}'", container.name())));
            }
        }

        tracing::info!("Started {} block thread(s)", masters.len());
        if masters.is_empty() && self.shared.terminate_on_last_block.load(Ordering::Acquire) {
            tracing::info!("No blocks to run, requesting shutdown");
            self.shared.request_quit();
        }
        Ok(())
    }

    // ── Shutdown ──

    /// Finish every block, then join and deregister each, then shut the
    /// initializers down.
    pub fn quit_items(&self) {
        let units = self.units();

        for (_, unit) in &units {
            unit.finish();
        }

        let poll = self.config().shutdown_poll();
        let timeout = self.config().shutdown_timeout();
        for (container, unit) in &units {
            let waiting_since = Instant::now();
            loop {
                if unit.wait_timeout(poll) {
                    break;
                }
                if let Some(timeout) = timeout {
                    if waiting_since.elapsed() >= timeout {
                        tracing::warn!(
                            "Block '{}' did not finish within {:?}, continuing shutdown",
                            container.name(),
                            timeout
                        );
                        break;
                    }
                }
            }
            self.deregister_container(container);
        }

        let slots = std::mem::take(&mut lock(&self.registry).initializers);
        for mut slot in slots {
            if slot.initialized {
                slot.initializer.shutdown(&slot.container);
            }
        }
        tracing::info!("All blocks finished");
    }

    /// Finish, join and deregister one block
    pub fn quit_block(&self, block: &BlockHandle) {
        block.finish();
        block.wait();
        self.deregister_container(block);
    }

    // ── Run control ──

    pub fn set_terminate_on_last_block(&self, terminate: bool) {
        self.shared
            .terminate_on_last_block
            .store(terminate, Ordering::Release);
    }

    pub fn request_quit(&self) {
        self.shared.request_quit();
    }

    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_quit_requested(&self) -> bool {
        lock(&self.shared.state).quit_requested
    }

    /// Number of block threads that have not returned yet
    pub fn active_blocks(&self) -> usize {
        lock(&self.shared.state).active_blocks
    }

    /// Blocks whose iteration failed, in failure order
    pub fn block_failures(&self) -> Vec<BlockFlowError> {
        lock(&self.shared.state)
            .failures
            .iter()
            .map(|(container, source)| BlockFlowError::BlockIteration {
                container: *container,
                source: source.clone(),
            })
            .collect()
    }

    fn wait_for_quit(&self) {
        let mut state = lock(&self.shared.state);
        while !state.quit_requested {
            state = wait(&self.shared.cond, state);
        }
    }

    /// Process arguments, start, wait for a quit request, shut down.
    ///
    /// Returns the process exit status.
    pub fn exec(&self) -> u8 {
        match self.process_arguments() {
            Ok(Arguments::Help(text)) => {
                println!("{}", text);
                return EXIT_OK;
            }
            Ok(Arguments::Run) => {}
            Err(e) => {
                tracing::error!("{}", e);
                eprintln!("{}", e);
                return EXIT_STARTUP_FAILED;
            }
        }

        if let Err(e) = self.start_items() {
            tracing::error!("Startup aborted: {}", e);
            self.quit_items();
            return EXIT_STARTUP_FAILED;
        }

        self.wait_for_quit();
        self.quit_items();

        let failures = self.block_failures();
        if failures.is_empty() {
            EXIT_OK
        } else {
            for failure in &failures {
                tracing::error!("{}", failure);
            }
            EXIT_BLOCK_FAILED
        }
    }

    /// Snapshot of the registered containers and their links
    pub fn topology(&self) -> TopologySnapshot {
        TopologySnapshot::capture(&self.containers())
    }
}
