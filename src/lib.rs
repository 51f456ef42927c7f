//! # blockflow: threaded block-programming runtime
//!
//! Programs are graphs of processing blocks that exchange typed values
//! through named properties. Each block runs on its own thread unless it is
//! tied to other blocks by sequential links, in which case the group shares
//! the thread of its master.
//!
//! ## Architecture
//!
//! - **Property store** ([`PropertyContainer`]): typed, ordered, named
//!   properties with direction, range and flags
//! - **Links** ([`LinkDiscipline`]): asynchronous (latest value wins),
//!   synchronous (lossless hand-off) and sequential (lock-step group)
//! - **Change notifier** ([`notify`]): crossbeam queues of structural and
//!   value events for GUIs and inspectors
//! - **Execution engine** ([`block`]): lifecycle state machine and worker
//!   loop of every [`Block`]
//! - **Orchestrator** ([`Application`]): registry, argument processing,
//!   startup and two-pass shutdown
//!
//! ## Configuration
//!
//! Runtime tuning is read from `blockflow.toml` in the platform config
//! directory under `dev.blockflow.runtime`, or from the file named by
//! `BLOCKFLOW_CONFIG`.
//!
//! ## Example
//!
//! ```no_run
//! use blockflow::blocks::{CollectorBlock, CounterBlock};
//! use blockflow::{Application, LinkDiscipline};
//!
//! let app = Application::new(std::env::args().skip(1), "Counter demo");
//! let counter = app.create_block("counter", CounterBlock::new()).unwrap();
//! let (sink, collected) = CollectorBlock::new(0i32);
//! let sink = app.create_block("sink", sink).unwrap();
//! counter
//!     .link_property("x", &sink, "in", LinkDiscipline::Synchronous)
//!     .unwrap();
//! let status = app.exec();
//! println!("{} values, exit {}", collected.len(), status);
//! ```

pub mod app;
pub mod block;
pub mod blocks;
pub mod config;
pub mod context;
pub mod error;
pub mod link;
pub mod notify;
pub mod property;
pub(crate) mod sync;
pub mod types;

// Re-export commonly used types
pub use app::{Application, Arguments, Initializer, QuitHandle, TopologySnapshot};
pub use block::{Block, BlockEvent, BlockHandle, BlockStatus, ExecutionUnit, IterationContext};
pub use config::RuntimeConfig;
pub use context::RuntimeContext;
pub use error::{BlockError, BlockFlowError, Result, ResultExt};
pub use link::{LinkDescriptor, LinkDiscipline};
pub use notify::{ChangeEvent, Notifier, Subscription};
pub use property::id::{ContainerId, LinkId};
pub use property::{Direction, PropertyContainer, PropertyFlags, Range, Role};
pub use types::{CustomValue, NumericProperty, PropertyData, TypeTag, Value, ValueKind};
