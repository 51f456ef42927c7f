//! Runtime context shared by every container of one application.
//!
//! Holds what used to be process globals: the container id allocator, the
//! process-wide change notifier and the command line arguments that
//! property declarations consume.

use crate::config::RuntimeConfig;
use crate::notify::{ChangeEvent, Notifier};
use crate::property::id::{ContainerId, IdAllocator, LinkId};
use crate::sync::lock;
use std::sync::{Arc, Mutex, MutexGuard};

/// Command line arguments and which of them were consumed.
#[derive(Debug, Default)]
pub struct ArgumentSet {
    args: Vec<String>,
    used: Vec<bool>,
    help: bool,
}

impl ArgumentSet {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut used = vec![false; args.len()];
        let mut help = false;
        for (i, arg) in args.iter().enumerate() {
            if arg == "--help" {
                help = true;
                used[i] = true;
            }
        }
        Self { args, used, help }
    }

    pub fn help_requested(&self) -> bool {
        self.help
    }

    /// Find the value given for `property` of the container `container`.
    ///
    /// Both `--property=value` and `--container:property=value` match. Every
    /// matching argument is marked used; the last one wins.
    pub fn take_value(&mut self, container: &str, property: &str) -> Option<String> {
        let plain = format!("--{}=", property);
        let qualified = format!("--{}:{}=", container, property);
        let mut found = None;
        for (i, arg) in self.args.iter().enumerate() {
            let value = arg
                .strip_prefix(&qualified)
                .or_else(|| arg.strip_prefix(&plain));
            if let Some(value) = value {
                self.used[i] = true;
                found = Some(value.to_string());
            }
        }
        found
    }

    /// Arguments nobody consumed, in command line order
    pub fn unused(&self) -> Vec<String> {
        self.args
            .iter()
            .zip(&self.used)
            .filter(|(_, used)| !**used)
            .map(|(arg, _)| arg.clone())
            .collect()
    }
}

/// Shared state of one runtime instance
pub struct RuntimeContext {
    ids: IdAllocator,
    link_ids: IdAllocator,
    notifier: Notifier<ChangeEvent>,
    arguments: Mutex<ArgumentSet>,
    /// Held while a synchronous or sequential link is checked and inserted
    linking: Mutex<()>,
    config: RuntimeConfig,
}

impl RuntimeContext {
    pub fn new(arguments: ArgumentSet, config: RuntimeConfig) -> Arc<Self> {
        Arc::new(Self {
            ids: IdAllocator::new(),
            link_ids: IdAllocator::new(),
            notifier: Notifier::new(),
            arguments: Mutex::new(arguments),
            linking: Mutex::new(()),
            config,
        })
    }

    /// Context without command line arguments, with default tuning
    pub fn standalone() -> Arc<Self> {
        Self::new(ArgumentSet::default(), RuntimeConfig::default())
    }

    pub(crate) fn next_container_id(&self) -> ContainerId {
        ContainerId(self.ids.next())
    }

    pub(crate) fn next_link_id(&self) -> LinkId {
        LinkId(self.link_ids.next())
    }

    /// Serializes group-changing links. Taken before any container lock.
    pub(crate) fn lock_linking(&self) -> MutexGuard<'_, ()> {
        lock(&self.linking)
    }

    /// Process-wide notifier receiving the events of every container
    pub fn notifier(&self) -> &Notifier<ChangeEvent> {
        &self.notifier
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn help_requested(&self) -> bool {
        lock(&self.arguments).help_requested()
    }

    pub(crate) fn take_argument(&self, container: &str, property: &str) -> Option<String> {
        lock(&self.arguments).take_value(container, property)
    }

    pub fn unused_arguments(&self) -> Vec<String> {
        lock(&self.arguments).unused()
    }
}
