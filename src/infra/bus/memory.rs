//! In-process bus with a single event-loop thread.
//!
//! Every handler invocation and every reply callback runs on the loop thread,
//! in submission order. A handler that blocks therefore stalls the whole bus,
//! which is why request senders that must not be starved (the admission
//! bridge) send from their own worker threads and only wait on the reply.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::core::{BusError, HandlerId, Message, MessageBus, MessageHandler, ReplyCallback};

enum Job {
    Deliver {
        handler: Arc<dyn MessageHandler>,
        message: Message,
    },
    Reply {
        callback: ReplyCallback,
        body: Value,
    },
    Shutdown,
}

type Registrations = HashMap<String, Vec<(HandlerId, Arc<dyn MessageHandler>)>>;

/// Single-process [`MessageBus`].
pub struct LocalBus {
    handlers: RwLock<Registrations>,
    jobs: Sender<Job>,
    closed: AtomicBool,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
    loop_thread_id: ThreadId,
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("addresses", &self.handlers.read().len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LocalBus {
    /// Start the event loop.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Start`] if the loop thread cannot be spawned.
    pub fn new() -> Result<Self, BusError> {
        let (jobs, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("local-bus".into())
            .spawn(move || run_loop(&rx))
            .map_err(|e| BusError::Start(e.to_string()))?;
        let loop_thread_id = handle.thread().id();
        info!("local bus started");
        Ok(Self {
            handlers: RwLock::new(HashMap::new()),
            jobs,
            closed: AtomicBool::new(false),
            loop_thread: Mutex::new(Some(handle)),
            loop_thread_id,
        })
    }

    /// Number of handlers registered at `address`.
    #[must_use]
    pub fn handler_count(&self, address: &str) -> usize {
        self.handlers.read().get(address).map_or(0, Vec::len)
    }

    /// Whether [`LocalBus::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drain already-queued jobs, stop the loop and join it.
    ///
    /// Called from a handler (on the loop thread) it stops the loop without
    /// joining.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.jobs.send(Job::Shutdown);
        if thread::current().id() == self.loop_thread_id {
            return;
        }
        if let Some(handle) = self.loop_thread.lock().take() {
            if handle.join().is_err() {
                error!("local bus loop panicked");
            }
        }
        info!("local bus closed");
    }

    fn enqueue(&self, handler: Arc<dyn MessageHandler>, message: Message) -> Result<(), BusError> {
        self.jobs
            .send(Job::Deliver { handler, message })
            .map_err(|_| BusError::Closed)
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, address: &str, body: Value) -> Result<(), BusError> {
        self.ensure_open()?;
        let targets: Vec<Arc<dyn MessageHandler>> = self
            .handlers
            .read()
            .get(address)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        if targets.is_empty() {
            debug!(address, "publish with no subscribers");
        }
        for handler in targets {
            self.enqueue(handler, Message::new(address, body.clone(), None))?;
        }
        Ok(())
    }

    fn send(&self, address: &str, body: Value, on_reply: ReplyCallback) -> Result<(), BusError> {
        self.ensure_open()?;
        let target = self
            .handlers
            .read()
            .get(address)
            .and_then(|list| list.first().map(|(_, h)| Arc::clone(h)))
            .ok_or_else(|| BusError::NoHandlers(address.to_string()))?;

        // Route the reply back through the loop so callbacks never run on
        // the replying handler's thread.
        let jobs = self.jobs.clone();
        let reply_to: ReplyCallback = Box::new(move |reply: Value| {
            if jobs
                .send(Job::Reply {
                    callback: on_reply,
                    body: reply,
                })
                .is_err()
            {
                debug!("bus closed before reply could be delivered");
            }
        });
        self.enqueue(target, Message::new(address, body, Some(reply_to)))
    }

    fn register_handler(&self, address: &str, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = HandlerId::generate(address);
        self.handlers
            .write()
            .entry(address.to_string())
            .or_default()
            .push((id.clone(), handler));
        debug!(address, handler_id = %id, "handler registered");
        id
    }

    fn unregister_handler(&self, id: &HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let mut removed = false;
        handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(existing, _)| existing != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        if removed {
            debug!(handler_id = %id, "handler unregistered");
        }
        removed
    }
}

impl Drop for LocalBus {
    fn drop(&mut self) {
        // Signal only; joining belongs to an explicit close().
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.jobs.send(Job::Shutdown);
        }
    }
}

fn run_loop(rx: &Receiver<Job>) {
    debug!("bus loop running");
    for job in rx {
        let outcome = match job {
            Job::Deliver { handler, message } => {
                let address = message.address().to_string();
                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message)))
                    .map_err(|_| address)
            }
            Job::Reply { callback, body } => {
                panic::catch_unwind(AssertUnwindSafe(|| callback(body)))
                    .map_err(|_| "reply callback".to_string())
            }
            Job::Shutdown => break,
        };
        if let Err(origin) = outcome {
            error!(origin = %origin, "bus handler panicked");
        }
    }
    debug!("bus loop exiting");
}
