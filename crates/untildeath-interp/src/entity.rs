//! The entity model: a single `Entity` struct over a `kind`-tagged enum,
//! generalizing the one-subclass-per-kind shape of the entity it's grounded
//! on into a sum type, since Rust has no subclassing.

use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::process::Stdio;
use std::rc::Rc;
use tokio::io::AsyncReadExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use untildeath_core::value::Value;

use crate::scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    And,
    Or,
    Not,
}

pub enum EntityKind {
    This,
    Timer { duration_ms: i64 },
    Process { command: String, args: Vec<String> },
    Connection { host: String, port: i64 },
    Watcher {
        path: String,
        exports: RefCell<IndexMap<String, Value>>,
        is_module: Cell<bool>,
    },
    Branch,
    Composite {
        op: CompositeOp,
        children: Vec<Rc<Entity>>,
    },
}

/// A single death-signalling primitive. `alive` is monotonic: once false,
/// never true again.
pub struct Entity {
    pub name: String,
    alive: Cell<bool>,
    death: Notify,
    died_once: Cell<bool>,
    pub kind: EntityKind,
    task: RefCell<Option<JoinHandle<()>>>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Rc<Entity> {
        Rc::new(Entity {
            name: name.into(),
            alive: Cell::new(true),
            death: Notify::new(),
            died_once: Cell::new(false),
            kind,
            task: RefCell::new(None),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub fn is_dead(&self) -> bool {
        !self.alive.get()
    }

    pub fn set_task(&self, handle: JoinHandle<()>) {
        *self.task.borrow_mut() = Some(handle);
    }

    /// Idempotent: sets `alive=false`, wakes every waiter, and aborts the
    /// lifecycle task if still running.
    pub fn die(&self) {
        if self.alive.get() {
            self.alive.set(false);
            self.died_once.set(true);
            self.death.notify_waiters();
            if let Some(handle) = self.task.borrow().as_ref() {
                handle.abort();
            }
        }
    }

    pub async fn wait_for_death(self: &Rc<Self>) {
        if self.is_dead() {
            return;
        }
        let notified = self.death.notified();
        if self.is_dead() {
            return;
        }
        notified.await;
    }
}

/// Runs an entity's kind-specific lifecycle coroutine to completion (or
/// until cancelled by `die()`'s `JoinHandle::abort`).
pub async fn run_lifecycle(entity: Rc<Entity>) {
    match &entity.kind {
        EntityKind::This => {}
        EntityKind::Timer { duration_ms } => {
            scheduler::sleep_ms((*duration_ms).max(0) as u64).await;
            entity.die();
        }
        EntityKind::Process { command, args } => {
            let spawned = tokio::process::Command::new(command)
                .args(args)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
            match spawned {
                Ok(mut child) => {
                    let _ = child.wait().await;
                    entity.die();
                }
                Err(_) => entity.die(),
            }
        }
        EntityKind::Connection { host, port } => {
            match tokio::net::TcpStream::connect((host.as_str(), *port as u16)).await {
                Ok(mut stream) => {
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => continue,
                        }
                    }
                    entity.die();
                }
                Err(_) => entity.die(),
            }
        }
        EntityKind::Watcher { path, .. } => {
            if !std::path::Path::new(path).exists() {
                scheduler::yield_now().await;
                entity.die();
                return;
            }
            while std::path::Path::new(path).exists() {
                scheduler::sleep_ms(100).await;
            }
            entity.die();
        }
        EntityKind::Branch => {}
        EntityKind::Composite { op, children } => match op {
            CompositeOp::And => {
                for child in children {
                    child.wait_for_death().await;
                }
                entity.die();
            }
            CompositeOp::Or => {
                // The parser only ever builds binary Or nodes (see
                // `EntityExpr::Or` in untildeath-core), so a plain two-arm
                // select covers every composite this crate constructs.
                tokio::select! {
                    _ = children[0].wait_for_death() => {}
                    _ = children[1].wait_for_death() => {}
                }
                entity.die();
            }
            CompositeOp::Not => {
                scheduler::yield_now().await;
                entity.die();
            }
        },
    }
}
