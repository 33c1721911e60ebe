//! Marshalling requests from other threads onto the control thread.
//!
//! [`ControlLoop`] owns the [`PluginRuntime`] and runs on one tokio task.
//! [`ControlHandle`]s are cheap to clone and can be sent anywhere; each
//! request is a closure executed against the runtime on the loop's task,
//! with the result sent back over a oneshot channel. The cull list is
//! flushed after every request, which is the point where no plugin code is
//! on the stack.

use modhost_core::VersionFlags;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{RuntimeError, RuntimeResult};
use crate::plugin::Plugin;
use crate::runtime::{PluginRuntime, RuntimeStats};

type Job = Box<dyn FnOnce(&mut PluginRuntime) + Send>;

enum ControlRequest {
    Run(Job),
    Shutdown(oneshot::Sender<usize>),
}

/// The task that owns the runtime.
pub struct ControlLoop {
    runtime: PluginRuntime,
    requests: mpsc::Receiver<ControlRequest>,
}

impl ControlLoop {
    /// Wraps `runtime`, sizing the request queue from its settings.
    pub fn new(runtime: PluginRuntime) -> (Self, ControlHandle) {
        let (tx, rx) = mpsc::channel(runtime.settings().control_queue.max(1));
        (
            Self {
                runtime,
                requests: rx,
            },
            ControlHandle { requests: tx },
        )
    }

    /// Spawns the loop on the current tokio runtime.
    ///
    /// The join handle yields the runtime back once the loop stops.
    pub fn spawn(runtime: PluginRuntime) -> (ControlHandle, JoinHandle<PluginRuntime>) {
        let (control, handle) = Self::new(runtime);
        (handle, tokio::spawn(control.run()))
    }

    /// Serves requests until shut down or until every handle is dropped.
    pub async fn run(mut self) -> PluginRuntime {
        info!("Control loop started");
        while let Some(request) = self.requests.recv().await {
            match request {
                ControlRequest::Run(job) => job(&mut self.runtime),
                ControlRequest::Shutdown(reply) => {
                    let remaining = self.runtime.unload_all();
                    self.runtime.flush_culls();
                    let _ = reply.send(remaining);
                    break;
                }
            }
            let culled = self.runtime.flush_culls();
            if culled > 0 {
                debug!(culled, "Flushed cull list after request");
            }
        }
        info!(plugins = self.runtime.plugin_count(), "Control loop stopped");
        self.runtime
    }
}

/// Cloneable, `Send` access to a running [`ControlLoop`].
#[derive(Clone, Debug)]
pub struct ControlHandle {
    requests: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    /// Runs `f` against the runtime on the control task and returns its result.
    pub async fn with<F, R>(&self, f: F) -> RuntimeResult<R>
    where
        F: FnOnce(&mut PluginRuntime) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |runtime| {
            let _ = tx.send(f(runtime));
        });
        self.requests
            .send(ControlRequest::Run(job))
            .await
            .map_err(|_| RuntimeError::ControlLoopClosed)?;
        rx.await.map_err(|_| RuntimeError::ControlLoopClosed)
    }

    /// Blocking form of [`with`](Self::with) for threads outside tokio.
    ///
    /// Panics if called from within an async context, like
    /// `mpsc::Sender::blocking_send`.
    pub fn blocking_with<F, R>(&self, f: F) -> RuntimeResult<R>
    where
        F: FnOnce(&mut PluginRuntime) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |runtime| {
            let _ = tx.send(f(runtime));
        });
        self.requests
            .blocking_send(ControlRequest::Run(job))
            .map_err(|_| RuntimeError::ControlLoopClosed)?;
        rx.blocking_recv().map_err(|_| RuntimeError::ControlLoopClosed)
    }

    /// Loads a plugin.
    pub async fn load(&self, name: impl Into<String>, plugin: impl Plugin) -> RuntimeResult<()> {
        let name = name.into();
        self.with(move |rt| rt.load_plugin(name, plugin).map(|_| ()))
            .await?
            .map_err(RuntimeError::from)
    }

    /// Unloads a plugin.
    pub async fn unload(&self, name: impl Into<String>) -> RuntimeResult<()> {
        let name = name.into();
        self.with(move |rt| rt.unload(&name)).await?.map_err(RuntimeError::from)
    }

    /// Unloads every plugin; returns how many remain.
    pub async fn unload_all(&self) -> RuntimeResult<usize> {
        self.with(PluginRuntime::unload_all).await
    }

    /// Lists loaded plugin names matching `filter`.
    pub async fn list_names(&self, filter: VersionFlags) -> RuntimeResult<Vec<String>> {
        self.with(move |rt| rt.list_names(filter)).await
    }

    /// Returns runtime counters.
    pub async fn stats(&self) -> RuntimeResult<RuntimeStats> {
        self.with(|rt| rt.stats()).await
    }

    /// Unloads everything and stops the loop; returns how many plugins remained.
    pub async fn shutdown(&self) -> RuntimeResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(ControlRequest::Shutdown(tx))
            .await
            .map_err(|_| RuntimeError::ControlLoopClosed)?;
        rx.await.map_err(|_| RuntimeError::ControlLoopClosed)
    }

    /// Returns `true` once the loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}
