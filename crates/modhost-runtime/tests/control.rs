//! Driving the runtime from other tasks and threads through the control loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use modhost_core::{ServiceKind, ServiceProvider, Version, VersionFlags};
use modhost_runtime::{
    BoxError, ControlLoop, Plugin, PluginContext, PluginRuntime, RuntimeError,
};

struct Cache {
    culls: Arc<AtomicUsize>,
    flags: VersionFlags,
}

impl Plugin for Cache {
    fn version(&self) -> Version {
        Version::new("cache", self.flags)
    }

    fn init(&self, ctx: &mut PluginContext<'_>) -> Result<(), BoxError> {
        let provider = ServiceProvider::data(ctx.name(), "cache/memory", 0_u32);
        ctx.add_service(provider)?;
        Ok(())
    }

    fn cull(&self) {
        self.culls.fetch_add(1, Ordering::SeqCst);
    }
}

fn cache(culls: &Arc<AtomicUsize>) -> Cache {
    Cache {
        culls: culls.clone(),
        flags: VersionFlags::empty(),
    }
}

#[tokio::test]
async fn requests_run_on_the_control_task() {
    let culls = Arc::new(AtomicUsize::new(0));
    let (handle, task) = ControlLoop::spawn(PluginRuntime::new());

    handle.load("m_cache", cache(&culls)).await.unwrap();
    let found = handle
        .with(|rt| {
            rt.services()
                .find_service(ServiceKind::Data, "memory")
                .map(|p| p.is_some())
        })
        .await
        .unwrap()
        .unwrap();
    assert!(found);

    handle.unload("m_cache").await.unwrap();

    // The cull list is flushed once the unload request completes, before
    // the next request runs.
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.plugins, 0);
    assert_eq!(stats.pending_culls, 0);
    assert_eq!(culls.load(Ordering::SeqCst), 1);

    assert_eq!(handle.shutdown().await.unwrap(), 0);
    let runtime = task.await.unwrap();
    assert_eq!(runtime.plugin_count(), 0);
    assert!(handle.is_closed());
}

#[tokio::test]
async fn lifecycle_errors_are_reported_to_the_requester() {
    let culls = Arc::new(AtomicUsize::new(0));
    let (handle, _task) = ControlLoop::spawn(PluginRuntime::new());

    handle.load("m_cache", cache(&culls)).await.unwrap();
    let err = handle.load("m_cache", cache(&culls)).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Plugin(_)));

    let err = handle.unload("m_missing").await.unwrap_err();
    assert_eq!(err.to_string(), "plugin m_missing is not loaded");

    let names = handle.list_names(VersionFlags::empty()).await.unwrap();
    assert_eq!(names, ["m_cache"]);
}

#[tokio::test]
async fn shutdown_unloads_everything_but_static_plugins() {
    let culls = Arc::new(AtomicUsize::new(0));
    let (handle, task) = ControlLoop::spawn(PluginRuntime::new());

    handle.load("m_cache", cache(&culls)).await.unwrap();
    handle
        .load(
            "m_pinned",
            Cache {
                culls: culls.clone(),
                flags: VersionFlags::STATIC,
            },
        )
        .await
        .unwrap();

    assert_eq!(handle.shutdown().await.unwrap(), 1);
    let runtime = task.await.unwrap();
    assert_eq!(runtime.list_names(VersionFlags::STATIC), ["m_pinned"]);
    assert_eq!(culls.load(Ordering::SeqCst), 1);

    let err = handle.stats().await.unwrap_err();
    assert!(matches!(err, RuntimeError::ControlLoopClosed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn foreign_threads_can_block_on_requests() {
    let culls = Arc::new(AtomicUsize::new(0));
    let (handle, _task) = ControlLoop::spawn(PluginRuntime::new());
    handle.load("m_cache", cache(&culls)).await.unwrap();

    let worker = {
        let handle = handle.clone();
        std::thread::spawn(move || handle.blocking_with(|rt| rt.plugin_count()))
    };
    let count = tokio::task::spawn_blocking(move || worker.join())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(count, 1);
}
