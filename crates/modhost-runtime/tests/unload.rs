//! Unload sweeps: services, hooks, extensions and references left behind.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use modhost_core::{
    CmdResult, CommandHandler, DynamicReference, Event, EventKind, ExtensionItem, MemoryDirectory,
    ModResult, ModeAction, ModeHandler, ModeType, PluginError, ServiceKind, ServiceProvider,
    Session, SessionObject, UnloadModule, Version, VersionFlags,
};
use modhost_runtime::{BoxError, Plugin, PluginContext, PluginRuntime};
use parking_lot::Mutex;

struct Rehash;

impl Event for Rehash {
    fn kind(&self) -> EventKind {
        EventKind::Rehash
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Noop;

impl CommandHandler for Noop {
    fn handle(&self, _source: &dyn SessionObject, _params: &[String]) -> CmdResult {
        CmdResult::Success
    }
}

impl ModeHandler for Noop {
    fn on_change(
        &self,
        _source: &dyn SessionObject,
        _target: &dyn SessionObject,
        _adding: bool,
        _parameter: Option<&str>,
    ) -> ModeAction {
        ModeAction::Allow
    }
}

/// Registers one service of every kind and tags every session object.
struct Provider {
    sessions: Vec<Arc<dyn SessionObject>>,
    cleanups: Arc<AtomicUsize>,
    culls: Arc<AtomicUsize>,
}

impl Plugin for Provider {
    fn version(&self) -> Version {
        Version::new("SQLite backend", VersionFlags::VENDOR)
    }

    fn init(&self, ctx: &mut PluginContext<'_>) -> Result<(), BoxError> {
        let name = ctx.name().to_owned();
        let tag = ExtensionItem::new(name.as_str(), "sqlite_id");
        ctx.add_service(ServiceProvider::data(name.as_str(), "sql/sqlite", "sqlite".to_owned()))?;
        ctx.add_service(ServiceProvider::metadata(&tag))?;
        ctx.add_service(ServiceProvider::command(name.as_str(), "SQLSTATUS", Arc::new(Noop)))?;
        ctx.add_service(ServiceProvider::mode(
            name.as_str(),
            "sqlonly",
            'Q',
            ModeType::Channel,
            Arc::new(Noop),
        ))?;
        for object in &self.sessions {
            object.extensions().set(&tag, 42_u64);
            for member in object.members() {
                member.extensions().set(&tag, 7_u64);
            }
        }
        ctx.attach(EventKind::Rehash);
        Ok(())
    }

    fn on_cleanup(&self, _object: &dyn SessionObject) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }

    fn cull(&self) {
        self.culls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Holds a reference to `sql` and records what it saw when notified.
#[derive(Default)]
struct Consumer {
    sql: Mutex<Option<DynamicReference>>,
    seen_on_notice: Arc<Mutex<Vec<(String, bool)>>>,
}

impl Consumer {
    fn available(&self) -> bool {
        self.sql.lock().as_ref().is_some_and(DynamicReference::is_available)
    }
}

impl Plugin for Consumer {
    fn version(&self) -> Version {
        Version::new("SQL consumer", VersionFlags::empty())
    }

    fn init(&self, ctx: &mut PluginContext<'_>) -> Result<(), BoxError> {
        *self.sql.lock() = Some(ctx.dynamic_reference("sql"));
        ctx.attach(EventKind::UnloadModule);
        Ok(())
    }

    fn on_event(&self, _ctx: &mut PluginContext<'_>, event: &dyn Event) -> ModResult {
        if let Some(notice) = event.downcast_ref::<UnloadModule>() {
            self.seen_on_notice
                .lock()
                .push((notice.name.clone(), self.available()));
        }
        ModResult::Passthru
    }
}

struct Fixture {
    runtime: PluginRuntime,
    user: Arc<Session>,
    channel: Arc<Session>,
    membership: Arc<Session>,
    cleanups: Arc<AtomicUsize>,
    culls: Arc<AtomicUsize>,
}

fn fixture() -> Fixture {
    let users = Arc::new(MemoryDirectory::new("users"));
    let channels = Arc::new(MemoryDirectory::new("channels"));
    let user = Session::user("alice");
    let channel = Session::channel("#sql");
    let membership = channel.join(user.as_ref());
    users.insert(user.clone());
    channels.insert(channel.clone());

    let runtime = PluginRuntime::builder()
        .directory(users)
        .directory(channels)
        .build()
        .unwrap();

    Fixture {
        runtime,
        user,
        channel,
        membership,
        cleanups: Arc::default(),
        culls: Arc::default(),
    }
}

impl Fixture {
    fn provider(&self) -> Provider {
        Provider {
            sessions: vec![self.user.clone() as Arc<dyn SessionObject>, self.channel.clone()],
            cleanups: self.cleanups.clone(),
            culls: self.culls.clone(),
        }
    }
}

#[test]
fn unload_removes_every_trace_of_the_plugin() {
    let mut fx = fixture();
    let provider = fx.provider();
    fx.runtime.load_plugin("m_sqlite", provider).unwrap();

    assert_eq!(fx.runtime.services().providers_of("m_sqlite").len(), 4);
    assert_eq!(fx.user.extensions().len(), 1);
    assert_eq!(fx.membership.extensions().len(), 1);

    fx.runtime.unload("m_sqlite").unwrap();

    let services = fx.runtime.services();
    assert!(services.providers_of("m_sqlite").is_empty());
    assert!(services.find_command("SQLSTATUS").is_none());
    assert!(services.find_mode('Q', ModeType::Channel).is_none());
    assert!(services.find_extension("sqlite_id").is_none());
    assert!(services.find_service(ServiceKind::Data, "sqlite").unwrap().is_none());
    assert!(fx.runtime.hooks().subscribers(EventKind::Rehash).is_empty());
    assert!(fx.runtime.find("m_sqlite").is_none());

    assert!(fx.user.extensions().is_empty());
    assert!(fx.channel.extensions().is_empty());
    assert!(fx.membership.extensions().is_empty());
    // One cleanup per top-level object.
    assert_eq!(fx.cleanups.load(Ordering::SeqCst), 2);

    // Destruction is deferred until the cull list is flushed.
    assert_eq!(fx.culls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.runtime.flush_culls(), 1);
    assert_eq!(fx.culls.load(Ordering::SeqCst), 1);
}

#[test]
fn dependents_are_notified_while_provider_is_registered() {
    let mut fx = fixture();
    let provider = fx.provider();
    let seen = Arc::new(Mutex::new(Vec::new()));
    fx.runtime
        .load_plugin(
            "m_consumer",
            Consumer {
                seen_on_notice: seen.clone(),
                ..Consumer::default()
            },
        )
        .unwrap();
    fx.runtime.load_plugin("m_sqlite", provider).unwrap();

    fx.runtime.unload("m_sqlite").unwrap();
    assert_eq!(*seen.lock(), [("m_sqlite".to_owned(), true)]);
    // The consumer still holds its reference; it is merely unbound.
    assert_eq!(fx.runtime.services().reference_count(), 1);
    assert!(fx.runtime.find("m_consumer").is_some());
}

#[test]
fn references_never_dangle_whatever_the_unload_order() {
    for order in [["m_consumer", "m_sqlite"], ["m_sqlite", "m_consumer"]] {
        let mut fx = fixture();
        let provider = fx.provider();
        let consumer = Consumer::default();
        let seen = consumer.seen_on_notice.clone();
        fx.runtime.load_plugin("m_sqlite", provider).unwrap();
        fx.runtime.load_plugin("m_consumer", consumer).unwrap();
        assert_eq!(fx.runtime.services().reference_count(), 1);

        for name in order {
            fx.runtime.unload(name).unwrap();
        }
        fx.runtime.flush_culls();

        assert_eq!(fx.runtime.plugin_count(), 0);
        assert_eq!(fx.runtime.services().reference_count(), 0);
        assert!(fx.runtime.services().is_empty());
        assert!(seen.lock().iter().all(|(_, available)| *available));
    }
}

/// Unloads itself from its own handler.
struct Quitter {
    culls: Arc<AtomicUsize>,
}

impl Plugin for Quitter {
    fn version(&self) -> Version {
        Version::default()
    }

    fn init(&self, ctx: &mut PluginContext<'_>) -> Result<(), BoxError> {
        ctx.attach(EventKind::Rehash);
        Ok(())
    }

    fn on_event(&self, ctx: &mut PluginContext<'_>, _event: &dyn Event) -> ModResult {
        let name = ctx.name().to_owned();
        ctx.runtime().unload(&name).unwrap();
        // Still alive: the runtime only parked us on the cull list.
        assert_eq!(self.culls.load(Ordering::SeqCst), 0);
        ModResult::Passthru
    }

    fn cull(&self) {
        self.culls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn plugin_can_unload_itself_mid_dispatch() {
    let mut fx = fixture();
    let culls = Arc::new(AtomicUsize::new(0));
    let provider = fx.provider();
    fx.runtime
        .load_plugin("m_quitter", Quitter { culls: culls.clone() })
        .unwrap();
    fx.runtime.load_plugin("m_sqlite", provider).unwrap();

    fx.runtime.dispatch(&Rehash);

    assert!(fx.runtime.find("m_quitter").is_none());
    assert_eq!(fx.runtime.hooks().subscribers(EventKind::Rehash).len(), 1);
    assert_eq!(fx.runtime.stats().pending_culls, 1);
    fx.runtime.flush_culls();
    assert_eq!(culls.load(Ordering::SeqCst), 1);
}

#[test]
fn unload_all_leaves_static_plugins() {
    struct Pinned;

    impl Plugin for Pinned {
        fn version(&self) -> Version {
            Version::new("core commands", VersionFlags::STATIC | VersionFlags::VENDOR)
        }
    }

    let mut fx = fixture();
    let provider = fx.provider();
    fx.runtime.load_plugin("m_core", Pinned).unwrap();
    fx.runtime.load_plugin("m_sqlite", provider).unwrap();
    fx.runtime.load_plugin("m_consumer", Consumer::default()).unwrap();

    let remaining = fx.runtime.unload_all();

    assert_eq!(remaining, 1);
    assert_eq!(fx.runtime.list_names(VersionFlags::empty()), ["m_core"]);
    assert_eq!(fx.culls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.runtime.stats().pending_culls, 0);
    assert_eq!(
        fx.runtime.last_error(),
        Some(PluginError::NonUnloadable("m_core".into()).to_string().as_str())
    );
}
