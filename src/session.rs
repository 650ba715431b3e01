use crate::app::{App, AppCommand};
use crate::keymap::ActionRequest;
use crate::model::{Listing, ServerInfo};
use crate::provider::{self, ResourceProvider};
use crate::timers::{TickScheduler, TimerTick};
use anyhow::{Result, anyhow};
use crossterm::event::KeyEvent;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    Resize(u16, u16),
    Tick(TimerTick),
    /// Rows fetched for view `view`. `rearm` is false for the reload that
    /// follows a dispatched action.
    Listing {
        view: u64,
        result: Result<Listing>,
        rearm: bool,
    },
    ServerInfo {
        banner: u64,
        result: Result<ServerInfo>,
    },
}

pub struct Session {
    app: App,
    provider: Arc<dyn ResourceProvider>,
    scheduler: Arc<dyn TickScheduler>,
    inbox: UnboundedSender<Message>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        app: App,
        provider: Arc<dyn ResourceProvider>,
        scheduler: Arc<dyn TickScheduler>,
        inbox: UnboundedSender<Message>,
    ) -> Self {
        Self {
            app,
            provider,
            scheduler,
            inbox,
            tasks: Vec::new(),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn running(&self) -> bool {
        self.app.running()
    }

    pub fn start(&mut self) {
        for command in self.app.start() {
            self.execute(command);
        }
    }

    pub fn handle(&mut self, message: Message) {
        let command = match message {
            Message::Key(key) => self.app.handle_key(key),
            Message::Resize(width, height) => {
                self.app.resize(width, height);
                AppCommand::None
            }
            Message::Tick(tick) => self.app.on_tick(&tick),
            Message::Listing {
                view,
                result,
                rearm,
            } => {
                self.app.apply_listing(view, result);
                if rearm
                    && view == self.app.view_id()
                    && let Some(delay) = self.app.context().poll_delay(self.app.intervals())
                {
                    self.scheduler.schedule(view, delay);
                }
                AppCommand::None
            }
            Message::ServerInfo { banner, result } => {
                self.app.apply_server_info(banner, result);
                if banner == self.app.banner_id() {
                    self.scheduler.schedule(banner, self.app.intervals().banner);
                }
                AppCommand::None
            }
        };
        self.execute(command);
    }

    fn execute(&mut self, command: AppCommand) {
        match command {
            AppCommand::None => {}
            AppCommand::Refresh { view } => self.fetch(view, true),
            AppCommand::RefreshBanner { banner } => {
                let provider = Arc::clone(&self.provider);
                let inbox = self.inbox.clone();
                self.spawn(async move {
                    let result = bounded(provider.server_info()).await;
                    // the loop may already be gone on shutdown
                    let _ = inbox.send(Message::ServerInfo { banner, result });
                });
            }
            AppCommand::Dispatch(request) => {
                self.dispatch(request);
                self.fetch(self.app.view_id(), false);
            }
        }
    }

    fn fetch(&mut self, view: u64, rearm: bool) {
        debug!("fetching view id={view}");
        let context = self.app.context().clone();
        let provider = Arc::clone(&self.provider);
        let inbox = self.inbox.clone();
        self.spawn(async move {
            let result = bounded(provider::fetch(provider.as_ref(), &context)).await;
            let _ = inbox.send(Message::Listing {
                view,
                result,
                rearm,
            });
        });
    }

    fn dispatch(&mut self, request: ActionRequest) {
        let provider = Arc::clone(&self.provider);
        self.spawn(async move {
            let ActionRequest {
                kind,
                action,
                target,
            } = request;
            match provider.perform(kind, action, target.as_deref()).await {
                Ok(()) => info!(
                    "{action} {} {} finished",
                    kind.noun(),
                    target.as_deref().unwrap_or("*")
                ),
                Err(err) => warn!(
                    "{action} {} {} failed: {err:#}",
                    kind.noun(),
                    target.as_deref().unwrap_or("*")
                ),
            }
        });
    }

    fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks.retain(|handle| !handle.is_finished());
        self.tasks.push(tokio::spawn(task));
    }

    #[cfg(test)]
    pub async fn settle_tasks(&mut self) {
        for handle in self.tasks.drain(..) {
            if let Err(err) = handle.await {
                warn!("background task panicked: {err}");
            }
        }
    }
}

async fn bounded<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout(FETCH_TIMEOUT, future).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "timed out after {}s, showing cached data",
            FETCH_TIMEOUT.as_secs()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, Session};
    use crate::app::{App, Focus};
    use crate::keymap::ResourceAction;
    use crate::model::{ColumnSpec, InspectView, Listing, ResourceContext, ResourceKind, ServerInfo};
    use crate::provider::ResourceProvider;
    use crate::timers::{AtomicIdGenerator, PollIntervals, TickScheduler, TimerTick};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::{Duration, Instant};

    #[derive(Default)]
    struct FakeProvider {
        listings: Mutex<HashMap<ResourceKind, Listing>>,
        failing: Mutex<HashSet<ResourceKind>>,
        list_delay: Mutex<Option<Duration>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn with(kind: ResourceKind, keys: &[&str]) -> Self {
            let provider = Self::default();
            provider.set(kind, keys);
            provider
        }

        fn set(&self, kind: ResourceKind, keys: &[&str]) {
            let listing = Listing::new(
                vec![ColumnSpec::new("ID"), ColumnSpec::new("Name")],
                keys.iter()
                    .map(|key| vec![key.to_string(), format!("name-{key}")])
                    .collect(),
            );
            self.listings
                .lock()
                .expect("listings lock")
                .insert(kind, listing);
        }

        fn fail(&self, kind: ResourceKind) {
            self.failing.lock().expect("failing lock").insert(kind);
        }

        fn slow_down(&self, delay: Duration) {
            *self.list_delay.lock().expect("delay lock") = Some(delay);
        }

        fn record(&self, call: String) {
            self.calls.lock().expect("calls lock").push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ResourceProvider for FakeProvider {
        async fn list(&self, kind: ResourceKind) -> Result<Listing> {
            self.record(format!("list {}", kind.command()));
            let delay = *self.list_delay.lock().expect("delay lock");
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.lock().expect("failing lock").contains(&kind) {
                bail!("{} unavailable", kind.command());
            }
            Ok(self
                .listings
                .lock()
                .expect("listings lock")
                .get(&kind)
                .cloned()
                .unwrap_or_default())
        }

        async fn inspect(&self, kind: ResourceKind, id: &str) -> Result<Listing> {
            self.record(format!("inspect {} {id}", kind.command()));
            Ok(Listing::new(
                vec![ColumnSpec::new("Name"), ColumnSpec::new("Value")],
                vec![vec!["Id".to_string(), id.to_string()]],
            ))
        }

        async fn history(&self, image: &str) -> Result<Listing> {
            self.record(format!("history {image}"));
            Ok(Listing::default())
        }

        async fn logs(&self, container: &str) -> Result<Listing> {
            self.record(format!("logs {container}"));
            Ok(Listing::default())
        }

        async fn perform(
            &self,
            kind: ResourceKind,
            action: ResourceAction,
            target: Option<&str>,
        ) -> Result<()> {
            self.record(format!(
                "{action} {} {}",
                kind.command(),
                target.unwrap_or("*")
            ));
            Ok(())
        }

        async fn server_info(&self) -> Result<ServerInfo> {
            Ok(ServerInfo {
                name: "fake".to_string(),
                server_version: "27.0".to_string(),
                client_version: "1.47".to_string(),
                images: 3,
                running: 2,
                paused: 0,
                stopped: 1,
            })
        }
    }

    #[derive(Default)]
    struct RecordingScheduler {
        armed: Mutex<Vec<(u64, Duration)>>,
    }

    impl RecordingScheduler {
        fn armed(&self) -> Vec<(u64, Duration)> {
            self.armed.lock().expect("armed lock").clone()
        }
    }

    impl TickScheduler for RecordingScheduler {
        fn schedule(&self, id: u64, delay: Duration) {
            self.armed.lock().expect("armed lock").push((id, delay));
        }
    }

    struct Harness {
        session: Session,
        provider: Arc<FakeProvider>,
        scheduler: Arc<RecordingScheduler>,
        inbox: UnboundedReceiver<Message>,
    }

    impl Harness {
        fn new(kind: ResourceKind, provider: FakeProvider) -> Self {
            let provider = Arc::new(provider);
            let scheduler = Arc::new(RecordingScheduler::default());
            let (tx, inbox) = mpsc::unbounded_channel();
            let app = App::new(
                kind,
                Arc::new(AtomicIdGenerator::starting_at(1)),
                PollIntervals::default(),
            );
            let session = Session::new(app, provider.clone(), scheduler.clone(), tx);
            Self {
                session,
                provider,
                scheduler,
                inbox,
            }
        }

        async fn started(kind: ResourceKind, provider: FakeProvider) -> Self {
            let mut harness = Self::new(kind, provider);
            harness.session.start();
            harness.settle().await;
            harness
        }

        fn app(&self) -> &App {
            self.session.app()
        }

        async fn settle(&mut self) {
            loop {
                self.session.settle_tasks().await;
                let mut idle = true;
                while let Ok(message) = self.inbox.try_recv() {
                    self.session.handle(message);
                    idle = false;
                }
                if idle {
                    break;
                }
            }
        }

        async fn press(&mut self, code: KeyCode, modifiers: KeyModifiers) {
            self.session
                .handle(Message::Key(KeyEvent::new(code, modifiers)));
            self.settle().await;
        }

        async fn type_line(&mut self, text: &str) {
            for ch in text.chars() {
                self.press(KeyCode::Char(ch), KeyModifiers::NONE).await;
            }
            self.press(KeyCode::Enter, KeyModifiers::NONE).await;
        }

        async fn tick(&mut self, id: u64) {
            self.session.handle(Message::Tick(TimerTick::now(id)));
            self.settle().await;
        }

        fn keys(&self) -> Vec<String> {
            self.app()
                .table()
                .rows()
                .iter()
                .map(|row| row[0].clone())
                .collect()
        }
    }

    #[tokio::test]
    async fn start_populates_rows_and_arms_both_timers() {
        let harness = Harness::started(
            ResourceKind::Containers,
            FakeProvider::with(ResourceKind::Containers, &["c1"]),
        )
        .await;

        assert_eq!(harness.keys(), vec!["c1"]);
        assert_eq!(
            harness.app().server_info().map(|info| info.name.as_str()),
            Some("fake")
        );
        let intervals = PollIntervals::default();
        let mut armed = harness.scheduler.armed();
        armed.sort();
        assert_eq!(armed, vec![(1, intervals.snapshot), (2, intervals.banner)]);
    }

    #[tokio::test]
    async fn typing_images_switches_and_repopulates() {
        let provider = FakeProvider::with(ResourceKind::Containers, &["c1"]);
        provider.set(ResourceKind::Images, &["img-b", "img-a"]);
        let mut harness = Harness::started(ResourceKind::Containers, provider).await;

        harness.type_line(":images").await;

        assert_eq!(harness.app().focus(), Focus::Table);
        assert_eq!(
            harness.app().context(),
            &ResourceContext::Browse(ResourceKind::Images)
        );
        assert_eq!(harness.keys(), vec!["img-a", "img-b"]);
        assert_eq!(
            harness.scheduler.armed().last(),
            Some(&(harness.app().view_id(), PollIntervals::default().snapshot))
        );
    }

    #[tokio::test]
    async fn bogus_command_opens_single_button_dialog() {
        let mut harness = Harness::started(ResourceKind::Containers, FakeProvider::default()).await;

        harness.type_line(":bogus").await;

        assert_eq!(harness.app().focus(), Focus::Dialog);
        let dialog = harness.app().dialog().expect("dialog present");
        assert_eq!(dialog.message(), "Unsupported Command: [:bogus]");
        assert_eq!(dialog.buttons().len(), 1);

        harness.press(KeyCode::Esc, KeyModifiers::NONE).await;
        assert_eq!(harness.app().focus(), Focus::Table);
        assert!(harness.app().dialog().is_none());
    }

    #[tokio::test]
    async fn stale_ticks_leave_the_table_alone() {
        let mut harness = Harness::started(
            ResourceKind::Containers,
            FakeProvider::with(ResourceKind::Containers, &["c1"]),
        )
        .await;
        harness.provider.set(ResourceKind::Containers, &["c1", "c2"]);

        harness.tick(999).await;
        assert_eq!(harness.keys(), vec!["c1"]);
        assert_eq!(harness.provider.calls(), vec!["list containers"]);

        let live = harness.app().view_id();
        harness.tick(live).await;
        assert_eq!(harness.keys(), vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn ticks_from_a_replaced_view_are_ignored_after_switching() {
        let provider = FakeProvider::with(ResourceKind::Containers, &["c1"]);
        provider.set(ResourceKind::Volumes, &["v1"]);
        let mut harness = Harness::started(ResourceKind::Containers, provider).await;
        let old = harness.app().view_id();

        harness.type_line(":vol").await;
        harness.tick(old).await;

        assert_eq!(harness.keys(), vec!["v1"]);
        assert_ne!(harness.app().view_id(), old);
    }

    #[tokio::test]
    async fn rows_for_a_replaced_view_neither_land_nor_rearm() {
        let mut harness = Harness::started(
            ResourceKind::Containers,
            FakeProvider::with(ResourceKind::Containers, &["c1"]),
        )
        .await;
        let armed = harness.scheduler.armed().len();

        harness.session.handle(Message::Listing {
            view: 999,
            result: Ok(Listing::new(
                vec![ColumnSpec::new("ID")],
                vec![vec!["ghost".to_string()]],
            )),
            rearm: true,
        });

        assert_eq!(harness.keys(), vec!["c1"]);
        assert_eq!(harness.scheduler.armed().len(), armed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_do_not_hold_up_keys() {
        let mut harness = Harness::started(
            ResourceKind::Containers,
            FakeProvider::with(ResourceKind::Containers, &["c1"]),
        )
        .await;
        harness.provider.set(ResourceKind::Containers, &["c1", "c2"]);
        harness.provider.slow_down(Duration::from_secs(3));

        let started = Instant::now();
        let live = harness.app().view_id();
        harness.session.handle(Message::Tick(TimerTick::now(live)));
        harness.session.handle(Message::Key(KeyEvent::new(
            KeyCode::Char(':'),
            KeyModifiers::NONE,
        )));

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(harness.app().focus(), Focus::Input);
        assert_eq!(harness.keys(), vec!["c1"]);

        harness.settle().await;
        assert_eq!(harness.keys(), vec!["c1", "c2"]);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_fetch_keeps_rows_and_stays_armed() {
        let mut harness = Harness::started(
            ResourceKind::Containers,
            FakeProvider::with(ResourceKind::Containers, &["c1"]),
        )
        .await;
        harness.provider.set(ResourceKind::Containers, &["c2"]);
        harness.provider.slow_down(Duration::from_secs(10));
        let armed = harness.scheduler.armed().len();

        let live = harness.app().view_id();
        harness.tick(live).await;

        assert_eq!(harness.keys(), vec!["c1"]);
        assert_eq!(
            harness.app().status(),
            "Refresh failed: timed out after 4s, showing cached data"
        );
        let rearmed = harness.scheduler.armed();
        assert_eq!(rearmed.len(), armed + 1);
        assert_eq!(
            rearmed.last(),
            Some(&(live, PollIntervals::default().snapshot))
        );
    }

    #[tokio::test]
    async fn confirmed_prune_reaches_the_provider() {
        let mut harness = Harness::started(
            ResourceKind::Containers,
            FakeProvider::with(ResourceKind::Containers, &["c1"]),
        )
        .await;
        harness.provider.set(ResourceKind::Containers, &["c2"]);

        harness.press(KeyCode::Char('p'), KeyModifiers::CONTROL).await;
        assert_eq!(harness.app().focus(), Focus::Dialog);
        assert_eq!(
            harness.app().dialog().map(|dialog| dialog.buttons().len()),
            Some(2)
        );

        harness.press(KeyCode::Enter, KeyModifiers::NONE).await;

        assert_eq!(harness.app().focus(), Focus::Table);
        assert!(
            harness
                .provider
                .calls()
                .contains(&"prune containers *".to_string())
        );
        assert_eq!(harness.keys(), vec!["c2"]);
    }

    #[tokio::test]
    async fn dismissed_prune_never_reaches_the_provider() {
        let mut harness = Harness::started(ResourceKind::Volumes, FakeProvider::default()).await;

        harness.press(KeyCode::Char('p'), KeyModifiers::CONTROL).await;
        harness.press(KeyCode::Char('n'), KeyModifiers::NONE).await;

        assert_eq!(harness.app().focus(), Focus::Table);
        assert!(
            !harness
                .provider
                .calls()
                .iter()
                .any(|call| call.starts_with("prune"))
        );
    }

    #[tokio::test]
    async fn inspect_is_fetched_once_and_never_rescheduled() {
        let mut harness = Harness::started(
            ResourceKind::Images,
            FakeProvider::with(ResourceKind::Images, &["img"]),
        )
        .await;

        harness.press(KeyCode::Char('i'), KeyModifiers::NONE).await;
        let inspect_view = harness.app().view_id();

        assert_eq!(
            harness.app().context(),
            &ResourceContext::Inspect {
                kind: ResourceKind::Images,
                id: "img".to_string(),
                view: InspectView::Details,
            }
        );
        assert!(
            harness
                .provider
                .calls()
                .contains(&"inspect images img".to_string())
        );
        assert!(
            !harness
                .scheduler
                .armed()
                .iter()
                .any(|(id, _)| *id == inspect_view)
        );
    }

    #[tokio::test]
    async fn logs_poll_on_the_short_interval() {
        let mut harness = Harness::started(
            ResourceKind::Containers,
            FakeProvider::with(ResourceKind::Containers, &["c1"]),
        )
        .await;

        harness.press(KeyCode::Char('l'), KeyModifiers::NONE).await;
        assert!(harness.provider.calls().contains(&"logs c1".to_string()));
        assert_eq!(
            harness.scheduler.armed().last(),
            Some(&(harness.app().view_id(), PollIntervals::default().logs))
        );
    }

    #[tokio::test]
    async fn failed_switch_leaves_an_empty_view() {
        let provider = FakeProvider::with(ResourceKind::Containers, &["c1"]);
        provider.fail(ResourceKind::Volumes);
        let mut harness = Harness::started(ResourceKind::Containers, provider).await;

        harness.type_line(":volumes").await;

        assert_eq!(
            harness.app().context(),
            &ResourceContext::Browse(ResourceKind::Volumes)
        );
        assert!(harness.app().table().is_empty());
        assert!(harness.app().status().contains("volumes unavailable"));
    }

    #[tokio::test]
    async fn restart_dispatches_and_reloads_without_rearming() {
        let mut harness = Harness::started(
            ResourceKind::Containers,
            FakeProvider::with(ResourceKind::Containers, &["c1"]),
        )
        .await;
        let armed = harness.scheduler.armed().len();

        harness.press(KeyCode::Char('r'), KeyModifiers::CONTROL).await;

        assert!(
            harness
                .provider
                .calls()
                .contains(&"restart containers c1".to_string())
        );
        assert_eq!(
            harness
                .provider
                .calls()
                .iter()
                .filter(|call| call.as_str() == "list containers")
                .count(),
            2
        );
        assert_eq!(harness.scheduler.armed().len(), armed);
    }

    #[tokio::test]
    async fn resize_reaches_the_table() {
        let mut harness = Harness::new(ResourceKind::Containers, FakeProvider::default());
        harness.session.handle(Message::Resize(80, 24));
        assert_eq!(harness.app().table().width(), 78);
        assert_eq!(harness.app().table().page_height(), 12);
    }
}
