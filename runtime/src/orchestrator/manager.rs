//! The task manager.
//!
//! Tasks and groups live in two independent maps, each behind its own
//! lock, so group-level changes never contend with task lookups. Locks are
//! held only while the maps change; starting or stopping a task never
//! waits on the network.

use std::collections::HashMap;
use std::sync::Arc;

use dropcart::{AutomationRule, LiveProductEvent};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::task::TaskTracker;

use super::{TaskGroup, TaskRunner};
use crate::events::{DropcartEvent, EventBus};
use crate::notify::Notifier;

/// Owns every task and group and routes live products to automations.
pub struct Manager<T: TaskRunner> {
    tasks: Mutex<HashMap<String, T>>,
    groups: Mutex<HashMap<String, TaskGroup<T>>>,
    tracker: TaskTracker,
    automations: RwLock<Vec<AutomationRule>>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
}

impl<T: TaskRunner> Manager<T> {
    pub fn new(notifier: Arc<dyn Notifier>, events: Arc<EventBus>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
            automations: RwLock::new(Vec::new()),
            notifier,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // ── Tasks ─────────────────────────────────────────────

    /// Register a task. Returns `false` if the id is already known.
    pub async fn add_task(&self, task: T) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(task.id()) {
            return false;
        }
        tasks.insert(task.id().to_string(), task);
        true
    }

    pub async fn get_task(&self, id: &str) -> Option<T> {
        self.tasks.lock().await.get(id).cloned()
    }

    /// Forget a task. It keeps running if it was started.
    pub async fn remove_task(&self, id: &str) -> Option<T> {
        self.tasks.lock().await.remove(id)
    }

    pub async fn start_task(&self, id: &str) -> bool {
        match self.get_task(id).await {
            Some(task) => task.start(&self.tracker),
            None => false,
        }
    }

    pub async fn stop_task(&self, id: &str) -> bool {
        match self.get_task(id).await {
            Some(task) => {
                task.stop();
                true
            }
            None => false,
        }
    }

    pub async fn task_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    // ── Groups ────────────────────────────────────────────

    /// Register a group and all of its tasks. Re-adding a known name is a
    /// no-op and returns `false`.
    pub async fn add_group(&self, group: TaskGroup<T>) -> bool {
        let mut groups = self.groups.lock().await;
        if groups.contains_key(group.name()) {
            return false;
        }

        {
            let mut tasks = self.tasks.lock().await;
            for task in group.tasks() {
                tasks
                    .entry(task.id().to_string())
                    .or_insert_with(|| task.clone());
            }
        }

        tracing::info!(group = %group.name(), tasks = group.len(), "Group added");
        groups.insert(group.name().to_string(), group);
        true
    }

    pub async fn get_group(&self, name: &str) -> Option<TaskGroup<T>> {
        self.groups.lock().await.get(name).cloned()
    }

    /// Stop, detach and forget every member (last added first), then drop
    /// the group itself.
    pub async fn remove_group(&self, name: &str) -> bool {
        let mut groups = self.groups.lock().await;
        let Some(group) = groups.get_mut(name) else {
            return false;
        };

        let mut tasks = self.tasks.lock().await;
        while let Some(task) = group.pop_task() {
            task.stop();
            tasks.remove(task.id());
        }
        drop(tasks);

        groups.remove(name);
        tracing::info!(group = %name, "Group removed");
        true
    }

    /// Start every task in a group. Returns how many were started.
    pub async fn start_group(&self, name: &str) -> usize {
        let Some(group) = self.get_group(name).await else {
            return 0;
        };
        group
            .tasks()
            .iter()
            .filter(|task| task.start(&self.tracker))
            .count()
    }

    /// Stop every task in a group. Returns how many were running.
    pub async fn stop_group(&self, name: &str) -> usize {
        let Some(group) = self.get_group(name).await else {
            return 0;
        };
        let mut stopped = 0;
        for task in group.tasks() {
            if task.is_running() {
                stopped += 1;
            }
            task.stop();
        }
        stopped
    }

    pub async fn group_count(&self) -> usize {
        self.groups.lock().await.len()
    }

    /// Names of every registered group.
    pub async fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    // ── Lifecycle ─────────────────────────────────────────

    pub async fn stop_all(&self) {
        let tasks: Vec<T> = self.tasks.lock().await.values().cloned().collect();
        for task in &tasks {
            task.stop();
        }
        tracing::info!(tasks = tasks.len(), "Stopping all tasks");
    }

    /// Wait until every started task loop has exited.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of task loops still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    // ── Automations ───────────────────────────────────────

    pub async fn add_automation(&self, rule: AutomationRule) {
        self.automations.write().await.push(rule);
    }

    pub async fn automations(&self) -> Vec<AutomationRule> {
        self.automations.read().await.clone()
    }

    /// Evaluate every rule against one live product. Returns the names of
    /// the rules that fired.
    pub async fn handle_product(&self, event: &LiveProductEvent) -> Vec<String> {
        let rules = self.automations.read().await.clone();
        let mut fired = Vec::new();

        for rule in &rules {
            if !rule.matches(event) {
                continue;
            }
            let variants = rule.matching_size_variants(event);
            tracing::info!(
                automation = %rule.name,
                store = %event.store,
                product = %event.product.title,
                variants = variants.len(),
                "Automation matched"
            );

            self.notifier.automation_started(rule, event).await;
            self.events.emit(DropcartEvent::AutomationMatched {
                rule: rule.name.clone(),
                store: event.store.clone(),
                product: event.product.title.clone(),
                variants: variants.len(),
            });
            fired.push(rule.name.clone());
        }
        fired
    }

    /// Consume live products until every sender is dropped.
    pub async fn listen_for_products(&self, mut products: mpsc::Receiver<LiveProductEvent>) {
        tracing::info!("Starting automation product handler");
        while let Some(event) = products.recv().await {
            self.handle_product(&event).await;
        }
        tracing::info!("Automation product handler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TracingNotifier;
    use dropcart::{LiveProduct, LiveVariant};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone)]
    struct MockTask {
        id: String,
        running: Arc<AtomicBool>,
    }

    impl MockTask {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                running: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl TaskRunner for MockTask {
        fn id(&self) -> &str {
            &self.id
        }

        fn start(&self, tracker: &TaskTracker) -> bool {
            if self.running.swap(true, Ordering::SeqCst) {
                return false;
            }
            let running = self.running.clone();
            tracker.spawn(async move {
                while running.load(Ordering::SeqCst) {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
            });
            true
        }

        fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn manager() -> Manager<MockTask> {
        Manager::new(Arc::new(TracingNotifier), Arc::new(EventBus::default()))
    }

    fn group(name: &str, ids: &[&str]) -> TaskGroup<MockTask> {
        let mut g = TaskGroup::new(name);
        g.extend(ids.iter().map(|id| MockTask::new(id)));
        g
    }

    #[tokio::test]
    async fn test_add_task_once() {
        let m = manager();
        assert!(m.add_task(MockTask::new("a")).await);
        assert!(!m.add_task(MockTask::new("a")).await);
        assert_eq!(m.task_count().await, 1);
        assert!(m.get_task("a").await.is_some());
        assert!(m.remove_task("a").await.is_some());
        assert_eq!(m.task_count().await, 0);
    }

    #[tokio::test]
    async fn test_add_group_is_idempotent() {
        let m = manager();
        assert!(m.add_group(group("kith", &["a", "b"])).await);
        assert!(!m.add_group(group("kith", &["c"])).await);
        assert_eq!(m.group_count().await, 1);
        assert_eq!(m.task_count().await, 2);
        assert_eq!(m.get_group("kith").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_group_stops_members() {
        let m = manager();
        let g = group("kith", &["a", "b", "c"]);
        let members: Vec<MockTask> = g.tasks().to_vec();
        m.add_group(g).await;
        m.add_task(MockTask::new("solo")).await;

        assert_eq!(m.start_group("kith").await, 3);
        assert!(members.iter().all(|t| t.is_running()));

        assert!(m.remove_group("kith").await);
        assert!(members.iter().all(|t| !t.is_running()));
        assert_eq!(m.group_count().await, 0);
        assert_eq!(m.task_count().await, 1);
        assert!(!m.remove_group("kith").await);

        m.wait().await;
        assert_eq!(m.active(), 0);
    }

    #[tokio::test]
    async fn test_start_stop_task() {
        let m = manager();
        m.add_task(MockTask::new("a")).await;
        assert!(m.start_task("a").await);
        assert!(!m.start_task("a").await);
        assert!(!m.start_task("missing").await);
        assert!(m.stop_task("a").await);
        m.wait().await;
        assert!(!m.get_task("a").await.unwrap().is_running());
    }

    #[tokio::test]
    async fn test_stop_all_then_wait() {
        let m = manager();
        m.add_group(group("g", &["a", "b"])).await;
        m.start_group("g").await;
        assert_eq!(m.stop_group("g").await, 2);
        m.stop_all().await;
        tokio::time::timeout(std::time::Duration::from_secs(2), m.wait())
            .await
            .expect("all tasks exit");
    }

    fn live_dunk() -> LiveProductEvent {
        LiveProductEvent {
            store: "https://kith.com".into(),
            channel: "store".into(),
            event: "newProduct".into(),
            product: LiveProduct {
                title: "Nike Dunk High".into(),
                handle: "dunk-high".into(),
                variants: vec![LiveVariant {
                    title: "9".into(),
                    available: true,
                    price: Some(120.0),
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }

    fn dunk_rule(name: &str) -> AutomationRule {
        AutomationRule {
            name: name.into(),
            monitor_inputs: vec!["+dunk".into()],
            price_max: 500.0,
            quantity: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_handle_product_fires_matching_rules() {
        let m = manager();
        m.add_automation(dunk_rule("dunks")).await;
        m.add_automation(AutomationRule {
            monitor_inputs: vec!["+jordan".into()],
            ..dunk_rule("jordans")
        })
        .await;

        let mut rx = m.events().subscribe();
        let fired = m.handle_product(&live_dunk()).await;
        assert_eq!(fired, vec!["dunks".to_string()]);

        match rx.try_recv().unwrap() {
            DropcartEvent::AutomationMatched { rule, variants, .. } => {
                assert_eq!(rule, "dunks");
                assert_eq!(variants, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_listener_drains_channel() {
        let m = Arc::new(manager());
        m.add_automation(dunk_rule("dunks")).await;
        let mut events = m.events().subscribe();

        let (tx, rx) = mpsc::channel(1);
        let listener = {
            let m = m.clone();
            tokio::spawn(async move { m.listen_for_products(rx).await })
        };

        tx.send(live_dunk()).await.unwrap();
        tx.send(live_dunk()).await.unwrap();
        drop(tx);
        listener.await.unwrap();

        let mut matched = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, DropcartEvent::AutomationMatched { .. }) {
                matched += 1;
            }
        }
        assert_eq!(matched, 2);
    }
}
