//! The checkout task handle.
//!
//! A [`CheckoutTask`] is cheap to clone and shared between the
//! orchestrator and its driver loop. The loop itself owns all per-attempt
//! state (pages, cart, queue) in a [`CheckoutSession`]; the handle only
//! exposes the running flag and the latest status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use dropcart::{Mode, Profile, ProxyList, Site, StatusLevel};
use rand::Rng;
use tokio::sync::Notify;
use tokio_util::task::TaskTracker;

use super::session::CheckoutSession;
use super::status::{CheckoutState, TaskStatus};
use crate::config::{Timings, DEFAULT_DEPOSIT_URL};
use crate::events::{DropcartEvent, EventBus};
use crate::notify::Notifier;
use crate::orchestrator::TaskRunner;

/// What a task buys and how.
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub site: Site,
    pub profile: Arc<Profile>,
    pub proxy_list: Option<Arc<ProxyList>>,
    pub mode: Mode,
    pub inputs: Vec<String>,
    pub sizes: Vec<String>,
    pub quantity: u32,
}

/// Runtime knobs shared by every task.
#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    pub timings: Timings,
    pub deposit_url: String,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            deposit_url: DEFAULT_DEPOSIT_URL.to_string(),
        }
    }
}

/// State shared between a task handle and its driver loop.
pub(crate) struct TaskShared {
    pub(crate) id: String,
    pub(crate) settings: TaskSettings,
    pub(crate) options: CheckoutOptions,
    running: AtomicBool,
    wake: Notify,
    status: RwLock<TaskStatus>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) events: Arc<EventBus>,
}

impl TaskShared {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    /// Sleep for `duration`, waking early if the task is stopped.
    pub(crate) async fn pause(&self, duration: std::time::Duration) {
        let notified = self.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if !self.is_running() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = notified => {}
        }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        match self.status.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the status, log it at its severity and broadcast it.
    pub(crate) fn set_status(&self, state: CheckoutState, message: &str, level: StatusLevel) {
        let status = TaskStatus::new(state, message, level);
        match self.status.write() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }

        let site = &self.settings.site.name;
        match level {
            StatusLevel::Error => {
                tracing::warn!(task = %self.id, site = %site, %state, "{message}")
            }
            StatusLevel::Info => tracing::info!(task = %self.id, site = %site, %state, "{message}"),
            StatusLevel::Important | StatusLevel::Success => {
                tracing::info!(task = %self.id, site = %site, %state, important = true, "{message}")
            }
        }

        self.events.emit(DropcartEvent::StatusChanged {
            task: self.id.clone(),
            state,
            message: message.to_string(),
            level,
        });
    }
}

/// Random 8 character hex id.
fn task_id() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}

/// Handle to one checkout task.
#[derive(Clone)]
pub struct CheckoutTask {
    shared: Arc<TaskShared>,
}

impl CheckoutTask {
    pub fn new(
        settings: TaskSettings,
        options: CheckoutOptions,
        notifier: Arc<dyn Notifier>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                id: task_id(),
                settings,
                options,
                running: AtomicBool::new(false),
                wake: Notify::new(),
                status: RwLock::new(TaskStatus::idle()),
                notifier,
                events,
            }),
        }
    }

    pub fn settings(&self) -> &TaskSettings {
        &self.shared.settings
    }

    /// Latest status reported by the driver loop.
    pub fn status(&self) -> TaskStatus {
        self.shared.status()
    }
}

impl TaskRunner for CheckoutTask {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn start(&self, tracker: &TaskTracker) -> bool {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let shared = self.shared.clone();
        tracker.spawn(async move {
            match CheckoutSession::new(shared.clone()) {
                Ok(session) => session.run().await,
                Err(e) => {
                    shared.set_status(
                        CheckoutState::Error,
                        &format!("Error Creating Client ({e})"),
                        StatusLevel::Error,
                    );
                    shared.stop();
                }
            }
        });
        true
    }

    fn stop(&self) {
        self.shared.stop();
    }

    fn is_running(&self) -> bool {
        self.shared.is_running()
    }
}

impl std::fmt::Debug for CheckoutTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutTask")
            .field("id", &self.shared.id)
            .field("site", &self.shared.settings.site.name)
            .field("mode", &self.shared.settings.mode)
            .field("running", &self.shared.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TracingNotifier;

    fn settings() -> TaskSettings {
        TaskSettings {
            site: Site::new("Local", "http://127.0.0.1:9"),
            profile: Arc::new(Profile::default()),
            proxy_list: None,
            mode: Mode::Safe,
            inputs: vec!["+dunk".into()],
            sizes: Vec::new(),
            quantity: 1,
        }
    }

    fn task() -> CheckoutTask {
        CheckoutTask::new(
            settings(),
            CheckoutOptions::default(),
            Arc::new(TracingNotifier),
            Arc::new(EventBus::default()),
        )
    }

    #[test]
    fn test_task_id_format() {
        let id = task_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_new_task_is_idle() {
        let t = task();
        assert!(!t.is_running());
        assert_eq!(t.status(), TaskStatus::idle());
    }

    #[test]
    fn test_set_status_broadcasts() {
        let t = task();
        let mut rx = t.shared.events.subscribe();
        t.shared
            .set_status(CheckoutState::Monitoring, "Monitoring", StatusLevel::Info);

        assert_eq!(t.status().state, CheckoutState::Monitoring);
        match rx.try_recv().unwrap() {
            DropcartEvent::StatusChanged { task, message, .. } => {
                assert_eq!(task, t.id());
                assert_eq!(message, "Monitoring");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let t = task();
        let tracker = TaskTracker::new();
        assert!(t.start(&tracker));
        assert!(!t.start(&tracker));
        t.stop();
        tracker.close();
        tracker.wait().await;
        assert!(!t.is_running());
    }

    #[tokio::test]
    async fn test_pause_wakes_on_stop() {
        let t = task();
        t.shared.running.store(true, Ordering::SeqCst);
        let shared = t.shared.clone();
        let sleeper = tokio::spawn(async move {
            shared.pause(std::time::Duration::from_secs(30)).await;
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        t.stop();
        tokio::time::timeout(std::time::Duration::from_secs(2), sleeper)
            .await
            .expect("pause returns after stop")
            .unwrap();
    }
}
