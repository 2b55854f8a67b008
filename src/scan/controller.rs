use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use futures::channel::mpsc::{channel, Sender};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;

use crate::api::OrderApi;
use crate::config::types::{Config, CooldownScope};
use crate::error::OrderError;
use crate::scan::session::ScanSession;
use crate::scan::types::{Notification, ScanCommand, ScanControllerEvent, ScanPhase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanControllerSettings {
    pub owner_name: String,
    pub cooldown: Duration,
    pub scope: CooldownScope,
}

impl From<&Config> for ScanControllerSettings {
    fn from(config: &Config) -> Self {
        ScanControllerSettings {
            owner_name: config.owner_name.clone(),
            cooldown: config.cooldown(),
            scope: config.cooldown_scope,
        }
    }
}

struct Submission {
    key: String,
    handle: JoinHandle<Result<(), OrderError>>,
}

fn dispatch(api: Arc<dyn OrderApi>, key: String, owner_name: String) -> Submission {
    let task_key = key.clone();
    let handle = spawn(async move {
        api.create_unit_item_order(&task_key, &owner_name).await
    });

    Submission { key, handle }
}

async fn wait_submission(submission: &mut Option<Submission>) -> Result<Result<(), OrderError>, JoinError> {
    match submission {
        Some(submission) => (&mut submission.handle).await,
        None => pending().await,
    }
}

async fn wait_cooldown(cooldown: &mut Option<Pin<Box<Sleep>>>) {
    match cooldown {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

// false if the controller should stop: torn down, or nobody is listening anymore
async fn emit(cancel: &CancellationToken, events: &mut Sender<ScanControllerEvent>, event: ScanControllerEvent) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        result = events.send(event) => match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Scan controller event receiver is gone: {:?}", err);
                false
            },
        },
    }
}

fn notification_for(key: String, result: Result<Result<(), OrderError>, JoinError>) -> Notification {
    match result {
        Ok(Ok(())) => {
            info!("Order submitted for key {}", key);
            Notification::Submitted { key }
        },
        Ok(Err(err)) => {
            warn!("Order submission for key {} failed: {}", key, err);
            Notification::Failed { key, reason: err.to_string(), unauthorized: err.is_unauthorized() }
        },
        Err(err) => {
            error!("Order submission task for key {} did not finish: {:?}", key, err);
            Notification::Failed { key, reason: format!("submission task failed: {}", err), unauthorized: false }
        },
    }
}

/// Spawn the scan ingestion controller.
///
/// Scans and acknowledgments go into the returned sender; phase changes and
/// one notification per finished submission come out of `events`. Cancelling
/// `cancel` tears the controller down: an in-flight submission is aborted and
/// nothing is emitted afterwards. Closing the command channel is the gentle
/// way out: a submission still in flight gets its notification first. Every
/// spawn starts from a fresh session.
pub fn scan_controller(
    cancel: CancellationToken,
    api: Arc<dyn OrderApi>,
    settings: ScanControllerSettings,
    mut events: Sender<ScanControllerEvent>,
) -> (Sender<ScanCommand>, JoinHandle<()>) {
    let (command_sender, mut command_receiver) = channel::<ScanCommand>(128);

    let handle = spawn(async move {
        let mut session = ScanSession::new(settings.scope);
        let mut previous_phase: Option<ScanPhase> = None;
        let mut submission: Option<Submission> = None;
        let mut cooldown: Option<Pin<Box<Sleep>>> = None;
        // scan input closed while a submission was in flight
        let mut draining = false;

        'mainloop: loop {
            let phase = session.phase();
            if previous_phase != Some(phase) {
                debug!("Scan phase {:?}", phase);
                if !emit(&cancel, &mut events, ScanControllerEvent::StateChange(phase)).await {
                    break 'mainloop;
                }
                previous_phase = Some(phase);
            }

            if draining && submission.is_none() {
                break 'mainloop;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                result = wait_submission(&mut submission) => {
                    let key = submission.take().map(|submission| submission.key).unwrap_or_default();
                    let notification = notification_for(key, result);
                    session.complete();

                    if !emit(&cancel, &mut events, ScanControllerEvent::Notification(notification)).await {
                        break 'mainloop;
                    }
                },
                _ = wait_cooldown(&mut cooldown) => {
                    debug!("Cooldown expired");
                    cooldown = None;
                    session.expire_cooldown();
                },
                command = command_receiver.next(), if !draining => match command {
                    None => {
                        if submission.is_none() {
                            info!("All scan sources are gone, stopping scan controller");
                            break 'mainloop;
                        }
                        info!("All scan sources are gone, finishing the in-flight submission");
                        draining = true;
                    },
                    Some(ScanCommand::Scan(event)) => {
                        match session.try_accept(&event) {
                            Err(reason) => debug!("Dropped scan {:?}: {}", event.code, reason),
                            Ok(key) => {
                                info!("Accepted scan {:?}, submitting key {}", event.code, key);
                                submission = Some(dispatch(api.clone(), key, settings.owner_name.clone()));
                                // measured from dispatch, not from the response
                                cooldown = Some(Box::pin(sleep(settings.cooldown)));
                            },
                        }
                    },
                    Some(ScanCommand::Acknowledge) => {
                        if !session.acknowledge() {
                            debug!("Acknowledge without a pending notification, ignoring");
                        }
                    },
                },
            }
        }

        if let Some(submission) = submission.take() {
            info!("Aborting in-flight submission for key {}", submission.key);
            submission.handle.abort();
        }
    });

    (command_sender, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use async_trait::async_trait;
    use futures::channel::mpsc::Receiver;
    use tokio::task::yield_now;
    use tokio::time::{sleep_until, Instant};

    use crate::scan::types::ScanEvent;

    struct MockOrderApi {
        latency: Duration,
        failures: Mutex<VecDeque<OrderError>>,
        calls: Mutex<Vec<(String, String)>>,
        completed: AtomicUsize,
    }

    impl MockOrderApi {
        fn new(latency: Duration) -> Self {
            MockOrderApi {
                latency,
                failures: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                completed: AtomicUsize::new(0),
            }
        }

        fn fail_next(&self, err: OrderError) {
            self.failures.lock().unwrap().push_back(err);
        }

        fn keys(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(key, _)| key.clone()).collect()
        }
    }

    #[async_trait]
    impl OrderApi for MockOrderApi {
        async fn create_unit_item_order(&self, key: &str, owner_name: &str) -> Result<(), OrderError> {
            self.calls.lock().unwrap().push((key.to_string(), owner_name.to_string()));
            sleep(self.latency).await;
            self.completed.fetch_add(1, Ordering::SeqCst);

            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    struct Harness {
        api: Arc<MockOrderApi>,
        cancel: CancellationToken,
        commands: Sender<ScanCommand>,
        events: Receiver<ScanControllerEvent>,
        handle: JoinHandle<()>,
    }

    impl Harness {
        fn start(latency: Duration, scope: CooldownScope) -> Self {
            let api = Arc::new(MockOrderApi::new(latency));
            let cancel = CancellationToken::new();
            let (event_sender, events) = channel::<ScanControllerEvent>(64);
            let settings = ScanControllerSettings {
                owner_name: "Stall 4".to_string(),
                cooldown: Duration::from_millis(5000),
                scope,
            };

            let (commands, handle) = scan_controller(cancel.clone(), api.clone(), settings, event_sender);
            Harness { api, cancel, commands, events, handle }
        }

        async fn scan(&mut self, code: &str) {
            self.commands.send(ScanCommand::Scan(ScanEvent::new(code))).await.unwrap();
            settle().await;
        }

        async fn acknowledge(&mut self) {
            self.commands.send(ScanCommand::Acknowledge).await.unwrap();
            settle().await;
        }

        async fn next_notification(&mut self) -> Notification {
            loop {
                match self.events.next().await {
                    Some(ScanControllerEvent::Notification(notification)) => return notification,
                    Some(ScanControllerEvent::StateChange(_)) => continue,
                    None => panic!("controller stopped before notifying"),
                }
            }
        }

        // drains what is queued right now
        fn queued_events(&mut self) -> Vec<ScanControllerEvent> {
            let mut events = Vec::new();
            while let Ok(Some(event)) = self.events.try_next() {
                events.push(event);
            }
            events
        }

        fn calls(&self) -> Vec<String> {
            self.api.keys()
        }
    }

    // lets the controller and submission tasks run without moving the paused clock
    async fn settle() {
        for _ in 0..20 {
            yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_scan_submits_key_and_owner() {
        let mut harness = Harness::start(Duration::from_millis(200), CooldownScope::Global);

        harness.scan("https://trackit.app/order/abc123").await;

        assert_eq!(
            harness.api.calls.lock().unwrap().clone(),
            vec![("abc123".to_string(), "Stall 4".to_string())],
        );
        assert_eq!(harness.next_notification().await, Notification::Submitted { key: "abc123".to_string() });
    }

    #[tokio::test(start_paused = true)]
    async fn emits_phase_changes() {
        let mut harness = Harness::start(Duration::from_millis(200), CooldownScope::Global);
        settle().await;

        harness.scan(".../order/abc123").await;
        let notification = harness.next_notification().await;
        assert!(notification.is_success());
        harness.acknowledge().await;
        sleep(Duration::from_millis(6000)).await;
        settle().await;

        let phases: Vec<ScanControllerEvent> = harness.queued_events();
        assert_eq!(phases, vec![
            ScanControllerEvent::StateChange(ScanPhase::CooldownOnly),
            ScanControllerEvent::StateChange(ScanPhase::Idle),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn scans_while_in_flight_are_dropped() {
        // latency outlives the cooldown, so only processing blocks the second code
        let mut harness = Harness::start(Duration::from_millis(10_000), CooldownScope::Global);

        harness.scan(".../order/abc123").await;
        sleep(Duration::from_millis(6000)).await;
        settle().await;
        harness.scan(".../order/xyz789").await;
        harness.scan(".../order/abc123").await;

        assert_eq!(harness.calls(), vec!["abc123"]);

        harness.next_notification().await;
        harness.acknowledge().await;
        harness.scan(".../order/xyz789").await;

        assert_eq!(harness.calls(), vec!["abc123", "xyz789"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_result_keeps_blocking() {
        let mut harness = Harness::start(Duration::from_millis(100), CooldownScope::Global);

        harness.scan(".../order/abc123").await;
        harness.next_notification().await;
        sleep(Duration::from_millis(6000)).await;
        settle().await;

        harness.scan(".../order/xyz789").await;
        assert_eq!(harness.calls(), vec!["abc123"]);

        harness.acknowledge().await;
        harness.scan(".../order/xyz789").await;
        assert_eq!(harness.calls(), vec!["abc123", "xyz789"]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_and_other_codes_are_dropped_during_cooldown() {
        let mut harness = Harness::start(Duration::from_millis(100), CooldownScope::Global);

        harness.scan(".../order/abc123").await;
        harness.next_notification().await;
        harness.acknowledge().await;

        harness.scan(".../order/abc123").await;
        harness.scan(".../order/xyz789").await;

        assert_eq!(harness.calls(), vec!["abc123"]);
        assert!(harness.queued_events().iter().all(|event| !matches!(event, ScanControllerEvent::Notification(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_lasts_five_seconds_from_dispatch() {
        let mut harness = Harness::start(Duration::from_millis(2000), CooldownScope::Global);
        let dispatched_at = Instant::now();

        harness.scan(".../order/abc123").await;
        harness.next_notification().await;
        harness.acknowledge().await;

        sleep_until(dispatched_at + Duration::from_millis(4999)).await;
        settle().await;
        harness.scan(".../order/xyz789").await;
        assert_eq!(harness.calls(), vec!["abc123"]);

        sleep_until(dispatched_at + Duration::from_millis(5001)).await;
        settle().await;
        harness.scan(".../order/xyz789").await;
        assert_eq!(harness.calls(), vec!["abc123", "xyz789"]);
    }

    #[tokio::test(start_paused = true)]
    async fn same_code_is_accepted_after_cooldown() {
        let mut harness = Harness::start(Duration::from_millis(100), CooldownScope::Global);

        harness.scan(".../order/abc123").await;
        harness.next_notification().await;
        harness.acknowledge().await;
        sleep(Duration::from_millis(5000)).await;
        settle().await;

        harness.scan(".../order/abc123").await;
        assert_eq!(harness.calls(), vec!["abc123", "abc123"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_is_not_retried_until_cooldown_expires() {
        let mut harness = Harness::start(Duration::from_millis(100), CooldownScope::Global);
        harness.api.fail_next(OrderError::Timeout);

        harness.scan(".../order/abc123").await;
        let notification = harness.next_notification().await;
        assert_eq!(notification, Notification::Failed {
            key: "abc123".to_string(),
            reason: OrderError::Timeout.to_string(),
            unauthorized: false,
        });
        harness.acknowledge().await;

        harness.scan(".../order/abc123").await;
        assert_eq!(harness.calls(), vec!["abc123"]);

        sleep(Duration::from_millis(5000)).await;
        settle().await;
        harness.scan(".../order/abc123").await;
        assert_eq!(harness.calls(), vec!["abc123", "abc123"]);
        assert!(harness.next_notification().await.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_failure_is_flagged() {
        let mut harness = Harness::start(Duration::from_millis(100), CooldownScope::Global);
        harness.api.fail_next(OrderError::Unauthorized { status: 401 });

        harness.scan(".../order/abc123").await;

        match harness.next_notification().await {
            Notification::Failed { unauthorized, .. } => assert!(unauthorized),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn per_code_scope_accepts_other_codes_during_cooldown() {
        let mut harness = Harness::start(Duration::from_millis(100), CooldownScope::PerCode);

        harness.scan(".../order/abc123").await;
        harness.next_notification().await;
        harness.acknowledge().await;

        harness.scan(".../order/abc123").await;
        harness.scan(".../order/xyz789").await;

        assert_eq!(harness.calls(), vec!["abc123", "xyz789"]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_submission_stops_everything() {
        let mut harness = Harness::start(Duration::from_millis(1000), CooldownScope::Global);

        harness.scan(".../order/abc123").await;
        assert_eq!(harness.calls(), vec!["abc123"]);

        harness.cancel.cancel();
        let handle = harness.handle;
        handle.await.unwrap();
        sleep(Duration::from_millis(10_000)).await;
        settle().await;

        assert_eq!(harness.api.completed.load(Ordering::SeqCst), 0);

        let mut events = Vec::new();
        while let Some(event) = harness.events.next().await {
            events.push(event);
        }
        assert!(events.iter().all(|event| matches!(event, ScanControllerEvent::StateChange(_))));
        assert!(harness.commands.send(ScanCommand::Acknowledge).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_input_finishes_in_flight_submission() {
        let harness = Harness::start(Duration::from_millis(1000), CooldownScope::Global);
        let Harness { api, mut commands, mut events, handle, .. } = harness;

        commands.send(ScanCommand::Scan(ScanEvent::new(".../order/abc123"))).await.unwrap();
        commands.close_channel();
        handle.await.unwrap();

        let mut notifications = Vec::new();
        while let Some(event) = events.next().await {
            if let ScanControllerEvent::Notification(notification) = event {
                notifications.push(notification);
            }
        }
        assert_eq!(notifications, vec![Notification::Submitted { key: "abc123".to_string() }]);
        assert_eq!(api.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_all_senders_stops_the_controller() {
        let harness = Harness::start(Duration::from_millis(100), CooldownScope::Global);
        let Harness { commands, handle, .. } = harness;

        drop(commands);
        handle.await.unwrap();
    }
}
