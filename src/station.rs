use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use futures::channel::mpsc::channel;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;

use crate::api::OrderApi;
use crate::error::AppRunError;
use crate::scan::controller::{scan_controller, ScanControllerSettings};
use crate::scan::types::{Notification, ScanCommand, ScanControllerEvent, ScanEvent, ScannedPayload};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StationSummary {
    pub scans: usize,
    pub notifications: Vec<Notification>,
}

/// A keyboard wedge types the raw payload; camera bridges send `{"data": "..."}`.
pub fn parse_scan_line(line: &str) -> Option<ScanEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') {
        match serde_json::from_str::<ScannedPayload>(line) {
            Ok(payload) => return Some(payload.into()),
            Err(err) => debug!("Scan line looks like JSON but is not a payload ({}), using it as is", err),
        }
    }

    Some(ScanEvent::new(line))
}

fn show_notification(notification: &Notification) {
    match notification {
        Notification::Submitted { .. } => println!("[OK] {}", notification),
        Notification::Failed { unauthorized, .. } => {
            println!("[FAILED] {}", notification);
            if *unauthorized {
                warn!("The auth token was rejected; store a fresh one with `trackit-scan config set --token <TOKEN>`");
            }
        },
    }
}

async fn wait_ack(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

/// Feed every line of `input` to a fresh scan controller until the input ends.
///
/// Notifications are printed and dismissed after `ack_delay`. Lines keep being
/// read while a notification is up, so the controller drops them. When the
/// input ends, a submission that is still in flight is allowed to finish.
pub async fn run_station<R>(
    api: Arc<dyn OrderApi>,
    settings: ScanControllerSettings,
    ack_delay: Duration,
    input: R,
) -> Result<StationSummary, AppRunError>
where
    R: AsyncBufRead + Unpin,
{
    let cancel = CancellationToken::new();
    let (event_sender, mut events) = channel::<ScanControllerEvent>(64);
    let (mut commands, controller) = scan_controller(cancel.clone(), api, settings, event_sender);

    let mut lines = input.lines();
    let mut input_done = false;
    let mut ack_timer: Option<Pin<Box<Sleep>>> = None;
    let mut summary = StationSummary::default();

    'mainloop: loop {
        tokio::select! {
            line = lines.next_line(), if !input_done => match line? {
                None => {
                    info!("Scanner input closed");
                    input_done = true;
                    commands.close_channel();
                },
                Some(line) => {
                    if let Some(event) = parse_scan_line(&line) {
                        summary.scans += 1;
                        commands.send(ScanCommand::Scan(event)).await?;
                    }
                },
            },
            event = events.next() => match event {
                None => break 'mainloop,
                Some(ScanControllerEvent::StateChange(phase)) => debug!("Station phase {:?}", phase),
                Some(ScanControllerEvent::Notification(notification)) => {
                    show_notification(&notification);
                    summary.notifications.push(notification);

                    if ack_delay.is_zero() {
                        if !input_done {
                            commands.send(ScanCommand::Acknowledge).await?;
                        }
                    } else {
                        ack_timer = Some(Box::pin(sleep(ack_delay)));
                    }
                },
            },
            _ = wait_ack(&mut ack_timer) => {
                ack_timer = None;
                if !input_done {
                    commands.send(ScanCommand::Acknowledge).await?;
                }
            },
        }
    }

    cancel.cancel();
    controller.await?;
    Ok(summary)
}
