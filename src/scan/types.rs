use serde::{Deserialize, Serialize};

/// A decoded symbol, as handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub code: String,
}

impl ScanEvent {
    pub fn new(code: impl Into<String>) -> Self {
        ScanEvent { code: code.into() }
    }
}

/// The payload shape camera readers deliver: `{"data": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedPayload {
    pub data: String,
}

impl From<ScannedPayload> for ScanEvent {
    fn from(payload: ScannedPayload) -> Self {
        ScanEvent { code: payload.data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    // also covers waiting for the user to dismiss the result
    Submitting { cooldown: bool },
    CooldownOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Processing,
    Cooldown,
    Repeat,
    EmptyKey,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            DropReason::Processing => "a submission is still being processed",
            DropReason::Cooldown => "cooldown is active",
            DropReason::Repeat => "same code as the last accepted scan",
            DropReason::EmptyKey => "code has no usable key",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Submitted { key: String },
    Failed { key: String, reason: String, unauthorized: bool },
}

impl Notification {
    pub fn key(&self) -> &str {
        match self {
            Notification::Submitted { key } => key,
            Notification::Failed { key, .. } => key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notification::Submitted { .. })
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::Submitted { key } => write!(f, "Order created for {}", key),
            Notification::Failed { key, reason, .. } => write!(f, "Could not create order for {}: {}", key, reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCommand {
    Scan(ScanEvent),
    /// The user dismissed the last notification.
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanControllerEvent {
    StateChange(ScanPhase),
    Notification(Notification),
}
