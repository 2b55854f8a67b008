use crate::config::types::CooldownScope;
use crate::scan::key::submission_key;
use crate::scan::types::{DropReason, ScanEvent, ScanPhase};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSessionState {
    pub is_processing: bool,
    pub is_cooldown: bool,
    pub last_code: Option<String>,
}

/// Gatekeeping for scans. Timers and IO live in the controller; this only
/// tracks the flags and decides whether a scan may become a submission.
#[derive(Debug, Clone)]
pub struct ScanSession {
    state: ScanSessionState,
    scope: CooldownScope,
    // the submission finished and its notification waits to be dismissed
    result_pending: bool,
}

impl ScanSession {
    pub fn new(scope: CooldownScope) -> Self {
        ScanSession {
            state: ScanSessionState::default(),
            scope,
            result_pending: false,
        }
    }

    pub fn state(&self) -> &ScanSessionState {
        &self.state
    }

    pub fn phase(&self) -> ScanPhase {
        match (self.state.is_processing, self.state.is_cooldown) {
            (true, cooldown) => ScanPhase::Submitting { cooldown },
            (false, true) => ScanPhase::CooldownOnly,
            (false, false) => ScanPhase::Idle,
        }
    }

    /// On success returns the submission key; processing and cooldown are
    /// both active from here on.
    pub fn try_accept(&mut self, event: &ScanEvent) -> Result<String, DropReason> {
        if self.state.is_processing {
            return Err(DropReason::Processing);
        }

        if self.state.is_cooldown {
            if self.scope == CooldownScope::Global {
                return Err(DropReason::Cooldown);
            }

            if self.state.last_code.as_deref() == Some(event.code.as_str()) {
                return Err(DropReason::Repeat);
            }
        }

        let key = submission_key(&event.code);
        if key.is_empty() {
            return Err(DropReason::EmptyKey);
        }
        let key = key.to_string();

        self.state.is_processing = true;
        self.state.is_cooldown = true;
        self.state.last_code = Some(event.code.clone());

        Ok(key)
    }

    /// The submission returned; processing continues until the result is
    /// acknowledged.
    pub fn complete(&mut self) {
        if self.state.is_processing {
            self.result_pending = true;
        }
    }

    /// The user dismissed the result of the submission. `last_code` is kept
    /// whether the submission succeeded or not. Returns false when no result
    /// was waiting, which includes a submission that is still in flight.
    pub fn acknowledge(&mut self) -> bool {
        if !self.result_pending {
            return false;
        }

        self.result_pending = false;
        self.state.is_processing = false;
        true
    }

    pub fn expire_cooldown(&mut self) {
        self.state.is_cooldown = false;
    }
}
