use dataship_core::{DatasetRecord, ProgressSnapshot};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::UploadError;

/// Event delivered through an upload handle.
///
/// `Finished` and `Error` are terminal: exactly one of them is sent, and
/// nothing follows it.
#[derive(Debug)]
pub enum UploadEvent {
    Progress(ProgressSnapshot),
    Finished(DatasetRecord),
    Error(UploadError),
}

impl UploadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadEvent::Progress(_))
    }
}

/// Phase of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Init,
    FetchingCredentials,
    Transferring,
    RegisteringDataset,
    Done,
    Failed,
}

impl UploadState {
    /// Phases advance one step at a time; `Failed` is reachable from any
    /// state that is not already terminal.
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Init, FetchingCredentials)
                | (FetchingCredentials, Transferring)
                | (Transferring, RegisteringDataset)
                | (RegisteringDataset, Done)
                | (Init | FetchingCredentials | Transferring | RegisteringDataset, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Done | UploadState::Failed)
    }
}

impl Display for UploadState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadState::Init => write!(f, "init"),
            UploadState::FetchingCredentials => write!(f, "fetching_credentials"),
            UploadState::Transferring => write!(f, "transferring"),
            UploadState::RegisteringDataset => write!(f, "registering_dataset"),
            UploadState::Done => write!(f, "done"),
            UploadState::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::UploadState::*;

    #[test]
    fn happy_path_advances_one_step_at_a_time() {
        let path = [Init, FetchingCredentials, Transferring, RegisteringDataset, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!Init.can_transition_to(Transferring));
        assert!(!FetchingCredentials.can_transition_to(RegisteringDataset));
        assert!(!Transferring.can_transition_to(Done));
    }

    #[test]
    fn failed_is_reachable_from_non_terminal_states_only() {
        for state in [Init, FetchingCredentials, Transferring, RegisteringDataset] {
            assert!(state.can_transition_to(Failed));
        }
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }
}
