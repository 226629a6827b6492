use crate::CoreError;
use std::fmt;

/// Calculator lifecycle states.
///
/// `Empty` means no structure has been set; `Ready` means a structure is
/// present but no valid cached result exists; `Valid` means cached results
/// are consistent with the current parameters and structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcState {
    Empty,
    Ready,
    Valid,
}

impl fmt::Display for CalcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Ready => "ready",
            Self::Valid => "valid",
        };
        write!(f, "{name}")
    }
}

pub fn validate_transition(from: CalcState, to: CalcState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (CalcState::Empty, CalcState::Empty | CalcState::Ready)
            | (CalcState::Ready, CalcState::Ready | CalcState::Valid)
            | (CalcState::Valid, CalcState::Valid | CalcState::Ready)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
