use crate::CoreError;
use toxide_store::ContextState;

/// A context moves `Created -> Ready` once dependencies are installed and to
/// `Broken` when an installation fails. `Ready` contexts are re-validated on every
/// run. `Broken` contexts are never updated again: they are recreated.
pub fn validate_transition(from: ContextState, to: ContextState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (
            ContextState::Created | ContextState::Ready,
            ContextState::Ready | ContextState::Broken
        )
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(ContextState::Created, ContextState::Ready).is_ok());
        assert!(validate_transition(ContextState::Created, ContextState::Broken).is_ok());
        assert!(validate_transition(ContextState::Ready, ContextState::Ready).is_ok()); // reuse
        assert!(validate_transition(ContextState::Ready, ContextState::Broken).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(ContextState::Broken, ContextState::Ready).is_err());
        assert!(validate_transition(ContextState::Broken, ContextState::Created).is_err());
        assert!(validate_transition(ContextState::Ready, ContextState::Created).is_err());
        assert!(validate_transition(ContextState::Created, ContextState::Created).is_err());
    }
}
