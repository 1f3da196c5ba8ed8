use super::ids::{ParticleId, RestraintId, ScoreStateId};
use thiserror::Error;

/// Coarse classification of a [`ModelError`].
///
/// Optimizers usually only need to know which family an evaluation failure
/// belongs to in order to decide between retrying with adjusted parameters
/// and aborting the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A key is not present on the table being accessed, or a handle/id is out of range.
    Index,
    /// A value cannot be stored (NaN, negative distance parameter, ...).
    Value,
    /// An attribute of a deactivated particle was accessed.
    InactiveParticle,
    /// A nonbonded candidate list grew past its configured maximum.
    Overflow,
    /// A restraint or score state could not be found or has an unexpected type,
    /// or derived state was read before it was computed.
    Lookup,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("{kind} attribute #{index} is not present")]
    AttributeNotFound { kind: &'static str, index: u32 },

    #[error("{kind} attribute #{index} is already present")]
    AttributeExists { kind: &'static str, index: u32 },

    #[error("{kind} data handle #{index} is out of range")]
    HandleOutOfRange { kind: &'static str, index: u32 },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Particle {0:?} is inactive")]
    InactiveParticle(ParticleId),

    #[error("Particle {0:?} not found in model")]
    ParticleNotFound(ParticleId),

    #[error("Restraint {0:?} not found in model")]
    RestraintNotFound(RestraintId),

    #[error("Score state {0:?} not found in model")]
    ScoreStateNotFound(ScoreStateId),

    #[error("Score state {id:?} is not of type {expected}")]
    ScoreStateType {
        id: ScoreStateId,
        expected: &'static str,
    },

    #[error("Nonbonded candidate list exceeded {max} pairs; reduce slack or cutoff")]
    NonbondedOverflow { max: usize },

    #[error("Nonbonded list has no valid candidate cache; update it before iterating pairs")]
    NonbondedListInvalid,
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::AttributeNotFound { .. }
            | ModelError::AttributeExists { .. }
            | ModelError::HandleOutOfRange { .. }
            | ModelError::ParticleNotFound(_) => ErrorKind::Index,
            ModelError::InvalidValue(_) => ErrorKind::Value,
            ModelError::InactiveParticle(_) => ErrorKind::InactiveParticle,
            ModelError::NonbondedOverflow { .. } => ErrorKind::Overflow,
            ModelError::RestraintNotFound(_)
            | ModelError::ScoreStateNotFound(_)
            | ModelError::ScoreStateType { .. }
            | ModelError::NonbondedListInvalid => ErrorKind::Lookup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_onto_expected_kinds() {
        let missing = ModelError::AttributeNotFound {
            kind: "float",
            index: 3,
        };
        assert_eq!(missing.kind(), ErrorKind::Index);
        assert_eq!(
            ModelError::InvalidValue("NaN".into()).kind(),
            ErrorKind::Value
        );
        assert_eq!(
            ModelError::InactiveParticle(ParticleId::default()).kind(),
            ErrorKind::InactiveParticle
        );
        assert_eq!(
            ModelError::NonbondedOverflow { max: 10 }.kind(),
            ErrorKind::Overflow
        );
        assert_eq!(
            ModelError::ScoreStateNotFound(ScoreStateId::default()).kind(),
            ErrorKind::Lookup
        );
    }

    #[test]
    fn display_includes_attribute_kind_and_index() {
        let err = ModelError::AttributeNotFound {
            kind: "int",
            index: 7,
        };
        assert_eq!(err.to_string(), "int attribute #7 is not present");
    }
}
