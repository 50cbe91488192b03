use crate::grid::EntityId;
use crate::state::StateSlot;

/// Errors raised by the AD algebra and the dof registry.
///
/// None of these are recoverable in the numerical sense: they signal a bad
/// registration or mismatched operands on the caller's side.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Operands of an elementwise or matrix operation have incompatible sizes.
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    Shape {
        context: &'static str,
        expected: String,
        found: String,
    },
    /// The (entity, variable) pair was never registered.
    #[error("No block registered for variable '{variable}' on {entity}")]
    UnknownBlock { entity: EntityId, variable: String },
    /// The state store holds no value for a registered block.
    #[error("No values stored for variable '{variable}' on {entity} ({slot})")]
    MissingValue {
        entity: EntityId,
        variable: String,
        slot: StateSlot,
    },
    #[error("Index {index} is larger than system size {size}")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("Dof indices should be non-negative, got {0}")]
    NegativeIndex(i64),
    /// An operand of the wrong kind was passed where an AdArray was required.
    #[error("Type error: {0}")]
    Type(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn shape(
        context: &'static str,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Error::Shape {
            context,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
