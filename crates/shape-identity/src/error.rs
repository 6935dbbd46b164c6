use uuid::Uuid;

/// Errors from identity bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("shape id {id} is not in the history graph")]
    UnknownShape { id: Uuid },
}
