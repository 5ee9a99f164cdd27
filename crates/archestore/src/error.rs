//! Store error types.

use crate::component::ComponentTypeId;
use crate::entity::EntityId;

/// Errors reported by store operations.
///
/// Every failing operation leaves the world exactly as it was before the call.
/// Allocation failure is not represented here; it aborts through
/// [`std::alloc::handle_alloc_error`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A mutating operation was given a stale or despawned entity.
    #[error("{0} is not alive")]
    DeadEntity(EntityId),

    /// The component type was never registered, or has been despawned.
    #[error("{0} is not a registered component type")]
    UnknownComponent(ComponentTypeId),

    /// A size/alignment pair that cannot describe a component, or supplied
    /// data whose size or alignment does not fit the registered layout.
    #[error("invalid component layout: size {size}, align {align}")]
    InvalidLayout { size: usize, align: usize },

    /// A sized component was added without data.
    #[error("{0} is sized and cannot be added without data")]
    MissingData(ComponentTypeId),

    /// A builder session received the same component type twice.
    #[error("{0} was already added to this entity builder")]
    DuplicateComponent(ComponentTypeId),

    /// A fetch spec names the same component type more than once.
    #[error("{0} is fetched more than once in the same query")]
    ConflictingAccess(ComponentTypeId),

    /// A world configuration document could not be parsed.
    #[error("invalid world configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Shorthand result type for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
