//! Domain model: identifiers, sprint stages and the interval records the
//! engine produces.

pub mod ids;
pub mod records;
pub mod stage;

pub use ids::{DomainId, EntityKind, IdGenerator, PrefixedIdGenerator};
pub use records::{
    FieldInterval, MembershipInterval, Record, SprintMetadata, StageHistoryRecord, TrackedField,
    UNASSIGNED,
};
pub use stage::Stage;
