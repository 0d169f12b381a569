// Pipeline processing: lookups, the transform runtime and entity classification

pub mod classify;
pub mod lookup;
pub mod transform;

pub use classify::{classify, split_entities, ClassifiedEntities, Entity, EntityKind};
pub use transform::{RecordOutcome, RunSummary, Transform, TransformBuilder, TransformContext, TransformRunner};
