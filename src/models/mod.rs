pub mod legacy;
pub mod queue_item;
pub mod submission;

pub use legacy::LegacyEntry;
pub use queue_item::{DeliveryStage, ItemBody, ItemKind, ItemState, QueueItem};
pub use submission::{Location, SubmissionPayload};
