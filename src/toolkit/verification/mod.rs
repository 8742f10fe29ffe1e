pub mod deleted;
pub mod restored;

pub use deleted::{
    DeletedCheck, MissingItem, PresenceReport, PresentItem, check_present, verify_deleted,
};
pub use restored::{FieldDiff, RestoredCheck, verify_restored};
