pub mod credential;
pub mod scheduled_post;

pub use credential::UserCredential;
pub use scheduled_post::{PostStatus, ScheduledPost};
