/// Listing (post) lifecycle
///
/// Approval status and publication status are independent axes; `is_deleted`
/// is an orthogonal, monotonic soft-delete flag. Every mutation after
/// creation is diffed against the previous snapshot and recorded in the
/// append-only post history.
pub mod history;
pub mod posts;

pub use history::{ChangeType, PostHistory};
pub use posts::{
    ApprovalStatus, BumpOutcome, NewPost, Post, PostManager, PostStatus, PostUpdate,
};
