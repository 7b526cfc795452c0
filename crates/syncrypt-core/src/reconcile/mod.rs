pub mod classifier;
pub mod deletion;

pub use classifier::{classify, Classification};
pub use deletion::{
    apply_deletions, detect_deletions, review_deletions, DeletionReport, DetectReport,
};
