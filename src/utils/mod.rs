//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{calculate_checksum, content_type, is_text_file, read_file_content};
pub use retry::{Backoff, RetryConfig, RetryResult, Retryable, with_retry};
pub use text::{mask_secret, preview};
