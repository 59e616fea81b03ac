//! Utility functions shared across the crate.
//!
//! - **URL validation**: scheme/host checks for candidate feed URLs
//! - **Text processing**: control-character stripping for feed metadata
//! - **Files**: atomic write-then-rename for index files
//! - **Clock**: injectable time source for TTL and throttle logic

mod clock;
mod fs;
mod text;
mod url_validator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fs::atomic_write;
pub use text::{collapse_whitespace, strip_control_chars};
pub use url_validator::{validate_url, HostPolicy, UrlValidationError};
