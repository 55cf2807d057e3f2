//! Causal diagnostics: redacting message templates, error annotations, the causal console and
//! stack filtering.

pub mod annotations;
pub mod console;
pub mod details;
pub mod stack;

pub use annotations::assert;
pub use annotations::assert_equal;
pub use annotations::assert_typeof;
pub use annotations::fail;
pub use annotations::make_error;
pub use annotations::note;
pub use details::details;
pub use details::quote;
pub use details::redact;
pub use details::Details;
