// src/discovery/sources/mod.rs
pub mod builtin;
pub mod status_page;

pub use builtin::BuiltinSource;
pub use status_page::StatusPageSource;

/// Browser-like user agent; several listing pages reject library defaults.
pub(crate) const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
