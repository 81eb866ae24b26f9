pub mod engine;
pub mod materialize;
pub mod normalize;
pub mod payload;
pub mod server;
pub mod settings;

/// Built-in defaults; most can be overridden through [`settings::Settings`]
pub mod config {
    /// Suffix for images whose source gives no usable extension
    pub const DEFAULT_EXTENSION: &str = ".jpg";

    /// Prefix of every temporary image file
    pub const TEMP_PREFIX: &str = "face-api-";

    /// Largest request body buffered in memory (20 MiB)
    pub const MAX_PAYLOAD_BYTES: usize = 20 * 1024 * 1024;

    /// Filter used when neither `RUST_LOG` nor a configured level is set
    pub const RUST_LOG: &str = "info";
}
