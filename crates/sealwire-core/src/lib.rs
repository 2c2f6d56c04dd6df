pub mod config;
pub mod encoding;
pub mod error;
pub mod types;

pub use config::{CipherConfig, KdfConfig, LogConfig, LogFormat, SealwireConfig, StreamConfig};
pub use encoding::IntEncoding;
pub use error::{SealError, SealResult};
pub use types::{CipherSuite, NonceMode};
