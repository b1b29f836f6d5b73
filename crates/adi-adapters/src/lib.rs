//! adi-adapters: orchestration built on top of `adi-providers`'
//! `ContainerRuntime` and `OmeroGateway` traits.
//!
//! - `preprocessor`: component E — tail-JSON parsing with a directory-scan
//!   fallback, one container run per file.
//! - `importer`: component F — CLI invocation, identifier collection,
//!   symlink rewiring, CSV/keyvalue metadata attachment.

mod error;
mod importer;
mod preprocessor;

pub use error::{ImportError, PreprocessError};
pub use importer::{ImportReport, Importer, ImporterConfig};
pub use preprocessor::{PreprocessedFile, PreprocessedOrder, Preprocessor};
