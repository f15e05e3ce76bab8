//! Shared traits and types for the Pentagram cognitive core: the external
//! collaborator interfaces (LM provider, Memory Store, Clock, Scar File
//! Loader) plus the error type and resilient LM-response parsing that every
//! vertex depends on.

pub mod clock;
pub mod error;
pub mod llm;
pub mod memory;
pub mod scar;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{PentagramError, Result};
pub use llm::{extract_json, LmProvider, StubLmProvider};
pub use memory::{MemoryGroup, MemoryStore, NullMemoryStore, RetrievalMethod};
pub use scar::{FileScarLoader, ScarLoader, StaticScarLoader};
