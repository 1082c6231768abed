//! The State & Event Registry: scoped key-value data plus an owner-tagged
//! event bus, both guarded by a single re-entrant lock.

pub mod error;
pub mod events;
pub mod registry;
pub mod store;

pub use error::{CallbackOutcome, RegistryError};
pub use events::{Callback, Subscription};
pub use registry::{EmitHandle, Registry};
pub use store::{ExactMatchPolicy, ProtectedKeyPolicy, Scope};
