pub mod injector;
pub mod personality;
pub mod snapshot;
pub mod tracker;

pub use injector::ContextInjector;
pub use personality::{BUILTIN_PERSONALITIES, Personality, PersonalityManager};
pub use snapshot::ContextSnapshot;
pub use tracker::ContextTracker;
