//! Rate limiting logic and state management.

mod clock;
mod counter;
mod identifier;
mod limiter;
pub mod policy;
mod registry;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::CounterEntry;
pub use identifier::{derive_identifier, derive_identifier_from, user_agent_hash, UNKNOWN};
pub use limiter::{Decision, RateLimiter};
pub use policy::Policy;
pub use registry::PolicySet;
pub use sweeper::SweepHandle;
