// Two tiers:
// Public (no token) → Protected (bearer token checked by the gate)

pub mod protected;
pub mod public;

pub use protected::*;
pub use public::*;
