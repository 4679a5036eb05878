// Protected handlers: every route here checks a bearer token through the
// gate before it touches the store. Collection reads are the exception and
// fall back to a count when no Authorization header is sent.

pub mod asset;
pub mod breeder;
pub mod dog;
pub mod image;
pub mod litter;
pub mod whoami;

pub use asset::{list as asset_list, show as asset_show, ReadQuery};
pub use whoami::whoami as auth_whoami;
