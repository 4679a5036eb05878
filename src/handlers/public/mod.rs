// Public handlers: no token required to reach them

pub mod login;
pub mod register;
pub mod root;

pub use login::login as auth_login;
pub use register::register as breeder_register;
pub use root::{health, root};
