pub mod auth;
pub mod response;

pub use auth::{jwt_auth_middleware, Authorized, Gate, GateRejection, Intent};
pub use response::{ApiResponse, ApiResult};
