//! Bearer-token authentication of the two collaborator services.

pub mod claims;
pub mod jwt;

pub use jwt::{FrontendCaller, PaymentsCaller};
