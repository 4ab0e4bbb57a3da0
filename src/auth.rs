pub mod demo_auth;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod session;
