//! The HTTP surface: RPC-style JSON endpoints under `/api/v1`.

pub mod auth;
pub mod handlers;
pub mod routes;
