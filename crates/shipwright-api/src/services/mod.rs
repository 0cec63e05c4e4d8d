//! Services used by the API routes.

pub mod gateway;
