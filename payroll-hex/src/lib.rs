//! # Payroll Hex
//!
//! Application service layer and HTTP adapter for the payroll service.
//!
//! ## Architecture
//!
//! - `service/` - Application service (the lifecycle engine entry point)
//! - `inbound/` - HTTP adapter (Axum server, API-key auth, role gate)
//! - `openapi/` - OpenAPI document served under `/api-docs`
//!
//! The service is generic over `R: PayrollStore`, allowing
//! different repository implementations to be injected.

pub mod inbound;
pub mod openapi;
pub mod service;


pub use service::PayrollService;
