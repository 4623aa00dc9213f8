//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod api_keys;
mod directory;
mod repository;

pub use api_keys::ApiKeyStore;
pub use directory::EmployeeDirectory;
pub use repository::PayrollRepository;

/// Everything the payroll service needs from its store.
pub trait PayrollStore: PayrollRepository + EmployeeDirectory + ApiKeyStore {}

impl<T> PayrollStore for T where T: PayrollRepository + EmployeeDirectory + ApiKeyStore {}
