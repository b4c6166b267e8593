pub mod assignment_repo;
pub mod error;
pub mod provider_repo;
