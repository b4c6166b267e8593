pub mod assignments;
pub mod health;
pub mod outcomes;
