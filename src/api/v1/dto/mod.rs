pub mod outcomes;
