//! Helpers for tests: throwaway databases, recording fakes of the external collaborators, and seed data.
pub mod fakes;
pub mod prepare_env;
pub mod seed;
