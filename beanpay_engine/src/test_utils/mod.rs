//! Helpers for setting up throwaway databases in tests.

pub mod prepare_env;
