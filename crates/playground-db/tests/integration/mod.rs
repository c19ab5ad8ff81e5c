mod common;
mod session_tests;
