mod common;
mod event_tests;
