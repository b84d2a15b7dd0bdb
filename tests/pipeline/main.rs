#[path = "../support/mod.rs"]
mod support;

mod http_fetch;
mod runner;
