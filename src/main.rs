use crate::cli::run;

mod catalog;
pub mod cli;
mod config;
pub mod domain;
mod error;
pub mod http;
mod public_endpoint;
pub mod storage;

fn main() -> anyhow::Result<()> {
    run()
}
