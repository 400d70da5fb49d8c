//! xcframework_bundler - builds OpenLDAP XCFrameworks for Apple platforms.
//!
//! This binary cross-builds the library for every configured target and packages
//! the result as static and dynamic XCFrameworks with a matching Package.swift.

use std::process;
use xcframework_bundler::cli;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    process::exit(exit_code);
}
