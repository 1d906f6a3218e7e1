//! Startup banner

use super::config::{AppConfig, is_all_interfaces};
use super::constants::APP_NAME;

/// Print the startup banner with the API address and loaded sources
pub fn print_banner(config: &AppConfig) {
    let host = config.server.host.as_str();
    let port = config.server.port;
    // Use localhost for display when binding to all interfaces
    let display_host = if is_all_interfaces(host) {
        "localhost"
    } else {
        host
    };

    const W: usize = 10;

    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m http://{}:{}/api/v1/epidata/",
        "API:", display_host, port
    );

    let database = config
        .database
        .path
        .as_ref()
        .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string());
    println!("  \x1b[90m➜  {:<W$} {}\x1b[0m", "Database:", database);

    let sources: Vec<&str> = config.datasets.keys().map(String::as_str).collect();
    println!(
        "  \x1b[90m➜  {:<W$} {}\x1b[0m",
        "Sources:",
        if sources.is_empty() {
            "none configured".to_string()
        } else {
            sources.join(", ")
        }
    );
    if config.auth.is_enabled() {
        println!("  \x1b[90m➜  {:<W$} token required\x1b[0m", "Auth:");
    }
    println!();
}
