//! Process entry point. Grounded on the teacher's `src/bin/main.rs` wiring
//! shape: load config, start the logger, build and run the server facade.

use std::env;
use std::process::ExitCode;

use proxy_log::{error, Logger};
use webserv::{AppConfig, Server};

fn main() -> ExitCode {
    let config_path = env::args().nth(1).unwrap_or_else(|| "config.json".to_string());

    let config = match AppConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {config_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut logger = Logger::new();
    logger.set_file("logs/webserv.log");
    if let Err(e) = logger.start() {
        eprintln!("failed to start logger: {e}");
        return ExitCode::FAILURE;
    }

    let mut server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to start server: {e}");
            logger.stop();
            return ExitCode::FAILURE;
        }
    };

    server.run();
    logger.stop();
    ExitCode::SUCCESS
}
