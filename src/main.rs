// src/main.rs

use converge::engine::{EXIT_ABORTED, EXIT_CONFIG_ERROR};
use converge::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("converge error: {err:?}");
        std::process::exit(EXIT_ABORTED);
    }

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("converge error: {err}");
            let code = if err.is_configuration_error() {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_ABORTED
            };
            std::process::exit(code);
        }
    }
}
