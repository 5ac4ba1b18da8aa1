use flexi_logger::{FileSpec, Logger, WriteMode};
use log::{error, info};
use pseudopop::cinfo;
use pseudopop::param;
use pseudopop::run;
use std::process::ExitCode;

fn main() -> ExitCode {
    let param_path = std::env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());

    let param = match param::get(param_path.clone()) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("Failed to load parameters from {}: {}", param_path, e);
            return ExitCode::FAILURE;
        }
    };

    let logger = match Logger::try_with_env_or_str(&param.general.log_level) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Invalid log level {}: {}", param.general.log_level, e);
            return ExitCode::FAILURE;
        }
    };
    let started = if param.general.log_base.is_empty() {
        logger.start()
    } else {
        logger
            .log_to_file(
                FileSpec::default()
                    .basename(&param.general.log_base)
                    .suffix(&param.general.log_suffix),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .start()
    };
    // The handle flushes the log file when dropped
    let _logger = match started {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to start logger: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Loaded parameters from {}", param_path);

    let resampling = match run(&param) {
        Ok(resampling) => resampling,
        Err(e) => {
            error!("Resampling failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    cinfo!(param.general.display_colorful, "{}", resampling.display_results());

    if !param.general.save_exp.is_empty() {
        match resampling.save_auto(&param.general.save_exp) {
            Ok(_) => info!("Resampling saved to {}", param.general.save_exp),
            Err(e) => {
                error!("Failed to save resampling to {}: {}", param.general.save_exp, e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
