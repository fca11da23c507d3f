use clap::Parser;
use secrecy::ExposeSecret;
use sql2csv::cli::Cli;
use sql2csv::config::AppConfig;
use sql2csv::error::Sql2CsvError;
use sql2csv::validation::{self, BackendDialect, ValidationResult};
use sql2csv::verbose::{self, Timer};
use sql2csv::{backend, config, masking, output, pipeline};
use std::process;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = match config::load_from_args(&cli) {
        Ok(app_config) => {
            verbose::init(app_config.verbose);
            export(app_config).await
        }
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        output::print_error(&err);
        process::exit(1);
    }
}

async fn export(app_config: AppConfig) -> Result<(), Sql2CsvError> {
    let (scheme, _) = backend::resolve_scheme(app_config.database_uri.expose_secret())?;

    if app_config.validate {
        debug!("validating query (read-only mode)...");
        let vtimer = Timer::start();
        let outcome = validation::validate(&app_config.query, BackendDialect::from(scheme));
        if let ValidationResult::Denied { .. } = outcome {
            return Err(Sql2CsvError::Validation {
                reason: outcome.detail().unwrap_or_default(),
            });
        }
        debug!("validation passed ({}ms)", vtimer.elapsed_ms());
    }

    info!(
        "connecting to {}",
        masking::mask_uri(&app_config.database_uri, app_config.show_secrets)
    );
    let timer = Timer::start();
    let connection = backend::connect(&app_config.database_uri).await?;
    debug!("connected to {} ({}ms)", scheme.label(), timer.elapsed_ms());

    let options = app_config.pipeline_options();
    let timer = Timer::start();
    let stdout = std::io::stdout().lock();
    let summary = pipeline::run_pipeline(connection, app_config.query, options, stdout).await?;
    debug!(
        "query complete ({}ms, {} rows, {} columns)",
        timer.elapsed_ms(),
        summary.rows,
        summary.columns
    );

    Ok(())
}
