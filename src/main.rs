use std::process::ExitCode;

use clap::Parser;
use data::{print_error, print_output, ErrorBody, DEFAULT_LOG_LEVEL};
use log::error;

mod calculation;
mod data;
mod error;
mod plant;
mod problem;
mod simplex;

#[derive(Parser)]
struct Args {
  #[arg(
    short,
    long,
    default_value = "payload.json",
    help = "json file with the load, the fuel prices and the power plants"
  )]
  payload: String,
  #[arg(short, long, help = "toml file with the solver settings, the defaults are used when missing")]
  config: Option<String>,
}

fn main() -> ExitCode {
  let args = Args::parse();
  let settings = data::read_settings(args.config.as_deref());
  let log_level = settings.as_ref().map_or_else(|_| DEFAULT_LOG_LEVEL.to_string(), |s| s.log_level.clone());
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

  let planning = settings.map_err(ErrorBody::from).and_then(|settings| {
    let payload = data::read_payload(&args.payload).map_err(ErrorBody::from)?;
    calculation::calculation(&payload, &settings).map_err(ErrorBody::from)
  });

  let printed = match planning {
    Ok(planning) => print_output(&planning).map(|_| ExitCode::SUCCESS),
    Err(body) => {
      error!("Production plan failed: {}", body.error);
      print_error(&body).map(|_| ExitCode::FAILURE)
    }
  };
  printed.unwrap_or_else(|e| {
    error!("Unable to serialize output: {e}");
    ExitCode::FAILURE
  })
}
