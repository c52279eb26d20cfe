mod analysis;
mod app;
mod backend;
mod cache;
mod commands;
mod config;
mod day;
mod event;
mod hooks;
mod logging;
mod models;
mod query;
mod render;
mod session;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nutrilog")]
#[command(about = "Track meals, macros and water from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/nutrilog/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Day to show or log to, as YYYY-MM-DD (default: today)
  #[arg(long, global = true)]
  date: Option<day::DayKey>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  // Initialize and run the app
  let mut app = app::App::new(&config, args.date)?;
  let output = app.run(args.command).await?;
  print!("{}", output);

  Ok(())
}
