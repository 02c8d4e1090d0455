#[macro_use]
extern crate tracing;

use codenire_sandbox::{
  config::sandbox_config, state::sandbox_orchestrator,
};

async fn app() -> anyhow::Result<()> {
  let config = sandbox_config();
  logger::init(&config.logging)?;

  info!(
    "Codenire Sandbox version: v{}",
    env!("CARGO_PKG_VERSION")
  );
  info!("{:?}", config.sanitized());

  let orchestrator = sandbox_orchestrator();
  orchestrator.prepare().await?;
  orchestrator.boot().await?;

  info!("warm pools running");

  // Producer tasks keep the pools replenished from here; park
  // until shutdown.
  futures_util::future::pending::<()>().await;
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  let mut term_signal = tokio::signal::unix::signal(
    tokio::signal::unix::SignalKind::terminate(),
  )?;

  let app = tokio::spawn(app());

  tokio::select! {
    res = app => return res?,
    _ = term_signal.recv() => {
      info!("stopping all sandbox containers for shutdown");
      sandbox_orchestrator().kill_all().await;
    }
  }

  Ok(())
}
