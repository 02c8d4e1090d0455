use std::sync::{Arc, OnceLock};

use crate::{
  config::sandbox_config, orchestrator::SandboxOrchestrator,
  storage::FileStorage,
};

/// Will crash on first use if the docker client cannot be
/// configured.
pub fn sandbox_orchestrator()
-> &'static Arc<SandboxOrchestrator<FileStorage>> {
  static SANDBOX_ORCHESTRATOR: OnceLock<
    Arc<SandboxOrchestrator<FileStorage>>,
  > = OnceLock::new();
  SANDBOX_ORCHESTRATOR.get_or_init(|| {
    let config = sandbox_config().clone();
    let storage =
      FileStorage::new(config.templates_path.clone());
    Arc::new(
      SandboxOrchestrator::new(storage, config)
        .expect("failed to initialize docker client"),
    )
  })
}
