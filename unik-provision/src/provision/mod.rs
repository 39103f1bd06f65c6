//! Liveness gate and provisioning entry point.
//!
//! `Provisioner::ensure_alive` guarantees the singleton instance
//! listener is alive and reachable, building and launching it from
//! source when it is not.

mod pipeline;

pub(crate) use pipeline::DeployPipeline;

use std::sync::Arc;

use unik_types::{Infrastructure, UnikResult};

use crate::compiler::Compiler;
use crate::config::ProvisionConfig;
use crate::discovery::Discovery;
use crate::hypervisor::HypervisorClient;
use crate::layout::ProvisionLayout;
use crate::stager::Stager;
use crate::state::FileState;

/// Drives provisioning of the singleton instance listener for one
/// virtualization backend.
pub struct Provisioner {
    pub(crate) state: Arc<FileState>,
    pub(crate) hypervisor: Arc<dyn HypervisorClient>,
    pub(crate) compiler: Arc<dyn Compiler>,
    pub(crate) stager: Arc<dyn Stager>,
    pub(crate) discovery: Arc<dyn Discovery>,
    pub(crate) layout: ProvisionLayout,
    pub(crate) config: ProvisionConfig,
    pub(crate) infrastructure: Infrastructure,
}

impl Provisioner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<FileState>,
        hypervisor: Arc<dyn HypervisorClient>,
        compiler: Arc<dyn Compiler>,
        stager: Arc<dyn Stager>,
        discovery: Arc<dyn Discovery>,
        layout: ProvisionLayout,
        config: ProvisionConfig,
        infrastructure: Infrastructure,
    ) -> Self {
        Self {
            state,
            hypervisor,
            compiler,
            stager,
            discovery,
            layout,
            config,
            infrastructure,
        }
    }

    /// Ensure the instance listener is alive and reachable.
    ///
    /// Probes for a listener advertising `name_prefix` within the
    /// configured liveness timeout. If one answers, returns with zero
    /// further side effects, so repeated calls are idempotent while the
    /// singleton is healthy. Otherwise any stale VM under
    /// `reserved_name` is torn down best-effort (absence is the
    /// expected, non-error case) and the full provisioning pipeline
    /// runs.
    ///
    /// Concurrency precondition: two callers racing on the same reserved
    /// name can both decide the listener is absent and both provision.
    /// Callers must serialize invocations per reserved name externally;
    /// this core provides no cross-invocation lock.
    pub async fn ensure_alive(&self, reserved_name: &str, name_prefix: &str) -> UnikResult<()> {
        tracing::info!(name_prefix, "checking whether the instance listener is alive");
        if let Ok(ip) = self
            .discovery
            .discover_address(name_prefix, self.config.liveness_timeout)
            .await
        {
            tracing::info!(%ip, "instance listener is alive");
            return Ok(());
        }

        tracing::info!(
            reserved_name,
            "cannot contact instance listener, clearing any stale resources"
        );
        if let Err(e) = self.hypervisor.power_off_vm(reserved_name).await {
            tracing::debug!(reserved_name, error = %e, "stale listener power-off skipped");
        }
        if let Err(e) = self.hypervisor.destroy_vm(reserved_name).await {
            tracing::debug!(reserved_name, error = %e, "stale listener destroy skipped");
        }

        DeployPipeline::new(self, reserved_name, name_prefix)
            .run()
            .await
    }
}
