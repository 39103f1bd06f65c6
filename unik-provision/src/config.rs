//! Configuration for a provisioning run.
//!
//! Timeouts are explicit per-provisioner configuration rather than
//! process-wide globals, so each call site can bound its own waits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration knobs for [`crate::Provisioner`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Bound on the cheap liveness probe performed before provisioning.
    #[serde(default = "default_liveness_timeout", with = "duration_secs")]
    pub liveness_timeout: Duration,

    /// Bound on post-boot discovery of the listener's address.
    #[serde(default = "default_converge_timeout", with = "duration_secs")]
    pub converge_timeout: Duration,

    /// Size of the listener's data volume in MB.
    #[serde(default = "default_data_volume_size")]
    pub data_volume_size_mb: u64,

    /// Memory for the listener VM when the image's RunSpec declares none.
    #[serde(default = "default_instance_memory")]
    pub default_instance_memory_mb: u32,

    /// Host network adapter to bridge the VM onto.
    pub adapter_name: String,

    /// Adapter type understood by the hypervisor (e.g. "bridged").
    pub adapter_type: String,

    /// Base toolchain reference handed to the compiler collaborator.
    #[serde(default = "default_toolchain_ref")]
    pub base_toolchain_ref: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: default_liveness_timeout(),
            converge_timeout: default_converge_timeout(),
            data_volume_size_mb: default_data_volume_size(),
            default_instance_memory_mb: default_instance_memory(),
            adapter_name: String::new(),
            adapter_type: String::new(),
            base_toolchain_ref: default_toolchain_ref(),
        }
    }
}

impl ProvisionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, name: impl Into<String>, adapter_type: impl Into<String>) -> Self {
        self.adapter_name = name.into();
        self.adapter_type = adapter_type.into();
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    pub fn with_converge_timeout(mut self, timeout: Duration) -> Self {
        self.converge_timeout = timeout;
        self
    }

    pub fn with_data_volume_size_mb(mut self, size_mb: u64) -> Self {
        self.data_volume_size_mb = size_mb;
        self
    }

    pub fn with_base_toolchain_ref(mut self, toolchain: impl Into<String>) -> Self {
        self.base_toolchain_ref = toolchain.into();
        self
    }
}

fn default_liveness_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_converge_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_data_volume_size() -> u64 {
    10
}

fn default_instance_memory() -> u32 {
    512
}

fn default_toolchain_ref() -> String {
    "unik/compilers-rump-base-hw".to_string()
}

/// Serialize durations as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
