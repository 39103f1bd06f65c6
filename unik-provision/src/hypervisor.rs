//! Hypervisor control-plane contract.
//!
//! The low-level VM/disk primitives live behind this trait; the
//! provisioning pipeline only speaks in these operations. A concrete
//! client (VBoxManage wrapper, vSphere SDK, ...) is supplied by the
//! provider crate for the infrastructure in use.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use unik_types::{StorageDriver, UnikResult};

/// Parameters for allocating a VM shell.
#[derive(Clone, Debug)]
pub struct CreateVmParams {
    /// VM name, also the reserved name for singleton resources.
    pub name: String,

    /// Directory the hypervisor should place VM files under.
    pub dir: PathBuf,

    /// Guest memory in MB.
    pub memory_mb: u32,

    /// Host adapter to bridge onto.
    pub adapter_name: String,

    /// Adapter type understood by the hypervisor.
    pub adapter_type: String,

    /// Disk controller to create for this VM, when the image declares one.
    pub storage_driver: Option<StorageDriver>,
}

/// Provider-side VM details.
#[derive(Clone, Debug)]
pub struct VmInfo {
    /// Provider-assigned unique identifier.
    pub uuid: String,

    /// VM name as registered with the hypervisor.
    pub name: String,
}

/// Low-level hypervisor operations consumed by the pipeline.
#[async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Allocate a VM shell with no disks attached.
    async fn create_vm(&self, params: CreateVmParams) -> UnikResult<()>;

    async fn power_on_vm(&self, name: &str) -> UnikResult<()>;

    async fn power_off_vm(&self, name: &str) -> UnikResult<()>;

    async fn destroy_vm(&self, name: &str) -> UnikResult<()>;

    /// Attach a disk file at the given controller port.
    async fn attach_disk(
        &self,
        vm_name: &str,
        disk_path: &Path,
        controller_port: usize,
        storage_driver: Option<StorageDriver>,
    ) -> UnikResult<()>;

    /// Give a copied virtual disk a fresh unique identifier.
    ///
    /// Copying a disk duplicates an identifier the hypervisor's disk
    /// table requires to be unique; this must run after the copy and
    /// before the disk is attached.
    async fn refresh_disk_uuid(&self, disk_path: &Path) -> UnikResult<()>;

    async fn get_vm(&self, name: &str) -> UnikResult<VmInfo>;
}
