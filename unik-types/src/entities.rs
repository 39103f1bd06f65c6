//! Persisted entity model: images, instances, volumes.
//!
//! These are pure value types. They cross the state-store boundary by
//! value: reads hand out cloned snapshots, so mutating a snapshot never
//! aliases the authoritative stored copy.
//!
//! Wire compatibility: field names serialize in PascalCase and enum
//! values serialize as the exact literal strings of the on-disk format
//! (`"pending"`, `"VIRTUALBOX"`, `"qcow2"`, ...). Do not rename.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{UnikError, UnikResult};

/// Placeholder rendered for an absent entity in diagnostics.
pub const MISSING_ENTITY: &str = "<none>";

/// Render an optional entity for logging, falling back to the fixed
/// placeholder when absent.
pub fn render_entity<T: fmt::Display>(entity: Option<&T>) -> String {
    match entity {
        Some(e) => e.to_string(),
        None => MISSING_ENTITY.to_string(),
    }
}

// ============================================================================
// ENUMS
// ============================================================================

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Pending,
    Running,
    Stopped,
    Unknown,
    Terminated,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopped => "stopped",
            InstanceState::Unknown => "unknown",
            InstanceState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Virtualization backend an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Infrastructure {
    Aws,
    Vsphere,
    Virtualbox,
}

impl fmt::Display for Infrastructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Infrastructure::Aws => "AWS",
            Infrastructure::Vsphere => "VSPHERE",
            Infrastructure::Virtualbox => "VIRTUALBOX",
        };
        f.write_str(s)
    }
}

/// On-disk packaging format of a bootable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Raw,
    Qcow2,
    Vhd,
    Vmdk,
}

impl ImageFormat {
    /// File extension used for a disk of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Raw => "raw",
            ImageFormat::Qcow2 => "qcow2",
            ImageFormat::Vhd => "vhd",
            ImageFormat::Vmdk => "vmdk",
        }
    }
}

/// Xen virtualization flavor, only meaningful on AWS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XenVirtualizationType {
    Hvm,
    Paravirtual,
}

/// Disk controller type to attach disks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageDriver {
    Scsi,
    Sata,
    Ide,
}

/// Network adapter model, only meaningful on vSphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VsphereNetworkType {
    E1000,
    Vmxnet3,
}

// ============================================================================
// SPECS
// ============================================================================

/// How a raw compiled artifact must be packaged for a target infrastructure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StageSpec {
    pub image_format: ImageFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xen_virtualization_type: Option<XenVirtualizationType>,
}

impl StageSpec {
    /// Reject fields that do not apply to the declared infrastructure.
    pub fn validate_for(&self, infrastructure: Infrastructure) -> UnikResult<()> {
        if self.xen_virtualization_type.is_some() && infrastructure != Infrastructure::Aws {
            return Err(UnikError::InvalidSpec(format!(
                "XenVirtualizationType is only valid on AWS, not {}",
                infrastructure
            )));
        }
        Ok(())
    }
}

/// Maps a logical mount point inside the guest to a device name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMapping {
    pub mount_point: String,
    pub device_name: String,
}

/// How to configure a VM to run a given image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSpec {
    pub device_mappings: Vec<DeviceMapping>,
    pub default_instance_memory: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_driver: Option<StorageDriver>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsphere_network_type: Option<VsphereNetworkType>,
}

impl RunSpec {
    /// Resolve the controller port for a mount point.
    ///
    /// Port 0 is reserved for the boot disk, so the port is the position
    /// of the mapping in the device table plus one. Different
    /// infrastructures declare different tables, which is why the port
    /// must be resolved here rather than assumed constant.
    pub fn controller_port(&self, mount_point: &str) -> UnikResult<usize> {
        self.device_mappings
            .iter()
            .position(|m| m.mount_point == mount_point)
            .map(|i| i + 1)
            .ok_or_else(|| {
                UnikError::NotFound(format!(
                    "no device mapping declared for mount point {}",
                    mount_point
                ))
            })
    }

    /// Reject duplicate mount points and fields that do not apply to the
    /// declared infrastructure.
    pub fn validate_for(&self, infrastructure: Infrastructure) -> UnikResult<()> {
        for (i, mapping) in self.device_mappings.iter().enumerate() {
            if self.device_mappings[..i]
                .iter()
                .any(|m| m.mount_point == mapping.mount_point)
            {
                return Err(UnikError::InvalidSpec(format!(
                    "duplicate device mapping for mount point {}",
                    mapping.mount_point
                )));
            }
        }
        if self.vsphere_network_type.is_some() && infrastructure != Infrastructure::Vsphere {
            return Err(UnikError::InvalidSpec(format!(
                "VsphereNetworkType is only valid on VSPHERE, not {}",
                infrastructure
            )));
        }
        Ok(())
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// A registered, bootable disk template.
///
/// Created by the staging collaborator and immutable thereafter; replaced
/// only when a same-named image is force-staged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    pub id: String,
    pub name: String,
    pub size_mb: u64,
    pub infrastructure: Infrastructure,
    pub created: DateTime<Utc>,
    pub stage_spec: StageSpec,
    pub run_spec: RunSpec,
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "image {} (name={} size={}mb infrastructure={})",
            self.id, self.name, self.size_mb, self.infrastructure
        )
    }
}

/// A provisioned VM backed by an image.
///
/// State begins at `Pending` when the record is created at the end of a
/// successful pipeline run; later transitions are driven by collaborators
/// outside this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub state: InstanceState,
    pub ip_address: String,
    pub image_id: String,
    pub infrastructure: Infrastructure,
    pub created: DateTime<Utc>,
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "instance {} (name={} state={} ip={} image={})",
            self.id, self.name, self.state, self.ip_address, self.image_id
        )
    }
}

/// A data volume with a lifetime independent of any instance.
///
/// `attachment` holds the id of the instance the backing disk is
/// physically attached to, or the empty string when unattached. It is a
/// back-reference, not an ownership relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub size_mb: u64,
    pub attachment: String,
    pub infrastructure: Infrastructure,
    pub created: DateTime<Utc>,
}

impl Volume {
    /// True when the backing disk is not attached to any instance.
    pub fn is_unattached(&self) -> bool {
        self.attachment.is_empty()
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attachment = if self.is_unattached() {
            "unattached"
        } else {
            &self.attachment
        };
        write!(
            f,
            "volume {} (name={} size={}mb attachment={})",
            self.id, self.name, self.size_mb, attachment
        )
    }
}

/// An unregistered, freshly compiled disk artifact plus its declared
/// staging and run specifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawImage {
    pub local_image_path: String,
    pub stage_spec: StageSpec,
    pub run_spec: RunSpec,
}
