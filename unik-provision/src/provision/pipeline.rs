//! The provisioning pipeline: compile, stage, allocate, attach, boot,
//! record.
//!
//! Stages run in order; each one registers a compensating [`Undo`] once
//! it succeeds. On any later failure the completed undos execute in
//! reverse completion order and the original error is returned.
//! Compensation failures are logged, never propagated, so they cannot
//! mask the root cause.
//!
//! Two compensation scopes exist: the image scope opens at stage B and
//! covers only the staged image; the instance scope opens at VM-shell
//! creation (stage D) and covers everything after it. A single stack
//! unwound in reverse realizes both.

use std::path::PathBuf;

use chrono::Utc;
use unik_types::{Instance, InstanceState, UnikError, UnikResult, Volume};

use crate::disk;
use crate::hypervisor::{CreateVmParams, HypervisorClient};
use crate::stager::StageImageParams;
use crate::state::FileState;

use super::Provisioner;

/// Mount point the data volume is resolved against in the image's
/// device-mapping table.
pub(crate) const DATA_MOUNT_POINT: &str = "/data";

/// Controller port reserved for the boot disk.
pub(crate) const BOOT_CONTROLLER_PORT: usize = 0;

/// A compensating action registered by a completed stage.
///
/// Modeled as data rather than closures so the stack contents are
/// inspectable and the unwind order is testable in isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Undo {
    /// Delete the staged image record and its on-disk directory.
    DeleteImage { image_id: String, image_dir: PathBuf },

    /// Delete the volume record and its backing file.
    DeleteVolume {
        volume_id: String,
        volume_path: PathBuf,
    },

    /// Power off and destroy the VM shell.
    DestroyVm { name: String },

    /// Remove the instance's private disk directory.
    RemoveInstanceDir { dir: PathBuf },
}

/// Stack of undos in completion order.
#[derive(Debug, Default)]
pub(crate) struct Rollback {
    completed: Vec<Undo>,
}

impl Rollback {
    fn push(&mut self, undo: Undo) {
        tracing::trace!(?undo, "registered compensation");
        self.completed.push(undo);
    }

    /// Undos registered so far, oldest first.
    #[allow(dead_code)]
    pub(crate) fn pending(&self) -> &[Undo] {
        &self.completed
    }
}

/// Execute a rollback stack in reverse completion order.
///
/// Every failure is surfaced as a warning; nothing here returns an
/// error, because compensation must never replace the original failure.
pub(crate) async fn unwind(mut rollback: Rollback, hypervisor: &dyn HypervisorClient, state: &FileState) {
    while let Some(undo) = rollback.completed.pop() {
        match undo {
            Undo::DestroyVm { name } => {
                if let Err(e) = hypervisor.power_off_vm(&name).await {
                    tracing::warn!(%name, error = %e, "rollback: power off failed");
                }
                if let Err(e) = hypervisor.destroy_vm(&name).await {
                    tracing::warn!(%name, error = %e, "rollback: destroy vm failed");
                }
            }
            Undo::RemoveInstanceDir { dir } => {
                if dir.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&dir) {
                        tracing::warn!(dir = %dir.display(), error = %e, "rollback: removing instance dir failed");
                    }
                }
            }
            Undo::DeleteVolume {
                volume_id,
                volume_path,
            } => {
                if let Err(e) = state.modify_volumes(|volumes| {
                    volumes.remove(&volume_id);
                    Ok(())
                }) {
                    tracing::warn!(%volume_id, error = %e, "rollback: deleting volume record failed");
                }
                if volume_path.exists() {
                    if let Err(e) = std::fs::remove_file(&volume_path) {
                        tracing::warn!(path = %volume_path.display(), error = %e, "rollback: removing volume backing file failed");
                    }
                }
            }
            Undo::DeleteImage {
                image_id,
                image_dir,
            } => {
                if let Err(e) = state.modify_images(|images| {
                    images.remove(&image_id);
                    Ok(())
                }) {
                    tracing::warn!(%image_id, error = %e, "rollback: deleting image record failed");
                }
                if image_dir.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&image_dir) {
                        tracing::warn!(dir = %image_dir.display(), error = %e, "rollback: removing image dir failed");
                    }
                }
            }
        }
    }
}

/// One end-to-end provisioning run for a reserved name.
pub(crate) struct DeployPipeline<'a> {
    provisioner: &'a Provisioner,
    reserved_name: &'a str,
    name_prefix: &'a str,
}

impl<'a> DeployPipeline<'a> {
    pub(crate) fn new(
        provisioner: &'a Provisioner,
        reserved_name: &'a str,
        name_prefix: &'a str,
    ) -> Self {
        Self {
            provisioner,
            reserved_name,
            name_prefix,
        }
    }

    pub(crate) async fn run(&self) -> UnikResult<()> {
        let mut rollback = Rollback::default();
        match self.run_stages(&mut rollback).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "provisioning failed, rolling back completed stages");
                unwind(
                    rollback,
                    self.provisioner.hypervisor.as_ref(),
                    &self.provisioner.state,
                )
                .await;
                Err(err)
            }
        }
    }

    async fn run_stages(&self, rollback: &mut Rollback) -> UnikResult<()> {
        let p = self.provisioner;
        let name = self.reserved_name;

        p.layout.prepare()?;

        // Stage A: compile the listener in a scoped workspace. The
        // workspace directory removes itself when this function returns.
        tracing::info!(name, "compiling new instance listener");
        let workspace = tempfile::tempdir_in(p.layout.tmp_dir())
            .map_err(|e| UnikError::Storage(format!("creating compile workspace: {}", e)))?;
        let raw_image = p
            .compiler
            .compile(workspace.path(), name, &p.config.base_toolchain_ref)
            .await?;
        raw_image.stage_spec.validate_for(p.infrastructure)?;
        raw_image.run_spec.validate_for(p.infrastructure)?;

        // Stage B: stage the raw artifact as a bootable image, replacing
        // any leftover artifact under the reserved name.
        tracing::info!(name, "staging new instance listener image");
        let image_dir = p.layout.image_dir(name);
        if image_dir.exists() {
            let _ = std::fs::remove_dir_all(&image_dir);
        }
        let image = p
            .stager
            .stage(StageImageParams {
                name: name.to_string(),
                raw_image,
                force: true,
            })
            .await?;
        {
            let record = image.clone();
            p.state.modify_images(move |images| {
                // force semantics: a same-named image is replaced
                images.retain(|_, existing| existing.name != record.name);
                images.insert(record.id.clone(), record);
                Ok(())
            })?;
        }
        rollback.push(Undo::DeleteImage {
            image_id: image.id.clone(),
            image_dir,
        });

        // Stage C: allocate the empty data volume and its record.
        let volume_name = format!("{}-data", name);
        let volume_path = p.layout.volume_path(&volume_name);
        tracing::debug!(volume = %volume_name, size_mb = p.config.data_volume_size_mb, "creating data volume");
        disk::build_empty_volume(&volume_path, p.config.data_volume_size_mb)?;
        let volume = Volume {
            id: uuid::Uuid::new_v4().to_string(),
            name: volume_name,
            size_mb: p.config.data_volume_size_mb,
            attachment: String::new(),
            infrastructure: p.infrastructure,
            created: Utc::now(),
        };
        {
            let record = volume.clone();
            let inserted = p.state.modify_volumes(move |volumes| {
                // reserved-name singleton: replace any stale record from
                // a previous listener generation
                volumes.retain(|_, existing| existing.name != record.name);
                volumes.insert(record.id.clone(), record);
                Ok(())
            });
            if let Err(e) = inserted {
                let _ = std::fs::remove_file(&volume_path);
                return Err(e);
            }
        }
        rollback.push(Undo::DeleteVolume {
            volume_id: volume.id.clone(),
            volume_path: volume_path.clone(),
        });

        // Stage D: allocate the VM shell. Instance scope opens here.
        let memory_mb = if image.run_spec.default_instance_memory > 0 {
            image.run_spec.default_instance_memory
        } else {
            p.config.default_instance_memory_mb
        };
        tracing::debug!(name, memory_mb, "creating vm shell");
        p.hypervisor
            .create_vm(CreateVmParams {
                name: name.to_string(),
                dir: p.layout.instances_dir(),
                memory_mb,
                adapter_name: p.config.adapter_name.clone(),
                adapter_type: p.config.adapter_type.clone(),
                storage_driver: image.run_spec.storage_driver,
            })
            .await?;
        rollback.push(Undo::DestroyVm {
            name: name.to_string(),
        });

        // Stage E: give the instance its own private copy of the boot
        // disk, refresh the copied disk's identifier (the copy carries
        // the source's identifier, which the hypervisor's disk table
        // requires to be unique), then attach at port 0.
        let image_boot = p.layout.image_path(&image.name, image.stage_spec.image_format);
        let instance_boot = p
            .layout
            .instance_boot_image(name, image.stage_spec.image_format);
        tracing::debug!(src = %image_boot.display(), dst = %instance_boot.display(), "copying boot disk into instance dir");
        disk::copy_file(&image_boot, &instance_boot)?;
        rollback.push(Undo::RemoveInstanceDir {
            dir: p.layout.instance_dir(name),
        });
        p.hypervisor.refresh_disk_uuid(&instance_boot).await?;
        p.hypervisor
            .attach_disk(
                name,
                &instance_boot,
                BOOT_CONTROLLER_PORT,
                image.run_spec.storage_driver,
            )
            .await?;

        // Stage F: the data-disk port comes from the image's own device
        // mapping table, never a constant.
        let data_port = image.run_spec.controller_port(DATA_MOUNT_POINT)?;
        p.hypervisor
            .attach_disk(name, &volume_path, data_port, image.run_spec.storage_driver)
            .await?;

        // Stage G: record the attachment under the provider-assigned id.
        let vm = p.hypervisor.get_vm(name).await?;
        let instance_id = vm.uuid;
        {
            let volume_id = volume.id.clone();
            let attach_to = instance_id.clone();
            p.state.modify_volumes(move |volumes| {
                let record = volumes.get_mut(&volume_id).ok_or_else(|| {
                    UnikError::NotFound(format!("no record of volume {} in state", volume_id))
                })?;
                record.attachment = attach_to;
                Ok(())
            })?;
        }

        // Stage H: boot and wait for the listener to converge. A timeout
        // here is terminal for this call.
        tracing::debug!(name, "powering on vm");
        p.hypervisor.power_on_vm(name).await?;
        let ip = p
            .discovery
            .discover_address(self.name_prefix, p.config.converge_timeout)
            .await
            .map_err(|e| {
                UnikError::Discovery(format!(
                    "instance listener did not converge after boot: {}",
                    e
                ))
            })?;

        // Stage I: record the instance.
        if p.state.get_image(&image.id).is_none() {
            return Err(UnikError::NotFound(format!(
                "image {} missing from state",
                image.id
            )));
        }
        let instance = Instance {
            id: instance_id,
            name: name.to_string(),
            state: InstanceState::Pending,
            ip_address: ip,
            image_id: image.id.clone(),
            infrastructure: p.infrastructure,
            created: Utc::now(),
        };
        {
            let record = instance.clone();
            p.state.modify_instances(move |instances| {
                instances.retain(|_, existing| existing.name != record.name);
                instances.insert(record.id.clone(), record);
                Ok(())
            })?;
        }
        tracing::info!(%instance, "instance listener provisioned");
        Ok(())
    }
}
