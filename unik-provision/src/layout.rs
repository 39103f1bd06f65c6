//! Filesystem layout for provisioning state and disk artifacts.
//!
//! All paths are derived from a single home directory:
//!
//! ```text
//! {home}/
//! ├── state.json            # persisted entity collections
//! ├── images/{name}/        # staged boot images, one dir per image name
//! ├── instances/{name}/     # per-instance private disks
//! ├── volumes/{name}.img    # data volume backing files
//! └── tmp/                  # scoped compile workspaces
//! ```

use std::path::{Path, PathBuf};

use unik_types::{ImageFormat, UnikError, UnikResult};

/// Directory structure constants.
pub mod dirs {
    /// Subdirectory for staged boot images.
    pub const IMAGES_DIR: &str = "images";

    /// Subdirectory for per-instance private disks.
    pub const INSTANCES_DIR: &str = "instances";

    /// Subdirectory for data volume backing files.
    pub const VOLUMES_DIR: &str = "volumes";

    /// Subdirectory for scoped temporary workspaces.
    pub const TMP_DIR: &str = "tmp";

    /// Persisted state file name.
    pub const STATE_FILE: &str = "state.json";

    /// Boot image file stem inside an image or instance directory.
    pub const BOOT_IMAGE_STEM: &str = "boot";
}

/// Derives every provisioning path from the home directory.
#[derive(Clone, Debug)]
pub struct ProvisionLayout {
    home_dir: PathBuf,
}

impl ProvisionLayout {
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
        }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn state_file(&self) -> PathBuf {
        self.home_dir.join(dirs::STATE_FILE)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::IMAGES_DIR)
    }

    /// Directory holding the staged boot image for `name`.
    pub fn image_dir(&self, name: &str) -> PathBuf {
        self.images_dir().join(name)
    }

    /// Path of the staged boot image for `name`.
    pub fn image_path(&self, name: &str, format: ImageFormat) -> PathBuf {
        self.image_dir(name)
            .join(format!("{}.{}", dirs::BOOT_IMAGE_STEM, format.extension()))
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::INSTANCES_DIR)
    }

    /// Private directory of a single instance. Each instance gets its own
    /// copy of the boot disk here; instances never share a mutable
    /// backing file.
    pub fn instance_dir(&self, name: &str) -> PathBuf {
        self.instances_dir().join(name)
    }

    /// Path of an instance's private copy of the boot disk.
    pub fn instance_boot_image(&self, name: &str, format: ImageFormat) -> PathBuf {
        self.instance_dir(name)
            .join(format!("{}.{}", dirs::BOOT_IMAGE_STEM, format.extension()))
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::VOLUMES_DIR)
    }

    /// Backing file of a data volume.
    pub fn volume_path(&self, name: &str) -> PathBuf {
        self.volumes_dir().join(format!("{}.img", name))
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::TMP_DIR)
    }

    /// Create the directory tree.
    pub fn prepare(&self) -> UnikResult<()> {
        for dir in [
            self.home_dir.clone(),
            self.images_dir(),
            self.instances_dir(),
            self.volumes_dir(),
            self.tmp_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                UnikError::Storage(format!("creating directory {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}
