//! Image staging contract.

use async_trait::async_trait;
use unik_types::{Image, RawImage, UnikResult};

/// Parameters for registering a raw artifact as a bootable image.
#[derive(Clone, Debug)]
pub struct StageImageParams {
    /// Name to register the image under.
    pub name: String,

    /// The freshly compiled artifact to package.
    pub raw_image: RawImage,

    /// Overwrite any prior image of the same name.
    pub force: bool,
}

/// Packages a raw compiled artifact into a registered, bootable image
/// for the target infrastructure.
#[async_trait]
pub trait Stager: Send + Sync {
    async fn stage(&self, params: StageImageParams) -> UnikResult<Image>;
}
