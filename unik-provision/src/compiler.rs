//! Source-to-image compiler contract.

use std::path::Path;

use async_trait::async_trait;
use unik_types::{RawImage, UnikResult};

/// Compiles the instance listener sources into a raw disk artifact.
///
/// `workspace_dir` is a scoped temporary directory owned by the caller;
/// the compiler may fill it freely and must place the produced artifact
/// on the local filesystem, returning its path inside the [`RawImage`].
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        workspace_dir: &Path,
        name: &str,
        base_toolchain_ref: &str,
    ) -> UnikResult<RawImage>;
}
