//! unik-provision - provisioning core for the unik instance listener.
//!
//! ## Architecture
//!
//! ```text
//! ensure_alive() ──→ Discovery probe (10s)
//!        │                 │ reachable → done, zero side effects
//!        │ absent
//!        ▼
//! DeployPipeline: Build → Stage → Volume → CreateVm → BootDisk
//!                 → DataDisk → RecordAttachment → PowerOn/Converge
//!                 → RecordInstance
//! ```
//!
//! Each pipeline stage registers a compensating action on an undo stack
//! once it succeeds; any later failure unwinds the stack in reverse
//! completion order and returns the original error.
//!
//! The hypervisor, compiler, stager, and discovery probe are consumed
//! behind async traits; the persisted entity model lives in
//! [`unik_types`].

pub mod compiler;
pub mod config;
pub mod discovery;
pub mod disk;
pub mod hypervisor;
pub mod layout;
pub mod provision;
pub mod stager;
pub mod state;

pub use compiler::Compiler;
pub use config::ProvisionConfig;
pub use discovery::{Discovery, UdpDiscovery};
pub use hypervisor::{CreateVmParams, HypervisorClient, VmInfo};
pub use layout::ProvisionLayout;
pub use provision::Provisioner;
pub use stager::{StageImageParams, Stager};
pub use state::FileState;
