pub mod project;
pub mod version;

pub use project::{Project, VersionStyle};
pub use version::Version;
