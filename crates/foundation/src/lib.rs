pub mod bounds;
pub mod handles;
pub mod tiling;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use handles::*;
pub use tiling::*;
pub use self::time::*;
