pub mod clock;
pub mod diagnostics;

pub use clock::*;
pub use diagnostics::*;
