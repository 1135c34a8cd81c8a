pub mod analysis;
pub mod decode;

pub use analysis::*;
pub use decode::*;
