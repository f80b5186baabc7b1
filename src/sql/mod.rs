//! Safe SQL builder: identifiers from the registry and catalog only, values
//! as parameters.

mod builder;
mod decode;
pub mod params;
pub use builder::*;
pub use decode::*;
pub use params::*;
