pub mod roles;
pub mod tags;
pub mod topo;

pub use roles::*;
pub use tags::*;
pub use topo::*;
