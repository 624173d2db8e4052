mod recv_ring;
mod seq8;
mod swnd;

pub use recv_ring::*;
pub use seq8::*;
pub use swnd::*;
