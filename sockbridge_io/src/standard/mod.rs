pub mod locks;
pub mod spawn;
