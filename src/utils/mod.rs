pub mod lock;
pub mod size;
