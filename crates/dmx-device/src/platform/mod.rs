pub mod memory;
pub mod udmx;
