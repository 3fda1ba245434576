pub mod config;
pub mod distro;
pub mod paths;
pub mod shell;

// Re-export commonly used types
pub use distro::Distro;
