pub mod capability;
pub mod config;
pub mod document;
pub mod probe;
pub mod resolver;
