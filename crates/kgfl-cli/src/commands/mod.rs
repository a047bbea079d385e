pub mod auth;
pub mod read;
pub mod write;
