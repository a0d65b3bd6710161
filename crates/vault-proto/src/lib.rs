pub mod clock;
pub mod config;
pub mod platform;
pub mod projection;
pub mod protocol;
pub mod track;
