pub mod api;
pub mod backend;
pub mod bus;
pub mod error;
pub mod search;
pub mod session;
pub mod toast;
pub mod undo;
pub mod view;
