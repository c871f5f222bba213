pub mod attendance;
pub mod classes;
pub mod core;
pub mod session;
pub mod setup;
pub mod students;
