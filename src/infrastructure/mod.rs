pub mod encryption;
pub mod event_bus;
pub mod logging;
pub mod pbkdf2;
