pub mod appointment;
pub mod auth;
pub mod directory;
pub mod error;
pub mod notification;
pub mod payment;

pub use appointment::*;
pub use directory::*;
pub use notification::*;
pub use payment::*;
