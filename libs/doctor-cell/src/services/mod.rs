pub mod availability;
pub mod directory;

pub use availability::AvailabilityCalendar;
pub use directory::DirectoryService;
