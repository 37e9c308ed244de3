pub mod lifecycle;
pub mod reservation;
pub mod sweeper;

pub use lifecycle::AppointmentLifecycleService;
pub use reservation::ReservationService;
pub use sweeper::PendingReservationSweeper;
