pub mod coordinator;

pub use coordinator::{AppointmentCoordinator, BookingConfirmation, CleanupReport};
