pub mod appointment;
pub mod session;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus, AppointmentView};
pub use session::{AgentType, Session};
pub use user::{DoctorProfile, PatientProfile, Role, User, UserContext};
