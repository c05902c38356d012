pub mod capture;
pub mod scheduler;
