pub mod controller;
pub mod snapshot;
