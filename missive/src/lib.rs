pub mod controller;

pub use controller::{Missive, SHUTDOWN_BROADCAST};
