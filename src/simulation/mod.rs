pub mod config;
pub mod controller;
pub mod engines;
pub mod error;
pub mod events;
pub mod id;
pub mod logging;
pub mod mobsim;
pub mod network;
pub mod routing;
pub mod time_queue;
pub mod vehicles;
