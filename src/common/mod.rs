pub mod db;
pub mod error;
pub mod gate;
pub mod logging;
pub mod model;
