mod channel;
mod chunk;
mod clock;
mod config;
mod controller;
mod decimate;
mod device;
mod error;
mod rotation;
mod session;
mod sim;
mod tui;
mod utils;
mod writer;

pub use channel::*;
pub use chunk::*;
pub use clock::*;
pub use config::*;
pub use controller::*;
pub use decimate::*;
pub use device::*;
pub use error::*;
pub use rotation::*;
pub use session::*;
pub use sim::*;
pub use tui::*;
pub use utils::*;
pub use writer::*;
