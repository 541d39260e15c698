pub mod command;
pub mod discovery;
pub mod link;

pub use command::HardwareCommand;
pub use link::HardwareLink;
