mod correlator;
mod dispatcher;
mod facade;
mod manager;
mod reconnect;

pub use correlator::{Correlator, NOT_CONNECTED_DELAY};
pub use facade::Device;
pub use manager::DeviceManager;
pub use reconnect::ReconnectSupervisor;
