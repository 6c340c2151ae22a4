pub mod controller;
pub mod device;
pub mod events;
pub mod simulated;
pub mod state;

pub use controller::{CollectionController, CollectionSettings};
pub use device::DeviceLink;
pub use events::{CollectionEvent, DeviceEvent};
pub use simulated::SimulatedDevice;
pub use state::{CollectionState, CollectionStatus};
