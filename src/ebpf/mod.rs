pub mod events;
pub mod loader;

pub use events::EventCollector;
pub use loader::ProbeHarness;
