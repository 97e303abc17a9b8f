//! Backend integrations, one module per system.

pub mod interactive;
pub mod local;
pub mod tradestation;

pub use interactive::InteractiveAdapter;
pub use local::LocalAdapter;
pub use tradestation::TradestationAdapter;
