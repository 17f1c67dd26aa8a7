//! Server registry: the live node set, its change notifications, and the
//! refresher keeping it in sync with discovery.

pub mod notifier;
pub mod refresher;
pub mod store;

pub use notifier::{ChangeNotifier, EventHandler, SubscriptionHandle};
pub use refresher::{RefreshTask, RegistryRefresher};
pub use store::RegistryStore;
