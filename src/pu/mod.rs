//! The V1 ("partial update") observation model: reactive variables as properties with
//! explicit subscriber sets, synced to each other and to their owning view.

mod dependencies;
mod observed_object;
mod property;
mod storage;
mod subscriber_manager;
mod view;

pub use dependencies::PropertyDependencies;
pub use observed_object::ObservedObject;
pub(crate) use observed_object::PuHandler;
pub use property::{PropertyKind, PuProperty};
pub use storage::{AppStorage, LocalStorage};
pub use subscriber_manager::{PuSubscriber, SubscriberId, SubscriberManager};
pub use view::ViewPU;
