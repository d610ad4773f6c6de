//! Fine-grained reactive state observation for declarative UI trees.
//!
//! State lives in observed containers ([Observed]). Reading a property while a UI
//! element, a [ComputedV2], a [MonitorV2] path or a persisted value is being evaluated
//! records a dependency on exactly that property. Writing a property schedules every
//! dependent to re-run, in a fixed order: computed values first, then persistence,
//! then monitors, and finally UI elements. Nothing re-runs synchronously inside the
//! write; call [Runtime::flush] (or let the host drive the task queue) to settle.
//!
//! Two generations of the model share one [Runtime]:
//!
//! - V2 ([ViewV2], `@Trace` fields, `@Computed`, `@Monitor`, [PersistenceV2]) tracks
//!   individual properties through the [ObserveV2] dependency graph.
//! - PU ([ViewPU], [PuProperty], [ObservedObject], [LocalStorage]) is the legacy
//!   property-owner hierarchy where each decorated variable notifies its subscribers.
//!
//! Everything is single-threaded: handles are `Rc`, and the runtime is never `Send`.

pub mod error;
pub mod config;
pub mod bind_id;
pub mod class;
pub mod value;
pub mod observe;
pub mod proxy;
pub mod runtime;
pub mod node;
pub mod computed;
pub mod monitor;
pub mod view_v2;
pub mod persistence;
pub mod pu;
pub mod dump;

pub use error::{Result, StateError};
pub use config::RuntimeConfig;
pub use bind_id::{BindId, BindKind, ElmtId};
pub use class::{ClassDescriptor, ClassDescriptorBuilder};
pub use value::{Container, ContainerKind, Key, NativeFn, ObjectRef, TargetId, Value, WeakObjectRef};
pub use observe::{ObserveV2, PendingCounts, PropKey, ReactiveOwner};
pub use proxy::{ArrayProxy, DateProxy, MapProxy, Observed, SetProxy, WrapMode};
pub use runtime::Runtime;
pub use node::{ElementIdAllocator, UiNodeAllocator, UpdateFn};
pub use computed::ComputedV2;
pub use monitor::{IMonitor, IMonitorValue, MonitorV2, MonitorValueV2};
pub use view_v2::{ViewV2, ViewV2Builder};
pub use persistence::{JsonCoder, MemoryBackend, PersistenceV2, StorageBackend};
pub use pu::{
    AppStorage, LocalStorage, ObservedObject, PropertyDependencies, PropertyKind, PuProperty,
    PuSubscriber, SubscriberId, SubscriberManager, ViewPU,
};
pub use dump::{on_dump_info, DumpCommand, DumpInfo, DumpKind};
