use std::fmt::{Debug, Formatter};
use std::rc::Weak;
use crate::computed::ComputedV2;
use crate::monitor::MonitorV2;
use crate::persistence::PersistenceV2;
use crate::pu::ViewPU;
use crate::view_v2::ViewV2;

/// Who owns a bind id: the single capability interface both observation models
/// resolve dirty ids through. Held weakly; a dead owner simply stops receiving updates.
#[derive(Clone)]
pub enum ReactiveOwner {
    LegacyView(Weak<ViewPU>),
    View(Weak<ViewV2>),
    Computed(Weak<ComputedV2>),
    Monitor(Weak<MonitorV2>),
    Persistence(Weak<PersistenceV2>),
}

impl ReactiveOwner {
    pub fn is_alive(&self) -> bool {
        match self {
            ReactiveOwner::LegacyView(w) => w.strong_count() > 0,
            ReactiveOwner::View(w) => w.strong_count() > 0,
            ReactiveOwner::Computed(w) => w.strong_count() > 0,
            ReactiveOwner::Monitor(w) => w.strong_count() > 0,
            ReactiveOwner::Persistence(w) => w.strong_count() > 0,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ReactiveOwner::LegacyView(w) => w.upgrade().map_or("<dead view>".to_string(), |v| format!("{}[{}]", v.name(), v.elmt_id())),
            ReactiveOwner::View(w) => w.upgrade().map_or("<dead view>".to_string(), |v| format!("{}[{}]", v.name(), v.id())),
            ReactiveOwner::Computed(w) => w.upgrade().map_or("<dead computed>".to_string(), |c| format!("@Computed {}", c.name())),
            ReactiveOwner::Monitor(w) => w.upgrade().map_or("<dead monitor>".to_string(), |m| format!("@Monitor {}", m.name())),
            ReactiveOwner::Persistence(w) => w.upgrade().map_or("<dead persistence>".to_string(), |_| "PersistenceV2".to_string()),
        }
    }
}

impl Debug for ReactiveOwner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}
