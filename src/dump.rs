//! Text dumps of view state, driven by the `-dumpAll` family of debug commands.

use std::fmt::Write;
use std::rc::Rc;
use crate::bind_id::{BindId, ElmtId};
use crate::pu::ViewPU;
use crate::view_v2::ViewV2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    All,
    ViewHierarchy,
    StateVariables,
    RegisteredElementIds,
    DirtyElementIds,
    InactiveComponents,
    Profiler,
}

/// A parsed debug command, e.g. `-stateVariables -r -viewId=12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpCommand {
    pub kind: DumpKind,
    /// Include the whole subtree instead of just the target view.
    pub recursive: bool,
    /// Dump the view with this id instead of the one the command was sent to.
    pub view_id: Option<ElmtId>,
}

impl DumpCommand {
    /// `None` if there is no known command among `args` or an argument is malformed.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Option<DumpCommand> {
        let mut kind = None;
        let mut recursive = false;
        let mut view_id = None;
        for arg in args {
            let arg = arg.as_ref();
            match arg {
                "-dumpAll" => kind = Some(DumpKind::All),
                "-viewHierarchy" => kind = Some(DumpKind::ViewHierarchy),
                "-stateVariables" => kind = Some(DumpKind::StateVariables),
                "-registeredElementIds" => kind = Some(DumpKind::RegisteredElementIds),
                "-dirtyElementIds" => kind = Some(DumpKind::DirtyElementIds),
                "-inactiveComponents" => kind = Some(DumpKind::InactiveComponents),
                "-profiler" => kind = Some(DumpKind::Profiler),
                "-r" => recursive = true,
                _ => match arg.strip_prefix("-viewId=") {
                    Some(id) => view_id = Some(BindId(id.trim().parse().ok()?)),
                    None => return None,
                },
            }
        }
        kind.map(|kind| DumpCommand { kind, recursive, view_id })
    }
}

/// What a view exposes to the dump commands. Implemented by both view kinds.
pub trait DumpInfo {
    fn dump_id(&self) -> ElmtId;
    fn dump_type(&self) -> &'static str;
    fn dump_name(&self) -> String;
    fn dump_is_active(&self) -> bool;
    fn dump_children(&self) -> Vec<Rc<dyn DumpInfo>>;
    fn dump_elmt_ids(&self) -> Vec<ElmtId>;
    fn dump_dirty_elmt_ids(&self) -> Vec<ElmtId>;
    fn dump_render_counts(&self) -> Vec<(ElmtId, usize)>;
    fn dump_state_variables(&self) -> String;
}

impl DumpInfo for ViewV2 {
    fn dump_id(&self) -> ElmtId {
        self.id()
    }

    fn dump_type(&self) -> &'static str {
        "ViewV2"
    }

    fn dump_name(&self) -> String {
        self.name().to_string()
    }

    fn dump_is_active(&self) -> bool {
        self.is_active()
    }

    fn dump_children(&self) -> Vec<Rc<dyn DumpInfo>> {
        self.children().into_iter().map(|child| child as Rc<dyn DumpInfo>).collect()
    }

    fn dump_elmt_ids(&self) -> Vec<ElmtId> {
        self.elmt_ids()
    }

    fn dump_dirty_elmt_ids(&self) -> Vec<ElmtId> {
        self.dirty_elmt_ids()
    }

    fn dump_render_counts(&self) -> Vec<(ElmtId, usize)> {
        self.render_counts()
    }

    fn dump_state_variables(&self) -> String {
        self.state_variables_info()
    }
}

impl DumpInfo for ViewPU {
    fn dump_id(&self) -> ElmtId {
        self.elmt_id()
    }

    fn dump_type(&self) -> &'static str {
        "ViewPU"
    }

    fn dump_name(&self) -> String {
        self.name().to_string()
    }

    fn dump_is_active(&self) -> bool {
        self.is_active()
    }

    fn dump_children(&self) -> Vec<Rc<dyn DumpInfo>> {
        self.children().into_iter().map(|child| child as Rc<dyn DumpInfo>).collect()
    }

    fn dump_elmt_ids(&self) -> Vec<ElmtId> {
        self.elmt_ids()
    }

    fn dump_dirty_elmt_ids(&self) -> Vec<ElmtId> {
        self.dirty_elmt_ids()
    }

    fn dump_render_counts(&self) -> Vec<(ElmtId, usize)> {
        self.render_counts()
    }

    fn dump_state_variables(&self) -> String {
        self.state_variables_info()
    }
}

/// Runs a debug command against `view` and returns the formatted dump.
pub fn on_dump_info(view: Rc<dyn DumpInfo>, args: &[&str]) -> String {
    let Some(command) = DumpCommand::parse(args) else {
        return format!("unknown dump command: {}\n", args.join(" "));
    };
    let target = match command.view_id {
        Some(id) => match find_view(&view, id) {
            Some(found) => found,
            None => return format!("no view with id {}\n", id),
        },
        None => view,
    };
    let mut out = String::new();
    match command.kind {
        DumpKind::All => {
            for kind in [
                DumpKind::ViewHierarchy,
                DumpKind::StateVariables,
                DumpKind::RegisteredElementIds,
                DumpKind::DirtyElementIds,
                DumpKind::InactiveComponents,
                DumpKind::Profiler,
            ] {
                dump_kind(&mut out, &target, kind, command.recursive);
            }
        }
        kind => dump_kind(&mut out, &target, kind, command.recursive),
    }
    out
}

fn find_view(view: &Rc<dyn DumpInfo>, id: ElmtId) -> Option<Rc<dyn DumpInfo>> {
    if view.dump_id() == id {
        return Some(view.clone());
    }
    view.dump_children().iter().find_map(|child| find_view(child, id))
}

fn header(view: &Rc<dyn DumpInfo>) -> String {
    format!("{} {}[{}]", view.dump_type(), view.dump_name(), view.dump_id())
}

fn dump_kind(out: &mut String, view: &Rc<dyn DumpInfo>, kind: DumpKind, recursive: bool) {
    match kind {
        DumpKind::All => {}
        DumpKind::ViewHierarchy => {
            let _ = writeln!(out, "--- view hierarchy ---");
            dump_hierarchy(out, view, 0, recursive);
        }
        DumpKind::InactiveComponents => {
            let _ = writeln!(out, "--- inactive components ---");
            dump_inactive(out, view, recursive);
        }
        _ => {
            let title = match kind {
                DumpKind::StateVariables => "state variables",
                DumpKind::RegisteredElementIds => "registered element ids",
                DumpKind::DirtyElementIds => "dirty element ids",
                _ => "profiler",
            };
            let _ = writeln!(out, "--- {} ---", title);
            dump_each(out, view, kind, recursive);
        }
    }
}

fn dump_hierarchy(out: &mut String, view: &Rc<dyn DumpInfo>, depth: usize, recursive: bool) {
    let state = if view.dump_is_active() { "" } else { " (inactive)" };
    let _ = writeln!(out, "{}|-- {}{}", "  ".repeat(depth), header(view), state);
    for child in view.dump_children() {
        if recursive {
            dump_hierarchy(out, &child, depth + 1, true);
        } else {
            let _ = writeln!(out, "{}|-- {}", "  ".repeat(depth + 1), header(&child));
        }
    }
}

fn dump_inactive(out: &mut String, view: &Rc<dyn DumpInfo>, recursive: bool) {
    if !view.dump_is_active() {
        let _ = writeln!(out, "{}", header(view));
    }
    if recursive {
        for child in view.dump_children() {
            dump_inactive(out, &child, true);
        }
    }
}

fn dump_each(out: &mut String, view: &Rc<dyn DumpInfo>, kind: DumpKind, recursive: bool) {
    let _ = writeln!(out, "{}", header(view));
    match kind {
        DumpKind::StateVariables => out.push_str(&view.dump_state_variables()),
        DumpKind::RegisteredElementIds => {
            let _ = writeln!(out, "  {}", join_ids(&view.dump_elmt_ids()));
        }
        DumpKind::DirtyElementIds => {
            let _ = writeln!(out, "  {}", join_ids(&view.dump_dirty_elmt_ids()));
        }
        _ => {
            for (id, count) in view.dump_render_counts() {
                let _ = writeln!(out, "  elmt {}: rendered {} times", id, count);
            }
        }
    }
    if recursive {
        for child in view.dump_children() {
            dump_each(out, &child, kind, true);
        }
    }
}

fn join_ids(ids: &[ElmtId]) -> String {
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("[{}]", ids.join(", "))
}
