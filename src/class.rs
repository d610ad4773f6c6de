use std::collections::HashSet;
use std::rc::Rc;

/// Per-type description of which fields are reactive, computed once per type.
///
/// - `trace`: a V2 `@Trace` field (or any decorated V2 component variable). Reads record a
///   dependency, writes fire a change. Untraced fields of a described type are plain.
/// - `track`: a V1 `@Track` field. Changes to it only re-render elements which read it.
/// - `read_only`: a traced field that may only be written by the framework (`@Param`).
#[derive(Debug, Default)]
pub struct ClassDescriptor {
    name: String,
    traced: HashSet<Rc<str>>,
    tracked: HashSet<Rc<str>>,
    read_only: HashSet<Rc<str>>,
}

#[derive(Debug)]
pub struct ClassDescriptorBuilder(ClassDescriptor);

impl ClassDescriptor {
    pub fn builder(name: impl Into<String>) -> ClassDescriptorBuilder {
        ClassDescriptorBuilder(ClassDescriptor {
            name: name.into(),
            ..ClassDescriptor::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_traced(&self, field: &str) -> bool {
        self.traced.contains(field)
    }

    pub fn traced_fields(&self) -> impl Iterator<Item = &str> {
        self.traced.iter().map(|f| &**f)
    }

    pub fn has_traced_fields(&self) -> bool {
        !self.traced.is_empty()
    }

    pub fn is_tracked(&self, field: &str) -> bool {
        self.tracked.contains(field)
    }

    pub fn has_tracked_fields(&self) -> bool {
        !self.tracked.is_empty()
    }

    pub fn is_read_only(&self, field: &str) -> bool {
        self.read_only.contains(field)
    }
}

impl ClassDescriptorBuilder {
    pub fn trace(mut self, field: &str) -> Self {
        self.0.traced.insert(Rc::from(field));
        self
    }

    pub fn track(mut self, field: &str) -> Self {
        self.0.tracked.insert(Rc::from(field));
        self
    }

    pub fn read_only(mut self, field: &str) -> Self {
        let field: Rc<str> = Rc::from(field);
        self.0.traced.insert(field.clone());
        self.0.read_only.insert(field);
        self
    }

    pub fn build(self) -> Rc<ClassDescriptor> {
        Rc::new(self.0)
    }
}
