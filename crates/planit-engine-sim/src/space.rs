//! Object space of the simulated engine.
//!
//! Every object handed out over the gateway lives here, keyed by handle id,
//! with its state kept as a property bag of wire values.

use planit_core::{RemoteHandle, WireValue};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct SimObject {
    pub handle: RemoteHandle,
    pub props: BTreeMap<String, WireValue>,
}

#[derive(Debug, Default)]
pub struct ObjectSpace {
    next_id: u64,
    objects: HashMap<String, SimObject>,
    enums: HashMap<(String, String), RemoteHandle>,
}

impl ObjectSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, class: &str) -> RemoteHandle {
        self.create_with(class, Vec::<(&str, WireValue)>::new())
    }

    pub fn create_with<'a>(
        &mut self,
        class: &str,
        props: impl IntoIterator<Item = (&'a str, WireValue)>,
    ) -> RemoteHandle {
        self.next_id += 1;
        let handle = RemoteHandle::new(format!("o{}", self.next_id), class);
        let props = props
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        self.objects.insert(
            handle.id.clone(),
            SimObject {
                handle: handle.clone(),
                props,
            },
        );
        handle
    }

    /// Enum instances are shared per constant.
    pub fn enum_instance(&mut self, class: &str, constant: &str) -> RemoteHandle {
        let key = (class.to_string(), constant.to_string());
        if let Some(handle) = self.enums.get(&key) {
            return handle.clone();
        }
        let handle = self.create_with(class, [("constant", WireValue::from(constant))]);
        self.enums.insert(key, handle.clone());
        handle
    }

    pub fn get(&self, id: &str) -> Option<&SimObject> {
        self.objects.get(id)
    }

    pub fn prop(&self, id: &str, key: &str) -> Option<&WireValue> {
        self.objects.get(id).and_then(|object| object.props.get(key))
    }

    pub fn set_prop(&mut self, id: &str, key: &str, value: impl Into<WireValue>) {
        if let Some(object) = self.objects.get_mut(id) {
            object.props.insert(key.to_string(), value.into());
        }
    }

    /// Object stored under `key` on `parent`, created on first access.
    pub fn child(&mut self, parent: &str, key: &str, class: &str) -> RemoteHandle {
        if let Some(WireValue::Object(handle)) = self.prop(parent, key) {
            return handle.clone();
        }
        let handle = self.create(class);
        self.set_prop(parent, key, WireValue::Object(handle.clone()));
        handle
    }

    /// Append to the list stored under `key`.
    pub fn push_prop(&mut self, id: &str, key: &str, value: WireValue) {
        if let Some(object) = self.objects.get_mut(id) {
            match object.props.get_mut(key) {
                Some(WireValue::List(items)) => items.push(value),
                _ => {
                    object.props.insert(key.to_string(), WireValue::List(vec![value]));
                }
            }
        }
    }

    pub fn handles_of(&self, class: &str) -> Vec<RemoteHandle> {
        let mut handles: Vec<_> = self
            .objects
            .values()
            .filter(|object| object.handle.type_name == class)
            .map(|object| object.handle.clone())
            .collect();
        handles.sort_by_key(|handle| handle.id[1..].parse::<u64>().unwrap_or(u64::MAX));
        handles
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_is_cached() {
        let mut space = ObjectSpace::new();
        let parent = space.create("org.planit.gap.LinkBasedRelativeDualityGapFunction");

        let first = space.child(&parent.id, "stopCriterion", "org.planit.gap.StopCriterion");
        let second = space.child(&parent.id, "stopCriterion", "org.planit.gap.StopCriterion");

        assert_eq!(first, second);
        assert_eq!(space.len(), 2);
    }

    #[test]
    fn test_enum_instances_are_shared() {
        let mut space = ObjectSpace::new();
        let a = space.enum_instance("org.planit.output.enums.OutputType", "LINK");
        let b = space.enum_instance("org.planit.output.enums.OutputType", "LINK");
        let c = space.enum_instance("org.planit.output.enums.OutputType", "OD");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(space.prop(&a.id, "constant"), Some(&WireValue::from("LINK")));
    }

    #[test]
    fn test_push_prop_builds_list() {
        let mut space = ObjectSpace::new();
        let handle = space.create("org.planit.project.PlanItSimpleProject");
        space.push_prop(&handle.id, "initialCosts", WireValue::Int(1));
        space.push_prop(&handle.id, "initialCosts", WireValue::Int(2));

        assert_eq!(
            space.prop(&handle.id, "initialCosts"),
            Some(&WireValue::List(vec![WireValue::Int(1), WireValue::Int(2)]))
        );
    }
}
