use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use super::Value;

/// Property storage shared by every alias of an object value.
#[derive(Default)]
pub struct Object {
    pub fields: FxHashMap<String, Value>,
}

impl Object {
    pub fn boxed(fields: FxHashMap<String, Value>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self { fields }))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    pub fn set(&mut self, name: String, value: Value) {
        self.fields.insert(name, value);
    }

    fn sorted_fields(&self) -> Vec<(&String, &Value)> {
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        fields
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.sorted_fields()).finish()
    }
}

/// Writes `object` with keys in sorted order. Objects already being written
/// further up are shown as `{...}` so that self-references terminate.
pub(super) fn write_object(
    f: &mut std::fmt::Formatter<'_>,
    object: &Rc<RefCell<Object>>,
    open: &mut Vec<*const RefCell<Object>>,
) -> std::fmt::Result {
    let ptr = Rc::as_ptr(object);
    if open.contains(&ptr) {
        return write!(f, "{{...}}");
    }

    let object = object.borrow();
    if object.fields.is_empty() {
        return write!(f, "{{}}");
    }

    open.push(ptr);
    write!(f, "{{ ")?;
    for (i, (name, value)) in object.sorted_fields().into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: ", name)?;
        match value {
            Value::String(s) => write!(f, "\"{}\"", s)?,
            Value::Object(inner) => write_object(f, inner, open)?,
            other => write!(f, "{}", other)?,
        }
    }
    open.pop();
    write!(f, " }}")
}
