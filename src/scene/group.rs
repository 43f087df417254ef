use serde::{Deserialize, Serialize};

use crate::utils::allocator::ObjectId;

/// Ordered, duplicate-free collection of object references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    objects: Vec<ObjectId>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
        }
    }

    /// Returns `false` if the object already belongs to the group.
    pub fn add_object(&mut self, id: ObjectId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.objects.push(id);
        true
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let before = self.objects.len();
        self.objects.retain(|member| *member != id);
        before != self.objects.len()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains(&id)
    }

    /// Members in insertion order.
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
