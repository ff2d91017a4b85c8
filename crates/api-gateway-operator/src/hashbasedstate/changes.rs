use std::fmt::{Display, Formatter};

use kube::Resource;

use super::{Actual, Desired, Hashable};

/// Changes required to move the actual state to the desired state.
///
/// The order of the objects within each list carries no meaning.
#[derive(Clone, Debug, PartialEq)]
pub struct Changes<T> {
    pub create: Vec<T>,
    pub update: Vec<T>,
    pub delete: Vec<T>,
}

impl<T> Changes<T> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

impl<T: Resource> Display for Changes<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Create: {}; Update: {}; Delete: {}",
            object_names(&self.create),
            object_names(&self.update),
            object_names(&self.delete)
        )
    }
}

/// Objects that are not created yet only have a generate name prefix.
fn object_names<T: Resource>(objects: &[T]) -> String {
    objects
        .iter()
        .map(|object| {
            let meta = object.meta();
            meta.name
                .as_deref()
                .filter(|name| !name.is_empty())
                .or(meta.generate_name.as_deref())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compares both states by hash key.
///
/// - Objects in both states are updated: the actual object keeps its metadata
///   and gets the spec of the desired object.
/// - Objects only in the actual state are deleted, as are all actual objects
///   without identity labels.
/// - Objects only in the desired state are created.
pub fn get_changes<H: Hashable>(mut desired: Desired<H>, actual: Actual<H>) -> Changes<H::Object> {
    let mut update = Vec::new();
    let mut delete = Vec::new();

    for (key, mut hashable) in actual.hashables {
        match desired.hashables.remove(&key) {
            Some(desired) => {
                hashable.update_spec(&desired);
                update.push(hashable.into_object());
            }
            None => delete.push(hashable.into_object()),
        }
    }

    delete.extend(
        actual
            .marked_for_deletion
            .into_iter()
            .map(Hashable::into_object),
    );

    // Whatever is left in the desired state has no counterpart in the cluster.
    let create = desired
        .hashables
        .into_values()
        .map(Hashable::into_object)
        .collect();

    Changes {
        create,
        update,
        delete,
    }
}
