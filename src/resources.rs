use crate::domain::{ResourceDescriptor, guess_format};
use crate::error::RowError;
use crate::s3::ObjectStore;

/// Turns the object-store listing of one dataset folder into resource descriptors.
pub struct ResourceLister<'a, S: ObjectStore> {
    store: &'a S,
    department_prefix: &'a str,
    base_url: &'a str,
}

impl<'a, S: ObjectStore> ResourceLister<'a, S> {
    pub fn new(store: &'a S, department_prefix: &'a str, base_url: &'a str) -> Self {
        Self {
            store,
            department_prefix,
            base_url: base_url.trim_end_matches('/'),
        }
    }

    pub fn prefix_for(&self, dataset_key: &str) -> String {
        format!("{}{dataset_key}/", self.department_prefix)
    }

    pub fn list(&self, dataset_key: &str) -> Result<Vec<ResourceDescriptor>, RowError> {
        let prefix = self.prefix_for(dataset_key);
        let objects =
            self.store
                .list(&prefix)
                .map_err(|err| RowError::ResourceListUnavailable {
                    key: dataset_key.to_string(),
                    message: err.to_string(),
                })?;

        Ok(objects
            .into_iter()
            .filter(|object| object.key != prefix)
            .map(|object| {
                let name = object
                    .key
                    .strip_prefix(&prefix)
                    .unwrap_or(&object.key)
                    .to_string();
                ResourceDescriptor {
                    url: format!("{}/{}", self.base_url, object.key),
                    format: guess_format(&name),
                    name,
                    size: object.size,
                    version: None,
                }
            })
            .collect())
    }
}
