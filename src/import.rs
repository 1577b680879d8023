use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{
    Catalog, EntityRef, Extra, NameRef, NewGroup, NewOrganization, PackagePayload,
    PackageResource,
};
use crate::config::ResolvedConfig;
use crate::domain::DatasetRecord;
use crate::error::HarvestError;
use crate::munge::{munge_tag, munge_title_to_name};
use crate::queue::HarvestObject;
use crate::stage::Stage;

const SUFFIX_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub guid: String,
    pub package_id: String,
    pub name: String,
    pub created: bool,
    pub organization: String,
    pub groups: Vec<String>,
    pub translations: usize,
}

pub struct ImportStage<'a, C: Catalog> {
    config: &'a ResolvedConfig,
    catalog: &'a C,
}

impl<'a, C: Catalog> ImportStage<'a, C> {
    pub fn new(config: &'a ResolvedConfig, catalog: &'a C) -> Self {
        Self { config, catalog }
    }

    pub fn import_record(&self, record: DatasetRecord) -> Result<ImportOutcome, HarvestError> {
        let guid = record.id.to_string();
        self.upsert(record).map_err(|err| {
            tracing::error!(%guid, error = %err, "import failed");
            match err {
                HarvestError::ImportFailed { .. } => err,
                other => HarvestError::import(&guid, other),
            }
        })
    }

    fn upsert(&self, mut record: DatasetRecord) -> Result<ImportOutcome, HarvestError> {
        let id = record.id.to_string();
        let name = self.publish_name(&record)?;

        let groups = record
            .groups
            .iter()
            .map(|title| self.ensure_group(title))
            .collect::<Result<Vec<_>, _>>()?;
        let organization = self.ensure_organization()?;

        record.owner_org = Some(organization.id.clone());
        if !record.license_url.is_empty() {
            record
                .extras
                .insert("license_url".to_string(), record.license_url.clone());
        }

        let payload = package_payload(&record, &name, &organization.id, &groups);
        let created = match self.catalog.package_show(&id)? {
            Some(_) => {
                self.catalog.package_update(&payload)?;
                false
            }
            None => {
                self.catalog.package_create(&payload)?;
                true
            }
        };

        self.catalog
            .term_translation_update_many(&record.translations)?;

        tracing::info!(
            guid = %id,
            %name,
            created,
            translations = record.translations.len(),
            "imported dataset"
        );
        Ok(ImportOutcome {
            guid: id.clone(),
            package_id: id,
            name,
            created,
            organization: organization.name,
            groups: groups.into_iter().map(|group| group.name).collect(),
            translations: record.translations.len(),
        })
    }

    /// Slug of the title (or natural key). A name held by another package gets a random
    /// suffix; a package keeps the name it was published under on re-import.
    fn publish_name(&self, record: &DatasetRecord) -> Result<String, HarvestError> {
        let id = record.id.to_string();
        let base = [record.title.as_str(), record.natural_key.as_str()]
            .into_iter()
            .map(munge_title_to_name)
            .find(|slug| !slug.is_empty())
            .unwrap_or_else(|| id.clone());

        if let Some(existing) = self.catalog.package_show(&id)? {
            if is_derived_name(&existing.name, &base) {
                return Ok(existing.name);
            }
        }

        let mut candidate = base.clone();
        loop {
            match self.catalog.package_show(&candidate)? {
                Some(found) if found.id != id => {
                    candidate = suffixed(&base);
                }
                _ => return Ok(candidate),
            }
        }
    }

    fn ensure_group(&self, title: &str) -> Result<EntityRef, HarvestError> {
        let name = munge_title_to_name(title);
        if let Some(group) = self.catalog.group_show(&name)? {
            return Ok(group);
        }
        tracing::info!(%name, "creating group");
        self.catalog.group_create(&NewGroup {
            name,
            title: title.to_string(),
        })
    }

    fn ensure_organization(&self) -> Result<EntityRef, HarvestError> {
        let descriptor = self.config.base_organization();
        let name = munge_title_to_name(&descriptor.name);
        if let Some(organization) = self.catalog.organization_show(&name)? {
            return Ok(organization);
        }
        tracing::info!(%name, "creating organization");
        let extras = descriptor
            .website
            .iter()
            .map(|website| Extra {
                key: "website".to_string(),
                value: website.clone(),
            })
            .collect();
        self.catalog.organization_create(&NewOrganization {
            name,
            title: descriptor.name.clone(),
            description: descriptor.description.clone(),
            extras,
        })
    }
}

impl<C: Catalog> Stage for ImportStage<'_, C> {
    type Input = HarvestObject;
    type Output = ImportOutcome;

    fn name(&self) -> &'static str {
        "import"
    }

    fn run(&self, object: HarvestObject) -> Result<ImportOutcome, HarvestError> {
        let record: DatasetRecord = serde_json::from_str(&object.content).map_err(|err| {
            tracing::error!(object = %object.id, error = %err, "undecodable harvest object");
            HarvestError::import(&object.guid, format!("invalid content: {err}"))
        })?;
        if record.id.to_string() != object.guid {
            return Err(HarvestError::import(
                &object.guid,
                format!("content carries id {}", record.id),
            ));
        }
        self.import_record(record)
    }
}

fn package_payload(
    record: &DatasetRecord,
    name: &str,
    owner_org: &str,
    groups: &[EntityRef],
) -> PackagePayload {
    let mut seen = HashSet::new();
    let tags = record
        .tags
        .iter()
        .map(String::as_str)
        .map(munge_tag)
        .filter(|tag| seen.insert(tag.clone()))
        .map(|name| NameRef { name })
        .collect();

    PackagePayload {
        id: record.id.to_string(),
        name: name.to_string(),
        title: record.title.clone(),
        url: record.url.clone(),
        notes: record.notes.clone(),
        author: record.author.clone(),
        maintainer: record.maintainer.clone(),
        maintainer_email: record.maintainer_email.clone(),
        license_id: record.license_id.clone(),
        owner_org: owner_org.to_string(),
        tags,
        groups: groups
            .iter()
            .map(|group| NameRef {
                name: group.name.clone(),
            })
            .collect(),
        resources: record
            .resources
            .iter()
            .map(|resource| PackageResource {
                url: resource.url.clone(),
                name: resource.name.clone(),
                format: resource.format.clone(),
                size: resource.size,
                version: resource.version.clone(),
            })
            .collect(),
        extras: record
            .extras
            .iter()
            .map(|(key, value)| Extra {
                key: key.clone(),
                value: value.clone(),
            })
            .collect(),
    }
}

fn is_derived_name(name: &str, base: &str) -> bool {
    if name == base {
        return true;
    }
    let stem = truncated_base(base);
    name.strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|suffix| {
            suffix.len() == SUFFIX_LENGTH && suffix.chars().all(|ch| ch.is_ascii_hexdigit())
        })
}

fn suffixed(base: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", truncated_base(base), &random[..SUFFIX_LENGTH])
}

fn truncated_base(base: &str) -> &str {
    let max = MAX_NAME_LENGTH - SUFFIX_LENGTH - 1;
    if base.len() > max {
        base[..max].trim_end_matches('-')
    } else {
        base
    }
}
