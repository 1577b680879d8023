use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::CatalogSettings;
use crate::domain::TranslationTriple;
use crate::error::HarvestError;

/// `id`/`name` pair returned by every show and create action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extra {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub extras: Vec<Extra>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageResource {
    pub url: String,
    pub name: String,
    pub format: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePayload {
    pub id: String,
    pub name: String,
    pub title: String,
    pub url: String,
    pub notes: String,
    pub author: String,
    pub maintainer: String,
    pub maintainer_email: String,
    pub license_id: String,
    pub owner_org: String,
    pub tags: Vec<NameRef>,
    pub groups: Vec<NameRef>,
    pub resources: Vec<PackageResource>,
    pub extras: Vec<Extra>,
}

pub trait Catalog: Send + Sync {
    fn organization_show(&self, name: &str) -> Result<Option<EntityRef>, HarvestError>;
    fn organization_create(&self, organization: &NewOrganization)
    -> Result<EntityRef, HarvestError>;
    fn group_show(&self, name: &str) -> Result<Option<EntityRef>, HarvestError>;
    fn group_create(&self, group: &NewGroup) -> Result<EntityRef, HarvestError>;
    /// Looks a package up by id or by name.
    fn package_show(&self, id_or_name: &str) -> Result<Option<EntityRef>, HarvestError>;
    fn package_create(&self, package: &PackagePayload) -> Result<EntityRef, HarvestError>;
    fn package_update(&self, package: &PackagePayload) -> Result<EntityRef, HarvestError>;
    /// Upserts every triple keyed by `(lang_code, term)`.
    fn term_translation_update_many(
        &self,
        triples: &[TranslationTriple],
    ) -> Result<(), HarvestError>;
}

#[derive(Debug, Deserialize)]
struct ActionResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    error: Option<Value>,
}

/// Client for the CKAN action API (`/api/3/action/<name>`).
#[derive(Clone)]
pub struct CkanHttpClient {
    client: Client,
    base_url: String,
}

impl CkanHttpClient {
    pub fn new(settings: &CatalogSettings) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sfa-harvester/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::CatalogHttp(err.to_string()))?,
        );
        if let Some(api_key) = &settings.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(api_key)
                    .map_err(|err| HarvestError::CatalogHttp(err.to_string()))?,
            );
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| HarvestError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.url.clone(),
        })
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/api/3/action/{action}", self.base_url)
    }

    fn call<T: DeserializeOwned>(&self, action: &str, body: &Value) -> Result<T, HarvestError> {
        self.call_optional(action, body)?
            .ok_or_else(|| HarvestError::CatalogAction {
                action: action.to_string(),
                message: "not found".to_string(),
            })
    }

    /// `Ok(None)` when CKAN answers 404.
    fn call_optional<T: DeserializeOwned>(
        &self,
        action: &str,
        body: &Value,
    ) -> Result<Option<T>, HarvestError> {
        let response = self
            .client
            .post(self.action_url(action))
            .json(body)
            .send()
            .map_err(|err| HarvestError::CatalogHttp(err.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response
            .text()
            .map_err(|err| HarvestError::CatalogHttp(err.to_string()))?;
        let envelope: ActionResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(HarvestError::CatalogStatus {
                    status: status.as_u16(),
                    message: text,
                });
            }
            Err(err) => return Err(HarvestError::CatalogHttp(err.to_string())),
        };
        if !envelope.success {
            let message = envelope
                .error
                .map(|error| error.to_string())
                .unwrap_or_else(|| format!("status {}", status.as_u16()));
            return Err(HarvestError::CatalogAction {
                action: action.to_string(),
                message,
            });
        }
        Ok(envelope.result)
    }
}

impl Catalog for CkanHttpClient {
    fn organization_show(&self, name: &str) -> Result<Option<EntityRef>, HarvestError> {
        self.call_optional("organization_show", &json!({ "id": name }))
    }

    fn organization_create(
        &self,
        organization: &NewOrganization,
    ) -> Result<EntityRef, HarvestError> {
        self.call("organization_create", &to_value(organization)?)
    }

    fn group_show(&self, name: &str) -> Result<Option<EntityRef>, HarvestError> {
        self.call_optional("group_show", &json!({ "id": name }))
    }

    fn group_create(&self, group: &NewGroup) -> Result<EntityRef, HarvestError> {
        self.call("group_create", &to_value(group)?)
    }

    fn package_show(&self, id_or_name: &str) -> Result<Option<EntityRef>, HarvestError> {
        self.call_optional("package_show", &json!({ "id": id_or_name }))
    }

    fn package_create(&self, package: &PackagePayload) -> Result<EntityRef, HarvestError> {
        self.call("package_create", &to_value(package)?)
    }

    fn package_update(&self, package: &PackagePayload) -> Result<EntityRef, HarvestError> {
        self.call("package_update", &to_value(package)?)
    }

    fn term_translation_update_many(
        &self,
        triples: &[TranslationTriple],
    ) -> Result<(), HarvestError> {
        if triples.is_empty() {
            return Ok(());
        }
        let _: Value = self.call(
            "term_translation_update_many",
            &json!({ "data": to_value(triples)? }),
        )?;
        Ok(())
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, HarvestError> {
    serde_json::to_value(value).map_err(|err| HarvestError::CatalogHttp(err.to_string()))
}

#[derive(Debug, Default)]
struct MemoryState {
    organizations: BTreeMap<String, (String, NewOrganization)>,
    groups: BTreeMap<String, (String, NewGroup)>,
    packages: BTreeMap<String, PackagePayload>,
    translations: BTreeMap<(String, String), String>,
}

/// In-process catalog used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, HarvestError> {
        self.state
            .lock()
            .map_err(|_| HarvestError::CatalogHttp("memory catalog lock poisoned".to_string()))
    }

    pub fn organization_count(&self) -> usize {
        self.state().map(|state| state.organizations.len()).unwrap_or(0)
    }

    pub fn group_count(&self) -> usize {
        self.state().map(|state| state.groups.len()).unwrap_or(0)
    }

    pub fn package_count(&self) -> usize {
        self.state().map(|state| state.packages.len()).unwrap_or(0)
    }

    pub fn translation_count(&self) -> usize {
        self.state().map(|state| state.translations.len()).unwrap_or(0)
    }

    pub fn package(&self, id: &str) -> Option<PackagePayload> {
        self.state().ok()?.packages.get(id).cloned()
    }

    pub fn organization(&self, name: &str) -> Option<NewOrganization> {
        self.state()
            .ok()?
            .organizations
            .get(name)
            .map(|(_, organization)| organization.clone())
    }

    pub fn translation(&self, lang: &str, term: &str) -> Option<String> {
        self.state()
            .ok()?
            .translations
            .get(&(lang.to_string(), term.to_string()))
            .cloned()
    }
}

impl Catalog for MemoryCatalog {
    fn organization_show(&self, name: &str) -> Result<Option<EntityRef>, HarvestError> {
        Ok(self.state()?.organizations.get(name).map(|(id, _)| EntityRef {
            id: id.clone(),
            name: name.to_string(),
        }))
    }

    fn organization_create(
        &self,
        organization: &NewOrganization,
    ) -> Result<EntityRef, HarvestError> {
        let mut state = self.state()?;
        if state.organizations.contains_key(&organization.name) {
            return Err(HarvestError::CatalogAction {
                action: "organization_create".to_string(),
                message: format!("{} already exists", organization.name),
            });
        }
        let id = Uuid::new_v4().to_string();
        state
            .organizations
            .insert(organization.name.clone(), (id.clone(), organization.clone()));
        Ok(EntityRef {
            id,
            name: organization.name.clone(),
        })
    }

    fn group_show(&self, name: &str) -> Result<Option<EntityRef>, HarvestError> {
        Ok(self.state()?.groups.get(name).map(|(id, _)| EntityRef {
            id: id.clone(),
            name: name.to_string(),
        }))
    }

    fn group_create(&self, group: &NewGroup) -> Result<EntityRef, HarvestError> {
        let mut state = self.state()?;
        if state.groups.contains_key(&group.name) {
            return Err(HarvestError::CatalogAction {
                action: "group_create".to_string(),
                message: format!("{} already exists", group.name),
            });
        }
        let id = Uuid::new_v4().to_string();
        state
            .groups
            .insert(group.name.clone(), (id.clone(), group.clone()));
        Ok(EntityRef {
            id,
            name: group.name.clone(),
        })
    }

    fn package_show(&self, id_or_name: &str) -> Result<Option<EntityRef>, HarvestError> {
        let state = self.state()?;
        let found = state.packages.get(id_or_name).or_else(|| {
            state
                .packages
                .values()
                .find(|package| package.name == id_or_name)
        });
        Ok(found.map(|package| EntityRef {
            id: package.id.clone(),
            name: package.name.clone(),
        }))
    }

    fn package_create(&self, package: &PackagePayload) -> Result<EntityRef, HarvestError> {
        let mut state = self.state()?;
        let name_taken = state
            .packages
            .values()
            .any(|existing| existing.name == package.name);
        if state.packages.contains_key(&package.id) || name_taken {
            return Err(HarvestError::CatalogAction {
                action: "package_create".to_string(),
                message: format!("package {} already exists", package.name),
            });
        }
        state.packages.insert(package.id.clone(), package.clone());
        Ok(EntityRef {
            id: package.id.clone(),
            name: package.name.clone(),
        })
    }

    fn package_update(&self, package: &PackagePayload) -> Result<EntityRef, HarvestError> {
        let mut state = self.state()?;
        let Some(existing) = state.packages.get_mut(&package.id) else {
            return Err(HarvestError::CatalogAction {
                action: "package_update".to_string(),
                message: format!("package {} not found", package.id),
            });
        };
        *existing = package.clone();
        Ok(EntityRef {
            id: package.id.clone(),
            name: package.name.clone(),
        })
    }

    fn term_translation_update_many(
        &self,
        triples: &[TranslationTriple],
    ) -> Result<(), HarvestError> {
        if let Some(blank) = triples
            .iter()
            .find(|t| t.term.trim().is_empty() || t.term_translation.trim().is_empty())
        {
            return Err(HarvestError::CatalogAction {
                action: "term_translation_update_many".to_string(),
                message: format!("empty term or translation for {}", blank.lang_code),
            });
        }
        let mut state = self.state()?;
        for triple in triples {
            state.translations.insert(
                (triple.lang_code.to_string(), triple.term.clone()),
                triple.term_translation.clone(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(id: &str, name: &str) -> PackagePayload {
        PackagePayload {
            id: id.to_string(),
            name: name.to_string(),
            title: "Census".to_string(),
            url: String::new(),
            notes: String::new(),
            author: String::new(),
            maintainer: String::new(),
            maintainer_email: String::new(),
            license_id: String::new(),
            owner_org: "org".to_string(),
            tags: Vec::new(),
            groups: Vec::new(),
            resources: Vec::new(),
            extras: Vec::new(),
        }
    }

    #[test]
    fn memory_package_lookup_by_id_or_name() {
        let catalog = MemoryCatalog::new();
        catalog.package_create(&payload("p1", "census")).unwrap();

        assert_eq!(catalog.package_show("p1").unwrap().unwrap().name, "census");
        assert_eq!(catalog.package_show("census").unwrap().unwrap().id, "p1");
        assert!(catalog.package_show("other").unwrap().is_none());
        assert!(catalog.package_create(&payload("p2", "census")).is_err());
    }

    #[test]
    fn action_envelope_parses_error() {
        let body = r#"{"success": false, "error": {"__type": "Validation Error"}}"#;
        let envelope: ActionResponse<EntityRef> = serde_json::from_str(body).unwrap();
        assert!(!envelope.success);
        assert!(envelope.result.is_none());
        assert!(envelope.error.is_some());
    }
}
