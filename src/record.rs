use std::collections::BTreeMap;

use uuid::Uuid;

use crate::domain::{
    COL_AUTHOR, COL_GROUPS, COL_LICENCE, COL_LICENCE_URL, COL_MAINTAINER, COL_MAINTAINER_EMAIL,
    COL_NOTES, COL_TAGS, COL_TITLE, COL_URL, COL_VERSION, DatasetRecord, Identity,
    ResourceDescriptor, Row, TranslationTriple, split_tags, stable_id,
};
use crate::error::RowError;

/// Columns the base sheet must provide for a record to be built.
const REQUIRED_COLUMNS: [&str; 5] = [COL_TITLE, COL_NOTES, COL_LICENCE, COL_TAGS, COL_GROUPS];

pub struct DatasetRecordBuilder;

impl DatasetRecordBuilder {
    pub fn build(
        row: &Row,
        mut resources: Vec<ResourceDescriptor>,
        translations: Vec<TranslationTriple>,
    ) -> Result<DatasetRecord, RowError> {
        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|column| row.get(column).is_none())
        {
            return Err(RowError::MalformedRow {
                row: row.index(),
                message: format!("missing column {missing}"),
            });
        }

        let (id, identity, natural_key) = match row.natural_key() {
            Some(key) => (stable_id(key), Identity::Stable, key.to_string()),
            None => (Uuid::new_v4(), Identity::Unstable, String::new()),
        };

        // TODO: confirm with the data owners whether a version applies to every file of a
        // multi-resource dataset before stamping more than the first one.
        let version = row.get_or_empty(COL_VERSION).trim();
        if !version.is_empty() {
            if let Some(first) = resources.first_mut() {
                first.version = Some(version.to_string());
            }
        }

        let group = row.get_or_empty(COL_GROUPS).trim();
        let groups = if group.is_empty() {
            Vec::new()
        } else {
            vec![group.to_string()]
        };

        Ok(DatasetRecord {
            id,
            identity,
            natural_key,
            title: row.get_or_empty(COL_TITLE).to_string(),
            url: row.get_or_empty(COL_URL).to_string(),
            notes: row.get_or_empty(COL_NOTES).to_string(),
            author: row.get_or_empty(COL_AUTHOR).to_string(),
            maintainer: row.get_or_empty(COL_MAINTAINER).to_string(),
            maintainer_email: row.get_or_empty(COL_MAINTAINER_EMAIL).to_string(),
            license_id: row.get_or_empty(COL_LICENCE).to_string(),
            license_url: row.get_or_empty(COL_LICENCE_URL).to_string(),
            tags: split_tags(row.get_or_empty(COL_TAGS)),
            groups,
            resources,
            translations,
            owner_org: None,
            extras: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn base_row(id: &str, version: &str) -> Row {
        Row::from_pairs(
            7,
            [
                ("id", id),
                ("title", "Census"),
                ("notes", "Population census"),
                ("licence", "cc-by"),
                ("licence_url", "https://example.org/cc-by"),
                ("tags", "a, b, a"),
                ("groups", "Stats"),
                ("version", version),
            ],
        )
    }

    fn resource(name: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            url: format!("http://bucket/{name}"),
            name: name.to_string(),
            format: "csv".to_string(),
            size: 1,
            version: None,
        }
    }

    #[test]
    fn build_assigns_stable_identity() {
        let record = DatasetRecordBuilder::build(&base_row("x1", ""), Vec::new(), Vec::new())
            .unwrap();
        assert_eq!(record.id, stable_id("x1"));
        assert!(record.is_stable());
        assert_eq!(record.natural_key, "x1");
        assert_eq!(record.tags, vec!["a", "b", "a"]);
        assert_eq!(record.groups, vec!["Stats"]);
        assert_eq!(record.license_url, "https://example.org/cc-by");
    }

    #[test]
    fn missing_key_falls_back_to_unstable_identity() {
        let first = DatasetRecordBuilder::build(&base_row("", ""), Vec::new(), Vec::new())
            .unwrap();
        let second = DatasetRecordBuilder::build(&base_row("  ", ""), Vec::new(), Vec::new())
            .unwrap();
        assert_eq!(first.identity, Identity::Unstable);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn version_stamps_first_resource_only() {
        let record = DatasetRecordBuilder::build(
            &base_row("x1", "2.1"),
            vec![resource("a.csv"), resource("b.csv")],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(record.resources[0].version.as_deref(), Some("2.1"));
        assert_eq!(record.resources[1].version, None);
    }

    #[test]
    fn missing_required_column_is_malformed() {
        let row = Row::from_pairs(9, [("id", "x1"), ("title", "Census")]);
        let err = DatasetRecordBuilder::build(&row, Vec::new(), Vec::new()).unwrap_err();
        assert_matches!(err, RowError::MalformedRow { row: 9, .. });
    }
}
