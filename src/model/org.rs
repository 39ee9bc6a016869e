use crate::model::shift::ShiftSource;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: u64,
    pub name: String,
    pub default_shift_id: Option<u64>,
    pub enable_geo_fencing: bool,
    pub max_location_settings_count: u32,
    /// Ordered JSON array of shift-assignment sources.
    pub shift_priority: String,
    pub status: String,
}

/// Typed, validated view of an organization's attendance configuration.
/// Parsed once per org (cached), not re-read as raw JSON per request.
#[derive(Debug, Clone)]
pub struct OrgSettings {
    pub organization_id: u64,
    pub default_shift_id: Option<u64>,
    pub enable_geo_fencing: bool,
    pub max_location_settings_count: u32,
    pub shift_priority: Vec<ShiftSource>,
}

impl OrgSettings {
    pub fn try_from_row(org: &Organization) -> Result<Self> {
        let raw: Vec<String> = serde_json::from_str(&org.shift_priority)
            .with_context(|| format!("malformed shift_priority for org {}", org.id))?;

        let mut shift_priority = Vec::with_capacity(raw.len());
        for entry in &raw {
            let source: ShiftSource = entry
                .parse()
                .with_context(|| format!("unknown shift source '{}' for org {}", entry, org.id))?;
            if shift_priority.contains(&source) {
                bail!("duplicate shift source '{}' for org {}", entry, org.id);
            }
            shift_priority.push(source);
        }
        if shift_priority.is_empty() {
            bail!("empty shift_priority for org {}", org.id);
        }

        Ok(Self {
            organization_id: org.id,
            default_shift_id: org.default_shift_id,
            enable_geo_fencing: org.enable_geo_fencing,
            max_location_settings_count: org.max_location_settings_count,
            shift_priority,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org_row(priority: &str) -> Organization {
        Organization {
            id: 7,
            name: "Acme".into(),
            default_shift_id: Some(1),
            enable_geo_fencing: true,
            max_location_settings_count: 3,
            shift_priority: priority.into(),
            status: "active".into(),
        }
    }

    #[test]
    fn parses_ordered_priority_list() {
        let settings = OrgSettings::try_from_row(&org_row(
            r#"["member","designation","department","org_location"]"#,
        ))
        .unwrap();
        assert_eq!(
            settings.shift_priority,
            vec![
                ShiftSource::Member,
                ShiftSource::Designation,
                ShiftSource::Department,
                ShiftSource::OrgLocation
            ]
        );
    }

    #[test]
    fn rejects_unknown_source() {
        assert!(OrgSettings::try_from_row(&org_row(r#"["member","team"]"#)).is_err());
    }

    #[test]
    fn rejects_duplicates_and_empty() {
        assert!(OrgSettings::try_from_row(&org_row(r#"["member","member"]"#)).is_err());
        assert!(OrgSettings::try_from_row(&org_row(r#"[]"#)).is_err());
    }
}
