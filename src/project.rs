//! Consortium project scaffolding: create, grant, copy template, register.

use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::{AccessType, SynapseId};
use crate::error::SyndccError;
use crate::synapse::{self, FILE_TYPE, FOLDER_TYPE, PROJECT_TYPE, SynapseClient, TABLE_TYPE};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopySummary {
    pub folders: usize,
    pub files: usize,
}

/// Creates a project and applies the public, team and admin grants.
pub fn create_project<S: SynapseClient + ?Sized>(
    client: &S,
    name: &str,
    public_principals: &[u64],
    team_id: Option<u64>,
    admin_team: u64,
) -> Result<SynapseId, SyndccError> {
    let created = client.create_entity(&json!({
        "concreteType": PROJECT_TYPE,
        "name": name,
    }))?;
    let project = entity_id(&created)?;
    tracing::info!(%project, name, "project created");

    for principal in public_principals {
        synapse::set_permissions(client, &project, *principal, vec![AccessType::Read])?;
    }
    if let Some(team) = team_id {
        synapse::set_permissions(client, &project, team, AccessType::team_member())?;
    }
    synapse::set_permissions(client, &project, admin_team, AccessType::admin())?;
    Ok(project)
}

/// Recreates the folder tree and files under `source` inside `destination`.
pub fn copy_tree<S: SynapseClient + ?Sized>(
    client: &S,
    source: &SynapseId,
    destination: &SynapseId,
) -> Result<CopySummary, SyndccError> {
    let mut summary = CopySummary::default();
    let mut pending = vec![(source.clone(), destination.clone())];
    while let Some((from, to)) = pending.pop() {
        for child in client.children(&from)? {
            if child.is_folder() {
                let created = client.create_entity(&json!({
                    "concreteType": FOLDER_TYPE,
                    "name": child.name,
                    "parentId": to.as_str(),
                }))?;
                pending.push((child.id.clone(), entity_id(&created)?));
                summary.folders += 1;
            } else if child.is_file() {
                copy_file(client, &child.id, &to)?;
                summary.files += 1;
            }
        }
    }
    tracing::info!(%source, %destination, folders = summary.folders, files = summary.files, "template copied");
    Ok(summary)
}

fn copy_file<S: SynapseClient + ?Sized>(
    client: &S,
    file: &SynapseId,
    parent: &SynapseId,
) -> Result<SynapseId, SyndccError> {
    let original = client.get_entity(file)?;
    let handle = original
        .get("dataFileHandleId")
        .and_then(Value::as_str)
        .ok_or_else(|| SyndccError::SynapseHttp(format!("{file} has no file handle")))?;
    let new_handle = client.copy_file_handle(file, handle)?;
    let mut entity = json!({
        "concreteType": FILE_TYPE,
        "name": original.get("name").cloned().unwrap_or(Value::Null),
        "parentId": parent.as_str(),
        "dataFileHandleId": new_handle,
    });
    if let Some(description) = original.get("description") {
        entity["description"] = description.clone();
    }
    entity_id(&client.create_entity(&entity)?)
}

/// Adds `project` to the scope of a project view. Already scoped projects
/// are left alone.
pub fn add_to_view_scope<S: SynapseClient + ?Sized>(
    client: &S,
    view: &SynapseId,
    project: &SynapseId,
) -> Result<bool, SyndccError> {
    let mut entity = client.get_entity(view)?;
    let scope = entity
        .get_mut("scopeIds")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| SyndccError::SynapseHttp(format!("{view} is not a view")))?;
    let present = scope.iter().filter_map(Value::as_str).any(|id| {
        id.trim_start_matches("syn") == project.numeric()
    });
    if present {
        return Ok(false);
    }
    scope.push(Value::String(project.numeric().to_string()));
    client.update_entity(view, &entity)?;
    tracing::info!(%view, %project, "view scope updated");
    Ok(true)
}

/// Creates a table entity with freshly created columns.
pub fn create_table<S: SynapseClient + ?Sized>(
    client: &S,
    parent: &SynapseId,
    name: &str,
    columns: &[synapse::ColumnModel],
) -> Result<SynapseId, SyndccError> {
    let created = client.create_columns(columns)?;
    let column_ids = created
        .iter()
        .map(|column| {
            column
                .id
                .clone()
                .ok_or_else(|| SyndccError::SynapseHttp(format!("column {} has no id", column.name)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let table = client.create_entity(&json!({
        "concreteType": TABLE_TYPE,
        "name": name,
        "parentId": parent.as_str(),
        "columnIds": column_ids,
    }))?;
    entity_id(&table)
}

pub fn entity_id(entity: &Value) -> Result<SynapseId, SyndccError> {
    entity
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| SyndccError::SynapseHttp("entity response has no id".to_string()))?
        .parse()
}
