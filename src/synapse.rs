//! Synapse REST adapter.
//!
//! [`SynapseClient`] is the seam every command talks to. [`SynapseHttpClient`]
//! implements it over `repo/v1` with a personal access token; tests use
//! in-memory implementations.

use std::collections::BTreeMap;
use std::fs;
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use directories::BaseDirs;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{AccessType, SynapseId};
use crate::error::SyndccError;
use crate::frame::{Cell, Frame};

const REPO_BASE: &str = "https://repo-prod.prod.sagebase.org/repo/v1";
const FILE_BASE: &str = "https://file-prod.prod.sagebase.org/file/v1";
const TOKEN_ENV: &str = "SYNAPSE_AUTH_TOKEN";
/// Query results plus `maxRowsPerPage`.
const QUERY_PART_MASK: u32 = 0x1 | 0x8;
const TEAM_PAGE_SIZE: usize = 50;
const JOB_POLL_DELAY: Duration = Duration::from_millis(500);
const JOB_MAX_POLLS: usize = 240;

pub const PROJECT_TYPE: &str = "org.sagebionetworks.repo.model.Project";
pub const FOLDER_TYPE: &str = "org.sagebionetworks.repo.model.Folder";
pub const FILE_TYPE: &str = "org.sagebionetworks.repo.model.FileEntity";
pub const TABLE_TYPE: &str = "org.sagebionetworks.repo.model.table.TableEntity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_size: Option<u32>,
}

impl ColumnModel {
    pub fn new(name: &str, column_type: &str, maximum_size: Option<u32>) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            column_type: column_type.to_string(),
            maximum_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAccess {
    pub principal_id: u64,
    pub access_type: Vec<AccessType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlList {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub resource_access: Vec<ResourceAccess>,
}

impl AccessControlList {
    pub fn principals(&self) -> Vec<u64> {
        self.resource_access
            .iter()
            .map(|access| access.principal_id)
            .collect()
    }

    /// Replaces the principal's access types; an empty list removes it.
    pub fn set_access(&mut self, principal_id: u64, access_type: Vec<AccessType>) {
        self.resource_access
            .retain(|access| access.principal_id != principal_id);
        if !access_type.is_empty() {
            self.resource_access.push(ResourceAccess {
                principal_id,
                access_type,
            });
        }
    }
}

/// One entry of an entity's children listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildEntity {
    pub id: SynapseId,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub created_on: Option<String>,
}

impl ChildEntity {
    pub fn is_folder(&self) -> bool {
        self.entity_type == FOLDER_TYPE
    }

    pub fn is_file(&self) -> bool {
        self.entity_type == FILE_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationValue {
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub value: Vec<String>,
}

pub type Annotations = BTreeMap<String, AnnotationValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipInvitation {
    pub team_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitee_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitee_id: Option<String>,
}

/// Rows of a table query plus the handles needed to delete them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableQueryResult {
    pub frame: Frame,
    pub row_ids: Vec<i64>,
    pub etag: Option<String>,
}

pub trait SynapseClient: Send + Sync {
    fn get_entity(&self, id: &SynapseId) -> Result<Value, SyndccError>;
    fn create_entity(&self, entity: &Value) -> Result<Value, SyndccError>;
    fn update_entity(&self, id: &SynapseId, entity: &Value) -> Result<Value, SyndccError>;
    fn benefactor(&self, id: &SynapseId) -> Result<SynapseId, SyndccError>;
    fn get_acl(&self, id: &SynapseId) -> Result<AccessControlList, SyndccError>;
    fn create_acl(&self, acl: &AccessControlList) -> Result<AccessControlList, SyndccError>;
    fn update_acl(&self, acl: &AccessControlList) -> Result<AccessControlList, SyndccError>;
    /// Folders and files directly under `parent`, all pages.
    fn children(&self, parent: &SynapseId) -> Result<Vec<ChildEntity>, SyndccError>;
    fn annotations(&self, id: &SynapseId) -> Result<Annotations, SyndccError>;
    /// Owner ids of every member of a team.
    fn team_members(&self, team_id: u64) -> Result<Vec<u64>, SyndccError>;
    fn invite(&self, invitation: &MembershipInvitation) -> Result<Value, SyndccError>;
    fn query_table(&self, table: &SynapseId) -> Result<TableQueryResult, SyndccError>;
    fn table_columns(&self, table: &SynapseId) -> Result<Vec<ColumnModel>, SyndccError>;
    fn create_columns(&self, columns: &[ColumnModel]) -> Result<Vec<ColumnModel>, SyndccError>;
    /// Appends `frame` by column name and returns the number of rows written.
    fn append_rows(&self, table: &SynapseId, frame: &Frame) -> Result<usize, SyndccError>;
    fn delete_rows(
        &self,
        table: &SynapseId,
        etag: Option<&str>,
        row_ids: &[i64],
    ) -> Result<usize, SyndccError>;
    /// Copies a file handle owned by `source` and returns the new handle id.
    fn copy_file_handle(&self, source: &SynapseId, file_handle_id: &str)
    -> Result<String, SyndccError>;
}

/// Grants `access_type` to `principal_id` on `entity`. An entity that
/// inherits its ACL first gets a local copy of the benefactor's ACL.
pub fn set_permissions<S: SynapseClient + ?Sized>(
    client: &S,
    entity: &SynapseId,
    principal_id: u64,
    access_type: Vec<AccessType>,
) -> Result<AccessControlList, SyndccError> {
    let benefactor = client.benefactor(entity)?;
    if &benefactor == entity {
        let mut acl = client.get_acl(entity)?;
        acl.set_access(principal_id, access_type);
        return client.update_acl(&acl);
    }
    tracing::debug!(%entity, %benefactor, "creating local ACL from benefactor");
    let inherited = client.get_acl(&benefactor)?;
    let mut acl = AccessControlList {
        id: entity.to_string(),
        etag: None,
        resource_access: inherited.resource_access,
    };
    acl.set_access(principal_id, access_type);
    client.create_acl(&acl)
}

/// Reads the personal access token from `SYNAPSE_AUTH_TOKEN` or the
/// `[authentication]` section of `~/.synapseConfig`.
pub fn load_auth_token() -> Result<String, SyndccError> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }
    let path = BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".synapseConfig"))
        .ok_or(SyndccError::MissingCredentials)?;
    if !path.exists() {
        return Err(SyndccError::MissingCredentials);
    }
    let content = fs::read_to_string(&path).map_err(|_| SyndccError::ConfigRead(path.clone()))?;
    token_from_config(&content).ok_or(SyndccError::MissingCredentials)
}

pub fn token_from_config(content: &str) -> Option<String> {
    let mut in_auth = false;
    for line in content.lines().map(str::trim) {
        if line.starts_with('#') || line.starts_with(';') || line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            in_auth = line == "[authentication]";
            continue;
        }
        if !in_auth {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "authtoken" && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Converts a cell to the JSON value Synapse expects for `column_type`.
/// `DATE` cells accept epoch milliseconds, a bare year or `YYYY-MM-DD`.
pub fn coerce_cell(column_type: &str, cell: Option<&str>) -> Option<String> {
    let value = cell.map(str::trim).filter(|value| !value.is_empty())?;
    if column_type != "DATE" {
        return Some(value.to_string());
    }
    let date = if value.len() == 4 && value.chars().all(|ch| ch.is_ascii_digit()) {
        value
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
    } else if value.chars().all(|ch| ch.is_ascii_digit()) {
        return Some(value.to_string());
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
    };
    match date {
        Some(date) => Some(
            date.and_time(NaiveTime::MIN)
                .and_utc()
                .timestamp_millis()
                .to_string(),
        ),
        None => {
            tracing::warn!(value, "cell is not a date; leaving it empty");
            None
        }
    }
}

#[derive(Clone)]
pub struct SynapseHttpClient {
    client: Client,
    base_url: String,
    file_url: String,
}

#[derive(Debug, Deserialize)]
struct AsyncJobId {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildrenPage {
    #[serde(default)]
    page: Vec<ChildEntity>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnnotationsBody {
    #[serde(default)]
    annotations: Annotations,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamMemberPage {
    total_number_of_results: usize,
    #[serde(default)]
    results: Vec<TeamMemberEntry>,
}

#[derive(Debug, Deserialize)]
struct TeamMemberEntry {
    member: TeamMemberHeader,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamMemberHeader {
    owner_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultBundle {
    query_result: QueryResult,
    #[serde(default)]
    max_rows_per_page: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    query_results: RowSet,
    #[serde(default)]
    next_page_token: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowSet {
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    headers: Vec<SelectColumn>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct SelectColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableRow {
    row_id: Option<i64>,
    #[serde(default)]
    values: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct ColumnList {
    #[serde(default)]
    results: Vec<ColumnModel>,
}

#[derive(Debug, Deserialize)]
struct ColumnBatch {
    #[serde(default)]
    list: Vec<ColumnModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowReferenceSet {
    #[serde(default)]
    rows: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileHandleCopyResults {
    #[serde(default)]
    copy_results: Vec<FileHandleCopyResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileHandleCopyResult {
    new_file_handle: Option<FileHandleId>,
    failure_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileHandleId {
    id: String,
}

impl SynapseHttpClient {
    pub fn new(token: &str) -> Result<Self, SyndccError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("syndccutils/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyndccError::SynapseHttp(err.to_string()))?,
        );
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| SyndccError::MissingCredentials)?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SyndccError::SynapseHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: REPO_BASE.to_string(),
            file_url: FILE_BASE.to_string(),
        })
    }

    pub fn from_environment() -> Result<Self, SyndccError> {
        Self::new(&load_auth_token()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, SyndccError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && (err.is_timeout() || err.is_connect()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(SyndccError::SynapseHttp(err.to_string()));
                }
            }
        }
    }

    fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SyndccError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Synapse request failed".to_string());
            return Err(SyndccError::SynapseStatus { status, message });
        }
        response
            .json()
            .map_err(|err| SyndccError::SynapseHttp(err.to_string()))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyndccError> {
        let url = self.url(path);
        Self::read_json(self.send_with_retries(|| self.client.get(&url))?)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, SyndccError> {
        Self::read_json(self.send_with_retries(|| self.client.post(url).json(body))?)
    }

    fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SyndccError> {
        let url = self.url(path);
        Self::read_json(self.send_with_retries(|| self.client.put(&url).json(body))?)
    }

    /// Starts an asynchronous job and polls until it completes.
    fn run_job<T: DeserializeOwned>(
        &self,
        start_path: &str,
        get_path: &str,
        request: &Value,
    ) -> Result<T, SyndccError> {
        let job: AsyncJobId = self.post_json(&self.url(start_path), request)?;
        let url = self.url(&format!("{get_path}/{}", job.token));
        for attempt in 0..JOB_MAX_POLLS {
            let response = self.send_with_retries(|| self.client.get(&url))?;
            if response.status().as_u16() == 202 {
                tracing::debug!(token = %job.token, attempt, "table job still running");
                thread::sleep(JOB_POLL_DELAY);
                continue;
            }
            return Self::read_json(response);
        }
        Err(SyndccError::SynapseJobTimeout {
            token: job.token,
            attempts: JOB_MAX_POLLS,
        })
    }
}

impl SynapseClient for SynapseHttpClient {
    fn get_entity(&self, id: &SynapseId) -> Result<Value, SyndccError> {
        self.get_json(&format!("/entity/{id}"))
    }

    fn create_entity(&self, entity: &Value) -> Result<Value, SyndccError> {
        self.post_json(&self.url("/entity"), entity)
    }

    fn update_entity(&self, id: &SynapseId, entity: &Value) -> Result<Value, SyndccError> {
        self.put_json(&format!("/entity/{id}"), entity)
    }

    fn benefactor(&self, id: &SynapseId) -> Result<SynapseId, SyndccError> {
        let header: Value = self.get_json(&format!("/entity/{id}/benefactor"))?;
        header
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyndccError::SynapseHttp(format!("benefactor of {id} has no id")))?
            .parse()
    }

    fn get_acl(&self, id: &SynapseId) -> Result<AccessControlList, SyndccError> {
        self.get_json(&format!("/entity/{id}/acl"))
    }

    fn create_acl(&self, acl: &AccessControlList) -> Result<AccessControlList, SyndccError> {
        self.post_json(&self.url(&format!("/entity/{}/acl", acl.id)), acl)
    }

    fn update_acl(&self, acl: &AccessControlList) -> Result<AccessControlList, SyndccError> {
        self.put_json(&format!("/entity/{}/acl", acl.id), acl)
    }

    fn children(&self, parent: &SynapseId) -> Result<Vec<ChildEntity>, SyndccError> {
        let url = self.url("/entity/children");
        let mut children = Vec::new();
        let mut next_page_token: Option<String> = None;
        loop {
            let request = json!({
                "parentId": parent.as_str(),
                "includeTypes": ["folder", "file"],
                "nextPageToken": next_page_token,
            });
            let page: ChildrenPage = self.post_json(&url, &request)?;
            children.extend(page.page);
            match page.next_page_token {
                Some(token) => next_page_token = Some(token),
                None => break,
            }
        }
        Ok(children)
    }

    fn annotations(&self, id: &SynapseId) -> Result<Annotations, SyndccError> {
        let body: AnnotationsBody = self.get_json(&format!("/entity/{id}/annotations2"))?;
        Ok(body.annotations)
    }

    fn team_members(&self, team_id: u64) -> Result<Vec<u64>, SyndccError> {
        let mut members = Vec::new();
        let mut offset = 0usize;
        loop {
            let page: TeamMemberPage = self.get_json(&format!(
                "/teamMembers/{team_id}?limit={TEAM_PAGE_SIZE}&offset={offset}"
            ))?;
            let received = page.results.len();
            for entry in page.results {
                let owner = entry.member.owner_id.parse::<u64>().map_err(|_| {
                    SyndccError::SynapseHttp(format!("invalid member id {}", entry.member.owner_id))
                })?;
                members.push(owner);
            }
            offset += received;
            if received == 0 || offset >= page.total_number_of_results {
                break;
            }
        }
        Ok(members)
    }

    fn invite(&self, invitation: &MembershipInvitation) -> Result<Value, SyndccError> {
        self.post_json(&self.url("/membershipInvitation"), invitation)
    }

    fn query_table(&self, table: &SynapseId) -> Result<TableQueryResult, SyndccError> {
        let request = json!({
            "concreteType": "org.sagebionetworks.repo.model.table.QueryBundleRequest",
            "entityId": table.as_str(),
            "partMask": QUERY_PART_MASK,
            "query": {
                "sql": format!("SELECT * FROM {table}"),
            },
        });
        let bundle: QueryResultBundle = self.run_job(
            &format!("/entity/{table}/table/query/async/start"),
            &format!("/entity/{table}/table/query/async/get"),
            &request,
        )?;
        tracing::debug!(%table, max_rows_per_page = ?bundle.max_rows_per_page, "table query started");
        let result = collect_pages(bundle.query_result, |token| {
            self.run_job(
                &format!("/entity/{table}/table/query/nextPage/async/start"),
                &format!("/entity/{table}/table/query/nextPage/async/get"),
                token,
            )
        })?;
        tracing::debug!(%table, rows = result.frame.len(), "table query finished");
        Ok(result)
    }

    fn table_columns(&self, table: &SynapseId) -> Result<Vec<ColumnModel>, SyndccError> {
        let list: ColumnList = self.get_json(&format!("/entity/{table}/column"))?;
        Ok(list.results)
    }

    fn create_columns(&self, columns: &[ColumnModel]) -> Result<Vec<ColumnModel>, SyndccError> {
        let request = json!({
            "concreteType": "org.sagebionetworks.repo.model.ListWrapper",
            "list": columns,
        });
        let batch: ColumnBatch = self.post_json(&self.url("/column/batch"), &request)?;
        Ok(batch.list)
    }

    fn append_rows(&self, table: &SynapseId, frame: &Frame) -> Result<usize, SyndccError> {
        if frame.is_empty() {
            return Ok(0);
        }
        let columns = self.table_columns(table)?;
        let rows = table_rows(&columns, frame);
        let headers = columns
            .iter()
            .map(|column| json!({"id": column.id, "name": column.name, "columnType": column.column_type}))
            .collect::<Vec<_>>();
        let request = json!({
            "concreteType": "org.sagebionetworks.repo.model.table.TableUpdateTransactionRequest",
            "entityId": table.as_str(),
            "changes": [{
                "concreteType": "org.sagebionetworks.repo.model.table.AppendableRowSetRequest",
                "entityId": table.as_str(),
                "toAppend": {
                    "concreteType": "org.sagebionetworks.repo.model.table.RowSet",
                    "tableId": table.as_str(),
                    "headers": headers,
                    "rows": rows.iter().map(|values| json!({"values": values})).collect::<Vec<_>>(),
                },
            }],
        });
        let _: Value = self.run_job(
            &format!("/entity/{table}/table/transaction/async/start"),
            &format!("/entity/{table}/table/transaction/async/get"),
            &request,
        )?;
        tracing::info!(%table, rows = rows.len(), "rows appended");
        Ok(rows.len())
    }

    fn delete_rows(
        &self,
        table: &SynapseId,
        etag: Option<&str>,
        row_ids: &[i64],
    ) -> Result<usize, SyndccError> {
        if row_ids.is_empty() {
            return Ok(0);
        }
        let request = json!({
            "tableId": table.as_str(),
            "etag": etag,
            "rowIds": row_ids,
        });
        let deleted: RowReferenceSet =
            self.post_json(&self.url(&format!("/entity/{table}/table/deleteRows")), &request)?;
        Ok(deleted.rows.len())
    }

    fn copy_file_handle(
        &self,
        source: &SynapseId,
        file_handle_id: &str,
    ) -> Result<String, SyndccError> {
        let request = json!({
            "copyRequests": [{
                "originalFile": {
                    "fileHandleId": file_handle_id,
                    "associateObjectId": source.as_str(),
                    "associateObjectType": "FileEntity",
                },
            }],
        });
        let url = format!("{}/filehandles/copy", self.file_url);
        let results: FileHandleCopyResults = self.post_json(&url, &request)?;
        let result = results
            .copy_results
            .into_iter()
            .next()
            .ok_or_else(|| SyndccError::SynapseHttp(format!("no copy result for {source}")))?;
        match (result.new_file_handle, result.failure_code) {
            (Some(handle), _) => Ok(handle.id),
            (None, failure) => Err(SyndccError::SynapseHttp(format!(
                "file handle copy for {source} failed: {}",
                failure.unwrap_or_else(|| "unknown".to_string())
            ))),
        }
    }
}

/// Accumulates a query's first page and every page reached by following
/// `nextPageToken` through `next_page`.
fn collect_pages<F>(first: QueryResult, mut next_page: F) -> Result<TableQueryResult, SyndccError>
where
    F: FnMut(&Value) -> Result<QueryResult, SyndccError>,
{
    let mut result = TableQueryResult {
        frame: Frame::new(
            first
                .query_results
                .headers
                .iter()
                .map(|header| header.name.clone()),
        ),
        row_ids: Vec::new(),
        etag: first.query_results.etag.clone(),
    };
    let mut page = first;
    loop {
        for row in page.query_results.rows {
            if let Some(row_id) = row.row_id {
                result.row_ids.push(row_id);
            }
            result.frame.push_row(row.values)?;
        }
        let Some(token) = page.next_page_token else {
            break;
        };
        page = next_page(&token)?;
    }
    Ok(result)
}

/// Lays `frame` out in the table's column order. Frame columns unknown to
/// the table are dropped; table columns absent from the frame stay empty.
pub fn table_rows(columns: &[ColumnModel], frame: &Frame) -> Vec<Vec<Cell>> {
    for name in frame.columns() {
        if !columns.iter().any(|column| &column.name == name) {
            tracing::warn!(column = %name, "column not in table schema; dropped");
        }
    }
    frame
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| coerce_cell(&column.column_type, row.get(&column.name)))
                .collect()
        })
        .collect()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
