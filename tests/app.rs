use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};

use syndccutils::app::{
    App, InviteRequest, MeltRequest, PermitRequest, PubmedRequest, SummaryRequest,
    TemplateRequest,
};
use syndccutils::config::{Config, ConfigLoader};
use syndccutils::domain::{AccessType, Permission, PubmedId, SynapseId};
use syndccutils::entrez::EntrezClient;
use syndccutils::error::SyndccError;
use syndccutils::frame::{Cell, Frame};
use syndccutils::output::JsonOutput;
use syndccutils::scrape::PageFetcher;
use syndccutils::store;
use syndccutils::synapse::{
    AccessControlList, AnnotationValue, Annotations, ChildEntity, ColumnModel,
    MembershipInvitation, ResourceAccess, SynapseClient, TableQueryResult, FILE_TYPE, FOLDER_TYPE,
};

#[derive(Default)]
struct State {
    next_id: u64,
    entities: BTreeMap<String, Value>,
    acls: BTreeMap<String, AccessControlList>,
    benefactors: BTreeMap<String, String>,
    children: BTreeMap<String, Vec<ChildEntity>>,
    annotations: BTreeMap<String, Annotations>,
    teams: BTreeMap<u64, Vec<u64>>,
    tables: BTreeMap<String, TableQueryResult>,
    appended: Vec<(String, Frame)>,
    deleted: Vec<(String, Vec<i64>)>,
    invitations: Vec<MembershipInvitation>,
    copied_handles: Vec<String>,
}

#[derive(Default)]
struct MockSynapse {
    state: Mutex<State>,
}

impl MockSynapse {
    fn with_table(self, id: &str, frame: Frame) -> Self {
        let row_ids = (1..=frame.len() as i64).collect();
        self.state.lock().unwrap().tables.insert(
            id.to_string(),
            TableQueryResult {
                frame,
                row_ids,
                etag: Some("etag-1".to_string()),
            },
        );
        self
    }

    fn with_entity(self, id: &str, entity: Value) -> Self {
        self.state.lock().unwrap().entities.insert(id.to_string(), entity);
        self
    }

    fn with_child(self, parent: &str, id: &str, name: &str, kind: &str, created_on: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .children
            .entry(parent.to_string())
            .or_default()
            .push(ChildEntity {
                id: id.parse().unwrap(),
                name: name.to_string(),
                entity_type: kind.to_string(),
                created_on: Some(created_on.to_string()),
            });
        self
    }

    fn with_acl(self, id: &str, grants: &[(u64, AccessType)]) -> Self {
        let acl = AccessControlList {
            id: id.to_string(),
            etag: None,
            resource_access: grants
                .iter()
                .map(|(principal, access)| ResourceAccess {
                    principal_id: *principal,
                    access_type: vec![*access],
                })
                .collect(),
        };
        self.state.lock().unwrap().acls.insert(id.to_string(), acl);
        self
    }

    fn with_benefactor(self, id: &str, benefactor: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .benefactors
            .insert(id.to_string(), benefactor.to_string());
        self
    }

    fn with_team(self, team: u64, members: &[u64]) -> Self {
        self.state.lock().unwrap().teams.insert(team, members.to_vec());
        self
    }

    fn with_study(self, file: &str, study: &str) -> Self {
        let annotations = Annotations::from([(
            "study".to_string(),
            AnnotationValue {
                value_type: "STRING".to_string(),
                value: vec![study.to_string()],
            },
        )]);
        self.state
            .lock()
            .unwrap()
            .annotations
            .insert(file.to_string(), annotations);
        self
    }
}

fn not_found(what: &str) -> SyndccError {
    SyndccError::SynapseStatus {
        status: 404,
        message: format!("{what} not found"),
    }
}

impl SynapseClient for MockSynapse {
    fn get_entity(&self, id: &SynapseId) -> Result<Value, SyndccError> {
        let state = self.state.lock().unwrap();
        state
            .entities
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| not_found(id.as_str()))
    }

    fn create_entity(&self, entity: &Value) -> Result<Value, SyndccError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("syn{}", 9000 + state.next_id);
        let mut stored = entity.clone();
        stored["id"] = json!(id);
        let kind = entity["concreteType"].as_str().unwrap_or_default().to_string();
        match entity.get("parentId").and_then(Value::as_str) {
            Some(parent) => {
                let benefactor = state
                    .benefactors
                    .get(parent)
                    .cloned()
                    .unwrap_or_else(|| parent.to_string());
                state.benefactors.insert(id.clone(), benefactor);
                state.children.entry(parent.to_string()).or_default().push(ChildEntity {
                    id: id.parse().unwrap(),
                    name: entity["name"].as_str().unwrap_or_default().to_string(),
                    entity_type: kind,
                    created_on: Some("2018-01-01T00:00:00.000Z".to_string()),
                });
            }
            None => {
                state.acls.insert(
                    id.clone(),
                    AccessControlList {
                        id: id.clone(),
                        etag: None,
                        resource_access: Vec::new(),
                    },
                );
            }
        }
        state.entities.insert(id, stored.clone());
        Ok(stored)
    }

    fn update_entity(&self, id: &SynapseId, entity: &Value) -> Result<Value, SyndccError> {
        let mut state = self.state.lock().unwrap();
        state.entities.insert(id.to_string(), entity.clone());
        Ok(entity.clone())
    }

    fn benefactor(&self, id: &SynapseId) -> Result<SynapseId, SyndccError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .benefactors
            .get(id.as_str())
            .map(|benefactor| benefactor.parse().unwrap())
            .unwrap_or_else(|| id.clone()))
    }

    fn get_acl(&self, id: &SynapseId) -> Result<AccessControlList, SyndccError> {
        let state = self.state.lock().unwrap();
        state
            .acls
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| not_found(id.as_str()))
    }

    fn create_acl(&self, acl: &AccessControlList) -> Result<AccessControlList, SyndccError> {
        let mut state = self.state.lock().unwrap();
        state.benefactors.remove(&acl.id);
        state.acls.insert(acl.id.clone(), acl.clone());
        Ok(acl.clone())
    }

    fn update_acl(&self, acl: &AccessControlList) -> Result<AccessControlList, SyndccError> {
        let mut state = self.state.lock().unwrap();
        state.acls.insert(acl.id.clone(), acl.clone());
        Ok(acl.clone())
    }

    fn children(&self, parent: &SynapseId) -> Result<Vec<ChildEntity>, SyndccError> {
        let state = self.state.lock().unwrap();
        Ok(state.children.get(parent.as_str()).cloned().unwrap_or_default())
    }

    fn annotations(&self, id: &SynapseId) -> Result<Annotations, SyndccError> {
        let state = self.state.lock().unwrap();
        Ok(state.annotations.get(id.as_str()).cloned().unwrap_or_default())
    }

    fn team_members(&self, team_id: u64) -> Result<Vec<u64>, SyndccError> {
        let state = self.state.lock().unwrap();
        state
            .teams
            .get(&team_id)
            .cloned()
            .ok_or_else(|| not_found(&team_id.to_string()))
    }

    fn invite(&self, invitation: &MembershipInvitation) -> Result<Value, SyndccError> {
        self.state
            .lock()
            .unwrap()
            .invitations
            .push(invitation.clone());
        Ok(json!({"id": "1"}))
    }

    fn query_table(&self, table: &SynapseId) -> Result<TableQueryResult, SyndccError> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table.as_str())
            .cloned()
            .ok_or_else(|| not_found(table.as_str()))
    }

    fn table_columns(&self, _table: &SynapseId) -> Result<Vec<ColumnModel>, SyndccError> {
        Ok(Vec::new())
    }

    fn create_columns(&self, columns: &[ColumnModel]) -> Result<Vec<ColumnModel>, SyndccError> {
        Ok(columns
            .iter()
            .enumerate()
            .map(|(index, column)| ColumnModel {
                id: Some(format!("{}", 100 + index)),
                ..column.clone()
            })
            .collect())
    }

    fn append_rows(&self, table: &SynapseId, frame: &Frame) -> Result<usize, SyndccError> {
        self.state
            .lock()
            .unwrap()
            .appended
            .push((table.to_string(), frame.clone()));
        Ok(frame.len())
    }

    fn delete_rows(
        &self,
        table: &SynapseId,
        _etag: Option<&str>,
        row_ids: &[i64],
    ) -> Result<usize, SyndccError> {
        self.state
            .lock()
            .unwrap()
            .deleted
            .push((table.to_string(), row_ids.to_vec()));
        Ok(row_ids.len())
    }

    fn copy_file_handle(
        &self,
        _source: &SynapseId,
        file_handle_id: &str,
    ) -> Result<String, SyndccError> {
        self.state
            .lock()
            .unwrap()
            .copied_handles
            .push(file_handle_id.to_string());
        Ok(format!("copy-{file_handle_id}"))
    }
}

#[derive(Default)]
struct MockEntrez {
    ids: Vec<&'static str>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl EntrezClient for MockEntrez {
    fn search_pubmed(&self, query: &str) -> Result<Vec<PubmedId>, SyndccError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.ids.iter().map(|id| id.parse().unwrap()).collect())
    }
}

#[derive(Default)]
struct MockPages {
    pages: BTreeMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl PageFetcher for MockPages {
    fn fetch(&self, url: &str) -> Result<String, SyndccError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| SyndccError::PageStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

fn cells(values: &[&str]) -> Vec<Cell> {
    values
        .iter()
        .map(|value| (!value.is_empty()).then(|| value.to_string()))
        .collect()
}

fn frame(columns: &[&str], rows: &[&[&str]]) -> Frame {
    Frame::from_rows(
        columns.iter().copied(),
        rows.iter().map(|row| cells(row)).collect(),
    )
    .unwrap()
}

fn app(
    synapse: MockSynapse,
    entrez: MockEntrez,
    pages: MockPages,
) -> App<MockSynapse, MockEntrez, MockPages> {
    let config = ConfigLoader::resolve_config(Config::default()).unwrap();
    App::new(config, synapse, entrez, pages)
}

fn abstract_page(citation_tail: &str, grants: &[&str]) -> String {
    let grant_links = grants
        .iter()
        .map(|grant| format!(r##"<a abstractlink="yes" alsec="grnt" href="#">{grant}</a>"##))
        .collect::<String>();
    format!(
        r#"<html><body>
        <div class="rprt abstract">
          <div class="cit"><a href="/journal">Nature.</a>{citation_tail}</div>
          <h1>Tumor évolution in models.</h1>
          <div class="auths"><a href="/a">Smith J</a>, <a href="/b">Müller K</a></div>
        </div>
        <div class="rprt_all">{grant_links}</div>
        </body></html>"#
    )
}

const GEO_PAGE: &str = r#"<html><body>
    <div class="rprt"><div class="rprtid"><dl><dt>Accession:</dt><dd> GSE98765 </dd></dl></div></div>
    <div class="rprt"><div class="rprtid"><dl><dt>Accession:</dt><dd>GPL570</dd></dl></div></div>
    </body></html>"#;

fn project_view() -> Frame {
    frame(
        &["id", "grantNumber", "grantType", "consortium", "institution"],
        &[
            &["syn100", "CA209997", "U54", "CSBC", "Stanford"],
            &["syn200", "CA217376", "U01", "PSON", "MIT"],
            &["syn300", "", "", "CSBC", "Sage Bionetworks"],
        ],
    )
}

fn pubmed_fixture() -> (MockSynapse, MockEntrez, MockPages) {
    let synapse = MockSynapse::default()
        .with_entity("syn1", json!({"id": "syn1", "name": "Reporting"}))
        .with_table("syn10142562", project_view());
    let entrez = MockEntrez {
        ids: vec!["111", "222"],
        ..MockEntrez::default()
    };
    let pages = MockPages {
        pages: BTreeMap::from([
            (
                "https://www.ncbi.nlm.nih.gov/pubmed/?term=111".to_string(),
                abstract_page(
                    " 2017 Jan 15;10(2):123-30.",
                    &[
                        "U54CA209997/CA/NCI NIH HHS/United States",
                        "R01 CA180778/CA/NCI NIH HHS/United States",
                    ],
                ),
            ),
            (
                "https://www.ncbi.nlm.nih.gov/gds?LinkName=pubmed_gds&from_uid=111".to_string(),
                GEO_PAGE.to_string(),
            ),
            (
                "https://www.ncbi.nlm.nih.gov/pubmed/?term=222".to_string(),
                abstract_page(" Epub ahead of print", &[]),
            ),
        ]),
        ..MockPages::default()
    };
    (synapse, entrez, pages)
}

#[test]
fn pubmed_creates_table_with_reconciled_records() {
    let (synapse, entrez, pages) = pubmed_fixture();
    let app = app(synapse, entrez, pages);

    let result = app
        .pubmed(
            PubmedRequest {
                project_id: "syn1".parse().unwrap(),
                grant_view: None,
                table_name: Some("CSBC publications".to_string()),
                table_id: None,
                consortium: "csbc".to_string(),
                output: None,
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.grant_count, 2);
    assert_eq!(result.search_count, 2);
    assert_eq!(result.record_count, 1);
    assert_eq!(result.skipped, vec!["222".parse::<PubmedId>().unwrap()]);
    assert_eq!(result.rows_appended, 1);
    assert!(result.output_path.is_none());

    let state = app_state(&app);
    let (table, appended) = &state.appended[0];
    assert_eq!(Some(table.as_str()), result.table_id.as_ref().map(SynapseId::as_str));
    let row = appended.iter().next().unwrap();
    assert_eq!(row.get("CSBC PSON Center"), Some("syn100"));
    assert_eq!(row.get("Consortium"), Some("CSBC"));
    assert_eq!(
        row.get("PubMed"),
        Some("https://www.ncbi.nlm.nih.gov/pubmed/?term=111")
    );
    assert_eq!(row.get("Journal"), Some("Nature"));
    assert_eq!(row.get("Publication Year"), Some("2017"));
    assert_eq!(row.get("Title"), Some("Tumor volution in models"));
    assert_eq!(row.get("Authors"), Some("Smith J, Mller K"));
    assert_eq!(row.get("Grant"), Some("U54 CA209997"));
    assert_eq!(
        row.get("Data Location"),
        Some("https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=GSE98765")
    );
    assert_eq!(row.get("Synapse Location"), None);

    let created = state
        .entities
        .values()
        .find(|entity| entity["name"] == "CSBC publications")
        .unwrap();
    assert_eq!(created["parentId"], "syn1");
    assert_eq!(created["columnIds"].as_array().unwrap().len(), 11);
}

#[test]
fn pubmed_writes_csv_and_queries_every_grant() {
    let (synapse, entrez, pages) = pubmed_fixture();
    let queries = Arc::clone(&entrez.queries);
    let app = app(synapse, entrez, pages);
    let dir = tempfile::tempdir().unwrap();
    let output = Utf8PathBuf::from_path_buf(dir.path().join("pubs.csv")).unwrap();

    let result = app
        .pubmed(
            PubmedRequest {
                project_id: "syn1".parse().unwrap(),
                grant_view: None,
                table_name: None,
                table_id: None,
                consortium: "pson".to_string(),
                output: Some(output.clone()),
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(*queries.lock().unwrap(), vec!["CA209997 OR CA217376"]);
    assert_eq!(result.output_path.as_deref(), Some(output.as_str()));
    let written = store::read_frame(&output).unwrap();
    assert_eq!(written.columns()[0], "Consortium Center");
    assert_eq!(written.len(), 1);
}

#[test]
fn pubmed_appends_only_new_publications() {
    let (synapse, entrez, pages) = pubmed_fixture();
    let existing = frame(
        &["CSBC PSON Center", "PubMed"],
        &[&["syn100", "https://www.ncbi.nlm.nih.gov/pubmed/?term=111"]],
    );
    let app = app(synapse.with_table("syn555", existing), entrez, pages);

    let result = app
        .pubmed(
            PubmedRequest {
                project_id: "syn1".parse().unwrap(),
                grant_view: None,
                table_name: None,
                table_id: Some("syn555".parse().unwrap()),
                consortium: "csbc".to_string(),
                output: None,
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.scraped_count, 1);
    assert_eq!(result.record_count, 0);
    assert_eq!(result.rows_appended, 0);
}

#[test]
fn pubmed_missing_page_aborts() {
    let (synapse, entrez, mut pages) = pubmed_fixture();
    pages
        .pages
        .remove("https://www.ncbi.nlm.nih.gov/gds?LinkName=pubmed_gds&from_uid=111");
    let app = app(synapse, entrez, pages);

    let err = app
        .pubmed(
            PubmedRequest {
                project_id: "syn1".parse().unwrap(),
                grant_view: None,
                table_name: Some("pubs".to_string()),
                table_id: None,
                consortium: "csbc".to_string(),
                output: None,
            },
            &JsonOutput,
        )
        .unwrap_err();
    assert_matches!(err, SyndccError::PageStatus { status: 404, .. });
}

#[test]
fn template_creates_grants_copies_and_registers() {
    let synapse = MockSynapse::default()
        .with_entity(
            "syn10142562",
            json!({"id": "syn10142562", "scopeIds": ["100"]}),
        )
        .with_entity(
            "syn902",
            json!({"id": "syn902", "name": "protocol.pdf", "dataFileHandleId": "55"}),
        )
        .with_child("syn11801564", "syn901", "Data", FOLDER_TYPE, "2017-01-01T00:00:00.000Z")
        .with_child("syn901", "syn902", "protocol.pdf", FILE_TYPE, "2017-01-01T00:00:00.000Z");
    let app = app(synapse, MockEntrez::default(), MockPages::default());

    let result = app
        .template(
            TemplateRequest {
                consortium_id: "U54".to_string(),
                project_name: "Stanford CSBC".to_string(),
                team_id: Some(3350000),
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.template_id.as_str(), "syn11801564");
    assert_eq!(result.folders_copied, 1);
    assert_eq!(result.files_copied, 1);
    assert!(result.view_scope_updated);

    let state = app_state(&app);
    let acl = &state.acls[result.project_id.as_str()];
    let access = |principal: u64| {
        acl.resource_access
            .iter()
            .find(|entry| entry.principal_id == principal)
            .map(|entry| entry.access_type.clone())
            .unwrap()
    };
    assert_eq!(access(273948), vec![AccessType::Read]);
    assert_eq!(access(273949), vec![AccessType::Read]);
    assert_eq!(access(3350000), AccessType::team_member());
    assert_eq!(access(3346139), AccessType::admin());
    assert_eq!(state.copied_handles, vec!["55"]);

    let scope = state.entities["syn10142562"]["scopeIds"].as_array().unwrap().clone();
    assert_eq!(scope.len(), 2);
    assert_eq!(scope[1], json!(result.project_id.numeric()));
}

#[test]
fn template_rejects_unknown_consortium() {
    let app = app(MockSynapse::default(), MockEntrez::default(), MockPages::default());
    let err = app
        .template(
            TemplateRequest {
                consortium_id: "R01".to_string(),
                project_name: "x".to_string(),
                team_id: None,
            },
            &JsonOutput,
        )
        .unwrap_err();
    assert_matches!(err, SyndccError::UnknownConsortium(_));
}

#[test]
fn permit_copies_inherited_acl_and_adds_sponsors() {
    let synapse = MockSynapse::default()
        .with_acl("syn400", &[(1, AccessType::Read)])
        .with_benefactor("syn500", "syn400");
    let app = app(synapse, MockEntrez::default(), MockPages::default());

    let result = app
        .permit(
            PermitRequest {
                entity: "syn500".parse().unwrap(),
                permission: Permission::Edit,
                teams: vec![10],
                sponsor_teams: true,
                sponsors: Vec::new(),
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.principals, vec![10, 3346396, 3346986, 3346987]);
    let state = app_state(&app);
    let acl = &state.acls["syn500"];
    assert_eq!(acl.principals(), vec![1, 10, 3346396, 3346986, 3346987]);
    assert_eq!(acl.resource_access[1].access_type.len(), 5);
    assert_eq!(state.acls["syn400"].principals(), vec![1]);
}

#[test]
fn permit_explicit_sponsors_replace_sponsor_teams() {
    let synapse = MockSynapse::default().with_acl("syn400", &[]);
    let app = app(synapse, MockEntrez::default(), MockPages::default());
    let result = app
        .permit(
            PermitRequest {
                entity: "syn400".parse().unwrap(),
                permission: Permission::Read,
                teams: vec![10],
                sponsor_teams: true,
                sponsors: vec![77],
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(result.principals, vec![10, 77]);
    assert_eq!(result.access_type, vec![AccessType::Read]);
}

#[test]
fn invite_members_uses_consortium_columns() {
    let members = frame(
        &["CSBC members", "PSON members", "notes"],
        &[
            &["a@b.org", "c@d.org", "x@y.org"],
            &["3334658.0", "", ""],
            &["", "", "9"],
        ],
    );
    let app = app(
        MockSynapse::default().with_table("syn700", members),
        MockEntrez::default(),
        MockPages::default(),
    );

    let result = app
        .invite_members(
            InviteRequest {
                table_id: "syn700".parse().unwrap(),
                team_id: 3346987,
                consortium: "CSBC".to_string(),
                message: Some("welcome".to_string()),
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.columns, vec!["CSBC members"]);
    assert_eq!(result.invited, vec!["a@b.org", "3334658.0"]);
    let state = app_state(&app);
    assert_eq!(state.invitations.len(), 2);
    assert_eq!(state.invitations[1].invitee_id.as_deref(), Some("3334658"));
    assert_eq!(state.invitations[1].message.as_deref(), Some("welcome"));
}

#[test]
fn invite_members_joint_consortium_matches_name_as_given() {
    let members = frame(
        &["csbc pson members", "CSBC members"],
        &[&["joint@b.org", "csbc@b.org"]],
    );
    let app = app(
        MockSynapse::default().with_table("syn700", members),
        MockEntrez::default(),
        MockPages::default(),
    );

    let result = app
        .invite_members(
            InviteRequest {
                table_id: "syn700".parse().unwrap(),
                team_id: 1,
                consortium: "csbc pson".to_string(),
                message: None,
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.columns, vec!["csbc pson members"]);
    assert_eq!(result.invited, vec!["joint@b.org"]);
}

#[test]
fn invite_members_reports_empty_list() {
    let members = frame(&["notes"], &[&["a@b.org"]]);
    let app = app(
        MockSynapse::default().with_table("syn700", members),
        MockEntrez::default(),
        MockPages::default(),
    );
    let result = app
        .invite_members(
            InviteRequest {
                table_id: "syn700".parse().unwrap(),
                team_id: 1,
                consortium: "pson".to_string(),
                message: None,
            },
            &JsonOutput,
        )
        .unwrap();
    assert!(result.invited.is_empty());
    assert!(app_state(&app).invitations.is_empty());
}

#[test]
fn summary_walks_folders_and_counts() {
    let publications = frame(
        &["CSBC PSON Center", "Data Location"],
        &[&["syn100", "https://a , https://b"], &["syn100", ""], &["syn200", "https://c"]],
    );
    let synapse = MockSynapse::default()
        .with_table("syn10142562", project_view())
        .with_table("syn10923842", publications)
        .with_acl("syn100", &[(273948, AccessType::Read), (777, AccessType::Update), (888, AccessType::Read)])
        .with_acl("syn200", &[])
        .with_team(777, &[3346139, 42, 43])
        .with_child("syn100", "syn110", "Data", FOLDER_TYPE, "2016-01-01T00:00:00.000Z")
        .with_child("syn100", "syn120", "Reporting", FOLDER_TYPE, "2016-01-01T00:00:00.000Z")
        .with_child("syn100", "syn130", "readme.txt", FILE_TYPE, "2016-01-01T00:00:00.000Z")
        .with_child("syn110", "syn111", "Raw", FOLDER_TYPE, "2016-01-01T00:00:00.000Z")
        .with_child("syn110", "syn112", "a.bam", FILE_TYPE, "2017-01-01T00:00:00.000Z")
        .with_child("syn110", "syn113", "placeholder.txt", FILE_TYPE, "2016-01-01T00:00:00.000Z")
        .with_child("syn110", "syn114", "late.bam", FILE_TYPE, "2018-01-01T00:00:00.000Z")
        .with_child("syn111", "syn115", "b.bam", FILE_TYPE, "2016-06-01T00:00:00.000Z")
        .with_child("syn120", "syn121", "report.csv", FILE_TYPE, "2016-06-01T00:00:00.000Z")
        .with_study("syn112", "A")
        .with_study("syn115", "B");
    let app = app(synapse, MockEntrez::default(), MockPages::default());
    let dir = tempfile::tempdir().unwrap();
    let output = Utf8PathBuf::from_path_buf(dir.path().join("summary.csv")).unwrap();

    let result = app
        .summary(
            SummaryRequest {
                output: Some(output.clone()),
                created_before: None,
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.row_count, 1);
    let report = store::read_frame(&output).unwrap();
    let row = report.iter().next().unwrap();
    assert_eq!(row.get("folder"), Some("Data"));
    assert_eq!(row.get("file_count"), Some("2"));
    assert_eq!(row.get("file_annotations_count"), Some("2"));
    assert_eq!(row.get("annot_files"), Some("A, B"));
    assert_eq!(row.get("annot_files_count"), Some("2"));
    assert_eq!(row.get("annot_files_per_study_count"), Some("1, 1"));
    assert_eq!(row.get("project_ids"), Some("syn100"));
    assert_eq!(row.get("team_profileId"), Some("777"));
    assert_eq!(row.get("team_members_profileId"), Some("42, 43"));
    assert_eq!(row.get("team_members_count"), Some("2"));
    assert_eq!(row.get("pubmed_publication"), Some("2"));
    assert_eq!(row.get("geodata_produced_count"), Some("2"));
}

#[test]
fn meltinfo_replaces_table_rows() {
    let publications = frame(
        &["CSBC PSON Center", "PubMed", "Data Location"],
        &[&["syn100", "https://www.ncbi.nlm.nih.gov/pubmed/?term=1", ""]],
    );
    let projects = frame(
        &["id", "name", "institution", "consortium", "grantNumber", "grantType", "teamMembersProfileId", "teamProfileId", "createdOn", "modifiedOn"],
        &[&["syn100", "Alpha", "Stanford", "CSBC", "CA209997", "U54", "", "3350000.0", "1496275200000", "1496275200000"]],
    );
    let files = frame(
        &["id", "name", "projectId", "assay"],
        &[&["syn3", "a.bam", "syn100", "rnaSeq"]],
    );
    let tools = frame(&["id", "name", "projectId", "softwareType"], &[]);
    let synapse = MockSynapse::default()
        .with_table("syn10923842", publications)
        .with_table("syn10142562", projects)
        .with_table("syn9630847", files)
        .with_table("syn9898965", tools)
        .with_table("syn800", frame(&["projectId"], &[&["old"], &["older"]]));
    let app = app(synapse, MockEntrez::default(), MockPages::default());

    let result = app
        .meltinfo(
            MeltRequest {
                consortium: "csbc".to_string(),
                table_id: Some("syn800".parse().unwrap()),
                project_publication_attributes: Vec::new(),
                project_attributes: Vec::new(),
                file_attributes: Vec::new(),
                views: Vec::new(),
                output: None,
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.rows_deleted, 2);
    assert_eq!(result.row_count, 1);
    let state = app_state(&app);
    assert_eq!(state.deleted, vec![("syn800".to_string(), vec![1, 2])]);
    let (_, table) = &state.appended[0];
    let row = table.iter().next().unwrap();
    assert_eq!(row.get("publication_count"), Some("1"));
    assert_eq!(row.get("teamProfileId"), Some("3350000"));
    assert_eq!(row.get("fileId"), Some("syn3"));
}

#[test]
fn meltinfo_custom_consortium_needs_four_views() {
    let app = app(MockSynapse::default(), MockEntrez::default(), MockPages::default());
    let err = app
        .meltinfo(
            MeltRequest {
                consortium: "htan".to_string(),
                table_id: None,
                project_publication_attributes: vec!["projectId".to_string()],
                project_attributes: vec!["projectId".to_string()],
                file_attributes: vec!["projectId".to_string()],
                views: vec!["syn1".parse().unwrap(), "syn2".parse().unwrap()],
                output: None,
            },
            &JsonOutput,
        )
        .unwrap_err();
    assert_matches!(err, SyndccError::InvalidArgument(_));
}

fn app_state(
    app: &App<MockSynapse, MockEntrez, MockPages>,
) -> std::sync::MutexGuard<'_, State> {
    app.synapse().state.lock().unwrap()
}
