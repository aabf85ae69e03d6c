use std::fs;

use assert_matches::assert_matches;

use syndccutils::config::{Config, ConfigLoader};
use syndccutils::error::SyndccError;

#[test]
fn file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syndccutils.json");
    fs::write(
        &path,
        r#"{
            "project_view": "syn1",
            "templates": {"U24": "syn2"},
            "sponsor_teams": [7],
            "report_views": {"tools": "syn3"}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.project_view.as_str(), "syn1");
    assert_eq!(resolved.template_for("U24").unwrap().as_str(), "syn2");
    assert!(resolved.template_for("U54").is_err());
    assert_eq!(resolved.sponsor_teams, vec![7]);
    assert_eq!(resolved.report_views.projects.as_str(), "syn1");
    assert_eq!(resolved.report_views.tools.as_str(), "syn3");
    assert_eq!(resolved.admin_team, 3346139);
}

#[test]
fn defaults_cover_csbc_layout() {
    let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
    let views = resolved
        .report_views
        .as_vec()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    assert_eq!(views, vec!["syn10923842", "syn10142562", "syn9630847", "syn9898965"]);
    assert_eq!(resolved.template_for(" U01 ").unwrap().as_str(), "syn11801693");
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, SyndccError::ConfigParse(_));
}

#[test]
fn missing_explicit_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, SyndccError::ConfigRead(_));
}

#[test]
fn invalid_view_id_is_rejected() {
    let config = Config {
        publication_view: Some("10923842".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(SyndccError::InvalidSynapseId(_))
    );
}
