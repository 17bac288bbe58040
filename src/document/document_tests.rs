use super::*;

pub(crate) const JITSI: &str = r#"# component constructor for jitsi
components:
  - name: opendesk.example.com/jitsi
    version: 1.0.0
    provider:
      name: example
    resources:
      - name: helm-chart-opendesk-jitsi
        type: helmChart
        version: 2.1.0
        access:
          type: ociArtifact
          imageReference: registry.example.com/charts/opendesk-jitsi:2.1.0

      # sidecar chart
      - name: helm-chart-jitsi-keycloak-adapter
        type: helmChart
        version: "1.0"
    sources: []
"#;

#[test]
fn parses_entries_and_renders_identically() {
    let document = Document::parse(JITSI).expect("parse");
    assert_eq!(document.render(), JITSI);
    assert_eq!(document.item_indent(), 6);
    let entries = document.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "helm-chart-opendesk-jitsi");
    assert!(entries[0].is_helm_chart());
    assert_eq!(entries[0].version.as_deref(), Some("2.1.0"));
    assert_eq!(
        entries[0].access_reference.as_deref(),
        Some("registry.example.com/charts/opendesk-jitsi:2.1.0")
    );
    assert_eq!(entries[1].version.as_deref(), Some("1.0"));
}

#[test]
fn separators_between_entries_stay_outside_entry_spans() {
    let document = Document::parse(JITSI).expect("parse");
    let Node::Entry(first) = &document.nodes()[1] else {
        panic!("expected entry node, got {:?}", document.nodes()[1]);
    };
    assert!(first.text.ends_with("opendesk-jitsi:2.1.0\n"));
    assert_eq!(document.nodes()[2].text(), "\n      # sidecar chart\n");
}

#[test]
fn last_entry_without_trailing_newline_round_trips() {
    let text = "components:\n- name: x\n  resources:\n  - name: chart\n    type: helmChart";
    let document = Document::parse(text).expect("parse");
    assert_eq!(document.render(), text);
    assert_eq!(document.item_indent(), 2);
    assert_eq!(document.entries().len(), 1);
}

#[test]
fn empty_resource_list_has_no_entries() {
    let text = "components:\n  - name: x\n    resources: []\n";
    let document = Document::parse(text).expect("parse");
    assert!(document.entries().is_empty());
    assert_eq!(document.render(), text);
}

#[test]
fn flow_style_resources_are_rejected() {
    let text = "components:\n  - name: x\n    resources: [{name: chart, type: helmChart}]\n";
    let issue = Document::parse(text).expect_err("flow style");
    assert_eq!(issue.kind, DocumentIssueKind::DocumentParseFailure);
}

#[test]
fn invalid_or_incomplete_documents_are_rejected() {
    for text in [
        "components: [\n",
        "components:\n  - name: x\n",
        "name: not-a-constructor\n",
        "components:\n  - resources:\n      - type: helmChart\n",
    ] {
        let issue = Document::parse(text).expect_err(text);
        assert_eq!(issue.kind, DocumentIssueKind::DocumentParseFailure, "{text}");
    }
}

#[test]
fn unquoted_versions_keep_their_spelling() {
    let text = "components:\n  - name: x\n    resources:\n      - name: image-x-nginx\n        type: ociImage\n        version: 1.10\n        access:\n          type: ociArtifact\n          imageReference: r.io/nginx:1.10\n      - name: image-x-pg\n        type: ociImage\n        version: 16.10\n";
    let document = Document::parse(text).expect("parse");
    let entries = document.entries();
    assert_eq!(entries[0].version.as_deref(), Some("1.10"));
    assert_eq!(entries[0].access_reference.as_deref(), Some("r.io/nginx:1.10"));
    assert_eq!(entries[1].version.as_deref(), Some("16.10"));
    assert_eq!(document.render(), text);
}

#[test]
fn nested_values_in_entry_fields_are_rejected() {
    for (text, reason) in [
        (
            "components:\n  - name: x\n    resources:\n      - name: a\n        version: {major: 1}\n",
            "version is not a scalar",
        ),
        (
            "components:\n  - name: x\n    resources:\n      - name: a\n        access: oci\n",
            "access has no scalar imageReference",
        ),
    ] {
        let issue = Document::parse(text).expect_err(text);
        assert!(issue.message.contains(reason), "{issue:?}");
    }
}
