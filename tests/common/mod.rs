//! Shared fixtures for the CLI integration tests.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

pub const DOCUMENT: &str = "component-constructor.yaml";

pub const JITSI: &str = r#"# component constructor for jitsi
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

      # keycloak adapter
      - name: helm-chart-jitsi-keycloak-adapter
        type: helmChart
        version: "1.0"
"#;

pub const ELEMENT: &str = r#"components:
  - name: opendesk.example.com/element
    version: 1.0.0
    resources:
      - name: helm-chart-opendesk-element
        type: helmChart
        version: 4.0.0
      - name: helm-chart-opendesk-synapse
        type: helmChart
        version: 4.0.0
"#;

pub const SERVICES: &str = r#"components:
- name: opendesk.example.com/services-external
  version: 1.0.0
  resources:
  - name: helm-chart-redis
    type: helmChart
    version: 18.1.2
"#;

pub const XWIKI: &str = r#"components:
  - name: opendesk.example.com/xwiki
    version: 1.0.0
    resources:
      - name: helm-chart-xwiki
        type: helmChart
        version: 1.3.0
"#;

/// Scan with three matchable images and one that belongs to no component.
pub fn scan(jibri_tag: &str) -> String {
    format!(
        r#"images:
  - resourceName: jitsi-jibri
    namespace: opendesk
    resourceType: Deployment
    containerName: jibri
    helmChart: opendesk-jitsi-2.1.0
    appInstance: jitsi
    ociUrl: registry.example.com/images/jibri
    ociVersion: {jibri_tag}
    ociPin: sha256:aaa
  - resourceName: synapse
    namespace: opendesk
    resourceType: StatefulSet
    containerName: synapse
    helmChart: opendesk-synapse
    appInstance: synapse
    ociUrl: registry.example.com/images/synapse
    ociVersion: v1.98.0
  - resourceName: redis-master
    namespace: opendesk
    resourceType: StatefulSet
    containerName: redis
    helmChart: redis-18.1.2
    appInstance: redis
    ociUrl: registry.example.com/bitnami/redis
    ociVersion: 7.2.4
  - resourceName: cert-manager-webhook
    namespace: cert-manager
    resourceType: Deployment
    containerName: cert-manager-webhook
    helmChart: cert-manager-webhook
    appInstance: cert-manager
    ociUrl: quay.io/jetstack/cert-manager-webhook
    ociVersion: v1.14.2
"#
    )
}

/// A temp directory laid out as `apps/<app>/component-constructor.yaml`
/// plus a scan file.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let workspace = Self { dir };
        for (app, text) in [
            ("jitsi", JITSI),
            ("element", ELEMENT),
            ("services-external", SERVICES),
            ("xwiki", XWIKI),
        ] {
            workspace.write_document(app, text);
        }
        workspace.write_scan(&scan("stable-9955"));
        workspace
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.dir.path().join("apps")
    }

    pub fn scan_path(&self) -> PathBuf {
        self.dir.path().join("scan.yaml")
    }

    pub fn document_path(&self, app: &str) -> PathBuf {
        self.apps_dir().join(app).join(DOCUMENT)
    }

    pub fn write_document(&self, app: &str, text: &str) {
        let dir = self.apps_dir().join(app);
        fs::create_dir_all(&dir).expect("create app dir");
        fs::write(dir.join(DOCUMENT), text).expect("write document");
    }

    pub fn read_document(&self, app: &str) -> String {
        fs::read_to_string(self.document_path(app)).expect("read document")
    }

    pub fn write_scan(&self, text: &str) {
        fs::write(self.scan_path(), text).expect("write scan");
    }

    pub fn write_file(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, text).expect("write file");
        path
    }

    /// Run `sync` against this workspace with extra arguments.
    pub fn sync(&self, extra: &[&str]) -> Output {
        let mut command = Command::new(bin());
        command
            .arg("sync")
            .arg("--scan")
            .arg(self.scan_path())
            .arg("--apps-dir")
            .arg(self.apps_dir())
            .args(extra)
            .env_remove("RUST_LOG");
        command.output().expect("run ocm-image-sync sync")
    }

    /// Run `sync --json` and parse the report from stdout.
    pub fn sync_json(&self, extra: &[&str]) -> (Output, serde_json::Value) {
        let mut args = vec!["--json"];
        args.extend_from_slice(extra);
        let output = self.sync(&args);
        let report = parse_json(&output);
        (output, report)
    }
}

pub fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_ocm-image-sync")
}

pub fn parse_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}); stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

/// Document outcome for `app` in a parsed report.
pub fn document<'a>(report: &'a serde_json::Value, app: &str) -> &'a serde_json::Value {
    report["documents"]
        .as_array()
        .expect("documents array")
        .iter()
        .find(|document| document["app_id"] == app)
        .unwrap_or_else(|| panic!("no document for {app}"))
}
