//! One-shot provisioning of dashboard artifacts
//!
//! Runs once at boot. The setup marker document decides the path:
//!
//! ```text
//! UNINITIALIZED --install--> READY --upgrade--> READY
//! ```
//!
//! Install: index template, index pattern, default index, default time
//! range, saved objects bulk import, then the marker (create semantics).
//! Upgrade: the same without the bulk import, marker merged (update).
//!
//! Steps are independent. A failure is logged and recorded in the
//! [`ProvisionReport`]; later steps still run. Partial provisioning is a
//! valid end state; the next boot retries, and every write is either
//! idempotent or tolerant of "already exists".

use crate::error::{BridgeError, Result};
use crate::store::DocumentStore;
use crate::types::{BulkItem, Config, DocKey, SetupMarker, INDEX_PATTERN, TEMPLATE_NAME, TIME_FIELD};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub const TEMPLATE_FILE: &str = "template_file.json";
pub const FIELDS_FILE: &str = "kibana_fields_file.json";
pub const OBJECTS_FILE: &str = "objects_file.json";

/// UI setting naming the default index pattern
pub const DEFAULT_INDEX_SETTING: &str = "defaultIndex";
/// UI setting holding the default time-picker range
pub const TIME_DEFAULTS_SETTING: &str = "timepicker:timeDefaults";

/// Persisted installation state, derived from the setup marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    Uninitialized,
    Ready,
}

/// Which provisioning path runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionMode {
    Install,
    Upgrade,
}

impl From<SetupState> for ProvisionMode {
    fn from(state: SetupState) -> Self {
        match state {
            SetupState::Uninitialized => ProvisionMode::Install,
            SetupState::Ready => ProvisionMode::Upgrade,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Template,
    IndexPattern,
    DefaultIndex,
    DefaultTime,
    SavedObjects,
    SetupMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    AlreadyPresent,
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied | Self::AlreadyPresent)
    }
}

/// What a provisioning run did, step by step
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionReport {
    pub mode: ProvisionMode,
    pub steps: Vec<(Step, StepOutcome)>,
}

impl ProvisionReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|(_, o)| o.is_success())
    }
}

/// Packaged JSON files shipped next to the binary
#[derive(Debug, Clone)]
pub struct PackagedFiles {
    dir: PathBuf,
}

impl PackagedFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_json(&self, name: &str) -> Result<Value> {
        let path = self.dir.join(name);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            BridgeError::provision(format!("Could not read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| BridgeError::provision(format!("Malformed JSON in {}: {}", path.display(), e)))
    }

    /// Index template body
    pub fn template(&self) -> Result<Value> {
        let template = self.read_json(TEMPLATE_FILE)?;
        if !template.is_object() {
            return Err(BridgeError::provision(format!("{} must hold a JSON object", TEMPLATE_FILE)));
        }
        Ok(template)
    }

    /// Field list of the alerts index pattern, as the string Kibana stores
    pub fn index_pattern_fields(&self) -> Result<String> {
        let data = self.read_json(FIELDS_FILE)?;
        match data.get("wazuh_alerts") {
            Some(Value::String(fields)) => Ok(fields.clone()),
            Some(fields @ Value::Array(_)) => Ok(serde_json::to_string(fields)?),
            _ => Err(BridgeError::provision(format!(
                "{} has no wazuh_alerts field list",
                FIELDS_FILE
            ))),
        }
    }

    /// Saved searches, visualizations and dashboards, addressed into `index`
    pub fn saved_objects(&self, index: &str) -> Result<Vec<BulkItem>> {
        let data = self.read_json(OBJECTS_FILE)?;
        let objects = data
            .as_array()
            .ok_or_else(|| BridgeError::provision(format!("{} must hold a JSON array", OBJECTS_FILE)))?;

        objects
            .iter()
            .map(|object| {
                let id = object.get("_id").and_then(Value::as_str);
                let doc_type = object.get("_type").and_then(Value::as_str);
                let source = object.get("_source");
                match (id, doc_type, source) {
                    (Some(id), Some(doc_type), Some(source)) => Ok(BulkItem {
                        key: DocKey::new(index, doc_type, id),
                        source: source.clone(),
                    }),
                    _ => Err(BridgeError::provision(format!(
                        "{} entries need _id, _type and _source",
                        OBJECTS_FILE
                    ))),
                }
            })
            .collect()
    }
}

/// Writer for dashboard UI settings
///
/// Settings live merged in a single config document keyed by the dashboard
/// version, which may not exist yet on a fresh install.
#[derive(Clone)]
pub struct UiSettings {
    store: Arc<dyn DocumentStore>,
    key: DocKey,
}

impl UiSettings {
    pub fn new(store: Arc<dyn DocumentStore>, key: DocKey) -> Self {
        Self { store, key }
    }

    pub async fn set(&self, name: &str, value: Value) -> Result<()> {
        let mut fields = serde_json::Map::new();
        fields.insert(name.to_string(), value);
        let partial = Value::Object(fields);
        match self.store.update(&self.key, &partial).await {
            Err(BridgeError::NotFound(_)) => match self.store.create(&self.key, &partial).await {
                // Created concurrently by someone else; merge into theirs.
                Err(e) if e.is_conflict() => self.store.update(&self.key, &partial).await,
                other => other,
            },
            other => other,
        }
    }

    pub async fn get(&self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .store
            .get(&self.key)
            .await?
            .and_then(|doc| doc.get(name).cloned()))
    }
}

/// Boot-time provisioning state machine
pub struct Provisioner {
    store: Arc<dyn DocumentStore>,
    config: Config,
    files: PackagedFiles,
    ui: UiSettings,
    app_version: String,
}

impl Provisioner {
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        let files = PackagedFiles::new(config.integration_files_dir.clone());
        let ui = UiSettings::new(Arc::clone(&store), config.ui_settings_key());
        Self {
            store,
            config,
            files,
            ui,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    /// Read the setup marker. An unreachable store counts as uninitialized:
    /// every install write tolerates existing documents.
    pub async fn setup_state(&self) -> SetupState {
        match self.store.get(&self.config.setup_key()).await {
            Ok(Some(_)) => {
                tracing::info!(target: "initialize", "Wazuh-setup document already exists. Proceed to upgrade.");
                SetupState::Ready
            }
            Ok(None) => {
                tracing::info!(target: "initialize", "Wazuh-setup document does not exist. Initializing configuration...");
                SetupState::Uninitialized
            }
            Err(e) => {
                tracing::error!(target: "initialize", "Could not read Wazuh-setup document: {}. Trying a fresh install.", e);
                SetupState::Uninitialized
            }
        }
    }

    /// Decide the path from the marker and run it
    pub async fn run(&self) -> ProvisionReport {
        let mode = ProvisionMode::from(self.setup_state().await);
        self.run_mode(mode).await
    }

    /// Run one provisioning path unconditionally
    pub async fn run_mode(&self, mode: ProvisionMode) -> ProvisionReport {
        tracing::info!(
            target: "initialize",
            "Configuring Kibana for working with \"{}\" index pattern ({:?})...",
            INDEX_PATTERN,
            mode
        );

        let mut steps = Vec::with_capacity(6);

        steps.push((Step::Template, self.install_template().await));

        let pattern = self.create_index_pattern().await;
        let settle = pattern == StepOutcome::Applied;
        steps.push((Step::IndexPattern, pattern));

        if settle {
            tokio::time::sleep(self.config.settle_delay()).await;
        }
        steps.push((Step::DefaultIndex, self.set_default_index().await));
        steps.push((Step::DefaultTime, self.set_default_time().await));

        if mode == ProvisionMode::Install {
            steps.push((Step::SavedObjects, self.import_objects().await));
        }

        steps.push((Step::SetupMarker, self.write_marker(mode).await));

        let report = ProvisionReport { mode, steps };
        if report.is_complete() {
            tracing::info!(target: "initialize", "Provisioning finished. App ready to be used.");
        } else {
            tracing::warn!(target: "initialize", "Provisioning finished with errors; the next start will retry");
        }
        report
    }

    async fn install_template(&self) -> StepOutcome {
        let template = match self.files.template() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(target: "initialize", "Could not read the mapping file: {}", e);
                return StepOutcome::Skipped(e.to_string());
            }
        };

        match self.store.put_template(TEMPLATE_NAME, 0, &template).await {
            Ok(()) => {
                tracing::info!(target: "initialize", "Template installed and loaded: {}", INDEX_PATTERN);
                StepOutcome::Applied
            }
            Err(e) => {
                tracing::error!(target: "initialize", "Could not install template {}: {}", INDEX_PATTERN, e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn create_index_pattern(&self) -> StepOutcome {
        let fields = match self.files.index_pattern_fields() {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(target: "initialize", "Could not read the fields file: {}", e);
                return StepOutcome::Skipped(e.to_string());
            }
        };

        tracing::info!(target: "initialize", "Creating index pattern: {}", INDEX_PATTERN);
        let key = DocKey::new(&self.config.kibana_index, "index-pattern", INDEX_PATTERN);
        let body = json!({
            "title": INDEX_PATTERN,
            "timeFieldName": TIME_FIELD,
            "fields": fields,
        });

        match self.store.create(&key, &body).await {
            Ok(()) => {
                tracing::info!(target: "initialize", "Created index pattern: {}", INDEX_PATTERN);
                StepOutcome::Applied
            }
            Err(e) if e.is_conflict() => {
                tracing::info!(target: "initialize", "Skipping index pattern configuration: already configured: {}", INDEX_PATTERN);
                StepOutcome::AlreadyPresent
            }
            Err(e) => {
                tracing::error!(target: "initialize", "Could not configure index pattern {}: {}", INDEX_PATTERN, e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn set_default_index(&self) -> StepOutcome {
        tracing::info!(target: "initialize", "Setting Kibana default index pattern to \"{}\"...", INDEX_PATTERN);
        match self.ui.set(DEFAULT_INDEX_SETTING, json!(INDEX_PATTERN)).await {
            Ok(()) => {
                tracing::info!(target: "initialize", "Default index pattern set to: {}", INDEX_PATTERN);
                StepOutcome::Applied
            }
            Err(e) => {
                tracing::error!(target: "initialize", "Could not set default index pattern {}: {}", INDEX_PATTERN, e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn set_default_time(&self) -> StepOutcome {
        tracing::info!(target: "initialize", "Setting Kibana default time to last 24h...");
        let range = json!({ "from": "now-24h", "to": "now", "mode": "quick" }).to_string();

        match self.ui.set(TIME_DEFAULTS_SETTING, Value::String(range)).await {
            Ok(()) => {
                tracing::info!(target: "initialize", "Kibana default time set to Last 24h.");
                StepOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(target: "initialize", "Could not set default time. Please, configure it manually: {}", e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn import_objects(&self) -> StepOutcome {
        tracing::info!(target: "initialize", "Importing objects (searches, visualizations and dashboards) into Elasticsearch...");
        let items = match self.files.saved_objects(&self.config.kibana_index) {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(target: "initialize", "Could not read the objects file: {}", e);
                return StepOutcome::Skipped(e.to_string());
            }
        };

        if let Err(e) = self.store.bulk(&items).await {
            tracing::error!(target: "initialize", "Error importing objects into Elasticsearch. Bulk request failed: {}", e);
            return StepOutcome::Failed(e.to_string());
        }

        if let Err(e) = self
            .store
            .refresh(&[self.config.kibana_index.as_str(), INDEX_PATTERN])
            .await
        {
            tracing::warn!(target: "initialize", "Imported objects but refresh failed: {}", e);
        }

        tracing::info!(target: "initialize", "Imported {} saved objects", items.len());
        StepOutcome::Applied
    }

    async fn write_marker(&self, mode: ProvisionMode) -> StepOutcome {
        let marker = SetupMarker::new(&self.app_version, &self.config.app_revision);
        let body = match serde_json::to_value(&marker) {
            Ok(b) => b,
            Err(e) => return StepOutcome::Failed(e.to_string()),
        };
        let key = self.config.setup_key();

        let result = match mode {
            ProvisionMode::Install => self.store.create(&key, &body).await,
            ProvisionMode::Upgrade => self.store.update(&key, &body).await,
        };

        match (mode, result) {
            (ProvisionMode::Install, Ok(())) => {
                tracing::info!(target: "initialize", "Wazuh set up info inserted");
                StepOutcome::Applied
            }
            (ProvisionMode::Upgrade, Ok(())) => {
                tracing::info!(target: "initialize", "Wazuh set up info updated");
                StepOutcome::Applied
            }
            (ProvisionMode::Install, Err(e)) if e.is_conflict() => {
                tracing::info!(target: "initialize", "Wazuh set up info already present (concurrent start)");
                StepOutcome::AlreadyPresent
            }
            (_, Err(e)) => {
                tracing::error!(target: "initialize", "Could not write Wazuh set up info: {}", e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }
}
