/// Wazuh API bridge - Shared Library
///
/// Credential storage, Wazuh API verification, request proxying and
/// boot-time provisioning, used by the `wazuh-bridge-server` daemon.
pub mod credentials;
pub mod error;
pub mod provision;
pub mod proxy;
pub mod store;
pub mod types;
pub mod upstream;
pub mod verify;
pub mod version;

pub use credentials::{CredentialError, CredentialStore};
pub use error::{BridgeError, ErrorCode, Result};
pub use provision::{ProvisionMode, ProvisionReport, Provisioner, SetupState, Step, StepOutcome};
pub use proxy::{ErrorEnvelope, ProxyReply, ProxyRequest, RequestProxy};
pub use store::{DocumentStore, ElasticsearchStore, MemoryStore};
pub use types::{Config, CredentialRecord, DocKey, SettingsPayload, SetupMarker};
pub use upstream::{RequestOptions, UpstreamClient, UpstreamResponse};
pub use verify::{ApiVerifier, VerificationOutcome};
