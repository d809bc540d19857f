use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use vantage_core::funnel::validate_funnel_steps;

/// A project record as the metadata provider stores it.
///
/// Only `id` and `timezone` feed the engine. The access-control fields are
/// carried for the provider's other consumers (ingestion and auth middleware)
/// and are never read here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Timezone used when a request does not name one.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Origins allowed to send events.
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub ip_blacklist: Vec<String>,
    #[serde(default)]
    pub bot_protection_level: String,
    #[serde(default)]
    pub password_protected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funnel {
    pub id: String,
    pub pid: String,
    pub name: String,
    pub steps: Vec<String>,
}

/// Read access to project metadata owned by the surrounding application.
///
/// The engine only asks whether a project or saved funnel exists and what its
/// defaults are; access control happens before a request reaches it.
#[async_trait]
pub trait ProjectMetadata: Send + Sync + 'static {
    async fn get_project(&self, pid: &str) -> anyhow::Result<Option<Project>>;

    async fn get_funnel(&self, pid: &str, funnel_id: &str) -> anyhow::Result<Option<Funnel>>;
}

/// In-memory [`ProjectMetadata`] for tests and the CLI.
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    projects: Arc<RwLock<HashMap<String, Project>>>,
    funnels: Arc<RwLock<HashMap<String, Funnel>>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_project(&self, project: Project) {
        let mut projects = self.projects.write().await;
        projects.insert(project.id.clone(), project);
    }

    pub async fn insert_funnel(&self, funnel: Funnel) -> anyhow::Result<()> {
        validate_funnel_steps(&funnel.steps)?;
        let mut funnels = self.funnels.write().await;
        funnels.insert(funnel.id.clone(), funnel);
        Ok(())
    }
}

#[async_trait]
impl ProjectMetadata for MemoryMetadataStore {
    async fn get_project(&self, pid: &str) -> anyhow::Result<Option<Project>> {
        Ok(self.projects.read().await.get(pid).cloned())
    }

    async fn get_funnel(&self, pid: &str, funnel_id: &str) -> anyhow::Result<Option<Funnel>> {
        Ok(self
            .funnels
            .read()
            .await
            .get(funnel_id)
            .filter(|funnel| funnel.pid == pid)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            name: "Docs".to_string(),
            timezone: Some("Europe/Kyiv".to_string()),
            origins: vec!["docs.example.com".to_string()],
            ip_blacklist: Vec::new(),
            bot_protection_level: "basic".to_string(),
            password_protected: false,
        }
    }

    #[tokio::test]
    async fn funnels_are_scoped_to_their_project() {
        let store = MemoryMetadataStore::new();
        store.insert_project(project("p1")).await;
        store
            .insert_funnel(Funnel {
                id: "f1".to_string(),
                pid: "p1".to_string(),
                name: "Signup".to_string(),
                steps: vec!["/".to_string(), "/signup".to_string()],
            })
            .await
            .expect("insert funnel");

        assert!(store.get_project("p1").await.expect("get").is_some());
        assert!(store.get_funnel("p1", "f1").await.expect("get").is_some());
        assert!(store.get_funnel("p2", "f1").await.expect("get").is_none());
    }

    #[test]
    fn provider_records_keep_access_control_state() {
        let record: Project = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "Docs",
            "ipBlacklist": ["10.0.0.1"],
            "passwordProtected": true
        }))
        .expect("project");
        assert_eq!(record.timezone, None);
        assert!(record.origins.is_empty());
        assert_eq!(record.ip_blacklist, vec!["10.0.0.1"]);
        assert!(record.password_protected);

        let back = serde_json::to_value(&record).expect("serialize");
        assert_eq!(back["ipBlacklist"][0], "10.0.0.1");
        assert_eq!(back["botProtectionLevel"], "");
    }

    #[tokio::test]
    async fn invalid_funnels_are_rejected() {
        let store = MemoryMetadataStore::new();
        let result = store
            .insert_funnel(Funnel {
                id: "f1".to_string(),
                pid: "p1".to_string(),
                name: "Too short".to_string(),
                steps: vec!["/".to_string()],
            })
            .await;
        assert!(result.is_err());
    }
}
