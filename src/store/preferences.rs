use super::backend::KeyValueBackend;
use crate::error::Result;
use std::sync::Arc;

const TECH_NAME_KEY: &str = "unitflow_tech_name_v1";

/// Small operator preferences kept beside the log
pub struct Preferences {
    backend: Arc<dyn KeyValueBackend>,
}

impl Preferences {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    /// Last tech name used, if any
    pub async fn tech_name(&self) -> Option<String> {
        self.backend
            .read(TECH_NAME_KEY)
            .await
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    pub async fn remember_tech_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        self.backend.write(TECH_NAME_KEY, name).await?;
        Ok(())
    }
}
