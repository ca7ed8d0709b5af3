use async_trait::async_trait;

use crate::discovery::types::InstanceSource;

/// Fixed list injected from configuration at construction.
#[derive(Debug, Clone)]
pub struct BuiltinSource {
    instances: Vec<String>,
}

impl BuiltinSource {
    pub fn new<I, S>(instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instances: instances.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl InstanceSource for BuiltinSource {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn fetch(&self) -> Vec<String> {
        self.instances.clone()
    }
}
