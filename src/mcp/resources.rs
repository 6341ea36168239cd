//! MCP resources: descriptors and the readers that produce their content.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::mcp::protocol::Resource;

/// Produces the text content of a resource.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read(&self, uri: &str) -> Result<String>;
}

/// Adapter turning an async closure into a [`ResourceReader`].
pub struct FnReader<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ResourceReader for FnReader<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn read(&self, uri: &str) -> Result<String> {
        (self.f)(uri.to_string()).await
    }
}

/// Reader returning fixed text.
pub struct StaticReader(pub String);

#[async_trait]
impl ResourceReader for StaticReader {
    async fn read(&self, _uri: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

struct RegisteredResource {
    descriptor: Resource,
    reader: Arc<dyn ResourceReader>,
}

/// Registry of resources keyed by URI, owned by one server.
///
/// Same replace-on-reregister rule as [`crate::mcp::handler::ToolRegistry`].
#[derive(Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, RegisteredResource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. Returns the descriptor it replaced, if any.
    pub fn register<R: ResourceReader + 'static>(
        &mut self,
        descriptor: Resource,
        reader: R,
    ) -> Option<Resource> {
        self.register_arc(descriptor, Arc::new(reader))
    }

    pub fn register_arc(
        &mut self,
        descriptor: Resource,
        reader: Arc<dyn ResourceReader>,
    ) -> Option<Resource> {
        let uri = descriptor.uri.clone();
        let previous = self
            .resources
            .insert(uri.clone(), RegisteredResource { descriptor, reader });

        info!("Registered resource: {}", uri);
        previous.map(|r| r.descriptor)
    }

    /// Register an async closure as a resource reader.
    pub fn register_fn<F, Fut>(&mut self, descriptor: Resource, f: F) -> Option<Resource>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.register(descriptor, FnReader { f })
    }

    pub fn lookup(&self, uri: &str) -> Option<&Resource> {
        self.resources.get(uri).map(|r| &r.descriptor)
    }

    pub fn get_reader(&self, uri: &str) -> Option<Arc<dyn ResourceReader>> {
        self.resources.get(uri).map(|r| r.reader.clone())
    }

    pub fn list(&self) -> Vec<Resource> {
        self.resources.values().map(|r| r.descriptor.clone()).collect()
    }

    /// Registered URIs, sorted.
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.resources.keys().cloned().collect();
        uris.sort();
        uris
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(uri: &str, mime: &str) -> Resource {
        Resource {
            uri: uri.to_string(),
            name: "demo".to_string(),
            description: "Demo resource".to_string(),
            mime_type: mime.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_read() {
        let mut registry = ResourceRegistry::new();
        registry.register(descriptor("demo://x", "text/plain"), StaticReader("hello".into()));

        assert_eq!(registry.resource_count(), 1);
        assert_eq!(registry.lookup("demo://x").unwrap().mime_type, "text/plain");

        let reader = registry.get_reader("demo://x").unwrap();
        assert_eq!(reader.read("demo://x").await.unwrap(), "hello");
        assert!(registry.get_reader("demo://y").is_none());
    }

    #[tokio::test]
    async fn test_reregister_replaces() {
        let mut registry = ResourceRegistry::new();
        registry.register(descriptor("demo://x", "text/plain"), StaticReader("old".into()));
        let replaced = registry.register_fn(descriptor("demo://x", "application/json"), |uri| async move {
            Ok(format!("{{\"uri\":\"{}\"}}", uri))
        });

        assert_eq!(replaced.unwrap().mime_type, "text/plain");
        assert_eq!(registry.resource_count(), 1);
        assert_eq!(registry.list()[0].mime_type, "application/json");

        let text = registry.get_reader("demo://x").unwrap().read("demo://x").await.unwrap();
        assert_eq!(text, "{\"uri\":\"demo://x\"}");
    }

    #[test]
    fn test_uris_sorted() {
        let mut registry = ResourceRegistry::new();
        registry.register(descriptor("b://1", "text/plain"), StaticReader(String::new()));
        registry.register(descriptor("a://1", "text/plain"), StaticReader(String::new()));
        assert_eq!(registry.uris(), vec!["a://1", "b://1"]);
    }
}
