//! Routing of schema fetches to per-project registry endpoints.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use graphref_config::RegistryOverrides;
use graphref_registry::{FetchError, HttpRegistryClient, RegistryClient, SchemaSnapshot};
use graphref_types::GraphRef;

/// One resolver serves every project, but projects may point their graph
/// ref at a different registry endpoint or carry auth headers. The router
/// keeps a client per graph ref and falls back to the default endpoint.
pub struct RegistryRouter {
    default: HttpRegistryClient,
    routes: RwLock<HashMap<GraphRef, HttpRegistryClient>>,
}

impl RegistryRouter {
    pub fn new(default_url: impl Into<String>) -> Self {
        Self {
            default: HttpRegistryClient::new(default_url),
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a project's registry overrides for its graph ref.
    ///
    /// Called when a project is (re)configured; subsequent fetches for the
    /// graph ref use the overridden endpoint.
    pub fn register(&self, graph_ref: &GraphRef, overrides: &RegistryOverrides) {
        let url = overrides
            .url
            .clone()
            .unwrap_or_else(|| self.default.url().to_string());
        let mut client = HttpRegistryClient::new(url);
        for (name, value) in &overrides.headers {
            client = client.with_header(name.clone(), value.clone());
        }
        if let Some(secs) = overrides.timeout_secs {
            client = client.with_timeout(Duration::from_secs(secs));
        }
        if let Ok(mut routes) = self.routes.write() {
            routes.insert(graph_ref.clone(), client);
        }
    }

    fn client_for(&self, graph_ref: &GraphRef) -> HttpRegistryClient {
        self.routes
            .read()
            .ok()
            .and_then(|routes| routes.get(graph_ref).cloned())
            .unwrap_or_else(|| self.default.clone())
    }
}

impl RegistryClient for RegistryRouter {
    fn fetch_schema(
        &self,
        graph_ref: &GraphRef,
    ) -> impl std::future::Future<Output = Result<SchemaSnapshot, FetchError>> + Send {
        let client = self.client_for(graph_ref);
        let graph_ref = graph_ref.clone();
        async move { client.fetch_schema(&graph_ref).await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_overrides_endpoint() {
        let router = RegistryRouter::new("https://default.example/graphql");
        let graph_ref: GraphRef = "shop@current".parse().unwrap();

        let overrides = RegistryOverrides {
            url: Some("https://internal.example/graphql".to_string()),
            headers: HashMap::new(),
            timeout_secs: Some(5),
        };
        router.register(&graph_ref, &overrides);

        assert_eq!(
            router.client_for(&graph_ref).url(),
            "https://internal.example/graphql"
        );
        let other: GraphRef = "other@current".parse().unwrap();
        assert_eq!(
            router.client_for(&other).url(),
            "https://default.example/graphql"
        );
    }
}
