//! The LSP main loop.
//!
//! One thread owns every piece of mutable state: the document store, the
//! schema resolver, the workspace map, and the analysis engine. Request
//! handlers run on a small worker pool over captured snapshots (documents
//! and schema statuses are `Arc`-shared), which keeps the loop free to
//! receive `$/cancelRequest` while a request is in flight. Registry fetches
//! run on a tokio runtime and report back over a crossbeam channel.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use crossbeam_channel::Receiver;
use lsp_server::{Connection, Message, Notification, Request, RequestId, Response};
use lsp_types::notification::{
    Cancel, DidChangeTextDocument, DidChangeWatchedFiles, DidCloseTextDocument,
    DidOpenTextDocument, Notification as _, PublishDiagnostics,
};
use lsp_types::request::{
    Completion, ExecuteCommand, GotoDefinition, HoverRequest, Request as _,
};
use lsp_types::{
    CompletionOptions, CompletionParams, CompletionResponse, DidChangeTextDocumentParams,
    DidChangeWatchedFilesParams, DidChangeWatchedFilesRegistrationOptions,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, ExecuteCommandOptions,
    ExecuteCommandParams, FileSystemWatcher, GlobPattern, GotoDefinitionParams,
    GotoDefinitionResponse, HoverParams, NumberOrString, PublishDiagnosticsParams, Registration,
    RegistrationParams, ServerCapabilities, TextDocumentSyncCapability, TextDocumentSyncKind, Uri,
};
use threadpool::ThreadPool;
use tracing::{debug, error, info, warn};

use graphref_analysis::{
    complete, definition, hover, syntax_diagnostics, AnalysisEngine, PublishDecision,
};
use graphref_config::CONFIG_FILES;
use graphref_documents::DocumentStore;
use graphref_schema::{
    RefreshPolicy, ResolverEvent, SchemaCache, SchemaResolver, SchemaStatus,
};
use graphref_types::{CancelToken, Diagnostic, GraphRef, Position, Range};

use crate::conversions::{
    from_lsp_position, to_lsp_completion_item, to_lsp_diagnostic, to_lsp_hover, to_lsp_location,
};
use crate::registry::RegistryRouter;
use crate::workspace::{uri_to_path, Project, Workspace};
use crate::{Options, DEFAULT_REGISTRY_URL};

/// `workspace/executeCommand` command that marks every active schema stale
/// and refetches it.
pub const RELOAD_SCHEMA_COMMAND: &str = "graphref.reloadSchema";

const REQUEST_WORKERS: usize = 4;

enum Event {
    Lsp(Message),
    Resolver(ResolverEvent),
}

pub struct Server {
    connection: Connection,
    events: Receiver<ResolverEvent>,
    store: DocumentStore,
    engine: AnalysisEngine,
    resolver: SchemaResolver<RegistryRouter>,
    workspace: Workspace,
    /// Graph refs whose registry overrides have been applied to the router.
    routed: HashSet<GraphRef>,
    /// Tokens for requests currently running on the pool, shared with the
    /// workers so each entry is removed when its request finishes.
    cancels: Arc<Mutex<HashMap<RequestId, CancelToken>>>,
    pool: ThreadPool,
    next_request_id: i32,
    /// Owns the worker threads the resolver spawns fetches on.
    _runtime: tokio::runtime::Runtime,
}

impl Server {
    pub fn new(connection: Connection, options: Options) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        let cache = match options.cache_dir {
            Some(dir) => SchemaCache::with_dir(dir),
            None => SchemaCache::new(),
        };
        let router = RegistryRouter::new(
            options
                .registry_url
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
        );
        let resolver = SchemaResolver::new(
            router,
            cache,
            RefreshPolicy::default(),
            runtime.handle().clone(),
            events_tx,
        );

        Ok(Self {
            connection,
            events: events_rx,
            store: DocumentStore::new(),
            engine: AnalysisEngine::new(),
            resolver,
            workspace: Workspace::new(options.config),
            routed: HashSet::new(),
            cancels: Arc::new(Mutex::new(HashMap::new())),
            pool: ThreadPool::new(REQUEST_WORKERS),
            next_request_id: 0,
            _runtime: runtime,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let capabilities = serde_json::to_value(server_capabilities())?;
        let initialize_params = self.connection.initialize(capabilities)?;
        debug!(params = %initialize_params, "initialized");
        self.register_config_watcher()?;
        info!("language server ready");

        while let Some(event) = self.next_event() {
            match event {
                Event::Lsp(Message::Request(request)) => {
                    if self.connection.handle_shutdown(&request)? {
                        break;
                    }
                    self.handle_request(request)?;
                }
                Event::Lsp(Message::Notification(notification)) => {
                    self.handle_notification(notification)?;
                }
                // Only client/registerCapability acks come back this way.
                Event::Lsp(Message::Response(_)) => {}
                Event::Resolver(event) => self.handle_resolver_event(event)?,
            }
        }

        self.pool.join();
        self.resolver.shutdown();
        Ok(())
    }

    fn next_event(&self) -> Option<Event> {
        crossbeam_channel::select! {
            recv(self.connection.receiver) -> message => message.ok().map(Event::Lsp),
            recv(self.events) -> event => event.ok().map(Event::Resolver),
        }
    }

    // ---- requests ------------------------------------------------------

    fn handle_request(&mut self, request: Request) -> Result<()> {
        let id = request.id.clone();
        match request.method.as_str() {
            Completion::METHOD => match serde_json::from_value::<CompletionParams>(request.params)
            {
                Ok(params) => self.completion(id, &params),
                Err(e) => self.respond_error(id, invalid_params(e)),
            },
            HoverRequest::METHOD => match serde_json::from_value::<HoverParams>(request.params) {
                Ok(params) => self.hover(id, &params),
                Err(e) => self.respond_error(id, invalid_params(e)),
            },
            GotoDefinition::METHOD => {
                match serde_json::from_value::<GotoDefinitionParams>(request.params) {
                    Ok(params) => self.definition(id, &params),
                    Err(e) => self.respond_error(id, invalid_params(e)),
                }
            }
            ExecuteCommand::METHOD => {
                match serde_json::from_value::<ExecuteCommandParams>(request.params) {
                    Ok(params) => self.execute_command(id, &params),
                    Err(e) => self.respond_error(id, invalid_params(e)),
                }
            }
            method => self.respond_error(
                id,
                (
                    lsp_server::ErrorCode::MethodNotFound as i32,
                    format!("unhandled method: {method}"),
                ),
            ),
        }
    }

    fn completion(&mut self, id: RequestId, params: &CompletionParams) -> Result<()> {
        let position = from_lsp_position(params.text_document_position.position);
        let uri = params.text_document_position.text_document.uri.as_str();
        let status = self.status_for(uri);
        let Some(document) = self.store.get(uri).cloned() else {
            return self.respond(Response::new_ok(id, serde_json::Value::Null));
        };

        self.spawn_request(id, move |token| {
            let items: Vec<_> = complete(&document, &status, position, token)
                .into_iter()
                .map(to_lsp_completion_item)
                .collect();
            encode(CompletionResponse::Array(items))
        });
        Ok(())
    }

    fn hover(&mut self, id: RequestId, params: &HoverParams) -> Result<()> {
        let position = from_lsp_position(params.text_document_position_params.position);
        let uri = params.text_document_position_params.text_document.uri.as_str();
        let status = self.status_for(uri);
        let Some(document) = self.store.get(uri).cloned() else {
            return self.respond(Response::new_ok(id, serde_json::Value::Null));
        };

        self.spawn_request(id, move |token| {
            match hover(&document, &status, position, token) {
                Some(result) => encode(to_lsp_hover(result)),
                None => Ok(serde_json::Value::Null),
            }
        });
        Ok(())
    }

    fn definition(&mut self, id: RequestId, params: &GotoDefinitionParams) -> Result<()> {
        let position = from_lsp_position(params.text_document_position_params.position);
        let uri = params.text_document_position_params.text_document.uri.as_str();
        let Some(document) = self.store.get(uri).cloned() else {
            return self.respond(Response::new_ok(id, serde_json::Value::Null));
        };
        let store = self.store.clone();

        self.spawn_request(id, move |_token| {
            let location = definition(&document, &store, position)
                .as_ref()
                .and_then(to_lsp_location);
            match location {
                Some(location) => encode(GotoDefinitionResponse::Scalar(location)),
                None => Ok(serde_json::Value::Null),
            }
        });
        Ok(())
    }

    /// `graphref.reloadSchema`: mark every active schema stale and republish.
    ///
    /// The stale snapshots keep serving while the refetches run, so the
    /// editor never loses analysis during a reload.
    fn execute_command(&mut self, id: RequestId, params: &ExecuteCommandParams) -> Result<()> {
        if params.command != RELOAD_SCHEMA_COMMAND {
            return self.respond_error(
                id,
                (
                    lsp_server::ErrorCode::InvalidParams as i32,
                    format!("unknown command: {}", params.command),
                ),
            );
        }
        info!("schema reload requested");

        let uris: Vec<Arc<str>> = self.store.iter().map(|doc| doc.uri().clone()).collect();
        let mut invalidated: HashSet<GraphRef> = HashSet::new();
        for uri in &uris {
            let project = self.workspace.project_for_uri(uri);
            if let Project::Configured { config, .. } = &*project {
                if invalidated.insert(config.graph_ref().clone()) {
                    self.resolver.invalidate(config.graph_ref());
                }
            }
        }
        for uri in uris {
            self.publish_diagnostics(&uri)?;
        }
        self.respond(Response::new_ok(id, serde_json::Value::Null))
    }

    /// Run `job` on the worker pool, registering a cancellation token the
    /// `$/cancelRequest` handler can reach while the job is in flight.
    fn spawn_request<F>(&mut self, id: RequestId, job: F)
    where
        F: FnOnce(&CancelToken) -> HandlerResult + Send + 'static,
    {
        let token = CancelToken::new();
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(id.clone(), token.clone());
        }

        let sender = self.connection.sender.clone();
        let cancels = Arc::clone(&self.cancels);
        self.pool.execute(move || {
            let response = match job(&token) {
                Ok(value) => Response::new_ok(id.clone(), value),
                Err((code, message)) => Response::new_err(id.clone(), code, message),
            };
            if let Ok(mut cancels) = cancels.lock() {
                cancels.remove(&id);
            }
            // The receiver disappearing means the server is shutting down.
            let _ = sender.send(Message::Response(response));
        });
    }

    fn respond(&self, response: Response) -> Result<()> {
        self.connection.sender.send(Message::Response(response))?;
        Ok(())
    }

    fn respond_error(&self, id: RequestId, (code, message): (i32, String)) -> Result<()> {
        self.respond(Response::new_err(id, code, message))
    }

    // ---- notifications -------------------------------------------------

    fn handle_notification(&mut self, notification: Notification) -> Result<()> {
        match notification.method.as_str() {
            DidOpenTextDocument::METHOD => {
                let params: DidOpenTextDocumentParams =
                    serde_json::from_value(notification.params)?;
                let doc = params.text_document;
                self.store.open(doc.uri.as_str(), doc.version, doc.text);
                self.publish_diagnostics(doc.uri.as_str())?;
            }
            DidChangeTextDocument::METHOD => {
                let params: DidChangeTextDocumentParams =
                    serde_json::from_value(notification.params)?;
                let uri = params.text_document.uri.as_str();
                // Full sync: the last change carries the whole document.
                let Some(change) = params.content_changes.into_iter().next_back() else {
                    return Ok(());
                };
                if self
                    .store
                    .change(uri, params.text_document.version, change.text)
                {
                    self.publish_diagnostics(uri)?;
                }
            }
            DidCloseTextDocument::METHOD => {
                let params: DidCloseTextDocumentParams =
                    serde_json::from_value(notification.params)?;
                let uri = params.text_document.uri;
                self.store.close(uri.as_str());
                self.engine.forget(uri.as_str());
                // Clear stale diagnostics on the client.
                self.send_notification::<PublishDiagnostics>(PublishDiagnosticsParams {
                    uri,
                    diagnostics: Vec::new(),
                    version: None,
                })?;
            }
            Cancel::METHOD => {
                let params: lsp_types::CancelParams =
                    serde_json::from_value(notification.params)?;
                let id = cancel_request_id(params.id);
                if let Ok(cancels) = self.cancels.lock() {
                    if let Some(token) = cancels.get(&id) {
                        token.cancel();
                    }
                }
            }
            DidChangeWatchedFiles::METHOD => {
                let params: DidChangeWatchedFilesParams =
                    serde_json::from_value(notification.params)?;
                self.handle_config_changes(&params)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// A watched config file changed: rebuild affected projects, republish
    /// every open document, and drop resolver state for graph refs the
    /// rebuilt projects no longer point at.
    fn handle_config_changes(&mut self, params: &DidChangeWatchedFilesParams) -> Result<()> {
        let mut displaced: Vec<GraphRef> = Vec::new();
        let mut any = false;
        for change in &params.changes {
            let Some(path) = uri_to_path(change.uri.as_str()) else {
                continue;
            };
            let is_config = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| CONFIG_FILES.contains(&name));
            if !is_config {
                continue;
            }
            info!(config = %path.display(), "project config changed");
            if let Some(old) = self.workspace.invalidate(&path) {
                if let Project::Configured { config, .. } = &*old {
                    displaced.push(config.graph_ref().clone());
                }
            }
            any = true;
        }
        if !any {
            return Ok(());
        }

        // Routes may point at stale endpoints now; re-register lazily.
        self.routed.clear();

        let uris: Vec<Arc<str>> = self.store.iter().map(|doc| doc.uri().clone()).collect();
        let mut live: HashSet<GraphRef> = HashSet::new();
        for uri in uris {
            // A rebuilt project may carry new credentials or a new variant,
            // so terminal fetch failures get a fresh attempt.
            let project = self.workspace.project_for_uri(&uri);
            if let Project::Configured { config, .. } = &*project {
                live.insert(config.graph_ref().clone());
                self.register_route(config);
                self.resolver.retry_now(config.graph_ref());
            }
            self.publish_diagnostics(&uri)?;
        }

        // A re-pointed project leaves its old graph ref behind; stop
        // refreshing something no open document uses.
        for graph_ref in displaced {
            if !live.contains(&graph_ref) {
                self.resolver.forget(&graph_ref);
            }
        }
        Ok(())
    }

    // ---- resolver events -----------------------------------------------

    fn handle_resolver_event(&mut self, event: ResolverEvent) -> Result<()> {
        let ResolverEvent::FetchCompleted { graph_ref, result } = event;
        self.resolver.complete(&graph_ref, result);

        let uris: Vec<Arc<str>> = self.store.iter().map(|doc| doc.uri().clone()).collect();
        for uri in uris {
            let project = self.workspace.project_for_uri(&uri);
            let Project::Configured { config, .. } = &*project else {
                continue;
            };
            if *config.graph_ref() != graph_ref {
                continue;
            }
            // Already published against this snapshot: nothing would change.
            // A failed fetch still falls through so degraded markers update.
            if let SchemaStatus::Ready(snapshot) = self.resolver.resolve(config.graph_ref()) {
                if self.engine.published_schema_hash(&uri) == Some(snapshot.hash()) {
                    continue;
                }
            }
            self.publish_diagnostics(&uri)?;
        }
        Ok(())
    }

    // ---- diagnostics ---------------------------------------------------

    fn publish_diagnostics(&mut self, uri: &str) -> Result<()> {
        let project = self.workspace.project_for_uri(uri);
        let Some(document) = self.store.get(uri).cloned() else {
            return Ok(());
        };

        let diagnostics = match &*project {
            Project::Unconfigured { reason } => {
                let mut diagnostics = syntax_diagnostics(&document);
                diagnostics.push(
                    Diagnostic::error(Range::at(Position::new(0, 0)), reason.clone())
                        .with_code("project-config"),
                );
                diagnostics
            }
            Project::Configured { config, .. } => {
                if Workspace::document_in_scope(&project, uri) {
                    self.register_route(config);
                    let status = self.resolver.resolve(config.graph_ref());
                    match self.engine.diagnose(&document, &status) {
                        PublishDecision::Publish(result) => result.diagnostics,
                        PublishDecision::Discard => return Ok(()),
                    }
                } else {
                    // Outside the project's include globs: syntax only.
                    syntax_diagnostics(&document)
                }
            }
        };

        let Ok(uri) = uri.parse::<Uri>() else {
            warn!(uri, "cannot publish diagnostics for unparseable URI");
            return Ok(());
        };
        self.send_notification::<PublishDiagnostics>(PublishDiagnosticsParams {
            uri,
            diagnostics: diagnostics.into_iter().map(to_lsp_diagnostic).collect(),
            version: Some(document.version()),
        })
    }

    /// Schema status for the project governing `uri`, for request handlers.
    /// Unconfigured projects report `Pending`, which degrades features to
    /// empty results.
    fn status_for(&mut self, uri: &str) -> SchemaStatus {
        let project = self.workspace.project_for_uri(uri);
        match &*project {
            Project::Configured { config, .. } => {
                self.register_route(config);
                self.resolver.resolve(config.graph_ref())
            }
            Project::Unconfigured { .. } => SchemaStatus::Pending,
        }
    }

    fn register_route(&mut self, config: &graphref_config::ProjectConfig) {
        if self.routed.insert(config.graph_ref().clone()) {
            self.resolver
                .client()
                .register(config.graph_ref(), config.registry());
        }
    }

    // ---- plumbing ------------------------------------------------------

    fn register_config_watcher(&mut self) -> Result<()> {
        let watchers = vec![FileSystemWatcher {
            glob_pattern: GlobPattern::String(
                "**/{.graphrefrc,graphref.config}.{yml,yaml,json}".to_string(),
            ),
            kind: None,
        }];
        let registrations = RegistrationParams {
            registrations: vec![Registration {
                id: "graphref-config-watcher".to_string(),
                method: DidChangeWatchedFiles::METHOD.to_string(),
                register_options: Some(serde_json::to_value(
                    DidChangeWatchedFilesRegistrationOptions { watchers },
                )?),
            }],
        };

        self.next_request_id += 1;
        let request = Request::new(
            RequestId::from(self.next_request_id),
            "client/registerCapability".to_string(),
            registrations,
        );
        if let Err(error) = self.connection.sender.send(Message::Request(request)) {
            error!(%error, "failed to register config watcher");
        }
        Ok(())
    }

    fn send_notification<N: lsp_types::notification::Notification>(
        &self,
        params: N::Params,
    ) -> Result<()> {
        self.connection
            .sender
            .send(Message::Notification(Notification::new(
                N::METHOD.to_string(),
                params,
            )))?;
        Ok(())
    }
}

type HandlerResult = std::result::Result<serde_json::Value, (i32, String)>;

fn encode<T: serde::Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value)
        .map_err(|error| (lsp_server::ErrorCode::InternalError as i32, error.to_string()))
}

fn invalid_params(error: serde_json::Error) -> (i32, String) {
    (lsp_server::ErrorCode::InvalidParams as i32, error.to_string())
}

fn cancel_request_id(id: NumberOrString) -> RequestId {
    match id {
        NumberOrString::Number(n) => RequestId::from(n),
        NumberOrString::String(s) => RequestId::from(s),
    }
}

fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
        completion_provider: Some(CompletionOptions {
            trigger_characters: Some(vec!["{".to_string(), "@".to_string(), ".".to_string()]),
            ..CompletionOptions::default()
        }),
        hover_provider: Some(lsp_types::HoverProviderCapability::Simple(true)),
        definition_provider: Some(lsp_types::OneOf::Left(true)),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: vec![RELOAD_SCHEMA_COMMAND.to_string()],
            ..ExecuteCommandOptions::default()
        }),
        ..ServerCapabilities::default()
    }
}
