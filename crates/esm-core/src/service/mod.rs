//! Controller registry and action route compiler.
//!
//! Controllers come from a static list of [`ControllerFactory`] entries.
//! [`Service::load`] builds each one, registers it under its unique name,
//! runs its load hook, then compiles one route per enabled action from the
//! fixed [`Action`] table. Any problem at this stage is a [`ServiceError`]
//! and aborts startup.

mod action;
mod controller;
mod dispatch;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Request};
use axum::http::{Method, StatusCode, Uri};
use axum::routing::MethodRouter;
use tracing::{debug, info};

use crate::error::ApiError;

pub use action::{Action, ActionPattern};
pub use controller::{ACTION_NOT_IMPLEMENTED, ActionRequest, Controller, Reply, Responder};

/// Boxed error used by controller construction and load hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fatal errors while building the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to construct controller from `{unit}`: {source}")]
    ControllerInit {
        unit: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("controller `{0}` is registered more than once")]
    DuplicateController(String),

    #[error(
        "controller name `{0}` is not a valid path segment (use ASCII letters, digits, `-`, `_` or `.`)"
    )]
    InvalidControllerName(String),

    #[error("controller `{controller}` failed to load: {source}")]
    ControllerLoad {
        controller: String,
        #[source]
        source: BoxError,
    },

    #[error("controller `{controller}` enables unknown action `{action}`")]
    InvalidAction { controller: String, action: String },

    #[error("controller `{controller}` enables action `{action}` more than once")]
    DuplicateAction { controller: String, action: String },

    #[error(
        "route for `{controller}.{action}` has unresolved placeholder `{placeholder}`"
    )]
    UnresolvedPlaceholder {
        controller: String,
        action: String,
        placeholder: String,
    },
}

/// A static entry point for one controller.
#[derive(Clone, Copy)]
pub struct ControllerFactory {
    /// Where the controller comes from; named in construction errors.
    pub unit: &'static str,
    pub build: fn() -> Result<Arc<dyn Controller>, BoxError>,
}

impl std::fmt::Debug for ControllerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerFactory")
            .field("unit", &self.unit)
            .finish()
    }
}

/// Registered controllers keyed by unique name.
pub struct ControllerRegistry {
    controllers: BTreeMap<String, Arc<dyn Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self {
            controllers: BTreeMap::new(),
        }
    }

    /// Register a controller. Names must be unique and usable as a path segment.
    pub fn register(&mut self, controller: Arc<dyn Controller>) -> Result<(), ServiceError> {
        let name = controller.name().to_string();
        if !is_resource_name(&name) {
            return Err(ServiceError::InvalidControllerName(name));
        }
        if self.controllers.contains_key(&name) {
            return Err(ServiceError::DuplicateController(name));
        }
        debug!(controller = %name, "registered controller");
        self.controllers.insert(name, controller);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Controller>> {
        self.controllers.get(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.controllers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Controller>> {
        self.controllers.values()
    }
}

fn is_resource_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One transport route produced from a controller action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRoute {
    pub controller: String,
    pub action: Action,
    pub method: Method,
    /// axum path, e.g. `/module-yml/{id}`.
    pub path: String,
    pub default_status: StatusCode,
}

impl CompiledRoute {
    /// Whether the path carries the `id` parameter.
    pub fn has_id(&self) -> bool {
        self.path.ends_with("/{id}")
    }
}

/// Resolve `{resource}` and translate `:param` segments into axum paths.
///
/// A trailing `?` marks the parameter optional, which yields two paths:
/// one without the segment and one with it.
pub fn compile_url_pattern(
    template: &str,
    resource: &str,
    controller: &str,
    action: &str,
) -> Result<Vec<String>, ServiceError> {
    let unresolved = |placeholder: &str| ServiceError::UnresolvedPlaceholder {
        controller: controller.to_string(),
        action: action.to_string(),
        placeholder: placeholder.to_string(),
    };

    let mut resolved = String::with_capacity(template.len() + resource.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        resolved.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| unresolved(after))?;
        match &after[..end] {
            "resource" => resolved.push_str(resource),
            other => return Err(unresolved(other)),
        }
        rest = &after[end + 1..];
    }
    resolved.push_str(rest);

    let mut required = Vec::new();
    let mut full = Vec::new();
    let mut has_optional = false;
    for segment in resolved.split('/').filter(|s| !s.is_empty()) {
        match segment.strip_prefix(':') {
            Some(param) => match param.strip_suffix('?') {
                Some(name) => {
                    has_optional = true;
                    full.push(format!("{{{name}}}"));
                }
                None => {
                    let segment = format!("{{{param}}}");
                    required.push(segment.clone());
                    full.push(segment);
                }
            },
            None => {
                required.push(segment.to_string());
                full.push(segment.to_string());
            }
        }
    }

    let join = |segments: &[String]| format!("/{}", segments.join("/"));
    let mut paths = Vec::with_capacity(2);
    if has_optional {
        paths.push(join(&required));
    }
    paths.push(join(&full));
    Ok(paths)
}

/// Compile the routes of every registered controller.
pub fn compile_routes(registry: &ControllerRegistry) -> Result<Vec<CompiledRoute>, ServiceError> {
    let mut routes = Vec::new();
    for controller in registry.iter() {
        let name = controller.name();
        let mut seen = HashSet::new();
        for &action_name in controller.enabled_actions() {
            let action =
                Action::from_name(action_name).ok_or_else(|| ServiceError::InvalidAction {
                    controller: name.to_string(),
                    action: action_name.to_string(),
                })?;
            if !seen.insert(action) {
                return Err(ServiceError::DuplicateAction {
                    controller: name.to_string(),
                    action: action_name.to_string(),
                });
            }
            let pattern = action.pattern();
            for path in compile_url_pattern(pattern.url_template, name, name, action_name)? {
                routes.push(CompiledRoute {
                    controller: name.to_string(),
                    action,
                    method: pattern.method.clone(),
                    path,
                    default_status: pattern.default_status,
                });
            }
        }
    }
    Ok(routes)
}

/// Loaded controllers and their compiled routes.
pub struct Service {
    registry: ControllerRegistry,
    routes: Vec<CompiledRoute>,
}

impl Service {
    /// Build and register a controller from every factory.
    pub fn discover(factories: &[ControllerFactory]) -> Result<ControllerRegistry, ServiceError> {
        let mut registry = ControllerRegistry::new();
        for factory in factories {
            let controller = (factory.build)().map_err(|source| ServiceError::ControllerInit {
                unit: factory.unit,
                source,
            })?;
            registry.register(controller)?;
        }
        Ok(registry)
    }

    /// Discover, load and compile the given controllers.
    pub async fn load(factories: &[ControllerFactory]) -> Result<Self, ServiceError> {
        let registry = Self::discover(factories)?;
        Self::from_registry(registry).await
    }

    /// Run every load hook, then compile routes.
    pub async fn from_registry(registry: ControllerRegistry) -> Result<Self, ServiceError> {
        for controller in registry.iter() {
            controller
                .load()
                .await
                .map_err(|source| ServiceError::ControllerLoad {
                    controller: controller.name().to_string(),
                    source,
                })?;
        }
        let routes = compile_routes(&registry)?;
        info!(
            controllers = registry.len(),
            routes = routes.len(),
            "compiled service routes"
        );
        Ok(Self { registry, routes })
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    /// Build the axum router serving every compiled route.
    pub fn router(&self) -> Router {
        let mut by_path: BTreeMap<&str, MethodRouter> = BTreeMap::new();
        for route in &self.routes {
            let Some(controller) = self.registry.get(&route.controller) else {
                continue;
            };
            let target = dispatch::Target {
                controller: Arc::clone(controller),
                action: route.action,
                default_status: route.default_status,
            };
            let filter = route.action.pattern().method_filter();
            let entry = by_path
                .remove(route.path.as_str())
                .unwrap_or_else(|| MethodRouter::new().fallback(method_not_allowed));
            let entry = if route.has_id() {
                entry.on(filter, move |Path(id): Path<String>, req: Request| {
                    dispatch::dispatch(target, Some(id), req)
                })
            } else {
                entry.on(filter, move |req: Request| dispatch::dispatch(target, None, req))
            };
            by_path.insert(route.path.as_str(), entry);
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, methods)| {
                router.route(path, methods)
            })
            .fallback(route_not_found)
    }
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::not_found("route-not-found", format!("no route matches {uri}"))
}

async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::with_status(
        StatusCode::METHOD_NOT_ALLOWED,
        "method-not-allowed",
        format!("{method} is not supported on {}", uri.path()),
    )
}
