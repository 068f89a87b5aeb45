//! The six CRUD actions a controller can enable.

use axum::http::{Method, StatusCode};
use axum::routing::MethodFilter;

/// One of the fixed controller actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    List,
    ListOne,
    Create,
    CreateOrUpdate,
    Update,
    Delete,
}

/// How an action maps onto HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPattern {
    /// Path template; `{resource}` is the controller name, `:id` a path
    /// parameter and `:id?` an optional one.
    pub url_template: &'static str,
    pub method: Method,
    /// Status sent when the handler succeeds without sending a response.
    pub default_status: StatusCode,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::List,
        Action::ListOne,
        Action::Create,
        Action::CreateOrUpdate,
        Action::Update,
        Action::Delete,
    ];

    /// Look up an action by its controller-facing name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::List => "list",
            Action::ListOne => "listOne",
            Action::Create => "create",
            Action::CreateOrUpdate => "createOrUpdate",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    pub fn pattern(self) -> ActionPattern {
        let (url_template, method, default_status) = match self {
            Action::List => ("/{resource}", Method::GET, StatusCode::OK),
            Action::ListOne => ("/{resource}/:id", Method::GET, StatusCode::OK),
            Action::Create => ("/{resource}", Method::POST, StatusCode::CREATED),
            Action::CreateOrUpdate => ("/{resource}/:id?", Method::PUT, StatusCode::OK),
            Action::Update => ("/{resource}/:id", Method::PATCH, StatusCode::OK),
            Action::Delete => ("/{resource}/:id", Method::DELETE, StatusCode::OK),
        };
        ActionPattern {
            url_template,
            method,
            default_status,
        }
    }
}

impl ActionPattern {
    /// The axum method filter for [`method`](Self::method).
    pub fn method_filter(&self) -> MethodFilter {
        if self.method == Method::POST {
            MethodFilter::POST
        } else if self.method == Method::PUT {
            MethodFilter::PUT
        } else if self.method == Method::PATCH {
            MethodFilter::PATCH
        } else if self.method == Method::DELETE {
            MethodFilter::DELETE
        } else {
            MethodFilter::GET
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
