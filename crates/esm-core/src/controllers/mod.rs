//! Controllers compiled into every daemon.

pub mod application_status;
pub mod link;
pub mod module;
pub mod module_yml;

use crate::service::ControllerFactory;

pub use application_status::ApplicationStatusController;
pub use link::LinkController;
pub use module_yml::ModuleYmlController;

/// Factories for the built-in controllers, in registration order.
pub fn builtin_factories() -> Vec<ControllerFactory> {
    vec![
        ControllerFactory {
            unit: "controllers::application_status",
            build: ApplicationStatusController::build,
        },
        ControllerFactory {
            unit: "controllers::module_yml",
            build: ModuleYmlController::build,
        },
        ControllerFactory {
            unit: "controllers::link",
            build: LinkController::build,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Service;

    #[tokio::test]
    async fn test_builtin_routes() {
        let service = Service::load(&builtin_factories()).await.unwrap();
        assert_eq!(
            service.registry().names(),
            vec!["application-status", "link", "module-yml"]
        );

        let mut paths: Vec<String> = service
            .routes()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "GET /application-status",
                "GET /module-yml",
                "POST /link",
                "PUT /module-yml",
                "PUT /module-yml/{id}",
            ]
        );
    }
}
