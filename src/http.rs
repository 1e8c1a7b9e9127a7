use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use axum::handler::Handler;
use axum::http::{header, HeaderValue, Method};
use axum::response::Html;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::err::{self, Error};
use crate::schema::StudentSchema;
use crate::store::ItemProvider;

pub const GRAPHQL_PATH: &str = "/graphql";

/// With an allow-list the listed origins may send credentials; without one
/// any origin may call, but never with credentials.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, Error> {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    if origins.is_empty() {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any));
    }
    let origins = origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|err| {
                Error::internal("ConfigError", format!("bad CORS origin `{}`: {}", origin, err))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]))
}

pub fn router(schema: StudentSchema, provider: Arc<dyn ItemProvider>, cors: CorsLayer) -> Router {
    Router::new()
        .route(GRAPHQL_PATH, get(graphiql).post(graphql_handler))
        .route("/health", get(health))
        .fallback(err::handler404.into_service())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(schema))
                .layer(Extension(provider))
                .layer(cors),
        )
}

async fn graphql_handler(
    Extension(schema): Extension<StudentSchema>,
    Json(request): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    log::debug!("GraphQL request {:?}", request.operation_name);
    let response = schema.execute(request).await;
    if response.is_err() {
        log::warn!("GraphQL request finished with {} error(s)", response.errors.len());
    }
    Json(response)
}

async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint(GRAPHQL_PATH).finish())
}

#[derive(Debug, Clone, Serialize)]
struct Health {
    status: &'static str,
}

async fn health(Extension(provider): Extension<Arc<dyn ItemProvider>>) -> Result<Json<Health>, Error> {
    provider.ping().await?;
    Ok(Json(Health { status: "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_origins_are_config_errors() {
        let err = cors_layer(&["https://ok.example".into(), "bad\norigin".into()]).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn wildcard_and_allow_list_both_build() {
        assert!(cors_layer(&[]).is_ok());
        assert!(cors_layer(&["https://ok.example".into()]).is_ok());
    }
}
