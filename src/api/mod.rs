pub mod format;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, SecurityConfig};
use crate::database::models::{Breeder, Dog, Image, Litter};
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// Every route of the service with its global layers
pub fn router(state: AppState, config: &AppConfig) -> Router {
    let mut app = Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/auth/login", post(public::auth_login))
        .merge(whoami_routes(&state))
        .merge(breeder_routes())
        .merge(dog_routes())
        .merge(litter_routes())
        .merge(image_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.server.max_request_size_bytes));

    if config.security.enable_cors {
        app = app.layer(cors_layer(&config.security));
    }
    app.layer(TraceLayer::new_for_http())
}

fn whoami_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/whoami", get(protected::auth_whoami))
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            jwt_auth_middleware,
        ))
}

fn breeder_routes() -> Router<AppState> {
    use protected::breeder;

    Router::new()
        .route(
            "/breeders",
            get(protected::asset_list::<Breeder>).post(public::breeder_register),
        )
        .route(
            "/breeders/:id",
            get(protected::asset_show::<Breeder>)
                .put(breeder::update)
                .delete(breeder::delete),
        )
        .route("/breeders/:id/restore", post(breeder::restore))
        .route("/breeders/:id/dogs", get(breeder::dogs))
        .route("/breeders/:id/litters", get(breeder::litters))
}

fn dog_routes() -> Router<AppState> {
    use protected::dog;

    Router::new()
        .route("/dogs", get(protected::asset_list::<Dog>).post(dog::create))
        .route(
            "/dogs/:id",
            get(protected::asset_show::<Dog>)
                .put(dog::update)
                .delete(dog::delete),
        )
        .route("/dogs/:id/restore", post(dog::restore))
        .route("/dogs/:id/breeder", get(dog::breeder))
}

fn litter_routes() -> Router<AppState> {
    use protected::litter;

    Router::new()
        .route(
            "/litters",
            get(protected::asset_list::<Litter>).post(litter::create),
        )
        .route(
            "/litters/:id",
            get(protected::asset_show::<Litter>)
                .put(litter::update)
                .delete(litter::delete),
        )
        .route("/litters/:id/restore", post(litter::restore))
        .route("/litters/:id/pups", get(litter::pups))
        .route("/litters/:id/breeder", get(litter::breeder))
}

fn image_routes() -> Router<AppState> {
    use protected::image;

    Router::new()
        .route("/images", get(protected::asset_list::<Image>))
        .route("/images/upload/:breeder_id", post(image::upload))
        .route(
            "/images/:id",
            get(protected::asset_show::<Image>)
                .put(image::update)
                .delete(image::delete),
        )
        .route("/images/:id/restore", post(image::restore))
}

/// Permissive when no origins are configured or `*` is listed
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.is_empty() || security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::permissive().allow_origin(AllowOrigin::list(origins))
}
