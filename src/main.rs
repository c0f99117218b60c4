mod cloudinary;
mod envelope;
mod http;
mod metrics;
mod models;
mod posts;
mod security;
mod sellers;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use cloudinary::CloudinaryClient;
use envelope::{Replies, ServiceError, respond, respond_entity};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    PictureUpload, PostProductResponse, SellerResponse, UpdatePostProductRequest,
    UploadPostProductRequest, VerifiedPostProductRequest,
};
use posts::PostProducts;
use security::{AuthContext, AuthState, require_api_auth, require_seller};
use sellers::SellerDirectory;
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "market.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let auth_state = AuthState::from_env();
    let sellers = SellerDirectory::demo();
    let uploader = CloudinaryClient::from_env();
    if uploader.is_none() {
        info!(
            target = "market.api",
            "cloudinary not configured; storing offline picture urls"
        );
    }
    let posts = PostProducts::new(sellers.clone(), uploader);
    let openapi: serde_json::Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or(serde_json::json!({"openapi": "3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;

    let state = AppState {
        sellers,
        posts,
        openapi: Arc::new(openapi),
        prometheus_handle,
    };
    let app = build_app(state, auth_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "market.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    sellers: SellerDirectory,
    posts: PostProducts,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn build_app(state: AppState, auth_state: AuthState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let seller_routes = Router::new()
        .route(
            "/{username}/check-service-package-validity",
            post(check_service_package_validity),
        )
        .route("/profile", get(get_profile))
        .route("/post-products", post(upload_post_product))
        .route(
            "/upload-pictures-cloudinary/{id}",
            post(upload_post_pictures),
        )
        .route(
            "/verified-post-product-request",
            post(verified_post_product_request),
        )
        .route("/my-posts", get(my_posts))
        .route("/posts/{id}", put(update_post).delete(delete_post))
        .route_layer(middleware::from_fn_with_state(auth_state, require_api_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .nest("/api/v1/seller", seller_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit_from_env()))
}

// Fixed strings each endpoint feeds the translator; status selection and
// envelope shape live in `envelope`.
const CHECK_PACKAGE: Replies = Replies {
    operation: "check_service_package_validity",
    success: "Service package validity checked successfully",
    missing: "Service package not found",
};
const PROFILE: Replies = Replies {
    operation: "get_profile",
    success: "Get seller profile successfully",
    missing: "Seller profile not found",
};
const UPLOAD_POST: Replies = Replies {
    operation: "upload_post_product",
    success: "UPLOADED POST SUCCESSFULLY",
    missing: "Post product not found",
};
const UPLOAD_PICTURES: Replies = Replies {
    operation: "upload_post_pictures",
    success: "UPLOADED POST PICTURES SUCCESSFULLY",
    missing: "Post product not found",
};
const VERIFIED_REQUEST: Replies = Replies {
    operation: "verified_post_product_request",
    success: "VERIFIED POST REQUEST SENT",
    missing: "Post product not found",
};
const MY_POSTS: Replies = Replies {
    operation: "my_posts",
    success: "Seller posts retrieved successfully",
    missing: "Seller profile not found",
};
const UPDATE_POST: Replies = Replies {
    operation: "update_post",
    success: "POST UPDATED SUCCESSFULLY",
    missing: "Post product not found",
};
const DELETE_POST: Replies = Replies {
    operation: "delete_post",
    success: "POST DELETED SUCCESSFULLY",
    missing: "Post product not found",
};

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "greenmarket-api-rs",
    }))
}

/// Check whether a seller's service package is still valid.
///
/// - Method: `POST`
/// - Path: `/api/v1/seller/{username}/check-service-package-validity`
/// - Auth: seller role
async fn check_service_package_validity(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(username): Path<String>,
) -> Response {
    crate::metrics::inc_requests("/api/v1/seller/check-service-package-validity");
    info!(
        target = "market.api",
        username = %username,
        caller = %context.username,
        "checking service package validity",
    );
    let outcome = async {
        require_seller(&context)?;
        state.sellers.check_package_validity(&username).await
    }
    .await;
    respond(&CHECK_PACKAGE, outcome)
}

/// Profile of the authenticated caller. A caller without a seller profile
/// gets a 404, not an empty success.
///
/// - Method: `GET`
/// - Path: `/api/v1/seller/profile`
async fn get_profile(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> Response {
    crate::metrics::inc_requests("/api/v1/seller/profile");
    info!(
        target = "market.api",
        caller = %context.username,
        "getting seller profile",
    );
    let outcome = state
        .sellers
        .profile(&context.username)
        .await
        .map(|seller| seller.map(|s| SellerResponse::from(&s)));
    respond_entity(&PROFILE, outcome)
}

/// Publish a product post with image attachments.
///
/// - Method: `POST`
/// - Path: `/api/v1/seller/post-products`
/// - Body: multipart form, text fields plus `pictures` file parts
async fn upload_post_product(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    multipart: Multipart,
) -> Response {
    crate::metrics::inc_requests("/api/v1/seller/post-products");
    let outcome = async {
        require_seller(&context)?;
        let (request, pictures) = read_upload_form(multipart).await?;
        let post = state.posts.create(&context.username, request, pictures).await?;
        Ok(PostProductResponse::from(&post))
    }
    .await;
    respond(&UPLOAD_POST, outcome)
}

/// Append pictures to an existing post.
///
/// - Method: `POST`
/// - Path: `/api/v1/seller/upload-pictures-cloudinary/{id}`
async fn upload_post_pictures(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Response {
    crate::metrics::inc_requests("/api/v1/seller/upload-pictures-cloudinary");
    let outcome = async {
        require_seller(&context)?;
        let pictures = read_picture_parts(multipart).await?;
        let post = state.posts.append_pictures(id, pictures).await?;
        Ok(PostProductResponse::from(&post))
    }
    .await;
    respond(&UPLOAD_PICTURES, outcome)
}

/// Ask moderators to verify a post.
///
/// - Method: `POST`
/// - Path: `/api/v1/seller/verified-post-product-request`
/// - Body: `{ "postId": n }`
async fn verified_post_product_request(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<VerifiedPostProductRequest>,
) -> Response {
    crate::metrics::inc_requests("/api/v1/seller/verified-post-product-request");
    let outcome = async {
        require_seller(&context)?;
        let post = state.posts.verification_request(&request).await?;
        Ok(PostProductResponse::from(&post))
    }
    .await;
    respond(&VERIFIED_REQUEST, outcome)
}

#[derive(Debug, Deserialize)]
struct PageParams {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_page_size")]
    size: usize,
}

fn default_page_size() -> usize {
    10
}

/// Paged list of the caller's posts, newest first.
///
/// - Method: `GET`
/// - Path: `/api/v1/seller/my-posts?page=&size=`
async fn my_posts(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Query(params): Query<PageParams>,
) -> Response {
    crate::metrics::inc_requests("/api/v1/seller/my-posts");
    let outcome = async {
        require_seller(&context)?;
        state
            .posts
            .list_for_seller(&context.username, params.page, params.size)
            .await
    }
    .await;
    respond(&MY_POSTS, outcome)
}

/// Partial update of an owned post.
///
/// - Method: `PUT`
/// - Path: `/api/v1/seller/posts/{id}`
async fn update_post(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePostProductRequest>,
) -> Response {
    crate::metrics::inc_requests("/api/v1/seller/posts/update");
    let outcome = async {
        require_seller(&context)?;
        let post = state.posts.update(&context.username, id, request).await?;
        Ok(PostProductResponse::from(&post))
    }
    .await;
    respond(&UPDATE_POST, outcome)
}

/// Remove an owned post.
///
/// - Method: `DELETE`
/// - Path: `/api/v1/seller/posts/{id}`
async fn delete_post(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Response {
    crate::metrics::inc_requests("/api/v1/seller/posts/delete");
    let outcome = async {
        require_seller(&context)?;
        let post = state.posts.delete(&context.username, id).await?;
        Ok(PostProductResponse::from(&post))
    }
    .await;
    respond(&DELETE_POST, outcome)
}

/// Bind the multipart upload form: text fields into the request struct,
/// binary parts under `pictures` into upload buffers.
async fn read_upload_form(
    mut multipart: Multipart,
) -> Result<(UploadPostProductRequest, Vec<PictureUpload>), ServiceError> {
    let mut request = UploadPostProductRequest::default();
    let mut pictures = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "pictures" {
            pictures.push(read_picture_field(field).await?);
            continue;
        }
        let value = field.text().await?;
        bind_field(&mut request, &name, &value)?;
    }
    if request.title.trim().is_empty() {
        return Err(ServiceError::unexpected("missing required field: title"));
    }
    Ok((request, pictures))
}

/// Collect only the `pictures` parts; other fields are ignored.
async fn read_picture_parts(mut multipart: Multipart) -> Result<Vec<PictureUpload>, ServiceError> {
    let mut pictures = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("pictures") {
            pictures.push(read_picture_field(field).await?);
        }
    }
    Ok(pictures)
}

async fn read_picture_field(
    field: axum::extract::multipart::Field<'_>,
) -> Result<PictureUpload, ServiceError> {
    let file_name = field.file_name().unwrap_or("upload.jpg").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field.bytes().await?.to_vec();
    Ok(PictureUpload {
        file_name,
        content_type,
        bytes,
    })
}

fn bind_field(
    request: &mut UploadPostProductRequest,
    name: &str,
    value: &str,
) -> Result<(), ServiceError> {
    match name {
        "title" => request.title = value.to_string(),
        "brand" => request.brand = value.to_string(),
        "model" => request.model = value.to_string(),
        "manufactureYear" => request.manufacture_year = parse_number(name, value)?,
        "usedDuration" => request.used_duration = value.to_string(),
        "conditionLevel" => request.condition_level = value.to_string(),
        "price" => request.price = parse_number(name, value)?,
        "length" => request.length = value.to_string(),
        "width" => request.width = value.to_string(),
        "height" => request.height = value.to_string(),
        "weight" => request.weight = value.to_string(),
        "description" => request.description = value.to_string(),
        "locationTrading" => request.location_trading = value.to_string(),
        "categoryId" => request.category_id = parse_number(name, value)?,
        // Unknown form fields (the web client also sends sellerId) are ignored.
        _ => {}
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ServiceError> {
    value
        .trim()
        .parse()
        .map_err(|_| ServiceError::unexpected(format!("field `{name}` is not numeric: {value}")))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Response {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return envelope::unauthenticated("Docs key required");
        }
    }
    Json((*state.openapi).clone()).into_response()
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>GreenMarket Seller API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap()
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(axum::http::StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(10 * 1024 * 1024)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
