use crate::auth::{AccessGate, Claims};
use crate::errors::LedgerServiceError;
use crate::metrics;
use crate::middleware::JwtAuth;
use crate::models::{
    CollectionRequest, CollectorPatch, CreateItemRequest, ItemPatch, LoginRequest, PageQuery,
    RecentQuery, RegisterRequest, Role, SearchQuery, WithdrawalRequest,
};
use crate::services::{AdminService, CatalogService, CollectorService};
use actix_web::{error, web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;

type HandlerResult = Result<HttpResponse, LedgerServiceError>;

/// Service banner
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Welcome to the Waste Sorting & Recycling Optimization API",
        "service": "waste-ledger",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "waste-ledger",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError()
            .json(json!({
                "error": "Failed to gather metrics",
                "details": e.to_string()
            }))
    }
}

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

pub async fn register(
    service: web::Data<Arc<CollectorService>>,
    request: web::Json<RegisterRequest>,
) -> HandlerResult {
    let collector = service.register(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(collector))
}

pub async fn login(
    service: web::Data<Arc<CollectorService>>,
    request: web::Json<LoginRequest>,
) -> HandlerResult {
    let response = service.login(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn get_me(gate: web::Data<AccessGate>, claims: web::ReqData<Claims>) -> HandlerResult {
    let collector = gate.resolve(&claims, Role::Collector).await?;
    Ok(HttpResponse::Ok().json(collector))
}

pub async fn get_my_stats(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<CollectorService>>,
    claims: web::ReqData<Claims>,
) -> HandlerResult {
    let collector = gate.resolve(&claims, Role::Collector).await?;
    let stats = service.stats(&collector).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn record_collection(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<CollectorService>>,
    claims: web::ReqData<Claims>,
    request: web::Json<CollectionRequest>,
) -> HandlerResult {
    let collector = gate.resolve(&claims, Role::Collector).await?;
    let collection = service
        .record_collection(&collector, request.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(collection))
}

pub async fn list_my_collections(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<CollectorService>>,
    claims: web::ReqData<Claims>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let collector = gate.resolve(&claims, Role::Collector).await?;
    let collections = service.list_collections(&collector, &query).await?;
    Ok(HttpResponse::Ok().json(collections))
}

pub async fn withdraw(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<CollectorService>>,
    claims: web::ReqData<Claims>,
    request: web::Json<WithdrawalRequest>,
) -> HandlerResult {
    let collector = gate.resolve(&claims, Role::Collector).await?;
    let transaction = service.withdraw(&collector, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(transaction))
}

pub async fn list_my_transactions(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<CollectorService>>,
    claims: web::ReqData<Claims>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let collector = gate.resolve(&claims, Role::Collector).await?;
    let transactions = service.list_transactions(&collector, &query).await?;
    Ok(HttpResponse::Ok().json(transactions))
}

// ---------------------------------------------------------------------------
// Citizen catalog
// ---------------------------------------------------------------------------

pub async fn search_items(
    service: web::Data<Arc<CatalogService>>,
    query: web::Query<SearchQuery>,
) -> HandlerResult {
    let items = service.search(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_item(
    service: web::Data<Arc<CatalogService>>,
    item_id: web::Path<i64>,
) -> HandlerResult {
    let item = service.get_item(*item_id).await?;
    Ok(HttpResponse::Ok().json(item))
}

pub async fn get_categories(service: web::Data<Arc<CatalogService>>) -> HandlerResult {
    let categories = service.categories().await?;
    Ok(HttpResponse::Ok().json(json!({ "categories": categories })))
}

pub async fn get_instructions(
    service: web::Data<Arc<CatalogService>>,
    item_name: web::Path<String>,
) -> HandlerResult {
    let response = service.instructions(&item_name).await?;
    Ok(HttpResponse::Ok().json(response))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn get_dashboard(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let stats = service.dashboard().await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn list_collectors(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let collectors = service.list_collectors(&query).await?;
    Ok(HttpResponse::Ok().json(collectors))
}

pub async fn get_collector(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
    collector_id: web::Path<i64>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let collector = service.get_collector(*collector_id).await?;
    Ok(HttpResponse::Ok().json(collector))
}

pub async fn get_collector_stats(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
    collector_id: web::Path<i64>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let stats = service.collector_stats(*collector_id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn update_collector(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
    collector_id: web::Path<i64>,
    patch: web::Json<CollectorPatch>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let collector = service
        .update_collector(*collector_id, patch.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(collector))
}

pub async fn create_item(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateItemRequest>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let item = service.create_item(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(item))
}

pub async fn update_item(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
    item_id: web::Path<i64>,
    patch: web::Json<ItemPatch>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let item = service.update_item(*item_id, patch.into_inner()).await?;
    Ok(HttpResponse::Ok().json(item))
}

pub async fn delete_item(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
    item_id: web::Path<i64>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    service.delete_item(*item_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Item deleted successfully" })))
}

pub async fn recent_collections(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
    query: web::Query<RecentQuery>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let collections = service.recent_collections(&query).await?;
    Ok(HttpResponse::Ok().json(collections))
}

pub async fn run_reconciliation(
    gate: web::Data<AccessGate>,
    service: web::Data<Arc<AdminService>>,
    claims: web::ReqData<Claims>,
) -> HandlerResult {
    gate.resolve(&claims, Role::Admin).await?;
    let report = service.reconcile().await?;
    Ok(HttpResponse::Ok().json(report))
}

// Extractor failures use the same error body as every other rejection

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    LedgerServiceError::Validation(err.to_string()).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    LedgerServiceError::Validation(err.to_string()).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    LedgerServiceError::Validation(err.to_string()).into()
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error));

    cfg.service(
        web::scope("/collectors")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .service(
                web::scope("")
                    .wrap(JwtAuth)
                    .route("/me", web::get().to(get_me))
                    .route("/me/stats", web::get().to(get_my_stats))
                    .route("/collections", web::post().to(record_collection))
                    .route("/collections", web::get().to(list_my_collections))
                    .route("/withdraw", web::post().to(withdraw))
                    .route("/transactions", web::get().to(list_my_transactions)),
            ),
    )
    .service(
        web::scope("/citizen")
            .route("/items", web::get().to(search_items))
            .route("/items/{item_id}", web::get().to(get_item))
            .route("/categories", web::get().to(get_categories))
            .route("/instructions/{item_name}", web::get().to(get_instructions)),
    )
    .service(
        web::scope("/admin")
            .wrap(JwtAuth)
            .route("/dashboard", web::get().to(get_dashboard))
            .route("/collectors", web::get().to(list_collectors))
            .route("/collectors/{collector_id}", web::get().to(get_collector))
            .route("/collectors/{collector_id}", web::patch().to(update_collector))
            .route("/collectors/{collector_id}/stats", web::get().to(get_collector_stats))
            .route("/items", web::post().to(create_item))
            .route("/items/{item_id}", web::put().to(update_item))
            .route("/items/{item_id}", web::delete().to(delete_item))
            .route("/collections/recent", web::get().to(recent_collections))
            .route("/reconciliation", web::get().to(run_reconciliation)),
    )
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check))
    .route("/", web::get().to(root));
}
